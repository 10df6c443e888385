//! In-memory store implementations
//!
//! Reference backend used by the test suite and local demos. Writes are
//! staged per unit-of-work handle and only become visible on commit, so
//! the engine's atomicity expectations can be exercised without a
//! database. Failure injection knobs simulate persistence faults.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use shared::models::{Customer, CustomerPriceOverride, Drawer, DrawerStatus, Product};
use shared::transaction::{AppliedReturnLine, MovementKind, ReturnSelection, Transaction};

use super::{
    CustomerDirectory, DrawerStore, ProductCatalog, StoreError, StoreResult, TransactionStore,
    UnitOfWork, UowHandle,
};
use crate::transactions::money;

/// A staged drawer balance delta
#[derive(Debug, Clone)]
struct StagedDelta {
    drawer_id: i64,
    amount: f64,
    kind: MovementKind,
    reference: String,
}

/// A staged drawer close
#[derive(Debug, Clone)]
struct StagedClose {
    drawer_id: i64,
    counted_cash: f64,
    note: Option<String>,
}

/// Writes staged under one unit-of-work handle
#[derive(Debug, Default)]
struct PendingUnit {
    txns: Vec<Transaction>,
    deltas: Vec<StagedDelta>,
    returns: Vec<(i64, Vec<AppliedReturnLine>)>,
    open: Option<Drawer>,
    close: Option<StagedClose>,
}

/// Transactional state guarded by one lock (emulates row locking)
#[derive(Debug, Default)]
struct TxState {
    transactions: HashMap<i64, Transaction>,
    next_txn_id: i64,
    drawer: Option<Drawer>,
    next_drawer_id: i64,
    units: HashMap<u64, PendingUnit>,
    next_handle: u64,
}

/// In-memory backend implementing every collaborator contract
#[derive(Debug, Default)]
pub struct MemoryStore {
    products: DashMap<i64, Product>,
    customers: DashMap<i64, Customer>,
    overrides: DashMap<i64, Vec<CustomerPriceOverride>>,
    state: Mutex<TxState>,
    fail_next_persist: AtomicBool,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Seeding helpers ====================

    pub fn put_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn put_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn put_overrides(&self, customer_id: i64, overrides: Vec<CustomerPriceOverride>) {
        self.overrides.insert(customer_id, overrides);
    }

    /// Insert a committed transaction directly (test fixtures)
    pub fn seed_transaction(&self, mut txn: Transaction) -> i64 {
        let mut state = self.state.lock();
        let id = match txn.id {
            Some(id) => id,
            None => {
                state.next_txn_id += 1;
                state.next_txn_id
            }
        };
        txn.id = Some(id);
        state.next_txn_id = state.next_txn_id.max(id);
        state.transactions.insert(id, txn);
        id
    }

    // ==================== Failure injection ====================

    /// Make the next `persist` call fail (simulated store fault)
    pub fn fail_next_persist(&self) {
        self.fail_next_persist.store(true, Ordering::SeqCst);
    }

    /// Make the next `commit` call fail (simulated commit fault)
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed drawer balance (test observation)
    pub fn drawer_balance(&self) -> Option<f64> {
        self.state.lock().drawer.as_ref().map(|d| d.balance)
    }
}

impl TxState {
    fn unit(&mut self, handle: &UowHandle) -> StoreResult<&mut PendingUnit> {
        self.units
            .get_mut(&handle.0)
            .ok_or(StoreError::UnknownHandle(handle.0))
    }

    /// Quantity reserved against a line by all in-flight units
    fn reserved_for(&self, original_id: i64, line_id: &str) -> i32 {
        self.units
            .values()
            .flat_map(|u| u.returns.iter())
            .filter(|(id, _)| *id == original_id)
            .flat_map(|(_, lines)| lines.iter())
            .filter(|l| l.line_id == line_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Staged balance movement for a drawer within one unit
    fn staged_delta(&self, handle: &UowHandle, drawer_id: i64) -> f64 {
        self.units
            .get(&handle.0)
            .map(|u| {
                u.deltas
                    .iter()
                    .filter(|d| d.drawer_id == drawer_id)
                    .map(|d| d.amount)
                    .sum()
            })
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn begin(&self) -> StoreResult<UowHandle> {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = UowHandle(state.next_handle);
        state.units.insert(handle.0, PendingUnit::default());
        Ok(handle)
    }

    async fn commit(&self, handle: UowHandle) -> StoreResult<()> {
        let mut state = self.state.lock();
        let unit = state
            .units
            .remove(&handle.0)
            .ok_or(StoreError::UnknownHandle(handle.0))?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            // Unit already removed: staged writes are gone, as a failed
            // database commit leaves no partial state behind.
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        for txn in unit.txns {
            let id = txn.id.expect("staged transaction always carries an id");
            state.transactions.insert(id, txn);
        }

        for (original_id, lines) in unit.returns {
            let original = state.transactions.get_mut(&original_id).ok_or_else(|| {
                StoreError::NotFound(format!("transaction {}", original_id))
            })?;
            for applied in lines {
                if let Some(line) = original.line_mut(&applied.line_id) {
                    // Reservation already guarantees the cap; clamp anyway
                    line.already_returned =
                        (line.already_returned + applied.quantity).min(line.quantity);
                }
            }
            original.touch();
        }

        if let Some(drawer) = unit.open {
            state.next_drawer_id = state.next_drawer_id.max(drawer.id);
            state.drawer = Some(drawer);
        }

        for delta in unit.deltas {
            let drawer = state
                .drawer
                .as_mut()
                .filter(|d| d.id == delta.drawer_id)
                .ok_or_else(|| StoreError::NotFound(format!("drawer {}", delta.drawer_id)))?;
            drawer.balance = money::to_f64(
                money::to_decimal(drawer.balance) + money::to_decimal(delta.amount),
            );
            tracing::trace!(
                drawer_id = delta.drawer_id,
                amount = delta.amount,
                kind = ?delta.kind,
                reference = %delta.reference,
                "drawer delta committed"
            );
        }

        if let Some(close) = unit.close {
            let drawer = state
                .drawer
                .as_mut()
                .filter(|d| d.id == close.drawer_id)
                .ok_or_else(|| StoreError::NotFound(format!("drawer {}", close.drawer_id)))?;
            drawer.status = DrawerStatus::Closed;
            drawer.counted_cash = Some(close.counted_cash);
            drawer.variance = Some(money::to_f64(
                money::to_decimal(close.counted_cash) - money::to_decimal(drawer.balance),
            ));
            drawer.closed_at = Some(chrono::Utc::now().timestamp_millis());
            drawer.note = close.note;
        }

        Ok(())
    }

    async fn rollback(&self, handle: UowHandle) -> StoreResult<()> {
        let mut state = self.state.lock();
        state
            .units
            .remove(&handle.0)
            .ok_or(StoreError::UnknownHandle(handle.0))?;
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_by_id(&self, id: i64) -> StoreResult<Product> {
        self.products
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::NotFound(format!("product {}", id)))
    }

    async fn get_by_barcode(&self, code: &str) -> StoreResult<Product> {
        self.products
            .iter()
            .find(|p| p.barcode.as_deref() == Some(code))
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::NotFound(format!("product barcode {}", code)))
    }
}

#[async_trait]
impl CustomerDirectory for MemoryStore {
    async fn get_by_id(&self, id: i64) -> StoreResult<Customer> {
        self.customers
            .get(&id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::NotFound(format!("customer {}", id)))
    }

    async fn search_by_name(&self, text: &str) -> StoreResult<Vec<Customer>> {
        let needle = text.to_lowercase();
        let mut found: Vec<Customer> = self
            .customers
            .iter()
            .filter(|c| c.is_active && c.name.to_lowercase().contains(&needle))
            .map(|c| c.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn price_overrides(&self, customer_id: i64) -> StoreResult<Vec<CustomerPriceOverride>> {
        Ok(self
            .overrides
            .get(&customer_id)
            .map(|o| o.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn persist(&self, uow: &UowHandle, txn: &Transaction) -> StoreResult<i64> {
        if self.fail_next_persist.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "injected persistence failure".to_string(),
            ));
        }
        let mut state = self.state.lock();
        let id = match txn.id {
            Some(id) => id,
            None => {
                state.next_txn_id += 1;
                state.next_txn_id
            }
        };
        let mut staged = txn.clone();
        staged.id = Some(id);
        state.unit(uow)?.txns.push(staged);
        Ok(id)
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Transaction> {
        self.state
            .lock()
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))
    }

    async fn latest_id(&self) -> StoreResult<i64> {
        Ok(self
            .state
            .lock()
            .transactions
            .keys()
            .copied()
            .max()
            .unwrap_or(0))
    }

    async fn apply_return(
        &self,
        uow: &UowHandle,
        original_id: i64,
        selections: &[ReturnSelection],
    ) -> StoreResult<Vec<AppliedReturnLine>> {
        let mut state = self.state.lock();

        let mut applied = Vec::with_capacity(selections.len());
        let mut in_call: HashMap<String, i32> = HashMap::new();
        for sel in selections {
            let original = state
                .transactions
                .get(&original_id)
                .ok_or_else(|| StoreError::NotFound(format!("transaction {}", original_id)))?;
            let line = original.line(&sel.line_id).ok_or_else(|| {
                StoreError::NotFound(format!("line {} on transaction {}", sel.line_id, original_id))
            })?;

            // Clamp against committed returns, reservations held by
            // concurrent in-flight units, and earlier selections in this
            // call: the cap holds even when two submissions race on the
            // same original transaction.
            let committed = line.already_returned;
            let line_quantity = line.quantity;
            let unit_price = line.unit_price;
            let reserved = state.reserved_for(original_id, &sel.line_id);
            let earlier = in_call.get(&sel.line_id).copied().unwrap_or(0);
            let remaining = (line_quantity - committed - reserved - earlier).max(0);
            let quantity = sel.quantity_to_return.clamp(0, remaining);
            *in_call.entry(sel.line_id.clone()).or_insert(0) += quantity;

            applied.push(AppliedReturnLine {
                line_id: sel.line_id.clone(),
                product_id: sel.product_id,
                quantity,
                unit_price,
                refund: money::line_total(quantity, unit_price),
            });
        }

        state.unit(uow)?.returns.push((original_id, applied.clone()));
        Ok(applied)
    }
}

#[async_trait]
impl DrawerStore for MemoryStore {
    async fn current_open(&self) -> StoreResult<Option<Drawer>> {
        Ok(self
            .state
            .lock()
            .drawer
            .as_ref()
            .filter(|d| d.is_open())
            .cloned())
    }

    async fn open(
        &self,
        uow: &UowHandle,
        opened_by: i64,
        opening_float: f64,
    ) -> StoreResult<Drawer> {
        let mut state = self.state.lock();
        if state.drawer.as_ref().is_some_and(|d| d.is_open()) {
            return Err(StoreError::Conflict("a drawer is already open".to_string()));
        }
        if state.units.values().any(|u| u.open.is_some()) {
            return Err(StoreError::Conflict(
                "a drawer open is already in flight".to_string(),
            ));
        }
        state.next_drawer_id += 1;
        let drawer = Drawer {
            id: state.next_drawer_id,
            opened_by,
            status: DrawerStatus::Open,
            opening_float,
            balance: opening_float,
            counted_cash: None,
            variance: None,
            opened_at: chrono::Utc::now().timestamp_millis(),
            closed_at: None,
            note: None,
        };
        state.unit(uow)?.open = Some(drawer.clone());
        Ok(drawer)
    }

    async fn close(
        &self,
        uow: &UowHandle,
        drawer_id: i64,
        counted_cash: f64,
        note: Option<String>,
    ) -> StoreResult<Drawer> {
        let mut state = self.state.lock();
        let drawer = state
            .drawer
            .as_ref()
            .filter(|d| d.id == drawer_id && d.is_open())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("open drawer {}", drawer_id)))?;

        state.unit(uow)?.close = Some(StagedClose {
            drawer_id,
            counted_cash,
            note: note.clone(),
        });

        // Preview of the post-commit record
        let mut closed = drawer;
        closed.status = DrawerStatus::Closed;
        closed.counted_cash = Some(counted_cash);
        closed.variance = Some(money::to_f64(
            money::to_decimal(counted_cash) - money::to_decimal(closed.balance),
        ));
        closed.closed_at = Some(chrono::Utc::now().timestamp_millis());
        closed.note = note;
        Ok(closed)
    }

    async fn apply_delta(
        &self,
        uow: &UowHandle,
        drawer_id: i64,
        amount: f64,
        kind: MovementKind,
        reference: &str,
    ) -> StoreResult<f64> {
        let mut state = self.state.lock();
        let committed_balance = state
            .drawer
            .as_ref()
            .filter(|d| d.id == drawer_id && d.is_open())
            .map(|d| d.balance)
            // A delta inside the unit that opens the drawer starts from
            // the staged opening float
            .or_else(|| {
                state
                    .units
                    .get(&uow.0)
                    .and_then(|u| u.open.as_ref())
                    .filter(|d| d.id == drawer_id)
                    .map(|d| d.balance)
            })
            .ok_or_else(|| StoreError::NotFound(format!("open drawer {}", drawer_id)))?;

        let staged = state.staged_delta(uow, drawer_id);
        let balance_after = money::to_f64(
            money::to_decimal(committed_balance)
                + money::to_decimal(staged)
                + money::to_decimal(amount),
        );

        state.unit(uow)?.deltas.push(StagedDelta {
            drawer_id,
            amount,
            kind,
            reference: reference.to_string(),
        });
        Ok(balance_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::transaction::{LineItem, LineKind};

    fn completed_txn_with_line(quantity: i32, unit_price: f64) -> Transaction {
        let mut txn = Transaction::new(1, "Test Cashier");
        txn.status = shared::transaction::TransactionStatus::Completed;
        txn.items.push(LineItem {
            line_id: "line-1".to_string(),
            product_id: 1,
            name: "Test".to_string(),
            barcode: None,
            kind: LineKind::Sale,
            quantity,
            unit_price,
            base_price: unit_price,
            purchase_price: unit_price * 0.5,
            tax_rate: 0,
            line_total: unit_price * quantity as f64,
            already_returned: 0,
            note: None,
        });
        txn
    }

    fn selection(quantity_to_return: i32) -> ReturnSelection {
        ReturnSelection {
            line_id: "line-1".to_string(),
            product_id: 1,
            original_quantity: 5,
            already_returned: 0,
            quantity_to_return,
            unit_price: 10.0,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();

        let txn = Transaction::new(1, "Test Cashier");
        let id = store.persist(&uow, &txn).await.unwrap();
        assert!(TransactionStore::get_by_id(&store, id).await.is_err());

        store.commit(uow).await.unwrap();
        assert!(TransactionStore::get_by_id(&store, id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        let id = store
            .persist(&uow, &Transaction::new(1, "Test Cashier"))
            .await
            .unwrap();
        store.rollback(uow).await.unwrap();
        assert!(TransactionStore::get_by_id(&store, id).await.is_err());
    }

    #[tokio::test]
    async fn test_drawer_delta_staged_then_committed() {
        let store = MemoryStore::new();

        let uow = store.begin().await.unwrap();
        let drawer = store.open(&uow, 1, 100.0).await.unwrap();
        store.commit(uow).await.unwrap();
        assert_eq!(store.drawer_balance(), Some(100.0));

        let uow = store.begin().await.unwrap();
        let after = store
            .apply_delta(&uow, drawer.id, 15.0, MovementKind::Sale, "1")
            .await
            .unwrap();
        assert_eq!(after, 115.0);
        // Not yet committed
        assert_eq!(store.drawer_balance(), Some(100.0));

        store.commit(uow).await.unwrap();
        assert_eq!(store.drawer_balance(), Some(115.0));
    }

    #[tokio::test]
    async fn test_concurrent_returns_cannot_exceed_original() {
        let store = MemoryStore::new();
        let id = store.seed_transaction(completed_txn_with_line(5, 10.0));

        let uow_a = store.begin().await.unwrap();
        let uow_b = store.begin().await.unwrap();

        let applied_a = store.apply_return(&uow_a, id, &[selection(4)]).await.unwrap();
        assert_eq!(applied_a[0].quantity, 4);

        // Second in-flight unit only sees the remainder
        let applied_b = store.apply_return(&uow_b, id, &[selection(4)]).await.unwrap();
        assert_eq!(applied_b[0].quantity, 1);

        store.commit(uow_a).await.unwrap();
        store.commit(uow_b).await.unwrap();

        let original = TransactionStore::get_by_id(&store, id).await.unwrap();
        assert_eq!(original.items[0].already_returned, 5);
    }

    #[tokio::test]
    async fn test_duplicate_selections_in_one_call_share_the_cap() {
        let store = MemoryStore::new();
        let id = store.seed_transaction(completed_txn_with_line(5, 10.0));

        let uow = store.begin().await.unwrap();
        let applied = store
            .apply_return(&uow, id, &[selection(3), selection(3)])
            .await
            .unwrap();
        assert_eq!(applied[0].quantity, 3);
        assert_eq!(applied[1].quantity, 2);
        store.commit(uow).await.unwrap();

        let original = TransactionStore::get_by_id(&store, id).await.unwrap();
        assert_eq!(original.items[0].already_returned, 5);
    }

    #[tokio::test]
    async fn test_rolled_back_reservation_is_released() {
        let store = MemoryStore::new();
        let id = store.seed_transaction(completed_txn_with_line(5, 10.0));

        let uow_a = store.begin().await.unwrap();
        store.apply_return(&uow_a, id, &[selection(5)]).await.unwrap();
        store.rollback(uow_a).await.unwrap();

        let uow_b = store.begin().await.unwrap();
        let applied = store.apply_return(&uow_b, id, &[selection(5)]).await.unwrap();
        assert_eq!(applied[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_leaves_state_unchanged() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        store.open(&uow, 1, 100.0).await.unwrap();
        store.commit(uow).await.unwrap();

        let drawer = store.current_open().await.unwrap().unwrap();
        let uow = store.begin().await.unwrap();
        store
            .apply_delta(&uow, drawer.id, 50.0, MovementKind::CashIn, "float top-up")
            .await
            .unwrap();
        store.fail_next_commit();
        assert!(store.commit(uow).await.is_err());
        assert_eq!(store.drawer_balance(), Some(100.0));
    }
}
