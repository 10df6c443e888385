//! TransactionManager - state machine and command surface
//!
//! Owns the single active-transaction slot of a till session. All
//! mutations are serialized through one async mutex (single-writer
//! discipline); background work (debounced search, price-map reload)
//! never interleaves with a user-driven mutation unobserved.
//!
//! # Status transitions
//!
//! ```text
//! Pending ──pay_cash──► Completed   (only via a drawer commit)
//!    │  ▲                   │
//!    │  └──recall────┐      └─ open_for_edit → mutate → pay_cash again
//!    ├──hold──► Held ┘              (balance moves by the difference)
//!    └──void──► Cancelled
//! ```
//!
//! While a payment commit is in flight the slot is marked busy and every
//! other command fails fast with `FlowInProgress`; there is no global
//! "dialog open" lock.

use std::sync::Arc;

use tokio::sync::Mutex;

use shared::transaction::{
    Discount, PaymentMethod, Transaction, TransactionStatus,
};

use super::holds::HeldQueue;
use super::line_items::{self, AddOutcome, SetQuantityOutcome};
use super::{money, TxnError};
use crate::drawer::{DrawerGateway, DrawerOperation, ReconcileOutcome};
use crate::pricing::{resolver, CustomerPriceMap};
use crate::stores::{CustomerDirectory, ProductCatalog, StoreError, TransactionStore};
use crate::EngineError;

pub use crate::session::SessionContext;

/// One interactive flow at a time, modelled as explicit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FlowState {
    #[default]
    Idle,
    /// A payment commit is in flight; the slot is read-only
    Paying,
}

/// The active transaction and its session-scoped pricing state
#[derive(Debug)]
struct ActiveSlot {
    txn: Transaction,
    price_map: CustomerPriceMap,
    flow: FlowState,
}

/// Read-only totals for a presentation layer to render
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TotalsView {
    pub item_count: i32,
    pub subtotal: f64,
    pub tax: f64,
    pub discount_total: f64,
    pub total: f64,
    pub status: TransactionStatus,
}

impl From<&Transaction> for TotalsView {
    fn from(txn: &Transaction) -> Self {
        Self {
            item_count: txn.item_count,
            subtotal: txn.subtotal,
            tax: txn.tax,
            discount_total: txn.discount_total,
            total: txn.total,
            status: txn.status,
        }
    }
}

/// Outcome of a void command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoidOutcome {
    /// The transaction had no items and was simply discarded
    DiscardedEmpty,
    /// The transaction was explicitly cancelled
    Cancelled { local_id: String },
}

/// A committed cash payment
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    /// The persisted transaction, id assigned
    pub transaction: Transaction,
    /// Drawer movement for this commit
    pub delta: f64,
    pub change: Option<f64>,
    pub balance_after: f64,
}

/// State machine and command surface for one till session
pub struct TransactionManager {
    slot: Mutex<ActiveSlot>,
    holds: parking_lot::Mutex<HeldQueue>,
    catalog: Arc<dyn ProductCatalog>,
    customers: Arc<dyn CustomerDirectory>,
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<DrawerGateway>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager").finish()
    }
}

impl TransactionManager {
    /// Create a manager with a fresh empty pending transaction
    pub fn new(
        ctx: &SessionContext,
        catalog: Arc<dyn ProductCatalog>,
        customers: Arc<dyn CustomerDirectory>,
        transactions: Arc<dyn TransactionStore>,
        gateway: Arc<DrawerGateway>,
    ) -> Self {
        Self {
            slot: Mutex::new(ActiveSlot {
                txn: Transaction::new(ctx.cashier.id, &ctx.cashier.name),
                price_map: CustomerPriceMap::empty(),
                flow: FlowState::Idle,
            }),
            holds: parking_lot::Mutex::new(HeldQueue::new()),
            catalog,
            customers,
            transactions,
            gateway,
        }
    }

    // ==================== Read-only observation ====================

    pub async fn totals(&self) -> TotalsView {
        TotalsView::from(&self.slot.lock().await.txn)
    }

    pub async fn status(&self) -> TransactionStatus {
        self.slot.lock().await.txn.status
    }

    /// Clone of the active transaction, for rendering
    pub async fn active(&self) -> Transaction {
        self.slot.lock().await.txn.clone()
    }

    pub fn held_count(&self) -> usize {
        self.holds.lock().len()
    }

    // ==================== Line mutations ====================

    /// Add a product by id, or increment its existing line
    pub async fn add_item(&self, product_id: i64, quantity: i32) -> Result<AddOutcome, EngineError> {
        let product = match self.catalog.get_by_id(product_id).await {
            Ok(p) => p,
            Err(StoreError::NotFound(_)) => {
                return Err(TxnError::ProductNotFound(product_id.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        if !product.is_active {
            return Err(TxnError::ProductNotFound(product_id.to_string()).into());
        }

        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        let slot = &mut *slot;
        let unit_price = resolver::resolve_price(&product, &slot.price_map);
        let outcome = line_items::add_or_increment(&mut slot.txn, &product, quantity, unit_price)?;
        Ok(outcome)
    }

    /// Add a product by scanned barcode
    pub async fn add_item_by_barcode(
        &self,
        barcode: &str,
        quantity: i32,
    ) -> Result<AddOutcome, EngineError> {
        let product = match self.catalog.get_by_barcode(barcode).await {
            Ok(p) => p,
            Err(StoreError::NotFound(_)) => {
                return Err(TxnError::ProductNotFound(barcode.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        self.add_item(product.id, quantity).await
    }

    pub async fn remove_item(&self, line_id: &str) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        line_items::remove_line(&mut slot.txn, line_id)?;
        Ok(())
    }

    /// Set a line quantity; invalid values are corrected to 1 and the
    /// correction reported for the operator to see
    pub async fn set_quantity(
        &self,
        line_id: &str,
        quantity: i32,
    ) -> Result<SetQuantityOutcome, EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        Ok(line_items::set_quantity(&mut slot.txn, line_id, quantity)?)
    }

    /// Apply or clear the transaction-level discount
    pub async fn apply_discount(
        &self,
        discount: Option<Discount>,
    ) -> Result<TotalsView, EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        line_items::apply_discount(&mut slot.txn, discount)?;
        Ok(TotalsView::from(&slot.txn))
    }

    // ==================== Customer selection ====================

    /// Select (or clear) the acting customer. The price map is replaced
    /// wholesale and every existing line is re-resolved against it.
    pub async fn set_customer(&self, customer_id: Option<i64>) -> Result<bool, EngineError> {
        let loaded = match customer_id {
            Some(id) => {
                let customer = match self.customers.get_by_id(id).await {
                    Ok(c) => c,
                    Err(StoreError::NotFound(_)) => {
                        return Err(TxnError::CustomerNotFound(id).into());
                    }
                    Err(e) => return Err(e.into()),
                };
                let overrides = self.customers.price_overrides(id).await?;
                Some((customer, overrides))
            }
            None => None,
        };

        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        Self::ensure_editable(&slot.txn)?;
        let slot = &mut *slot;
        match loaded {
            Some((customer, overrides)) => {
                slot.price_map = CustomerPriceMap::for_customer(customer.id, overrides);
                slot.txn.customer_id = Some(customer.id);
                slot.txn.customer_name = Some(customer.name);
            }
            None => {
                slot.price_map = CustomerPriceMap::empty();
                slot.txn.customer_id = None;
                slot.txn.customer_name = None;
            }
        }
        Ok(resolver::reprice_lines(&mut slot.txn, &slot.price_map))
    }

    // ==================== Hold / recall ====================

    /// Park the active transaction and start a fresh empty one
    pub async fn hold(&self, ctx: &SessionContext) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        if slot.txn.status != TransactionStatus::Pending {
            return Err(TxnError::NotEditable.into());
        }
        if slot.txn.is_empty() {
            return Err(TxnError::Empty.into());
        }
        let parked = std::mem::replace(
            &mut slot.txn,
            Transaction::new(ctx.cashier.id, &ctx.cashier.name),
        );
        slot.price_map = CustomerPriceMap::empty();
        let local_id = parked.local_id.clone();
        self.holds.lock().hold(parked)?;
        tracing::info!(local_id = %local_id, "transaction held");
        Ok(())
    }

    /// Recall the most recently held transaction into the active slot.
    ///
    /// A non-empty active transaction is discarded, but only after the
    /// caller confirms.
    pub async fn recall(&self, confirm_discard: bool) -> Result<Transaction, EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        if !slot.txn.is_empty() && !confirm_discard {
            return Err(TxnError::ConfirmationRequired(
                "recall discards the active transaction",
            )
            .into());
        }

        let recalled = self.holds.lock().recall()?;

        // Restore the recalled customer's price map for subsequent adds;
        // a directory fault degrades to the default map rather than
        // losing the recalled transaction.
        slot.price_map = match recalled.customer_id {
            Some(customer_id) => match self.customers.price_overrides(customer_id).await {
                Ok(overrides) => CustomerPriceMap::for_customer(customer_id, overrides),
                Err(e) => {
                    tracing::warn!(customer_id, error = %e, "price override reload failed on recall");
                    CustomerPriceMap::empty()
                }
            },
            None => CustomerPriceMap::empty(),
        };
        slot.txn = recalled;
        tracing::info!(local_id = %slot.txn.local_id, "transaction recalled");
        Ok(slot.txn.clone())
    }

    // ==================== Void ====================

    /// Void the active transaction.
    ///
    /// A transaction with zero items is simply discarded, not cancelled.
    /// A non-empty one requires explicit confirmation.
    pub async fn void(
        &self,
        ctx: &SessionContext,
        confirmed: bool,
    ) -> Result<VoidOutcome, EngineError> {
        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;

        if slot.txn.is_empty() {
            slot.txn = Transaction::new(ctx.cashier.id, &ctx.cashier.name);
            slot.price_map = CustomerPriceMap::empty();
            return Ok(VoidOutcome::DiscardedEmpty);
        }

        match slot.txn.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Completed => {
                return Err(TxnError::AlreadyCompleted(slot.txn.local_id.clone()).into());
            }
            TransactionStatus::Cancelled => {
                return Err(TxnError::AlreadyCancelled(slot.txn.local_id.clone()).into());
            }
            TransactionStatus::Held => return Err(TxnError::NotEditable.into()),
        }

        if !confirmed {
            return Err(
                TxnError::ConfirmationRequired("void cancels the active transaction").into(),
            );
        }

        let mut cancelled = std::mem::replace(
            &mut slot.txn,
            Transaction::new(ctx.cashier.id, &ctx.cashier.name),
        );
        slot.price_map = CustomerPriceMap::empty();
        cancelled.status = TransactionStatus::Cancelled;
        cancelled.touch();
        tracing::info!(local_id = %cancelled.local_id, items = cancelled.items.len(), "transaction voided");
        Ok(VoidOutcome::Cancelled {
            local_id: cancelled.local_id,
        })
    }

    // ==================== Payment ====================

    /// Commit the active transaction as a cash sale through the drawer
    /// gateway. On failure the transaction stays pending with its lines
    /// intact so the operator can retry.
    pub async fn pay_cash(
        &self,
        ctx: &SessionContext,
        tendered: Option<f64>,
    ) -> Result<PaymentReceipt, EngineError> {
        // Phase 1: validate under the slot lock and mark the flow busy
        let candidate = {
            let mut slot = self.slot.lock().await;
            Self::ensure_idle(&slot)?;
            Self::ensure_editable(&slot.txn)?;
            if slot.txn.is_empty() {
                return Err(TxnError::Empty.into());
            }

            let mut candidate = slot.txn.clone();
            if let Some(t) = tendered {
                if !t.is_finite() {
                    return Err(TxnError::InvalidValue(format!(
                        "tendered must be a finite number, got {}",
                        t
                    ))
                    .into());
                }
                if money::to_decimal(t) < money::to_decimal(candidate.total) {
                    return Err(TxnError::InvalidValue(format!(
                        "tendered {} below total {}",
                        t, candidate.total
                    ))
                    .into());
                }
                candidate.tendered = Some(t);
                candidate.change = Some(money::to_f64(
                    money::to_decimal(t) - money::to_decimal(candidate.total),
                ));
            }
            candidate.payment_method = Some(PaymentMethod::Cash);
            candidate.status = TransactionStatus::Completed;
            candidate.completed_at = Some(chrono::Utc::now().timestamp_millis());

            slot.flow = FlowState::Paying;
            candidate
        };

        // Phase 2: atomic commit, without blocking slot readers
        let result = self
            .gateway
            .reconcile(
                ctx,
                DrawerOperation::Sale {
                    transaction: candidate,
                },
            )
            .await;

        // Phase 3: finalize under the lock
        let mut slot = self.slot.lock().await;
        slot.flow = FlowState::Idle;
        match result {
            Ok(ReconcileOutcome::Sale {
                transaction,
                delta,
                balance_after,
            }) => {
                tracing::info!(
                    id = ?transaction.id,
                    total = transaction.total,
                    delta,
                    "transaction completed"
                );
                slot.txn = Transaction::new(ctx.cashier.id, &ctx.cashier.name);
                slot.price_map = CustomerPriceMap::empty();
                let change = transaction.change;
                Ok(PaymentReceipt {
                    transaction,
                    delta,
                    change,
                    balance_after,
                })
            }
            Ok(_) => unreachable!("Sale operation yields Sale outcome"),
            // The unit rolled back; the pending transaction is untouched
            Err(e) => Err(e.into()),
        }
    }

    // ==================== Completed-transaction edit ====================

    /// Resolve a previously committed transaction by numeric id and load
    /// it into the active slot for editing.
    ///
    /// Only `Completed` (or still-pending) transactions are editable;
    /// anything else fails with an ineligible-for-edit error.
    pub async fn open_for_edit(
        &self,
        id: i64,
        confirm_discard: bool,
    ) -> Result<Transaction, EngineError> {
        let stored = match self.transactions.get_by_id(id).await {
            Ok(txn) => txn,
            Err(StoreError::NotFound(_)) => return Err(TxnError::NotFound(id).into()),
            Err(e) => return Err(e.into()),
        };
        match stored.status {
            TransactionStatus::Completed | TransactionStatus::Pending => {}
            _ => return Err(TxnError::NotEditable.into()),
        }

        // Pricing context for subsequent adds; existing lines keep their
        // sold prices until the customer is explicitly re-selected
        let price_map = match stored.customer_id {
            Some(customer_id) => CustomerPriceMap::for_customer(
                customer_id,
                self.customers.price_overrides(customer_id).await?,
            ),
            None => CustomerPriceMap::empty(),
        };

        let mut slot = self.slot.lock().await;
        Self::ensure_idle(&slot)?;
        if !slot.txn.is_empty() && !confirm_discard {
            return Err(TxnError::ConfirmationRequired(
                "editing discards the active transaction",
            )
            .into());
        }
        slot.price_map = price_map;
        slot.txn = stored.clone();
        tracing::info!(id, "transaction opened for edit");
        Ok(stored)
    }

    // ==================== Guards ====================

    fn ensure_idle(slot: &ActiveSlot) -> Result<(), TxnError> {
        if slot.flow != FlowState::Idle {
            return Err(TxnError::FlowInProgress);
        }
        Ok(())
    }

    fn ensure_editable(txn: &Transaction) -> Result<(), TxnError> {
        match txn.status {
            TransactionStatus::Pending | TransactionStatus::Completed => Ok(()),
            TransactionStatus::Cancelled => Err(TxnError::AlreadyCancelled(txn.local_id.clone())),
            TransactionStatus::Held => Err(TxnError::NotEditable),
        }
    }
}
