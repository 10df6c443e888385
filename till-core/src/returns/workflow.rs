//! Return/refund workflow
//!
//! Resolves an original transaction by numeric id, validates the selected
//! return quantities against what is still returnable, and hands the
//! commit to the drawer gateway. Quantities are clamped rather than
//! rejected — duplicate submissions from concurrent terminals are
//! expected — and the clamp is enforced again inside the atomic unit, so
//! `already_returned` can never pass the original quantity.

use std::sync::Arc;

use thiserror::Error;

use shared::transaction::{
    AppliedReturnLine, ReturnSelection, Transaction, TransactionStatus,
};

use crate::drawer::{DrawerError, DrawerGateway, DrawerOperation, ReconcileOutcome};
use crate::session::SessionContext;
use crate::stores::{StoreError, TransactionStore};

/// Errors raised by the return workflow
#[derive(Debug, Error)]
pub enum ReturnError {
    #[error("transaction not found: {0}")]
    NotFound(i64),

    #[error("transaction {0} is not eligible for return")]
    NotEligible(i64),

    #[error("returns against a return are not supported")]
    ReturnOfReturn,

    #[error("no items selected for return")]
    EmptySelection,

    #[error("nothing remained to return")]
    NothingRemaining,

    #[error(transparent)]
    Drawer(DrawerError),
}

impl ReturnError {
    /// Map to the unified error code surfaced to the presentation layer
    pub fn error_code(&self) -> shared::ErrorCode {
        use shared::ErrorCode;
        match self {
            Self::NotFound(_) => ErrorCode::TransactionNotFound,
            Self::NotEligible(_) => ErrorCode::ReturnNotEligible,
            Self::ReturnOfReturn => ErrorCode::ReturnOfReturn,
            Self::EmptySelection => ErrorCode::ReturnEmptySelection,
            Self::NothingRemaining => ErrorCode::ReturnQuantityExceeded,
            Self::Drawer(e) => e.error_code(),
        }
    }
}

impl From<DrawerError> for ReturnError {
    fn from(e: DrawerError) -> Self {
        match e {
            DrawerError::NothingToReturn => Self::NothingRemaining,
            other => Self::Drawer(other),
        }
    }
}

/// An original transaction prepared for return selection
#[derive(Debug, Clone)]
pub struct ReturnableTransaction {
    pub transaction: Transaction,
    /// One selection per original line, quantity-to-return preset to 0
    /// and bounded by what is still returnable
    pub lines: Vec<ReturnSelection>,
}

/// A committed return
#[derive(Debug, Clone)]
pub struct ReturnReceipt {
    pub original_id: i64,
    pub applied: Vec<AppliedReturnLine>,
    pub refund: f64,
    pub balance_after: f64,
}

/// Return/refund workflow over the transaction store and drawer gateway
pub struct ReturnWorkflow {
    transactions: Arc<dyn TransactionStore>,
    gateway: Arc<DrawerGateway>,
}

impl std::fmt::Debug for ReturnWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnWorkflow").finish()
    }
}

impl ReturnWorkflow {
    pub fn new(transactions: Arc<dyn TransactionStore>, gateway: Arc<DrawerGateway>) -> Self {
        Self {
            transactions,
            gateway,
        }
    }

    /// Resolve an original transaction and prepare its return selections.
    ///
    /// Only `Completed` transactions are eligible; a transaction that
    /// itself contains return lines is rejected outright.
    pub async fn lookup_for_return(&self, id: i64) -> Result<ReturnableTransaction, ReturnError> {
        let transaction = self.fetch(id).await?;
        Self::ensure_eligible(&transaction)?;

        let lines = transaction
            .items
            .iter()
            .map(|line| ReturnSelection {
                line_id: line.line_id.clone(),
                product_id: line.product_id,
                original_quantity: line.quantity,
                already_returned: line.already_returned,
                quantity_to_return: 0,
                unit_price: line.unit_price,
                reason: None,
            })
            .collect();

        Ok(ReturnableTransaction { transaction, lines })
    }

    /// Submit a return. Selections are re-based on fresh committed state,
    /// clamped, and committed through the drawer gateway.
    pub async fn submit_return(
        &self,
        ctx: &SessionContext,
        original_id: i64,
        selections: Vec<ReturnSelection>,
    ) -> Result<ReturnReceipt, ReturnError> {
        if selections.iter().all(|s| s.quantity_to_return <= 0) {
            return Err(ReturnError::EmptySelection);
        }

        // Re-verify against committed state at submit time; the store
        // clamps once more inside the unit of work.
        let original = self.fetch(original_id).await?;
        Self::ensure_eligible(&original)?;

        let mut clamped = Vec::with_capacity(selections.len());
        for mut sel in selections {
            let Some(line) = original.line(&sel.line_id) else {
                return Err(ReturnError::NotFound(original_id));
            };
            sel.original_quantity = line.quantity;
            sel.already_returned = line.already_returned;
            let requested = sel.quantity_to_return;
            sel.quantity_to_return = sel.clamped_quantity();
            if sel.quantity_to_return != requested {
                tracing::warn!(
                    line_id = %sel.line_id,
                    requested,
                    clamped = sel.quantity_to_return,
                    "return quantity clamped to remaining returnable"
                );
            }
            sel.unit_price = line.unit_price;
            clamped.push(sel);
        }

        let outcome = self
            .gateway
            .reconcile(
                ctx,
                DrawerOperation::Return {
                    original_id,
                    selections: clamped,
                },
            )
            .await?;

        let ReconcileOutcome::Return {
            original_id,
            applied,
            refund,
            balance_after,
        } = outcome
        else {
            unreachable!("Return operation yields Return outcome");
        };

        tracing::info!(original_id, refund, "return committed");
        Ok(ReturnReceipt {
            original_id,
            applied,
            refund,
            balance_after,
        })
    }

    /// Refund everything still returnable on the original transaction,
    /// in one submission
    pub async fn submit_refund(
        &self,
        ctx: &SessionContext,
        original_id: i64,
    ) -> Result<ReturnReceipt, ReturnError> {
        let returnable = self.lookup_for_return(original_id).await?;
        let selections: Vec<ReturnSelection> = returnable
            .lines
            .into_iter()
            .map(|mut sel| {
                sel.quantity_to_return = sel.remaining_returnable();
                sel
            })
            .filter(|sel| sel.quantity_to_return > 0)
            .collect();
        if selections.is_empty() {
            return Err(ReturnError::NothingRemaining);
        }
        self.submit_return(ctx, original_id, selections).await
    }

    async fn fetch(&self, id: i64) -> Result<Transaction, ReturnError> {
        match self.transactions.get_by_id(id).await {
            Ok(txn) => Ok(txn),
            Err(StoreError::NotFound(_)) => Err(ReturnError::NotFound(id)),
            Err(e) => Err(ReturnError::Drawer(DrawerError::Store(e))),
        }
    }

    fn ensure_eligible(txn: &Transaction) -> Result<(), ReturnError> {
        let id = txn.id.unwrap_or_default();
        if txn.status != TransactionStatus::Completed {
            return Err(ReturnError::NotEligible(id));
        }
        if txn.has_return_lines() {
            return Err(ReturnError::ReturnOfReturn);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStore;
    use shared::models::Cashier;
    use shared::transaction::{LineItem, LineKind};

    fn ctx() -> SessionContext {
        SessionContext::new(Cashier::new(1, "Test Cashier"), "till-1")
    }

    fn line(line_id: &str, quantity: i32, unit_price: f64, already_returned: i32) -> LineItem {
        LineItem {
            line_id: line_id.to_string(),
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
            already_returned,
            note: None,
        }
    }

    fn completed_txn(lines: Vec<LineItem>) -> Transaction {
        let mut txn = Transaction::new(1, "Test Cashier");
        txn.status = TransactionStatus::Completed;
        txn.items = lines;
        txn
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        workflow: ReturnWorkflow,
    }

    async fn fixture_with_drawer() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(DrawerGateway::new(
            store.clone(),
            store.clone(),
            store.clone(),
            None,
        ));
        gateway
            .reconcile(&ctx(), DrawerOperation::Open { opening_float: 100.0 })
            .await
            .unwrap();
        let workflow = ReturnWorkflow::new(store.clone(), gateway);
        Fixture { store, workflow }
    }

    fn selection(line_id: &str, quantity_to_return: i32) -> ReturnSelection {
        ReturnSelection {
            line_id: line_id.to_string(),
            product_id: 1,
            original_quantity: 0,
            already_returned: 0,
            quantity_to_return,
            unit_price: 0.0,
            reason: Some("damaged".to_string()),
        }
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let f = fixture_with_drawer().await;
        assert!(matches!(
            f.workflow.lookup_for_return(42).await,
            Err(ReturnError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_lookup_requires_completed_status() {
        let f = fixture_with_drawer().await;
        let mut txn = completed_txn(vec![line("line-1", 2, 10.0, 0)]);
        txn.status = TransactionStatus::Cancelled;
        let id = f.store.seed_transaction(txn);

        assert!(matches!(
            f.workflow.lookup_for_return(id).await,
            Err(ReturnError::NotEligible(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_rejects_return_of_return() {
        let f = fixture_with_drawer().await;
        let mut refund_line = line("line-1", 2, 10.0, 0);
        refund_line.kind = LineKind::Return;
        let id = f.store.seed_transaction(completed_txn(vec![refund_line]));

        assert!(matches!(
            f.workflow.lookup_for_return(id).await,
            Err(ReturnError::ReturnOfReturn)
        ));
    }

    #[tokio::test]
    async fn test_lookup_prefills_selections() {
        let f = fixture_with_drawer().await;
        let id = f
            .store
            .seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 2)]));

        let returnable = f.workflow.lookup_for_return(id).await.unwrap();
        assert_eq!(returnable.lines.len(), 1);
        let sel = &returnable.lines[0];
        assert_eq!(sel.original_quantity, 5);
        assert_eq!(sel.already_returned, 2);
        assert_eq!(sel.quantity_to_return, 0);
        assert_eq!(sel.remaining_returnable(), 3);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_selection() {
        let f = fixture_with_drawer().await;
        let id = f
            .store
            .seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 0)]));

        let err = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnError::EmptySelection));
    }

    #[tokio::test]
    async fn test_submit_clamps_and_refunds() {
        let f = fixture_with_drawer().await;
        // original 5, already returned 2; operator asks for 4
        let id = f
            .store
            .seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 2)]));

        let receipt = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 4)])
            .await
            .unwrap();

        // Clamped to the remaining 3, refund 3 x 10
        assert_eq!(receipt.applied[0].quantity, 3);
        assert_eq!(receipt.refund, 30.0);
        assert_eq!(receipt.balance_after, 70.0);
        assert_eq!(f.store.drawer_balance(), Some(70.0));

        let original = f.store.get_by_id(id).await.unwrap();
        assert_eq!(original.items[0].already_returned, 5);
    }

    #[tokio::test]
    async fn test_second_submission_clamped_to_remainder() {
        let f = fixture_with_drawer().await;
        let id = f
            .store
            .seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 0)]));

        let first = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 4)])
            .await
            .unwrap();
        assert_eq!(first.refund, 40.0);

        // Duplicate submission: only 1 remains
        let second = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 4)])
            .await
            .unwrap();
        assert_eq!(second.applied[0].quantity, 1);
        assert_eq!(second.refund, 10.0);

        // Exhausted now
        let third = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 4)])
            .await
            .unwrap_err();
        assert!(matches!(third, ReturnError::NothingRemaining));

        let original = f.store.get_by_id(id).await.unwrap();
        assert_eq!(original.items[0].already_returned, 5);
    }

    #[tokio::test]
    async fn test_full_refund_returns_everything_remaining() {
        let f = fixture_with_drawer().await;
        let id = f.store.seed_transaction(completed_txn(vec![
            line("line-1", 2, 10.0, 0),
            line("line-2", 1, 4.0, 1),
        ]));

        let receipt = f.workflow.submit_refund(&ctx(), id).await.unwrap();
        // line-2 is already fully returned; only line-1 refunds
        assert_eq!(receipt.refund, 20.0);
        assert_eq!(f.store.drawer_balance(), Some(80.0));

        let err = f.workflow.submit_refund(&ctx(), id).await.unwrap_err();
        assert!(matches!(err, ReturnError::NothingRemaining));
    }

    #[tokio::test]
    async fn test_submit_requires_open_drawer() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(DrawerGateway::new(
            store.clone(),
            store.clone(),
            store.clone(),
            None,
        ));
        let workflow = ReturnWorkflow::new(store.clone(), gateway);
        let id = store.seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 0)]));

        let err = workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnError::Drawer(DrawerError::NotOpen)));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_return_state() {
        let f = fixture_with_drawer().await;
        let id = f
            .store
            .seed_transaction(completed_txn(vec![line("line-1", 5, 10.0, 0)]));

        f.store.fail_next_commit();
        let err = f
            .workflow
            .submit_return(&ctx(), id, vec![selection("line-1", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, ReturnError::Drawer(DrawerError::Store(_))));

        // Neither the counter nor the balance moved
        let original = f.store.get_by_id(id).await.unwrap();
        assert_eq!(original.items[0].already_returned, 0);
        assert_eq!(f.store.drawer_balance(), Some(100.0));
    }
}
