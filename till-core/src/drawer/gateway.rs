//! Drawer reconciliation gateway
//!
//! The single path by which any cash-affecting operation touches the
//! drawer balance: cash sale, return refund, manual cash in/out, drawer
//! open and close. The gateway wraps the domain persistence and the
//! balance delta in one unit of work; both commit or both roll back,
//! with no observable intermediate state.
//!
//! # Commit Flow
//!
//! ```text
//! reconcile(ctx, op)
//!     ├─ 1. Validate inputs (before any persistence work)
//!     ├─ 2. Acquire commit lock (serializes balance mutations)
//!     ├─ 3. Guard: drawer open (or none, for the open op itself)
//!     ├─ 4. Begin unit of work
//!     ├─ 5. Stage domain persist + balance delta
//!     ├─ 6. Commit (any error → rollback, state untouched)
//!     ├─ 7. Broadcast CashMovement (only after commit)
//!     └─ 8. Best-effort receipt print (failure logged, never raised)
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;

use shared::models::Drawer;
use shared::transaction::{
    AppliedReturnLine, CashMovement, MovementKind, ReturnSelection, Transaction,
};

use crate::session::SessionContext;
use crate::stores::{
    DrawerStore, ReceiptPrinter, StoreError, TransactionStore, UnitOfWork, UowHandle,
};
use crate::transactions::money;

/// Movement broadcast capacity (a shift produces far fewer)
const MOVEMENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors raised by the reconciliation gateway
#[derive(Debug, Error)]
pub enum DrawerError {
    #[error("no active cash drawer")]
    NotOpen,

    #[error("a cash drawer is already open")]
    AlreadyOpen,

    #[error("invalid cash amount: {0}")]
    InvalidAmount(String),

    #[error("transaction has no items")]
    EmptyTransaction,

    #[error("nothing remained to return")]
    NothingToReturn,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DrawerError {
    /// Map to the unified error code surfaced to the presentation layer
    pub fn error_code(&self) -> shared::ErrorCode {
        use shared::ErrorCode;
        match self {
            Self::NotOpen => ErrorCode::DrawerNotOpen,
            Self::AlreadyOpen => ErrorCode::DrawerAlreadyOpen,
            Self::InvalidAmount(_) => ErrorCode::InvalidCashAmount,
            Self::EmptyTransaction => ErrorCode::TransactionEmpty,
            Self::NothingToReturn => ErrorCode::ReturnQuantityExceeded,
            Self::Store(_) => ErrorCode::PersistenceFailed,
        }
    }
}

/// A balance-affecting operation
#[derive(Debug, Clone)]
pub enum DrawerOperation {
    /// Persist a cash sale and move the balance by the not-yet-committed
    /// part of its total
    Sale { transaction: Transaction },
    /// Apply a return against an original transaction and refund the
    /// applied amount from the drawer
    Return {
        original_id: i64,
        selections: Vec<ReturnSelection>,
    },
    CashIn { amount: f64, reason: String },
    CashOut { amount: f64, reason: String },
    Open { opening_float: f64 },
    Close {
        counted_cash: f64,
        note: Option<String>,
    },
}

/// What a successful reconciliation produced
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Sale {
        /// The persisted transaction, id assigned
        transaction: Transaction,
        /// Balance movement for this commit (0 for an unchanged re-commit)
        delta: f64,
        balance_after: f64,
    },
    Return {
        original_id: i64,
        applied: Vec<AppliedReturnLine>,
        refund: f64,
        balance_after: f64,
    },
    CashMoved {
        kind: MovementKind,
        amount: f64,
        balance_after: f64,
    },
    Opened { drawer: Drawer },
    Closed { drawer: Drawer },
}

/// Staged results carried from the unit of work to the post-commit steps
struct Staged {
    outcome: ReconcileOutcome,
    movement: CashMovement,
    print: Option<PrintJob>,
}

enum PrintJob {
    Sale(Transaction),
    Refund {
        original_id: i64,
        lines: Vec<AppliedReturnLine>,
    },
}

/// Single synchronized entry point for drawer balance changes
pub struct DrawerGateway {
    drawers: Arc<dyn DrawerStore>,
    transactions: Arc<dyn TransactionStore>,
    uow: Arc<dyn UnitOfWork>,
    printer: Option<Arc<dyn ReceiptPrinter>>,
    movement_tx: broadcast::Sender<CashMovement>,
    /// Serializes balance-affecting operations across the terminal
    commit_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DrawerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawerGateway")
            .field("printer", &self.printer.is_some())
            .finish()
    }
}

impl DrawerGateway {
    pub fn new(
        drawers: Arc<dyn DrawerStore>,
        transactions: Arc<dyn TransactionStore>,
        uow: Arc<dyn UnitOfWork>,
        printer: Option<Arc<dyn ReceiptPrinter>>,
    ) -> Self {
        let (movement_tx, _) = broadcast::channel(MOVEMENT_CHANNEL_CAPACITY);
        Self {
            drawers,
            transactions,
            uow,
            printer,
            movement_tx,
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Subscribe to committed cash movements (live dashboard, reports)
    pub fn subscribe(&self) -> broadcast::Receiver<CashMovement> {
        self.movement_tx.subscribe()
    }

    /// The currently open drawer, if any
    pub async fn current_drawer(&self) -> Result<Option<Drawer>, DrawerError> {
        Ok(self.drawers.current_open().await?)
    }

    /// Reconcile one cash-affecting operation against the drawer
    pub async fn reconcile(
        &self,
        ctx: &SessionContext,
        op: DrawerOperation,
    ) -> Result<ReconcileOutcome, DrawerError> {
        validate_op(&op)?;

        let _guard = self.commit_lock.lock().await;

        // Fail fast before any persistence work begins
        let drawer = self.drawers.current_open().await?;
        let drawer = match (&op, drawer) {
            (DrawerOperation::Open { .. }, Some(_)) => return Err(DrawerError::AlreadyOpen),
            (DrawerOperation::Open { .. }, None) => None,
            (_, None) => return Err(DrawerError::NotOpen),
            (_, Some(d)) => Some(d),
        };

        let handle = self.uow.begin().await?;
        let staged = match self.stage(&handle, ctx, drawer.as_ref(), op).await {
            Ok(staged) => staged,
            Err(e) => {
                self.rollback_quietly(handle).await;
                return Err(e);
            }
        };

        // A failed commit leaves no partial state behind; the unit is
        // discarded by the store.
        self.uow.commit(handle).await?;

        // Publication strictly after the atomic unit commits
        let _ = self.movement_tx.send(staged.movement.clone());
        tracing::info!(
            kind = ?staged.movement.kind,
            amount = staged.movement.amount,
            reference = %staged.movement.reference,
            balance_after = staged.movement.balance_after,
            "drawer movement committed"
        );

        if let Some(job) = staged.print {
            self.print_best_effort(job).await;
        }

        Ok(staged.outcome)
    }

    /// Stage the domain persistence and the balance delta under `handle`
    async fn stage(
        &self,
        handle: &UowHandle,
        ctx: &SessionContext,
        drawer: Option<&Drawer>,
        op: DrawerOperation,
    ) -> Result<Staged, DrawerError> {
        let now = chrono::Utc::now().timestamp_millis();
        match op {
            DrawerOperation::Sale { transaction } => {
                let drawer = drawer.expect("guarded above");
                let previously = transaction.committed_total.unwrap_or(0.0);
                let delta = money::to_f64(
                    money::to_decimal(transaction.total) - money::to_decimal(previously),
                );

                let mut to_persist = transaction;
                to_persist.committed_total = Some(to_persist.total);
                let id = self.transactions.persist(handle, &to_persist).await?;
                to_persist.id = Some(id);

                let balance_after = if delta != 0.0 {
                    self.drawers
                        .apply_delta(handle, drawer.id, delta, MovementKind::Sale, &id.to_string())
                        .await?
                } else {
                    drawer.balance
                };

                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::Sale,
                        amount: delta,
                        reference: id.to_string(),
                        drawer_id: drawer.id,
                        balance_after,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: Some(PrintJob::Sale(to_persist.clone())),
                    outcome: ReconcileOutcome::Sale {
                        transaction: to_persist,
                        delta,
                        balance_after,
                    },
                })
            }

            DrawerOperation::Return {
                original_id,
                selections,
            } => {
                let drawer = drawer.expect("guarded above");
                let applied = self
                    .transactions
                    .apply_return(handle, original_id, &selections)
                    .await?;
                let refund = money::to_f64(
                    applied
                        .iter()
                        .map(|l| money::to_decimal(l.refund))
                        .sum::<rust_decimal::Decimal>(),
                );
                if refund <= 0.0 {
                    // Concurrent submissions consumed the remainder first
                    return Err(DrawerError::NothingToReturn);
                }

                let balance_after = self
                    .drawers
                    .apply_delta(
                        handle,
                        drawer.id,
                        -refund,
                        MovementKind::Return,
                        &original_id.to_string(),
                    )
                    .await?;

                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::Return,
                        amount: -refund,
                        reference: original_id.to_string(),
                        drawer_id: drawer.id,
                        balance_after,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: Some(PrintJob::Refund {
                        original_id,
                        lines: applied.clone(),
                    }),
                    outcome: ReconcileOutcome::Return {
                        original_id,
                        applied,
                        refund,
                        balance_after,
                    },
                })
            }

            DrawerOperation::CashIn { amount, reason } => {
                let drawer = drawer.expect("guarded above");
                let balance_after = self
                    .drawers
                    .apply_delta(handle, drawer.id, amount, MovementKind::CashIn, &reason)
                    .await?;
                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::CashIn,
                        amount,
                        reference: reason,
                        drawer_id: drawer.id,
                        balance_after,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: None,
                    outcome: ReconcileOutcome::CashMoved {
                        kind: MovementKind::CashIn,
                        amount,
                        balance_after,
                    },
                })
            }

            DrawerOperation::CashOut { amount, reason } => {
                let drawer = drawer.expect("guarded above");
                let balance_after = self
                    .drawers
                    .apply_delta(handle, drawer.id, -amount, MovementKind::CashOut, &reason)
                    .await?;
                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::CashOut,
                        amount: -amount,
                        reference: reason,
                        drawer_id: drawer.id,
                        balance_after,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: None,
                    outcome: ReconcileOutcome::CashMoved {
                        kind: MovementKind::CashOut,
                        amount: -amount,
                        balance_after,
                    },
                })
            }

            DrawerOperation::Open { opening_float } => {
                let drawer = self
                    .drawers
                    .open(handle, ctx.cashier.id, opening_float)
                    .await?;
                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::Open,
                        amount: opening_float,
                        reference: "open".to_string(),
                        drawer_id: drawer.id,
                        balance_after: drawer.balance,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: None,
                    outcome: ReconcileOutcome::Opened { drawer },
                })
            }

            DrawerOperation::Close { counted_cash, note } => {
                let drawer = drawer.expect("guarded above");
                let closed = self
                    .drawers
                    .close(handle, drawer.id, counted_cash, note)
                    .await?;
                Ok(Staged {
                    movement: CashMovement {
                        kind: MovementKind::Close,
                        amount: closed.variance.unwrap_or(0.0),
                        reference: "close".to_string(),
                        drawer_id: closed.id,
                        balance_after: closed.balance,
                        cashier_id: ctx.cashier.id,
                        at: now,
                    },
                    print: None,
                    outcome: ReconcileOutcome::Closed { drawer: closed },
                })
            }
        }
    }

    async fn rollback_quietly(&self, handle: UowHandle) {
        if let Err(e) = self.uow.rollback(handle).await {
            tracing::error!(error = %e, "rollback failed after staging error");
        }
    }

    async fn print_best_effort(&self, job: PrintJob) {
        let Some(printer) = &self.printer else {
            return;
        };
        let result = match &job {
            PrintJob::Sale(txn) => printer.print_sale(txn).await,
            PrintJob::Refund { original_id, lines } => {
                printer.print_refund(*original_id, lines).await
            }
        };
        if let Err(e) = result {
            // Best-effort: a failed print never surfaces as a
            // transaction failure
            tracing::warn!(error = %e, "receipt print failed");
        }
    }
}

/// Input validation, before any lock or persistence work
fn validate_op(op: &DrawerOperation) -> Result<(), DrawerError> {
    let check_amount = |amount: f64| {
        money::validate_cash_amount(amount).map_err(|e| DrawerError::InvalidAmount(e.to_string()))
    };
    match op {
        DrawerOperation::Sale { transaction } => {
            if transaction.is_empty() {
                return Err(DrawerError::EmptyTransaction);
            }
            Ok(())
        }
        DrawerOperation::Return { .. } => Ok(()),
        DrawerOperation::CashIn { amount, .. } | DrawerOperation::CashOut { amount, .. } => {
            check_amount(*amount)
        }
        DrawerOperation::Open { opening_float } => {
            if !opening_float.is_finite() || *opening_float < 0.0 {
                return Err(DrawerError::InvalidAmount(format!(
                    "opening float must be non-negative, got {}",
                    opening_float
                )));
            }
            Ok(())
        }
        DrawerOperation::Close { counted_cash, .. } => {
            if !counted_cash.is_finite() || *counted_cash < 0.0 {
                return Err(DrawerError::InvalidAmount(format!(
                    "counted cash must be non-negative, got {}",
                    counted_cash
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStore;
    use crate::stores::PrintError;
    use async_trait::async_trait;
    use shared::models::Cashier;
    use shared::transaction::{LineItem, LineKind, TransactionStatus};

    fn ctx() -> SessionContext {
        SessionContext::new(Cashier::new(1, "Test Cashier"), "till-1")
    }

    fn sale_txn(total: f64) -> Transaction {
        let mut txn = Transaction::new(1, "Test Cashier");
        txn.items.push(LineItem {
            line_id: "line-1".to_string(),
            product_id: 1,
            name: "Test".to_string(),
            barcode: None,
            kind: LineKind::Sale,
            quantity: 1,
            unit_price: total,
            base_price: total,
            purchase_price: total * 0.5,
            tax_rate: 0,
            line_total: total,
            already_returned: 0,
            note: None,
        });
        txn.subtotal = total;
        txn.total = total;
        txn.item_count = 1;
        txn.status = TransactionStatus::Completed;
        txn
    }

    fn gateway(store: &Arc<MemoryStore>) -> DrawerGateway {
        DrawerGateway::new(store.clone(), store.clone(), store.clone(), None)
    }

    async fn open_drawer(gateway: &DrawerGateway, opening_float: f64) -> Drawer {
        match gateway
            .reconcile(&ctx(), DrawerOperation::Open { opening_float })
            .await
            .unwrap()
        {
            ReconcileOutcome::Opened { drawer } => drawer,
            other => panic!("expected Opened, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ops_fail_fast_without_open_drawer() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);

        let err = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::CashIn {
                    amount: 10.0,
                    reason: "float".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DrawerError::NotOpen));

        let err = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Sale {
                    transaction: sale_txn(15.0),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DrawerError::NotOpen));
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        let err = gateway
            .reconcile(&ctx(), DrawerOperation::Open { opening_float: 50.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, DrawerError::AlreadyOpen));
    }

    #[tokio::test]
    async fn test_cash_sale_moves_balance_and_persists_together() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        let outcome = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Sale {
                    transaction: sale_txn(15.0),
                },
            )
            .await
            .unwrap();

        let ReconcileOutcome::Sale {
            transaction,
            delta,
            balance_after,
        } = outcome
        else {
            panic!("expected Sale outcome");
        };
        assert_eq!(delta, 15.0);
        assert_eq!(balance_after, 115.0);
        assert_eq!(store.drawer_balance(), Some(115.0));

        let id = transaction.id.unwrap();
        let persisted = store.get_by_id(id).await.unwrap();
        assert_eq!(persisted.committed_total, Some(15.0));
    }

    #[tokio::test]
    async fn test_recommit_moves_balance_by_difference_only() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        let outcome = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Sale {
                    transaction: sale_txn(15.0),
                },
            )
            .await
            .unwrap();
        let ReconcileOutcome::Sale { mut transaction, .. } = outcome else {
            panic!("expected Sale outcome");
        };

        // Edited after completion: total goes from 15 to 20
        transaction.items[0].unit_price = 20.0;
        transaction.items[0].line_total = 20.0;
        transaction.subtotal = 20.0;
        transaction.total = 20.0;

        let outcome = gateway
            .reconcile(&ctx(), DrawerOperation::Sale { transaction })
            .await
            .unwrap();
        let ReconcileOutcome::Sale { delta, balance_after, .. } = outcome else {
            panic!("expected Sale outcome");
        };
        assert_eq!(delta, 5.0);
        assert_eq!(balance_after, 120.0);
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back_balance() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        store.fail_next_persist();
        let err = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Sale {
                    transaction: sale_txn(15.0),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DrawerError::Store(_)));
        assert_eq!(store.drawer_balance(), Some(100.0));
    }

    #[tokio::test]
    async fn test_movement_published_only_after_commit() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        let mut movements = gateway.subscribe();

        store.fail_next_commit();
        let _ = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::CashIn {
                    amount: 10.0,
                    reason: "float".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(movements.try_recv().is_err());
        assert_eq!(store.drawer_balance(), Some(100.0));

        gateway
            .reconcile(
                &ctx(),
                DrawerOperation::CashIn {
                    amount: 10.0,
                    reason: "float".to_string(),
                },
            )
            .await
            .unwrap();
        let movement = movements.try_recv().unwrap();
        assert_eq!(movement.kind, MovementKind::CashIn);
        assert_eq!(movement.amount, 10.0);
        assert_eq!(movement.balance_after, 110.0);
    }

    #[tokio::test]
    async fn test_cash_out_and_invalid_amounts() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        gateway
            .reconcile(
                &ctx(),
                DrawerOperation::CashOut {
                    amount: 30.0,
                    reason: "bank drop".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.drawer_balance(), Some(70.0));

        for amount in [0.0, -5.0, f64::NAN] {
            let err = gateway
                .reconcile(
                    &ctx(),
                    DrawerOperation::CashIn {
                        amount,
                        reason: "bad".to_string(),
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, DrawerError::InvalidAmount(_)));
        }
    }

    #[tokio::test]
    async fn test_close_computes_variance() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(&store);
        open_drawer(&gateway, 100.0).await;

        let outcome = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Close {
                    counted_cash: 97.5,
                    note: None,
                },
            )
            .await
            .unwrap();
        let ReconcileOutcome::Closed { drawer } = outcome else {
            panic!("expected Closed outcome");
        };
        assert_eq!(drawer.variance, Some(-2.5));
        assert!(!drawer.is_open());
        assert!(gateway.current_drawer().await.unwrap().is_none());
    }

    struct BrokenPrinter;

    #[async_trait]
    impl ReceiptPrinter for BrokenPrinter {
        async fn print_sale(&self, _txn: &Transaction) -> Result<(), PrintError> {
            Err(PrintError("out of paper".to_string()))
        }

        async fn print_refund(
            &self,
            _original_id: i64,
            _lines: &[AppliedReturnLine],
        ) -> Result<(), PrintError> {
            Err(PrintError("out of paper".to_string()))
        }
    }

    #[tokio::test]
    async fn test_print_failure_does_not_fail_the_sale() {
        let store = Arc::new(MemoryStore::new());
        let gateway = DrawerGateway::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Some(Arc::new(BrokenPrinter)),
        );
        open_drawer(&gateway, 100.0).await;

        let outcome = gateway
            .reconcile(
                &ctx(),
                DrawerOperation::Sale {
                    transaction: sale_txn(15.0),
                },
            )
            .await;
        assert!(outcome.is_ok());
        assert_eq!(store.drawer_balance(), Some(115.0));
    }
}
