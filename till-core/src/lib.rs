//! Till engine - transaction lifecycle and cash-drawer reconciliation
//!
//! The engine a point-of-sale UI drives and a persistence layer is
//! called by:
//!
//! - **transactions**: active-transaction state machine, line-item
//!   aggregation, held queue
//! - **pricing**: customer-specific price resolution
//! - **drawer**: the single reconciliation gateway for every
//!   cash-affecting commit
//! - **returns**: return/refund workflow against completed transactions
//! - **lookup**: debounced, cancellable customer and transaction lookups
//! - **stores**: the collaborator contracts everything above consumes

pub mod config;
pub mod drawer;
pub mod logging;
pub mod lookup;
pub mod pricing;
pub mod returns;
pub mod session;
pub mod stores;
pub mod transactions;

pub use config::EngineConfig;
pub use drawer::{DrawerError, DrawerGateway, DrawerOperation, ReconcileOutcome};
pub use lookup::{CustomerSearch, LookupError, TransactionLookup};
pub use returns::{ReturnError, ReturnReceipt, ReturnWorkflow};
pub use session::SessionContext;
pub use stores::{StoreError, UowHandle};
pub use transactions::{PaymentReceipt, TotalsView, TransactionManager, TxnError, VoidOutcome};

use shared::error::AppError;
use thiserror::Error;

/// Aggregate error for commands that cross subsystem boundaries
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Txn(#[from] transactions::TxnError),

    #[error(transparent)]
    Drawer(#[from] drawer::DrawerError),

    #[error(transparent)]
    Return(#[from] returns::ReturnError),

    #[error(transparent)]
    Store(#[from] stores::StoreError),
}

impl EngineError {
    /// Map to the unified error code surfaced to the presentation layer
    pub fn error_code(&self) -> shared::ErrorCode {
        match self {
            Self::Txn(e) => e.error_code(),
            Self::Drawer(e) => e.error_code(),
            Self::Return(e) => e.error_code(),
            Self::Store(_) => shared::ErrorCode::PersistenceFailed,
        }
    }

    /// Convert into the [`AppError`] shown at the command boundary
    pub fn to_app_error(&self) -> AppError {
        AppError::with_message(self.error_code(), self.to_string())
    }
}
