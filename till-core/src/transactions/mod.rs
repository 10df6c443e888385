//! Transaction lifecycle module
//!
//! This module owns the active transaction from first scan to drawer
//! commit:
//!
//! - **money**: decimal arithmetic and input validation
//! - **line_items**: the line-item aggregator (mutations always recompute
//!   totals before returning)
//! - **holds**: the LIFO held-transaction queue
//! - **manager**: the transaction state machine and command surface
//!
//! # Command Flow
//!
//! ```text
//! add_item / set_quantity / apply_discount
//!     └─ TransactionManager (single-writer slot)
//!            ├─ PriceResolver (effective unit price)
//!            ├─ line_items (mutate + recompute)
//!            └─ pay_cash → DrawerGateway (atomic commit) → Completed
//! ```

pub mod holds;
pub mod line_items;
pub mod manager;
pub mod money;

pub use holds::HeldQueue;
pub use manager::{PaymentReceipt, SessionContext, TotalsView, TransactionManager, VoidOutcome};

use thiserror::Error;

/// Errors raised by transaction commands
#[derive(Debug, Error)]
pub enum TxnError {
    #[error("transaction not found: {0}")]
    NotFound(i64),

    #[error("transaction {0} has already been completed")]
    AlreadyCompleted(String),

    #[error("transaction {0} has already been cancelled")]
    AlreadyCancelled(String),

    #[error("transaction has no items")]
    Empty,

    #[error("transaction is not eligible for edit")]
    NotEditable,

    #[error("line item not found: {0}")]
    LineNotFound(String),

    #[error("no held transactions")]
    NothingHeld,

    #[error("confirmation required: {0}")]
    ConfirmationRequired(&'static str),

    #[error("another operation is in progress")]
    FlowInProgress,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("customer not found: {0}")]
    CustomerNotFound(i64),

    #[error("product not found: {0}")]
    ProductNotFound(String),
}

impl TxnError {
    /// Map to the unified error code surfaced to the presentation layer
    pub fn error_code(&self) -> shared::ErrorCode {
        use shared::ErrorCode;
        match self {
            Self::NotFound(_) => ErrorCode::TransactionNotFound,
            Self::AlreadyCompleted(_) => ErrorCode::TransactionAlreadyCompleted,
            Self::AlreadyCancelled(_) => ErrorCode::TransactionAlreadyCancelled,
            Self::Empty => ErrorCode::TransactionEmpty,
            Self::NotEditable => ErrorCode::TransactionNotEditable,
            Self::LineNotFound(_) => ErrorCode::LineNotFound,
            Self::NothingHeld => ErrorCode::NothingHeld,
            Self::ConfirmationRequired(_) => ErrorCode::ConfirmationRequired,
            Self::FlowInProgress => ErrorCode::FlowInProgress,
            Self::InvalidValue(_) => ErrorCode::ValidationFailed,
            Self::CustomerNotFound(_) => ErrorCode::CustomerNotFound,
            Self::ProductNotFound(_) => ErrorCode::ProductNotFound,
        }
    }
}
