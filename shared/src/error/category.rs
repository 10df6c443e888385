//! Error category and handling-policy classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Transaction errors
/// - 2xxx: Drawer errors
/// - 3xxx: Return errors
/// - 4xxx: Lookup errors
/// - 5xxx: Catalog/customer errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Transaction errors (1xxx)
    Transaction,
    /// Drawer errors (2xxx)
    Drawer,
    /// Return errors (3xxx)
    Return,
    /// Lookup errors (4xxx)
    Lookup,
    /// Catalog/customer errors (5xxx)
    Catalog,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Transaction,
            2000..3000 => Self::Drawer,
            3000..4000 => Self::Return,
            4000..5000 => Self::Lookup,
            5000..6000 => Self::Catalog,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Transaction => "transaction",
            Self::Drawer => "drawer",
            Self::Return => "return",
            Self::Lookup => "lookup",
            Self::Catalog => "catalog",
            Self::System => "system",
        }
    }
}

/// Handling-policy classification
///
/// Determines what the command boundary does with an error:
/// - `Validation`: bad input, recoverable locally, no side effect happened
/// - `Precondition`: state does not permit the operation, same treatment
/// - `Persistence`: a store/commit failure after which the unit of work
///   was rolled back; the in-memory state is preserved for retry
/// - `Internal`: unexpected failure, surfaced as-is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Precondition,
    Persistence,
    Internal,
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }

    /// Get the handling-policy classification for this error code
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::InvalidFormat
            | Self::ValueOutOfRange
            | Self::ReturnEmptySelection
            | Self::LookupNotNumeric
            | Self::InvalidCashAmount => ErrorKind::Validation,

            Self::NotFound
            | Self::TransactionNotFound
            | Self::TransactionAlreadyCompleted
            | Self::TransactionAlreadyCancelled
            | Self::TransactionEmpty
            | Self::TransactionNotEditable
            | Self::LineNotFound
            | Self::NothingHeld
            | Self::ConfirmationRequired
            | Self::FlowInProgress
            | Self::DrawerNotOpen
            | Self::DrawerAlreadyOpen
            | Self::ReturnNotEligible
            | Self::ReturnQuantityExceeded
            | Self::ReturnOfReturn
            | Self::LookupSuperseded
            | Self::ProductNotFound
            | Self::CustomerNotFound => ErrorKind::Precondition,

            Self::PersistenceFailed | Self::UnitOfWorkRolledBack => ErrorKind::Persistence,

            Self::Success | Self::Unknown | Self::InternalError => ErrorKind::Internal,
        }
    }
}
