//! Unified error codes for the Till engine
//!
//! Error codes are shared between the engine and any frontend so that
//! messages can be localized per code. Organized by category:
//! - 0xxx: General errors
//! - 1xxx: Transaction errors
//! - 2xxx: Drawer errors
//! - 3xxx: Return errors
//! - 4xxx: Lookup errors
//! - 5xxx: Catalog/customer errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Transaction ====================
    /// Transaction not found
    TransactionNotFound = 1001,
    /// Transaction has already been completed
    TransactionAlreadyCompleted = 1002,
    /// Transaction has already been cancelled
    TransactionAlreadyCancelled = 1003,
    /// Transaction has no line items
    TransactionEmpty = 1004,
    /// Transaction status does not permit editing
    TransactionNotEditable = 1005,
    /// Line item not found
    LineNotFound = 1006,
    /// No held transactions to recall
    NothingHeld = 1007,
    /// Operation requires explicit confirmation
    ConfirmationRequired = 1008,
    /// Another interactive flow is already in progress
    FlowInProgress = 1009,

    // ==================== 2xxx: Drawer ====================
    /// No drawer is open
    DrawerNotOpen = 2001,
    /// A drawer is already open
    DrawerAlreadyOpen = 2002,
    /// Cash amount is invalid
    InvalidCashAmount = 2003,

    // ==================== 3xxx: Return ====================
    /// Transaction is not eligible for return
    ReturnNotEligible = 3001,
    /// Every selected return quantity is zero
    ReturnEmptySelection = 3002,
    /// Return quantity exceeds the remaining returnable quantity
    ReturnQuantityExceeded = 3003,
    /// Returns against a return are not supported
    ReturnOfReturn = 3004,

    // ==================== 4xxx: Lookup ====================
    /// Lookup input is not a valid number
    LookupNotNumeric = 4001,
    /// Lookup was superseded by a newer request
    LookupSuperseded = 4002,

    // ==================== 5xxx: Catalog / Customer ====================
    /// Product not found
    ProductNotFound = 5001,
    /// Customer not found
    CustomerNotFound = 5002,

    // ==================== 9xxx: System ====================
    /// Internal error
    InternalError = 9001,
    /// Persistence operation failed
    PersistenceFailed = 9002,
    /// Unit of work was rolled back
    UnitOfWorkRolledBack = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default human-readable message for this code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidFormat => "Invalid format",
            Self::ValueOutOfRange => "Value out of range",

            Self::TransactionNotFound => "Transaction not found",
            Self::TransactionAlreadyCompleted => "Transaction has already been completed",
            Self::TransactionAlreadyCancelled => "Transaction has already been cancelled",
            Self::TransactionEmpty => "Transaction has no items",
            Self::TransactionNotEditable => "Transaction is not eligible for edit",
            Self::LineNotFound => "Line item not found",
            Self::NothingHeld => "No held transactions",
            Self::ConfirmationRequired => "Confirmation required",
            Self::FlowInProgress => "Another operation is in progress",

            Self::DrawerNotOpen => "No active cash drawer",
            Self::DrawerAlreadyOpen => "A cash drawer is already open",
            Self::InvalidCashAmount => "Invalid cash amount",

            Self::ReturnNotEligible => "Transaction is not eligible for return",
            Self::ReturnEmptySelection => "No items selected for return",
            Self::ReturnQuantityExceeded => "Return quantity exceeds returnable quantity",
            Self::ReturnOfReturn => "Returns against a return are not supported",

            Self::LookupNotNumeric => "Lookup input must be a positive number",
            Self::LookupSuperseded => "Lookup superseded by a newer request",

            Self::ProductNotFound => "Product not found",
            Self::CustomerNotFound => "Customer not found",

            Self::InternalError => "Internal error",
            Self::PersistenceFailed => "Persistence operation failed",
            Self::UnitOfWorkRolledBack => "Operation rolled back",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.code()
    }
}

/// Error returned when converting an unknown u16 into an [`ErrorCode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let code = match value {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::ValidationFailed,
            3 => Self::NotFound,
            5 => Self::InvalidRequest,
            6 => Self::InvalidFormat,
            8 => Self::ValueOutOfRange,

            1001 => Self::TransactionNotFound,
            1002 => Self::TransactionAlreadyCompleted,
            1003 => Self::TransactionAlreadyCancelled,
            1004 => Self::TransactionEmpty,
            1005 => Self::TransactionNotEditable,
            1006 => Self::LineNotFound,
            1007 => Self::NothingHeld,
            1008 => Self::ConfirmationRequired,
            1009 => Self::FlowInProgress,

            2001 => Self::DrawerNotOpen,
            2002 => Self::DrawerAlreadyOpen,
            2003 => Self::InvalidCashAmount,

            3001 => Self::ReturnNotEligible,
            3002 => Self::ReturnEmptySelection,
            3003 => Self::ReturnQuantityExceeded,
            3004 => Self::ReturnOfReturn,

            4001 => Self::LookupNotNumeric,
            4002 => Self::LookupSuperseded,

            5001 => Self::ProductNotFound,
            5002 => Self::CustomerNotFound,

            9001 => Self::InternalError,
            9002 => Self::PersistenceFailed,
            9003 => Self::UnitOfWorkRolledBack,

            other => return Err(InvalidErrorCode(other)),
        };
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in [
            ErrorCode::Success,
            ErrorCode::ValidationFailed,
            ErrorCode::TransactionNotEditable,
            ErrorCode::DrawerNotOpen,
            ErrorCode::ReturnQuantityExceeded,
            ErrorCode::LookupNotNumeric,
            ErrorCode::PersistenceFailed,
        ] {
            let raw: u16 = code.into();
            assert_eq!(ErrorCode::try_from(raw), Ok(code));
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(ErrorCode::try_from(777), Err(InvalidErrorCode(777)));
    }

    #[test]
    fn test_display_format() {
        assert_eq!(ErrorCode::DrawerNotOpen.to_string(), "E2001");
        assert_eq!(ErrorCode::Success.to_string(), "E0000");
    }
}
