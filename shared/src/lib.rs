//! Shared domain types for the Till engine
//!
//! This crate carries everything both the engine and a presentation or
//! persistence layer need to agree on:
//!
//! - **models**: catalog/customer/cashier/drawer entities
//! - **transaction**: the transaction aggregate, line items, return types
//! - **error**: unified error codes, categories, and [`error::AppError`]

pub mod error;
pub mod models;
pub mod transaction;

pub use error::{AppError, AppResult, ErrorCategory, ErrorCode, ErrorKind};
pub use models::{Cashier, Customer, Drawer, DrawerStatus, Product};
pub use transaction::{
    CashMovement, Discount, LineItem, LineKind, MovementKind, PaymentMethod, ReturnSelection,
    Transaction, TransactionStatus,
};
