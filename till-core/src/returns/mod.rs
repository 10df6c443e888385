//! Return/refund workflow

pub mod workflow;

pub use workflow::{ReturnError, ReturnReceipt, ReturnWorkflow, ReturnableTransaction};
