//! Cash drawer reconciliation

pub mod gateway;

pub use gateway::{DrawerError, DrawerGateway, DrawerOperation, ReconcileOutcome};
