//! Collaborator contracts
//!
//! The engine never talks to a database, catalog backend, or printer
//! directly; it consumes these narrow async contracts. Everything that
//! must be atomic is threaded through a [`UowHandle`], the token of one
//! unit of work: stores stage writes under the handle, and the unit
//! commits or rolls back as a whole.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use shared::models::{Customer, CustomerPriceOverride, Drawer, Product};
use shared::transaction::{AppliedReturnLine, MovementKind, ReturnSelection, Transaction};

/// Errors raised by store implementations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown unit of work handle: {0}")]
    UnknownHandle(u64),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque token identifying one atomic unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UowHandle(pub u64);

/// The atomicity primitive wrapped around every drawer-affecting commit
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> StoreResult<UowHandle>;
    /// Apply every write staged under the handle, atomically
    async fn commit(&self, handle: UowHandle) -> StoreResult<()>;
    /// Discard every write staged under the handle
    async fn rollback(&self, handle: UowHandle) -> StoreResult<()>;
}

/// Product lookups
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_by_id(&self, id: i64) -> StoreResult<Product>;
    async fn get_by_barcode(&self, code: &str) -> StoreResult<Product>;
}

/// Customer lookups and per-customer price overrides
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_by_id(&self, id: i64) -> StoreResult<Customer>;
    async fn search_by_name(&self, text: &str) -> StoreResult<Vec<Customer>>;
    async fn price_overrides(&self, customer_id: i64) -> StoreResult<Vec<CustomerPriceOverride>>;
}

/// Transaction persistence
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Stage the transaction under the unit; returns the numeric id it
    /// will carry once the unit commits (assigned on first persist,
    /// stable afterwards).
    async fn persist(&self, uow: &UowHandle, txn: &Transaction) -> StoreResult<i64>;

    /// Committed state only; staged writes are never visible here
    async fn get_by_id(&self, id: i64) -> StoreResult<Transaction>;

    /// Highest committed transaction id (0 when none exist)
    async fn latest_id(&self) -> StoreResult<i64>;

    /// Stage a return against the original transaction. Each selection is
    /// clamped to the quantity still returnable at this moment — counting
    /// both committed returns and returns reserved by concurrent units —
    /// so `already_returned` can never exceed the original quantity, even
    /// under racing submissions. Returns the lines as actually applied.
    async fn apply_return(
        &self,
        uow: &UowHandle,
        original_id: i64,
        selections: &[ReturnSelection],
    ) -> StoreResult<Vec<AppliedReturnLine>>;
}

/// Drawer persistence. Balance mutations only happen inside a unit of
/// work driven by the reconciliation gateway.
#[async_trait]
pub trait DrawerStore: Send + Sync {
    /// The currently open drawer, if any (committed state)
    async fn current_open(&self) -> StoreResult<Option<Drawer>>;

    async fn open(
        &self,
        uow: &UowHandle,
        opened_by: i64,
        opening_float: f64,
    ) -> StoreResult<Drawer>;

    async fn close(
        &self,
        uow: &UowHandle,
        drawer_id: i64,
        counted_cash: f64,
        note: Option<String>,
    ) -> StoreResult<Drawer>;

    /// Stage a signed balance delta; returns the balance the drawer will
    /// have once the unit commits.
    async fn apply_delta(
        &self,
        uow: &UowHandle,
        drawer_id: i64,
        amount: f64,
        kind: MovementKind,
        reference: &str,
    ) -> StoreResult<f64>;
}

/// Receipt printing failure. Best-effort only: logged, never propagated
/// into the commit path.
#[derive(Debug, Clone, Error)]
#[error("printer: {0}")]
pub struct PrintError(pub String);

/// Best-effort receipt printing, invoked strictly after commit
#[async_trait]
pub trait ReceiptPrinter: Send + Sync {
    async fn print_sale(&self, txn: &Transaction) -> Result<(), PrintError>;
    async fn print_refund(
        &self,
        original_id: i64,
        lines: &[AppliedReturnLine],
    ) -> Result<(), PrintError>;
}
