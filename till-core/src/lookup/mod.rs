//! Debounced, cancellable lookups

pub mod debounce;

pub use debounce::{
    parse_transaction_id, CustomerSearch, DebouncedLookup, LookupError, LookupOutcome,
    TransactionLookup,
};
