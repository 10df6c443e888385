//! Debounced lookup controller
//!
//! Each new input restarts the debounce window; only after the window
//! elapses without further input is the lookup issued. A newer input
//! cancels the pending one through a `CancellationToken`, and a request
//! generation guards against the remaining race: an in-flight lookup
//! whose result arrives after a newer request was issued is discarded at
//! application time, no matter how the timers fell.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use shared::error::{AppError, ErrorCode};
use shared::models::Customer;
use shared::transaction::Transaction;

use crate::stores::{CustomerDirectory, StoreError, TransactionStore};

/// Errors raised before a lookup is even scheduled
#[derive(Debug, Error)]
pub enum LookupError {
    /// Non-numeric or non-positive transaction-id input. Carries the
    /// next-available transaction number the field should reset to.
    #[error("lookup input '{input}' is not a positive number")]
    NotNumeric { input: String, reset_to: i64 },
}

impl LookupError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotNumeric { .. } => ErrorCode::LookupNotNumeric,
        }
    }
}

/// A lookup result tagged with the request generation that produced it
#[derive(Debug, Clone)]
pub struct LookupOutcome<R> {
    pub request: u64,
    pub result: Result<R, AppError>,
}

type LookupFn<Q, R> = Arc<dyn Fn(Q) -> BoxFuture<'static, Result<R, AppError>> + Send + Sync>;

/// Generic debounce-and-cancel controller
///
/// Results are observed through a watch channel; only the newest
/// request's result is ever applied to it.
pub struct DebouncedLookup<Q, R> {
    window: Duration,
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
    result_tx: watch::Sender<Option<LookupOutcome<R>>>,
    lookup: LookupFn<Q, R>,
}

impl<Q, R> std::fmt::Debug for DebouncedLookup<Q, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedLookup")
            .field("window", &self.window)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}

impl<Q, R> DebouncedLookup<Q, R>
where
    Q: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new<F>(window: Duration, lookup: F) -> Arc<Self>
    where
        F: Fn(Q) -> BoxFuture<'static, Result<R, AppError>> + Send + Sync + 'static,
    {
        let (result_tx, _) = watch::channel(None);
        Arc::new(Self {
            window,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            result_tx,
            lookup: Arc::new(lookup),
        })
    }

    /// Observe applied lookup results
    pub fn subscribe(&self) -> watch::Receiver<Option<LookupOutcome<R>>> {
        self.result_tx.subscribe()
    }

    /// Register a new input, superseding any pending or in-flight lookup
    pub fn submit(self: &Arc<Self>, query: Q) {
        let request = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self.current.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Debounce window; a newer input cancels the wait
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(request, "lookup superseded during debounce window");
                    return;
                }
                _ = tokio::time::sleep(this.window) => {}
            }

            // Issue the lookup, still cooperatively cancellable
            let result = tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(request, "in-flight lookup cancelled");
                    return;
                }
                result = (this.lookup)(query) => result,
            };

            if !this.try_apply(request, result) {
                tracing::debug!(request, "stale lookup result discarded");
            }
        });
    }

    /// Apply a result unless a newer request has been issued since.
    ///
    /// Timer cancellation alone cannot close this race: service latency
    /// can deliver an older result after a newer one.
    fn try_apply(&self, request: u64, result: Result<R, AppError>) -> bool {
        if self.generation.load(Ordering::SeqCst) != request {
            return false;
        }
        let _ = self.result_tx.send(Some(LookupOutcome { request, result }));
        true
    }
}

/// Parse transaction-id lookup input. Positive integers only.
pub fn parse_transaction_id(input: &str) -> Option<i64> {
    match input.trim().parse::<i64>() {
        Ok(id) if id > 0 => Some(id),
        _ => None,
    }
}

/// Debounced transaction-by-id lookup for the edit/return entry field
pub struct TransactionLookup {
    store: Arc<dyn TransactionStore>,
    debounce: Arc<DebouncedLookup<i64, Transaction>>,
}

impl std::fmt::Debug for TransactionLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLookup").finish()
    }
}

impl TransactionLookup {
    pub fn new(store: Arc<dyn TransactionStore>, window: Duration) -> Self {
        let lookup_store = store.clone();
        let debounce = DebouncedLookup::new(window, move |id: i64| {
            let store = lookup_store.clone();
            Box::pin(async move {
                store.get_by_id(id).await.map_err(|e| match e {
                    StoreError::NotFound(_) => AppError::with_message(
                        ErrorCode::TransactionNotFound,
                        format!("transaction {} not found", id),
                    ),
                    other => AppError::persistence(other.to_string()),
                })
            }) as BoxFuture<'static, Result<Transaction, AppError>>
        });
        Self { store, debounce }
    }

    /// Validate the field input and schedule the lookup.
    ///
    /// Non-numeric or negative input fails fast and reports the
    /// next-available transaction number for the field to reset to; no
    /// lookup is issued.
    pub async fn submit_input(&self, input: &str) -> Result<i64, LookupError> {
        match parse_transaction_id(input) {
            Some(id) => {
                self.debounce.submit(id);
                Ok(id)
            }
            None => {
                let reset_to = self.store.latest_id().await.unwrap_or(0) + 1;
                tracing::warn!(input, reset_to, "rejected non-numeric transaction lookup");
                Err(LookupError::NotNumeric {
                    input: input.to_string(),
                    reset_to,
                })
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LookupOutcome<Transaction>>> {
        self.debounce.subscribe()
    }
}

/// Debounced customer name search for the customer picker
pub struct CustomerSearch {
    debounce: Arc<DebouncedLookup<String, Vec<Customer>>>,
}

impl std::fmt::Debug for CustomerSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerSearch").finish()
    }
}

impl CustomerSearch {
    pub fn new(directory: Arc<dyn CustomerDirectory>, window: Duration) -> Self {
        let debounce = DebouncedLookup::new(window, move |text: String| {
            let directory = directory.clone();
            Box::pin(async move {
                directory
                    .search_by_name(&text)
                    .await
                    .map_err(|e| AppError::persistence(e.to_string()))
            }) as BoxFuture<'static, Result<Vec<Customer>, AppError>>
        });
        Self { debounce }
    }

    /// Register a keystroke's worth of input
    pub fn submit(&self, text: impl Into<String>) {
        self.debounce.submit(text.into());
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LookupOutcome<Vec<Customer>>>> {
        self.debounce.subscribe()
    }
}
