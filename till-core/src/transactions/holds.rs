//! Held-transaction queue
//!
//! A LIFO store of suspended in-progress transactions. Ownership
//! transfers fully: `hold` moves the transaction in, `recall` moves the
//! most recent one back out.

use shared::transaction::{Transaction, TransactionStatus};

use super::TxnError;

/// Queue depth past which a warning is logged (possible forgotten holds)
const HELD_WARN_THRESHOLD: usize = 20;

/// LIFO queue of held transactions
#[derive(Debug, Default)]
pub struct HeldQueue {
    entries: Vec<Transaction>,
}

impl HeldQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a transaction. Requires at least one line item.
    pub fn hold(&mut self, mut txn: Transaction) -> Result<(), TxnError> {
        if txn.is_empty() {
            return Err(TxnError::Empty);
        }
        txn.status = TransactionStatus::Held;
        txn.touch();
        self.entries.push(txn);
        if self.entries.len() > HELD_WARN_THRESHOLD {
            tracing::warn!(
                held = self.entries.len(),
                "held queue exceeds threshold, possible forgotten holds"
            );
        }
        Ok(())
    }

    /// Take back the most recently held transaction
    pub fn recall(&mut self) -> Result<Transaction, TxnError> {
        let mut txn = self.entries.pop().ok_or(TxnError::NothingHeld)?;
        txn.status = TransactionStatus::Pending;
        txn.touch();
        Ok(txn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
