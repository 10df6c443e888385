//! Transaction aggregate

use super::line_item::{LineItem, LineKind};
use super::types::{Discount, PaymentMethod};
use serde::{Deserialize, Serialize};

/// Transaction status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Initial, mutable
    #[default]
    Pending,
    /// Parked in the held queue
    Held,
    /// Terminal, committed against the drawer
    Completed,
    /// Terminal, explicitly voided
    Cancelled,
}

/// Transaction - a sale/return built line by line at the till
///
/// Invariant: `total == subtotal + tax - discount_total`, recomputed on
/// every line mutation before control returns to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Numeric id, assigned by persistence on first commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Transient id, stable from session start (holds, idempotency)
    pub local_id: String,
    pub status: TransactionStatus,
    /// Customer reference (None for walk-in)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    /// Customer name at time of selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Cashier reference
    pub cashier_id: i64,
    /// Cashier name at session start
    pub cashier_name: String,
    /// Table/session reference (restaurant mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<LineItem>,
    /// Transaction-level discount, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Discount>,
    /// Computed: sum of line totals
    pub subtotal: f64,
    /// Computed: sum of per-line tax
    pub tax: f64,
    /// Computed: discount applied against subtotal + tax
    pub discount_total: f64,
    /// Computed: subtotal + tax - discount_total
    pub total: f64,
    /// Sum of line quantities
    pub item_count: i32,
    /// Cash tendered at payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tendered: Option<f64>,
    /// Change given back at payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    /// Amount already reconciled against the drawer for this transaction.
    /// None until the first drawer commit; re-commits after an edit move
    /// the balance only by the difference against this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Creation timestamp (epoch millis)
    pub created_at: i64,
    /// Last mutation timestamp
    pub updated_at: i64,
    /// Completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl Transaction {
    /// Create a new empty pending transaction for a cashier session
    pub fn new(cashier_id: i64, cashier_name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: None,
            local_id: uuid::Uuid::new_v4().to_string(),
            status: TransactionStatus::Pending,
            customer_id: None,
            customer_name: None,
            cashier_id,
            cashier_name: cashier_name.into(),
            table: None,
            payment_method: None,
            items: Vec::new(),
            discount: None,
            subtotal: 0.0,
            tax: 0.0,
            discount_total: 0.0,
            total: 0.0,
            item_count: 0,
            tendered: None,
            change: None,
            committed_total: None,
            note: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any line is a return line
    pub fn has_return_lines(&self) -> bool {
        self.items.iter().any(|i| i.kind == LineKind::Return)
    }

    /// Find a line by its stable id
    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.line_id == line_id)
    }

    pub fn line_mut(&mut self, line_id: &str) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|i| i.line_id == line_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_empty_pending() {
        let txn = Transaction::new(1, "Ana");
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert!(txn.is_empty());
        assert_eq!(txn.total, 0.0);
        assert!(txn.id.is_none());
        assert!(!txn.local_id.is_empty());
    }
}
