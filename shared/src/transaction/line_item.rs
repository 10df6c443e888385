//! Line item types

use serde::{Deserialize, Serialize};

/// What a line represents
///
/// Return lines are tagged explicitly; quantity and line total stay
/// positive for both kinds. The refund direction is carried by the kind,
/// not by the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineKind {
    #[default]
    Sale,
    Return,
}

/// A single line of a transaction
///
/// Product name/barcode and prices are denormalized at add-time so the
/// line renders the same even if the catalog changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Stable id within the transaction
    pub line_id: String,
    /// Product reference
    pub product_id: i64,
    /// Product name at time of adding
    pub name: String,
    /// Barcode at time of adding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    pub kind: LineKind,
    /// Quantity, always > 0
    pub quantity: i32,
    /// Effective unit price at time of adding (may be re-resolved when
    /// the acting customer changes)
    pub unit_price: f64,
    /// Default sale price at time of adding, the fallback when a
    /// customer override stops applying
    pub base_price: f64,
    /// Purchase price at time of adding (margin reporting)
    pub purchase_price: f64,
    /// Tax rate in percentage (e.g., 10 = 10%)
    pub tax_rate: i32,
    /// Computed: quantity * unit_price, rounded to 2dp
    pub line_total: f64,
    /// Cumulative quantity already returned across prior returns
    #[serde(default)]
    pub already_returned: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LineItem {
    /// Quantity still available to return against this line
    pub fn remaining_returnable(&self) -> i32 {
        (self.quantity - self.already_returned).max(0)
    }
}
