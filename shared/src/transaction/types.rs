//! Supporting transaction types

use serde::{Deserialize, Serialize};

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Voucher,
}

/// Transaction-level discount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type", content = "value")]
pub enum Discount {
    /// Fixed amount off the transaction total
    Amount(f64),
    /// Percentage (0-100) off subtotal + tax
    Percent(f64),
}

/// A line selected for return against an original transaction
///
/// `quantity_to_return` is clamped server-side into
/// `[0, original_quantity - already_returned]`; out-of-range client values
/// are corrected, not rejected, since duplicate submissions from
/// concurrent terminals are expected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnSelection {
    /// Line id on the source transaction
    pub line_id: String,
    pub product_id: i64,
    /// Quantity on the source line
    pub original_quantity: i32,
    /// Cumulative quantity returned by prior returns
    pub already_returned: i32,
    /// Requested quantity to return now
    pub quantity_to_return: i32,
    /// Unit price at time of original sale
    pub unit_price: f64,
    /// Free-text reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReturnSelection {
    /// Quantity still available to return
    pub fn remaining_returnable(&self) -> i32 {
        (self.original_quantity - self.already_returned).max(0)
    }

    /// The requested quantity clamped into `[0, remaining]`
    pub fn clamped_quantity(&self) -> i32 {
        self.quantity_to_return.clamp(0, self.remaining_returnable())
    }
}

/// A return line as actually applied at commit time
///
/// Quantities may be smaller than requested if a concurrent return
/// consumed part of the remaining returnable quantity first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedReturnLine {
    pub line_id: String,
    pub product_id: i64,
    /// Quantity actually returned
    pub quantity: i32,
    pub unit_price: f64,
    /// quantity * unit_price, rounded to 2dp
    pub refund: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(original: i32, already: i32, requested: i32) -> ReturnSelection {
        ReturnSelection {
            line_id: "line-1".to_string(),
            product_id: 1,
            original_quantity: original,
            already_returned: already,
            quantity_to_return: requested,
            unit_price: 10.0,
            reason: None,
        }
    }

    #[test]
    fn test_clamp_over_request() {
        // original 5, already returned 2, operator asks for 4 -> clamped to 3
        assert_eq!(selection(5, 2, 4).clamped_quantity(), 3);
    }

    #[test]
    fn test_clamp_negative_request() {
        assert_eq!(selection(5, 0, -2).clamped_quantity(), 0);
    }

    #[test]
    fn test_clamp_exhausted_line() {
        assert_eq!(selection(5, 5, 1).clamped_quantity(), 0);
    }

    #[test]
    fn test_in_range_request_untouched() {
        assert_eq!(selection(5, 2, 3).clamped_quantity(), 3);
        assert_eq!(selection(5, 2, 1).clamped_quantity(), 1);
    }
}
