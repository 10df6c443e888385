//! Money calculation utilities using rust_decimal for precision
//!
//! All monetary arithmetic is done using `Decimal` internally, then
//! converted back to `f64` for storage/serialization, rounded half-up to
//! two decimal places.

use rust_decimal::prelude::*;
use shared::transaction::Discount;

use super::TxnError;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Maximum allowed unit price per item (€1,000,000)
pub const MAX_UNIT_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line
pub const MAX_QUANTITY: i32 = 9999;
/// Maximum allowed manual cash movement (€1,000,000)
pub const MAX_CASH_AMOUNT: f64 = 1_000_000.0;

/// Convert f64 to Decimal for calculation
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Compare two monetary values within [`MONEY_TOLERANCE`]
#[inline]
pub fn money_eq(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() <= MONEY_TOLERANCE
}

/// Line total: quantity * unit_price, rounded to 2dp
pub fn line_total(quantity: i32, unit_price: f64) -> f64 {
    to_f64(Decimal::from(quantity) * to_decimal(unit_price))
}

/// Per-line tax: line_total * rate / 100, rounded to 2dp
pub fn line_tax(line_total: f64, tax_rate: i32) -> f64 {
    to_f64(to_decimal(line_total) * Decimal::from(tax_rate) / Decimal::ONE_HUNDRED)
}

/// Discount against `base` (subtotal + tax), clamped into `[0, base]`
pub fn discount_amount(base: f64, discount: &Discount) -> f64 {
    let base_d = to_decimal(base);
    let raw = match discount {
        Discount::Amount(v) => to_decimal(*v),
        Discount::Percent(p) => base_d * to_decimal(*p) / Decimal::ONE_HUNDRED,
    };
    to_f64(raw.clamp(Decimal::ZERO, base_d.max(Decimal::ZERO)))
}

/// Validate that a f64 value is finite (not NaN, not Infinity)
#[inline]
fn require_finite(value: f64, field_name: &str) -> Result<(), TxnError> {
    if !value.is_finite() {
        return Err(TxnError::InvalidValue(format!(
            "{} must be a finite number, got {}",
            field_name, value
        )));
    }
    Ok(())
}

/// Validate a resolved unit price before it lands on a line
pub fn validate_unit_price(price: f64) -> Result<(), TxnError> {
    require_finite(price, "unit_price")?;
    if price < 0.0 {
        return Err(TxnError::InvalidValue(format!(
            "unit_price must be non-negative, got {}",
            price
        )));
    }
    if price > MAX_UNIT_PRICE {
        return Err(TxnError::InvalidValue(format!(
            "unit_price exceeds maximum allowed ({}), got {}",
            MAX_UNIT_PRICE, price
        )));
    }
    Ok(())
}

/// Validate a transaction-level discount
pub fn validate_discount(discount: &Discount) -> Result<(), TxnError> {
    match discount {
        Discount::Amount(v) => {
            require_finite(*v, "discount amount")?;
            if *v < 0.0 {
                return Err(TxnError::InvalidValue(format!(
                    "discount amount must be non-negative, got {}",
                    v
                )));
            }
        }
        Discount::Percent(p) => {
            require_finite(*p, "discount percent")?;
            if !(0.0..=100.0).contains(p) {
                return Err(TxnError::InvalidValue(format!(
                    "discount percent must be between 0 and 100, got {}",
                    p
                )));
            }
        }
    }
    Ok(())
}

/// Validate a manual cash in/out amount
pub fn validate_cash_amount(amount: f64) -> Result<(), TxnError> {
    require_finite(amount, "cash amount")?;
    if amount <= 0.0 {
        return Err(TxnError::InvalidValue(format!(
            "cash amount must be positive, got {}",
            amount
        )));
    }
    if amount > MAX_CASH_AMOUNT {
        return Err(TxnError::InvalidValue(format!(
            "cash amount exceeds maximum allowed ({}), got {}",
            MAX_CASH_AMOUNT, amount
        )));
    }
    Ok(())
}

/// Outcome of normalizing a client-supplied quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedQuantity {
    pub quantity: i32,
    /// True when an invalid value was corrected to 1
    pub corrected: bool,
}

/// Normalize a client-supplied quantity
///
/// Zero/negative values are corrected to 1 (surfaced as a warning, not a
/// hard failure); values past [`MAX_QUANTITY`] are rejected.
pub fn normalize_quantity(quantity: i32) -> Result<NormalizedQuantity, TxnError> {
    if quantity > MAX_QUANTITY {
        return Err(TxnError::InvalidValue(format!(
            "quantity exceeds maximum allowed ({}), got {}",
            MAX_QUANTITY, quantity
        )));
    }
    if quantity <= 0 {
        return Ok(NormalizedQuantity {
            quantity: 1,
            corrected: true,
        });
    }
    Ok(NormalizedQuantity {
        quantity,
        corrected: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total_rounding() {
        assert_eq!(line_total(3, 0.335), 1.01); // 1.005 rounds half-up
        assert_eq!(line_total(2, 10.0), 20.0);
    }

    #[test]
    fn test_line_tax() {
        assert_eq!(line_tax(20.0, 10), 2.0);
        assert_eq!(line_tax(20.0, 0), 0.0);
        assert_eq!(line_tax(9.99, 21), 2.1); // 2.0979 -> 2.10
    }

    #[test]
    fn test_discount_amount_fixed() {
        assert_eq!(discount_amount(20.0, &Discount::Amount(5.0)), 5.0);
        // Clamped to base
        assert_eq!(discount_amount(20.0, &Discount::Amount(50.0)), 20.0);
    }

    #[test]
    fn test_discount_amount_percent() {
        assert_eq!(discount_amount(20.0, &Discount::Percent(10.0)), 2.0);
        assert_eq!(discount_amount(20.0, &Discount::Percent(100.0)), 20.0);
    }

    #[test]
    fn test_money_eq_tolerance() {
        assert!(money_eq(10.0, 10.005));
        assert!(!money_eq(10.0, 10.02));
    }

    #[test]
    fn test_normalize_quantity_corrects_invalid() {
        let n = normalize_quantity(0).unwrap();
        assert_eq!(n.quantity, 1);
        assert!(n.corrected);

        let n = normalize_quantity(-3).unwrap();
        assert_eq!(n.quantity, 1);
        assert!(n.corrected);

        let n = normalize_quantity(4).unwrap();
        assert_eq!(n.quantity, 4);
        assert!(!n.corrected);
    }

    #[test]
    fn test_normalize_quantity_rejects_excessive() {
        assert!(normalize_quantity(10_000).is_err());
    }

    #[test]
    fn test_validate_unit_price() {
        assert!(validate_unit_price(10.0).is_ok());
        assert!(validate_unit_price(-1.0).is_err());
        assert!(validate_unit_price(f64::NAN).is_err());
        assert!(validate_unit_price(f64::INFINITY).is_err());
        assert!(validate_unit_price(2_000_000.0).is_err());
    }

    #[test]
    fn test_validate_discount() {
        assert!(validate_discount(&Discount::Amount(5.0)).is_ok());
        assert!(validate_discount(&Discount::Amount(-5.0)).is_err());
        assert!(validate_discount(&Discount::Percent(101.0)).is_err());
        assert!(validate_discount(&Discount::Percent(f64::NAN)).is_err());
    }
}
