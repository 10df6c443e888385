//! Line-item aggregator
//!
//! Owns every mutation of the active transaction's line list. Each
//! mutation recomputes item count, subtotal, tax, and total before
//! returning control, so totals can never be observed stale.

use shared::models::Product;
use shared::transaction::{Discount, LineItem, LineKind, Transaction, TransactionStatus};

use super::money;
use super::TxnError;

/// Outcome of adding a product to the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Stable id of the created or incremented line
    pub line_id: String,
    /// True when the line already existed and its quantity was incremented
    pub merged: bool,
    /// True when an invalid quantity was corrected to 1
    pub quantity_corrected: bool,
}

/// Outcome of a set-quantity command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetQuantityOutcome {
    pub quantity: i32,
    /// True when an invalid quantity was corrected to 1
    pub corrected: bool,
}

/// Statuses under which the line list may be mutated.
///
/// Completed is included: a completed transaction resolved by numeric
/// lookup may be edited and re-committed; any other terminal status may
/// not.
fn ensure_mutable(txn: &Transaction) -> Result<(), TxnError> {
    match txn.status {
        TransactionStatus::Pending | TransactionStatus::Completed => Ok(()),
        TransactionStatus::Cancelled => Err(TxnError::AlreadyCancelled(txn.local_id.clone())),
        TransactionStatus::Held => Err(TxnError::NotEditable),
    }
}

/// Add a product, or increment the quantity of its existing sale line.
///
/// An existing line keeps its unit price; a new line takes the resolved
/// `unit_price` and snapshots the product's default price for later
/// re-resolution.
pub fn add_or_increment(
    txn: &mut Transaction,
    product: &Product,
    quantity: i32,
    unit_price: f64,
) -> Result<AddOutcome, TxnError> {
    ensure_mutable(txn)?;
    money::validate_unit_price(unit_price)?;
    let normalized = money::normalize_quantity(quantity)?;
    if normalized.corrected {
        tracing::warn!(
            product_id = product.id,
            supplied = quantity,
            "invalid quantity corrected to 1"
        );
    }

    let existing = txn
        .items
        .iter_mut()
        .find(|l| l.product_id == product.id && l.kind == LineKind::Sale);

    let outcome = match existing {
        Some(line) => {
            let next = line.quantity.saturating_add(normalized.quantity);
            if next > money::MAX_QUANTITY {
                return Err(TxnError::InvalidValue(format!(
                    "quantity exceeds maximum allowed ({}), got {}",
                    money::MAX_QUANTITY,
                    next
                )));
            }
            line.quantity = next;
            line.line_total = money::line_total(line.quantity, line.unit_price);
            AddOutcome {
                line_id: line.line_id.clone(),
                merged: true,
                quantity_corrected: normalized.corrected,
            }
        }
        None => {
            let line = LineItem {
                line_id: uuid::Uuid::new_v4().to_string(),
                product_id: product.id,
                name: product.name.clone(),
                barcode: product.barcode.clone(),
                kind: LineKind::Sale,
                quantity: normalized.quantity,
                unit_price,
                base_price: product.sale_price,
                purchase_price: product.purchase_price,
                tax_rate: product.tax_rate,
                line_total: money::line_total(normalized.quantity, unit_price),
                already_returned: 0,
                note: None,
            };
            let line_id = line.line_id.clone();
            txn.items.push(line);
            AddOutcome {
                line_id,
                merged: false,
                quantity_corrected: normalized.corrected,
            }
        }
    };

    recompute_totals(txn);
    Ok(outcome)
}

/// Remove a line by its stable id
pub fn remove_line(txn: &mut Transaction, line_id: &str) -> Result<LineItem, TxnError> {
    ensure_mutable(txn)?;
    let idx = txn
        .items
        .iter()
        .position(|l| l.line_id == line_id)
        .ok_or_else(|| TxnError::LineNotFound(line_id.to_string()))?;
    let removed = txn.items.remove(idx);
    recompute_totals(txn);
    Ok(removed)
}

/// Set a line's quantity.
///
/// Zero/negative values are corrected to exactly 1 and the correction is
/// surfaced in the outcome so the operator sees a warning.
pub fn set_quantity(
    txn: &mut Transaction,
    line_id: &str,
    quantity: i32,
) -> Result<SetQuantityOutcome, TxnError> {
    ensure_mutable(txn)?;
    let normalized = money::normalize_quantity(quantity)?;
    let line = txn
        .line_mut(line_id)
        .ok_or_else(|| TxnError::LineNotFound(line_id.to_string()))?;
    if normalized.corrected {
        tracing::warn!(
            line_id = %line_id,
            supplied = quantity,
            "invalid quantity corrected to 1"
        );
    }
    line.quantity = normalized.quantity;
    line.line_total = money::line_total(line.quantity, line.unit_price);
    recompute_totals(txn);
    Ok(SetQuantityOutcome {
        quantity: normalized.quantity,
        corrected: normalized.corrected,
    })
}

/// Apply (or clear) the transaction-level discount
pub fn apply_discount(txn: &mut Transaction, discount: Option<Discount>) -> Result<(), TxnError> {
    ensure_mutable(txn)?;
    if let Some(d) = &discount {
        money::validate_discount(d)?;
    }
    txn.discount = discount;
    recompute_totals(txn);
    Ok(())
}

/// Recompute item count, subtotal, tax, discount, and total.
///
/// Return-kind lines subtract from the totals; the kind field, not a
/// sign, decides the direction.
pub fn recompute_totals(txn: &mut Transaction) {
    use rust_decimal::Decimal;

    let mut item_count: i32 = 0;
    let mut subtotal = Decimal::ZERO;
    let mut tax = Decimal::ZERO;

    for line in &txn.items {
        let line_total = money::to_decimal(line.line_total);
        let line_tax = money::to_decimal(money::line_tax(line.line_total, line.tax_rate));
        match line.kind {
            LineKind::Sale => {
                item_count += line.quantity;
                subtotal += line_total;
                tax += line_tax;
            }
            LineKind::Return => {
                item_count -= line.quantity;
                subtotal -= line_total;
                tax -= line_tax;
            }
        }
    }

    txn.item_count = item_count;
    txn.subtotal = money::to_f64(subtotal);
    txn.tax = money::to_f64(tax);

    let base = money::to_f64(subtotal + tax);
    txn.discount_total = match &txn.discount {
        Some(d) => money::discount_amount(base, d),
        None => 0.0,
    };
    txn.total = money::to_f64(
        money::to_decimal(txn.subtotal) + money::to_decimal(txn.tax)
            - money::to_decimal(txn.discount_total),
    );
    txn.touch();
}
