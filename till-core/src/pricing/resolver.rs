//! Price resolution against the active customer's override map
//!
//! The map is owned by the session and replaced wholesale whenever the
//! selected customer changes, never merged. Resolution itself is pure:
//! override if present, default sale price otherwise.

use std::collections::HashMap;

use shared::models::{CustomerPriceOverride, Product};
use shared::transaction::{LineKind, Transaction};

use crate::transactions::line_items;
use crate::transactions::money;

/// Per-customer price overrides, scoped to the active session
#[derive(Debug, Clone, Default)]
pub struct CustomerPriceMap {
    customer_id: Option<i64>,
    overrides: HashMap<i64, f64>,
}

impl CustomerPriceMap {
    /// The empty map used when no customer is selected
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the map for a customer from directory overrides
    pub fn for_customer(customer_id: i64, overrides: Vec<CustomerPriceOverride>) -> Self {
        Self {
            customer_id: Some(customer_id),
            overrides: overrides
                .into_iter()
                .map(|o| (o.product_id, o.unit_price))
                .collect(),
        }
    }

    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }

    /// Override price for a product, if any
    pub fn get(&self, product_id: i64) -> Option<f64> {
        self.overrides.get(&product_id).copied()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Effective unit price for a product under the current map.
///
/// Pure and idempotent; resolving twice with the same inputs always
/// yields the same price.
pub fn resolve_price(product: &Product, map: &CustomerPriceMap) -> f64 {
    map.get(product.id).unwrap_or(product.sale_price)
}

/// Re-resolve every sale line after the price map was replaced.
///
/// Lines whose effective price changed are updated in place (the snapshot
/// `base_price` is the fallback) and totals are recomputed. Returns true
/// when anything changed.
pub fn reprice_lines(txn: &mut Transaction, map: &CustomerPriceMap) -> bool {
    let mut dirty = false;
    for line in &mut txn.items {
        if line.kind != LineKind::Sale {
            continue;
        }
        let effective = map.get(line.product_id).unwrap_or(line.base_price);
        if !money::money_eq(line.unit_price, effective) {
            line.unit_price = effective;
            line.line_total = money::line_total(line.quantity, effective);
            dirty = true;
        }
    }
    if dirty {
        line_items::recompute_totals(txn);
        tracing::debug!(
            customer_id = ?map.customer_id(),
            "line prices re-resolved after price map reload"
        );
    }
    dirty
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::transaction::Transaction;

    fn product(id: i64, sale_price: f64) -> Product {
        Product {
            id,
            name: format!("Product {}", id),
            barcode: None,
            sale_price,
            purchase_price: sale_price * 0.5,
            tax_rate: 0,
            receipt_name: None,
            is_active: true,
        }
    }

    fn override_map(customer_id: i64, pairs: &[(i64, f64)]) -> CustomerPriceMap {
        CustomerPriceMap::for_customer(
            customer_id,
            pairs
                .iter()
                .map(|(product_id, unit_price)| CustomerPriceOverride {
                    product_id: *product_id,
                    unit_price: *unit_price,
                })
                .collect(),
        )
    }

    #[test]
    fn test_resolve_uses_override_when_present() {
        let map = override_map(7, &[(1, 8.5)]);
        assert_eq!(resolve_price(&product(1, 10.0), &map), 8.5);
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let map = override_map(7, &[(1, 8.5)]);
        assert_eq!(resolve_price(&product(2, 4.0), &map), 4.0);
        assert_eq!(resolve_price(&product(1, 10.0), &CustomerPriceMap::empty()), 10.0);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let map = override_map(7, &[(1, 8.5)]);
        let p = product(1, 10.0);
        assert_eq!(resolve_price(&p, &map), resolve_price(&p, &map));
    }

    #[test]
    fn test_reprice_updates_changed_lines() {
        let mut txn = Transaction::new(1, "Test Cashier");
        line_items::add_or_increment(&mut txn, &product(1, 10.0), 2, 10.0).unwrap();
        line_items::add_or_increment(&mut txn, &product(2, 4.0), 1, 4.0).unwrap();

        let map = override_map(7, &[(1, 8.0)]);
        assert!(reprice_lines(&mut txn, &map));

        assert_eq!(txn.items[0].unit_price, 8.0);
        assert_eq!(txn.items[0].line_total, 16.0);
        assert_eq!(txn.items[1].unit_price, 4.0);
        assert_eq!(txn.subtotal, 20.0);
        assert_eq!(txn.total, 20.0);
    }

    #[test]
    fn test_reprice_back_to_default_on_customer_clear() {
        let mut txn = Transaction::new(1, "Test Cashier");
        line_items::add_or_increment(&mut txn, &product(1, 10.0), 2, 8.0).unwrap();

        assert!(reprice_lines(&mut txn, &CustomerPriceMap::empty()));
        assert_eq!(txn.items[0].unit_price, 10.0);
        assert_eq!(txn.subtotal, 20.0);
    }

    #[test]
    fn test_reprice_is_idempotent() {
        let mut txn = Transaction::new(1, "Test Cashier");
        line_items::add_or_increment(&mut txn, &product(1, 10.0), 2, 10.0).unwrap();

        let map = override_map(7, &[(1, 8.0)]);
        assert!(reprice_lines(&mut txn, &map));
        // Second pass with the same map changes nothing
        assert!(!reprice_lines(&mut txn, &map));
        assert_eq!(txn.subtotal, 16.0);
    }
}
