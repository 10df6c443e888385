//! Product Model

use serde::{Deserialize, Serialize};

/// Product entity
///
/// The engine only reads products; create/update flows live behind the
/// catalog contract and are out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub barcode: Option<String>,
    /// Default sale price, used when no customer override applies
    pub sale_price: f64,
    /// Purchase price snapshot source (margin reporting)
    pub purchase_price: f64,
    /// Tax rate in percentage (e.g., 10 = 10%)
    pub tax_rate: i32,
    pub receipt_name: Option<String>,
    pub is_active: bool,
}

impl Product {
    /// Name printed on receipts, falling back to the display name
    pub fn receipt_name(&self) -> &str {
        self.receipt_name.as_deref().unwrap_or(&self.name)
    }
}
