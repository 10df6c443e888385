//! Customer Model

use serde::{Deserialize, Serialize};

/// Customer entity (客户)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A per-customer override of a product's default sale price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerPriceOverride {
    pub product_id: i64,
    pub unit_price: f64,
}
