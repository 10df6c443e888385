//! Cashier Model

use serde::{Deserialize, Serialize};

/// Cashier identity attached to every engine command
///
/// Always passed explicitly in the session context, never read from
/// ambient process state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cashier {
    pub id: i64,
    pub name: String,
}

impl Cashier {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
