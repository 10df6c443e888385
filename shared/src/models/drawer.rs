//! Drawer Model (钱箱)
//!
//! One drawer per terminal per shift. Every cash-affecting operation
//! read-modify-writes this single entity through the reconciliation
//! gateway; nothing else may touch the balance.

use serde::{Deserialize, Serialize};

/// Drawer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawerStatus {
    Open,
    Closed,
}

impl Default for DrawerStatus {
    fn default() -> Self {
        Self::Open
    }
}

/// Drawer record - the cash balance for an active shift/terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drawer {
    pub id: i64,
    /// Cashier who opened the drawer
    pub opened_by: i64,
    pub status: DrawerStatus,
    /// Cash placed in the drawer at open
    pub opening_float: f64,
    /// Current balance (opening float + cumulative cash deltas)
    pub balance: f64,
    /// Actual cash counted at close
    pub counted_cash: Option<f64>,
    /// Cash variance at close (counted - balance)
    pub variance: Option<f64>,
    /// Open timestamp (epoch millis)
    pub opened_at: i64,
    /// Close timestamp (epoch millis), None while open
    pub closed_at: Option<i64>,
    pub note: Option<String>,
}

impl Drawer {
    pub fn is_open(&self) -> bool {
        self.status == DrawerStatus::Open
    }
}
