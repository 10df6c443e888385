//! Cash movement events
//!
//! Published by the drawer reconciliation gateway after its atomic unit
//! commits, never before. Downstream listeners (live dashboard, shift
//! report) subscribe to the gateway's broadcast channel.

use serde::{Deserialize, Serialize};

/// What kind of operation moved cash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Sale,
    Return,
    CashIn,
    CashOut,
    Open,
    Close,
}

/// A committed change to the drawer balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CashMovement {
    pub kind: MovementKind,
    /// Signed delta applied to the balance (negative for Return/CashOut)
    pub amount: f64,
    /// What this movement reconciles: a transaction id, return id, or a
    /// free-text reason for manual cash in/out
    pub reference: String,
    pub drawer_id: i64,
    /// Balance after the delta was applied
    pub balance_after: f64,
    pub cashier_id: i64,
    /// Commit timestamp (epoch millis)
    pub at: i64,
}
