//! Session context
//!
//! Cashier identity and terminal are passed explicitly into every engine
//! command. There is no ambient "current user".

use shared::models::Cashier;

/// Who is acting, and from which terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub cashier: Cashier,
    pub terminal_id: String,
}

impl SessionContext {
    pub fn new(cashier: Cashier, terminal_id: impl Into<String>) -> Self {
        Self {
            cashier,
            terminal_id: terminal_id.into(),
        }
    }
}
