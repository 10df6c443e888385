//! Domain entity models

pub mod cashier;
pub mod customer;
pub mod drawer;
pub mod product;

pub use cashier::Cashier;
pub use customer::{Customer, CustomerPriceOverride};
pub use drawer::{Drawer, DrawerStatus};
pub use product::Product;
