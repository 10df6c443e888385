//! Customer-specific pricing

pub mod resolver;

pub use resolver::{resolve_price, reprice_lines, CustomerPriceMap};
