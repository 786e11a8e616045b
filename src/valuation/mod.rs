//! Valuation oracle
//!
//! Account valuations and underlying unit prices, both 1e18 fixed point.

mod oracle;

pub use oracle::{PricePoint, StaticOracle, ValuationOracle};
