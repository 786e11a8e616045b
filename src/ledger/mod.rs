//! Ledgers shared by the lead account and the follower pool

pub mod book;
pub mod round;

pub use book::AssetBook;
pub use round::{LeadLedger, RoundLedger};
