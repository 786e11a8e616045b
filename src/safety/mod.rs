mod allow_list;

pub use allow_list::{enforce_instruction_assets, enforce_investor, AccessPolicy, StaticAllowList};
