//! Fixed-point helpers
//!
//! Prices, ratios, share prices and fee rates are `u128` scaled by [`PRECISION`] (1e18).
//! Every division truncates toward zero. Products are carried in 256 bits so that
//! `a * b / d` never overflows while the final quotient fits in `u128`.

use primitive_types::U256;

use crate::error::{Result, VaultError};

/// 1.0 in fixed point
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// `floor(a * b / denominator)` with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(VaultError::ArithmeticOverflow("division by zero"));
    }

    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(VaultError::ArithmeticOverflow("mul_div product exceeds 256 bits"))?;
    let quotient = product / U256::from(denominator);
    if quotient > U256::from(u128::MAX) {
        return Err(VaultError::ArithmeticOverflow("mul_div quotient exceeds u128"));
    }
    Ok(quotient.low_u128())
}

/// Value of `amount` asset units at fixed-point `price`
pub fn value_of(amount: u128, price: u128) -> Result<u128> {
    mul_div(amount, price, PRECISION)
}

/// Asset units worth `value` at fixed-point `price`
pub fn assets_for_value(value: u128, price: u128) -> Result<u128> {
    mul_div(value, PRECISION, price)
}

/// Shares bought by `assets` at `price_per_share`
pub fn shares_for_assets(assets: u128, price_per_share: u128) -> Result<u128> {
    mul_div(assets, PRECISION, price_per_share)
}

/// Assets redeemed by `shares` at `price_per_share`
pub fn assets_for_shares(shares: u128, price_per_share: u128) -> Result<u128> {
    mul_div(shares, price_per_share, PRECISION)
}

/// Basis points as a fixed-point fraction
pub fn bps_to_fixed(bps: u32) -> u128 {
    PRECISION * bps as u128 / BPS_DENOMINATOR as u128
}

pub fn checked_add(a: u128, b: u128, what: &'static str) -> Result<u128> {
    a.checked_add(b).ok_or(VaultError::ArithmeticOverflow(what))
}

pub fn checked_sub(a: u128, b: u128, what: &'static str) -> Result<u128> {
    a.checked_sub(b).ok_or(VaultError::ArithmeticOverflow(what))
}
