//! Fixed-point arithmetic.
//!
//! Every `a * b / c` in the engine goes through a 256-bit intermediate so the
//! product of two 18-decimal quantities cannot wrap. Results that do not fit
//! back into `u128` surface as [`FundError::Overflow`].

use crate::error::{FundError, Result};
use crate::types::{Amount, Bps, Wad};

pub use wide::U256;

// The macro expansion names `Result` unqualified, so it must not see the
// crate's one-parameter alias.
mod wide {
    #![allow(clippy::assign_op_pattern)]
    #![allow(clippy::ptr_offset_with_cast)]
    #![allow(clippy::manual_range_contains)]

    use uint::construct_uint;

    construct_uint! {
        /// 256-bit unsigned integer used for intermediate products.
        pub struct U256(4);
    }
}

/// 1.0 in 18-decimal fixed point.
pub const WAD: Wad = 1_000_000_000_000_000_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: Bps = 10_000;

/// Seconds in a (non-leap) year, used to pro-rate annual fee rates.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

fn narrow(value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(FundError::Overflow);
    }
    Ok(value.low_u128())
}

/// `a * b / denominator`, rounded down.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(FundError::Overflow);
    }
    let product = U256::from(a) * U256::from(b);
    narrow(product / U256::from(denominator))
}

/// `a * b / denominator`, rounded up.
pub fn mul_div_ceil(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(FundError::Overflow);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let quotient = product / denominator;
    if product % denominator == U256::zero() {
        narrow(quotient)
    } else {
        narrow(quotient + U256::one())
    }
}

/// `10^decimals` as a raw-unit scale factor.
pub fn unit_scale(decimals: u8) -> Result<u128> {
    10u128
        .checked_pow(u32::from(decimals))
        .ok_or(FundError::Overflow)
}

/// Value (WAD) of `amount` raw units of an asset priced at `price` per whole unit.
pub fn value_of(amount: Amount, price: Wad, decimals: u8) -> Result<Wad> {
    mul_div(amount, price, unit_scale(decimals)?)
}

/// Raw units of an asset priced at `price` that are worth `value` (WAD).
pub fn amount_for_value(value: Wad, price: Wad, decimals: u8) -> Result<Amount> {
    if price == 0 {
        return Err(FundError::Overflow);
    }
    mul_div(value, unit_scale(decimals)?, price)
}

/// `amount * bps / 10_000`, rounded down.
pub fn apply_bps(amount: u128, bps: Bps) -> Result<u128> {
    mul_div(amount, u128::from(bps), u128::from(BPS_DENOMINATOR))
}

/// Convert a basis-point weight to a WAD fraction (10,000 bps = `WAD`).
pub fn bps_to_wad(bps: Bps) -> Wad {
    u128::from(bps) * (WAD / u128::from(BPS_DENOMINATOR))
}

/// Convert a WAD fraction to basis points, rounded down.
pub fn wad_to_bps(value: Wad) -> u128 {
    value / (WAD / u128::from(BPS_DENOMINATOR))
}

pub fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(FundError::Overflow)
}

pub fn checked_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(FundError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_survives_wide_products() {
        // 1e30 * 1e30 overflows u128 but the quotient fits.
        let a = 1_000_000_000_000_000_000_000_000_000_000u128;
        assert_eq!(mul_div(a, a, a).unwrap(), a);
    }

    #[test]
    fn wide_intermediate_holds_u128_products() {
        let max = U256::from(u128::MAX);
        let doubled = max * U256::from(2u64);
        assert!(doubled > max);
        assert_eq!(doubled / U256::from(2u64), max);
        assert_eq!(narrow(doubled), Err(FundError::Overflow));
    }

    #[test]
    fn mul_div_rounding() {
        assert_eq!(mul_div(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_ceil(9, 1, 3).unwrap(), 3);
    }

    #[test]
    fn mul_div_zero_denominator_is_error() {
        assert_eq!(mul_div(1, 1, 0), Err(FundError::Overflow));
        assert_eq!(mul_div_ceil(1, 1, 0), Err(FundError::Overflow));
    }

    #[test]
    fn mul_div_overflowing_quotient_is_error() {
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(FundError::Overflow));
    }

    #[test]
    fn value_and_amount_conversions() {
        // 2.5 tokens (6 decimals) at $4 = $10
        let value = value_of(2_500_000, 4 * WAD, 6).unwrap();
        assert_eq!(value, 10 * WAD);
        assert_eq!(amount_for_value(10 * WAD, 4 * WAD, 6).unwrap(), 2_500_000);
    }

    #[test]
    fn bps_helpers() {
        assert_eq!(apply_bps(1_000, 2_000).unwrap(), 200);
        assert_eq!(bps_to_wad(10_000), WAD);
        assert_eq!(bps_to_wad(500), WAD / 20);
        assert_eq!(wad_to_bps(WAD / 20), 500);
    }

    #[test]
    fn unit_scale_bounds() {
        assert_eq!(unit_scale(0).unwrap(), 1);
        assert_eq!(unit_scale(18).unwrap(), WAD);
        assert!(unit_scale(39).is_err());
    }
}
