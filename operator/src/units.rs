//! Decimal string <-> raw unit conversion.
//!
//! Amounts and prices in config files and on the command line are decimal
//! strings ("1500.25") so they survive TOML's 64-bit integers and never pass
//! through floating point.

use crate::error::{Error, Result};

/// Parse a non-negative decimal string into raw units with `decimals`
/// fractional digits. Extra fractional digits are an error, not truncated.
pub fn parse_units(text: &str, decimals: u8) -> Result<u128> {
    let bad = || Error::Amount(text.to_string());
    let s = text.trim().replace('_', "");
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(bad());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    if frac.len() > usize::from(decimals) {
        return Err(bad());
    }

    let scale = 10u128.checked_pow(u32::from(decimals)).ok_or_else(bad)?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = usize::from(decimals));
        padded.parse().map_err(|_| bad())?
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(bad)
}

/// Render raw units as a decimal string without trailing fractional zeros.
pub fn format_units(amount: u128, decimals: u8) -> String {
    let Some(scale) = 10u128.checked_pow(u32::from(decimals)) else {
        return amount.to_string();
    };
    let whole = amount / scale;
    let frac = amount % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{frac:0>width$}", width = usize::from(decimals));
    format!("{whole}.{}", digits.trim_end_matches('0'))
}
