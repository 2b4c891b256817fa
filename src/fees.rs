//! Fee accrual: continuous management fee and high-water-mark performance fee.
//!
//! Both fees are paid by minting new shares to the fee recipient, diluting
//! existing holders by exactly the fee fraction.
//!
//! # Management fee
//!
//! With `f = rate * dt / (SECONDS_PER_YEAR * 10_000)`, minting
//! `X = S * f / (1 - f)` shares gives the recipient `X / (S + X) = f` of the
//! post-mint supply. In integers this is
//! `S * rate * dt / (SECONDS_PER_YEAR * 10_000 - rate * dt)`, evaluated with a
//! single floor division.
//!
//! # Performance fee
//!
//! When the share price `p` exceeds the high-water mark `h`, the fee value per
//! share is `v = (p - h) * rate / 10_000`. Minting `S * v / (p - v)` shares
//! brings the share price down to exactly `p - v`, which becomes the new mark.

use log::info;

use crate::error::{FundError, Result};
use crate::ledger::FundState;
use crate::math::{self, BPS_DENOMINATOR, SECONDS_PER_YEAR};
use crate::price::PriceAggregator;
use crate::types::{Amount, Bps, Timestamp, Wad};

/// Longest accrual window charged in one step. Idle time beyond it is not billed.
pub const MAX_ACCRUAL_WINDOW: u64 = 5 * SECONDS_PER_YEAR;

/// Shares to mint for `elapsed` seconds of management fee on `total_shares`.
pub fn management_fee_shares(total_shares: Amount, rate_bps: Bps, elapsed: u64) -> Result<Amount> {
    if total_shares == 0 || rate_bps == 0 || elapsed == 0 {
        return Ok(0);
    }
    let elapsed = elapsed.min(MAX_ACCRUAL_WINDOW);
    let numerator = u128::from(rate_bps) * u128::from(elapsed);
    let year = u128::from(SECONDS_PER_YEAR) * u128::from(BPS_DENOMINATOR);
    if numerator >= year {
        return Err(FundError::Overflow);
    }
    math::mul_div(total_shares, numerator, year - numerator)
}

/// Performance fee outcome for one share price observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerformanceFee {
    /// Fee value per share (WAD).
    pub fee_value: Wad,
    pub shares: Amount,
    pub new_high_water_mark: Wad,
}

/// Performance fee owed at `share_price`, or `None` if there is no profit
/// above `high_water_mark`.
pub fn performance_fee(
    total_shares: Amount,
    share_price: Wad,
    high_water_mark: Wad,
    rate_bps: Bps,
) -> Result<Option<PerformanceFee>> {
    if share_price <= high_water_mark {
        return Ok(None);
    }
    let profit = share_price - high_water_mark;
    let fee_value = math::apply_bps(profit, rate_bps)?;
    let net_price = share_price - fee_value;
    let shares = if total_shares == 0 || fee_value == 0 {
        0
    } else {
        math::mul_div(total_shares, fee_value, net_price)?
    };
    Ok(Some(PerformanceFee {
        fee_value,
        shares,
        new_high_water_mark: net_price,
    }))
}

/// Shares minted by one accrual pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeAccrual {
    pub management_shares: Amount,
    pub performance_shares: Amount,
}

impl FeeAccrual {
    pub fn total(&self) -> Amount {
        self.management_shares + self.performance_shares
    }
}

/// Mint the management fee for time elapsed since the last accrual.
///
/// A no-op when no time has passed. Needs no prices.
pub(crate) fn accrue_management(state: &mut FundState, now: Timestamp) -> Result<Amount> {
    let last = state.config.last_fee_accrual_time;
    if now <= last {
        return Ok(0);
    }
    let shares = management_fee_shares(
        state.total_shares,
        state.config.management_fee_bps,
        now - last,
    )?;
    if shares > 0 {
        let recipient = state.config.fee_recipient.clone();
        state.mint(&recipient, shares)?;
        info!(
            "management fee: minted {shares} shares to {recipient} for {}s",
            now - last
        );
    }
    state.config.last_fee_accrual_time = now;
    Ok(shares)
}

/// Mint the performance fee against the current share price and raise the
/// high-water mark.
pub(crate) fn accrue_performance(
    state: &mut FundState,
    prices: &PriceAggregator,
    now: Timestamp,
) -> Result<Amount> {
    let nav = state.valuate(prices, now)?.nav;
    let share_price = state.share_price(nav)?;
    let Some(fee) = performance_fee(
        state.total_shares,
        share_price,
        state.high_water_mark,
        state.config.performance_fee_bps,
    )?
    else {
        return Ok(0);
    };
    if fee.shares > 0 {
        let recipient = state.config.fee_recipient.clone();
        state.mint(&recipient, fee.shares)?;
        info!(
            "performance fee: minted {} shares to {recipient}, high-water mark {} -> {}",
            fee.shares, state.high_water_mark, fee.new_high_water_mark
        );
    }
    debug_assert!(fee.new_high_water_mark > state.high_water_mark);
    state.high_water_mark = fee.new_high_water_mark;
    Ok(fee.shares)
}

/// Management fee, then performance fee. Runs before any NAV-dependent
/// share arithmetic.
pub(crate) fn accrue(
    state: &mut FundState,
    prices: &PriceAggregator,
    now: Timestamp,
) -> Result<FeeAccrual> {
    let management_shares = accrue_management(state, now)?;
    let performance_shares = accrue_performance(state, prices, now)?;
    Ok(FeeAccrual {
        management_shares,
        performance_shares,
    })
}
