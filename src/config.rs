//! Fund configuration record.
//!
//! Created once at fund instantiation. Fee rates, rebalance interval and
//! tolerance change only through the timelocked paths in [`crate::admin`].

use crate::error::{FundError, Result};
use crate::math::BPS_DENOMINATOR;
use crate::types::{AccountId, Bps, Timestamp};

/// Highest accepted annual management fee (10%).
pub const MAX_MANAGEMENT_FEE_BPS: Bps = 1_000;
/// Highest accepted performance fee (50% of profit).
pub const MAX_PERFORMANCE_FEE_BPS: Bps = 5_000;
/// Highest accepted exit fee on single-asset redemption (5%).
pub const MAX_EXIT_FEE_BPS: Bps = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FundConfig {
    /// Annual management fee, pro-rated per second.
    pub management_fee_bps: Bps,
    /// Share of per-share profit above the high-water mark.
    pub performance_fee_bps: Bps,
    /// Seconds between time-triggered rebalances.
    pub rebalance_interval: u64,
    /// Maximum allowed drift per asset before a rebalance is warranted.
    pub weight_tolerance_bps: Bps,
    pub last_rebalance_time: Timestamp,
    pub last_fee_accrual_time: Timestamp,
    /// Receives minted fee shares and exit fees.
    pub fee_recipient: AccountId,
    /// Slippage bound handed to the trade executor for every swap.
    pub max_slippage_bps: Bps,
    /// Deducted from the converted total of a single-asset redemption.
    pub exit_fee_bps: Bps,
    /// Minimum delay between proposing and executing an administrative change.
    pub timelock_delay: u64,
    /// Maximum age of the freshest quote before emergency mode may be entered.
    pub price_heartbeat: u64,
}

impl FundConfig {
    /// A config with zero fees, a daily rebalance interval and a 5% band.
    pub fn new(fee_recipient: AccountId, created_at: Timestamp) -> Self {
        Self {
            management_fee_bps: 0,
            performance_fee_bps: 0,
            rebalance_interval: 86_400,
            weight_tolerance_bps: 500,
            last_rebalance_time: created_at,
            last_fee_accrual_time: created_at,
            fee_recipient,
            max_slippage_bps: 100,
            exit_fee_bps: 0,
            timelock_delay: 2 * 86_400,
            price_heartbeat: 3_600,
        }
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        validate_fees(self.management_fee_bps, self.performance_fee_bps)?;
        validate_rebalance_policy(self.rebalance_interval, self.weight_tolerance_bps)?;
        if self.max_slippage_bps > BPS_DENOMINATOR {
            return Err(FundError::invalid(format!(
                "max_slippage_bps must be <= {BPS_DENOMINATOR}, got {}",
                self.max_slippage_bps
            )));
        }
        if self.exit_fee_bps > MAX_EXIT_FEE_BPS {
            return Err(FundError::invalid(format!(
                "exit_fee_bps must be <= {MAX_EXIT_FEE_BPS}, got {}",
                self.exit_fee_bps
            )));
        }
        if self.fee_recipient.as_str().is_empty() {
            return Err(FundError::invalid("fee recipient must not be empty"));
        }
        if self.price_heartbeat == 0 {
            return Err(FundError::invalid("price_heartbeat must be > 0"));
        }
        Ok(())
    }
}

pub(crate) fn validate_fees(management_fee_bps: Bps, performance_fee_bps: Bps) -> Result<()> {
    if management_fee_bps > MAX_MANAGEMENT_FEE_BPS {
        return Err(FundError::invalid(format!(
            "management_fee_bps must be <= {MAX_MANAGEMENT_FEE_BPS}, got {management_fee_bps}"
        )));
    }
    if performance_fee_bps > MAX_PERFORMANCE_FEE_BPS {
        return Err(FundError::invalid(format!(
            "performance_fee_bps must be <= {MAX_PERFORMANCE_FEE_BPS}, got {performance_fee_bps}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_rebalance_policy(interval: u64, tolerance_bps: Bps) -> Result<()> {
    if interval == 0 {
        return Err(FundError::invalid("rebalance_interval must be > 0"));
    }
    if tolerance_bps == 0 || tolerance_bps >= BPS_DENOMINATOR {
        return Err(FundError::invalid(format!(
            "weight_tolerance_bps must be in (0, {BPS_DENOMINATOR}), got {tolerance_bps}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FundConfig {
        FundConfig::new(AccountId::new("treasury"), 1_000)
    }

    #[test]
    fn defaults_are_valid() {
        let c = config();
        assert!(c.validate().is_ok());
        assert_eq!(c.last_fee_accrual_time, 1_000);
        assert_eq!(c.last_rebalance_time, 1_000);
    }

    #[test]
    fn validate_catches_fee_caps() {
        let mut c = config();
        c.management_fee_bps = 1_001;
        assert!(c.validate().is_err());
        let mut c = config();
        c.performance_fee_bps = 5_001;
        assert!(c.validate().is_err());
        let mut c = config();
        c.exit_fee_bps = 501;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_tolerance() {
        let mut c = config();
        c.weight_tolerance_bps = 0;
        assert!(c.validate().is_err());
        c.weight_tolerance_bps = 10_000;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_catches_empty_recipient() {
        let mut c = config();
        c.fee_recipient = AccountId::new("");
        assert!(c.validate().is_err());
    }
}
