//! Timelocked administrative changes.
//!
//! Fee rates, the rebalance policy and the basket composition change only by
//! proposing a change, waiting out the configured delay, and executing it.
//! One change may be pending at a time.

use std::collections::BTreeSet;
use std::fmt;

use log::info;

use crate::config;
use crate::error::{FundError, Result};
use crate::fees;
use crate::ledger::FundState;
use crate::math;
use crate::price::PriceAggregator;
use crate::types::{Asset, AssetId, Bps, Timestamp};
use crate::weights::TargetWeights;

/// A change to fund parameters that requires the timelock.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AdminChange {
    SetFees {
        management_fee_bps: Bps,
        performance_fee_bps: Bps,
    },
    SetRebalancePolicy {
        interval: u64,
        tolerance_bps: Bps,
    },
    /// Add `asset` to the basket. `weights` covers every existing asset plus it.
    AddAsset {
        asset: Asset,
        weights: TargetWeights,
    },
    /// Drop a zero-balance asset. `weights` covers every remaining asset.
    RemoveAsset {
        asset: AssetId,
        weights: TargetWeights,
    },
}

impl fmt::Display for AdminChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminChange::SetFees {
                management_fee_bps,
                performance_fee_bps,
            } => write!(
                f,
                "set fees: management {management_fee_bps} bps, performance {performance_fee_bps} bps"
            ),
            AdminChange::SetRebalancePolicy {
                interval,
                tolerance_bps,
            } => write!(
                f,
                "set rebalance policy: every {interval}s, tolerance {tolerance_bps} bps"
            ),
            AdminChange::AddAsset { asset, .. } => write!(f, "add asset {}", asset.id),
            AdminChange::RemoveAsset { asset, .. } => write!(f, "remove asset {asset}"),
        }
    }
}

/// A proposed change waiting for its timelock.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingChange {
    pub change: AdminChange,
    pub proposed_at: Timestamp,
    /// Earliest execution time.
    pub eta: Timestamp,
}

fn basket(weights: &TargetWeights) -> BTreeSet<&AssetId> {
    weights.assets().collect()
}

/// Check `change` against the current state and price registry.
pub(crate) fn validate(
    state: &FundState,
    prices: &PriceAggregator,
    change: &AdminChange,
) -> Result<()> {
    match change {
        AdminChange::SetFees {
            management_fee_bps,
            performance_fee_bps,
        } => config::validate_fees(*management_fee_bps, *performance_fee_bps),
        AdminChange::SetRebalancePolicy {
            interval,
            tolerance_bps,
        } => config::validate_rebalance_policy(*interval, *tolerance_bps),
        AdminChange::AddAsset { asset, weights } => {
            if asset.id.is_empty() {
                return Err(FundError::invalid("empty asset id"));
            }
            if state.weights.contains(&asset.id) || state.asset(&asset.id).is_ok() {
                return Err(FundError::invalid(format!(
                    "{} is already in the basket",
                    asset.id
                )));
            }
            math::unit_scale(asset.decimals)?;
            if !prices.is_priced(&asset.id) {
                return Err(FundError::invalid(format!(
                    "{} has no registered price sources",
                    asset.id
                )));
            }
            let mut expected = basket(&state.weights);
            expected.insert(&asset.id);
            if basket(weights) != expected {
                return Err(FundError::invalid(format!(
                    "new weights must cover the current basket plus {}",
                    asset.id
                )));
            }
            Ok(())
        }
        AdminChange::RemoveAsset { asset, weights } => {
            if !state.weights.contains(asset) {
                return Err(FundError::invalid(format!("{asset} is not in the basket")));
            }
            if asset == &state.base_asset {
                return Err(FundError::invalid(format!(
                    "cannot remove base asset {asset}"
                )));
            }
            let balance = state.balance_of(asset);
            if balance > 0 {
                return Err(FundError::invalid(format!(
                    "cannot remove {asset} while the fund holds {balance} of it"
                )));
            }
            let mut expected = basket(&state.weights);
            expected.remove(asset);
            if basket(weights) != expected {
                return Err(FundError::invalid(format!(
                    "new weights must cover the current basket minus {asset}"
                )));
            }
            Ok(())
        }
    }
}

/// Record `change` as pending. Rejects a second proposal.
pub(crate) fn propose(
    state: &mut FundState,
    prices: &PriceAggregator,
    change: AdminChange,
    now: Timestamp,
) -> Result<PendingChange> {
    if let Some(pending) = &state.pending {
        return Err(FundError::invalid(format!(
            "a change is already pending ({}, eta {})",
            pending.change, pending.eta
        )));
    }
    validate(state, prices, &change)?;
    let pending = PendingChange {
        change,
        proposed_at: now,
        eta: now.saturating_add(state.config.timelock_delay),
    };
    info!("proposed {} (eta {})", pending.change, pending.eta);
    state.pending = Some(pending.clone());
    Ok(pending)
}

/// Apply the pending change once its timelock has elapsed.
///
/// Fee changes first accrue fees under the old rates.
pub(crate) fn execute(
    state: &mut FundState,
    prices: &PriceAggregator,
    now: Timestamp,
) -> Result<AdminChange> {
    let pending = state
        .pending
        .take()
        .ok_or_else(|| FundError::invalid("no change is pending"))?;
    if now < pending.eta {
        return Err(FundError::Timelocked { eta: pending.eta });
    }
    // State may have moved since the proposal.
    validate(state, prices, &pending.change)?;

    match &pending.change {
        AdminChange::SetFees {
            management_fee_bps,
            performance_fee_bps,
        } => {
            fees::accrue(state, prices, now)?;
            state.config.management_fee_bps = *management_fee_bps;
            state.config.performance_fee_bps = *performance_fee_bps;
        }
        AdminChange::SetRebalancePolicy {
            interval,
            tolerance_bps,
        } => {
            state.config.rebalance_interval = *interval;
            state.config.weight_tolerance_bps = *tolerance_bps;
        }
        AdminChange::AddAsset { asset, weights } => {
            state.assets.push(asset.clone());
            state.balances.insert(asset.id.clone(), 0);
            state.weights = weights.clone();
        }
        AdminChange::RemoveAsset { asset, weights } => {
            state.assets.retain(|a| &a.id != asset);
            state.balances.remove(asset);
            state.weights = weights.clone();
        }
    }
    state.validate()?;
    info!("executed {}", pending.change);
    Ok(pending.change)
}

/// Drop the pending change.
pub(crate) fn cancel(state: &mut FundState) -> Result<PendingChange> {
    let pending = state
        .pending
        .take()
        .ok_or_else(|| FundError::invalid("no change is pending"))?;
    info!("cancelled {}", pending.change);
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FundConfig;
    use crate::math::WAD;
    use crate::price::ManualFeed;
    use crate::types::AccountId;
    use std::sync::Arc;

    fn id(s: &str) -> AssetId {
        AssetId::new(s)
    }

    fn state() -> FundState {
        let weights = TargetWeights::new(&[(id("USD"), 5_000), (id("ETH"), 5_000)]).unwrap();
        FundState::new(
            vec![Asset::new("USD", 6), Asset::new("ETH", 18)],
            id("USD"),
            weights,
            FundConfig::new(AccountId::new("treasury"), 0),
        )
        .unwrap()
    }

    fn prices() -> PriceAggregator {
        let feed = Arc::new(ManualFeed::new("feed"));
        let mut p = PriceAggregator::new();
        for (a, px) in [("USD", WAD), ("ETH", 2_000 * WAD), ("BTC", 60_000 * WAD)] {
            feed.set_price(&id(a), px, 0);
            p.add_asset(id(a)).unwrap();
            p.add_source(&id(a), feed.clone(), u64::MAX).unwrap();
        }
        p
    }

    #[test]
    fn timelock_is_enforced() {
        let mut s = state();
        let p = prices();
        let change = AdminChange::SetRebalancePolicy {
            interval: 3_600,
            tolerance_bps: 200,
        };
        let pending = propose(&mut s, &p, change, 100).unwrap();
        assert_eq!(pending.eta, 100 + 2 * 86_400);

        let err = execute(&mut s, &p, pending.eta - 1).unwrap_err();
        assert_eq!(err, FundError::Timelocked { eta: pending.eta });
        // Callers run this on a working copy and drop it on error.
        let mut s = state();
        propose(&mut s, &p, pending.change.clone(), 100).unwrap();
        execute(&mut s, &p, pending.eta).unwrap();
        assert_eq!(s.config.rebalance_interval, 3_600);
        assert_eq!(s.config.weight_tolerance_bps, 200);
        assert!(s.pending.is_none());
    }

    #[test]
    fn one_pending_change_at_a_time() {
        let mut s = state();
        let p = prices();
        let change = AdminChange::SetFees {
            management_fee_bps: 100,
            performance_fee_bps: 1_000,
        };
        propose(&mut s, &p, change.clone(), 0).unwrap();
        assert!(propose(&mut s, &p, change, 0).is_err());
        cancel(&mut s).unwrap();
        assert!(cancel(&mut s).is_err());
    }

    #[test]
    fn fee_caps_checked_on_proposal() {
        let mut s = state();
        let change = AdminChange::SetFees {
            management_fee_bps: 5_000,
            performance_fee_bps: 0,
        };
        assert!(propose(&mut s, &prices(), change, 0).is_err());
    }

    #[test]
    fn add_asset_requires_matching_weights_and_prices() {
        let p = prices();
        let mut s = state();
        let bad = AdminChange::AddAsset {
            asset: Asset::new("BTC", 8),
            weights: TargetWeights::new(&[(id("USD"), 5_000), (id("BTC"), 5_000)]).unwrap(),
        };
        assert!(propose(&mut s, &p, bad, 0).is_err());

        let unpriced = AdminChange::AddAsset {
            asset: Asset::new("SOL", 9),
            weights: TargetWeights::new(&[(id("USD"), 4_000), (id("ETH"), 4_000), (id("SOL"), 2_000)])
                .unwrap(),
        };
        assert!(propose(&mut s, &p, unpriced, 0).is_err());

        let good = AdminChange::AddAsset {
            asset: Asset::new("BTC", 8),
            weights: TargetWeights::new(&[(id("USD"), 4_000), (id("ETH"), 4_000), (id("BTC"), 2_000)])
                .unwrap(),
        };
        propose(&mut s, &p, good, 0).unwrap();
        execute(&mut s, &p, u64::MAX).unwrap();
        assert_eq!(s.weights.get(&id("BTC")), Some(2_000));
        assert_eq!(s.asset(&id("BTC")).unwrap().decimals, 8);
    }

    #[test]
    fn remove_asset_requires_zero_balance() {
        let p = prices();
        let weights = TargetWeights::new(&[(id("USD"), 10_000)]).unwrap();
        let change = AdminChange::RemoveAsset {
            asset: id("ETH"),
            weights: weights.clone(),
        };

        let mut s = state();
        s.credit(&id("ETH"), 1).unwrap();
        assert!(propose(&mut s, &p, change.clone(), 0).is_err());

        let mut s = state();
        propose(&mut s, &p, change, 0).unwrap();
        execute(&mut s, &p, u64::MAX).unwrap();
        assert!(!s.weights.contains(&id("ETH")));
        assert!(s.asset(&id("ETH")).is_err());

        let base = AdminChange::RemoveAsset {
            asset: id("USD"),
            weights,
        };
        assert!(propose(&mut state(), &p, base, 0).is_err());
    }
}
