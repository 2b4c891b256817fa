//! Rebalance planner: weight drift and the trades that close it.
//!
//! Drift is measured at WAD precision (`WAD` = 100%). Trades are planned by
//! greedy pairing: over-weight assets, largest excess first, are matched
//! against under-weight assets, largest deficit first, each trade moving
//! `min(excess, deficit)` of value. Every trade exhausts at least one side,
//! so a plan has fewer trades than the basket has assets.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use log::debug;

use crate::error::Result;
use crate::ledger::Valuation;
use crate::math::{self, WAD};
use crate::types::{Amount, AssetId, Bps, Timestamp, Wad};

/// One asset's position relative to its target weight.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Drift {
    pub asset: AssetId,
    /// Current weight (WAD fraction of NAV).
    pub current: Wad,
    /// Target weight (WAD fraction).
    pub target: Wad,
    /// Current value of the holding (WAD).
    pub value: Wad,
}

impl Drift {
    /// `|current - target|`.
    pub fn drift(&self) -> Wad {
        self.current.abs_diff(self.target)
    }

    pub fn is_overweight(&self) -> bool {
        self.current > self.target
    }
}

/// Per-asset drifts of a valuation, in basket order.
///
/// With a zero NAV every current weight is zero.
pub fn compute_drifts(valuation: &Valuation) -> Result<Vec<Drift>> {
    valuation
        .entries
        .iter()
        .map(|e| {
            let current = if valuation.nav == 0 {
                0
            } else {
                math::mul_div(e.value, WAD, valuation.nav)?
            };
            Ok(Drift {
                asset: e.asset.clone(),
                current,
                target: math::bps_to_wad(e.target_bps),
                value: e.value,
            })
        })
        .collect()
}

/// Largest drift, or zero for an empty basket.
pub fn max_drift(drifts: &[Drift]) -> Wad {
    drifts.iter().map(Drift::drift).max().unwrap_or(0)
}

/// True if any asset's drift exceeds `tolerance_bps`.
pub fn validate_rebalance(drifts: &[Drift], tolerance_bps: Bps) -> bool {
    max_drift(drifts) > math::bps_to_wad(tolerance_bps)
}

/// Rebalance trigger: the interval has elapsed or drift exceeds tolerance.
pub fn rebalance_due(
    drifts: &[Drift],
    tolerance_bps: Bps,
    last_rebalance_time: Timestamp,
    interval: u64,
    now: Timestamp,
) -> bool {
    now >= last_rebalance_time.saturating_add(interval) || validate_rebalance(drifts, tolerance_bps)
}

/// One planned swap, handed to the trade executor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TradeIntent {
    pub from: AssetId,
    pub to: AssetId,
    /// Weight moved (WAD fraction of NAV).
    pub weight: Wad,
    /// Value moved (WAD).
    pub value: Wad,
    /// Raw units of `from` to sell.
    pub amount_in: Amount,
    /// Raw units of `to` expected at the valuation's prices.
    pub expected_out: Amount,
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SWAP {} {} -> {} (~{} {}, {} of NAV)",
            self.amount_in,
            self.from,
            self.to,
            self.expected_out,
            self.to,
            Percent(self.weight)
        )
    }
}

/// Greedy trade plan that brings every asset to its target weight at the
/// valuation's prices.
///
/// Ties are broken by basket order. Dust trades, where either side floors
/// to zero raw units, are dropped.
pub fn calculate_required_trades(valuation: &Valuation) -> Result<Vec<TradeIntent>> {
    let nav = valuation.nav;
    if nav == 0 {
        return Ok(Vec::new());
    }

    let mut over: Vec<(usize, Wad)> = Vec::new();
    let mut under: Vec<(usize, Wad)> = Vec::new();
    for (i, e) in valuation.entries.iter().enumerate() {
        let target_value = math::apply_bps(nav, e.target_bps)?;
        if e.value > target_value {
            over.push((i, e.value - target_value));
        } else if target_value > e.value {
            under.push((i, target_value - e.value));
        }
    }
    // Stable sorts keep basket order among equal gaps.
    over.sort_by(|a, b| b.1.cmp(&a.1));
    under.sort_by(|a, b| b.1.cmp(&a.1));

    let mut trades = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < over.len() && j < under.len() {
        let value = over[i].1.min(under[j].1);
        let src = &valuation.entries[over[i].0];
        let dst = &valuation.entries[under[j].0];

        let amount_in = math::amount_for_value(value, src.price, src.decimals)?.min(src.balance);
        let expected_out = valuation.convert(&src.asset, &dst.asset, amount_in)?;
        if amount_in > 0 && expected_out > 0 {
            let intent = TradeIntent {
                from: src.asset.clone(),
                to: dst.asset.clone(),
                weight: math::mul_div(value, WAD, nav)?,
                value,
                amount_in,
                expected_out,
            };
            debug!("planned {intent}");
            trades.push(intent);
        }

        over[i].1 -= value;
        under[j].1 -= value;
        if over[i].1 == 0 {
            i += 1;
        }
        if under[j].1 == 0 {
            j += 1;
        }
    }
    Ok(trades)
}

// ============================================================================
// Phase tracking
// ============================================================================

/// Where a rebalance currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebalancePhase {
    Idle,
    Planning,
    Executing,
}

impl fmt::Display for RebalancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalancePhase::Idle => write!(f, "idle"),
            RebalancePhase::Planning => write!(f, "planning"),
            RebalancePhase::Executing => write!(f, "executing"),
        }
    }
}

#[derive(Default)]
pub(crate) struct PhaseTracker(AtomicU8);

impl PhaseTracker {
    pub(crate) fn current(&self) -> RebalancePhase {
        match self.0.load(Ordering::Acquire) {
            1 => RebalancePhase::Planning,
            2 => RebalancePhase::Executing,
            _ => RebalancePhase::Idle,
        }
    }

    /// Enter `Planning`. The phase returns to `Idle` when the guard drops.
    pub(crate) fn begin(&self) -> PhaseGuard<'_> {
        self.0.store(1, Ordering::Release);
        PhaseGuard(self)
    }
}

pub(crate) struct PhaseGuard<'a>(&'a PhaseTracker);

impl PhaseGuard<'_> {
    pub(crate) fn executing(&self) {
        self.0.0.store(2, Ordering::Release);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.0.store(0, Ordering::Release);
    }
}

// ============================================================================
// Reporting
// ============================================================================

/// WAD fraction printed as a percentage with two decimals.
struct Percent(Wad);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = math::wad_to_bps(self.0);
        write!(f, "{}.{:02}%", bps / 100, bps % 100)
    }
}

/// Drift table for one valuation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DriftReport {
    pub nav: Wad,
    pub tolerance_bps: Bps,
    pub drifts: Vec<Drift>,
}

impl DriftReport {
    pub fn new(valuation: &Valuation, tolerance_bps: Bps) -> Result<Self> {
        Ok(Self {
            nav: valuation.nav,
            tolerance_bps,
            drifts: compute_drifts(valuation)?,
        })
    }

    pub fn max_drift(&self) -> Wad {
        max_drift(&self.drifts)
    }

    pub fn exceeds_tolerance(&self) -> bool {
        validate_rebalance(&self.drifts, self.tolerance_bps)
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DRIFT:")?;
        writeln!(
            f,
            "  {:8} {:>10} {:>10} {:>10}",
            "Asset", "Target", "Current", "Drift"
        )?;
        for d in &self.drifts {
            let flag = if d.drift() > math::bps_to_wad(self.tolerance_bps) {
                " *"
            } else {
                ""
            };
            writeln!(
                f,
                "  {:8} {:>10} {:>10} {:>10}{flag}",
                d.asset.as_str(),
                Percent(d.target).to_string(),
                Percent(d.current).to_string(),
                Percent(d.drift()).to_string(),
            )?;
        }
        writeln!(
            f,
            "\n  Max drift: {} (tolerance {})",
            Percent(self.max_drift()),
            Percent(math::bps_to_wad(self.tolerance_bps))
        )
    }
}
