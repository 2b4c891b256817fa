//! Target weights of the fund basket.

use rustc_hash::FxHashSet;

use crate::error::{FundError, Result};
use crate::math::BPS_DENOMINATOR;
use crate::types::{AssetId, Bps};

/// One basket entry: asset and its target weight in basis points.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetWeight {
    pub asset: AssetId,
    pub weight_bps: Bps,
}

/// Validated basket weights. The sum is always exactly 10,000 bps.
///
/// Entry order is the basket order used for deterministic iteration.
/// A zero weight keeps an asset tracked (and priced) without holding it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<TargetWeight>", into = "Vec<TargetWeight>")
)]
pub struct TargetWeights {
    entries: Vec<TargetWeight>,
}

impl TargetWeights {
    /// Build from `(asset, bps)` pairs.
    pub fn new(entries: &[(AssetId, Bps)]) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|(asset, weight_bps)| TargetWeight {
                asset: asset.clone(),
                weight_bps: *weight_bps,
            })
            .collect();
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<TargetWeight>) -> Result<Self> {
        if entries.is_empty() {
            return Err(FundError::invalid("target weights are empty"));
        }

        let mut seen = FxHashSet::default();
        for e in &entries {
            if e.asset.is_empty() {
                return Err(FundError::invalid("empty asset id in target weights"));
            }
            if !seen.insert(&e.asset) {
                return Err(FundError::invalid(format!(
                    "duplicate asset in target weights: {}",
                    e.asset
                )));
            }
        }

        let sum: u64 = entries.iter().map(|e| u64::from(e.weight_bps)).sum();
        if sum != u64::from(BPS_DENOMINATOR) {
            return Err(FundError::invalid(format!(
                "target weights sum to {sum} bps, expected {BPS_DENOMINATOR}"
            )));
        }

        Ok(Self { entries })
    }

    /// Target weight of `asset`, if it is part of the basket.
    pub fn get(&self, asset: &AssetId) -> Option<Bps> {
        self.entries
            .iter()
            .find(|e| &e.asset == asset)
            .map(|e| e.weight_bps)
    }

    pub fn contains(&self, asset: &AssetId) -> bool {
        self.get(asset).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetWeight> {
        self.entries.iter()
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.entries.iter().map(|e| &e.asset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<TargetWeight>> for TargetWeights {
    type Error = FundError;

    fn try_from(entries: Vec<TargetWeight>) -> Result<Self> {
        Self::from_entries(entries)
    }
}

impl From<TargetWeights> for Vec<TargetWeight> {
    fn from(weights: TargetWeights) -> Self {
        weights.entries
    }
}
