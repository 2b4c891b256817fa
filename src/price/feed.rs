//! In-memory price source driven by explicit updates.
//!
//! Backs tests and the operator's JSON price snapshots.

use std::sync::RwLock;

use rustc_hash::FxHashMap;

use super::{Observation, PriceSource};
use crate::types::{AssetId, Timestamp, Wad};

/// A price source whose observations are pushed by the caller.
pub struct ManualFeed {
    name: String,
    observations: RwLock<FxHashMap<AssetId, Observation>>,
}

impl ManualFeed {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            observations: RwLock::new(FxHashMap::default()),
        }
    }

    /// Record `price` for `asset` as of `updated_at`.
    pub fn set_price(&self, asset: &AssetId, price: Wad, updated_at: Timestamp) {
        let mut obs = self
            .observations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        obs.insert(asset.clone(), Observation { price, updated_at });
    }

    /// Forget any observation for `asset`.
    pub fn clear(&self, asset: &AssetId) {
        let mut obs = self
            .observations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        obs.remove(asset);
    }
}

impl PriceSource for ManualFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn observe(&self, asset: &AssetId) -> Option<Observation> {
        self.observations
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(asset)
            .copied()
    }
}
