//! Price source aggregation with ordered fallback.
//!
//! Each asset has an ordered list of sources (primary, secondary, ...). A
//! quote is valid only when its source reports a non-zero price that is no
//! older than that source's staleness bound. The first valid quote wins; if
//! none is valid the result is explicitly invalid, never a stale or zero
//! substitute.
//!
//! ```
//! use std::sync::Arc;
//! use basketfund::price::{ManualFeed, PriceAggregator};
//! use basketfund::{AssetId, WAD};
//!
//! let eth = AssetId::new("ETH");
//! let primary = Arc::new(ManualFeed::new("primary"));
//! let backup = Arc::new(ManualFeed::new("backup"));
//! primary.set_price(&eth, 2_000 * WAD, 100); // stale at t=1000
//! backup.set_price(&eth, 1_990 * WAD, 990);
//!
//! let mut prices = PriceAggregator::new();
//! prices.add_asset(eth.clone()).unwrap();
//! prices.add_source(&eth, primary, 60).unwrap();
//! prices.add_source(&eth, backup, 60).unwrap();
//!
//! let quote = prices.get_price_with_fallback(&eth, 1_000);
//! assert!(quote.valid);
//! assert_eq!(quote.price, 1_990 * WAD);
//! assert_eq!(quote.source_index, Some(1));
//! ```

mod feed;

pub use feed::ManualFeed;

use std::sync::Arc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::{FundError, Result};
use crate::types::{AssetId, Timestamp, Wad};

/// A raw reading from a price source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Price per whole asset unit (WAD).
    pub price: Wad,
    pub updated_at: Timestamp,
}

/// Anything that can report a price for an asset.
pub trait PriceSource: Send + Sync {
    /// Unique name, used to reject duplicate registrations.
    fn name(&self) -> &str;

    /// Latest observation, or `None` if the source has nothing for `asset`.
    fn observe(&self, asset: &AssetId) -> Option<Observation>;
}

/// Result of a fallback lookup. Ephemeral: recomputed on every call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceQuote {
    pub asset: AssetId,
    /// Zero when `valid` is false.
    pub price: Wad,
    pub valid: bool,
    /// Position of the answering source in the asset's source list.
    pub source_index: Option<usize>,
}

struct SourceSlot {
    source: Arc<dyn PriceSource>,
    max_age: u64,
}

impl SourceSlot {
    fn valid_price(&self, asset: &AssetId, now: Timestamp) -> Option<Wad> {
        let obs = self.source.observe(asset)?;
        if obs.price == 0 || obs.updated_at > now || now - obs.updated_at > self.max_age {
            return None;
        }
        Some(obs.price)
    }
}

/// Normalizes several price sources into one validated quote per asset.
#[derive(Default)]
pub struct PriceAggregator {
    sources: FxHashMap<AssetId, Vec<SourceSlot>>,
}

impl PriceAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset with an empty source list.
    pub fn add_asset(&mut self, asset: AssetId) -> Result<()> {
        if asset.is_empty() {
            return Err(FundError::invalid("empty asset id"));
        }
        if self.sources.contains_key(&asset) {
            return Err(FundError::invalid(format!("asset {asset} is already priced")));
        }
        self.sources.insert(asset, Vec::new());
        Ok(())
    }

    /// Unregister an asset and all of its sources.
    pub fn remove_asset(&mut self, asset: &AssetId) -> Result<()> {
        self.sources
            .remove(asset)
            .map(|_| ())
            .ok_or_else(|| FundError::invalid(format!("asset {asset} is not priced")))
    }

    /// Append `source` to the end of `asset`'s fallback order.
    pub fn add_source(
        &mut self,
        asset: &AssetId,
        source: Arc<dyn PriceSource>,
        max_age: u64,
    ) -> Result<()> {
        let slots = self
            .sources
            .get_mut(asset)
            .ok_or_else(|| FundError::invalid(format!("asset {asset} is not priced")))?;
        if slots.iter().any(|s| s.source.name() == source.name()) {
            return Err(FundError::invalid(format!(
                "source {} already registered for {asset}",
                source.name()
            )));
        }
        slots.push(SourceSlot { source, max_age });
        Ok(())
    }

    /// Remove the source called `name` from `asset`'s fallback order.
    pub fn remove_source(&mut self, asset: &AssetId, name: &str) -> Result<()> {
        let slots = self
            .sources
            .get_mut(asset)
            .ok_or_else(|| FundError::invalid(format!("asset {asset} is not priced")))?;
        let before = slots.len();
        slots.retain(|s| s.source.name() != name);
        if slots.len() == before {
            return Err(FundError::invalid(format!(
                "source {name} is not registered for {asset}"
            )));
        }
        Ok(())
    }

    pub fn is_priced(&self, asset: &AssetId) -> bool {
        self.sources.contains_key(asset)
    }

    /// Source names for `asset` in fallback order.
    pub fn source_names(&self, asset: &AssetId) -> Vec<String> {
        self.sources
            .get(asset)
            .map(|slots| slots.iter().map(|s| s.source.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// First valid quote in priority order, or an explicitly invalid quote.
    pub fn get_price_with_fallback(&self, asset: &AssetId, now: Timestamp) -> PriceQuote {
        let slots = self.sources.get(asset).map(Vec::as_slice).unwrap_or_default();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(price) = slot.valid_price(asset, now) {
                if i > 0 {
                    debug!("{asset}: fell back to source #{i} ({})", slot.source.name());
                }
                return PriceQuote {
                    asset: asset.clone(),
                    price,
                    valid: true,
                    source_index: Some(i),
                };
            }
        }
        debug!("{asset}: no valid quote among {} sources", slots.len());
        PriceQuote {
            asset: asset.clone(),
            price: 0,
            valid: false,
            source_index: None,
        }
    }

    /// Validated price, or [`FundError::PriceUnavailable`].
    pub fn get_price(&self, asset: &AssetId, now: Timestamp) -> Result<Wad> {
        let quote = self.get_price_with_fallback(asset, now);
        if quote.valid {
            Ok(quote.price)
        } else {
            Err(FundError::PriceUnavailable(asset.clone()))
        }
    }

    /// Timestamp of the freshest non-zero observation across all sources,
    /// ignoring staleness bounds. Used for heartbeat checks.
    pub fn last_update(&self, asset: &AssetId) -> Option<Timestamp> {
        self.sources
            .get(asset)?
            .iter()
            .filter_map(|s| s.source.observe(asset))
            .filter(|o| o.price > 0)
            .map(|o| o.updated_at)
            .max()
    }
}

impl std::fmt::Debug for PriceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (asset, slots) in &self.sources {
            let names: Vec<&str> = slots.iter().map(|s| s.source.name()).collect();
            map.entry(asset, &names);
        }
        map.finish()
    }
}
