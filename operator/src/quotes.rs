//! Price snapshot (prices.json) loading and validation.
//!
//! The snapshot lists price sources in fallback order. Each source carries
//! its own staleness bound and per-asset observations:
//!
//! ```json
//! {
//!   "sources": [
//!     { "name": "primary", "max_age_secs": 600,
//!       "prices": { "ETH": { "price": "2000.5", "updated_at": 1700000000 } } },
//!     { "name": "backup", "max_age_secs": 3600, "prices": {} }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use basketfund::{AssetId, ManualFeed, PriceAggregator, Timestamp};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::parse_units;

/// Prices are quoted with 18 fractional digits (WAD).
const PRICE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub sources: Vec<SourceSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub name: String,
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    #[serde(default)]
    pub prices: BTreeMap<String, QuoteEntry>,
}

fn default_max_age() -> u64 {
    3_600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteEntry {
    /// Decimal price per whole asset unit.
    pub price: String,
    pub updated_at: Timestamp,
}

impl PriceSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::PricesRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: PriceSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Prices("no price sources".into()));
        }
        let mut seen = FxHashSet::default();
        for s in &self.sources {
            if s.name.trim().is_empty() {
                return Err(Error::Prices("empty source name".into()));
            }
            if !seen.insert(s.name.as_str()) {
                return Err(Error::Prices(format!("duplicate source: {}", s.name)));
            }
            for (asset, q) in &s.prices {
                parse_units(&q.price, PRICE_DECIMALS).map_err(|_| {
                    Error::Prices(format!("{}: bad price '{}' for {asset}", s.name, q.price))
                })?;
            }
        }
        Ok(())
    }

    /// One feed per source, in fallback order, with its staleness bound.
    pub fn feeds(&self) -> Result<Vec<(Arc<ManualFeed>, u64)>> {
        self.sources
            .iter()
            .map(|s| -> Result<(Arc<ManualFeed>, u64)> {
                let feed = ManualFeed::new(&s.name);
                for (asset, q) in &s.prices {
                    feed.set_price(
                        &AssetId::new(asset),
                        parse_units(&q.price, PRICE_DECIMALS)?,
                        q.updated_at,
                    );
                }
                Ok((Arc::new(feed), s.max_age_secs))
            })
            .collect()
    }

    /// An aggregator with every source registered for every asset. Sources
    /// without an observation for an asset simply fall through.
    pub fn aggregator(&self, assets: &[AssetId]) -> Result<PriceAggregator> {
        let feeds = self.feeds()?;
        let mut prices = PriceAggregator::new();
        for asset in assets {
            prices.add_asset(asset.clone())?;
            for (feed, max_age) in &feeds {
                prices.add_source(asset, feed.clone(), *max_age)?;
            }
        }
        Ok(prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basketfund::WAD;

    fn snapshot_json() -> &'static str {
        r#"{
            "sources": [
                { "name": "primary", "max_age_secs": 60,
                  "prices": { "ETH": { "price": "2000", "updated_at": 100 } } },
                { "name": "backup",
                  "prices": { "ETH": { "price": "1990.5", "updated_at": 990 } } }
            ]
        }"#
    }

    #[test]
    fn fallback_order_follows_file_order() {
        let snap = PriceSnapshot::from_json(snapshot_json()).unwrap();
        let eth = AssetId::new("ETH");
        let prices = snap.aggregator(std::slice::from_ref(&eth)).unwrap();

        let fresh = prices.get_price_with_fallback(&eth, 120);
        assert_eq!(fresh.price, 2_000 * WAD);
        assert_eq!(fresh.source_index, Some(0));

        let later = prices.get_price_with_fallback(&eth, 1_000);
        assert_eq!(later.price, 1_990 * WAD + WAD / 2);
        assert_eq!(later.source_index, Some(1));
    }

    #[test]
    fn missing_asset_is_registered_but_invalid() {
        let snap = PriceSnapshot::from_json(snapshot_json()).unwrap();
        let btc = AssetId::new("BTC");
        let prices = snap.aggregator(std::slice::from_ref(&btc)).unwrap();
        assert!(prices.is_priced(&btc));
        assert!(!prices.get_price_with_fallback(&btc, 120).valid);
    }

    #[test]
    fn rejects_duplicate_sources_and_bad_prices() {
        let dup = r#"{"sources": [{"name": "a"}, {"name": "a"}]}"#;
        assert!(PriceSnapshot::from_json(dup).is_err());

        let bad = r#"{"sources": [{"name": "a",
            "prices": {"ETH": {"price": "-1", "updated_at": 0}}}]}"#;
        assert!(PriceSnapshot::from_json(bad).is_err());

        assert!(PriceSnapshot::from_json(r#"{"sources": []}"#).is_err());
    }
}
