//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use basketfund::paper::{PaperExecutor, Vault};
use basketfund::{
    AccountId, Asset, AssetId, Fund, FundConfig, FundState, ManualFeed, PriceAggregator, Roles,
    TargetWeights, Timestamp, WAD, Wad,
};

pub const MAX_AGE: u64 = 3_600;
/// Starting wallet balance of every investor, in base-asset raw units.
pub const WALLET: u128 = 1_000_000 * WAD;

pub fn id(s: &str) -> AssetId {
    AssetId::new(s)
}
pub fn x() -> AssetId {
    id("X")
}
pub fn y() -> AssetId {
    id("Y")
}
pub fn z() -> AssetId {
    id("Z")
}
pub fn alice() -> AccountId {
    AccountId::new("alice")
}
pub fn bob() -> AccountId {
    AccountId::new("bob")
}
pub fn manager() -> AccountId {
    AccountId::new("manager")
}
pub fn guardian() -> AccountId {
    AccountId::new("guardian")
}
pub fn treasury() -> AccountId {
    AccountId::new("treasury")
}

/// A fund wired to paper collaborators. All assets have 18 decimals and the
/// first asset is the base asset.
pub struct Harness {
    pub fund: Fund,
    pub vault: Arc<Vault>,
    pub executor: Arc<PaperExecutor>,
    pub feed: Arc<ManualFeed>,
    pub assets: Vec<AssetId>,
}

impl Harness {
    pub fn new(basket: &[(&str, u32, Wad)]) -> Self {
        Self::with_config(basket, |_| {})
    }

    pub fn with_config(basket: &[(&str, u32, Wad)], configure: impl FnOnce(&mut FundConfig)) -> Self {
        let assets: Vec<AssetId> = basket.iter().map(|(a, _, _)| id(a)).collect();
        let base = assets[0].clone();

        let feed = Arc::new(ManualFeed::new("primary"));
        let mut prices = PriceAggregator::new();
        let mut executor = PaperExecutor::builder();
        for (asset, _, price) in basket {
            feed.set_price(&id(asset), *price, 0);
            prices.add_asset(id(asset)).unwrap();
            prices.add_source(&id(asset), feed.clone(), MAX_AGE).unwrap();
            executor = executor.with_price(id(asset), *price, 18);
        }
        let executor = Arc::new(executor.build());

        let weights: Vec<(AssetId, u32)> = basket.iter().map(|(a, w, _)| (id(a), *w)).collect();
        let mut config = FundConfig::new(treasury(), 0);
        configure(&mut config);
        let state = FundState::new(
            basket.iter().map(|(a, _, _)| Asset::new(a, 18)).collect(),
            base.clone(),
            TargetWeights::new(&weights).unwrap(),
            config,
        )
        .unwrap();

        let vault = Arc::new(
            Vault::builder()
                .with_balance(alice(), base.clone(), WALLET)
                .with_balance(bob(), base, WALLET)
                .build(),
        );

        let fund = Fund::builder(state)
            .prices(prices)
            .custody(vault.clone())
            .executor(executor.clone())
            .authorizer(Arc::new(Roles::new(manager()).with_guardian(guardian())))
            .build()
            .unwrap();

        Self {
            fund,
            vault,
            executor,
            feed,
            assets,
        }
    }

    /// Basket {X:50%, Y:30%, Z:20%} at prices {1, 300, 15}.
    pub fn scenario() -> Self {
        Self::new(&[("X", 5_000, WAD), ("Y", 3_000, 300 * WAD), ("Z", 2_000, 15 * WAD)])
    }

    pub fn scenario_with(configure: impl FnOnce(&mut FundConfig)) -> Self {
        Self::with_config(
            &[("X", 5_000, WAD), ("Y", 3_000, 300 * WAD), ("Z", 2_000, 15 * WAD)],
            configure,
        )
    }

    /// Move both the oracle and the market price of `asset`.
    pub fn set_price(&self, asset: &AssetId, price: Wad, now: Timestamp) {
        self.feed.set_price(asset, price, now);
        self.executor.set_price(asset, price, 18);
    }

    /// Re-stamp every current oracle price at `now`.
    pub fn refresh(&self, now: Timestamp) {
        for asset in &self.assets {
            if let Some(obs) = basketfund::PriceSource::observe(self.feed.as_ref(), asset) {
                self.feed.set_price(asset, obs.price, now);
            }
        }
    }

    pub fn wallet(&self, holder: &AccountId, asset: &AssetId) -> u128 {
        self.vault.balance(holder, asset)
    }

    pub fn balance(&self, asset: &AssetId) -> u128 {
        self.fund.snapshot().balance_of(asset)
    }
}
