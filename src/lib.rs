//! # basketfund
//!
//! Accounting and rebalancing engine for a pooled-asset fund.
//!
//! Investors deposit a base asset and receive shares; the fund holds a basket
//! of assets at target weights, charges management and performance fees by
//! minting shares, and lets a manager trade the basket back to its targets.
//!
//! ## Features
//!
//! - **NAV and share price**: balance × price over the basket, recomputed on
//!   every query, with 256-bit intermediates for every product
//! - **Deposit / redeem**: proportional mint and burn, in-kind or converted
//!   to a single asset
//! - **Fees**: continuous management fee, high-water-mark performance fee
//! - **Price fallback**: ordered sources per asset with staleness bounds
//! - **Rebalancing**: drift detection and greedy trade planning, verified
//!   against the tolerance band after execution
//! - **Circuit breaker**: Normal / Paused / Emergency, with a price-free
//!   emergency exit
//! - **All-or-nothing**: every mutating operation commits fully or not at all
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use basketfund::collaborators::Roles;
//! use basketfund::paper::{PaperExecutor, Vault};
//! use basketfund::price::{ManualFeed, PriceAggregator};
//! use basketfund::{AccountId, Asset, AssetId, Fund, FundConfig, FundState, TargetWeights, WAD};
//!
//! let (usd, eth) = (AssetId::new("USD"), AssetId::new("ETH"));
//! let alice = AccountId::new("alice");
//!
//! // One feed for both assets
//! let feed = Arc::new(ManualFeed::new("feed"));
//! feed.set_price(&usd, WAD, 0);
//! feed.set_price(&eth, 2_000 * WAD, 0);
//! let mut prices = PriceAggregator::new();
//! for asset in [&usd, &eth] {
//!     prices.add_asset(asset.clone()).unwrap();
//!     prices.add_source(asset, feed.clone(), 3_600).unwrap();
//! }
//!
//! // 60/40 USD/ETH
//! let state = FundState::new(
//!     vec![Asset::new("USD", 6), Asset::new("ETH", 18)],
//!     usd.clone(),
//!     TargetWeights::new(&[(usd.clone(), 6_000), (eth.clone(), 4_000)]).unwrap(),
//!     FundConfig::new(AccountId::new("treasury"), 0),
//! )
//! .unwrap();
//!
//! let vault = Arc::new(
//!     Vault::builder()
//!         .with_balance(alice.clone(), usd.clone(), 10_000_000_000)
//!         .build(),
//! );
//! let executor = PaperExecutor::builder()
//!     .with_price(usd.clone(), WAD, 6)
//!     .with_price(eth.clone(), 2_000 * WAD, 18)
//!     .build();
//!
//! let fund = Fund::builder(state)
//!     .prices(prices)
//!     .custody(vault)
//!     .executor(Arc::new(executor))
//!     .authorizer(Arc::new(Roles::new(AccountId::new("manager"))))
//!     .build()
//!     .unwrap();
//!
//! // 10,000 USD in: 10,000 shares at 1.0, 4,000 USD swapped into 2 ETH
//! let receipt = fund.deposit(&alice, 10_000_000_000, 60).unwrap();
//! assert_eq!(receipt.shares_minted, 10_000 * WAD);
//! assert_eq!(fund.snapshot().balance_of(&eth), 2 * WAD);
//! assert_eq!(fund.get_share_price(60).unwrap(), WAD);
//!
//! // Redeem half in kind
//! let out = fund.redeem(&alice, 5_000 * WAD, 120).unwrap();
//! assert_eq!(out.assets, vec![(usd, 3_000_000_000), (eth, WAD)]);
//! ```
//!
//! ## Number Representation
//!
//! | Quantity | Type | Scale |
//! |----------|------|-------|
//! | Asset amount | [`Amount`] (`u128`) | raw units, `10^decimals` per whole unit |
//! | Price, value, NAV | [`Wad`] (`u128`) | `1e18` = 1.0 |
//! | Shares | [`Amount`] | 18 decimals |
//! | Weights, fees | [`Bps`] (`u32`) | 10,000 = 100% |
//!
//! ## Circuit Breaker
//!
//! | State | Deposit | Rebalance | Redeem | Emergency redeem |
//! |-------|---------|-----------|--------|------------------|
//! | **Normal** | yes | yes | yes | no |
//! | **Paused** | no | no | yes | no |
//! | **Emergency** | no | no | no | yes |

pub mod admin;
pub mod collaborators;
pub mod config;
mod emergency;
mod error;
pub mod fees;
mod fund;
mod ledger;
mod lock;
pub mod math;
pub mod paper;
#[cfg(feature = "persistence")]
pub mod persistence;
pub mod planner;
pub mod price;
mod types;
mod weights;

pub use admin::{AdminChange, PendingChange};
pub use collaborators::{Authorizer, Custody, Roles, SwapRequest, TradeExecutor};
pub use config::FundConfig;
pub use emergency::{EmergencyState, Operation};
pub use error::{ErrorKind, FundError, Result};
pub use fees::FeeAccrual;
pub use fund::{
    DepositReceipt, ExecutedSwap, FeeSummary, Fund, FundBuilder, RebalanceReport,
    RedemptionReceipt, SingleAssetRedemption,
};
pub use ledger::{BOOTSTRAP_SHARE_PRICE, FundState, SHARE_DECIMALS, Valuation, ValuedAsset};
pub use math::{BPS_DENOMINATOR, SECONDS_PER_YEAR, WAD};
pub use planner::{Drift, DriftReport, RebalancePhase, TradeIntent};
pub use price::{ManualFeed, Observation, PriceAggregator, PriceQuote, PriceSource};
pub use types::{AccountId, Amount, Asset, AssetId, Bps, Timestamp, Wad};
pub use weights::{TargetWeight, TargetWeights};
