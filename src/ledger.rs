//! Fund ledger: custody balances, share registry, NAV and share price.
//!
//! [`FundState`] is the persisted record. Everything here is synchronous and
//! infallible apart from arithmetic and validation; orchestration, locking and
//! atomicity live in [`crate::fund`].

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::admin::PendingChange;
use crate::config::FundConfig;
use crate::emergency::EmergencyState;
use crate::error::{FundError, Result};
use crate::math::{self, WAD};
use crate::price::PriceAggregator;
use crate::types::{AccountId, Amount, Asset, AssetId, Timestamp, Wad};
use crate::weights::TargetWeights;

/// Share price reported while no shares exist (1.0).
pub const BOOTSTRAP_SHARE_PRICE: Wad = WAD;

/// Shares carry 18 decimals, so one whole share is `WAD` raw units.
pub const SHARE_DECIMALS: u8 = 18;

/// The persisted state of one fund.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FundState {
    pub(crate) assets: Vec<Asset>,
    pub(crate) base_asset: AssetId,
    pub(crate) weights: TargetWeights,
    pub(crate) balances: BTreeMap<AssetId, Amount>,
    pub(crate) holders: BTreeMap<AccountId, Amount>,
    pub(crate) total_shares: Amount,
    pub(crate) config: FundConfig,
    pub(crate) high_water_mark: Wad,
    pub(crate) emergency: EmergencyState,
    #[cfg_attr(feature = "serde", serde(default))]
    pub(crate) pending: Option<PendingChange>,
}

impl FundState {
    /// Create an empty fund.
    ///
    /// `assets` must cover every basket asset; `base_asset` must be in the basket.
    pub fn new(
        assets: Vec<Asset>,
        base_asset: AssetId,
        weights: TargetWeights,
        config: FundConfig,
    ) -> Result<Self> {
        let balances = assets.iter().map(|a| (a.id.clone(), 0)).collect();
        let state = Self {
            assets,
            base_asset,
            weights,
            balances,
            holders: BTreeMap::new(),
            total_shares: 0,
            config,
            high_water_mark: BOOTSTRAP_SHARE_PRICE,
            emergency: EmergencyState::Normal,
            pending: None,
        };
        state.validate()?;
        Ok(state)
    }

    /// Check structural invariants. Run on creation and after loading.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;

        let mut seen = FxHashSet::default();
        for a in &self.assets {
            if a.id.is_empty() {
                return Err(FundError::invalid("empty asset id"));
            }
            if !seen.insert(&a.id) {
                return Err(FundError::invalid(format!("duplicate asset {}", a.id)));
            }
            math::unit_scale(a.decimals)?;
        }
        for id in self.weights.assets() {
            if !seen.contains(id) {
                return Err(FundError::invalid(format!(
                    "basket asset {id} has no asset definition"
                )));
            }
        }
        if !self.weights.contains(&self.base_asset) {
            return Err(FundError::invalid(format!(
                "base asset {} must be part of the basket",
                self.base_asset
            )));
        }
        for (id, amount) in &self.balances {
            if *amount > 0 && !self.weights.contains(id) {
                return Err(FundError::invalid(format!(
                    "balance held in non-basket asset {id}"
                )));
            }
        }

        let mut sum: Amount = 0;
        for shares in self.holders.values() {
            sum = math::checked_add(sum, *shares)?;
        }
        if sum != self.total_shares {
            return Err(FundError::invalid(format!(
                "share registry sums to {sum}, total supply is {}",
                self.total_shares
            )));
        }
        Ok(())
    }

    // === Queries ===

    pub fn base_asset(&self) -> &AssetId {
        &self.base_asset
    }

    pub fn weights(&self) -> &TargetWeights {
        &self.weights
    }

    pub fn config(&self) -> &FundConfig {
        &self.config
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, id: &AssetId) -> Result<&Asset> {
        self.assets
            .iter()
            .find(|a| &a.id == id)
            .ok_or_else(|| FundError::invalid(format!("unknown asset {id}")))
    }

    #[inline]
    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    pub fn shares_of(&self, holder: &AccountId) -> Amount {
        self.holders.get(holder).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&AccountId, &Amount)> {
        self.holders.iter()
    }

    pub fn balance_of(&self, asset: &AssetId) -> Amount {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    pub fn balances(&self) -> impl Iterator<Item = (&AssetId, &Amount)> {
        self.balances.iter()
    }

    #[inline]
    pub fn high_water_mark(&self) -> Wad {
        self.high_water_mark
    }

    #[inline]
    pub fn emergency_state(&self) -> EmergencyState {
        self.emergency
    }

    pub fn pending_change(&self) -> Option<&PendingChange> {
        self.pending.as_ref()
    }

    /// Price every basket asset and sum the values.
    ///
    /// All-or-nothing: fails with `PriceUnavailable` if any basket asset,
    /// held or not, lacks a valid quote.
    pub fn valuate(&self, prices: &PriceAggregator, now: Timestamp) -> Result<Valuation> {
        let mut entries = Vec::with_capacity(self.weights.len());
        let mut nav: Wad = 0;
        for target in self.weights.iter() {
            let asset = self.asset(&target.asset)?;
            let price = prices.get_price(&asset.id, now)?;
            let balance = self.balance_of(&asset.id);
            let value = math::value_of(balance, price, asset.decimals)?;
            nav = math::checked_add(nav, value)?;
            entries.push(ValuedAsset {
                asset: asset.id.clone(),
                decimals: asset.decimals,
                balance,
                price,
                value,
                target_bps: target.weight_bps,
            });
        }
        Ok(Valuation { entries, nav })
    }

    /// NAV / total shares, or the bootstrap price when no shares exist.
    pub fn share_price(&self, nav: Wad) -> Result<Wad> {
        if self.total_shares == 0 {
            return Ok(BOOTSTRAP_SHARE_PRICE);
        }
        math::mul_div(nav, WAD, self.total_shares)
    }

    // === Mutations ===

    pub(crate) fn credit(&mut self, asset: &AssetId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(asset.clone()).or_insert(0);
        *balance = math::checked_add(*balance, amount)?;
        Ok(())
    }

    pub(crate) fn debit(&mut self, asset: &AssetId, amount: Amount) -> Result<()> {
        let available = self.balance_of(asset);
        if available < amount {
            return Err(FundError::InsufficientBalance {
                asset: asset.clone(),
                required: amount,
                available,
            });
        }
        self.balances.insert(asset.clone(), available - amount);
        Ok(())
    }

    pub(crate) fn mint(&mut self, holder: &AccountId, shares: Amount) -> Result<()> {
        self.total_shares = math::checked_add(self.total_shares, shares)?;
        let held = self.holders.entry(holder.clone()).or_insert(0);
        *held = math::checked_add(*held, shares)?;
        Ok(())
    }

    pub(crate) fn burn(&mut self, holder: &AccountId, shares: Amount) -> Result<()> {
        let held = self.shares_of(holder);
        if shares > held {
            return Err(FundError::invalid(format!(
                "cannot burn {shares} shares, {holder} holds {held}"
            )));
        }
        if held == shares {
            self.holders.remove(holder);
        } else {
            self.holders.insert(holder.clone(), held - shares);
        }
        self.total_shares -= shares;
        Ok(())
    }

    /// Burn `shares` from `holder` and debit the balance-proportional slice of
    /// every asset: `balance * shares / total_shares` (pre-burn supply).
    ///
    /// Needs no prices. Returns the withdrawn amounts in basket order,
    /// zero amounts omitted.
    pub(crate) fn withdraw_pro_rata(
        &mut self,
        holder: &AccountId,
        shares: Amount,
    ) -> Result<Vec<(AssetId, Amount)>> {
        let supply = self.total_shares;
        if shares == 0 || shares > self.shares_of(holder) {
            return Err(FundError::invalid(format!(
                "{holder} cannot redeem {shares} shares (holds {})",
                self.shares_of(holder)
            )));
        }

        let mut out = Vec::new();
        let basket: Vec<AssetId> = self.weights.assets().cloned().collect();
        for asset in basket {
            let amount = math::mul_div(self.balance_of(&asset), shares, supply)?;
            if amount > 0 {
                self.debit(&asset, amount)?;
                out.push((asset, amount));
            }
        }
        self.burn(holder, shares)?;
        Ok(out)
    }
}

/// One basket asset priced at a point in time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuedAsset {
    pub asset: AssetId,
    pub decimals: u8,
    pub balance: Amount,
    pub price: Wad,
    pub value: Wad,
    pub target_bps: u32,
}

/// The basket priced at one instant. Recomputed per query, never cached
/// across a mutating call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Valuation {
    pub entries: Vec<ValuedAsset>,
    pub nav: Wad,
}

impl Valuation {
    pub fn get(&self, asset: &AssetId) -> Option<&ValuedAsset> {
        self.entries.iter().find(|e| &e.asset == asset)
    }

    pub fn price_of(&self, asset: &AssetId) -> Result<Wad> {
        self.get(asset)
            .map(|e| e.price)
            .ok_or_else(|| FundError::PriceUnavailable(asset.clone()))
    }

    /// `(price, decimals)` lookup table.
    pub fn price_map(&self) -> FxHashMap<AssetId, (Wad, u8)> {
        self.entries
            .iter()
            .map(|e| (e.asset.clone(), (e.price, e.decimals)))
            .collect()
    }

    /// Expected output of converting `amount_in` of `from` into `to` at these prices.
    pub fn convert(&self, from: &AssetId, to: &AssetId, amount_in: Amount) -> Result<Amount> {
        let src = self
            .get(from)
            .ok_or_else(|| FundError::PriceUnavailable(from.clone()))?;
        let dst = self
            .get(to)
            .ok_or_else(|| FundError::PriceUnavailable(to.clone()))?;
        let value = math::value_of(amount_in, src.price, src.decimals)?;
        math::amount_for_value(value, dst.price, dst.decimals)
    }
}
