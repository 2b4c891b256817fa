//! Paper collaborators: in-memory custody and a trade executor that fills at
//! its own market prices.
//!
//! Use these in tests and simulations to drive a fund without a chain or a
//! venue.
//!
//! ```
//! use basketfund::paper::{FillMode, PaperExecutor, Vault};
//! use basketfund::{AccountId, AssetId, WAD};
//!
//! let vault = Vault::builder()
//!     .with_balance(AccountId::new("alice"), AssetId::new("USDC"), 1_000 * WAD)
//!     .build();
//!
//! let executor = PaperExecutor::builder()
//!     .with_price(AssetId::new("USDC"), WAD, 18)
//!     .with_price(AssetId::new("ETH"), 2_000 * WAD, 18)
//!     .haircut_bps(10)
//!     .fill_mode(FillMode::Fill)
//!     .build();
//! # let _ = (vault, executor);
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::collaborators::{Custody, SwapRequest, TradeExecutor};
use crate::error::{FundError, Result};
use crate::math;
use crate::types::{AccountId, Amount, AssetId, Bps, Wad};

// ============================================================================
// Vault
// ============================================================================

/// One wallet balance, as persisted by [`Vault::snapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalletEntry {
    pub holder: AccountId,
    pub asset: AssetId,
    pub amount: Amount,
}

/// A recorded custody movement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Movement {
    In {
        asset: AssetId,
        from: AccountId,
        amount: Amount,
    },
    Out {
        asset: AssetId,
        to: AccountId,
        amount: Amount,
    },
}

pub struct VaultBuilder {
    wallets: BTreeMap<(AccountId, AssetId), Amount>,
    frozen: Vec<AccountId>,
}

impl VaultBuilder {
    pub fn with_balance(mut self, holder: AccountId, asset: AssetId, amount: Amount) -> Self {
        *self.wallets.entry((holder, asset)).or_insert(0) += amount;
        self
    }

    /// Transfers to or from `holder` fail.
    pub fn frozen(mut self, holder: AccountId) -> Self {
        self.frozen.push(holder);
        self
    }

    pub fn build(self) -> Vault {
        Vault {
            wallets: Mutex::new(self.wallets),
            frozen: Mutex::new(self.frozen),
            movements: Mutex::new(Vec::new()),
        }
    }
}

/// In-memory custody: investor wallets on one side, the fund on the other.
///
/// The fund's own holdings are tracked by the fund ledger; the vault only
/// tracks what investors hold outside it.
pub struct Vault {
    wallets: Mutex<BTreeMap<(AccountId, AssetId), Amount>>,
    frozen: Mutex<Vec<AccountId>>,
    movements: Mutex<Vec<Movement>>,
}

impl Vault {
    pub fn builder() -> VaultBuilder {
        VaultBuilder {
            wallets: BTreeMap::new(),
            frozen: Vec::new(),
        }
    }

    pub fn from_snapshot(entries: &[WalletEntry]) -> Self {
        entries
            .iter()
            .fold(Self::builder(), |b, e| {
                b.with_balance(e.holder.clone(), e.asset.clone(), e.amount)
            })
            .build()
    }

    /// Non-zero wallet balances, sorted by holder then asset.
    pub fn snapshot(&self) -> Vec<WalletEntry> {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|((holder, asset), amount)| WalletEntry {
                holder: holder.clone(),
                asset: asset.clone(),
                amount: *amount,
            })
            .collect()
    }

    pub fn balance(&self, holder: &AccountId, asset: &AssetId) -> Amount {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(holder.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Fund a wallet from outside the system.
    pub fn credit(&self, holder: &AccountId, asset: &AssetId, amount: Amount) {
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        *wallets.entry((holder.clone(), asset.clone())).or_insert(0) += amount;
    }

    pub fn set_frozen(&self, holder: &AccountId, frozen: bool) {
        let mut list = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
        list.retain(|h| h != holder);
        if frozen {
            list.push(holder.clone());
        }
    }

    /// All movements so far (for assertion in tests).
    pub fn movements(&self) -> Vec<Movement> {
        self.movements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_not_frozen(&self, holder: &AccountId) -> Result<()> {
        let frozen = self.frozen.lock().unwrap_or_else(PoisonError::into_inner);
        if frozen.contains(holder) {
            return Err(FundError::invalid(format!("wallet {holder} is frozen")));
        }
        Ok(())
    }
}

impl Custody for Vault {
    fn transfer_in(&self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<()> {
        self.ensure_not_frozen(from)?;
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        let available = wallets
            .get(&(from.clone(), asset.clone()))
            .copied()
            .unwrap_or(0);
        if available < amount {
            return Err(FundError::InsufficientBalance {
                asset: asset.clone(),
                required: amount,
                available,
            });
        }
        wallets.insert((from.clone(), asset.clone()), available - amount);
        self.movements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Movement::In {
                asset: asset.clone(),
                from: from.clone(),
                amount,
            });
        Ok(())
    }

    fn transfer_out(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<()> {
        self.ensure_not_frozen(to)?;
        let mut wallets = self.wallets.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = wallets.entry((to.clone(), asset.clone())).or_insert(0);
        *balance = math::checked_add(*balance, amount)?;
        self.movements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Movement::Out {
                asset: asset.clone(),
                to: to.clone(),
                amount,
            });
        Ok(())
    }
}

// ============================================================================
// PaperExecutor
// ============================================================================

/// How the paper executor handles swaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMode {
    /// Fill at market price minus the haircut.
    Fill,
    /// Reject every swap.
    Reject,
}

/// A recorded fill for assertion in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fill {
    pub from: AssetId,
    pub to: AssetId,
    pub amount_in: Amount,
    pub amount_out: Amount,
}

pub struct PaperExecutorBuilder {
    prices: FxHashMap<AssetId, (Wad, u8)>,
    haircut_bps: Bps,
    fill_mode: FillMode,
}

impl PaperExecutorBuilder {
    /// Market price (WAD per whole unit) and decimals of `asset`.
    pub fn with_price(mut self, asset: AssetId, price: Wad, decimals: u8) -> Self {
        self.prices.insert(asset, (price, decimals));
        self
    }

    /// Fraction of every output kept by the venue, capped at 100%.
    pub fn haircut_bps(mut self, bps: Bps) -> Self {
        self.haircut_bps = bps.min(math::BPS_DENOMINATOR);
        self
    }

    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn build(self) -> PaperExecutor {
        PaperExecutor {
            prices: Mutex::new(self.prices),
            haircut_bps: Mutex::new(self.haircut_bps),
            fill_mode: Mutex::new(self.fill_mode),
            fills: Mutex::new(Vec::new()),
        }
    }
}

/// Fills swaps at its own market prices.
pub struct PaperExecutor {
    prices: Mutex<FxHashMap<AssetId, (Wad, u8)>>,
    haircut_bps: Mutex<Bps>,
    fill_mode: Mutex<FillMode>,
    fills: Mutex<Vec<Fill>>,
}

impl PaperExecutor {
    pub fn builder() -> PaperExecutorBuilder {
        PaperExecutorBuilder {
            prices: FxHashMap::default(),
            haircut_bps: 0,
            fill_mode: FillMode::Fill,
        }
    }

    pub fn set_price(&self, asset: &AssetId, price: Wad, decimals: u8) {
        self.prices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset.clone(), (price, decimals));
    }

    pub fn set_haircut_bps(&self, bps: Bps) {
        *self.haircut_bps.lock().unwrap_or_else(PoisonError::into_inner) =
            bps.min(math::BPS_DENOMINATOR);
    }

    pub fn set_fill_mode(&self, mode: FillMode) {
        *self.fill_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    /// All fills so far (for assertion in tests).
    pub fn fills(&self) -> Vec<Fill> {
        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn market(&self, asset: &AssetId) -> Result<(Wad, u8)> {
        self.prices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(asset)
            .copied()
            .filter(|(price, _)| *price > 0)
            .ok_or_else(|| FundError::PriceUnavailable(asset.clone()))
    }
}

impl TradeExecutor for PaperExecutor {
    fn swap(&self, request: &SwapRequest) -> Result<Amount> {
        if *self.fill_mode.lock().unwrap_or_else(PoisonError::into_inner) == FillMode::Reject {
            return Err(FundError::SlippageExceeded {
                from: request.from.clone(),
                to: request.to.clone(),
                amount_out: 0,
                min_out: request.min_out,
            });
        }

        let (from_price, from_decimals) = self.market(&request.from)?;
        let (to_price, to_decimals) = self.market(&request.to)?;
        let value = math::value_of(request.amount_in, from_price, from_decimals)?;
        let gross = math::amount_for_value(value, to_price, to_decimals)?;
        let haircut = *self.haircut_bps.lock().unwrap_or_else(PoisonError::into_inner);
        let amount_out = math::checked_sub(gross, math::apply_bps(gross, haircut)?)?;

        if amount_out < request.min_out {
            return Err(FundError::SlippageExceeded {
                from: request.from.clone(),
                to: request.to.clone(),
                amount_out,
                min_out: request.min_out,
            });
        }

        self.fills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fill {
                from: request.from.clone(),
                to: request.to.clone(),
                amount_in: request.amount_in,
                amount_out,
            });
        Ok(amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::WAD;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }
    fn usdc() -> AssetId {
        AssetId::new("USDC")
    }
    fn eth() -> AssetId {
        AssetId::new("ETH")
    }

    fn request(amount_in: Amount, min_out: Amount) -> SwapRequest {
        SwapRequest {
            from: usdc(),
            to: eth(),
            amount_in,
            min_out,
            max_slippage_bps: 100,
        }
    }

    #[test]
    fn vault_transfer_in_and_out() {
        let vault = Vault::builder()
            .with_balance(alice(), usdc(), 100)
            .build();
        vault.transfer_in(&usdc(), &alice(), 60).unwrap();
        assert_eq!(vault.balance(&alice(), &usdc()), 40);
        assert!(matches!(
            vault.transfer_in(&usdc(), &alice(), 41),
            Err(FundError::InsufficientBalance { .. })
        ));
        vault.transfer_out(&usdc(), &alice(), 10).unwrap();
        assert_eq!(vault.balance(&alice(), &usdc()), 50);
        assert_eq!(vault.movements().len(), 2);
    }

    #[test]
    fn frozen_wallet_rejects_transfers() {
        let vault = Vault::builder().frozen(alice()).build();
        assert!(vault.transfer_out(&usdc(), &alice(), 1).is_err());
        vault.set_frozen(&alice(), false);
        assert!(vault.transfer_out(&usdc(), &alice(), 1).is_ok());
    }

    #[test]
    fn snapshot_round_trip() {
        let vault = Vault::builder()
            .with_balance(alice(), usdc(), 5)
            .with_balance(AccountId::new("bob"), eth(), 7)
            .build();
        let restored = Vault::from_snapshot(&vault.snapshot());
        assert_eq!(restored.balance(&alice(), &usdc()), 5);
        assert_eq!(restored.balance(&AccountId::new("bob"), &eth()), 7);
    }

    #[test]
    fn executor_fills_at_market_minus_haircut() {
        let ex = PaperExecutor::builder()
            .with_price(usdc(), WAD, 6)
            .with_price(eth(), 2_000 * WAD, 18)
            .haircut_bps(50)
            .build();
        // 4,000 USDC -> 2 ETH gross, minus 0.5%
        let out = ex.swap(&request(4_000_000_000, 0)).unwrap();
        assert_eq!(out, 2 * WAD - 2 * WAD / 200);
        assert_eq!(ex.fills().len(), 1);
    }

    #[test]
    fn haircut_is_capped_at_the_whole_output() {
        let ex = PaperExecutor::builder()
            .with_price(usdc(), WAD, 6)
            .with_price(eth(), 2_000 * WAD, 18)
            .haircut_bps(20_000)
            .build();
        assert_eq!(ex.swap(&request(4_000_000_000, 0)).unwrap(), 0);

        ex.set_haircut_bps(15_000);
        let err = ex.swap(&request(4_000_000_000, 1)).unwrap_err();
        assert!(matches!(err, FundError::SlippageExceeded { amount_out: 0, .. }));
    }

    #[test]
    fn executor_enforces_min_out() {
        let ex = PaperExecutor::builder()
            .with_price(usdc(), WAD, 6)
            .with_price(eth(), 2_000 * WAD, 18)
            .haircut_bps(200)
            .build();
        let err = ex.swap(&request(2_000_000_000, WAD)).unwrap_err();
        assert!(matches!(err, FundError::SlippageExceeded { .. }));
        assert!(ex.fills().is_empty());
    }

    #[test]
    fn reject_mode() {
        let ex = PaperExecutor::builder()
            .with_price(usdc(), WAD, 6)
            .with_price(eth(), 2_000 * WAD, 18)
            .fill_mode(FillMode::Reject)
            .build();
        assert!(ex.swap(&request(1, 0)).is_err());
    }

    #[test]
    fn unknown_market_is_unavailable() {
        let ex = PaperExecutor::builder().build();
        assert!(matches!(
            ex.swap(&request(1, 0)),
            Err(FundError::PriceUnavailable(_))
        ));
    }
}
