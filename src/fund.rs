//! The fund engine: every investor, manager and guardian operation.
//!
//! Each mutating operation runs as one transaction:
//!
//! 1. take the execution lock (rejects any call made while another runs),
//! 2. clone the committed [`FundState`] into a working copy,
//! 3. check the circuit breaker, then run the operation on the copy,
//! 4. on success swap the copy in; on failure drop it and reverse any
//!    custody transfers already made.
//!
//! Readers clone nothing and never see the working copy, so a query always
//! observes a fully committed state.
//!
//! ```
//! use std::sync::Arc;
//! use basketfund::collaborators::Roles;
//! use basketfund::paper::{PaperExecutor, Vault};
//! use basketfund::price::{ManualFeed, PriceAggregator};
//! use basketfund::{AccountId, Asset, AssetId, Fund, FundConfig, FundState, TargetWeights, WAD};
//!
//! let usd = AssetId::new("USD");
//! let alice = AccountId::new("alice");
//!
//! let feed = Arc::new(ManualFeed::new("feed"));
//! feed.set_price(&usd, WAD, 0);
//! let mut prices = PriceAggregator::new();
//! prices.add_asset(usd.clone()).unwrap();
//! prices.add_source(&usd, feed, 3_600).unwrap();
//!
//! let state = FundState::new(
//!     vec![Asset::new("USD", 6)],
//!     usd.clone(),
//!     TargetWeights::new(&[(usd.clone(), 10_000)]).unwrap(),
//!     FundConfig::new(AccountId::new("treasury"), 0),
//! )
//! .unwrap();
//!
//! let vault = Arc::new(Vault::builder().with_balance(alice.clone(), usd.clone(), 500_000_000).build());
//! let fund = Fund::builder(state)
//!     .prices(prices)
//!     .custody(vault.clone())
//!     .executor(Arc::new(PaperExecutor::builder().build()))
//!     .authorizer(Arc::new(Roles::new(AccountId::new("manager"))))
//!     .build()
//!     .unwrap();
//!
//! let receipt = fund.deposit(&alice, 500_000_000, 10).unwrap();
//! assert_eq!(receipt.shares_minted, 500 * WAD);
//! assert_eq!(fund.calculate_nav(10).unwrap(), 500 * WAD);
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use log::{error, info, warn};

use crate::admin::{self, AdminChange, PendingChange};
use crate::collaborators::{Authorizer, Custody, SwapRequest, TradeExecutor};
use crate::emergency::{EmergencyState, Operation};
use crate::error::{FundError, Result};
use crate::fees::{self, FeeAccrual};
use crate::ledger::{BOOTSTRAP_SHARE_PRICE, FundState, Valuation};
use crate::lock::ExecutionLock;
use crate::math::{self, WAD};
use crate::planner::{self, DriftReport, PhaseTracker, RebalancePhase, TradeIntent};
use crate::price::{PriceAggregator, PriceQuote, PriceSource};
use crate::types::{AccountId, Amount, AssetId, Timestamp, Wad};

// ============================================================================
// Receipts
// ============================================================================

/// A swap the executor filled during an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExecutedSwap {
    pub from: AssetId,
    pub to: AssetId,
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub min_out: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DepositReceipt {
    pub shares_minted: Amount,
    /// Value of the deposit (WAD).
    pub deposit_value: Wad,
    /// Share price the deposit was priced at (WAD).
    pub share_price: Wad,
    pub fees: FeeSummary,
    /// Swaps allocating the deposit across the basket.
    pub allocations: Vec<ExecutedSwap>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RedemptionReceipt {
    pub shares_burned: Amount,
    /// Basket slice paid out, in basket order.
    pub assets: Vec<(AssetId, Amount)>,
    pub fees: FeeSummary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SingleAssetRedemption {
    pub shares_burned: Amount,
    pub asset: AssetId,
    /// Paid to the redeemer after the exit fee.
    pub amount_out: Amount,
    /// Paid to the fee recipient.
    pub exit_fee: Amount,
    pub swaps: Vec<ExecutedSwap>,
    pub fees: FeeSummary,
}

/// Fee shares minted as a side effect of an operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeeSummary {
    pub management_shares: Amount,
    pub performance_shares: Amount,
}

impl From<FeeAccrual> for FeeSummary {
    fn from(a: FeeAccrual) -> Self {
        Self {
            management_shares: a.management_shares,
            performance_shares: a.performance_shares,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RebalanceReport {
    pub before: DriftReport,
    pub after: DriftReport,
    pub trades: Vec<ExecutedSwap>,
}

impl std::fmt::Display for RebalanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "BEFORE")?;
        write!(f, "{}", self.before)?;
        writeln!(f, "\nTRADES:")?;
        if self.trades.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for t in &self.trades {
            writeln!(
                f,
                "  {} {} -> {} {} (min {})",
                t.amount_in, t.from, t.amount_out, t.to, t.min_out
            )?;
        }
        writeln!(f, "\nAFTER")?;
        write!(f, "{}", self.after)
    }
}

// ============================================================================
// Custody settlement
// ============================================================================

enum Transfer {
    In {
        asset: AssetId,
        account: AccountId,
        amount: Amount,
    },
    Out {
        asset: AssetId,
        account: AccountId,
        amount: Amount,
    },
}

/// Custody transfers made inside one transaction. Reversed on drop unless
/// committed.
struct Settlement<'a> {
    custody: &'a dyn Custody,
    done: Vec<Transfer>,
    committed: bool,
}

impl<'a> Settlement<'a> {
    fn new(custody: &'a dyn Custody) -> Self {
        Self {
            custody,
            done: Vec::new(),
            committed: false,
        }
    }

    fn pull(&mut self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<()> {
        self.custody.transfer_in(asset, from, amount)?;
        self.done.push(Transfer::In {
            asset: asset.clone(),
            account: from.clone(),
            amount,
        });
        Ok(())
    }

    fn push(&mut self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.custody.transfer_out(asset, to, amount)?;
        self.done.push(Transfer::Out {
            asset: asset.clone(),
            account: to.clone(),
            amount,
        });
        Ok(())
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Settlement<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for t in self.done.drain(..).rev() {
            let (result, asset, account, amount) = match t {
                Transfer::In {
                    asset,
                    account,
                    amount,
                } => (
                    self.custody.transfer_out(&asset, &account, amount),
                    asset,
                    account,
                    amount,
                ),
                Transfer::Out {
                    asset,
                    account,
                    amount,
                } => (
                    self.custody.transfer_in(&asset, &account, amount),
                    asset,
                    account,
                    amount,
                ),
            };
            if let Err(e) = result {
                error!("failed to reverse transfer of {amount} {asset} with {account}: {e}");
            }
        }
    }
}

// ============================================================================
// Fund
// ============================================================================

/// Builder for [`Fund`].
pub struct FundBuilder {
    state: FundState,
    prices: PriceAggregator,
    custody: Option<Arc<dyn Custody>>,
    executor: Option<Arc<dyn TradeExecutor>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl FundBuilder {
    pub fn prices(mut self, prices: PriceAggregator) -> Self {
        self.prices = prices;
        self
    }

    pub fn custody(mut self, custody: Arc<dyn Custody>) -> Self {
        self.custody = Some(custody);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TradeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Every basket asset must be registered with the price aggregator.
    pub fn build(self) -> Result<Fund> {
        self.state.validate()?;
        for asset in self.state.weights().assets() {
            if !self.prices.is_priced(asset) {
                return Err(FundError::invalid(format!(
                    "basket asset {asset} has no registered price sources"
                )));
            }
        }
        Ok(Fund {
            state: RwLock::new(self.state),
            prices: RwLock::new(self.prices),
            custody: self
                .custody
                .ok_or_else(|| FundError::invalid("fund needs a custody"))?,
            executor: self
                .executor
                .ok_or_else(|| FundError::invalid("fund needs a trade executor"))?,
            authorizer: self
                .authorizer
                .ok_or_else(|| FundError::invalid("fund needs an authorizer"))?,
            lock: ExecutionLock::new(),
            phase: PhaseTracker::default(),
        })
    }
}

/// A pooled-asset fund.
pub struct Fund {
    state: RwLock<FundState>,
    prices: RwLock<PriceAggregator>,
    custody: Arc<dyn Custody>,
    executor: Arc<dyn TradeExecutor>,
    authorizer: Arc<dyn Authorizer>,
    lock: ExecutionLock,
    phase: PhaseTracker,
}

impl Fund {
    pub fn builder(state: FundState) -> FundBuilder {
        FundBuilder {
            state,
            prices: PriceAggregator::new(),
            custody: None,
            executor: None,
            authorizer: None,
        }
    }

    // === Investor operations ===

    /// Pull `amount` of the base asset from `investor`, mint shares at the
    /// post-fee share price, and allocate the deposit across the basket.
    pub fn deposit(
        &self,
        investor: &AccountId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<DepositReceipt> {
        self.transact(Operation::Deposit, |state, prices, settlement| {
            if amount == 0 {
                return Err(FundError::invalid("deposit amount must be > 0"));
            }
            let base = state.base_asset.clone();
            settlement.pull(&base, investor, amount)?;

            let fees = fees::accrue(state, prices, now)?;
            let valuation = state.valuate(prices, now)?;
            let base_entry = valuation
                .get(&base)
                .ok_or_else(|| FundError::PriceUnavailable(base.clone()))?;
            let deposit_value = math::value_of(amount, base_entry.price, base_entry.decimals)?;

            let supply = state.total_shares;
            let (shares, share_price) = if supply == 0 {
                (
                    math::mul_div(deposit_value, WAD, BOOTSTRAP_SHARE_PRICE)?,
                    BOOTSTRAP_SHARE_PRICE,
                )
            } else {
                if valuation.nav == 0 {
                    return Err(FundError::invalid(
                        "fund has outstanding shares but zero NAV",
                    ));
                }
                (
                    math::mul_div(deposit_value, supply, valuation.nav)?,
                    state.share_price(valuation.nav)?,
                )
            };
            if shares == 0 {
                return Err(FundError::invalid("deposit too small to mint any shares"));
            }

            state.credit(&base, amount)?;
            state.mint(investor, shares)?;
            let allocations = self.allocate(state, &valuation, amount)?;

            info!("{investor} deposited {amount} {base}, minted {shares} shares");
            Ok(DepositReceipt {
                shares_minted: shares,
                deposit_value,
                share_price,
                fees: fees.into(),
                allocations,
            })
        })
    }

    /// Burn `shares` and pay out the proportional slice of every basket asset.
    pub fn redeem(
        &self,
        investor: &AccountId,
        shares: Amount,
        now: Timestamp,
    ) -> Result<RedemptionReceipt> {
        self.transact(Operation::Redeem, |state, prices, settlement| {
            ensure_redeemable(state, investor, shares)?;
            let fees = fees::accrue(state, prices, now)?;
            let assets = state.withdraw_pro_rata(investor, shares)?;
            for (asset, amount) in &assets {
                settlement.push(asset, investor, *amount)?;
            }
            info!("{investor} redeemed {shares} shares for {} assets", assets.len());
            Ok(RedemptionReceipt {
                shares_burned: shares,
                assets,
                fees: fees.into(),
            })
        })
    }

    /// Burn `shares`, convert the proportional slice into `output`, and pay
    /// it out less the exit fee.
    pub fn redeem_to_single_asset(
        &self,
        investor: &AccountId,
        shares: Amount,
        output: &AssetId,
        now: Timestamp,
    ) -> Result<SingleAssetRedemption> {
        self.transact(Operation::RedeemToSingleAsset, |state, prices, settlement| {
            if !state.weights.contains(output) {
                return Err(FundError::invalid(format!(
                    "{output} is not part of the basket"
                )));
            }
            ensure_redeemable(state, investor, shares)?;
            let fees = fees::accrue(state, prices, now)?;
            let valuation = state.valuate(prices, now)?;

            let slices = state.withdraw_pro_rata(investor, shares)?;
            let mut total: Amount = 0;
            let mut swaps = Vec::new();
            for (asset, amount) in &slices {
                if asset == output {
                    total = math::checked_add(total, *amount)?;
                    continue;
                }
                let swap = self.swap(state, &valuation, asset, output, *amount)?;
                total = math::checked_add(total, swap.amount_out)?;
                swaps.push(swap);
            }
            if total == 0 {
                return Err(FundError::invalid("redemption converts to zero output"));
            }

            let exit_fee = math::apply_bps(total, state.config.exit_fee_bps)?;
            let amount_out = total - exit_fee;
            settlement.push(output, investor, amount_out)?;
            let recipient = state.config.fee_recipient.clone();
            settlement.push(output, &recipient, exit_fee)?;

            info!(
                "{investor} redeemed {shares} shares for {amount_out} {output} (exit fee {exit_fee})"
            );
            Ok(SingleAssetRedemption {
                shares_burned: shares,
                asset: output.clone(),
                amount_out,
                exit_fee,
                swaps,
                fees: fees.into(),
            })
        })
    }

    /// Price-independent, balance-proportional exit. Only while in Emergency.
    pub fn emergency_redeem(
        &self,
        investor: &AccountId,
        shares: Amount,
        now: Timestamp,
    ) -> Result<RedemptionReceipt> {
        self.transact(Operation::EmergencyRedeem, |state, _prices, settlement| {
            ensure_redeemable(state, investor, shares)?;
            let management_shares = fees::accrue_management(state, now)?;
            let assets = state.withdraw_pro_rata(investor, shares)?;
            for (asset, amount) in &assets {
                settlement.push(asset, investor, *amount)?;
            }
            info!("{investor} emergency-redeemed {shares} shares");
            Ok(RedemptionReceipt {
                shares_burned: shares,
                assets,
                fees: FeeSummary {
                    management_shares,
                    performance_shares: 0,
                },
            })
        })
    }

    /// Accrue management and performance fees up to `now`. Anyone may call it.
    pub fn accrue_fees(&self, now: Timestamp) -> Result<FeeAccrual> {
        self.transact(Operation::AccrueFees, |state, prices, _| {
            fees::accrue(state, prices, now)
        })
    }

    // === Rebalancing ===

    /// Trade the basket back to its target weights. Manager only, and only
    /// when the rebalance trigger holds.
    ///
    /// Fails with [`FundError::ToleranceNotMet`] if any asset is still
    /// outside the tolerance band after execution; no trade is kept then.
    pub fn rebalance(&self, caller: &AccountId, now: Timestamp) -> Result<RebalanceReport> {
        self.require_manager(caller)?;
        self.transact(Operation::Rebalance, |state, prices, _| {
            let phase = self.phase.begin();

            let valuation = state.valuate(prices, now)?;
            let tolerance = state.config.weight_tolerance_bps;
            let before = DriftReport::new(&valuation, tolerance)?;
            if state.total_shares == 0 || valuation.nav == 0 {
                return Err(FundError::invalid("fund holds nothing to rebalance"));
            }
            if !trigger_holds(state, &before, now) {
                return Err(FundError::invalid("rebalance not warranted"));
            }

            let plan = planner::calculate_required_trades(&valuation)?;
            phase.executing();
            let mut trades = Vec::with_capacity(plan.len());
            for intent in &plan {
                let swap = self.swap(state, &valuation, &intent.from, &intent.to, intent.amount_in)?;
                state.debit(&swap.from, swap.amount_in)?;
                state.credit(&swap.to, swap.amount_out)?;
                trades.push(swap);
            }

            let after = DriftReport::new(&state.valuate(prices, now)?, tolerance)?;
            let band = math::bps_to_wad(tolerance);
            if let Some(d) = after.drifts.iter().find(|d| d.drift() > band) {
                return Err(FundError::ToleranceNotMet {
                    asset: d.asset.clone(),
                    drift_bps: math::wad_to_bps(d.drift()),
                    tolerance_bps: tolerance,
                });
            }

            state.config.last_rebalance_time = now;
            info!("rebalanced with {} trades", trades.len());
            Ok(RebalanceReport {
                before,
                after,
                trades,
            })
        })
    }

    /// Whether a rebalance would be accepted at `now`.
    pub fn can_rebalance(&self, now: Timestamp) -> Result<bool> {
        let state = self.read_state();
        if !state.emergency.permits(Operation::Rebalance) || state.total_shares == 0 {
            return Ok(false);
        }
        let valuation = state.valuate(&self.read_prices(), now)?;
        if valuation.nav == 0 {
            return Ok(false);
        }
        let report = DriftReport::new(&valuation, state.config.weight_tolerance_bps)?;
        Ok(trigger_holds(&state, &report, now))
    }

    /// The trades a rebalance at `now` would plan. Does not execute anything.
    pub fn plan_rebalance(&self, now: Timestamp) -> Result<Vec<TradeIntent>> {
        let state = self.read_state();
        let valuation = state.valuate(&self.read_prices(), now)?;
        planner::calculate_required_trades(&valuation)
    }

    pub fn drift_report(&self, now: Timestamp) -> Result<DriftReport> {
        let state = self.read_state();
        let valuation = state.valuate(&self.read_prices(), now)?;
        DriftReport::new(&valuation, state.config.weight_tolerance_bps)
    }

    pub fn rebalance_phase(&self) -> RebalancePhase {
        self.phase.current()
    }

    // === Queries ===

    pub fn calculate_nav(&self, now: Timestamp) -> Result<Wad> {
        Ok(self.valuation(now)?.nav)
    }

    pub fn get_share_price(&self, now: Timestamp) -> Result<Wad> {
        let state = self.read_state();
        let nav = state.valuate(&self.read_prices(), now)?.nav;
        state.share_price(nav)
    }

    pub fn valuation(&self, now: Timestamp) -> Result<Valuation> {
        self.read_state().valuate(&self.read_prices(), now)
    }

    pub fn price_quote(&self, asset: &AssetId, now: Timestamp) -> PriceQuote {
        self.read_prices().get_price_with_fallback(asset, now)
    }

    pub fn shares_of(&self, holder: &AccountId) -> Amount {
        self.read_state().shares_of(holder)
    }

    pub fn total_shares(&self) -> Amount {
        self.read_state().total_shares()
    }

    pub fn emergency_state(&self) -> EmergencyState {
        self.read_state().emergency_state()
    }

    pub fn pending_change(&self) -> Option<PendingChange> {
        self.read_state().pending_change().cloned()
    }

    /// A copy of the committed state.
    pub fn snapshot(&self) -> FundState {
        self.read_state().clone()
    }

    // === Circuit breaker ===

    /// Manager or guardian.
    pub fn pause(&self, caller: &AccountId) -> Result<()> {
        self.transact(Operation::Admin, |state, _, _| {
            self.require_manager_or_guardian(caller)?;
            state.emergency = state.emergency.pause()?;
            Ok(())
        })
    }

    /// Manager or guardian.
    pub fn unpause(&self, caller: &AccountId) -> Result<()> {
        self.transact(Operation::Admin, |state, _, _| {
            self.require_manager_or_guardian(caller)?;
            state.emergency = state.emergency.unpause()?;
            Ok(())
        })
    }

    /// Manager or guardian.
    pub fn enable_emergency_mode(&self, caller: &AccountId) -> Result<()> {
        self.transact(Operation::Admin, |state, _, _| {
            self.require_manager_or_guardian(caller)?;
            state.emergency = state
                .emergency
                .enter_emergency(&format!("triggered by {caller}"))?;
            Ok(())
        })
    }

    /// Manager only.
    pub fn disable_emergency_mode(&self, caller: &AccountId) -> Result<()> {
        self.transact(Operation::Admin, |state, _, _| {
            self.require_manager(caller)?;
            state.emergency = state.emergency.exit_emergency()?;
            Ok(())
        })
    }

    /// Enter Emergency if any basket asset has no observation younger than
    /// the configured heartbeat. Returns whether it did. Anyone may call it.
    pub fn check_price_heartbeat(&self, now: Timestamp) -> Result<bool> {
        self.transact(Operation::Admin, |state, prices, _| {
            if state.emergency == EmergencyState::Emergency {
                return Ok(false);
            }
            let heartbeat = state.config.price_heartbeat;
            let stale = state.weights.assets().find(|asset| {
                match prices.last_update(asset) {
                    Some(t) => now.saturating_sub(t) > heartbeat,
                    None => true,
                }
            });
            let Some(asset) = stale.cloned() else {
                return Ok(false);
            };
            state.emergency = state
                .emergency
                .enter_emergency(&format!("no {asset} price within {heartbeat}s heartbeat"))?;
            Ok(true)
        })
    }

    // === Administration ===

    /// Propose a timelocked change. Manager only.
    pub fn propose_change(
        &self,
        caller: &AccountId,
        change: AdminChange,
        now: Timestamp,
    ) -> Result<PendingChange> {
        self.transact(Operation::Admin, |state, prices, _| {
            self.require_manager(caller)?;
            admin::propose(state, prices, change, now)
        })
    }

    /// Apply the pending change once its timelock has elapsed. Manager only.
    pub fn execute_pending(&self, caller: &AccountId, now: Timestamp) -> Result<AdminChange> {
        self.transact(Operation::Admin, |state, prices, _| {
            self.require_manager(caller)?;
            admin::execute(state, prices, now)
        })
    }

    /// Manager only.
    pub fn cancel_pending(&self, caller: &AccountId) -> Result<PendingChange> {
        self.transact(Operation::Admin, |state, _, _| {
            self.require_manager(caller)?;
            admin::cancel(state)
        })
    }

    /// Append a fallback source for `asset`. Manager only.
    pub fn add_price_source(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        source: Arc<dyn PriceSource>,
        max_age: u64,
    ) -> Result<()> {
        let _guard = self.lock.enter()?;
        self.require_manager(caller)?;
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        if !prices.is_priced(asset) {
            prices.add_asset(asset.clone())?;
        }
        prices.add_source(asset, source, max_age)?;
        info!("added price source for {asset}");
        Ok(())
    }

    /// Manager only.
    pub fn remove_price_source(
        &self,
        caller: &AccountId,
        asset: &AssetId,
        name: &str,
    ) -> Result<()> {
        let _guard = self.lock.enter()?;
        self.require_manager(caller)?;
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_source(asset, name)?;
        info!("removed price source {name} for {asset}");
        Ok(())
    }

    // === Internals ===

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, FundState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_prices(&self) -> std::sync::RwLockReadGuard<'_, PriceAggregator> {
        self.prices.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` as one all-or-nothing transaction.
    fn transact<T>(
        &self,
        op: Operation,
        f: impl FnOnce(&mut FundState, &PriceAggregator, &mut Settlement<'_>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock.enter()?;
        let prices = self.read_prices();
        let mut working = self.read_state().clone();
        let mut settlement = Settlement::new(self.custody.as_ref());

        let result = working
            .emergency
            .ensure_permits(op)
            .and_then(|()| f(&mut working, &prices, &mut settlement));
        match result {
            Ok(value) => {
                debug_assert!(self.lock.is_held());
                settlement.commit();
                *self.state.write().unwrap_or_else(PoisonError::into_inner) = working;
                Ok(value)
            }
            Err(e) => {
                warn!("{op} aborted: {e}");
                drop(settlement);
                Err(e)
            }
        }
    }

    fn require_manager(&self, caller: &AccountId) -> Result<()> {
        if self.authorizer.is_manager(caller) {
            Ok(())
        } else {
            Err(FundError::Unauthorized(format!("{caller} is not the manager")))
        }
    }

    fn require_manager_or_guardian(&self, caller: &AccountId) -> Result<()> {
        if self.authorizer.is_manager(caller) || self.authorizer.is_guardian(caller) {
            Ok(())
        } else {
            Err(FundError::Unauthorized(format!(
                "{caller} is neither manager nor guardian"
            )))
        }
    }

    /// Swap the deposit's non-base slices into their basket assets.
    fn allocate(
        &self,
        state: &mut FundState,
        valuation: &Valuation,
        amount: Amount,
    ) -> Result<Vec<ExecutedSwap>> {
        let base = state.base_asset.clone();
        let targets: Vec<(AssetId, u32)> = state
            .weights
            .iter()
            .filter(|t| t.asset != base && t.weight_bps > 0)
            .map(|t| (t.asset.clone(), t.weight_bps))
            .collect();

        let mut swaps = Vec::with_capacity(targets.len());
        for (asset, weight) in targets {
            let slice = math::apply_bps(amount, weight)?;
            if slice == 0 {
                continue;
            }
            let swap = self.swap(state, valuation, &base, &asset, slice)?;
            state.debit(&base, swap.amount_in)?;
            state.credit(&asset, swap.amount_out)?;
            swaps.push(swap);
        }
        Ok(swaps)
    }

    /// Hand one swap to the executor with an output floor derived from the
    /// valuation's prices. Ledger balances are left to the caller.
    fn swap(
        &self,
        state: &FundState,
        valuation: &Valuation,
        from: &AssetId,
        to: &AssetId,
        amount_in: Amount,
    ) -> Result<ExecutedSwap> {
        let expected = valuation.convert(from, to, amount_in)?;
        let max_slippage_bps = state.config.max_slippage_bps;
        let min_out = expected - math::apply_bps(expected, max_slippage_bps)?;
        let request = SwapRequest {
            from: from.clone(),
            to: to.clone(),
            amount_in,
            min_out,
            max_slippage_bps,
        };
        let amount_out = self.executor.swap(&request)?;
        if amount_out < min_out {
            return Err(FundError::SlippageExceeded {
                from: from.clone(),
                to: to.clone(),
                amount_out,
                min_out,
            });
        }
        Ok(ExecutedSwap {
            from: from.clone(),
            to: to.clone(),
            amount_in,
            amount_out,
            min_out,
        })
    }
}

fn ensure_redeemable(state: &FundState, investor: &AccountId, shares: Amount) -> Result<()> {
    if shares == 0 {
        return Err(FundError::invalid("redeemed shares must be > 0"));
    }
    let held = state.shares_of(investor);
    if shares > held {
        return Err(FundError::invalid(format!(
            "{investor} holds {held} shares, cannot redeem {shares}"
        )));
    }
    Ok(())
}

fn trigger_holds(state: &FundState, report: &DriftReport, now: Timestamp) -> bool {
    planner::rebalance_due(
        &report.drifts,
        report.tolerance_bps,
        state.config.last_rebalance_time,
        state.config.rebalance_interval,
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Roles;
    use crate::config::FundConfig;
    use crate::paper::{PaperExecutor, Vault};
    use crate::price::ManualFeed;
    use crate::types::Asset;
    use crate::weights::TargetWeights;

    fn usd() -> AssetId {
        AssetId::new("USD")
    }
    fn alice() -> AccountId {
        AccountId::new("alice")
    }
    fn manager() -> AccountId {
        AccountId::new("manager")
    }

    fn single_asset_fund(vault: Arc<Vault>) -> (Fund, Arc<ManualFeed>) {
        let feed = Arc::new(ManualFeed::new("feed"));
        feed.set_price(&usd(), WAD, 0);
        let mut prices = PriceAggregator::new();
        prices.add_asset(usd()).unwrap();
        prices.add_source(&usd(), feed.clone(), u64::MAX).unwrap();
        let state = FundState::new(
            vec![Asset::new("USD", 6)],
            usd(),
            TargetWeights::new(&[(usd(), 10_000)]).unwrap(),
            FundConfig::new(AccountId::new("treasury"), 0),
        )
        .unwrap();
        let fund = Fund::builder(state)
            .prices(prices)
            .custody(vault)
            .executor(Arc::new(PaperExecutor::builder().build()))
            .authorizer(Arc::new(Roles::new(manager())))
            .build()
            .unwrap();
        (fund, feed)
    }

    #[test]
    fn build_requires_collaborators() {
        let state = FundState::new(
            vec![Asset::new("USD", 6)],
            usd(),
            TargetWeights::new(&[(usd(), 10_000)]).unwrap(),
            FundConfig::new(AccountId::new("treasury"), 0),
        )
        .unwrap();
        assert!(Fund::builder(state).build().is_err());
    }

    #[test]
    fn failed_deposit_reverses_custody() {
        let vault = Arc::new(Vault::builder().with_balance(alice(), usd(), 100).build());
        let (fund, feed) = single_asset_fund(vault.clone());
        feed.clear(&usd());

        let err = fund.deposit(&alice(), 100, 1).unwrap_err();
        assert_eq!(err, FundError::PriceUnavailable(usd()));
        assert_eq!(vault.balance(&alice(), &usd()), 100);
        assert_eq!(fund.total_shares(), 0);
        assert_eq!(fund.snapshot().balance_of(&usd()), 0);

        feed.set_price(&usd(), WAD, 1);
        fund.deposit(&alice(), 100, 1).unwrap();
        assert_eq!(vault.balance(&alice(), &usd()), 0);
        // 100 raw units of a 6-decimal asset at 1.0
        assert_eq!(fund.shares_of(&alice()), 100 * 1_000_000_000_000);
    }

    #[test]
    fn settlement_reverses_on_drop() {
        let vault = Vault::builder().with_balance(alice(), usd(), 10).build();
        {
            let mut s = Settlement::new(&vault);
            s.pull(&usd(), &alice(), 7).unwrap();
            s.push(&usd(), &AccountId::new("bob"), 2).unwrap();
        }
        assert_eq!(vault.balance(&alice(), &usd()), 10);
        assert_eq!(vault.balance(&AccountId::new("bob"), &usd()), 0);

        let mut s = Settlement::new(&vault);
        s.pull(&usd(), &alice(), 7).unwrap();
        s.commit();
        assert_eq!(vault.balance(&alice(), &usd()), 3);
    }

    #[test]
    fn unauthorized_pause() {
        let (fund, _) = single_asset_fund(Arc::new(Vault::builder().build()));
        let err = fund.pause(&alice()).unwrap_err();
        assert!(matches!(err, FundError::Unauthorized(_)));
        assert_eq!(fund.emergency_state(), EmergencyState::Normal);
    }
}
