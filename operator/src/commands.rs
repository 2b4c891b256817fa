//! Operator commands. Each writes human-readable output to `out`, appends
//! to the audit trail and persists the session when it changed state.

use std::io::Write;

use basketfund::{AccountId, Amount, AssetId, SHARE_DECIMALS, Timestamp};
use serde_json::json;

use crate::audit;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::{self, Session};
use crate::units::{format_units, parse_units};

/// Options for a rebalance run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebalanceOptions {
    pub dry_run: bool,
    /// Skip the confirmation prompt.
    pub force: bool,
}

/// Parse a share amount; `all` means the investor's whole balance.
fn parse_shares(s: &Session, investor: &AccountId, text: &str) -> Result<Amount> {
    if text.eq_ignore_ascii_case("all") {
        return Ok(s.fund.shares_of(investor));
    }
    parse_units(text, SHARE_DECIMALS)
}

fn decimals_of(s: &Session, asset: &AssetId) -> Result<u8> {
    Ok(s.fund.snapshot().asset(asset)?.decimals)
}

fn shares(amount: Amount) -> String {
    format_units(amount, SHARE_DECIMALS)
}

/// Wad values (prices, NAV) print with 18 decimals.
fn wad(value: u128) -> String {
    format_units(value, 18)
}

// ============================================================================
// Setup
// ============================================================================

pub fn init(config: &Config, now: Timestamp, out: &mut dyn Write) -> Result<()> {
    let state = session::initialize(config, now)?;
    let mut log = audit::AuditLog::open(&config.audit_path(), now)?;
    log.log(
        "initialized",
        json!({
            "fund": config.fund.name,
            "base_asset": state.base_asset().as_str(),
            "assets": state.weights().len(),
        }),
    )?;
    writeln!(
        out,
        "Initialized fund '{}' ({} assets, base {}) at {}",
        config.fund.name,
        state.weights().len(),
        state.base_asset(),
        config.state_path().display()
    )?;
    Ok(())
}

/// Paper faucet: credit an investor wallet outside the fund.
pub fn fund_wallet(
    s: &mut Session,
    holder: &AccountId,
    asset: &AssetId,
    amount: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let amount = parse_units(amount, decimals_of(s, asset)?)?;
    s.vault.credit(holder, asset, amount);
    s.audit.log(
        "wallet_funded",
        json!({
            "holder": holder.as_str(),
            "asset": asset.as_str(),
            "amount": amount.to_string(),
        }),
    )?;
    s.save()?;
    writeln!(
        out,
        "{holder} now holds {} {asset}",
        format_units(s.vault.balance(holder, asset), decimals_of(s, asset)?)
    )?;
    Ok(())
}

// ============================================================================
// Investor operations
// ============================================================================

pub fn deposit(
    s: &mut Session,
    investor: &AccountId,
    amount: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let base = s.fund.snapshot().base_asset().clone();
    let amount = parse_units(amount, decimals_of(s, &base)?)?;
    let receipt = s.fund.deposit(investor, amount, s.now)?;
    audit::log_deposit(&mut s.audit, investor, &receipt)?;
    s.save()?;

    writeln!(
        out,
        "Minted {} shares at {} per share ({} value)",
        shares(receipt.shares_minted),
        wad(receipt.share_price),
        wad(receipt.deposit_value),
    )?;
    for swap in &receipt.allocations {
        writeln!(out, "  allocated {} {} -> {} {}", swap.amount_in, swap.from, swap.amount_out, swap.to)?;
    }
    Ok(())
}

pub fn redeem(
    s: &mut Session,
    investor: &AccountId,
    amount: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let burn = parse_shares(s, investor, amount)?;
    let receipt = s.fund.redeem(investor, burn, s.now)?;
    audit::log_redemption(&mut s.audit, "redeem", investor, &receipt)?;
    s.save()?;

    writeln!(out, "Burned {} shares", shares(receipt.shares_burned))?;
    for (asset, paid) in &receipt.assets {
        writeln!(out, "  {:8} {}", asset.as_str(), format_units(*paid, decimals_of(s, asset)?))?;
    }
    Ok(())
}

pub fn redeem_to(
    s: &mut Session,
    investor: &AccountId,
    amount: &str,
    asset: &AssetId,
    out: &mut dyn Write,
) -> Result<()> {
    let burn = parse_shares(s, investor, amount)?;
    let receipt = s.fund.redeem_to_single_asset(investor, burn, asset, s.now)?;
    audit::log_single_asset_redemption(&mut s.audit, investor, &receipt)?;
    s.save()?;

    let decimals = decimals_of(s, asset)?;
    writeln!(
        out,
        "Burned {} shares for {} {asset} (exit fee {})",
        shares(receipt.shares_burned),
        format_units(receipt.amount_out, decimals),
        format_units(receipt.exit_fee, decimals),
    )?;
    Ok(())
}

pub fn emergency_redeem(
    s: &mut Session,
    investor: &AccountId,
    amount: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let burn = parse_shares(s, investor, amount)?;
    let receipt = s.fund.emergency_redeem(investor, burn, s.now)?;
    audit::log_redemption(&mut s.audit, "emergency_redeem", investor, &receipt)?;
    s.save()?;

    writeln!(out, "Burned {} shares (emergency)", shares(receipt.shares_burned))?;
    for (asset, paid) in &receipt.assets {
        writeln!(out, "  {:8} {}", asset.as_str(), format_units(*paid, decimals_of(s, asset)?))?;
    }
    Ok(())
}

pub fn accrue(s: &mut Session, out: &mut dyn Write) -> Result<()> {
    let accrual = s.fund.accrue_fees(s.now)?;
    audit::log_accrual(&mut s.audit, &accrual)?;
    s.save()?;
    writeln!(
        out,
        "Minted {} management and {} performance fee shares",
        shares(accrual.management_shares),
        shares(accrual.performance_shares),
    )?;
    Ok(())
}

// ============================================================================
// Rebalancing
// ============================================================================

pub fn rebalance(
    s: &mut Session,
    caller: &AccountId,
    opts: RebalanceOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let drift = s.fund.drift_report(s.now)?;
    write!(out, "{drift}")?;

    if !s.fund.can_rebalance(s.now)? {
        writeln!(out, "\nNo rebalancing needed.")?;
        s.audit.log_simple("no_rebalance_needed")?;
        return Ok(());
    }

    let plan = s.fund.plan_rebalance(s.now)?;
    writeln!(out, "\nPLANNED TRADES:")?;
    for (i, trade) in plan.iter().enumerate() {
        writeln!(out, "  {:>3}  {trade}", i + 1)?;
    }
    s.audit.log(
        "rebalance_planned",
        json!({
            "trades": plan.len(),
            "max_drift": drift.max_drift().to_string(),
            "dry_run": opts.dry_run,
        }),
    )?;

    if opts.dry_run {
        writeln!(out, "\n[DRY RUN] No trades executed.")?;
        return Ok(());
    }

    if !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Execute?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;
        s.audit
            .log("user_confirmed", json!({ "approved": confirmed }))?;
        if !confirmed {
            return Err(Error::Aborted("rebalance not confirmed".into()));
        }
    }

    let report = s.fund.rebalance(caller, s.now)?;
    audit::log_rebalance(&mut s.audit, caller, &report)?;
    s.save()?;
    write!(out, "\n{report}")?;
    Ok(())
}

// ============================================================================
// Queries
// ============================================================================

pub fn nav(s: &Session, out: &mut dyn Write) -> Result<()> {
    let valuation = s.fund.valuation(s.now)?;
    writeln!(out, "NAV:         {}", wad(valuation.nav))?;
    writeln!(out, "Share price: {}", wad(s.fund.get_share_price(s.now)?))?;
    writeln!(out, "Supply:      {}", shares(s.fund.total_shares()))?;
    writeln!(out)?;
    writeln!(
        out,
        "  {:8} {:>24} {:>16} {:>24}",
        "Asset", "Balance", "Price", "Value"
    )?;
    for e in &valuation.entries {
        writeln!(
            out,
            "  {:8} {:>24} {:>16} {:>24}",
            e.asset.as_str(),
            format_units(e.balance, e.decimals),
            wad(e.price),
            wad(e.value),
        )?;
    }
    Ok(())
}

pub fn status(s: &Session, out: &mut dyn Write) -> Result<()> {
    let state = s.fund.snapshot();
    let config = state.config();
    writeln!(out, "Fund '{}': {}", s.config.fund.name, state.emergency_state())?;
    writeln!(out, "Base asset:     {}", state.base_asset())?;
    writeln!(out, "Supply:         {}", shares(state.total_shares()))?;
    writeln!(
        out,
        "Fees:           management {} bps/yr, performance {} bps, exit {} bps",
        config.management_fee_bps, config.performance_fee_bps, config.exit_fee_bps
    )?;
    writeln!(
        out,
        "Rebalance:      every {}s, tolerance {} bps, last at {}",
        config.rebalance_interval, config.weight_tolerance_bps, config.last_rebalance_time
    )?;
    writeln!(out, "Fees accrued:   {}", config.last_fee_accrual_time)?;
    writeln!(out, "High-water mark: {}", wad(state.high_water_mark()))?;
    match state.pending_change() {
        Some(p) => writeln!(out, "Pending change: {} (eta {})", p.change, p.eta)?,
        None => writeln!(out, "Pending change: none")?,
    }

    writeln!(out, "\nPRICES:")?;
    for asset in state.weights().assets() {
        let quote = s.fund.price_quote(asset, s.now);
        match quote.source_index {
            Some(i) if quote.valid => {
                writeln!(out, "  {:8} {:>16}  (source #{i})", asset.as_str(), wad(quote.price))?
            }
            _ => writeln!(out, "  {:8} {:>16}", asset.as_str(), "unavailable")?,
        }
    }

    writeln!(out, "\nHOLDERS:")?;
    for (holder, held) in state.holders() {
        writeln!(out, "  {:16} {:>24}", holder.as_str(), shares(*held))?;
    }

    match s.fund.drift_report(s.now) {
        Ok(report) => write!(out, "\n{report}")?,
        Err(e) => writeln!(out, "\nDrift unavailable: {e}")?,
    }
    Ok(())
}

// ============================================================================
// Circuit breaker
// ============================================================================

pub fn pause(s: &mut Session, caller: &AccountId, out: &mut dyn Write) -> Result<()> {
    s.fund.pause(caller)?;
    audit::log_admin(&mut s.audit, "paused", caller)?;
    s.save()?;
    writeln!(out, "Fund paused")?;
    Ok(())
}

pub fn unpause(s: &mut Session, caller: &AccountId, out: &mut dyn Write) -> Result<()> {
    s.fund.unpause(caller)?;
    audit::log_admin(&mut s.audit, "unpaused", caller)?;
    s.save()?;
    writeln!(out, "Fund unpaused")?;
    Ok(())
}

pub fn emergency(
    s: &mut Session,
    caller: &AccountId,
    enable: bool,
    out: &mut dyn Write,
) -> Result<()> {
    if enable {
        s.fund.enable_emergency_mode(caller)?;
        audit::log_admin(&mut s.audit, "emergency_enabled", caller)?;
    } else {
        s.fund.disable_emergency_mode(caller)?;
        audit::log_admin(&mut s.audit, "emergency_disabled", caller)?;
    }
    s.save()?;
    writeln!(out, "Fund is {}", s.fund.emergency_state())?;
    Ok(())
}

pub fn heartbeat(s: &mut Session, out: &mut dyn Write) -> Result<()> {
    if s.fund.check_price_heartbeat(s.now)? {
        s.audit.log_simple("heartbeat_emergency")?;
        s.save()?;
        writeln!(out, "Stale prices: emergency mode entered")?;
    } else {
        writeln!(out, "Prices OK (fund is {})", s.fund.emergency_state())?;
    }
    Ok(())
}
