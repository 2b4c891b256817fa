//! JSONL audit trail.
//!
//! Every state-changing command appends one event per line. Raw amounts are
//! written as decimal strings since JSON numbers lose u128 precision in most
//! readers.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use basketfund::{
    AccountId, DepositReceipt, ExecutedSwap, FeeAccrual, FeeSummary, RebalanceReport,
    RedemptionReceipt, SingleAssetRedemption, Timestamp,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    /// Fund clock the command ran at.
    pub fund_time: Timestamp,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<fs::File>,
    fund_time: Timestamp,
}

impl AuditLog {
    /// Open (or create) the audit log for appending.
    pub fn open(path: &Path, fund_time: Timestamp) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            fund_time,
        })
    }

    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            fund_time: self.fund_time,
            data,
        };
        writeln!(self.writer, "{}", serde_json::to_string(&entry)?)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, json!({}))
    }
}

fn fees_json(fees: &FeeSummary) -> serde_json::Value {
    json!({
        "management_shares": fees.management_shares.to_string(),
        "performance_shares": fees.performance_shares.to_string(),
    })
}

fn swaps_json(swaps: &[ExecutedSwap]) -> Vec<serde_json::Value> {
    swaps
        .iter()
        .map(|s| {
            json!({
                "from": s.from.as_str(),
                "to": s.to.as_str(),
                "amount_in": s.amount_in.to_string(),
                "amount_out": s.amount_out.to_string(),
                "min_out": s.min_out.to_string(),
            })
        })
        .collect()
}

pub fn log_deposit(audit: &mut AuditLog, investor: &AccountId, r: &DepositReceipt) -> Result<()> {
    audit.log(
        "deposit",
        json!({
            "investor": investor.as_str(),
            "shares_minted": r.shares_minted.to_string(),
            "deposit_value": r.deposit_value.to_string(),
            "share_price": r.share_price.to_string(),
            "fees": fees_json(&r.fees),
            "allocations": swaps_json(&r.allocations),
        }),
    )
}

/// Used for both pro-rata and emergency redemptions.
pub fn log_redemption(
    audit: &mut AuditLog,
    event: &'static str,
    investor: &AccountId,
    r: &RedemptionReceipt,
) -> Result<()> {
    let assets: Vec<_> = r
        .assets
        .iter()
        .map(|(a, amount)| json!({ "asset": a.as_str(), "amount": amount.to_string() }))
        .collect();
    audit.log(
        event,
        json!({
            "investor": investor.as_str(),
            "shares_burned": r.shares_burned.to_string(),
            "assets": assets,
            "fees": fees_json(&r.fees),
        }),
    )
}

pub fn log_single_asset_redemption(
    audit: &mut AuditLog,
    investor: &AccountId,
    r: &SingleAssetRedemption,
) -> Result<()> {
    audit.log(
        "redeem_to",
        json!({
            "investor": investor.as_str(),
            "shares_burned": r.shares_burned.to_string(),
            "asset": r.asset.as_str(),
            "amount_out": r.amount_out.to_string(),
            "exit_fee": r.exit_fee.to_string(),
            "swaps": swaps_json(&r.swaps),
            "fees": fees_json(&r.fees),
        }),
    )
}

pub fn log_accrual(audit: &mut AuditLog, accrual: &FeeAccrual) -> Result<()> {
    audit.log("fees_accrued", fees_json(&FeeSummary::from(*accrual)))
}

pub fn log_rebalance(audit: &mut AuditLog, caller: &AccountId, r: &RebalanceReport) -> Result<()> {
    audit.log(
        "rebalance_executed",
        json!({
            "caller": caller.as_str(),
            "max_drift_before": r.before.max_drift().to_string(),
            "max_drift_after": r.after.max_drift().to_string(),
            "trades": swaps_json(&r.trades),
        }),
    )
}

pub fn log_admin(audit: &mut AuditLog, event: &'static str, caller: &AccountId) -> Result<()> {
    audit.log(event, json!({ "caller": caller.as_str() }))
}

pub fn log_failure(audit: &mut AuditLog, command: &str, error: &str) -> Result<()> {
    audit.log(
        "command_failed",
        json!({ "command": command, "error": error }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_writes_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&path, 42).unwrap();
            log.log_simple("paused").unwrap();
            log_accrual(
                &mut log,
                &FeeAccrual {
                    management_shares: u128::MAX,
                    performance_shares: 0,
                },
            )
            .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["fund_time"], 42);
        }
        assert!(lines[0].contains("\"event\":\"paused\""));
        assert!(lines[1].contains(&format!("\"management_shares\":\"{}\"", u128::MAX)));
    }

    #[test]
    fn audit_log_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("deep").join("audit.jsonl");
        let mut log = AuditLog::open(&path, 0).unwrap();
        log.log_simple("test").unwrap();
        assert!(path.exists());
    }
}
