//! One operator invocation: persisted state in, fund wired to paper
//! collaborators, persisted state out.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use basketfund::paper::{PaperExecutor, Vault, WalletEntry};
use basketfund::{AssetId, Fund, FundState, Timestamp, persistence};
use log::debug;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::quotes::PriceSnapshot;

pub struct Session {
    pub config: Config,
    pub fund: Fund,
    pub vault: Arc<Vault>,
    pub audit: AuditLog,
    pub now: Timestamp,
}

impl Session {
    /// Load the fund defined by `config` as of `now`.
    pub fn open(config: Config, now: Timestamp) -> Result<Self> {
        let state_path = config.state_path();
        let state = persistence::load_state(&state_path).map_err(|e| Error::State {
            path: state_path.clone(),
            source: e,
        })?;
        let vault = Arc::new(Vault::from_snapshot(&load_wallets(&config.wallets_path())?));

        let asset_ids: Vec<AssetId> = state.assets().iter().map(|a| a.id.clone()).collect();
        let prices = PriceSnapshot::load(&config.prices_path())?.aggregator(&asset_ids)?;

        // The paper venue trades at the oracle's current quotes.
        let mut market = PaperExecutor::builder();
        for asset in state.assets() {
            let quote = prices.get_price_with_fallback(&asset.id, now);
            if quote.valid {
                market = market.with_price(asset.id.clone(), quote.price, asset.decimals);
            } else {
                debug!("{}: no market price at {now}", asset.id);
            }
        }

        let fund = Fund::builder(state)
            .prices(prices)
            .custody(vault.clone())
            .executor(Arc::new(market.build()))
            .authorizer(Arc::new(config.roles()))
            .build()?;
        let audit = AuditLog::open(&config.audit_path(), now)?;

        Ok(Self {
            config,
            fund,
            vault,
            audit,
            now,
        })
    }

    /// Persist fund state and investor wallets.
    pub fn save(&self) -> Result<()> {
        let state_path = self.config.state_path();
        self.fund.save(&state_path).map_err(|e| Error::State {
            path: state_path,
            source: e,
        })?;
        save_wallets(&self.config.wallets_path(), &self.vault.snapshot())
    }
}

/// Create the state and wallet files for a new fund. Refuses to overwrite an
/// existing state file.
pub fn initialize(config: &Config, now: Timestamp) -> Result<FundState> {
    let state_path = config.state_path();
    if state_path.exists() {
        return Err(Error::State {
            source: io::Error::new(io::ErrorKind::AlreadyExists, "fund already initialized"),
            path: state_path,
        });
    }
    let state = config.new_state(now)?;
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    persistence::save_state(&state, &state_path).map_err(|e| Error::State {
        path: state_path,
        source: e,
    })?;
    let wallets = config.wallets_path();
    if !wallets.exists() {
        save_wallets(&wallets, &[])?;
    }
    Ok(state)
}

/// A missing wallet file means no wallets yet.
pub fn load_wallets(path: &Path) -> Result<Vec<WalletEntry>> {
    match std::fs::read_to_string(path) {
        Ok(data) => Ok(serde_json::from_str(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn save_wallets(path: &Path, entries: &[WalletEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let tmp = path.with_file_name(name);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basketfund::{AccountId, WAD};

    #[test]
    fn wallets_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        assert!(load_wallets(&path).unwrap().is_empty());

        let entries = vec![WalletEntry {
            holder: AccountId::new("alice"),
            asset: AssetId::new("USD"),
            amount: 5 * WAD,
        }];
        save_wallets(&path, &entries).unwrap();
        assert_eq!(load_wallets(&path).unwrap(), entries);
    }
}
