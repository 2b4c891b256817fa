//! TOML fund definition loading and validation.
//!
//! The file defines the fund at `init` time and supplies roles, oracle
//! settings and file locations on every invocation. Once a fund exists its
//! persisted state is authoritative for fees and weights.

use std::path::{Path, PathBuf};

use basketfund::{AccountId, Asset, AssetId, FundConfig, FundState, Roles, TargetWeights, Timestamp};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fund: FundSection,
    pub roles: RolesSection,
    pub assets: Vec<AssetSection>,
    #[serde(default)]
    pub fees: FeesSection,
    #[serde(default)]
    pub rebalance: RebalanceSection,
    #[serde(default)]
    pub oracle: OracleSection,
    #[serde(default)]
    pub paths: PathsSection,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundSection {
    pub name: String,
    pub base_asset: String,
    pub fee_recipient: String,
    #[serde(default = "default_timelock")]
    pub timelock_delay_secs: u64,
}

fn default_timelock() -> u64 {
    2 * 86_400
}

#[derive(Debug, Clone, Deserialize)]
pub struct RolesSection {
    pub manager: String,
    #[serde(default)]
    pub guardians: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetSection {
    pub id: String,
    pub decimals: u8,
    pub weight_bps: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeesSection {
    #[serde(default)]
    pub management_bps: u32,
    #[serde(default)]
    pub performance_bps: u32,
    #[serde(default)]
    pub exit_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceSection {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_tolerance")]
    pub tolerance_bps: u32,
    #[serde(default = "default_slippage")]
    pub max_slippage_bps: u32,
}

impl Default for RebalanceSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            tolerance_bps: default_tolerance(),
            max_slippage_bps: default_slippage(),
        }
    }
}

fn default_interval() -> u64 {
    86_400
}
fn default_tolerance() -> u32 {
    500
}
fn default_slippage() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleSection {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
        }
    }
}

fn default_heartbeat() -> u64 {
    3_600
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_wallets")]
    pub wallets: String,
    #[serde(default = "default_prices")]
    pub prices: String,
    #[serde(default = "default_audit")]
    pub audit: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            state: default_state(),
            wallets: default_wallets(),
            prices: default_prices(),
            audit: default_audit(),
        }
    }
}

fn default_state() -> String {
    "state.json".into()
}
fn default_wallets() -> String {
    "wallets.json".into()
}
fn default_prices() -> String {
    "prices.json".into()
}
fn default_audit() -> String {
    "logs/audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file. Relative paths in `[paths]` resolve
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Parse from a TOML string. Paths resolve against the working directory.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants the engine does not check itself.
    fn validate(&self) -> Result<()> {
        if self.fund.name.trim().is_empty() {
            return Err(Error::Config("fund name must not be empty".into()));
        }
        if self.roles.manager.trim().is_empty() {
            return Err(Error::Config("manager must not be empty".into()));
        }
        if self.assets.is_empty() {
            return Err(Error::Config("at least one [[assets]] entry is required".into()));
        }
        if !self.assets.iter().any(|a| a.id == self.fund.base_asset) {
            return Err(Error::Config(format!(
                "base asset '{}' is not listed in [[assets]]",
                self.fund.base_asset
            )));
        }
        // Weights, decimals and fee caps are checked by the engine.
        self.target_weights()?;
        self.fund_config(0).validate()?;
        Ok(())
    }

    pub fn target_weights(&self) -> Result<TargetWeights> {
        let pairs: Vec<(AssetId, u32)> = self
            .assets
            .iter()
            .map(|a| (AssetId::new(&a.id), a.weight_bps))
            .collect();
        Ok(TargetWeights::new(&pairs)?)
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.assets
            .iter()
            .map(|a| Asset::new(&a.id, a.decimals))
            .collect()
    }

    /// Engine config for a fund created at `now`.
    pub fn fund_config(&self, now: Timestamp) -> FundConfig {
        let mut c = FundConfig::new(AccountId::new(&self.fund.fee_recipient), now);
        c.management_fee_bps = self.fees.management_bps;
        c.performance_fee_bps = self.fees.performance_bps;
        c.exit_fee_bps = self.fees.exit_bps;
        c.rebalance_interval = self.rebalance.interval_secs;
        c.weight_tolerance_bps = self.rebalance.tolerance_bps;
        c.max_slippage_bps = self.rebalance.max_slippage_bps;
        c.timelock_delay = self.fund.timelock_delay_secs;
        c.price_heartbeat = self.oracle.heartbeat_secs;
        c
    }

    /// A fresh, empty fund state as of `now`.
    pub fn new_state(&self, now: Timestamp) -> Result<FundState> {
        Ok(FundState::new(
            self.assets(),
            AssetId::new(&self.fund.base_asset),
            self.target_weights()?,
            self.fund_config(now),
        )?)
    }

    pub fn roles(&self) -> Roles {
        self.roles.guardians.iter().fold(
            Roles::new(AccountId::new(&self.roles.manager)),
            |roles, g| roles.with_guardian(AccountId::new(g)),
        )
    }

    pub fn manager(&self) -> AccountId {
        AccountId::new(&self.roles.manager)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.paths.state)
    }

    pub fn wallets_path(&self) -> PathBuf {
        self.resolve(&self.paths.wallets)
    }

    pub fn prices_path(&self) -> PathBuf {
        self.resolve(&self.paths.prices)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.resolve(&self.paths.audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[fund]
name = "Balanced"
base_asset = "USD"
fee_recipient = "treasury"
timelock_delay_secs = 3600

[roles]
manager = "manager"
guardians = ["guardian"]

[[assets]]
id = "USD"
decimals = 6
weight_bps = 6000

[[assets]]
id = "ETH"
decimals = 18
weight_bps = 4000

[fees]
management_bps = 200
performance_bps = 2000

[rebalance]
tolerance_bps = 300
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.fund.name, "Balanced");
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.rebalance.tolerance_bps, 300);
        assert_eq!(config.rebalance.interval_secs, 86_400);
        assert_eq!(config.oracle.heartbeat_secs, 3_600);

        let fc = config.fund_config(500);
        assert_eq!(fc.management_fee_bps, 200);
        assert_eq!(fc.performance_fee_bps, 2_000);
        assert_eq!(fc.timelock_delay, 3_600);
        assert_eq!(fc.last_fee_accrual_time, 500);
    }

    #[test]
    fn roles_include_guardians() {
        let config = Config::from_toml(example_toml()).unwrap();
        let roles = config.roles();
        assert_eq!(roles.manager, AccountId::new("manager"));
        assert_eq!(roles.guardians, vec![AccountId::new("guardian")]);
    }

    #[test]
    fn paths_default_and_resolve() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.root = PathBuf::from("/srv/fund");
        assert_eq!(config.state_path(), PathBuf::from("/srv/fund/state.json"));
        assert_eq!(
            config.audit_path(),
            PathBuf::from("/srv/fund/logs/audit.jsonl")
        );
    }

    #[test]
    fn validate_catches_bad_weights() {
        let toml = example_toml().replace("weight_bps = 4000", "weight_bps = 3000");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn validate_catches_unknown_base() {
        let toml = example_toml().replace("base_asset = \"USD\"", "base_asset = \"EUR\"");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn validate_catches_fee_cap() {
        let toml = example_toml().replace("management_bps = 200", "management_bps = 5000");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Fund(_))));
    }
}
