//! Error types for the operator.

use std::path::PathBuf;

use basketfund::FundError;

/// All errors that can occur while operating a fund.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("price snapshot error: {0}")]
    Prices(String),

    #[error("failed to read price snapshot {path}: {source}")]
    PricesRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fund state {path}: {source}")]
    State {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid amount '{0}'")]
    Amount(String),

    #[error(transparent)]
    Fund(#[from] FundError),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
