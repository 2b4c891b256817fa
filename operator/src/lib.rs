//! basketfund-operator: paper-trading operator for a basketfund fund.
//!
//! Reads the fund definition from a TOML file and prices from a JSON
//! snapshot, runs one engine operation per invocation against in-memory
//! paper custody and venue, persists state between invocations, and keeps
//! a JSONL audit trail.

pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod quotes;
pub mod session;
pub mod units;
