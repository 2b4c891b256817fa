//! Error types for fund operations.

use std::fmt;

use crate::emergency::{EmergencyState, Operation};
use crate::types::{Amount, AssetId, Timestamp};

/// All errors a fund operation can fail with.
///
/// Every failure aborts the triggering operation; no state change made during
/// it is kept.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FundError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{op} is not permitted while the fund is {state}")]
    StateViolation {
        op: Operation,
        state: EmergencyState,
    },

    #[error("no valid price for {0}")]
    PriceUnavailable(AssetId),

    #[error("slippage exceeded swapping {from} -> {to}: got {amount_out}, minimum {min_out}")]
    SlippageExceeded {
        from: AssetId,
        to: AssetId,
        amount_out: Amount,
        min_out: Amount,
    },

    #[error("insufficient {asset} balance: need {required}, have {available}")]
    InsufficientBalance {
        asset: AssetId,
        required: Amount,
        available: Amount,
    },

    #[error("re-entrant call rejected: another mutating operation is in progress")]
    Reentrant,

    #[error("rebalance left {asset} {drift_bps} bps from target (tolerance {tolerance_bps} bps)")]
    ToleranceNotMet {
        asset: AssetId,
        drift_bps: u128,
        tolerance_bps: u32,
    },

    #[error("timelocked change not executable before {eta}")]
    Timelocked { eta: Timestamp },

    #[error("arithmetic overflow")]
    Overflow,
}

/// Coarse error category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    StateViolation,
    PriceUnavailable,
    SlippageExceeded,
    InsufficientBalance,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::StateViolation => "state violation",
            ErrorKind::PriceUnavailable => "price unavailable",
            ErrorKind::SlippageExceeded => "slippage exceeded",
            ErrorKind::InsufficientBalance => "insufficient balance",
        };
        f.write_str(s)
    }
}

impl FundError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FundError::InvalidInput(_) | FundError::Overflow => ErrorKind::InvalidInput,
            FundError::Unauthorized(_) => ErrorKind::Unauthorized,
            FundError::StateViolation { .. }
            | FundError::Reentrant
            | FundError::ToleranceNotMet { .. }
            | FundError::Timelocked { .. } => ErrorKind::StateViolation,
            FundError::PriceUnavailable(_) => ErrorKind::PriceUnavailable,
            FundError::SlippageExceeded { .. } => ErrorKind::SlippageExceeded,
            FundError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FundError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(
            FundError::invalid("amount must be > 0").to_string(),
            "invalid input: amount must be > 0"
        );
        assert_eq!(
            FundError::PriceUnavailable(AssetId::new("Y")).to_string(),
            "no valid price for Y"
        );
        let err = FundError::StateViolation {
            op: Operation::Deposit,
            state: EmergencyState::Paused,
        };
        assert_eq!(err.to_string(), "deposit is not permitted while the fund is paused");
    }

    #[test]
    fn refinements_map_to_categories() {
        assert_eq!(FundError::Reentrant.kind(), ErrorKind::StateViolation);
        assert_eq!(FundError::Overflow.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            FundError::Timelocked { eta: 10 }.kind(),
            ErrorKind::StateViolation
        );
    }

    #[test]
    fn is_error() {
        let err: Box<dyn std::error::Error> = Box::new(FundError::Reentrant);
        assert!(err.to_string().contains("re-entrant"));
    }
}
