//! Circuit breaker wrapping every mutating fund operation.
//!
//! | State | Blocked | Allowed |
//! |-------|---------|---------|
//! | **Normal** | `emergency_redeem` | everything else |
//! | **Paused** | deposit, rebalance, `emergency_redeem` | redeem, fee accrual, admin |
//! | **Emergency** | deposit, rebalance, redeem, fee accrual | `emergency_redeem`, admin |
//!
//! Redemption is reachable in every state: through `redeem` while Normal or
//! Paused, and through the price-independent `emergency_redeem` once the fund
//! is in Emergency.

use std::fmt;

use log::{info, warn};

use crate::error::{FundError, Result};

/// Fund-wide circuit-breaker state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EmergencyState {
    #[default]
    Normal,
    Paused,
    Emergency,
}

impl fmt::Display for EmergencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyState::Normal => write!(f, "normal"),
            EmergencyState::Paused => write!(f, "paused"),
            EmergencyState::Emergency => write!(f, "in emergency"),
        }
    }
}

/// Operations gated by the circuit breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Deposit,
    Redeem,
    RedeemToSingleAsset,
    EmergencyRedeem,
    Rebalance,
    AccrueFees,
    Admin,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Deposit => "deposit",
            Operation::Redeem => "redeem",
            Operation::RedeemToSingleAsset => "redeem to single asset",
            Operation::EmergencyRedeem => "emergency redeem",
            Operation::Rebalance => "rebalance",
            Operation::AccrueFees => "fee accrual",
            Operation::Admin => "administration",
        };
        f.write_str(s)
    }
}

impl EmergencyState {
    /// Whether `op` may run in this state.
    pub fn permits(self, op: Operation) -> bool {
        use EmergencyState::*;
        use Operation::*;
        match (self, op) {
            (_, Admin) => true,
            (Normal, EmergencyRedeem) => false,
            (Normal, _) => true,
            (Paused, Redeem | RedeemToSingleAsset | AccrueFees) => true,
            (Paused, _) => false,
            (Emergency, EmergencyRedeem) => true,
            (Emergency, _) => false,
        }
    }

    /// `Ok` if `op` may run, otherwise a [`FundError::StateViolation`].
    pub fn ensure_permits(self, op: Operation) -> Result<()> {
        if self.permits(op) {
            Ok(())
        } else {
            Err(FundError::StateViolation { op, state: self })
        }
    }

    pub fn pause(self) -> Result<EmergencyState> {
        match self {
            EmergencyState::Normal => {
                info!("fund paused");
                Ok(EmergencyState::Paused)
            }
            EmergencyState::Paused => Err(FundError::invalid("fund is already paused")),
            EmergencyState::Emergency => Err(FundError::invalid(
                "fund is in emergency; pausing would be a no-op",
            )),
        }
    }

    pub fn unpause(self) -> Result<EmergencyState> {
        match self {
            EmergencyState::Paused => {
                info!("fund unpaused");
                Ok(EmergencyState::Normal)
            }
            _ => Err(FundError::invalid("fund is not paused")),
        }
    }

    /// Enter Emergency from Normal or Paused. `reason` is logged.
    pub fn enter_emergency(self, reason: &str) -> Result<EmergencyState> {
        match self {
            EmergencyState::Emergency => Err(FundError::invalid("fund is already in emergency")),
            _ => {
                warn!("emergency mode entered: {reason}");
                Ok(EmergencyState::Emergency)
            }
        }
    }

    /// Leave Emergency. The fund resumes in Normal.
    pub fn exit_emergency(self) -> Result<EmergencyState> {
        match self {
            EmergencyState::Emergency => {
                info!("emergency mode disabled");
                Ok(EmergencyState::Normal)
            }
            _ => Err(FundError::invalid("fund is not in emergency")),
        }
    }
}
