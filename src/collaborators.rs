//! Contracts of the external collaborators the engine drives.
//!
//! Implementations are supplied at fund construction. [`crate::paper`] has
//! in-memory versions for tests and simulation.

use crate::error::Result;
use crate::types::{AccountId, Amount, AssetId, Bps};

/// A swap handed to the trade executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapRequest {
    pub from: AssetId,
    pub to: AssetId,
    pub amount_in: Amount,
    /// Output floor derived from the fund's own quotes and `max_slippage_bps`.
    pub min_out: Amount,
    pub max_slippage_bps: Bps,
}

/// Executes trades out of fund custody.
pub trait TradeExecutor: Send + Sync {
    /// Swap and return the amount received. Must fail with
    /// `SlippageExceeded` rather than return less than `min_out`.
    fn swap(&self, request: &SwapRequest) -> Result<Amount>;
}

/// Moves assets between investors and fund custody.
pub trait Custody: Send + Sync {
    /// Pull `amount` of `asset` from `from` into the fund.
    fn transfer_in(&self, asset: &AssetId, from: &AccountId, amount: Amount) -> Result<()>;

    /// Push `amount` of `asset` from the fund to `to`.
    fn transfer_out(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> Result<()>;
}

/// Answers role questions for privileged operations.
pub trait Authorizer: Send + Sync {
    fn is_manager(&self, who: &AccountId) -> bool;
    fn is_guardian(&self, who: &AccountId) -> bool;
}

/// Fixed role assignment: one manager, any number of guardians.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Roles {
    pub manager: AccountId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub guardians: Vec<AccountId>,
}

impl Roles {
    pub fn new(manager: AccountId) -> Self {
        Self {
            manager,
            guardians: Vec::new(),
        }
    }

    pub fn with_guardian(mut self, guardian: AccountId) -> Self {
        self.guardians.push(guardian);
        self
    }
}

impl Authorizer for Roles {
    fn is_manager(&self, who: &AccountId) -> bool {
        &self.manager == who
    }

    fn is_guardian(&self, who: &AccountId) -> bool {
        self.guardians.contains(who)
    }
}
