//! Core types: AssetId, AccountId, Asset, Amount, Wad, Timestamp

use std::fmt;

/// Raw token amount in the asset's smallest unit.
pub type Amount = u128;

/// Fixed-point value with 18 decimals (`WAD` = 1.0).
///
/// Prices, NAV, share price and weights all use this scale.
pub type Wad = u128;

/// Basis points (1/10,000).
pub type Bps = u32;

/// Seconds since the Unix epoch, supplied by the caller on every operation.
pub type Timestamp = u64;

/// Identifier of an asset held in (or priced for) the fund.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset id. Surrounding whitespace is stripped.
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of an investor, manager, guardian or fee recipient.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An asset with its decimal precision.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Asset {
    pub id: AssetId,
    pub decimals: u8,
}

impl Asset {
    pub fn new(id: &str, decimals: u8) -> Self {
        Self {
            id: AssetId::new(id),
            decimals,
        }
    }
}
