//! Safety tests: input validation, overflow handling, non-panicking behavior.

use basketfund::math::{self, WAD};
use basketfund::{
    AccountId, Asset, AssetId, ErrorKind, FundConfig, FundError, FundState, TargetWeights,
};

// ============================================================================
// Fixed-point arithmetic
// ============================================================================

#[test]
fn mul_div_never_panics_on_extremes() {
    assert_eq!(math::mul_div(u128::MAX, u128::MAX, u128::MAX), Ok(u128::MAX));
    assert_eq!(math::mul_div(u128::MAX, 2, 1), Err(FundError::Overflow));
    assert_eq!(math::mul_div(1, 1, 0), Err(FundError::Overflow));
    assert_eq!(math::mul_div(0, u128::MAX, 1), Ok(0));
}

#[test]
fn value_of_huge_balance_is_an_error_not_a_wrap() {
    let err = math::value_of(u128::MAX, u128::MAX, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn unsupported_decimals_are_rejected() {
    assert!(math::unit_scale(38).is_ok());
    assert!(math::unit_scale(39).is_err());
    assert!(math::amount_for_value(WAD, 0, 18).is_err());
}

// ============================================================================
// Identifiers
// ============================================================================

#[test]
fn ids_are_trimmed() {
    assert_eq!(AssetId::new("  ETH "), AssetId::new("ETH"));
    assert_eq!(AccountId::new("alice\n").as_str(), "alice");
    assert!(AssetId::new("   ").is_empty());
}

// ============================================================================
// Fund creation
// ============================================================================

fn config() -> FundConfig {
    FundConfig::new(AccountId::new("treasury"), 0)
}

#[test]
fn creation_rejects_bad_weights() {
    let x = AssetId::new("X");
    let y = AssetId::new("Y");
    assert!(TargetWeights::new(&[]).is_err());
    assert!(TargetWeights::new(&[(x.clone(), 5_000), (y.clone(), 4_999)]).is_err());
    assert!(TargetWeights::new(&[(x.clone(), 5_000), (x.clone(), 5_000)]).is_err());
    assert!(TargetWeights::new(&[(x, 10_000), (y, 0)]).is_ok());
}

#[test]
fn creation_rejects_inconsistent_assets() {
    let weights =
        TargetWeights::new(&[(AssetId::new("X"), 6_000), (AssetId::new("Y"), 4_000)]).unwrap();

    // Y has no definition
    let err = FundState::new(
        vec![Asset::new("X", 18)],
        AssetId::new("X"),
        weights.clone(),
        config(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // Base asset outside the basket
    assert!(FundState::new(
        vec![Asset::new("X", 18), Asset::new("Y", 18), Asset::new("Z", 6)],
        AssetId::new("Z"),
        weights.clone(),
        config(),
    )
    .is_err());

    // Decimals beyond u128 range
    assert!(FundState::new(
        vec![Asset::new("X", 18), Asset::new("Y", 40)],
        AssetId::new("X"),
        weights,
        config(),
    )
    .is_err());
}

#[test]
fn creation_rejects_out_of_range_config() {
    let weights = TargetWeights::new(&[(AssetId::new("X"), 10_000)]).unwrap();
    let mut c = config();
    c.weight_tolerance_bps = 0;
    assert!(FundState::new(vec![Asset::new("X", 18)], AssetId::new("X"), weights.clone(), c).is_err());

    let mut c = config();
    c.max_slippage_bps = 10_001;
    assert!(FundState::new(vec![Asset::new("X", 18)], AssetId::new("X"), weights, c).is_err());
}
