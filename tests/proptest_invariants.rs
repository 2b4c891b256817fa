//! Property-based tests for fund invariants.
//!
//! These tests use proptest to verify that key invariants hold
//! across randomly generated baskets, price paths and fee settings.

mod common;

use basketfund::fees::{management_fee_shares, performance_fee};
use basketfund::{AssetId, TargetWeights, WAD};
use common::*;
use proptest::prelude::*;

/// Price multiplier in percent (50% .. 250%).
fn move_strategy() -> impl Strategy<Value = u128> {
    50u128..=250u128
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    // ========================================================================
    // CREATION
    // ========================================================================

    /// Weights are accepted exactly when they sum to 10,000.
    #[test]
    fn weight_sum_is_enforced(weights in prop::collection::vec(0u32..=10_000, 1..8)) {
        let entries: Vec<(AssetId, u32)> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| (AssetId::new(&format!("A{i}")), *w))
            .collect();
        let sum: u32 = weights.iter().sum();
        prop_assert_eq!(TargetWeights::new(&entries).is_ok(), sum == 10_000);
    }

    // ========================================================================
    // FEES
    // ========================================================================

    /// The management fee gives the recipient the fee fraction of the
    /// post-mint supply, never more.
    #[test]
    fn management_fee_never_overcharges(
        supply in 1u128..=1_000_000_000 * WAD,
        rate in 0u32..=1_000,
        elapsed in 0u64..=basketfund::SECONDS_PER_YEAR,
    ) {
        let minted = management_fee_shares(supply, rate, elapsed).unwrap();
        let lhs = minted * 31_536_000 * 10_000;
        let rhs = (supply + minted) * u128::from(rate) * u128::from(elapsed);
        prop_assert!(lhs <= rhs);
    }

    /// The new mark sits between the old mark and the observed price.
    #[test]
    fn high_water_mark_moves_up_only(
        hwm in WAD / 2..=3 * WAD,
        price in WAD / 2..=3 * WAD,
        rate in 0u32..=5_000,
    ) {
        match performance_fee(100 * WAD, price, hwm, rate).unwrap() {
            None => prop_assert!(price <= hwm),
            Some(fee) => {
                prop_assert!(fee.new_high_water_mark > hwm);
                prop_assert!(fee.new_high_water_mark <= price);
            }
        }
    }

    /// Accruing twice at the same instant mints only once.
    #[test]
    fn accrual_is_idempotent_at_fixed_time(
        dt in 1u64..=3_000,
        rate in 1u32..=1_000,
    ) {
        let h = Harness::with_config(&[("X", 10_000, WAD)], |c| c.management_fee_bps = rate);
        h.fund.deposit(&alice(), 1_000 * WAD, 0).unwrap();

        let first = h.fund.accrue_fees(dt).unwrap();
        let second = h.fund.accrue_fees(dt).unwrap();
        prop_assert!(first.management_shares > 0);
        prop_assert_eq!(second.total(), 0);
    }

    /// Across any price path the fund's high-water mark never decreases.
    #[test]
    fn fund_high_water_mark_is_monotonic(moves in prop::collection::vec(move_strategy(), 1..10)) {
        let h = Harness::with_config(
            &[("X", 5_000, WAD), ("Y", 5_000, 10 * WAD)],
            |c| c.performance_fee_bps = 2_000,
        );
        h.fund.deposit(&alice(), 100 * WAD, 0).unwrap();

        let mut mark = h.fund.snapshot().high_water_mark();
        for (step, pct) in moves.into_iter().enumerate() {
            let now = (step as u64 + 1) * 60;
            h.set_price(&y(), 10 * WAD * pct / 100, now);
            h.refresh(now);
            h.fund.accrue_fees(now).unwrap();
            let next = h.fund.snapshot().high_water_mark();
            prop_assert!(next >= mark);
            mark = next;
        }
    }

    // ========================================================================
    // REBALANCING
    // ========================================================================

    /// A successful rebalance leaves every asset inside the tolerance band.
    #[test]
    fn rebalance_lands_inside_tolerance(
        y_move in move_strategy(),
        z_move in move_strategy(),
    ) {
        let h = Harness::scenario();
        h.fund.deposit(&alice(), 1_000 * WAD, 10).unwrap();
        h.set_price(&y(), 300 * WAD * y_move / 100, 20);
        h.set_price(&z(), 15 * WAD * z_move / 100, 20);
        h.refresh(20);

        if h.fund.can_rebalance(20).unwrap() {
            let report = h.fund.rebalance(&manager(), 20).unwrap();
            let band = 5 * WAD / 100;
            for d in &report.after.drifts {
                prop_assert!(d.drift() <= band);
            }
            prop_assert!(report.trades.len() < 3);
        }
    }
}
