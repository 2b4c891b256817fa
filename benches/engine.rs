//! Engine benchmarks: valuation, trade planning and a full deposit.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use basketfund::paper::{PaperExecutor, Vault};
use basketfund::planner::calculate_required_trades;
use basketfund::{
    AccountId, Asset, AssetId, Fund, FundConfig, FundState, ManualFeed, PriceAggregator, Roles,
    TargetWeights, WAD,
};

fn asset(i: usize) -> AssetId {
    AssetId::new(&format!("A{i:02}"))
}

/// Build an `n_assets` fund with equal weights holding a deposit, then
/// drift its prices with a simple deterministic RNG.
fn drifted_fund(n_assets: usize) -> (Fund, Arc<ManualFeed>) {
    let feed = Arc::new(ManualFeed::new("bench"));
    let mut prices = PriceAggregator::new();
    let mut executor = PaperExecutor::builder();
    let mut weights = Vec::with_capacity(n_assets);
    let share = 10_000 / n_assets as u32;
    for i in 0..n_assets {
        let w = if i == 0 {
            10_000 - share * (n_assets as u32 - 1)
        } else {
            share
        };
        weights.push((asset(i), w));
        feed.set_price(&asset(i), 10 * WAD, 0);
        prices.add_asset(asset(i)).unwrap();
        prices.add_source(&asset(i), feed.clone(), u64::MAX).unwrap();
        executor = executor.with_price(asset(i), 10 * WAD, 18);
    }

    let state = FundState::new(
        (0..n_assets).map(|i| Asset::new(asset(i).as_str(), 18)).collect(),
        asset(0),
        TargetWeights::new(&weights).unwrap(),
        FundConfig::new(AccountId::new("treasury"), 0),
    )
    .unwrap();
    let executor = Arc::new(executor.build());
    let investor = AccountId::new("investor");
    let vault = Vault::builder()
        .with_balance(investor.clone(), asset(0), u128::from(u64::MAX) * WAD)
        .build();
    let fund = Fund::builder(state)
        .prices(prices)
        .custody(Arc::new(vault))
        .executor(executor.clone())
        .authorizer(Arc::new(Roles::new(AccountId::new("manager"))))
        .build()
        .unwrap();
    fund.deposit(&investor, 1_000_000 * WAD, 0).unwrap();

    // xorshift32
    let mut rng_state: u32 = 42;
    for i in 0..n_assets {
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 17;
        rng_state ^= rng_state << 5;
        let pct = u128::from(rng_state % 101) + 50; // 50%..150%
        let price = 10 * WAD * pct / 100;
        feed.set_price(&asset(i), price, 0);
        executor.set_price(&asset(i), price, 18);
    }
    (fund, feed)
}

fn bench_nav(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/nav");
    for n in [3, 10, 20] {
        let (fund, _feed) = drifted_fund(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &fund, |b, fund| {
            b.iter(|| black_box(fund.calculate_nav(1).unwrap()));
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/plan_trades");
    for n in [3, 10, 20] {
        let (fund, _feed) = drifted_fund(n);
        let valuation = fund.valuation(1).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &valuation, |b, v| {
            b.iter(|| black_box(calculate_required_trades(v).unwrap()));
        });
    }
    group.finish();
}

fn bench_deposit(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/deposit");
    let (fund, _feed) = drifted_fund(10);
    let investor = AccountId::new("investor");
    group.bench_function("10_assets", |b| {
        b.iter(|| black_box(fund.deposit(&investor, 1_000 * WAD, 1).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_nav, bench_plan, bench_deposit);
criterion_main!(benches);
