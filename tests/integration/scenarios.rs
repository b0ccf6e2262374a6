//! Replay scenarios with forced draws.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use spinlab::config::{BetLimits, DataSource, OverBudgetPolicy, RunConfig};
use spinlab::engine::compute_metrics;
use spinlab::engine::source::OutcomeSource;
use spinlab::engine::{run_spins, RunHandle, RunSnapshot};
use spinlab::storage::MemoryRepository;
use spinlab::strategy::builtin::StrategyRegistry;
use spinlab::strategy::host::HostServices;
use spinlab::strategy::{FnStrategy, Strategy, StrategyContext, StrategyError};
use spinlab::types::{Outcome, Pocket, RunStatus, StopReason, TableVariant};

fn pockets(ns: &[u8]) -> Vec<Pocket> {
    ns.iter().map(|n| Pocket::new(*n).unwrap()).collect()
}

fn constant(name: &str, yield_value: Value) -> Box<dyn Strategy> {
    Box::new(FnStrategy::new(name, move |_: &mut StrategyContext<'_>| {
        Ok(yield_value.clone())
    }))
}

async fn replay(config: RunConfig, strategy: Box<dyn Strategy>) -> RunSnapshot {
    let handle = RunHandle::new(Arc::new(MemoryRepository::new()));
    handle.start(config, strategy).await.unwrap();
    handle.wait().await
}

#[tokio::test]
async fn red_every_spin_trajectory() {
    let config = RunConfig::new(dec!(1000), 3).with_draws(pockets(&[1, 2, 0]));
    let snapshot = replay(config, constant("red", json!({"category": "red", "stake": 10}))).await;

    assert_eq!(snapshot.status, RunStatus::Completed);
    let mut trajectory = vec![dec!(1000)];
    trajectory.extend(snapshot.records.iter().map(|r| r.bankroll_after));
    assert_eq!(trajectory, vec![dec!(1000), dec!(1010), dec!(1000), dec!(990)]);

    let profits: Vec<Decimal> = snapshot.records.iter().map(|r| r.profit).collect();
    assert_eq!(profits, vec![dec!(10), dec!(-10), dec!(-10)]);
}

#[tokio::test]
async fn straight_below_inside_minimum_is_dropped() {
    let limits = BetLimits {
        min_inside: dec!(5),
        ..BetLimits::default()
    };
    let config = RunConfig::new(dec!(100), 1)
        .with_limits(limits)
        .with_draws(pockets(&[17]));
    let snapshot = replay(
        config,
        constant("straight", json!({"category": "straight", "target": 17, "stake": 3})),
    )
    .await;

    let record = &snapshot.records[0];
    assert!(record.bets.is_empty());
    assert_eq!(record.profit, Decimal::ZERO);
    assert_eq!(snapshot.bankroll, dec!(100));
}

#[tokio::test]
async fn over_budget_second_wager_is_clamped() {
    let two_bets = json!([
        {"category": "red", "stake": 40},
        {"category": "even", "stake": 40}
    ]);
    let config = RunConfig::new(dec!(50), 1).with_draws(pockets(&[2]));
    let snapshot = replay(config, constant("two", two_bets)).await;

    let record = &snapshot.records[0];
    let stakes: Vec<Decimal> = record.bets.iter().map(|b| b.wager.stake).collect();
    assert_eq!(stakes, vec![dec!(40), dec!(10)]);
    assert_eq!(record.total_stake, dec!(50));
    // 2 is black and even.
    assert_eq!(record.profit, dec!(-30));
}

#[tokio::test]
async fn over_budget_second_wager_is_dropped_under_drop_policy() {
    let two_bets = json!([
        {"category": "red", "stake": 40},
        {"category": "even", "stake": 40}
    ]);
    let config = RunConfig::new(dec!(50), 1)
        .with_over_budget(OverBudgetPolicy::Drop)
        .with_draws(pockets(&[2]));
    let snapshot = replay(config, constant("two", two_bets)).await;

    let record = &snapshot.records[0];
    assert_eq!(record.bets.len(), 1);
    assert_eq!(record.total_stake, dec!(40));
    assert_eq!(record.profit, dec!(-40));
}

/// Endless source that counts how often it was asked for a draw.
struct CountingSource(Arc<AtomicUsize>);

impl OutcomeSource for CountingSource {
    fn next_outcome(&mut self) -> Option<Outcome> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Pocket::new((n % 37) as u8).map(Outcome::from)
    }
}

#[tokio::test]
async fn strategy_error_keeps_earlier_records() {
    let config = RunConfig::new(dec!(1000), 100);
    let calls = Arc::new(AtomicUsize::new(0));
    let mut source = CountingSource(Arc::clone(&calls));
    let mut strategy = FnStrategy::new("throws", |ctx: &mut StrategyContext<'_>| {
        if ctx.spin == 5 {
            return Err(StrategyError::Failed("division by zero".into()));
        }
        Ok(json!({"category": "black", "stake": 5}))
    });
    let host = HostServices::new("throws", Arc::new(MemoryRepository::new()));

    let out = run_spins(
        &config,
        &mut source,
        &mut strategy,
        &host,
        &AtomicBool::new(false),
        |_, _| {},
    )
    .await;

    assert_eq!(out.ledger.len(), 4);
    assert!(matches!(
        out.status,
        RunStatus::Stopped {
            reason: StopReason::StrategyError { spin: 5, .. }
        }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn black_loses_on_double_zero() {
    let config = RunConfig::new(dec!(100), 1)
        .with_table(TableVariant::DoubleZero)
        .with_draws(vec![Pocket::DOUBLE_ZERO]);
    let snapshot = replay(config, constant("black", json!({"category": "black", "stake": 10}))).await;

    assert_eq!(snapshot.records[0].outcome.pocket, Pocket::DOUBLE_ZERO);
    assert_eq!(snapshot.records[0].profit, dec!(-10));
}

#[tokio::test]
async fn straight_on_double_zero_pays() {
    let config = RunConfig::new(dec!(100), 1)
        .with_table(TableVariant::DoubleZero)
        .with_draws(vec![Pocket::DOUBLE_ZERO]);
    let snapshot = replay(
        config,
        constant("00", json!({"category": "straight", "target": "00", "stake": 2})),
    )
    .await;
    assert_eq!(snapshot.records[0].profit, dec!(70));
}

#[tokio::test]
async fn virtual_stretch_does_not_move_bankroll() {
    let draws = pockets(&[2, 5, 7, 8, 10, 1, 4]);
    let config = RunConfig::new(dec!(200), 7).with_draws(draws);
    let strategy = FnStrategy::new("virtual", |ctx: &mut StrategyContext<'_>| {
        ctx.state.set_virtual((3..=5).contains(&ctx.spin));
        Ok(json!({"category": "red", "stake": 20}))
    });
    let snapshot = replay(config, Box::new(strategy)).await;
    let records = &snapshot.records;

    for (i, r) in records.iter().enumerate() {
        assert_eq!(r.is_virtual, (2..=4).contains(&i), "spin {}", r.spin);
        assert_eq!(r.bankroll_after, r.bankroll_before + r.profit);
    }
    assert_eq!(records[1].bankroll_after, records[5].bankroll_before);
    assert_eq!(snapshot.metrics.virtual_spins, 3);
    assert_eq!(snapshot.metrics.real_spins, 4);
}

#[tokio::test]
async fn metrics_match_full_recompute() {
    let config = RunConfig::new(dec!(500), 200).with_source(DataSource::Synthetic { seed: Some(99) });
    let strategy = StrategyRegistry::with_builtins()
        .create("martingale", &json!({"category": "odd", "base_stake": 5}))
        .unwrap();
    let snapshot = replay(config, strategy).await;

    let recomputed = compute_metrics(dec!(500), &snapshot.records);
    assert_eq!(snapshot.metrics, recomputed);
    assert_eq!(compute_metrics(dec!(500), &snapshot.records), recomputed);

    for pair in snapshot.records.windows(2) {
        assert_eq!(pair[1].bankroll_before, pair[0].real_bankroll_after());
    }
}

#[tokio::test]
async fn seeded_runs_are_reproducible() {
    let config = RunConfig::new(dec!(1000), 100).with_source(DataSource::Synthetic { seed: Some(7) });
    let registry = StrategyRegistry::with_builtins();
    let first = replay(config.clone(), registry.create("dalembert", &Value::Null).unwrap()).await;
    let second = replay(config, registry.create("dalembert", &Value::Null).unwrap()).await;
    assert_eq!(first.records, second.records);
}

#[tokio::test]
async fn invalid_config_is_rejected_before_running() {
    let handle = RunHandle::new(Arc::new(MemoryRepository::new()));
    let result = handle
        .start(RunConfig::new(dec!(100), 0), constant("red", Value::Null))
        .await;
    assert!(result.is_err());
    assert_eq!(handle.status(), RunStatus::Idle);
}
