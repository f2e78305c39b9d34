//! Criterion benchmarks for the per-bar hot path.
//!
//! Benchmarks:
//! 1. OI derivative refresh (pure `advance` replay)
//! 2. Strategy loop over a full session with instant fills
//! 3. Snapshot serialization

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use sclu_core::domain::{Bar, OptionSide, OrderRequest, OrderResult, Position};
use sclu_core::engine::{BarInput, ExecutionAdapter, StrategyLoop};
use sclu_core::indicators::{compute_series, DerivativeParams};
use sclu_core::signal::FixedSide;
use sclu_core::StrategyConfig;

// ── Helpers ──────────────────────────────────────────────────────────

/// 3-minute bars with a periodic OI unwind every 40 bars.
fn make_bars(n: usize) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 7, 1)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    let mut oi = 2_000_000.0;
    (0..n)
        .map(|i| {
            let phase = i % 40;
            oi += match phase {
                30 => -5_000.0,
                31 => -40_000.0,
                32 => -45_000.0,
                33..=35 => 0.0,
                _ => 3_000.0,
            };
            let close = 100.0 + (i as f64 * 0.2).sin() * 3.0;
            Bar::new(
                start + Duration::minutes(3 * i as i64),
                close,
                close + 0.5,
                close - 0.5,
                close,
                10_000,
                oi,
            )
        })
        .collect()
}

struct InstantFill;

impl ExecutionAdapter for InstantFill {
    fn submit_order(&mut self, request: &OrderRequest) -> OrderResult {
        OrderResult::filled(
            request.id,
            request.reference_price,
            request.size,
            request.timestamp,
        )
    }

    fn open_positions(&self) -> Vec<Position> {
        Vec::new()
    }
}

// ── 1. Derivatives ───────────────────────────────────────────────────

fn bench_derivatives(c: &mut Criterion) {
    let mut group = c.benchmark_group("oi_derivatives");
    let bars = make_bars(5_000);
    for period in [20usize, 30, 50] {
        let params = DerivativeParams {
            period,
            dt: 3.0,
            bar_interval: Duration::minutes(3),
            gap_policy: Default::default(),
        };
        group.bench_with_input(BenchmarkId::new("replay_5000", period), &params, |b, p| {
            b.iter(|| compute_series(black_box(p), black_box(&bars)))
        });
    }
    group.finish();
}

// ── 2. Strategy loop ─────────────────────────────────────────────────

fn bench_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_loop");
    let cfg = StrategyConfig::default().validate().unwrap();
    let inputs: Vec<BarInput> = make_bars(5_000).into_iter().map(BarInput::from).collect();

    group.bench_function("session_5000_bars", |b| {
        b.iter(|| {
            let mut strategy = StrategyLoop::new(
                &cfg,
                cfg.instrument("NIFTY"),
                Arc::new(FixedSide(OptionSide::Call)),
            );
            let mut broker = InstantFill;
            for input in &inputs {
                black_box(strategy.step(input, &mut broker));
            }
        })
    });
    group.finish();
}

// ── 3. Snapshots ─────────────────────────────────────────────────────

fn bench_snapshot(c: &mut Criterion) {
    let cfg = StrategyConfig::default().validate().unwrap();
    let mut strategy = StrategyLoop::new(
        &cfg,
        cfg.instrument("NIFTY"),
        Arc::new(FixedSide(OptionSide::Call)),
    );
    let mut broker = InstantFill;
    for bar in make_bars(200) {
        strategy.step(&BarInput::from(bar), &mut broker);
    }

    c.bench_function("snapshot_to_json", |b| {
        b.iter(|| black_box(strategy.snapshot().to_json().unwrap()))
    });
}

criterion_group!(benches, bench_derivatives, bench_loop, bench_snapshot);
criterion_main!(benches);
