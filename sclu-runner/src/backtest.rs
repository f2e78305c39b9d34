//! Backtest runner — replays bars through the strategy loop.
//!
//! Replay is strictly sequential and deterministic: the same bars and config
//! always produce the same trades, events and derivative trajectory. Orders
//! go to a [`SimulatedBroker`] and their results are applied before the next
//! bar. Whatever is still open when the data runs out is liquidated at the
//! last accepted close with exit reason `EndOfData`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use sclu_core::domain::{ExitReason, TradeRecord};
use sclu_core::engine::{BarInput, ExecutionAdapter, LoopEvent, StrategyLoop};
use sclu_core::indicators::DerivativeState;
use sclu_core::risk::RiskState;

use crate::broker::SimulatedBroker;
use crate::config::{ConfigError, ValidatedRunnerConfig};
use crate::metrics::RunSummary;

/// Liquidation attempts before giving up on a broker that keeps rejecting.
const MAX_LIQUIDATION_ATTEMPTS: usize = 8;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no bars to replay")]
    NoBars,
    #[error("position still open after {attempts} end-of-data liquidation attempts")]
    LiquidationFailed { attempts: usize },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub config_hash: String,
    /// BLAKE3 of the replayed inputs.
    pub dataset_hash: String,
    pub symbol: String,
    pub side_policy: String,
    pub bar_count: usize,
    pub trades: Vec<TradeRecord>,
    pub events: Vec<LoopEvent>,
    /// Derivative state of every accepted bar, in order.
    pub trajectory: Vec<DerivativeState>,
    pub summary: RunSummary,
    pub final_risk: RiskState,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Content hash of a bar sequence.
pub fn dataset_hash(inputs: &[BarInput]) -> String {
    let mut hasher = blake3::Hasher::new();
    for input in inputs {
        if let Ok(json) = serde_json::to_vec(input) {
            hasher.update(&json);
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Replay `inputs` against a fresh [`SimulatedBroker`] for the configured
/// instrument.
pub fn run_backtest(
    config: &ValidatedRunnerConfig,
    inputs: &[BarInput],
) -> Result<BacktestResult, RunError> {
    run_backtest_with(
        config,
        inputs,
        &mut SimulatedBroker::for_instrument(config.instrument()),
    )
}

/// Replay `inputs` against any execution adapter.
pub fn run_backtest_with(
    config: &ValidatedRunnerConfig,
    inputs: &[BarInput],
    adapter: &mut dyn ExecutionAdapter,
) -> Result<BacktestResult, RunError> {
    if inputs.is_empty() {
        return Err(RunError::NoBars);
    }

    let mut strategy = StrategyLoop::new(
        &config.strategy,
        config.instrument(),
        config.side_policy(),
    );
    let mut events = Vec::new();
    let mut trajectory = Vec::with_capacity(inputs.len());

    for input in inputs {
        let outcome = strategy.step(input, adapter);
        trajectory.extend(outcome.derivatives);
        events.extend(outcome.events);
    }

    let mut attempts = 0;
    while !strategy.position().is_flat() {
        if attempts == MAX_LIQUIDATION_ATTEMPTS {
            warn!(attempts, "end-of-data liquidation keeps failing");
            return Err(RunError::LiquidationFailed { attempts });
        }
        attempts += 1;
        let mut outcome = strategy.liquidate(ExitReason::EndOfData);
        strategy.execute(&mut outcome, adapter);
        events.extend(outcome.events);
    }

    let trades: Vec<TradeRecord> = events
        .iter()
        .filter_map(|e| match e {
            LoopEvent::TradeClosed(trade) => Some(trade.clone()),
            _ => None,
        })
        .collect();
    let summary = RunSummary::compute(&trades, &events);
    info!(
        bars = inputs.len(),
        trades = summary.trade_count,
        net_pnl = summary.net_pnl,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        config_hash: strategy.config_hash().to_string(),
        dataset_hash: dataset_hash(inputs),
        symbol: config.run.symbol.clone(),
        side_policy: strategy.side_policy_name().to_string(),
        bar_count: inputs.len(),
        trades,
        events,
        trajectory,
        summary,
        final_risk: strategy.risk_state().clone(),
    })
}
