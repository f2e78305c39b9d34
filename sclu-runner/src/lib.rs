//! SCLU Runner — config loading, backtests, live sessions, sweeps, export.
//!
//! Wraps `sclu-core` with everything that touches the outside world:
//! TOML config with `SCLU_*` environment overrides, a simulated broker,
//! sequential backtest replay, the threaded live session, run summaries,
//! parallel parameter sweeps, synthetic data, and artifact export.

pub mod backtest;
pub mod broker;
pub mod config;
pub mod export;
pub mod live;
pub mod logging;
pub mod metrics;
pub mod sweep;
pub mod synthetic;

pub use backtest::{run_backtest, run_backtest_with, BacktestResult, RunError, SCHEMA_VERSION};
pub use broker::{ScriptedFill, SimulatedBroker};
pub use config::{ConfigError, RunnerConfig, SidePolicyConfig, ValidatedRunnerConfig};
pub use live::{LiveSession, SessionError, SessionEvent, SessionReport};
pub use metrics::RunSummary;
pub use sweep::{run_sweep, SweepGrid, SweepPoint};
pub use synthetic::SyntheticBars;
