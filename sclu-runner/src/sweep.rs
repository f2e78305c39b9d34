//! Sensitivity sweep — the same bars replayed across a parameter grid.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use sclu_core::engine::BarInput;

use crate::backtest::{run_backtest, RunError};
use crate::config::{ConfigError, RunnerConfig};
use crate::metrics::RunSummary;

/// Grid of `sensitivity` × `oi_ma_period` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepGrid {
    pub sensitivities: Vec<f64>,
    pub oi_ma_periods: Vec<usize>,
}

impl Default for SweepGrid {
    /// The documented sensitivity band against short, default and long windows.
    fn default() -> Self {
        Self {
            sensitivities: vec![0.005, 0.0075, 0.01, 0.015, 0.02],
            oi_ma_periods: vec![20, 30, 50],
        }
    }
}

impl SweepGrid {
    pub fn size(&self) -> usize {
        self.sensitivities.len() * self.oi_ma_periods.len()
    }

    /// Grid points in row-major order: sensitivity outer, period inner.
    pub fn points(&self) -> Vec<(f64, usize)> {
        self.sensitivities
            .iter()
            .flat_map(|&s| self.oi_ma_periods.iter().map(move |&p| (s, p)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub sensitivity: f64,
    pub oi_ma_period: usize,
    pub config_hash: String,
    pub summary: RunSummary,
}

/// Run every grid point, in parallel when `parallel` is set.
///
/// Results come back in [`SweepGrid::points`] order either way. A grid point
/// outside the validated ranges fails the whole sweep.
pub fn run_sweep(
    base: &RunnerConfig,
    grid: &SweepGrid,
    inputs: &[BarInput],
    parallel: bool,
) -> Result<Vec<SweepPoint>, RunError> {
    let configs = grid
        .points()
        .into_iter()
        .map(|(sensitivity, oi_ma_period)| {
            let mut config = base.clone();
            config.strategy.sensitivity = sensitivity;
            config.strategy.oi_ma_period = oi_ma_period;
            config.validate()
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let run_one = |config: &crate::config::ValidatedRunnerConfig| {
        run_backtest(config, inputs).map(|result| SweepPoint {
            sensitivity: config.strategy.sensitivity,
            oi_ma_period: config.strategy.oi_ma_period,
            config_hash: result.config_hash,
            summary: result.summary,
        })
    };

    if parallel {
        configs.par_iter().map(run_one).collect()
    } else {
        configs.iter().map(run_one).collect()
    }
}
