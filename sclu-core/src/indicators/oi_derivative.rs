//! Open-interest derivative engine.
//!
//! Tracks the rolling OI window and produces, per bar:
//! - simple moving average of the last `period` OI values
//! - first derivative `(OI[t] - OI[t-1]) / dt`
//! - second derivative `(OI[t] - 2*OI[t-1] + OI[t-2]) / dt^2`
//!
//! The core is the pure function [`advance`]: it takes the previous
//! [`OiHistory`] by reference and returns the next one together with the
//! [`DerivativeState`]. Nothing else is carried between bars, so replaying
//! the same bars always yields bit-identical output.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

use crate::config::{GapPolicy, ValidatedConfig};
use crate::domain::Bar;

/// Raw samples needed before either derivative is defined.
const DERIVATIVE_SAMPLES: usize = 3;

/// Parameters of the derivative computation.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeParams {
    /// Moving-average window length in bars.
    pub period: usize,
    /// Bar interval in threshold-calibration units.
    pub dt: f64,
    /// Nominal wall-clock spacing between bars.
    pub bar_interval: Duration,
    pub gap_policy: GapPolicy,
}

impl DerivativeParams {
    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self {
            period: config.oi_ma_period,
            dt: config.dt,
            bar_interval: Duration::seconds(config.bar_interval_secs),
            gap_policy: config.gap_policy,
        }
    }
}

/// Bad input bar. The bar is skipped; only a [`DataGapError::MissingBars`]
/// rejection touches the history, restarting the window at the gap.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DataGapError {
    #[error("duplicate bar at {timestamp}")]
    DuplicateBar { timestamp: NaiveDateTime },
    #[error("bar at {timestamp} is earlier than the previous bar at {previous}")]
    NonMonotonic {
        previous: NaiveDateTime,
        timestamp: NaiveDateTime,
    },
    #[error("{missing} bar(s) missing between {previous} and {timestamp}")]
    MissingBars {
        previous: NaiveDateTime,
        timestamp: NaiveDateTime,
        missing: i64,
    },
    #[error("invalid open interest {value} at {timestamp}")]
    InvalidOpenInterest {
        timestamp: NaiveDateTime,
        value: f64,
    },
    #[error("void bar (NaN price) at {timestamp}")]
    VoidBar { timestamp: NaiveDateTime },
}

impl DataGapError {
    /// The bar itself is well formed and only arrived after missing bars,
    /// so its prices can still be trusted.
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::MissingBars { .. })
    }
}

/// Explicit engine state threaded between bars by the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OiHistory {
    /// Last `period` OI values, oldest first.
    window: VecDeque<f64>,
    /// Last three raw OI values, oldest first.
    recent: VecDeque<f64>,
    last_timestamp: Option<NaiveDateTime>,
    bars_seen: u64,
}

impl OiHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bars_seen(&self) -> u64 {
        self.bars_seen
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    fn push(&mut self, period: usize, oi: f64, timestamp: NaiveDateTime) {
        self.window.push_back(oi);
        while self.window.len() > period {
            self.window.pop_front();
        }
        self.recent.push_back(oi);
        while self.recent.len() > DERIVATIVE_SAMPLES {
            self.recent.pop_front();
        }
        self.last_timestamp = Some(timestamp);
        self.bars_seen += 1;
    }

    /// Empty window anchored at `timestamp`. Warm-up starts over from the
    /// next contiguous bar; nothing is interpolated across the gap.
    pub fn restarted_at(&self, timestamp: NaiveDateTime) -> Self {
        Self {
            window: VecDeque::new(),
            recent: VecDeque::new(),
            last_timestamp: Some(timestamp),
            bars_seen: self.bars_seen,
        }
    }

    fn derive(&self, params: &DerivativeParams, timestamp: NaiveDateTime) -> DerivativeState {
        let window_filled = params.period > 0 && self.window.len() == params.period;
        // Summed in insertion order every bar; no running sum to drift.
        let oi_moving_average = if window_filled {
            Some(self.window.iter().sum::<f64>() / params.period as f64)
        } else {
            None
        };

        let (first_derivative, second_derivative) = if self.recent.len() == DERIVATIVE_SAMPLES {
            let (oi_2, oi_1, oi_0) = (self.recent[0], self.recent[1], self.recent[2]);
            (
                Some((oi_0 - oi_1) / params.dt),
                Some((oi_0 - 2.0 * oi_1 + oi_2) / (params.dt * params.dt)),
            )
        } else {
            (None, None)
        };

        DerivativeState {
            timestamp,
            open_interest: self.recent.back().copied().unwrap_or(0.0),
            oi_moving_average,
            first_derivative,
            second_derivative,
            window_filled,
        }
    }
}

/// Per-bar derivative output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeState {
    pub timestamp: NaiveDateTime,
    pub open_interest: f64,
    /// Undefined until `period` bars have been observed.
    pub oi_moving_average: Option<f64>,
    /// Undefined until three OI samples exist.
    pub first_derivative: Option<f64>,
    /// Undefined until three OI samples exist.
    pub second_derivative: Option<f64>,
    pub window_filled: bool,
}

impl DerivativeState {
    /// Moving average and both derivatives, once all are defined.
    pub fn ready(&self) -> Option<(f64, f64, f64)> {
        if !self.window_filled {
            return None;
        }
        match (
            self.oi_moving_average,
            self.first_derivative,
            self.second_derivative,
        ) {
            (Some(ma), Some(d1), Some(d2)) => Some((ma, d1, d2)),
            _ => None,
        }
    }
}

fn check_bar(
    params: &DerivativeParams,
    history: &OiHistory,
    bar: &Bar,
) -> Result<(), DataGapError> {
    if !bar.open_interest.is_finite() || bar.open_interest < 0.0 {
        return Err(DataGapError::InvalidOpenInterest {
            timestamp: bar.timestamp,
            value: bar.open_interest,
        });
    }
    if bar.is_void() {
        return Err(DataGapError::VoidBar {
            timestamp: bar.timestamp,
        });
    }
    let Some(previous) = history.last_timestamp else {
        return Ok(());
    };
    if bar.timestamp == previous {
        return Err(DataGapError::DuplicateBar {
            timestamp: bar.timestamp,
        });
    }
    if bar.timestamp < previous {
        return Err(DataGapError::NonMonotonic {
            previous,
            timestamp: bar.timestamp,
        });
    }
    // Overnight gaps are the normal session boundary, never a data error.
    let same_session = bar.timestamp.date() == previous.date();
    let interval = params.bar_interval.num_seconds();
    if params.gap_policy == GapPolicy::Reject && same_session && interval > 0 {
        let elapsed = (bar.timestamp - previous).num_seconds();
        if elapsed > interval {
            return Err(DataGapError::MissingBars {
                previous,
                timestamp: bar.timestamp,
                missing: (elapsed - 1) / interval,
            });
        }
    }
    Ok(())
}

/// Advance the OI history by one bar.
///
/// Pure: the caller's history is not modified. On error the caller keeps its
/// old history, except after [`DataGapError::MissingBars`] where
/// [`OiHistory::restarted_at`] re-anchors it at the rejected bar.
pub fn advance(
    params: &DerivativeParams,
    history: &OiHistory,
    bar: &Bar,
) -> Result<(OiHistory, DerivativeState), DataGapError> {
    check_bar(params, history, bar)?;
    let mut next = history.clone();
    next.push(params.period, bar.open_interest, bar.timestamp);
    let state = next.derive(params, bar.timestamp);
    Ok((next, state))
}

/// Replay a bar slice from an empty history.
///
/// Skipped bars yield their error in place and do not advance the window.
pub fn compute_series(
    params: &DerivativeParams,
    bars: &[Bar],
) -> Vec<Result<DerivativeState, DataGapError>> {
    let mut engine = OiDerivativeEngine::new(params.clone());
    bars.iter().map(|bar| engine.update(bar)).collect()
}

/// Owns an [`OiHistory`] and commits it only when [`advance`] succeeds.
#[derive(Debug, Clone)]
pub struct OiDerivativeEngine {
    params: DerivativeParams,
    history: OiHistory,
}

impl OiDerivativeEngine {
    pub fn new(params: DerivativeParams) -> Self {
        Self {
            params,
            history: OiHistory::new(),
        }
    }

    pub fn from_history(params: DerivativeParams, history: OiHistory) -> Self {
        Self { params, history }
    }

    pub fn params(&self) -> &DerivativeParams {
        &self.params
    }

    pub fn history(&self) -> &OiHistory {
        &self.history
    }

    pub fn update(&mut self, bar: &Bar) -> Result<DerivativeState, DataGapError> {
        let (history, state) = match advance(&self.params, &self.history, bar) {
            Ok(next) => next,
            Err(error) => {
                if error.is_gap() {
                    debug!(timestamp = %bar.timestamp, "oi window restarted after gap");
                    self.history = self.history.restarted_at(bar.timestamp);
                }
                return Err(error);
            }
        };
        self.history = history;
        debug!(
            timestamp = %state.timestamp,
            oi = state.open_interest,
            oi_ma = ?state.oi_moving_average,
            doi = ?state.first_derivative,
            d2oi = ?state.second_derivative,
            "oi derivatives refreshed"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_oi_bars, DEFAULT_EPSILON};

    fn params(period: usize) -> DerivativeParams {
        DerivativeParams {
            period,
            dt: 3.0,
            bar_interval: Duration::minutes(3),
            gap_policy: GapPolicy::Tolerate,
        }
    }

    #[test]
    fn scenario_arithmetic_is_exact() {
        let bars = make_oi_bars(&[100_000.0, 99_000.0, 97_500.0, 95_500.0]);
        let series = compute_series(&params(4), &bars);
        let last = series[3].as_ref().unwrap();

        assert_approx(last.oi_moving_average.unwrap(), 98_000.0, DEFAULT_EPSILON);
        // (95500 - 97500) / 3
        assert_approx(last.first_derivative.unwrap(), -2_000.0 / 3.0, DEFAULT_EPSILON);
        // (95500 - 2*97500 + 99000) / 9
        assert_approx(last.second_derivative.unwrap(), -500.0 / 9.0, DEFAULT_EPSILON);
        assert!(last.window_filled);
    }

    #[test]
    fn derivatives_undefined_before_three_samples() {
        let bars = make_oi_bars(&[100.0, 90.0, 70.0]);
        let series = compute_series(&params(20), &bars);
        let s0 = series[0].as_ref().unwrap();
        let s1 = series[1].as_ref().unwrap();
        let s2 = series[2].as_ref().unwrap();
        assert!(s0.first_derivative.is_none() && s0.second_derivative.is_none());
        assert!(s1.first_derivative.is_none() && s1.second_derivative.is_none());
        assert_approx(s2.first_derivative.unwrap(), -20.0 / 3.0, DEFAULT_EPSILON);
        assert_approx(s2.second_derivative.unwrap(), -10.0 / 9.0, DEFAULT_EPSILON);
        assert!(s2.oi_moving_average.is_none());
        assert!(s2.ready().is_none());
    }

    #[test]
    fn moving_average_rolls() {
        let bars = make_oi_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let series = compute_series(&params(5), &bars);
        assert!(series[3].as_ref().unwrap().oi_moving_average.is_none());
        assert_approx(
            series[4].as_ref().unwrap().oi_moving_average.unwrap(),
            12.0,
            DEFAULT_EPSILON,
        );
        assert_approx(
            series[5].as_ref().unwrap().oi_moving_average.unwrap(),
            13.0,
            DEFAULT_EPSILON,
        );
    }

    #[test]
    fn dt_is_a_parameter() {
        let bars = make_oi_bars(&[100.0, 90.0, 70.0]);
        let mut p = params(20);
        p.dt = 1.0;
        let s = compute_series(&p, &bars).pop().unwrap().unwrap();
        assert_approx(s.first_derivative.unwrap(), -20.0, DEFAULT_EPSILON);
        assert_approx(s.second_derivative.unwrap(), -10.0, DEFAULT_EPSILON);
    }

    #[test]
    fn duplicate_bar_is_rejected_and_state_preserved() {
        let bars = make_oi_bars(&[100.0, 90.0]);
        let mut engine = OiDerivativeEngine::new(params(20));
        engine.update(&bars[0]).unwrap();
        engine.update(&bars[1]).unwrap();
        let before = engine.history().clone();

        let err = engine.update(&bars[1]).unwrap_err();
        assert!(matches!(err, DataGapError::DuplicateBar { .. }));
        assert_eq!(engine.history(), &before);
    }

    #[test]
    fn out_of_order_bar_is_rejected() {
        let bars = make_oi_bars(&[100.0, 90.0, 80.0]);
        let mut engine = OiDerivativeEngine::new(params(20));
        engine.update(&bars[0]).unwrap();
        engine.update(&bars[2]).unwrap();
        let err = engine.update(&bars[1]).unwrap_err();
        assert!(matches!(err, DataGapError::NonMonotonic { .. }));
        assert_eq!(engine.history().bars_seen(), 2);
    }

    #[test]
    fn invalid_open_interest_is_rejected() {
        let mut bars = make_oi_bars(&[100.0]);
        bars[0].open_interest = f64::NAN;
        let mut engine = OiDerivativeEngine::new(params(20));
        assert!(matches!(
            engine.update(&bars[0]),
            Err(DataGapError::InvalidOpenInterest { .. })
        ));
        assert_eq!(engine.history().bars_seen(), 0);
    }

    #[test]
    fn void_bar_is_rejected() {
        let mut bars = make_oi_bars(&[100.0]);
        bars[0].close = f64::NAN;
        let mut engine = OiDerivativeEngine::new(params(20));
        assert_eq!(
            engine.update(&bars[0]),
            Err(DataGapError::VoidBar {
                timestamp: bars[0].timestamp
            })
        );
    }

    #[test]
    fn gaps_tolerated_by_default_rejected_on_request() {
        let bars = make_oi_bars(&[100.0, 90.0, 80.0, 70.0]);
        let gapped = vec![bars[0].clone(), bars[3].clone()];

        let tolerant = compute_series(&params(20), &gapped);
        assert!(tolerant.iter().all(|r| r.is_ok()));

        let mut strict = params(20);
        strict.gap_policy = GapPolicy::Reject;
        let rejected = compute_series(&strict, &gapped);
        assert_eq!(
            rejected[1],
            Err(DataGapError::MissingBars {
                previous: bars[0].timestamp,
                timestamp: bars[3].timestamp,
                missing: 2,
            })
        );
    }

    #[test]
    fn one_gap_does_not_reject_the_rest_of_the_session() {
        let ois: Vec<f64> = (0..10).map(|i| 1_000.0 - 10.0 * i as f64).collect();
        let mut bars = make_oi_bars(&ois);
        bars.remove(3);
        let mut strict = params(3);
        strict.gap_policy = GapPolicy::Reject;

        let series = compute_series(&strict, &bars);
        assert!(series[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(
            series[3],
            Err(DataGapError::MissingBars { missing: 1, .. })
        ));
        assert!(series[4..].iter().all(|r| r.is_ok()));

        // Warm-up restarts after the gap; no sample spans it.
        let first_after = series[4].as_ref().unwrap();
        assert!(first_after.first_derivative.is_none());
        assert!(!first_after.window_filled);
        let third_after = series[6].as_ref().unwrap();
        assert_eq!(third_after.ready().map(|(_, d1, _)| d1), Some(-10.0 / 3.0));
    }

    #[test]
    fn gap_rejection_reanchors_history() {
        let bars = make_oi_bars(&[100.0, 90.0, 80.0, 70.0]);
        let mut strict = params(20);
        strict.gap_policy = GapPolicy::Reject;
        let mut engine = OiDerivativeEngine::new(strict);
        engine.update(&bars[0]).unwrap();
        assert!(engine.update(&bars[2]).unwrap_err().is_gap());
        assert_eq!(engine.history().last_timestamp(), Some(bars[2].timestamp));
        assert_eq!(engine.history().bars_seen(), 1);
        assert!(engine.update(&bars[3]).is_ok());
    }

    #[test]
    fn overnight_gap_is_not_missing_bars() {
        let mut bars = make_oi_bars(&[100.0, 90.0]);
        bars[1].timestamp = bars[0].timestamp + Duration::hours(18);
        let mut strict = params(20);
        strict.gap_policy = GapPolicy::Reject;
        assert!(compute_series(&strict, &bars).iter().all(|r| r.is_ok()));
    }

    #[test]
    fn advance_does_not_mutate_input_history() {
        let bars = make_oi_bars(&[100.0, 90.0]);
        let p = params(20);
        let (h1, _) = advance(&p, &OiHistory::new(), &bars[0]).unwrap();
        let snapshot = h1.clone();
        let (h2, _) = advance(&p, &h1, &bars[1]).unwrap();
        assert_eq!(h1, snapshot);
        assert_eq!(h2.bars_seen(), 2);
    }

    #[test]
    fn history_serialization_roundtrip() {
        let bars = make_oi_bars(&[100.0, 90.0, 80.0]);
        let mut engine = OiDerivativeEngine::new(params(20));
        for bar in &bars {
            engine.update(bar).unwrap();
        }
        let json = serde_json::to_string(engine.history()).unwrap();
        let restored: OiHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(&restored, engine.history());
    }
}
