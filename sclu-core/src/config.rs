//! Strategy configuration — the enumerated option surface and its validation.
//!
//! `StrategyConfig` is a plain serde struct with documented defaults. It is
//! validated exactly once at startup into a [`ValidatedConfig`], which is the
//! only form the engine components accept. Out-of-range values are rejected,
//! never clamped.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use thiserror::Error;

use crate::domain::Instrument;

/// Magnitude that the percentage thresholds are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdBasis {
    /// `|oi_moving_average|` of the current window.
    #[default]
    MovingAverage,
    /// The fixed `feeling` constant (instrument OI scale).
    Feeling,
}

/// What to do when an intra-day bar arrives more than one interval late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Accept the bar; the derivative still divides by the nominal `dt`.
    #[default]
    Tolerate,
    /// Reject the bar as a data gap and keep the window where it was.
    Reject,
}

/// Intra-day window in which new entries are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl SessionWindow {
    /// NSE cash/derivatives session, 09:15 to 15:30 local time.
    pub fn nse() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let t = timestamp.time();
        t >= self.open && t < self.close
    }
}

/// All recognized strategy options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Entry threshold fraction of the basis (0.005–0.02). Also the magnitude
    /// of the second-derivative exit bound.
    pub sensitivity: f64,
    /// First-derivative exit threshold fraction of the basis.
    pub exit_loose_threshold: f64,
    /// Fixed OI scale used when `threshold_basis = feeling`.
    pub feeling: f64,
    pub threshold_basis: ThresholdBasis,
    /// Rolling OI moving-average window, in bars (20–50).
    pub oi_ma_period: usize,
    /// Bar interval in the time unit the thresholds were calibrated in
    /// (3.0 for 3-minute bars measured in minutes).
    pub dt: f64,
    /// Nominal wall-clock bar interval, used to detect missing bars.
    pub bar_interval_secs: i64,
    pub gap_policy: GapPolicy,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_daily_trades: u32,
    /// Absolute currency loss after which no new entries are taken that day.
    pub max_daily_loss: f64,
    pub max_consecutive_losses: u32,
    pub portfolio_capital: f64,
    /// Fraction of capital committed per entry.
    pub position_size_pct: f64,
    pub lot_size: u64,
    pub session: Option<SessionWindow>,
    pub min_dte: i64,
    pub max_dte: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.005,
            exit_loose_threshold: 0.001,
            feeling: 3_000_000.0,
            threshold_basis: ThresholdBasis::MovingAverage,
            oi_ma_period: 30,
            dt: 3.0,
            bar_interval_secs: 180,
            gap_policy: GapPolicy::Tolerate,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
            max_daily_trades: 30,
            max_daily_loss: 5_000.0,
            max_consecutive_losses: 3,
            portfolio_capital: 100_000.0,
            position_size_pct: 0.1,
            lot_size: 25,
            session: None,
            min_dte: 1,
            max_dte: 4,
        }
    }
}

/// Configuration validation failures. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} = {value} must be a positive finite number")]
    NotPositive { field: &'static str, value: f64 },
    #[error("session window must open before it closes ({open} >= {close})")]
    InvalidSession { open: NaiveTime, close: NaiveTime },
    #[error("DTE range is empty or negative (min_dte = {min}, max_dte = {max})")]
    InvalidDteRange { min: i64, max: i64 },
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(())
}

impl StrategyConfig {
    /// Validate every option, returning the first violation.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        check_range("sensitivity", self.sensitivity, 0.005, 0.02)?;
        check_range("exit_loose_threshold", self.exit_loose_threshold, 0.0005, 0.005)?;
        check_range("feeling", self.feeling, 1_000_000.0, 5_000_000.0)?;
        check_range("oi_ma_period", self.oi_ma_period as f64, 20.0, 50.0)?;
        check_positive("dt", self.dt)?;
        check_positive("bar_interval_secs", self.bar_interval_secs as f64)?;
        check_range("stop_loss_pct", self.stop_loss_pct, 0.02, 0.10)?;
        check_positive("take_profit_pct", self.take_profit_pct)?;
        check_range("max_daily_trades", self.max_daily_trades as f64, 10.0, 50.0)?;
        check_positive("max_daily_loss", self.max_daily_loss)?;
        check_positive("max_consecutive_losses", self.max_consecutive_losses as f64)?;
        check_positive("portfolio_capital", self.portfolio_capital)?;
        check_range("position_size_pct", self.position_size_pct, f64::MIN_POSITIVE, 1.0)?;
        check_positive("lot_size", self.lot_size as f64)?;
        if let Some(session) = self.session {
            if session.open >= session.close {
                return Err(ConfigError::InvalidSession {
                    open: session.open,
                    close: session.close,
                });
            }
        }
        if self.min_dte < 0 || self.min_dte > self.max_dte {
            return Err(ConfigError::InvalidDteRange {
                min: self.min_dte,
                max: self.max_dte,
            });
        }
        Ok(ValidatedConfig(self))
    }
}

/// A configuration that passed [`StrategyConfig::validate`].
///
/// Immutable for the lifetime of a session; components borrow it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedConfig(StrategyConfig);

impl ValidatedConfig {
    /// Instrument metadata implied by the configured lot size.
    pub fn instrument(&self, symbol: &str) -> Instrument {
        Instrument::new(symbol, 0.05, self.0.lot_size)
    }

    /// Deterministic identity of this configuration (BLAKE3 of canonical JSON).
    pub fn config_hash(&self) -> String {
        match serde_json::to_string(&self.0) {
            Ok(json) => blake3::hash(json.as_bytes()).to_hex().to_string(),
            Err(_) => String::new(),
        }
    }
}

impl Deref for ValidatedConfig {
    type Target = StrategyConfig;

    fn deref(&self) -> &StrategyConfig {
        &self.0
    }
}
