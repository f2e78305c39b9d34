//! Runner configuration — TOML file, environment overrides, validation.
//!
//! A config file has two tables:
//!
//! ```toml
//! [strategy]
//! sensitivity = 0.008
//! oi_ma_period = 30
//!
//! [run]
//! symbol = "NIFTY"
//! side_policy = { kind = "fixed", side = "Put" }
//! ```
//!
//! Missing keys take their documented defaults. `SCLU_*` environment
//! variables override the strategy table before validation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use sclu_core::domain::{Instrument, OptionSide};
use sclu_core::signal::{CompanionLeg, ExternalHint, FixedSide, SidePolicy};
use sclu_core::{StrategyConfig, ValidatedConfig};

/// Environment variables recognized by [`RunnerConfig::apply_env_overrides`].
pub const ENV_OVERRIDES: [&str; 6] = [
    "SCLU_SENSITIVITY",
    "SCLU_FEELING",
    "SCLU_MAX_DAILY_TRADES",
    "SCLU_STOP_LOSS_PCT",
    "SCLU_TAKE_PROFIT_PCT",
    "SCLU_OI_MA_PERIOD",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{var} = {value:?} is not a valid number")]
    InvalidOverride { var: &'static str, value: String },

    #[error("invalid strategy configuration: {0}")]
    Invalid(#[from] sclu_core::ConfigError),
}

/// Which side-selection rule a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SidePolicyConfig {
    /// Single-contract feed: always buy `side`.
    Fixed { side: OptionSide },
    /// Side comes from `BarInput::side_hint`.
    ExternalHint,
    /// Compare the traded leg's OI against the companion leg's.
    Companion { traded_leg: OptionSide },
}

impl Default for SidePolicyConfig {
    fn default() -> Self {
        Self::Fixed {
            side: OptionSide::Call,
        }
    }
}

impl SidePolicyConfig {
    pub fn build(&self) -> Arc<dyn SidePolicy> {
        match *self {
            Self::Fixed { side } => Arc::new(FixedSide(side)),
            Self::ExternalHint => Arc::new(ExternalHint),
            Self::Companion { traded_leg } => Arc::new(CompanionLeg { traded_leg }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub symbol: String,
    pub side_policy: SidePolicyConfig,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            side_policy: SidePolicyConfig::default(),
        }
    }
}

/// Everything a backtest or live session needs to start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub strategy: StrategyConfig,
    pub run: RunSection,
}

impl RunnerConfig {
    /// Parse a TOML document. Does not validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Apply `SCLU_*` overrides, looking each variable up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = &mut self.strategy;
        for var in ENV_OVERRIDES {
            let Some(raw) = lookup(var) else {
                continue;
            };
            let value = raw.trim();
            let invalid = || ConfigError::InvalidOverride {
                var,
                value: raw.clone(),
            };
            match var {
                "SCLU_SENSITIVITY" => s.sensitivity = value.parse().map_err(|_| invalid())?,
                "SCLU_FEELING" => s.feeling = value.parse().map_err(|_| invalid())?,
                "SCLU_MAX_DAILY_TRADES" => {
                    s.max_daily_trades = value.parse().map_err(|_| invalid())?
                }
                "SCLU_STOP_LOSS_PCT" => s.stop_loss_pct = value.parse().map_err(|_| invalid())?,
                "SCLU_TAKE_PROFIT_PCT" => {
                    s.take_profit_pct = value.parse().map_err(|_| invalid())?
                }
                "SCLU_OI_MA_PERIOD" => s.oi_ma_period = value.parse().map_err(|_| invalid())?,
                _ => continue,
            }
            info!(var, value, "config override from environment");
        }
        Ok(())
    }

    /// Validate the strategy table.
    pub fn validate(self) -> Result<ValidatedRunnerConfig, ConfigError> {
        let strategy = self.strategy.validate()?;
        Ok(ValidatedRunnerConfig {
            strategy,
            run: self.run,
        })
    }

    /// File, then process environment, then validation.
    pub fn load(path: &Path) -> Result<ValidatedRunnerConfig, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()
    }
}

/// A runner config whose strategy table passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRunnerConfig {
    pub strategy: ValidatedConfig,
    pub run: RunSection,
}

impl ValidatedRunnerConfig {
    pub fn instrument(&self) -> Instrument {
        self.strategy.instrument(&self.run.symbol)
    }

    pub fn side_policy(&self) -> Arc<dyn SidePolicy> {
        self.run.side_policy.build()
    }

    /// Deterministic run identity: strategy hash, symbol and side policy.
    pub fn run_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.strategy.config_hash().as_bytes());
        hasher.update(self.run.symbol.as_bytes());
        if let Ok(policy) = serde_json::to_string(&self.run.side_policy) {
            hasher.update(policy.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let config = RunnerConfig::from_toml("").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.run.symbol, "NIFTY");
    }

    #[test]
    fn parses_both_tables() {
        let config = RunnerConfig::from_toml(
            r#"
            [strategy]
            sensitivity = 0.01
            threshold_basis = "feeling"
            gap_policy = "reject"

            [strategy.session]
            open = "09:15:00"
            close = "15:30:00"

            [run]
            symbol = "BANKNIFTY"
            side_policy = { kind = "companion", traded_leg = "Put" }
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy.sensitivity, 0.01);
        assert_eq!(config.strategy.oi_ma_period, 30);
        assert_eq!(
            config.strategy.threshold_basis,
            sclu_core::config::ThresholdBasis::Feeling
        );
        assert!(config.strategy.session.is_some());
        assert_eq!(
            config.run.side_policy,
            SidePolicyConfig::Companion {
                traded_leg: OptionSide::Put
            }
        );
        let validated = config.validate().unwrap();
        assert_eq!(validated.side_policy().name(), "companion_leg");
        assert_eq!(validated.instrument().symbol, "BANKNIFTY");
    }

    #[test]
    fn env_overrides_apply_before_validation() {
        let mut config = RunnerConfig::default();
        config
            .apply_env_overrides(env(&[
                ("SCLU_SENSITIVITY", "0.015"),
                ("SCLU_OI_MA_PERIOD", " 45 "),
                ("SCLU_MAX_DAILY_TRADES", "12"),
            ]))
            .unwrap();
        assert_eq!(config.strategy.sensitivity, 0.015);
        assert_eq!(config.strategy.oi_ma_period, 45);
        assert_eq!(config.strategy.max_daily_trades, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_override_is_an_error() {
        let mut config = RunnerConfig::default();
        let err = config
            .apply_env_overrides(env(&[("SCLU_FEELING", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidOverride {
                var: "SCLU_FEELING",
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_override_fails_validation() {
        let mut config = RunnerConfig::default();
        config
            .apply_env_overrides(env(&[("SCLU_STOP_LOSS_PCT", "0.5")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn run_id_is_deterministic_and_tracks_params() {
        let a = RunnerConfig::default().validate().unwrap();
        let b = RunnerConfig::default().validate().unwrap();
        assert_eq!(a.run_id(), b.run_id());

        let mut other = RunnerConfig::default();
        other.run.side_policy = SidePolicyConfig::ExternalHint;
        assert_ne!(a.run_id(), other.validate().unwrap().run_id());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = RunnerConfig::default();
        config.run.side_policy = SidePolicyConfig::Fixed {
            side: OptionSide::Put,
        };
        config.strategy.sensitivity = 0.012;
        let text = config.to_toml().unwrap();
        assert_eq!(RunnerConfig::from_toml(&text).unwrap(), config);
    }
}
