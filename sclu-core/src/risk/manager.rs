//! Risk manager — entry gating, sizing, protective levels, post-close bookkeeping.
//!
//! Per bar the strategy loop consults it in a fixed order:
//! 1. protective check on an open position (before any signal exit)
//! 2. gate check on an entry intent
//! 3. sizing and protective levels for an admitted entry
//! 4. bookkeeping once a position has closed

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::config::{SessionWindow, ValidatedConfig};
use crate::domain::{ExitReason, Instrument, Position, TradeRecord};
use crate::signal::EntryIntent;

use super::sizing::CapitalFractionSizer;
use super::state::{HaltReason, RiskState};
use super::{GateReason, RiskRejection};

/// Limits and protective percentages, fixed for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    pub max_daily_trades: u32,
    pub max_daily_loss: f64,
    pub max_consecutive_losses: u32,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub session: Option<SessionWindow>,
}

impl RiskLimits {
    pub fn from_config(config: &ValidatedConfig) -> Self {
        Self {
            max_daily_trades: config.max_daily_trades,
            max_daily_loss: config.max_daily_loss,
            max_consecutive_losses: config.max_consecutive_losses,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            session: config.session,
        }
    }
}

/// An entry that passed the gate and was sized.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittedEntry {
    pub size: u64,
    pub stop_price: f64,
    pub target_price: f64,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    limits: RiskLimits,
    sizer: CapitalFractionSizer,
    state: RiskState,
}

impl RiskManager {
    pub fn new(limits: RiskLimits, sizer: CapitalFractionSizer) -> Self {
        Self::with_state(limits, sizer, RiskState::new())
    }

    pub fn with_state(limits: RiskLimits, sizer: CapitalFractionSizer, state: RiskState) -> Self {
        Self {
            limits,
            sizer,
            state,
        }
    }

    pub fn from_config(config: &ValidatedConfig, instrument: Instrument) -> Self {
        Self::new(
            RiskLimits::from_config(config),
            CapitalFractionSizer {
                portfolio_capital: config.portfolio_capital,
                position_size_pct: config.position_size_pct,
                instrument,
            },
        )
    }

    /// Replace the bookkeeping, e.g. when resuming from a snapshot.
    pub fn restore_state(&mut self, state: RiskState) {
        self.state = state;
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted_until_manual_reset
    }

    /// Start a new trading day if `date` differs from the current one.
    pub fn roll_day(&mut self, date: NaiveDate) -> bool {
        let rolled = self.state.roll_day(date);
        if rolled {
            info!(%date, "new trading day, daily risk counters reset");
        }
        rolled
    }

    /// Would an entry be admitted at `timestamp`, sizing aside?
    pub fn gate(&self, timestamp: NaiveDateTime) -> Result<(), RiskRejection> {
        if self.state.halted_until_manual_reset {
            return Err(match self.state.halt_reason {
                Some(HaltReason::Manual) => RiskRejection::Halted,
                _ => RiskRejection::CircuitBreakerTripped {
                    consecutive_losses: self.state.consecutive_losses,
                },
            });
        }
        if self.state.daily_trade_count >= self.limits.max_daily_trades {
            return Err(RiskRejection::GateRejected(GateReason::DailyTradeLimit {
                count: self.state.daily_trade_count,
                max: self.limits.max_daily_trades,
            }));
        }
        if self.state.daily_realized_pnl <= -self.limits.max_daily_loss {
            return Err(RiskRejection::GateRejected(GateReason::DailyLossLimit {
                pnl: self.state.daily_realized_pnl,
                max_loss: self.limits.max_daily_loss,
            }));
        }
        if let Some(session) = self.limits.session {
            if !session.contains(timestamp) {
                return Err(RiskRejection::GateRejected(GateReason::OutsideSession {
                    timestamp,
                }));
            }
        }
        Ok(())
    }

    /// Stop and target for a long option bought at `entry_price`.
    pub fn protective_levels(&self, entry_price: f64) -> (f64, f64) {
        (
            entry_price * (1.0 - self.limits.stop_loss_pct),
            entry_price * (1.0 + self.limits.take_profit_pct),
        )
    }

    /// Gate, size and attach protective levels to an entry intent.
    pub fn admit(
        &self,
        intent: &EntryIntent,
        entry_price: f64,
    ) -> Result<AdmittedEntry, RiskRejection> {
        self.gate(intent.timestamp)?;
        let size = self.sizer.size(entry_price)?;
        let (stop_price, target_price) = self.protective_levels(entry_price);
        Ok(AdmittedEntry {
            size,
            stop_price,
            target_price,
        })
    }

    /// Forced exit if `price` is at or through a protective level.
    ///
    /// Runs every bar with an open position, including while halted. The
    /// stop is checked first.
    pub fn check_protective(&self, position: &Position, price: f64) -> Option<ExitReason> {
        if price <= position.stop_price {
            Some(ExitReason::StopLoss)
        } else if price >= position.target_price {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }

    /// Book a closed trade. Returns true if it tripped the circuit breaker.
    pub fn record_close(&mut self, trade: &TradeRecord) -> bool {
        let tripped = self
            .state
            .record_close(trade.pnl, self.limits.max_consecutive_losses);
        if tripped {
            warn!(
                consecutive_losses = self.state.consecutive_losses,
                "circuit breaker tripped, entries halted until manual reset"
            );
        }
        tripped
    }

    /// External halt: no new entries; open positions stay monitored.
    pub fn halt(&mut self) {
        warn!("manual halt, entries suppressed");
        self.state.halt();
    }

    pub fn manual_reset(&mut self) {
        info!("manual reset, entries re-enabled");
        self.state.manual_reset();
    }
}
