//! Risk bookkeeping that survives across trades within a session.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Why new entries are blocked until a manual reset.
///
/// A breaker trip outranks a manual halt: it replaces an active manual halt
/// and a later manual halt does not hide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Consecutive-loss limit reached.
    CircuitBreaker,
    /// External halt command.
    Manual,
}

/// Daily counters plus the circuit-breaker latch.
///
/// Owned by exactly one [`RiskManager`](super::RiskManager); each run gets its
/// own instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_trade_count: u32,
    pub daily_realized_pnl: f64,
    pub consecutive_losses: u32,
    pub halted_until_manual_reset: bool,
    pub halt_reason: Option<HaltReason>,
    /// Session date the daily counters belong to.
    pub trading_day: Option<NaiveDate>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the daily counters if `date` starts a new trading day.
    ///
    /// The halt latch and the consecutive-loss streak are not daily: they
    /// only clear on a manual reset. Returns true when a rollover happened.
    pub fn roll_day(&mut self, date: NaiveDate) -> bool {
        if self.trading_day == Some(date) {
            return false;
        }
        let rolled = self.trading_day.is_some();
        self.trading_day = Some(date);
        self.daily_trade_count = 0;
        self.daily_realized_pnl = 0.0;
        rolled
    }

    /// Apply a closed trade's P&L. Returns true if this trade completed a
    /// losing streak of `max_consecutive_losses`, whether or not a manual
    /// halt was already in force.
    pub fn record_close(&mut self, pnl: f64, max_consecutive_losses: u32) -> bool {
        self.daily_trade_count += 1;
        self.daily_realized_pnl += pnl;
        if pnl > 0.0 {
            self.consecutive_losses = 0;
            return false;
        }
        self.consecutive_losses += 1;
        let tripped = self.halt_reason == Some(HaltReason::CircuitBreaker);
        if self.consecutive_losses >= max_consecutive_losses && !tripped {
            self.halted_until_manual_reset = true;
            self.halt_reason = Some(HaltReason::CircuitBreaker);
            return true;
        }
        false
    }

    pub fn halt(&mut self) {
        self.halted_until_manual_reset = true;
        if self.halt_reason != Some(HaltReason::CircuitBreaker) {
            self.halt_reason = Some(HaltReason::Manual);
        }
    }

    /// Lift any halt and start a fresh loss streak, whichever halt was
    /// active. A streak short of the limit is cleared too.
    pub fn manual_reset(&mut self) {
        self.halted_until_manual_reset = false;
        self.halt_reason = None;
        self.consecutive_losses = 0;
    }
}
