//! TradeRecord — a completed round-trip trade.

use super::position::OptionSide;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    /// Close crossed the stop price.
    StopLoss,
    /// Close crossed the target price.
    TakeProfit,
    /// OI decline slowed past the loose first-derivative bound.
    FirstDerivativeSlowing,
    /// OI deceleration reversed past the entry magnitude bound.
    SecondDerivativeReversing,
    /// Data ran out with the position still open (backtest only).
    EndOfData,
}

impl ExitReason {
    /// True for exits forced by the protective levels rather than the signal.
    pub fn is_protective(&self) -> bool {
        matches!(self, Self::StopLoss | Self::TakeProfit)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::FirstDerivativeSlowing => "first_derivative_exit",
            Self::SecondDerivativeReversing => "second_derivative_exit",
            Self::EndOfData => "end_of_data",
        };
        write!(f, "{s}")
    }
}

/// A complete round-trip trade record: entry → exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: OptionSide,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub exit_timestamp: NaiveDateTime,
    /// Size-weighted average exit price across (partial) exit fills.
    pub exit_price: f64,
    pub size: u64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    /// Only strictly positive P&L counts as a win.
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.size == 0 {
            return 0.0;
        }
        self.pnl / (self.entry_price * self.size as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn zero_pnl_is_not_a_win() {
        let trade = TradeRecord {
            side: OptionSide::Put,
            entry_timestamp: ts(10, 0),
            entry_price: 80.0,
            exit_timestamp: ts(10, 30),
            exit_price: 80.0,
            size: 25,
            pnl: 0.0,
            exit_reason: ExitReason::FirstDerivativeSlowing,
        };
        assert!(!trade.is_win());
        assert_eq!(trade.return_pct(), 0.0);
    }

    #[test]
    fn return_pct_uses_entry_cost() {
        let trade = TradeRecord {
            side: OptionSide::Call,
            entry_timestamp: ts(10, 0),
            entry_price: 100.0,
            exit_timestamp: ts(10, 9),
            exit_price: 110.0,
            size: 50,
            pnl: 500.0,
            exit_reason: ExitReason::TakeProfit,
        };
        assert!(trade.is_win());
        assert!((trade.return_pct() - 0.10).abs() < 1e-12);
        assert!(trade.exit_reason.is_protective());
    }
}
