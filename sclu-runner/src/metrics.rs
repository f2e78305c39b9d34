//! Run summary — pure functions over the trade list and event log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sclu_core::domain::{OptionSide, TradeRecord};
use sclu_core::engine::LoopEvent;
use sclu_core::risk::RiskRejection;

/// Aggregate statistics for one backtest or live session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub trade_count: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub net_pnl: f64,
    /// Sum of winning trades' P&L.
    pub gross_profit: f64,
    /// Sum of losing trades' P&L (zero or negative).
    pub gross_loss: f64,
    /// Largest peak-to-trough fall of cumulative realized P&L.
    pub max_drawdown: f64,
    /// Calls bought into short-covering rallies.
    pub short_covering_trades: usize,
    /// Puts bought into long-unwinding rallies.
    pub long_unwinding_trades: usize,
    pub exits_by_reason: BTreeMap<String, usize>,
    /// Exits forced by the stop or the target.
    pub protective_exits: usize,
    pub skipped_bars: usize,
    pub skipped_companion_bars: usize,
    pub rejections_by_kind: BTreeMap<String, usize>,
    pub circuit_breaker_trips: usize,
    /// Every loop event, by kind.
    pub event_counts: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn compute(trades: &[TradeRecord], events: &[LoopEvent]) -> Self {
        let wins = trades.iter().filter(|t| t.is_win()).count();
        let mut exits_by_reason = BTreeMap::new();
        for trade in trades {
            *exits_by_reason
                .entry(trade.exit_reason.to_string())
                .or_insert(0) += 1;
        }

        let mut skipped_bars = 0;
        let mut skipped_companion_bars = 0;
        let mut circuit_breaker_trips = 0;
        let mut rejections_by_kind = BTreeMap::new();
        let mut event_counts = BTreeMap::new();
        for event in events {
            *event_counts.entry(event.kind().to_string()).or_insert(0) += 1;
            match event {
                LoopEvent::BarSkipped { .. } => skipped_bars += 1,
                LoopEvent::CompanionBarSkipped { .. } => skipped_companion_bars += 1,
                LoopEvent::CircuitBreakerTripped { .. } => circuit_breaker_trips += 1,
                LoopEvent::EntryRejected { rejection, .. } => {
                    *rejections_by_kind
                        .entry(rejection_kind(rejection).to_string())
                        .or_insert(0) += 1;
                }
                LoopEvent::OrderRejected { .. } => {
                    *rejections_by_kind.entry("order".to_string()).or_insert(0) += 1;
                }
                _ => {}
            }
        }

        Self {
            trade_count: trades.len(),
            wins,
            win_rate: win_rate(trades),
            net_pnl: trades.iter().map(|t| t.pnl).sum(),
            gross_profit: trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum(),
            gross_loss: trades.iter().filter(|t| t.pnl <= 0.0).map(|t| t.pnl).sum(),
            max_drawdown: max_drawdown(&realized_equity(trades)),
            short_covering_trades: trades.iter().filter(|t| t.side == OptionSide::Call).count(),
            long_unwinding_trades: trades.iter().filter(|t| t.side == OptionSide::Put).count(),
            exits_by_reason,
            protective_exits: trades
                .iter()
                .filter(|t| t.exit_reason.is_protective())
                .count(),
            skipped_bars,
            skipped_companion_bars,
            rejections_by_kind,
            circuit_breaker_trips,
            event_counts,
        }
    }
}

pub fn rejection_kind(rejection: &RiskRejection) -> &'static str {
    match rejection {
        RiskRejection::GateRejected(_) => "gate",
        RiskRejection::CircuitBreakerTripped { .. } => "circuit_breaker",
        RiskRejection::Halted => "halted",
        RiskRejection::SizingError { .. } => "sizing",
    }
}

/// Fraction of trades with strictly positive P&L. 0.0 with no trades.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_win()).count() as f64 / trades.len() as f64
}

/// Cumulative realized P&L after each trade, starting from 0.
pub fn realized_equity(trades: &[TradeRecord]) -> Vec<f64> {
    let mut equity = Vec::with_capacity(trades.len() + 1);
    let mut total = 0.0;
    equity.push(total);
    for trade in trades {
        total += trade.pnl;
        equity.push(total);
    }
    equity
}

/// Largest peak-to-trough decline, in currency. Non-negative.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        worst = worst.max(peak - value);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use sclu_core::domain::ExitReason;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn trade(side: OptionSide, pnl: f64, reason: ExitReason) -> TradeRecord {
        TradeRecord {
            side,
            entry_timestamp: ts(),
            entry_price: 100.0,
            exit_timestamp: ts(),
            exit_price: 100.0 + pnl / 25.0,
            size: 25,
            pnl,
            exit_reason: reason,
        }
    }

    #[test]
    fn drawdown_of_realized_equity() {
        assert_eq!(max_drawdown(&[0.0, 100.0, 40.0, 120.0, 20.0, 50.0]), 100.0);
        assert_eq!(max_drawdown(&[0.0, 10.0, 20.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn summary_counts() {
        let trades = vec![
            trade(OptionSide::Call, 250.0, ExitReason::TakeProfit),
            trade(OptionSide::Put, -125.0, ExitReason::StopLoss),
            trade(OptionSide::Call, 0.0, ExitReason::FirstDerivativeSlowing),
            trade(OptionSide::Call, -50.0, ExitReason::StopLoss),
        ];
        let events = vec![
            LoopEvent::BarSkipped {
                timestamp: ts(),
                error: sclu_core::indicators::DataGapError::VoidBar { timestamp: ts() },
            },
            LoopEvent::CompanionBarSkipped {
                timestamp: ts(),
                error: sclu_core::indicators::DataGapError::DuplicateBar { timestamp: ts() },
            },
            LoopEvent::EntryRejected {
                timestamp: ts(),
                rejection: RiskRejection::Halted,
            },
            LoopEvent::EntryRejected {
                timestamp: ts(),
                rejection: RiskRejection::CircuitBreakerTripped {
                    consecutive_losses: 3,
                },
            },
        ];
        let summary = RunSummary::compute(&trades, &events);
        assert_eq!(summary.trade_count, 4);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.win_rate, 0.25);
        assert_eq!(summary.net_pnl, 75.0);
        assert_eq!(summary.gross_profit, 250.0);
        assert_eq!(summary.gross_loss, -175.0);
        assert_eq!(summary.max_drawdown, 175.0);
        assert_eq!(summary.short_covering_trades, 3);
        assert_eq!(summary.long_unwinding_trades, 1);
        assert_eq!(summary.exits_by_reason["stop_loss"], 2);
        assert_eq!(summary.protective_exits, 3);
        assert_eq!(summary.event_counts["entry_rejected"], 2);
        assert_eq!(summary.event_counts["bar_skipped"], 1);
        assert_eq!(summary.skipped_bars, 1);
        assert_eq!(summary.skipped_companion_bars, 1);
        assert_eq!(summary.rejections_by_kind["halted"], 1);
        assert_eq!(summary.rejections_by_kind["circuit_breaker"], 1);
    }

    #[test]
    fn empty_run() {
        let summary = RunSummary::compute(&[], &[]);
        assert_eq!(summary, RunSummary::default());
    }
}
