//! Position state — at most one open option position at a time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which option leg is bought.
///
/// Calls are bought into short-covering rallies, puts into long-unwinding
/// rallies. The strategy only ever buys options; there is no short side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    /// The rally this leg is bought into.
    pub fn rally(&self) -> RallyKind {
        match self {
            Self::Call => RallyKind::ShortCovering,
            Self::Put => RallyKind::LongUnwinding,
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

/// Forced-exit rally type that the OI decline is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RallyKind {
    ShortCovering,
    LongUnwinding,
}

/// An open long option position with its protective levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: OptionSide,
    pub entry_price: f64,
    /// Contracts held (always a whole number of lots).
    pub size: u64,
    pub entry_timestamp: NaiveDateTime,
    pub stop_price: f64,
    pub target_price: f64,
    /// P&L already realized by partial exits of this position.
    #[serde(default)]
    pub realized_pnl: f64,
    /// Contracts already sold by earlier (partial) exit fills.
    #[serde(default)]
    pub closed_size: u64,
    /// Sum of `price × size` over those exit fills.
    #[serde(default)]
    pub exit_notional: f64,
}

impl Position {
    pub fn open(
        side: OptionSide,
        entry_price: f64,
        size: u64,
        entry_timestamp: NaiveDateTime,
        stop_price: f64,
        target_price: f64,
    ) -> Self {
        Self {
            side,
            entry_price,
            size,
            entry_timestamp,
            stop_price,
            target_price,
            realized_pnl: 0.0,
            closed_size: 0,
            exit_notional: 0.0,
        }
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.size as f64 * (current_price - self.entry_price)
    }

    /// Book an exit fill of up to `size` contracts. Returns the contracts
    /// actually closed; overfills are capped at the open size.
    pub fn apply_exit_fill(&mut self, price: f64, size: u64) -> u64 {
        let closed = size.min(self.size);
        self.size -= closed;
        self.closed_size += closed;
        self.exit_notional += price * closed as f64;
        self.realized_pnl += closed as f64 * (price - self.entry_price);
        closed
    }

    /// Size-weighted average price of the exit fills so far.
    pub fn average_exit_price(&self) -> Option<f64> {
        if self.closed_size == 0 {
            return None;
        }
        Some(self.exit_notional / self.closed_size as f64)
    }
}

/// Flat, or holding exactly one position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PositionState {
    #[default]
    Flat,
    Open(Position),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, Self::Flat)
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Self::Flat => None,
            Self::Open(pos) => Some(pos),
        }
    }

    pub fn position_mut(&mut self) -> Option<&mut Position> {
        match self {
            Self::Flat => None,
            Self::Open(pos) => Some(pos),
        }
    }

    pub fn side(&self) -> Option<OptionSide> {
        self.position().map(|p| p.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_position() -> Position {
        Position {
            side: OptionSide::Call,
            entry_price: 100.0,
            size: 50,
            entry_timestamp: NaiveDate::from_ymd_opt(2024, 7, 3)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            stop_price: 95.0,
            target_price: 110.0,
            realized_pnl: 0.0,
            closed_size: 0,
            exit_notional: 0.0,
        }
    }

    #[test]
    fn unrealized_pnl_scales_with_size() {
        let pos = sample_position();
        assert_eq!(pos.unrealized_pnl(104.0), 200.0);
        assert_eq!(pos.unrealized_pnl(98.0), -100.0);
    }

    #[test]
    fn partial_exits_accumulate() {
        let mut pos = sample_position();
        assert_eq!(pos.apply_exit_fill(104.0, 25), 25);
        assert_eq!(pos.size, 25);
        assert_eq!(pos.realized_pnl, 100.0);
        assert_eq!(pos.apply_exit_fill(108.0, 100), 25);
        assert_eq!(pos.size, 0);
        assert_eq!(pos.closed_size, 50);
        assert_eq!(pos.realized_pnl, 300.0);
        assert_eq!(pos.average_exit_price(), Some(106.0));
    }

    #[test]
    fn side_maps_to_rally() {
        assert_eq!(OptionSide::Call.rally(), RallyKind::ShortCovering);
        assert_eq!(OptionSide::Put.rally(), RallyKind::LongUnwinding);
    }

    #[test]
    fn default_state_is_flat() {
        let state = PositionState::default();
        assert!(state.is_flat());
        assert!(state.position().is_none());
    }

    #[test]
    fn state_serialization_roundtrip() {
        let state = PositionState::Open(sample_position());
        let json = serde_json::to_string(&state).unwrap();
        let deser: PositionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deser);
        assert_eq!(deser.side(), Some(OptionSide::Call));
    }
}
