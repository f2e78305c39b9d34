//! Risk management — gating, sizing, protective exits and the circuit breaker.

pub mod manager;
pub mod sizing;
pub mod state;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use manager::{AdmittedEntry, RiskLimits, RiskManager};
pub use sizing::CapitalFractionSizer;
pub use state::{HaltReason, RiskState};

/// Which daily or session limit blocked an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateReason {
    DailyTradeLimit { count: u32, max: u32 },
    DailyLossLimit { pnl: f64, max_loss: f64 },
    OutsideSession { timestamp: NaiveDateTime },
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyTradeLimit { count, max } => {
                write!(f, "daily trade limit reached ({count}/{max})")
            }
            Self::DailyLossLimit { pnl, max_loss } => {
                write!(f, "daily loss limit reached (pnl {pnl:.2}, limit {max_loss:.2})")
            }
            Self::OutsideSession { timestamp } => {
                write!(f, "{timestamp} is outside the trading session")
            }
        }
    }
}

/// Why an entry intent did not become an order.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RiskRejection {
    #[error("entry gated: {0}")]
    GateRejected(GateReason),

    #[error("circuit breaker tripped after {consecutive_losses} consecutive losses")]
    CircuitBreakerTripped { consecutive_losses: u32 },

    #[error("trading halted until manual reset")]
    Halted,

    #[error(
        "allocation {allocation:.2} at price {entry_price} buys less than one lot of {lot_size}"
    )]
    SizingError {
        entry_price: f64,
        allocation: f64,
        lot_size: u64,
    },
}
