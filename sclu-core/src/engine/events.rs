//! Per-bar inputs and everything the strategy loop reports back.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::{Bar, OptionSide, OrderId, OrderRequest, Position, TradeRecord};
use crate::indicators::{DataGapError, DerivativeState};
use crate::risk::RiskRejection;
use crate::signal::{EntryIntent, ExitIntent};

/// One closed bar of the traded leg plus the optional side inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarInput {
    pub bar: Bar,
    /// Same-timestamp bar of the opposite leg, for companion side selection.
    #[serde(default)]
    pub companion: Option<Bar>,
    /// Side suggested by an external rally detector.
    #[serde(default)]
    pub side_hint: Option<OptionSide>,
}

impl BarInput {
    pub fn with_companion(mut self, companion: Bar) -> Self {
        self.companion = Some(companion);
        self
    }

    pub fn with_hint(mut self, side: OptionSide) -> Self {
        self.side_hint = Some(side);
        self
    }
}

impl From<Bar> for BarInput {
    fn from(bar: Bar) -> Self {
        Self {
            bar,
            companion: None,
            side_hint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    /// Bad bar; no state changed.
    BarSkipped {
        timestamp: NaiveDateTime,
        error: DataGapError,
    },
    /// Bad companion-leg bar. The traded leg was still evaluated.
    CompanionBarSkipped {
        timestamp: NaiveDateTime,
        error: DataGapError,
    },
    DayRolled {
        date: NaiveDate,
    },
    Entry(EntryIntent),
    Exit(ExitIntent),
    /// Entry conditions held but no leg could be chosen.
    AmbiguousSide {
        timestamp: NaiveDateTime,
    },
    EntryRejected {
        timestamp: NaiveDateTime,
        rejection: RiskRejection,
    },
    OrderSubmitted(OrderRequest),
    OrderFilled {
        order_id: OrderId,
        price: f64,
        size: u64,
        partial: bool,
    },
    OrderRejected {
        order_id: OrderId,
        reason: String,
    },
    /// A bar arrived while an order result was still outstanding.
    AwaitingOrder {
        order_id: OrderId,
    },
    /// A result for an order the loop is not waiting on.
    UnmatchedOrderResult {
        order_id: OrderId,
    },
    PositionOpened(Position),
    TradeClosed(TradeRecord),
    CircuitBreakerTripped {
        timestamp: NaiveDateTime,
        consecutive_losses: u32,
    },
}

impl LoopEvent {
    /// Short stable name, used for counting in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BarSkipped { .. } => "bar_skipped",
            Self::CompanionBarSkipped { .. } => "companion_bar_skipped",
            Self::DayRolled { .. } => "day_rolled",
            Self::Entry(_) => "entry",
            Self::Exit(_) => "exit",
            Self::AmbiguousSide { .. } => "ambiguous_side",
            Self::EntryRejected { .. } => "entry_rejected",
            Self::OrderSubmitted(_) => "order_submitted",
            Self::OrderFilled { .. } => "order_filled",
            Self::OrderRejected { .. } => "order_rejected",
            Self::AwaitingOrder { .. } => "awaiting_order",
            Self::UnmatchedOrderResult { .. } => "unmatched_order_result",
            Self::PositionOpened(_) => "position_opened",
            Self::TradeClosed(_) => "trade_closed",
            Self::CircuitBreakerTripped { .. } => "circuit_breaker_tripped",
        }
    }
}

/// Everything one call to `on_bar` produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BarOutcome {
    /// `None` when the bar was skipped.
    pub derivatives: Option<DerivativeState>,
    pub events: Vec<LoopEvent>,
    /// At most one order per bar.
    pub order: Option<OrderRequest>,
}

impl BarOutcome {
    pub fn trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.events.iter().filter_map(|e| match e {
            LoopEvent::TradeClosed(trade) => Some(trade),
            _ => None,
        })
    }
}
