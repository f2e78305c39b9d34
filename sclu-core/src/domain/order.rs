//! Order requests emitted by the strategy loop and the results that come back.

use super::position::OptionSide;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, allocated sequentially by the strategy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
}

/// An order the core wants placed. Fire-and-forget: the result arrives later
/// as an [`OrderResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub id: OrderId,
    /// Option leg being bought (entry) or sold (exit).
    pub leg: OptionSide,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: u64,
    /// Close of the bar that produced the order; used by simulated fills.
    pub reference_price: f64,
    pub timestamp: NaiveDateTime,
}

impl OrderRequest {
    pub fn is_entry(&self) -> bool {
        self.side == OrderSide::Buy
    }
}

/// Terminal state of a submitted order, as observed by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled { price: f64, size: u64 },
    /// Part of the order filled; the remainder is dead.
    Partial { price: f64, size: u64 },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub timestamp: NaiveDateTime,
}

impl OrderResult {
    pub fn filled(order_id: OrderId, price: f64, size: u64, timestamp: NaiveDateTime) -> Self {
        Self {
            order_id,
            status: OrderStatus::Filled { price, size },
            timestamp,
        }
    }

    pub fn rejected(order_id: OrderId, reason: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            order_id,
            status: OrderStatus::Rejected {
                reason: reason.into(),
            },
            timestamp,
        }
    }

    /// Filled price and size, if anything filled.
    pub fn fill(&self) -> Option<(f64, u64)> {
        match self.status {
            OrderStatus::Filled { price, size } | OrderStatus::Partial { price, size } => {
                Some((price, size))
            }
            OrderStatus::Rejected { .. } => None,
        }
    }
}
