//! Simulated execution adapter for backtests and tests.
//!
//! Every order fills at its reference price (the close of the bar that
//! produced it, rounded to the tick) unless a scripted outcome is queued.
//! Scripted outcomes are consumed one per submitted order, in submission
//! order. With an instrument attached, sizes that are not whole lots are
//! rejected the way an exchange would.

use std::collections::VecDeque;

use tracing::debug;

use sclu_core::domain::{
    Instrument, OrderRequest, OrderResult, OrderSide, OrderStatus, Position,
};
use sclu_core::engine::ExecutionAdapter;

/// Outcome to force on the next submitted order.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedFill {
    Fill,
    /// Fill at most `size` contracts; the rest is dead.
    Partial { size: u64 },
    Reject { reason: String },
}

#[derive(Debug, Default)]
pub struct SimulatedBroker {
    instrument: Option<Instrument>,
    script: VecDeque<ScriptedFill>,
    positions: Vec<Position>,
    submitted: Vec<OrderRequest>,
}

impl SimulatedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker that enforces `instrument`'s lot size and tick.
    pub fn for_instrument(instrument: Instrument) -> Self {
        Self {
            instrument: Some(instrument),
            ..Self::default()
        }
    }

    /// Broker that plays `script` before falling back to full fills.
    pub fn scripted(script: impl IntoIterator<Item = ScriptedFill>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn push_script(&mut self, fill: ScriptedFill) {
        self.script.push_back(fill);
    }

    /// Every request seen so far, in submission order.
    pub fn submitted(&self) -> &[OrderRequest] {
        &self.submitted
    }

    fn book(&mut self, request: &OrderRequest, price: f64, size: u64) {
        match request.side {
            OrderSide::Buy => self.positions.push(Position::open(
                request.leg,
                price,
                size,
                request.timestamp,
                0.0,
                0.0,
            )),
            OrderSide::Sell => {
                if let Some(held) = self.positions.iter_mut().find(|p| p.side == request.leg) {
                    held.apply_exit_fill(price, size);
                }
                self.positions.retain(|p| p.size > 0);
            }
        }
    }
}

impl ExecutionAdapter for SimulatedBroker {
    fn submit_order(&mut self, request: &OrderRequest) -> OrderResult {
        self.submitted.push(request.clone());
        let mut price = request.reference_price;
        let mut scripted = self.script.pop_front().unwrap_or(ScriptedFill::Fill);
        if let Some(instrument) = &self.instrument {
            price = instrument.round_price(price);
            if let Err(err) = instrument.validate_quantity(request.size) {
                scripted = ScriptedFill::Reject {
                    reason: err.to_string(),
                };
            }
        }
        let status = match scripted {
            ScriptedFill::Fill => OrderStatus::Filled {
                price,
                size: request.size,
            },
            ScriptedFill::Partial { size } if size < request.size => OrderStatus::Partial {
                price,
                size,
            },
            ScriptedFill::Partial { .. } => OrderStatus::Filled {
                price,
                size: request.size,
            },
            ScriptedFill::Reject { reason } => OrderStatus::Rejected { reason },
        };
        if let OrderStatus::Filled { price, size } | OrderStatus::Partial { price, size } = status {
            self.book(request, price, size);
        }
        debug!(order = %request.id, ?status, "simulated fill");
        OrderResult {
            order_id: request.id,
            status,
            timestamp: request.timestamp,
        }
    }

    fn open_positions(&self) -> Vec<Position> {
        self.positions.clone()
    }
}
