//! Strategy loop — feeds each closed bar through the pipeline, in order.
//!
//! Per bar:
//! 1. Refresh OI derivatives. A bad bar is skipped and nothing else runs,
//!    except that a bar arriving after missing bars still gets the
//!    protective check on an open position.
//! 2. Roll the risk day if the bar starts a new session date.
//! 3. Open position: protective check on the close, then the signal exit.
//! 4. Flat: signal entry, side policy, risk gate, sizing, then an order.
//!
//! Orders are fire-and-forget. The loop records the single outstanding order
//! and applies its result later through [`StrategyLoop::apply_order_result`];
//! bars that arrive in between are evaluated for derivatives only.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ValidatedConfig;
use crate::domain::{
    ExitReason, Instrument, OptionSide, OrderId, OrderRequest, OrderResult, OrderSide,
    OrderStatus, OrderType, Position, PositionState, TradeRecord,
};
use crate::indicators::{DerivativeParams, DerivativeState, OiDerivativeEngine};
use crate::risk::{RiskManager, RiskState};
use crate::signal::{ExitIntent, SidePolicy, SignalMachine, SignalState, Transition};

use super::adapter::ExecutionAdapter;
use super::events::{BarInput, BarOutcome, LoopEvent};
use super::snapshot::{SnapshotError, StrategySnapshot, SNAPSHOT_SCHEMA_VERSION};

/// The order the loop is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingOrder {
    Entry(OrderRequest),
    Exit {
        request: OrderRequest,
        reason: ExitReason,
    },
}

impl PendingOrder {
    pub fn request(&self) -> &OrderRequest {
        match self {
            Self::Entry(request) | Self::Exit { request, .. } => request,
        }
    }
}

/// Timestamp and close of the last accepted bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastBar {
    pub timestamp: NaiveDateTime,
    pub close: f64,
}

pub struct StrategyLoop {
    config_hash: String,
    instrument: Instrument,
    derivatives: OiDerivativeEngine,
    companion: OiDerivativeEngine,
    machine: SignalMachine,
    risk: RiskManager,
    side_policy: Arc<dyn SidePolicy>,
    position: PositionState,
    pending: Option<PendingOrder>,
    next_order_id: u64,
    last_bar: Option<LastBar>,
}

impl StrategyLoop {
    pub fn new(
        config: &ValidatedConfig,
        instrument: Instrument,
        side_policy: Arc<dyn SidePolicy>,
    ) -> Self {
        let params = DerivativeParams::from_config(config);
        Self {
            config_hash: config.config_hash(),
            risk: RiskManager::from_config(config, instrument.clone()),
            instrument,
            derivatives: OiDerivativeEngine::new(params.clone()),
            companion: OiDerivativeEngine::new(params),
            machine: SignalMachine::from_config(config),
            side_policy,
            position: PositionState::Flat,
            pending: None,
            next_order_id: 1,
            last_bar: None,
        }
    }

    /// Resume from a snapshot taken under the same configuration.
    pub fn from_snapshot(
        config: &ValidatedConfig,
        instrument: Instrument,
        side_policy: Arc<dyn SidePolicy>,
        snapshot: StrategySnapshot,
    ) -> Result<Self, SnapshotError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema {
                found: snapshot.schema_version,
                supported: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        let config_hash = config.config_hash();
        if snapshot.config_hash != config_hash {
            return Err(SnapshotError::ConfigMismatch {
                expected: config_hash,
                found: snapshot.config_hash,
            });
        }
        let params = DerivativeParams::from_config(config);
        let mut restored = Self::new(config, instrument, side_policy);
        restored.derivatives = OiDerivativeEngine::from_history(params.clone(), snapshot.history);
        restored.companion = OiDerivativeEngine::from_history(params, snapshot.companion_history);
        restored.risk.restore_state(snapshot.risk);
        restored.position = snapshot.position;
        restored.pending = snapshot.pending;
        restored.next_order_id = snapshot.next_order_id;
        restored.last_bar = snapshot.last_bar;
        info!(
            bars_seen = restored.derivatives.history().bars_seen(),
            flat = restored.position.is_flat(),
            "strategy restored from snapshot"
        );
        Ok(restored)
    }

    pub fn snapshot(&self) -> StrategySnapshot {
        StrategySnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config_hash: self.config_hash.clone(),
            history: self.derivatives.history().clone(),
            companion_history: self.companion.history().clone(),
            position: self.position.clone(),
            risk: self.risk.state().clone(),
            pending: self.pending.clone(),
            next_order_id: self.next_order_id,
            last_bar: self.last_bar,
        }
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn side_policy_name(&self) -> &str {
        self.side_policy.name()
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn risk_state(&self) -> &RiskState {
        self.risk.state()
    }

    pub fn pending_order(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.risk.is_halted()
    }

    pub fn last_bar(&self) -> Option<LastBar> {
        self.last_bar
    }

    /// Stop new entries. Open positions keep their protective monitoring.
    pub fn halt(&mut self) {
        self.risk.halt();
    }

    pub fn manual_reset(&mut self) {
        self.risk.manual_reset();
    }

    /// Evaluate one closed bar.
    pub fn on_bar(&mut self, input: &BarInput) -> BarOutcome {
        let bar = &input.bar;
        let derivatives = match self.derivatives.update(bar) {
            Ok(state) => state,
            Err(error) => {
                warn!(timestamp = %bar.timestamp, %error, "bar skipped");
                let gap = error.is_gap();
                let mut events = vec![LoopEvent::BarSkipped {
                    timestamp: bar.timestamp,
                    error,
                }];
                let order = if gap {
                    self.guard_after_gap(bar.timestamp, bar.close, &mut events)
                } else {
                    None
                };
                return BarOutcome {
                    derivatives: None,
                    events,
                    order,
                };
            }
        };
        let mut events = Vec::new();
        let companion = input
            .companion
            .as_ref()
            .and_then(|companion| match self.companion.update(companion) {
                Ok(state) => Some(state),
                Err(error) => {
                    warn!(timestamp = %companion.timestamp, %error, "companion bar skipped");
                    events.push(LoopEvent::CompanionBarSkipped {
                        timestamp: companion.timestamp,
                        error,
                    });
                    None
                }
            });

        let date = bar.session_date();
        if self.risk.roll_day(date) {
            events.push(LoopEvent::DayRolled { date });
        }
        self.last_bar = Some(LastBar {
            timestamp: bar.timestamp,
            close: bar.close,
        });

        if let Some(pending) = &self.pending {
            let order_id = pending.request().id;
            debug!(%order_id, "order outstanding, no decision this bar");
            events.push(LoopEvent::AwaitingOrder { order_id });
            return BarOutcome {
                derivatives: Some(derivatives),
                events,
                order: None,
            };
        }

        let order = match self.position.position().cloned() {
            Some(position) => self.evaluate_open(&position, &derivatives, bar.close, &mut events),
            None => self.evaluate_flat(
                &derivatives,
                companion.as_ref(),
                input.side_hint,
                bar.close,
                &mut events,
            ),
        };
        BarOutcome {
            derivatives: Some(derivatives),
            events,
            order,
        }
    }

    /// A bar that arrived after missing bars carries no derivatives but its
    /// prices are good: keep the stop and target armed on it.
    fn guard_after_gap(
        &mut self,
        timestamp: NaiveDateTime,
        close: f64,
        events: &mut Vec<LoopEvent>,
    ) -> Option<OrderRequest> {
        self.last_bar = Some(LastBar { timestamp, close });
        if self.pending.is_some() {
            return None;
        }
        let position = self.position.position().cloned()?;
        let reason = self.risk.check_protective(&position, close)?;
        Some(self.submit_exit(&position, reason, close, timestamp, events))
    }

    fn evaluate_open(
        &mut self,
        position: &Position,
        derivatives: &DerivativeState,
        close: f64,
        events: &mut Vec<LoopEvent>,
    ) -> Option<OrderRequest> {
        debug!(
            side = %position.side,
            close,
            unrealized = position.unrealized_pnl(close),
            "monitoring open position"
        );
        // Protective levels first; they do not depend on derivatives.
        let reason = match self.risk.check_protective(position, close) {
            Some(reason) => reason,
            None => match self.machine.evaluate(
                SignalState::Open(position.side),
                derivatives,
                self.side_policy.as_ref(),
                None,
                None,
            ) {
                Transition::Exit(intent) => intent.reason,
                _ => return None,
            },
        };
        Some(self.submit_exit(position, reason, close, derivatives.timestamp, events))
    }

    fn submit_exit(
        &mut self,
        position: &Position,
        reason: ExitReason,
        close: f64,
        timestamp: NaiveDateTime,
        events: &mut Vec<LoopEvent>,
    ) -> OrderRequest {
        let intent = ExitIntent {
            side: position.side,
            timestamp,
            reason,
        };
        info!(
            side = %intent.side,
            %reason,
            close,
            timestamp = %intent.timestamp,
            "exit signal"
        );
        events.push(LoopEvent::Exit(intent));
        let request = self.new_order(position.side, OrderSide::Sell, position.size, close, timestamp);
        self.pending = Some(PendingOrder::Exit {
            request: request.clone(),
            reason,
        });
        events.push(LoopEvent::OrderSubmitted(request.clone()));
        request
    }

    fn evaluate_flat(
        &mut self,
        derivatives: &DerivativeState,
        companion: Option<&DerivativeState>,
        hint: Option<OptionSide>,
        close: f64,
        events: &mut Vec<LoopEvent>,
    ) -> Option<OrderRequest> {
        let transition = self.machine.evaluate(
            SignalState::Flat,
            derivatives,
            self.side_policy.as_ref(),
            companion,
            hint,
        );
        match transition {
            Transition::Enter(intent) => {
                events.push(LoopEvent::Entry(intent.clone()));
                match self.risk.admit(&intent, close) {
                    Ok(admitted) => {
                        info!(
                            side = %intent.side,
                            size = admitted.size,
                            close,
                            d1 = intent.first_derivative,
                            d2 = intent.second_derivative,
                            bound = intent.entry_bound,
                            "entry signal admitted"
                        );
                        let request = self.new_order(
                            intent.side,
                            OrderSide::Buy,
                            admitted.size,
                            close,
                            intent.timestamp,
                        );
                        self.pending = Some(PendingOrder::Entry(request.clone()));
                        events.push(LoopEvent::OrderSubmitted(request.clone()));
                        Some(request)
                    }
                    Err(rejection) => {
                        warn!(timestamp = %intent.timestamp, %rejection, "entry rejected");
                        events.push(LoopEvent::EntryRejected {
                            timestamp: intent.timestamp,
                            rejection,
                        });
                        None
                    }
                }
            }
            Transition::AmbiguousSide { timestamp } => {
                debug!(%timestamp, policy = self.side_policy.name(), "ambiguous side, staying flat");
                events.push(LoopEvent::AmbiguousSide { timestamp });
                None
            }
            Transition::Stay | Transition::Exit(_) => None,
        }
    }

    fn new_order(
        &mut self,
        leg: OptionSide,
        side: OrderSide,
        size: u64,
        reference_price: f64,
        timestamp: NaiveDateTime,
    ) -> OrderRequest {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        OrderRequest {
            id,
            leg,
            side,
            order_type: OrderType::Market,
            size,
            reference_price,
            timestamp,
        }
    }

    /// Apply the terminal result of the outstanding order.
    pub fn apply_order_result(&mut self, result: &OrderResult) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        let pending = match self.pending.take() {
            Some(pending) if pending.request().id == result.order_id => pending,
            other => {
                self.pending = other;
                warn!(order_id = %result.order_id, "result for an order that is not outstanding");
                events.push(LoopEvent::UnmatchedOrderResult {
                    order_id: result.order_id,
                });
                return events;
            }
        };

        match &result.status {
            OrderStatus::Rejected { reason } => {
                warn!(order_id = %result.order_id, %reason, "order rejected");
                events.push(LoopEvent::OrderRejected {
                    order_id: result.order_id,
                    reason: reason.clone(),
                });
            }
            OrderStatus::Filled { price, size } | OrderStatus::Partial { price, size } => {
                events.push(LoopEvent::OrderFilled {
                    order_id: result.order_id,
                    price: *price,
                    size: *size,
                    partial: matches!(result.status, OrderStatus::Partial { .. }),
                });
                match pending {
                    PendingOrder::Entry(request) => {
                        self.open_position(&request, *price, *size, result.timestamp, &mut events)
                    }
                    PendingOrder::Exit { reason, .. } => {
                        self.close_fill(reason, *price, *size, result.timestamp, &mut events)
                    }
                }
            }
        }
        events
    }

    fn open_position(
        &mut self,
        request: &OrderRequest,
        price: f64,
        size: u64,
        timestamp: NaiveDateTime,
        events: &mut Vec<LoopEvent>,
    ) {
        if size == 0 || !self.position.is_flat() {
            warn!(order_id = %request.id, size, "entry fill ignored");
            return;
        }
        let (stop_price, target_price) = self.risk.protective_levels(price);
        let position = Position::open(request.leg, price, size, timestamp, stop_price, target_price);
        info!(
            side = %position.side,
            price,
            size,
            stop = stop_price,
            target = target_price,
            "position opened"
        );
        self.position = PositionState::Open(position.clone());
        events.push(LoopEvent::PositionOpened(position));
    }

    fn close_fill(
        &mut self,
        reason: ExitReason,
        price: f64,
        size: u64,
        timestamp: NaiveDateTime,
        events: &mut Vec<LoopEvent>,
    ) {
        let Some(position) = self.position.position_mut() else {
            warn!(price, size, "exit fill with no open position");
            return;
        };
        position.apply_exit_fill(price, size);
        if position.size > 0 {
            info!(remaining = position.size, "partial exit, remainder stays open");
            return;
        }
        let trade = TradeRecord {
            side: position.side,
            entry_timestamp: position.entry_timestamp,
            entry_price: position.entry_price,
            exit_timestamp: timestamp,
            exit_price: position.average_exit_price().unwrap_or(price),
            size: position.closed_size,
            pnl: position.realized_pnl,
            exit_reason: reason,
        };
        self.position = PositionState::Flat;
        info!(
            side = %trade.side,
            pnl = trade.pnl,
            %reason,
            "trade closed"
        );
        events.push(LoopEvent::TradeClosed(trade.clone()));
        if self.risk.record_close(&trade) {
            events.push(LoopEvent::CircuitBreakerTripped {
                timestamp,
                consecutive_losses: self.risk.state().consecutive_losses,
            });
        }
    }

    /// Exit whatever is open at the last accepted close.
    pub fn liquidate(&mut self, reason: ExitReason) -> BarOutcome {
        let mut outcome = BarOutcome::default();
        if self.pending.is_some() {
            return outcome;
        }
        let (Some(position), Some(last)) = (self.position.position().cloned(), self.last_bar)
        else {
            return outcome;
        };
        let intent = ExitIntent {
            side: position.side,
            timestamp: last.timestamp,
            reason,
        };
        info!(side = %intent.side, %reason, "liquidating open position");
        outcome.events.push(LoopEvent::Exit(intent));
        let request = self.new_order(
            position.side,
            OrderSide::Sell,
            position.size,
            last.close,
            last.timestamp,
        );
        self.pending = Some(PendingOrder::Exit {
            request: request.clone(),
            reason,
        });
        outcome
            .events
            .push(LoopEvent::OrderSubmitted(request.clone()));
        outcome.order = Some(request);
        outcome
    }

    /// Submit this outcome's order, if any, and apply the result in place.
    pub fn execute(&mut self, outcome: &mut BarOutcome, adapter: &mut dyn ExecutionAdapter) {
        if let Some(request) = &outcome.order {
            let result = adapter.submit_order(request);
            let events = self.apply_order_result(&result);
            outcome.events.extend(events);
        }
    }

    /// Synchronous bar step: evaluate, then execute against `adapter`.
    pub fn step(&mut self, input: &BarInput, adapter: &mut dyn ExecutionAdapter) -> BarOutcome {
        let mut outcome = self.on_bar(input);
        self.execute(&mut outcome, adapter);
        outcome
    }
}
