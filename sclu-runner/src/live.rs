//! Live session — the strategy loop on its own thread, fed over channels.
//!
//! Threads:
//! - **session**: owns the `StrategyLoop`. Receives [`SessionEvent`]s on one
//!   channel, so bars, order results and operator commands are applied one at
//!   a time in arrival order.
//! - **adapter**: owns the `ExecutionAdapter`. Receives order requests from
//!   the session and posts each terminal result back as
//!   [`SessionEvent::OrderUpdate`].
//!
//! Everything the session produces goes out as [`SessionReport`]s.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use sclu_core::domain::{OrderRequest, OrderResult, TradeRecord};
use sclu_core::engine::{
    BarInput, BarOutcome, ExecutionAdapter, LoopEvent, SnapshotError, StrategyLoop,
    StrategySnapshot,
};

use crate::config::ValidatedRunnerConfig;
use crate::metrics::RunSummary;

/// Inputs to the session thread.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Bar(BarInput),
    OrderUpdate(OrderResult),
    /// Stop new entries; open positions stay under protective monitoring.
    Halt,
    ManualReset,
    /// Ask for a [`SessionReport::Snapshot`].
    Snapshot,
    Shutdown,
}

/// Outputs of the session thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionReport {
    Bar(BarOutcome),
    OrderApplied(Vec<LoopEvent>),
    Halted,
    Reset,
    Snapshot(Box<StrategySnapshot>),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("session thread is no longer running")]
    Disconnected,
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}

/// Handle to a running live session.
///
/// Dropping the handle without [`LiveSession::shutdown`] still stops the
/// threads, but the summary is lost.
pub struct LiveSession {
    events: Sender<SessionEvent>,
    reports: Receiver<SessionReport>,
    threads: Option<(JoinHandle<RunSummary>, JoinHandle<()>)>,
}

impl LiveSession {
    /// Start a fresh session.
    pub fn start<A>(config: &ValidatedRunnerConfig, adapter: A) -> Result<Self, SessionError>
    where
        A: ExecutionAdapter + 'static,
    {
        let strategy = StrategyLoop::new(
            &config.strategy,
            config.instrument(),
            config.side_policy(),
        );
        Self::spawn(strategy, adapter)
    }

    /// Resume from a snapshot taken under the same configuration.
    pub fn resume<A>(
        config: &ValidatedRunnerConfig,
        snapshot: StrategySnapshot,
        adapter: A,
    ) -> Result<Self, SessionError>
    where
        A: ExecutionAdapter + 'static,
    {
        let strategy = StrategyLoop::from_snapshot(
            &config.strategy,
            config.instrument(),
            config.side_policy(),
            snapshot,
        )?;
        Self::spawn(strategy, adapter)
    }

    fn spawn<A>(strategy: StrategyLoop, mut adapter: A) -> Result<Self, SessionError>
    where
        A: ExecutionAdapter + 'static,
    {
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>();
        let (orders_tx, orders_rx) = mpsc::channel::<OrderRequest>();
        let (reports_tx, reports_rx) = mpsc::channel::<SessionReport>();

        let updates_tx = events_tx.clone();
        let adapter_handle = thread::Builder::new()
            .name("sclu-adapter".into())
            .spawn(move || {
                for request in orders_rx {
                    let result = adapter.submit_order(&request);
                    if updates_tx.send(SessionEvent::OrderUpdate(result)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| SessionError::Spawn {
                name: "adapter",
                source,
            })?;

        let session_handle = thread::Builder::new()
            .name("sclu-session".into())
            .spawn(move || session_loop(strategy, events_rx, orders_tx, reports_tx))
            .map_err(|source| SessionError::Spawn {
                name: "session",
                source,
            })?;

        info!("live session started");
        Ok(Self {
            events: events_tx,
            reports: reports_rx,
            threads: Some((session_handle, adapter_handle)),
        })
    }

    pub fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .map_err(|_| SessionError::Disconnected)
    }

    pub fn send_bar(&self, input: BarInput) -> Result<(), SessionError> {
        self.send(SessionEvent::Bar(input))
    }

    pub fn halt(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::Halt)
    }

    pub fn manual_reset(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::ManualReset)
    }

    pub fn request_snapshot(&self) -> Result<(), SessionError> {
        self.send(SessionEvent::Snapshot)
    }

    pub fn reports(&self) -> &Receiver<SessionReport> {
        &self.reports
    }

    /// Stop both threads and return the session's summary.
    ///
    /// Events already queued ahead of the shutdown are still processed.
    pub fn shutdown(mut self) -> Result<RunSummary, SessionError> {
        let (session, adapter) = self.threads.take().ok_or(SessionError::Disconnected)?;
        // A session that already exited is fine; join reports how it ended.
        let _ = self.events.send(SessionEvent::Shutdown);
        let summary = session
            .join()
            .map_err(|_| SessionError::Panicked("session"))?;
        adapter
            .join()
            .map_err(|_| SessionError::Panicked("adapter"))?;
        info!(trades = summary.trade_count, "live session stopped");
        Ok(summary)
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.threads.is_some() {
            let _ = self.events.send(SessionEvent::Shutdown);
        }
    }
}

fn session_loop(
    mut strategy: StrategyLoop,
    events: Receiver<SessionEvent>,
    orders: Sender<OrderRequest>,
    reports: Sender<SessionReport>,
) -> RunSummary {
    let mut log: Vec<LoopEvent> = Vec::new();
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut record = |events: &[LoopEvent]| {
        trades.extend(events.iter().filter_map(|e| match e {
            LoopEvent::TradeClosed(trade) => Some(trade.clone()),
            _ => None,
        }));
        log.extend_from_slice(events);
    };

    // Report delivery is best-effort: nobody listening does not stop trading.
    loop {
        let event = match events.recv() {
            Ok(SessionEvent::Shutdown) | Err(_) => break,
            Ok(event) => event,
        };
        match event {
            SessionEvent::Bar(input) => {
                let outcome = strategy.on_bar(&input);
                if let Some(request) = &outcome.order {
                    debug!(order = %request.id, "forwarding order to adapter");
                    if orders.send(request.clone()).is_err() {
                        warn!(order = %request.id, "adapter thread is gone; order not sent");
                    }
                }
                record(&outcome.events);
                let _ = reports.send(SessionReport::Bar(outcome));
            }
            SessionEvent::OrderUpdate(result) => {
                let applied = strategy.apply_order_result(&result);
                record(&applied);
                let _ = reports.send(SessionReport::OrderApplied(applied));
            }
            SessionEvent::Halt => {
                strategy.halt();
                let _ = reports.send(SessionReport::Halted);
            }
            SessionEvent::ManualReset => {
                strategy.manual_reset();
                let _ = reports.send(SessionReport::Reset);
            }
            SessionEvent::Snapshot => {
                let _ = reports.send(SessionReport::Snapshot(Box::new(strategy.snapshot())));
            }
            SessionEvent::Shutdown => break,
        }
    }

    RunSummary::compute(&trades, &log)
}
