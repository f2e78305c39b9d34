//! Strategy engine — the per-bar loop, its execution boundary and snapshots.
//!
//! The same loop runs backtests (bars replayed, orders filled synchronously
//! by a simulated adapter) and live sessions (bars and order results arriving
//! as separate events).

pub mod adapter;
pub mod events;
pub mod snapshot;
pub mod strategy_loop;

pub use adapter::ExecutionAdapter;
pub use events::{BarInput, BarOutcome, LoopEvent};
pub use snapshot::{SnapshotError, StrategySnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use strategy_loop::{LastBar, PendingOrder, StrategyLoop};
