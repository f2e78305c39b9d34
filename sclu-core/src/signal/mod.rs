//! Signal generation — OI-derivative entry/exit state machine and side policies.
//!
//! Signals are portfolio-agnostic: they see derivative states and the
//! projected machine state, never capital, risk counters or orders.

pub mod side;
pub mod state_machine;

pub use side::{CompanionLeg, ExternalHint, FixedSide, SideContext, SideDecision, SidePolicy};
pub use state_machine::{
    EntryIntent, ExitIntent, SignalMachine, SignalState, SignalThresholds, Transition,
};
