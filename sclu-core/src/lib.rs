//! SCLU Core — OI derivatives, signal state machine, risk manager, strategy loop.
//!
//! This crate contains everything that runs unchanged between backtests and
//! live sessions:
//! - Domain types (bars, positions, orders, trades, instruments)
//! - OI derivative engine (rolling mean, first and second derivative)
//! - Entry/exit state machine with pluggable side selection
//! - Risk manager: gating, sizing, protective levels, circuit breaker
//! - Strategy loop, execution boundary and snapshots
//! - Strike and expiry selection

pub mod config;
pub mod contracts;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod risk;
pub mod signal;

pub use config::{ConfigError, StrategyConfig, ValidatedConfig};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types that cross the live-session thread boundary
    /// are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::OrderRequest>();
        require_sync::<domain::OrderRequest>();
        require_send::<domain::OrderResult>();
        require_sync::<domain::OrderResult>();
        require_send::<domain::PositionState>();
        require_sync::<domain::PositionState>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();

        require_send::<config::ValidatedConfig>();
        require_sync::<config::ValidatedConfig>();

        require_send::<engine::BarInput>();
        require_sync::<engine::BarInput>();
        require_send::<engine::LoopEvent>();
        require_sync::<engine::LoopEvent>();
        require_send::<engine::StrategySnapshot>();
        require_sync::<engine::StrategySnapshot>();

        // The loop itself moves onto the session thread.
        require_send::<engine::StrategyLoop>();

        require_send::<signal::FixedSide>();
        require_sync::<signal::FixedSide>();
        require_send::<signal::ExternalHint>();
        require_sync::<signal::ExternalHint>();
        require_send::<signal::CompanionLeg>();
        require_sync::<signal::CompanionLeg>();
    }

    /// Architecture contract: side policies see derivatives and hints only.
    ///
    /// `SidePolicy::select` takes a `SideContext`, which has no position,
    /// capital or risk fields. If it compiles, policies cannot size or gate.
    #[test]
    fn side_policy_has_no_portfolio_parameter() {
        fn _check_trait_object_builds(
            policy: &dyn signal::SidePolicy,
            ctx: &signal::SideContext<'_>,
        ) -> signal::SideDecision {
            policy.select(ctx)
        }
    }
}
