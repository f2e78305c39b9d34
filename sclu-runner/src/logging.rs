//! Tracing subscriber setup for binaries and long-running sessions.
//!
//! Library code only emits events; installing a subscriber is the caller's
//! choice. `RUST_LOG` wins over `default_level` when set.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber. Returns false if one was already set.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
