//! Tracing setup for embedders that do not install their own subscriber.
//!
//! The filter is read from `HOSTLINK_LOG` (`EnvFilter` syntax) and defaults to `info`.
//! Frame-level traffic is logged at `trace` under the `hostlink` target.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HOSTLINK_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global fmt subscriber. Panics if one is already installed.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(true)
        .init();
}

/// Test variant: output goes through libtest's capture, and an existing
/// subscriber is left in place (returns `false`).
pub fn try_init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(true)
        .with_test_writer()
        .try_init()
        .is_ok()
}
