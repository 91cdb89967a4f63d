//! Bridge configuration.

use std::time::Duration;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_SPIN_YIELDS: u32 = 64;
const DEFAULT_BACKOFF_SLEEP: Duration = Duration::from_micros(50);
const DEFAULT_POOL_CAPACITY: usize = 16;

/// Tunables for a [`Bridge`](crate::Bridge).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// How long start-up waits for the host's ready signal before aborting.
    pub ready_timeout: Duration,
    /// Cooperative yields a gate waiter performs before it starts sleeping.
    pub spin_yields_before_sleep: u32,
    /// Sleep between gate attempts once the yield budget is spent.
    pub backoff_sleep: Duration,
    /// Maximum number of idle reply slots kept per pool.
    pub pool_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            spin_yields_before_sleep: DEFAULT_SPIN_YIELDS,
            backoff_sleep: DEFAULT_BACKOFF_SLEEP,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Defaults, overridden by `HOSTLINK_READY_TIMEOUT_MS` and `HOSTLINK_POOL_CAPACITY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// Unparseable or zero values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parse_positive(lookup("HOSTLINK_READY_TIMEOUT_MS")) {
            config.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = parse_positive(lookup("HOSTLINK_POOL_CAPACITY")) {
            config.pool_capacity = cap as usize;
        }

        config
    }
}

fn parse_positive(raw: Option<String>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|v| *v > 0)
}
