//! # Single-Flight Gate
//!
//! Limits the process to one outstanding blocking round-trip. The host is not
//! safe for overlapping blocking calls, so every blocking caller serializes here.
//!
//! The gate is a compare-and-swap flag rather than a mutex: waiters spin with
//! cooperative yields and then back off with short sleeps, and callers that
//! must not wait use [`Gate::try_acquire`]. It is non-reentrant; a holder that
//! tries again will spin forever, which is why the dispatcher never touches it.
//!
//! Posts, correlated async sends and event delivery do not consult the gate.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::Fatal;
use crate::error::fatal;

#[derive(Debug)]
pub struct Gate {
    held: AtomicBool,
    spin_yields: u32,
    backoff: Duration,
}

impl Gate {
    pub fn new(spin_yields: u32, backoff: Duration) -> Self {
        Self {
            held: AtomicBool::new(false),
            spin_yields,
            backoff,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.spin_yields_before_sleep, config.backoff_sleep)
    }

    /// Takes the gate if it is free.
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Takes the gate, blocking the current thread until it is free.
    pub fn acquire(&self) -> GateGuard<'_> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            if attempts < self.spin_yields {
                attempts += 1;
                thread::yield_now();
            } else {
                thread::sleep(self.backoff);
            }
        }
    }

    /// Takes the gate from an async task without blocking its worker thread.
    pub async fn acquire_async(&self) -> GateGuard<'_> {
        let mut attempts: u32 = 0;
        loop {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            if attempts < self.spin_yields {
                attempts += 1;
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.backoff).await;
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    fn release(&self) {
        if self
            .held
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            fatal(Fatal::GateNotHeld);
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Releases the gate on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
