//! One-time readiness latch set by the host's init callback.

use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct ReadySignal {
    ready: Mutex<bool>,
    changed: Condvar,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Latches the signal. Returns `false` if it was already set.
    pub(crate) fn set(&self) -> bool {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        let first = !*ready;
        *ready = true;
        self.changed.notify_all();
        first
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits up to `timeout` for the signal; `true` if it arrived.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        let (ready, _) = self
            .changed
            .wait_timeout_while(ready, timeout, |ready| !*ready)
            .unwrap_or_else(|e| e.into_inner());
        *ready
    }
}
