//! # Host Endpoint
//!
//! The host-facing half of a bridge. The native host's loop owns one of these:
//! it drains serialized commands with [`HostEndpoint::next_request`], delivers
//! replies and events with [`HostEndpoint::dispatch`], and signals start-up
//! once with [`HostEndpoint::signal_ready`].

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::ready::ReadySignal;
use crate::transport::HostQueue;

pub struct HostEndpoint {
    queue: Option<HostQueue>,
    dispatcher: Dispatcher,
    ready: Arc<ReadySignal>,
}

impl HostEndpoint {
    pub(crate) fn new(queue: Option<HostQueue>, dispatcher: Dispatcher, ready: Arc<ReadySignal>) -> Self {
        Self {
            queue,
            dispatcher,
            ready,
        }
    }

    /// Blocks the host thread until the next command is available.
    ///
    /// Returns `None` when the bridge is gone or a custom transport is in use.
    pub fn next_request(&mut self) -> Option<Vec<u8>> {
        self.queue.as_mut()?.blocking_recv()
    }

    /// Async variant of [`next_request`](Self::next_request) for hosts that
    /// drive their loop from a tokio task.
    pub async fn recv_request(&mut self) -> Option<Vec<u8>> {
        match self.queue.as_mut() {
            Some(queue) => queue.recv().await,
            None => None,
        }
    }

    /// Takes the next command if one is already queued, without blocking.
    pub fn try_next_request(&mut self) -> Option<Vec<u8>> {
        self.queue.as_mut()?.try_recv()
    }

    /// Delivers a serialized response. See [`Dispatcher::dispatch`].
    pub fn dispatch(&self, object_id: i64, payload: &[u8], needs_reply: bool) -> Option<String> {
        self.dispatcher.dispatch(object_id, payload, needs_reply)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Marks the host as ready. Only the first call has an effect.
    pub fn signal_ready(&self) {
        if self.ready.set() {
            tracing::info!("host signalled ready");
        } else {
            tracing::warn!("duplicate ready signal ignored");
        }
    }
}
