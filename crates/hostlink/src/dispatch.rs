//! # Dispatcher
//!
//! The single function the host calls back into. It runs on the host's own
//! thread, in the order the host produced its messages, and must return promptly.
//!
//! ## Routing
//!
//! - `reply`: resolve the correlation table by `actionId`. The handler runs on
//!   this call stack while the host waits, so it counts as inline too.
//! - `event` with an inline reply requested: run the callbacks on this very
//!   call stack and serialize their combined "prevent" answer as the return
//!   value. The host is blocked on that answer, so the gate is never touched
//!   here and blocking sends from inside these callbacks are refused.
//! - `event` without an inline reply: hand delivery to a detached blocking
//!   task and return immediately.
//! - Anything else, undecodable payloads, unknown correlation ids and unknown
//!   objects are protocol corruption and abort.

use std::cell::Cell;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;

use crate::correlation::CorrelationTable;
use crate::error::Fatal;
use crate::error::fatal;
use crate::registry::ObjectRegistry;
use crate::wire::Action;
use crate::wire::Response;

thread_local! {
    static INLINE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Whether the current thread is running a callback the host is blocked on:
/// an inline event or a reply handler.
///
/// The host is waiting on this thread's return value, so nothing it would have
/// to answer can be waited for from here.
pub fn in_inline_dispatch() -> bool {
    INLINE_DEPTH.with(|depth| depth.get() > 0)
}

struct InlineScope;

impl InlineScope {
    fn enter() -> Self {
        INLINE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for InlineScope {
    fn drop(&mut self) {
        INLINE_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ObjectRegistry>,
    correlations: Arc<CorrelationTable>,
    runtime: Handle,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ObjectRegistry>,
        correlations: Arc<CorrelationTable>,
        runtime: Handle,
    ) -> Self {
        Self {
            registry,
            correlations,
            runtime,
        }
    }

    /// Handles one message from the host.
    ///
    /// `object_id` names the event target. 0 means "use the frame's own `id`",
    /// which is also how events for the app object (id 0) arrive: both sides
    /// are 0 and the target stays 0. Returns the serialized inline answer when
    /// `needs_reply` is set, `None` otherwise.
    pub fn dispatch(&self, object_id: i64, payload: &[u8], needs_reply: bool) -> Option<String> {
        let response = match Response::decode(payload) {
            Ok(response) => response,
            Err(e) => fatal(Fatal::MalformedResponse(e.to_string())),
        };

        let answer = match response.action {
            Action::Reply => {
                self.resolve(response);
                Value::Null
            }
            Action::Event => {
                let target = if object_id != 0 {
                    object_id
                } else {
                    response.id.unwrap_or(object_id)
                };
                self.deliver(target, response, needs_reply)
            }
            other => fatal(Fatal::UnexpectedAction(other)),
        };

        needs_reply.then(|| answer.to_string())
    }

    fn resolve(&self, response: Response) {
        let Some(id) = response.action_id else {
            fatal(Fatal::MissingCorrelation);
        };
        tracing::trace!(action_id = id, error = ?response.error, "R: reply");

        let _scope = InlineScope::enter();
        if self.correlations.resolve(id, response).is_err() {
            fatal(Fatal::UnknownCorrelation(id));
        }
    }

    fn deliver(&self, object_id: i64, response: Response, inline: bool) -> Value {
        let Some(target) = self.registry.get(object_id) else {
            fatal(Fatal::UnknownObject(object_id));
        };
        let Some(event_id) = response.event_id else {
            fatal(Fatal::MissingEventId(object_id));
        };
        tracing::trace!(object_id, event_id, inline, "E: event");

        let payload = response.result;

        if inline {
            let _scope = InlineScope::enter();
            let prevented = match target.emit(event_id, &payload) {
                Ok(prevented) => prevented,
                Err(e) => {
                    tracing::warn!(object_id, event_id, error = %e, "inline event failed; answering false");
                    false
                }
            };
            return Value::Bool(prevented);
        }

        self.runtime.spawn_blocking(move || {
            if let Err(e) = target.emit(event_id, &payload) {
                tracing::warn!(object_id, event_id, error = %e, "event delivery failed");
            }
        });
        Value::Null
    }
}
