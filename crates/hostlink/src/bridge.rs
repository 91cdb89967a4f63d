//! # Message Bridge
//!
//! The composition root. Owns the object registry, the correlation table, the
//! single-flight gate and the reply pools, and exposes the send primitives the
//! façade layer builds on:
//!
//! - [`Bridge::post`]: fire-and-forget, no correlation id.
//! - [`Bridge::send_async`]: correlated, the handler runs when the reply lands.
//! - [`Bridge::send_blocking`] / [`Bridge::send`]: correlated and waited for,
//!   serialized through the gate so at most one is in flight process-wide.
//! - The temporary-event protocol: allocate `n` disposable host event ids in one
//!   round trip, wire each to a callback, release them on deletion.
//!
//! The host side of the same wiring is the [`HostEndpoint`] returned by
//! [`BridgeBuilder::build`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::BridgeConfig;
use crate::correlation::CorrelationTable;
use crate::dispatch;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::error::Fatal;
use crate::error::Result;
use crate::error::fatal;
use crate::events::Callback;
use crate::events::Removal;
use crate::gate::Gate;
use crate::host::HostEndpoint;
use crate::pool::SlotPool;
use crate::ready::ReadySignal;
use crate::registry::HostObject;
use crate::registry::ObjectRegistry;
use crate::transport;
use crate::transport::Transport;
use crate::wire::APP_OBJECT_ID;
use crate::wire::Command;
use crate::wire::ObjectType;
use crate::wire::Response;
use crate::wire::TempEventItem;

/// A callback wired to a host event, addressable for later deletion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub event_id: i64,
    pub index: usize,
}

pub struct Bridge {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<ObjectRegistry>,
    correlations: Arc<CorrelationTable>,
    gate: Gate,
    replies: SlotPool<Response>,
    allocations: SlotPool<Result<Vec<TempEventItem>>>,
    ready: Arc<ReadySignal>,
    app: Arc<HostObject>,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The application singleton, registered at construction.
    pub fn app(&self) -> &Arc<HostObject> {
        &self.app
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn object(&self, id: i64) -> Option<Arc<HostObject>> {
        self.registry.get(id)
    }

    /// Number of correlated requests still waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.correlations.pending()
    }

    // --- Readiness ---

    pub fn is_ready(&self) -> bool {
        self.ready.is_set()
    }

    /// Blocks until the host signals readiness.
    ///
    /// # Panics
    /// If no signal arrives within the configured `ready_timeout`. A host that
    /// never comes up cannot be recovered from.
    pub fn wait_ready(&self) {
        let timeout = self.config.ready_timeout;
        if !self.ready.wait(timeout) {
            fatal(Fatal::StartupTimeout(timeout));
        }
        tracing::debug!("host ready");
    }

    /// Waits up to `timeout` for the ready signal; `false` if it never came.
    pub fn wait_ready_for(&self, timeout: Duration) -> bool {
        self.ready.wait(timeout)
    }

    /// Runs `on_init` on a new thread once the host is ready.
    ///
    /// The thread aborts the start-up if the ready signal times out.
    pub fn spawn_when_ready<F>(self: &Arc<Self>, on_init: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(Arc<Bridge>) + Send + 'static,
    {
        let bridge = self.clone();
        thread::spawn(move || {
            bridge.wait_ready();
            on_init(bridge);
        })
    }

    // --- Send primitives ---

    /// Enqueues a command without correlation. Never waits.
    pub fn post(&self, command: Command) -> Result<()> {
        let payload = command.encode()?;
        tracing::trace!(
            action = %command.action,
            ty = %command.object_type,
            id = command.id,
            method = ?command.method,
            "S: post"
        );
        self.transport.enqueue(payload)?;
        Ok(())
    }

    /// Enqueues a correlated command; `handler` runs with the reply.
    ///
    /// Returns the correlation id. The handler runs on whatever thread the
    /// host delivers the reply on, so it must not block.
    pub fn send_async<F>(&self, mut command: Command, handler: F) -> Result<i64>
    where
        F: FnOnce(Response) + Send + 'static,
    {
        let action_id = self.correlations.correlate(Box::new(handler));
        command.action_id = Some(action_id);

        let sent = command.encode().and_then(|payload| {
            tracing::trace!(
                action_id,
                action = %command.action,
                ty = %command.object_type,
                id = command.id,
                method = ?command.method,
                "S: send"
            );
            self.transport.enqueue(payload).map_err(Error::from)
        });

        if let Err(e) = sent {
            self.correlations.abandon(action_id);
            return Err(e);
        }
        Ok(action_id)
    }

    /// Sends a correlated command and blocks the current thread for its result.
    ///
    /// Waits for the gate first, so concurrent callers reach the host one at a
    /// time. Fails with [`Error::Contention`] when called from a callback the
    /// host runs inline (an inline event or a reply handler): the host is
    /// blocked on that callback and could never reply.
    pub fn send_blocking(&self, command: Command) -> Result<Value> {
        refuse_inline()?;
        let _guard = self.gate.acquire();
        self.round_trip(command)
    }

    /// Like [`send_blocking`](Self::send_blocking), but fails with
    /// [`Error::Contention`] instead of waiting for the gate.
    pub fn try_send_blocking(&self, command: Command) -> Result<Value> {
        refuse_inline()?;
        let _guard = self.gate.try_acquire().ok_or(Error::Contention)?;
        self.round_trip(command)
    }

    /// Async variant of [`send_blocking`](Self::send_blocking), sharing its gate.
    pub async fn send(&self, command: Command) -> Result<Value> {
        refuse_inline()?;
        let _guard = self.gate.acquire_async().await;

        let (tx, rx) = oneshot::channel();
        self.send_async(command, move |response| {
            let _ = tx.send(response);
        })?;

        let response = rx.await.map_err(|_| Error::Transport(transport::Error::Closed))?;
        response.into_result()
    }

    fn round_trip(&self, command: Command) -> Result<Value> {
        let (slot, sender) = self.replies.take();
        self.send_async(command, move |response| sender.fill(response))?;

        let (response, empty) = slot
            .wait()
            .ok_or(Error::Transport(transport::Error::Closed))?;
        self.replies.restore(empty);
        response.into_result()
    }

    // --- Objects ---

    /// Asks the host to create an object and registers its proxy.
    pub fn create(&self, object_type: ObjectType, args: Value) -> Result<Arc<HostObject>> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        let result = self.send_blocking(Command::create(object_type, args))?;
        let id: i64 = serde_json::from_value(result)?;
        Ok(self.registry.add(Arc::new(HostObject::new(id, object_type))))
    }

    /// Calls a method on a host object and waits for its result.
    pub fn call(&self, target: &HostObject, method: &str, args: Value) -> Result<Value> {
        self.send_blocking(Command::call(target.object_type(), target.id(), method, args))
    }

    /// Calls a method on a host object; `handler` receives the result.
    pub fn call_async<F>(&self, target: &HostObject, method: &str, args: Value, handler: F) -> Result<i64>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let command = Command::call(target.object_type(), target.id(), method, args);
        self.send_async(command, move |response| handler(response.into_result()))
    }

    /// Handles the host's `Destroyed` notification for `id`.
    pub fn destroyed(&self, id: i64) -> Result<Arc<HostObject>> {
        self.registry.destroy(id).map_err(|_| Error::ObjectNotFound(id))
    }

    // --- Registrations ---

    /// Registers a callback for an already-known event id. See [`EventTable`](crate::events::EventTable)
    /// for the meaning of the returned slot index.
    pub fn add_registration(&self, target: &HostObject, event_id: i64, callback: Callback) -> usize {
        let index = target.events().add_registration(event_id, callback);
        tracing::debug!(object_id = target.id(), event_id, index, "registration added");
        index
    }

    /// Removes one registration; posts an unregister command when it was the last.
    pub fn delete_registration(&self, target: &HostObject, event_id: i64, index: usize) -> Result<Removal> {
        let removal = target.events().remove_registration(event_id, index);
        tracing::debug!(object_id = target.id(), event_id, index, ?removal, "registration deleted");

        if removal == Removal::NowEmpty {
            self.post(Command::unregister_event(target.object_type(), target.id(), event_id))?;
        }
        Ok(removal)
    }

    /// Asks the host for the id of a named event and wires `callback` to it.
    pub fn register_event(&self, target: &HostObject, event: &str, callback: Callback) -> Result<Registration> {
        let result = self.send_blocking(Command::register_event(target.object_type(), target.id(), event))?;
        let event_id: i64 = serde_json::from_value(result)?;
        let index = self.add_registration(target, event_id, callback);
        Ok(Registration { event_id, index })
    }

    // --- Temporary events ---

    /// Requests `count` temporary events; `handler` receives exactly `count`
    /// items or an error.
    pub fn allocate_temporary_events_async<F>(&self, target: &HostObject, count: usize, handler: F) -> Result<i64>
    where
        F: FnOnce(Result<Vec<TempEventItem>>) + Send + 'static,
    {
        let command = Command::temporary_events(target.object_type(), target.id(), count);
        self.send_async(command, move |response| handler(temporary_events_from(response, count)))
    }

    /// Blocking wrapper over [`allocate_temporary_events_async`](Self::allocate_temporary_events_async).
    ///
    /// Does not take the gate; it waits on a pooled reply slot instead.
    pub fn allocate_temporary_events(&self, target: &HostObject, count: usize) -> Result<Vec<TempEventItem>> {
        refuse_inline()?;
        let (slot, sender) = self.allocations.take();
        self.allocate_temporary_events_async(target, count, move |items| sender.fill(items))?;

        let (items, empty) = slot
            .wait()
            .ok_or(Error::Transport(transport::Error::Closed))?;
        self.allocations.restore(empty);
        items
    }

    /// Async variant of [`allocate_temporary_events`](Self::allocate_temporary_events).
    pub async fn temporary_events(&self, target: &HostObject, count: usize) -> Result<Vec<TempEventItem>> {
        let (tx, rx) = oneshot::channel();
        self.allocate_temporary_events_async(target, count, move |items| {
            let _ = tx.send(items);
        })?;
        rx.await.map_err(|_| Error::Transport(transport::Error::Closed))?
    }
}

fn refuse_inline() -> Result<()> {
    if dispatch::in_inline_dispatch() {
        tracing::warn!("blocking send refused inside an inline host callback");
        return Err(Error::Contention);
    }
    Ok(())
}

fn temporary_events_from(response: Response, expected: usize) -> Result<Vec<TempEventItem>> {
    let result = response.into_result()?;
    let items: Vec<TempEventItem> = if result.is_null() {
        Vec::new()
    } else {
        serde_json::from_value(result)?
    };

    if items.len() != expected {
        return Err(Error::Cardinality {
            expected,
            received: items.len(),
        });
    }
    Ok(items)
}

/// Fluent builder for a [`Bridge`] and its [`HostEndpoint`].
pub struct BridgeBuilder {
    config: BridgeConfig,
    runtime: Option<Handle>,
    transport: Option<Arc<dyn Transport>>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            runtime: None,
            transport: None,
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.config.ready_timeout = timeout;
        self
    }

    /// Runtime used for detached event delivery. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replaces the in-process request queue. The returned endpoint then has
    /// no queue to drain; the custom transport delivers requests instead.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<(Arc<Bridge>, HostEndpoint)> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };

        let (transport, queue) = match self.transport {
            Some(transport) => (transport, None),
            None => {
                let (transport, queue) = transport::queue();
                (Arc::new(transport) as Arc<dyn Transport>, Some(queue))
            }
        };

        let registry = Arc::new(ObjectRegistry::new());
        let app = registry.add(Arc::new(HostObject::new(APP_OBJECT_ID, ObjectType::App)));
        let correlations = Arc::new(CorrelationTable::new());
        let ready = Arc::new(ReadySignal::new());

        let dispatcher = Dispatcher::new(registry.clone(), correlations.clone(), runtime);
        let endpoint = HostEndpoint::new(queue, dispatcher, ready.clone());

        let bridge = Bridge {
            gate: Gate::from_config(&self.config),
            replies: SlotPool::new(self.config.pool_capacity),
            allocations: SlotPool::new(self.config.pool_capacity),
            config: self.config,
            transport,
            registry,
            correlations,
            ready,
            app,
        };

        Ok((Arc::new(bridge), endpoint))
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
