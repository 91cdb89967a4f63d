//! Scripted native host for integration tests.
//!
//! The host runs on its own thread like a real UI loop: it drains commands one
//! at a time, hands each to a script, and answers through the dispatcher.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::runtime::Runtime;

use hostlink::Bridge;
use hostlink::BridgeConfig;
use hostlink::Command;
use hostlink::HostEndpoint;
use hostlink::ObjectType;
use hostlink::Response;
use hostlink::dispatch::Dispatcher;
use hostlink::wire::Action;

/// Method name that stops the host loop. Never handed to a script.
pub const SHUTDOWN: &str = "test-shutdown";

/// First id the standard host hands out for temporary events.
pub const FIRST_TEMP_EVENT_ID: i64 = 17;

pub type Script = Box<dyn FnMut(&HostEndpoint, &Command) + Send>;

#[derive(Copy, Clone, Debug)]
pub enum Readiness {
    Immediately,
    After(Duration),
    Never,
}

pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub dispatcher: Dispatcher,
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<Vec<Command>>>,
    host: Option<thread::JoinHandle<()>>,
    // dropped last; detached event deliveries run on it
    runtime: Option<Runtime>,
}

impl Harness {
    /// Starts a ready host running `script` on a runtime owned by the harness.
    pub fn start(script: Script) -> Self {
        Self::start_with(BridgeConfig::default(), Readiness::Immediately, script)
    }

    pub fn start_with(config: BridgeConfig, readiness: Readiness, script: Script) -> Self {
        let runtime = Runtime::new().expect("Failed to create runtime");
        let handle = runtime.handle().clone();
        let mut harness = Self::launch(config, readiness, handle, script);
        harness.runtime = Some(runtime);
        harness
    }

    /// Starts a ready host on the current tokio runtime.
    pub fn start_async(script: Script) -> Self {
        Self::launch(BridgeConfig::default(), Readiness::Immediately, Handle::current(), script)
    }

    fn launch(config: BridgeConfig, readiness: Readiness, handle: Handle, script: Script) -> Self {
        hostlink::logging::try_init_tracing();

        let (bridge, endpoint) = Bridge::builder()
            .config(config)
            .runtime(handle)
            .build()
            .expect("Failed to build bridge");

        if let Readiness::Immediately = readiness {
            endpoint.signal_ready();
        }

        let dispatcher = endpoint.dispatcher().clone();
        let log = Arc::new(Mutex::new(Vec::new()));
        let host_log = log.clone();
        let script = Arc::new(Mutex::new(script));
        let host_script = script.clone();
        let host = thread::spawn(move || host_loop(endpoint, readiness, host_log, host_script));

        Self {
            bridge,
            dispatcher,
            script,
            log,
            host: Some(host),
            runtime: None,
        }
    }

    /// Replaces the host's script from the next command on.
    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    /// Every command the host received so far, in arrival order.
    pub fn received(&self) -> Vec<Command> {
        self.log.lock().unwrap().clone()
    }

    /// Stops the host after it has drained everything sent before this call.
    pub fn shutdown(mut self) -> Vec<Command> {
        self.stop_host();
        self.received()
    }

    fn stop_host(&mut self) {
        let Some(host) = self.host.take() else {
            return;
        };
        let stop = Command::call(ObjectType::App, 0, SHUTDOWN, Value::Null);
        if self.bridge.post(stop).is_ok() {
            host.join().expect("host thread panicked");
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.stop_host();
        }
    }
}

fn host_loop(
    mut endpoint: HostEndpoint,
    readiness: Readiness,
    log: Arc<Mutex<Vec<Command>>>,
    script: Arc<Mutex<Script>>,
) {
    if let Readiness::After(delay) = readiness {
        thread::sleep(delay);
        endpoint.signal_ready();
    }

    while let Some(payload) = endpoint.next_request() {
        let command = Command::decode(&payload).expect("bridge sent an undecodable command");
        tracing::debug!(?command, "host received");
        if command.method.as_deref() == Some(SHUTDOWN) {
            break;
        }
        log.lock().unwrap().push(command.clone());
        let mut script = script.lock().unwrap();
        (*script)(&endpoint, &command);
    }
}

// --- Host-side replies ---

pub fn reply(endpoint: &HostEndpoint, command: &Command, result: Value) {
    reply_with(endpoint.dispatcher(), command, result);
}

/// Reply from any thread, e.g. when the host defers an answer.
pub fn reply_with(dispatcher: &Dispatcher, command: &Command, result: Value) {
    let id = command.action_id.expect("reply to an uncorrelated command");
    let payload = Response::reply(id, result).encode().expect("encode reply");
    assert_eq!(dispatcher.dispatch(0, &payload, false), None);
}

pub fn fail(endpoint: &HostEndpoint, command: &Command, message: &str) {
    let id = command.action_id.expect("reply to an uncorrelated command");
    let payload = Response::failure(id, message).encode().expect("encode failure");
    endpoint.dispatch(0, &payload, false);
}

/// Raises an event on `object_id`; returns the inline answer when `inline`.
pub fn fire(dispatcher: &Dispatcher, object_id: i64, event_id: i64, payload: Value, inline: bool) -> Option<String> {
    let frame = Response::event(object_id, event_id, payload)
        .encode()
        .expect("encode event");
    dispatcher.dispatch(object_id, &frame, inline)
}

// --- The standard host ---

/// A host that answers the common commands:
///
/// - `create`: a fresh object id, starting at 100.
/// - persistent `register-event`: a fresh event id, starting at 1000.
/// - temporary `register-event`: exactly `number` items, ids from 17.
/// - unregister: nothing, it is a post.
/// - `call` to `echo`: the args. To `fail`: a host error. Others: `null`.
pub fn standard_host() -> Script {
    let next_object = AtomicI64::new(100);
    let next_event = AtomicI64::new(1000);
    let next_temp = AtomicI64::new(FIRST_TEMP_EVENT_ID);

    Box::new(move |endpoint, command| {
        if command.action_id.is_none() {
            return;
        }
        match command.action {
            Action::Create => {
                let id = next_object.fetch_add(1, Ordering::SeqCst);
                reply(endpoint, command, json!(id));
            }
            Action::RegisterEvent => {
                let args = command.register_args().expect("register-event args");
                if args.temporary {
                    let items: Vec<Value> = (0..args.number)
                        .map(|_| {
                            let id = next_temp.fetch_add(1, Ordering::SeqCst);
                            json!({"eventId": id, "eventName": format!("temp-{id}")})
                        })
                        .collect();
                    reply(endpoint, command, Value::Array(items));
                } else {
                    let id = next_event.fetch_add(1, Ordering::SeqCst);
                    reply(endpoint, command, json!(id));
                }
            }
            Action::Call => match command.method.as_deref() {
                Some("echo") => reply(endpoint, command, command.args.clone()),
                Some("fail") => fail(endpoint, command, "host refused"),
                _ => reply(endpoint, command, Value::Null),
            },
            _ => reply(endpoint, command, Value::Null),
        }
    })
}

/// Unregister commands among `commands`, as the event ids they release.
pub fn unregistered(commands: &[Command]) -> Vec<i64> {
    commands
        .iter()
        .filter_map(Command::register_args)
        .filter(|args| args.delete)
        .map(|args| args.number)
        .collect()
}
