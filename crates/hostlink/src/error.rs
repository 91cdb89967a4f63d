//! # Error Definitions
//!
//! Two kinds of failure exist on the bridge:
//!
//! - [`Error`]: recoverable conditions returned to the immediate caller
//!   (gate contention, host-reported failures, cardinality mismatches).
//! - [`Fatal`]: a desynchronized wire protocol or a host that never came up.
//!   There is no safe way to keep operating on the shared object model after
//!   one of these, so [`fatal`] logs and aborts the current thread of control.

use std::time::Duration;

use crate::transport;
use crate::wire::Action;

#[derive(Debug)]
pub enum Error {
    /// The blocking gate is held, or a blocking call was attempted from an
    /// inline dispatch where the host cannot answer it.
    Contention,
    /// The host answered with a populated `error` field.
    Remote(String),
    /// A temporary-event allocation returned the wrong number of items.
    Cardinality { expected: usize, received: usize },
    /// A reply result did not have the shape the caller expected.
    Decode(String),
    /// A command could not be serialized.
    Encode(String),
    Transport(transport::Error),
    /// The host has not signalled readiness yet.
    NotReady,
    ObjectNotFound(i64),
    /// No tokio runtime was available to run detached event deliveries.
    NoRuntime,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contention => write!(f, "invalid context: a blocking call is already in flight"),
            Self::Remote(msg) => write!(f, "Host error: {}", msg),
            Self::Cardinality { expected, received } => {
                write!(f, "Response length error: expected {}, received {}", expected, received)
            }
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::Encode(msg) => write!(f, "Encode error: {}", msg),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::NotReady => write!(f, "host api is not ready yet"),
            Self::ObjectNotFound(id) => write!(f, "Object not found: {}", id),
            Self::NoRuntime => write!(f, "no tokio runtime available for event delivery"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Unrecoverable failures. Never returned, only raised through [`fatal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fatal {
    /// The host sent bytes that are not a valid response frame.
    MalformedResponse(String),
    /// A reply arrived without an `actionId`.
    MissingCorrelation,
    /// A reply named a correlation id that was never sent or already resolved.
    UnknownCorrelation(i64),
    /// An event targeted an object the registry does not know.
    UnknownObject(i64),
    /// An event arrived without an `eventId`.
    MissingEventId(i64),
    /// The host sent an action only the managed side may send.
    UnexpectedAction(Action),
    /// The gate was released while nobody held it.
    GateNotHeld,
    /// The host never signalled readiness.
    StartupTimeout(Duration),
}

impl std::fmt::Display for Fatal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            Self::MissingCorrelation => write!(f, "reply without actionId"),
            Self::UnknownCorrelation(id) => write!(f, "invalid response: no pending request {}", id),
            Self::UnknownObject(id) => write!(f, "object not found: {}", id),
            Self::MissingEventId(id) => write!(f, "event for object {} without eventId", id),
            Self::UnexpectedAction(action) => write!(f, "invalid action: {}", action),
            Self::GateNotHeld => write!(f, "invalid unlock timing"),
            Self::StartupTimeout(timeout) => {
                write!(f, "waited {:?} without ready signal", timeout)
            }
        }
    }
}

/// Logs a fatal condition and panics.
///
/// The host calls into the dispatcher across a native boundary, where an
/// unwinding panic terminates the process.
#[track_caller]
pub fn fatal(reason: Fatal) -> ! {
    tracing::error!(%reason, "fatal bridge failure");
    panic!("hostlink fatal: {}", reason)
}
