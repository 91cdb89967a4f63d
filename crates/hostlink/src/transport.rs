//! # Transport Abstraction
//!
//! The single, in-order request channel from the managed side to the host.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about commands or correlation.
//!   It moves opaque, already-serialized buffers.
//! - **Enqueue Only**: The host's own loop drains the queue. Replies and events
//!   come back through the dispatcher, never through the transport.
//! - **Never Blocks**: Enqueueing must succeed or fail immediately, because it is
//!   reachable from the host's thread during inline dispatch.

use tokio::sync::mpsc;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The host side of the queue is gone.
    Closed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "request channel closed"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to hand a serialized command to the host.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
///
/// # Invariants
/// - Payloads reach the host in the order `enqueue` calls complete.
/// - Must not interpret the payload.
pub trait Transport: Send + Sync + 'static {
    fn enqueue(&self, payload: Vec<u8>) -> Result<()>;
}

/// Sending half of the in-process request queue.
#[derive(Clone, Debug)]
pub struct QueueTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Receiving half of the in-process request queue, drained by the host loop.
#[derive(Debug)]
pub struct HostQueue {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Creates a connected request queue.
pub fn queue() -> (QueueTransport, HostQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueTransport { tx }, HostQueue { rx })
}

impl Transport for QueueTransport {
    fn enqueue(&self, payload: Vec<u8>) -> Result<()> {
        self.tx.send(payload).map_err(|_| Error::Closed)
    }
}

impl HostQueue {
    /// Blocks the current thread until a request is available.
    ///
    /// Returns `None` once every sender is gone. Must not be called from
    /// within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.blocking_recv()
    }

    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }
}
