//! # Correlation Table
//!
//! Matches host replies to the requests that caused them.
//!
//! Every correlated send takes the next id from a process-wide monotonic counter
//! and parks a one-shot handler under it. The matching reply removes the entry
//! and runs the handler exactly once. Replies are matched by id, not by arrival
//! order, so any number of async sends may be outstanding alongside the single
//! blocking one.

use std::sync::Mutex;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

use crate::wire::Response;

/// Consumes the reply of one correlated request.
pub type ResponseHandler = Box<dyn FnOnce(Response) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No handler is pending under this id: never sent, or already resolved.
    Unmatched(i64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmatched(id) => write!(f, "no pending request for actionId {}", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

pub struct CorrelationTable {
    // handlers are Send but not Sync; the mutex makes the map shareable
    pending: DashMap<i64, Mutex<ResponseHandler>>,
    next_id: AtomicI64,
}

impl CorrelationTable {
    /// Creates an empty table whose first id is 1.
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Parks `handler` under a fresh correlation id and returns the id.
    ///
    /// The handler must be parked before the request is enqueued; the host may
    /// reply before `enqueue` returns.
    pub fn correlate(&self, handler: ResponseHandler) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(id, Mutex::new(handler));
        id
    }

    /// Removes the handler for `id` and runs it with `response`.
    ///
    /// The handler runs after the entry is gone, so it may correlate new
    /// requests without touching a locked shard.
    pub fn resolve(&self, id: i64, response: Response) -> Result<()> {
        let (_, handler) = self.pending.remove(&id).ok_or(Error::Unmatched(id))?;
        let handler = handler.into_inner().unwrap_or_else(|e| e.into_inner());
        handler(response);
        Ok(())
    }

    /// Drops the handler for a request that never reached the host.
    pub fn abandon(&self, id: i64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Number of requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ids_are_unique_under_concurrency() {
        let table = Arc::new(CorrelationTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|_| table.correlate(Box::new(|_| {})))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("worker panicked") {
                assert!(seen.insert(id), "duplicate correlation id {id}");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(table.pending(), 800);
    }

    #[test]
    fn resolve_runs_handler_once_out_of_order() {
        let table = CorrelationTable::new();
        let got = Arc::new(Mutex::new(Vec::new()));

        let ids: Vec<i64> = (0..3)
            .map(|n| {
                let got = got.clone();
                table.correlate(Box::new(move |r: Response| {
                    got.lock().unwrap().push((n, r.result));
                }))
            })
            .collect();

        table.resolve(ids[2], Response::reply(ids[2], json!("c"))).expect("resolve c");
        table.resolve(ids[0], Response::reply(ids[0], json!("a"))).expect("resolve a");
        assert_eq!(table.resolve(ids[0], Response::reply(ids[0], json!("a"))), Err(Error::Unmatched(ids[0])));
        table.resolve(ids[1], Response::reply(ids[1], json!("b"))).expect("resolve b");

        assert_eq!(
            *got.lock().unwrap(),
            vec![(2, json!("c")), (0, json!("a")), (1, json!("b"))]
        );
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn unknown_id_is_unmatched() {
        let table = CorrelationTable::new();
        assert_eq!(table.resolve(77, Response::reply(77, json!(null))), Err(Error::Unmatched(77)));
    }

    #[test]
    fn abandon_removes_pending_entry() {
        let table = CorrelationTable::new();
        let id = table.correlate(Box::new(|_| panic!("abandoned handler must not run")));
        assert!(table.abandon(id));
        assert!(!table.abandon(id));
        assert!(table.resolve(id, Response::reply(id, json!(null))).is_err());
    }
}
