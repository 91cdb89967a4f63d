//! # Event Table
//!
//! Per-object registrations: `event id -> callbacks`, newest observed first.
//!
//! ## Slot indices
//!
//! [`EventTable::add_registration`] returns the number of registrations that
//! already existed for the event. That number is the new callback's position
//! counted from the oldest registration, and it is the key the caller later
//! hands to [`EventTable::remove_registration`]. It is an offset, not a stable
//! key: removing an older registration shifts every newer one down by one.
//! Callers that register and remove from several tasks at once must serialize
//! those calls themselves, or a stale index will remove someone else's callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::registry::HostObject;

/// What a callback sees when its event fires.
pub struct EventContext<'a> {
    pub target: &'a Arc<HostObject>,
    pub event_id: i64,
    pub payload: &'a Value,
}

type NotifyFn = dyn Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync;
type PreventableFn = dyn Fn(&EventContext<'_>) -> anyhow::Result<bool> + Send + Sync;

/// A registered event handler.
///
/// `Notify` handlers only observe. `Preventable` handlers answer whether the
/// host should cancel the action that raised the event (e.g. a window close);
/// their answer is what an inline dispatch sends back.
#[derive(Clone)]
pub enum Callback {
    Notify(Arc<NotifyFn>),
    Preventable(Arc<PreventableFn>),
}

impl Callback {
    pub fn notify<F>(f: F) -> Self
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Notify(Arc::new(f))
    }

    pub fn preventable<F>(f: F) -> Self
    where
        F: Fn(&EventContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Preventable(Arc::new(f))
    }

    pub fn is_preventable(&self) -> bool {
        matches!(self, Self::Preventable(_))
    }

    /// Runs the handler; `Notify` handlers never prevent.
    pub fn invoke(&self, ctx: &EventContext<'_>) -> anyhow::Result<bool> {
        match self {
            Self::Notify(f) => f(ctx).map(|_| false),
            Self::Preventable(f) => f(ctx),
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notify(_) => f.write_str("Callback::Notify"),
            Self::Preventable(_) => f.write_str("Callback::Preventable"),
        }
    }
}

/// Outcome of [`EventTable::remove_registration`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Removal {
    /// One registration was removed; others remain.
    Removed,
    /// The last registration was removed and the event id entry deleted.
    /// The host-side event should be unregistered.
    NowEmpty,
    /// Nothing was registered at that event id and index.
    Missing,
}

#[derive(Debug, Default)]
pub struct EventTable {
    // oldest first; dispatch walks it backwards
    slots: Mutex<HashMap<i64, Vec<Callback>>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` ahead of every existing one and returns its slot index.
    pub fn add_registration(&self, event_id: i64, callback: Callback) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let list = slots.entry(event_id).or_default();
        let index = list.len();
        list.push(callback);
        index
    }

    pub fn remove_registration(&self, event_id: i64, index: usize) -> Removal {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = slots.get_mut(&event_id) else {
            return Removal::Missing;
        };
        if index >= list.len() {
            return Removal::Missing;
        }

        list.remove(index);
        if list.is_empty() {
            slots.remove(&event_id);
            Removal::NowEmpty
        } else {
            Removal::Removed
        }
    }

    /// Number of callbacks registered for `event_id`.
    pub fn registrations(&self, event_id: i64) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&event_id).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Invokes every callback for the event, newest first.
    ///
    /// Returns whether any callback asked to prevent the action. Every callback
    /// runs even if an earlier one fails; the first failure is returned.
    ///
    /// The list is snapshotted before the first call so callbacks may add or
    /// remove registrations (including their own) while running.
    pub fn dispatch(&self, ctx: &EventContext<'_>) -> anyhow::Result<bool> {
        let callbacks: Vec<Callback> = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            match slots.get(&ctx.event_id) {
                Some(list) => list.iter().rev().cloned().collect(),
                None => return Ok(false),
            }
        };

        let mut prevented = false;
        let mut first_error = None;
        for callback in &callbacks {
            match callback.invoke(ctx) {
                Ok(prevent) => prevented |= prevent,
                Err(e) => {
                    tracing::warn!(event_id = ctx.event_id, error = %e, "event callback failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(prevented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::ObjectType;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Callback {
        let log = log.clone();
        Callback::notify(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    fn fire(target: &Arc<HostObject>, event_id: i64) -> anyhow::Result<bool> {
        target.emit(event_id, &Value::Null)
    }

    #[test]
    fn newest_registration_runs_first() {
        let target = Arc::new(HostObject::new(1, ObjectType::Window));
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = target.events().add_registration(5, recorder(&log, "A"));
        let b = target.events().add_registration(5, recorder(&log, "B"));
        assert_eq!((a, b), (0, 1));

        fire(&target, 5).expect("dispatch");
        assert_eq!(*log.lock().unwrap(), vec!["B", "A"]);
    }

    #[test]
    fn removing_by_returned_index_removes_that_callback() {
        let target = Arc::new(HostObject::new(1, ObjectType::Window));
        let log = Arc::new(Mutex::new(Vec::new()));

        target.events().add_registration(5, recorder(&log, "A"));
        let b = target.events().add_registration(5, recorder(&log, "B"));

        assert_eq!(target.events().remove_registration(5, b), Removal::Removed);
        fire(&target, 5).expect("dispatch");
        assert_eq!(*log.lock().unwrap(), vec!["A"]);
    }

    #[test]
    fn removing_older_registration_shifts_newer_indices() {
        let table = EventTable::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let a = table.add_registration(5, recorder(&log, "A"));
        let b = table.add_registration(5, recorder(&log, "B"));
        assert_eq!(table.remove_registration(5, a), Removal::Removed);

        // B now sits at A's old index
        assert_eq!(table.remove_registration(5, b), Removal::Missing);
        assert_eq!(table.remove_registration(5, a), Removal::NowEmpty);
    }

    #[test]
    fn last_removal_reports_now_empty() {
        let table = EventTable::new();
        let index = table.add_registration(9, Callback::notify(|_| Ok(())));
        assert_eq!(table.remove_registration(9, index), Removal::NowEmpty);
        assert_eq!(table.registrations(9), 0);
        assert!(table.is_empty());
        assert_eq!(table.remove_registration(9, index), Removal::Missing);
    }

    #[test]
    fn prevent_is_or_of_all_callbacks() {
        let target = Arc::new(HostObject::new(2, ObjectType::Window));
        target.events().add_registration(3, Callback::preventable(|_| Ok(true)));
        target.events().add_registration(3, Callback::preventable(|_| Ok(false)));
        target.events().add_registration(3, Callback::notify(|_| Ok(())));

        assert!(fire(&target, 3).expect("dispatch"));
        assert!(!fire(&target, 4).expect("unregistered event"));
    }

    #[test]
    fn only_preventable_callbacks_can_prevent() {
        let target = Arc::new(HostObject::new(2, ObjectType::Window));
        let notify = Callback::notify(|_| Ok(()));
        let veto = Callback::preventable(|_| Ok(true));
        assert!(!notify.is_preventable());
        assert!(veto.is_preventable());

        target.events().add_registration(6, notify);
        assert!(!fire(&target, 6).expect("notify only"));

        target.events().add_registration(6, veto);
        assert!(fire(&target, 6).expect("with veto"));
    }

    #[test]
    fn every_callback_runs_and_first_error_wins() {
        let target = Arc::new(HostObject::new(2, ObjectType::Menu));
        let log = Arc::new(Mutex::new(Vec::new()));

        target.events().add_registration(1, recorder(&log, "oldest"));
        target.events().add_registration(1, Callback::notify(|_| anyhow::bail!("second")));
        target.events().add_registration(1, Callback::notify(|_| anyhow::bail!("first")));

        let err = fire(&target, 1).expect_err("should fail");
        assert_eq!(err.to_string(), "first");
        assert_eq!(*log.lock().unwrap(), vec!["oldest"]);
    }

    #[test]
    fn callback_may_remove_itself_while_dispatching() {
        let target = Arc::new(HostObject::new(3, ObjectType::App));
        target.events().add_registration(
            8,
            Callback::notify(|ctx| {
                let removal = ctx.target.events().remove_registration(ctx.event_id, 0);
                assert_eq!(removal, Removal::NowEmpty);
                Ok(())
            }),
        );

        fire(&target, 8).expect("dispatch");
        assert_eq!(target.events().registrations(8), 0);
    }

    #[test]
    fn callback_sees_payload_and_target() {
        let target = Arc::new(HostObject::new(42, ObjectType::Dialog));
        target.events().add_registration(
            1,
            Callback::preventable(|ctx| {
                assert_eq!(ctx.target.id(), 42);
                assert_eq!(ctx.event_id, 1);
                Ok(ctx.payload == &serde_json::json!([true]))
            }),
        );
        assert!(target.emit(1, &serde_json::json!([true])).expect("dispatch"));
    }
}
