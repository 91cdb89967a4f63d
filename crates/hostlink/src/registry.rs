//! # Object Registry
//!
//! Maps host object ids to live proxy objects. An entry exists from the moment
//! the managed side learns the id (creation reply, or bridge start-up for the
//! application singleton) until the host's `Destroyed` notification.
//!
//! Ids are global across object types, so the registry is keyed by id alone.
//! Uses DashMap so façade tasks and the dispatcher can look up objects
//! concurrently without a registry-wide lock.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use crate::events::EventContext;
use crate::events::EventTable;
use crate::wire::ObjectType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An object with this id is already live.
    Duplicate { id: i64, existing: ObjectType },
    NotFound(i64),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate { id, existing } => {
                write!(f, "object already exists: {} ({})", id, existing)
            }
            Self::NotFound(id) => write!(f, "object not found: {}", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Managed-side proxy for a host entity, with its event registrations.
#[derive(Debug)]
pub struct HostObject {
    id: i64,
    object_type: ObjectType,
    events: EventTable,
}

impl HostObject {
    pub fn new(id: i64, object_type: ObjectType) -> Self {
        Self {
            id,
            object_type,
            events: EventTable::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn events(&self) -> &EventTable {
        &self.events
    }

    /// Delivers an event to this object's registrations.
    pub fn emit(self: &Arc<Self>, event_id: i64, payload: &Value) -> anyhow::Result<bool> {
        let ctx = EventContext {
            target: self,
            event_id,
            payload,
        };
        self.events.dispatch(&ctx)
    }
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: DashMap<i64, Arc<HostObject>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `object`, refusing to overwrite a live entry.
    pub fn try_add(&self, object: Arc<HostObject>) -> Result<Arc<HostObject>> {
        match self.objects.entry(object.id()) {
            Entry::Occupied(existing) => Err(Error::Duplicate {
                id: object.id(),
                existing: existing.get().object_type(),
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(id = object.id(), ty = %object.object_type(), "object added");
                slot.insert(object.clone());
                Ok(object)
            }
        }
    }

    /// Registers `object`.
    ///
    /// # Panics
    /// If the id is already live. Two live proxies for one host object means the
    /// host reused an id before destroying it, or the caller registered twice.
    pub fn add(&self, object: Arc<HostObject>) -> Arc<HostObject> {
        match self.try_add(object) {
            Ok(object) => object,
            Err(e) => {
                tracing::error!(error = %e, "duplicate object registration");
                panic!("{}", e)
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<Arc<HostObject>> {
        self.objects.get(&id).map(|entry| entry.value().clone())
    }

    /// Handles the host's `Destroyed` notification.
    ///
    /// Clones of the returned `Arc` held elsewhere keep working, but the id no
    /// longer resolves and further events for it are protocol violations.
    pub fn destroy(&self, id: i64) -> Result<Arc<HostObject>> {
        let (_, object) = self.objects.remove(&id).ok_or(Error::NotFound(id))?;
        tracing::debug!(id, ty = %object.object_type(), "object destroyed");
        Ok(object)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
