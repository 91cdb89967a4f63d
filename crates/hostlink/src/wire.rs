//! # Wire Schema
//!
//! The JSON frames exchanged with the host. Field names are stable across both
//! directions: commands flow managed -> host, responses flow host -> managed.
//!
//! ## Philosophy
//!
//! - **Dumb Frames**: Nothing here knows about correlation tables or gates. A
//!   `Command` is data; the bridge decides whether it carries an `actionId`.
//! - **One Registration Action**: `register-event` covers persistent registration,
//!   temporary batch allocation and deregistration, distinguished by its args.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::Error;
use crate::error::Result;

/// Fixed id of the application singleton, registered at bridge construction.
pub const APP_OBJECT_ID: i64 = 0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    Delete,
    Call,
    #[default]
    Reply,
    Event,
    RegisterEvent,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Call => "call",
            Self::Reply => "reply",
            Self::Event => "event",
            Self::RegisterEvent => "register-event",
        };
        f.write_str(name)
    }
}

/// Namespace tag of a host-side entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    App,
    Window,
    Session,
    WebContents,
    Menu,
    Dialog,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::App => "app",
            Self::Window => "window",
            Self::Session => "session",
            Self::WebContents => "web-contents",
            Self::Menu => "menu",
            Self::Dialog => "dialog",
        };
        f.write_str(name)
    }
}

/// Arguments of a `register-event` command.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEventArgs {
    pub delete: bool,
    pub temporary: bool,
    /// Batch size for temporary allocation, or the event id being deleted.
    pub number: i64,
}

/// A request from the managed side to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    /// Present only on correlated sends.
    #[serde(rename = "actionId", default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<i64>,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Value,
}

impl Command {
    pub fn create(object_type: ObjectType, args: Value) -> Self {
        Self {
            action: Action::Create,
            action_id: None,
            object_type,
            id: 0,
            method: None,
            args,
        }
    }

    pub fn call(object_type: ObjectType, id: i64, method: impl Into<String>, args: Value) -> Self {
        Self {
            action: Action::Call,
            action_id: None,
            object_type,
            id,
            method: Some(method.into()),
            args,
        }
    }

    /// Asks the host for the id of a named, persistent event.
    pub fn register_event(object_type: ObjectType, id: i64, event: impl Into<String>) -> Self {
        Self::registration(object_type, id, Some(event.into()), RegisterEventArgs::default())
    }

    /// Asks the host for `count` disposable event ids.
    pub fn temporary_events(object_type: ObjectType, id: i64, count: usize) -> Self {
        let args = RegisterEventArgs {
            delete: false,
            temporary: true,
            number: count as i64,
        };
        Self::registration(object_type, id, None, args)
    }

    /// Releases the host-side resources of `event_id`.
    pub fn unregister_event(object_type: ObjectType, id: i64, event_id: i64) -> Self {
        let args = RegisterEventArgs {
            delete: true,
            temporary: false,
            number: event_id,
        };
        Self::registration(object_type, id, None, args)
    }

    fn registration(
        object_type: ObjectType,
        id: i64,
        method: Option<String>,
        args: RegisterEventArgs,
    ) -> Self {
        Self {
            action: Action::RegisterEvent,
            action_id: None,
            object_type,
            id,
            method,
            args: json!({
                "delete": args.delete,
                "temporary": args.temporary,
                "number": args.number,
            }),
        }
    }

    /// Parses the `register-event` arguments, if this is a registration command.
    pub fn register_args(&self) -> Option<RegisterEventArgs> {
        if self.action != Action::RegisterEvent {
            return None;
        }
        serde_json::from_value(self.args.clone()).ok()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// A reply or event delivered by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub action: Action,
    #[serde(rename = "actionId", default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "eventId", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Value,
}

impl Response {
    pub fn reply(action_id: i64, result: Value) -> Self {
        Self {
            action: Action::Reply,
            action_id: Some(action_id),
            result,
            ..Self::default()
        }
    }

    pub fn failure(action_id: i64, error: impl Into<String>) -> Self {
        Self {
            action: Action::Reply,
            action_id: Some(action_id),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn event(object_id: i64, event_id: i64, payload: Value) -> Self {
        Self {
            action: Action::Event,
            id: Some(object_id),
            event_id: Some(event_id),
            result: payload,
            ..Self::default()
        }
    }

    /// Converts an application-level failure into an error, yielding the result otherwise.
    ///
    /// An empty `error` string counts as success.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) if !message.is_empty() => Err(Error::Remote(message)),
            _ => Ok(self.result),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// A host-allocated, single-use event id and the name the host knows it by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempEventItem {
    #[serde(rename = "eventId")]
    pub event_id: i64,
    #[serde(rename = "eventName")]
    pub event_name: String,
}
