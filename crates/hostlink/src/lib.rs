//! # hostlink
//!
//! A correlated, reentrancy-safe message bridge between a managed process and a
//! single-threaded native host that owns all UI state.
//!
//! The managed side builds [`wire::Command`]s and hands them to the [`Bridge`];
//! the host drains them through its [`HostEndpoint`] and calls back into the
//! [`dispatch::Dispatcher`] with replies and events.

pub mod bridge;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gate;
pub mod host;
pub mod logging;
pub mod pool;
pub mod registry;
pub mod transport;
pub mod wire;

mod ready;

pub use bridge::Bridge;
pub use bridge::BridgeBuilder;
pub use bridge::Registration;
pub use config::BridgeConfig;
pub use error::Error;
pub use error::Result;
pub use events::Callback;
pub use events::EventContext;
pub use events::Removal;
pub use host::HostEndpoint;
pub use registry::HostObject;
pub use wire::Action;
pub use wire::Command;
pub use wire::ObjectType;
pub use wire::Response;
pub use wire::TempEventItem;
