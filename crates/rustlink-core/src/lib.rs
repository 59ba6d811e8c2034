//! Session lifecycle, entity tracking and push classification for rustlink.
//!
//! Two independent pipelines feed one typed event stream:
//!
//! - **[`Controller`]** owns the live Rust+ session. It connects through a
//!   [`Transport`](rustlink_api::Transport), correlates requests with
//!   responses, classifies broadcasts, refreshes server info periodically and
//!   reconnects with linear backoff when the link drops.
//!
//! - **[`PushPipeline`]** gates out-of-band push deliveries through a
//!   [`DedupLedger`] and classifies each survivor into exactly one
//!   [`DomainEvent`].
//!
//! Both publish into an injected [`EventSink`]. On top of the controller,
//! [`EntityManager`] tracks smart switches, alarms and storage monitors on
//! one server with idempotent subscribe/unsubscribe. State that must
//! outlive the process goes through the [`Persistence`] trait.

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod convert;
pub(crate) mod correlator;
pub mod entities;
pub mod error;
pub mod model;
pub mod push;
pub mod sink;
pub mod store;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broadcast::BroadcastDispatcher;
pub use config::{ControllerConfig, ReconnectConfig, Server};
pub use controller::{Controller, RECONNECT_EXHAUSTED};
pub use entities::{EntityControl, EntityManager};
pub use error::CoreError;
pub use push::{DedupLedger, PushEnvelope, PushPipeline};
pub use sink::{CollectingSink, EventBus, EventSink};
pub use store::{JsonFileStore, MemoryStore, Persistence};

pub use model::{
    ConnectionState, ConnectionStatus, DomainEvent, Entity, EntityInfo, EntityType, EntityValue,
    GameTime, ServerInfo, StoredItem, TeamInfo, TeamMember, TeamMessage,
};
