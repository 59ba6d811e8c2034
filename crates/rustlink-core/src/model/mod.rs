// ── Domain model ──
//
// Canonical representations shared by the session, the entity manager and
// the push pipeline. Wire types from rustlink-api are converted into these
// in `crate::convert`.

pub mod connection;
pub mod entity;
pub mod event;
pub mod server;

pub use connection::{ConnectionState, ConnectionStatus};
pub use entity::{Entity, EntityInfo, EntityType, EntityValue, StoredItem};
pub use event::DomainEvent;
pub use server::{GameTime, ServerInfo, TeamInfo, TeamMember, TeamMessage};
