// ── Smart entity domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote entity kind. Unknown wire values are preserved, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum EntityType {
    Switch,
    Alarm,
    StorageMonitor,
    Unknown(i32),
}

impl EntityType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Switch => "Smart Switch",
            Self::Alarm => "Smart Alarm",
            Self::StorageMonitor => "Storage Monitor",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Only switches accept `set_value`.
    pub fn is_controllable(self) -> bool {
        matches!(self, Self::Switch)
    }
}

impl From<i32> for EntityType {
    fn from(raw: i32) -> Self {
        match raw {
            1 => Self::Switch,
            2 => Self::Alarm,
            3 => Self::StorageMonitor,
            other => Self::Unknown(other),
        }
    }
}

impl From<EntityType> for i32 {
    fn from(kind: EntityType) -> Self {
        match kind {
            EntityType::Switch => 1,
            EntityType::Alarm => 2,
            EntityType::StorageMonitor => 3,
            EntityType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Last known value: a flag for switches/alarms, an item total for
/// storage monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Flag(bool),
    ItemCount(i64),
}

impl EntityValue {
    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(v),
            Self::ItemCount(_) => None,
        }
    }

    /// Reinterpret an untyped value for `kind`. A zero item count is how an
    /// "off" switch arrives on the wire. `None` when a storage monitor is
    /// handed a bare flag, which says nothing about its contents.
    pub fn coerce_to(self, kind: EntityType) -> Option<Self> {
        match (kind, self) {
            (EntityType::Switch | EntityType::Alarm, Self::ItemCount(n)) => Some(Self::Flag(n != 0)),
            (EntityType::StorageMonitor, Self::Flag(_)) => None,
            (_, value) => Some(value),
        }
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("on"),
            Self::Flag(false) => f.write_str("off"),
            Self::ItemCount(n) => write!(f, "{n} items"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub item_id: i32,
    pub quantity: i32,
    pub is_blueprint: bool,
}

/// Snapshot returned by `get_entity_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_type: EntityType,
    pub value: EntityValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<StoredItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_protection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_expiry: Option<u32>,
}

/// A tracked entity on one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: u32,
    pub server_id: String,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub subscribed: bool,
    pub last_value: Option<EntityValue>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub online: bool,
}
