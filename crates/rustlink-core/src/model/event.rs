// ── Domain events ──
//
// The single output contract of both the live session and the push
// pipeline. Consumers match exhaustively on `DomainEvent`.

use serde::{Deserialize, Serialize};

use super::entity::EntityValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ServerPairingRequested {
        server_name: String,
        ip: String,
        port: String,
        player_id: String,
        player_token: String,
        description: Option<String>,
    },
    EntityPairingRequested {
        entity_id: u32,
        /// Raw type marker as delivered (usually the numeric kind as text).
        entity_type: String,
        entity_name: String,
        description: Option<String>,
    },
    TeamMessageReceived {
        steam_id: String,
        name: String,
        message: String,
        color: String,
        time: u32,
    },
    PlayerDeathReported {
        steam_id: String,
        name: String,
        killer: Option<String>,
        weapon: Option<String>,
    },
    PlayerLoginStateChanged {
        steam_id: String,
        name: String,
        online: bool,
    },
    SmartAlarmTriggered {
        entity_id: Option<u32>,
        title: String,
        message: String,
    },
    EntityValueChanged {
        entity_id: u32,
        value: EntityValue,
        capacity: Option<i32>,
        has_protection: Option<bool>,
    },
    GenericNotice {
        title: String,
        message: String,
    },
}

impl DomainEvent {
    /// Stable snake_case name of the variant, as used in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServerPairingRequested { .. } => "server_pairing_requested",
            Self::EntityPairingRequested { .. } => "entity_pairing_requested",
            Self::TeamMessageReceived { .. } => "team_message_received",
            Self::PlayerDeathReported { .. } => "player_death_reported",
            Self::PlayerLoginStateChanged { .. } => "player_login_state_changed",
            Self::SmartAlarmTriggered { .. } => "smart_alarm_triggered",
            Self::EntityValueChanged { .. } => "entity_value_changed",
            Self::GenericNotice { .. } => "generic_notice",
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match self {
            Self::ServerPairingRequested {
                server_name, ip, port, ..
            } => format!("Pair server {server_name} ({ip}:{port})"),
            Self::EntityPairingRequested {
                entity_id,
                entity_name,
                ..
            } => format!("Pair entity {entity_name} (#{entity_id})"),
            Self::TeamMessageReceived { name, message, .. } => format!("{name}: {message}"),
            Self::PlayerDeathReported {
                name,
                killer,
                weapon,
                ..
            } => match (killer, weapon) {
                (Some(k), Some(w)) => format!("{name} was killed by {k} with {w}"),
                (Some(k), None) => format!("{name} was killed by {k}"),
                _ => format!("{name} died"),
            },
            Self::PlayerLoginStateChanged { name, online, .. } => {
                if *online {
                    format!("{name} came online")
                } else {
                    format!("{name} went offline")
                }
            }
            Self::SmartAlarmTriggered { title, message, .. } => format!("{title}: {message}"),
            Self::EntityValueChanged {
                entity_id, value, ..
            } => format!("Entity #{entity_id} is now {value}"),
            Self::GenericNotice { title, message } => format!("{title}: {message}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tag() {
        let event = DomainEvent::GenericNotice {
            title: "t".into(),
            message: "m".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "generic_notice");
        assert_eq!(json["type"], event.kind());
    }

    #[test]
    fn death_summary_includes_weapon() {
        let event = DomainEvent::PlayerDeathReported {
            steam_id: String::new(),
            name: "Bob".into(),
            killer: Some("Alice".into()),
            weapon: Some("Rifle".into()),
        };
        assert_eq!(event.summary(), "Bob was killed by Alice with Rifle");
    }
}
