// ── Push classifier ──
//
// Maps one push envelope to exactly one domain event. Rules are tried in a
// fixed order and the first match wins: entity pairing, server pairing,
// player death, smart alarm, then a generic notice. Missing data degrades to
// placeholders; nothing here fails.

use serde_json::{Map, Value};

use super::envelope::PushEnvelope;
use crate::model::DomainEvent;

pub const DEATH_CHANNEL: i64 = 1003;
pub const ALARM_CHANNEL: i64 = 1004;

const UNKNOWN_PLAYER: &str = "Unknown Player";
const UNKNOWN_SERVER: &str = "Unknown Server";
const ALARM_TITLE: &str = "Smart Alarm";
const GENERIC_TITLE: &str = "Rust+ Notification";
const GENERIC_MESSAGE: &str = "New notification received";

/// Which rule matched, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rule {
    EntityPairing,
    ServerPairing,
    PlayerDeath,
    SmartAlarm,
    Generic,
}

// ── Field access ─────────────────────────────────────────────────

/// Unified view over the parsed `body` entry and the raw appData pairs.
struct Fields<'a> {
    envelope: &'a PushEnvelope,
    body: Map<String, Value>,
    /// The body entry verbatim when it is not a JSON object.
    free_text: Option<String>,
}

impl<'a> Fields<'a> {
    fn new(envelope: &'a PushEnvelope) -> Self {
        let raw = envelope.field("body").unwrap_or_default();
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(body)) => Self {
                envelope,
                body,
                free_text: None,
            },
            _ => Self {
                envelope,
                body: Map::new(),
                free_text: (!raw.trim().is_empty()).then(|| raw.to_owned()),
            },
        }
    }

    /// Body value as text. Empty strings, zero and `false` count as absent.
    fn body(&self, key: &str) -> Option<String> {
        match self.body.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
            Value::Bool(true) => Some("true".to_owned()),
            _ => None,
        }
    }

    fn app(&self, key: &str) -> Option<String> {
        self.envelope
            .field(key)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    /// Body first, then appData.
    fn any(&self, key: &str) -> Option<String> {
        self.body(key).or_else(|| self.app(key))
    }

    fn channel(&self) -> Option<i64> {
        self.app("channel")
            .or_else(|| self.body("channel"))
            .and_then(|c| c.trim().parse().ok())
    }

    fn channel_id(&self) -> Option<String> {
        self.app("channelId")
    }

    fn type_marker(&self) -> Option<String> {
        self.any("type")
    }

    /// Free-form text of the notification: `body`, `desc`, or the raw
    /// non-JSON body.
    fn text(&self) -> Option<String> {
        self.body("body")
            .or_else(|| self.body("desc"))
            .or_else(|| self.free_text.clone())
    }

    fn description(&self) -> Option<String> {
        self.body("desc").or_else(|| self.body("body"))
    }
}

fn parse_id(raw: Option<String>) -> Option<u32> {
    raw.and_then(|id| id.trim().parse().ok()).filter(|id| *id != 0)
}

// ── Classification ───────────────────────────────────────────────

pub fn classify(envelope: &PushEnvelope) -> (Rule, DomainEvent) {
    let fields = Fields::new(envelope);
    let channel = fields.channel();
    let channel_id = fields.channel_id();
    let type_marker = fields.type_marker();

    if let Some(event) = entity_pairing(&fields) {
        return (Rule::EntityPairing, event);
    }

    let is_server = type_marker.as_deref() == Some("server")
        || ["ip", "port", "playerId", "playerToken"]
            .iter()
            .all(|key| fields.any(key).is_some());
    if is_server {
        return (Rule::ServerPairing, server_pairing(&fields));
    }

    let is_death = channel == Some(DEATH_CHANNEL)
        || channel_id.as_deref() == Some("1003")
        || type_marker.as_deref() == Some("player_death");
    if is_death {
        return (Rule::PlayerDeath, player_death(&fields));
    }

    let is_alarm = channel == Some(ALARM_CHANNEL)
        || matches!(channel_id.as_deref(), Some("1004" | "alarm"))
        || type_marker.as_deref() == Some("alarm");
    if is_alarm {
        return (Rule::SmartAlarm, smart_alarm(&fields));
    }

    (Rule::Generic, generic(&fields))
}

fn entity_pairing(fields: &Fields<'_>) -> Option<DomainEvent> {
    let entity_id = parse_id(fields.any("entityId"))?;
    let entity_name = fields.any("entityName")?;
    let entity_type = fields.any("entityType")?;
    Some(DomainEvent::EntityPairingRequested {
        entity_id,
        entity_type,
        entity_name,
        description: fields.description(),
    })
}

fn server_pairing(fields: &Fields<'_>) -> DomainEvent {
    DomainEvent::ServerPairingRequested {
        server_name: fields
            .body("name")
            .unwrap_or_else(|| UNKNOWN_SERVER.to_owned()),
        ip: fields.any("ip").unwrap_or_default(),
        port: fields.any("port").unwrap_or_default(),
        player_id: fields.any("playerId").unwrap_or_default(),
        player_token: fields.any("playerToken").unwrap_or_default(),
        description: fields.description(),
    }
}

fn player_death(fields: &Fields<'_>) -> DomainEvent {
    let report = fields
        .text()
        .map(|text| DeathReport::parse(&text))
        .unwrap_or_default();
    DomainEvent::PlayerDeathReported {
        steam_id: fields
            .any("steamId")
            .unwrap_or_else(|| "unknown".to_owned()),
        name: report.name.unwrap_or_else(|| UNKNOWN_PLAYER.to_owned()),
        killer: report.killer,
        weapon: report.weapon,
    }
}

fn smart_alarm(fields: &Fields<'_>) -> DomainEvent {
    let message = fields
        .app("message")
        .or_else(|| fields.app("gcm.notification.body"))
        .or_else(|| fields.text())
        .unwrap_or_default();
    let title = fields
        .app("title")
        .or_else(|| fields.app("gcm.notification.title"))
        .or_else(|| fields.body("title"))
        .unwrap_or_else(|| ALARM_TITLE.to_owned());
    DomainEvent::SmartAlarmTriggered {
        entity_id: parse_id(fields.any("entityId")),
        title,
        message,
    }
}

fn generic(fields: &Fields<'_>) -> DomainEvent {
    DomainEvent::GenericNotice {
        title: fields
            .any("title")
            .unwrap_or_else(|| GENERIC_TITLE.to_owned()),
        message: fields
            .text()
            .or_else(|| fields.app("message"))
            .unwrap_or_else(|| GENERIC_MESSAGE.to_owned()),
    }
}

// ── Death text ───────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq)]
struct DeathReport {
    name: Option<String>,
    killer: Option<String>,
    weapon: Option<String>,
}

impl DeathReport {
    /// Recognises "<name> died..." and "<name> was killed by <killer>[ with <weapon>]".
    fn parse(text: &str) -> Self {
        if let Some(idx) = text.find(" died") {
            let name = &text[..idx];
            return Self {
                name: (!name.is_empty()).then(|| name.to_owned()),
                ..Self::default()
            };
        }

        let Some((victim, rest)) = text.split_once(" was killed by ") else {
            return Self::default();
        };
        if victim.is_empty() || rest.is_empty() {
            return Self::default();
        }
        let (killer, weapon) = match rest.split_once(" with ") {
            Some((killer, weapon)) if !killer.is_empty() && !weapon.trim().is_empty() => {
                (killer, Some(weapon.trim().to_owned()))
            }
            _ => (rest, None),
        };
        Self {
            name: Some(victim.to_owned()),
            killer: Some(killer.to_owned()),
            weapon,
        }
    }
}
