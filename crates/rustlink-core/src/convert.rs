// ── Wire-to-domain type conversions ──
//
// Bridges `rustlink_api::proto` messages into `crate::model` types. Steam
// ids become strings so they survive JSON consumers without precision loss.

use rustlink_api::proto::{
    AppEntityInfo, AppEntityItem, AppEntityPayload, AppInfo, AppTeamInfo, AppTeamMember,
    AppTeamMessage, AppTime,
};

use crate::model::{
    EntityInfo, EntityType, EntityValue, GameTime, ServerInfo, StoredItem, TeamInfo, TeamMember,
    TeamMessage,
};

// ── Entity payloads ────────────────────────────────────────────────

/// Value of a payload whose entity type is known: switches and alarms
/// hold a flag, storage monitors an item total.
pub fn payload_value(entity_type: EntityType, payload: &AppEntityPayload) -> EntityValue {
    match entity_type {
        EntityType::Switch | EntityType::Alarm => EntityValue::Flag(payload.value.unwrap_or(false)),
        EntityType::StorageMonitor => EntityValue::ItemCount(item_total(payload)),
        EntityType::Unknown(_) => broadcast_value(payload),
    }
}

/// Change broadcasts carry no entity type. Boolean `value` when present,
/// otherwise the sum of item quantities; the receiver coerces it against
/// the tracked type.
pub fn broadcast_value(payload: &AppEntityPayload) -> EntityValue {
    match payload.value {
        Some(flag) => EntityValue::Flag(flag),
        None => EntityValue::ItemCount(item_total(payload)),
    }
}

fn item_total(payload: &AppEntityPayload) -> i64 {
    payload
        .items
        .iter()
        .map(|item| i64::from(item.quantity))
        .sum()
}

impl From<&AppEntityItem> for StoredItem {
    fn from(item: &AppEntityItem) -> Self {
        Self {
            item_id: item.item_id,
            quantity: item.quantity,
            is_blueprint: item.item_is_blueprint,
        }
    }
}

impl From<AppEntityInfo> for EntityInfo {
    fn from(info: AppEntityInfo) -> Self {
        let entity_type = EntityType::from(info.r#type);
        let payload = info.payload.unwrap_or_default();
        Self {
            entity_type,
            value: payload_value(entity_type, &payload),
            items: payload.items.iter().map(StoredItem::from).collect(),
            capacity: payload.capacity,
            has_protection: payload.has_protection,
            protection_expiry: payload.protection_expiry,
        }
    }
}

// ── Server / team ──────────────────────────────────────────────────

impl From<AppInfo> for ServerInfo {
    fn from(info: AppInfo) -> Self {
        Self {
            name: info.name,
            header_image: info.header_image,
            url: info.url,
            map: info.map,
            map_size: info.map_size,
            wipe_time: info.wipe_time,
            players: info.players,
            max_players: info.max_players,
            queued_players: info.queued_players,
            seed: info.seed,
            salt: info.salt,
        }
    }
}

impl From<AppTime> for GameTime {
    fn from(t: AppTime) -> Self {
        Self {
            day_length_minutes: t.day_length_minutes,
            time_scale: t.time_scale,
            sunrise: t.sunrise,
            sunset: t.sunset,
            time: t.time,
        }
    }
}

impl From<&AppTeamMember> for TeamMember {
    fn from(m: &AppTeamMember) -> Self {
        Self {
            steam_id: m.steam_id.to_string(),
            name: m.name.clone(),
            x: m.x,
            y: m.y,
            is_online: m.is_online,
            spawn_time: m.spawn_time,
            is_alive: m.is_alive,
            death_time: m.death_time,
        }
    }
}

impl From<&AppTeamInfo> for TeamInfo {
    fn from(t: &AppTeamInfo) -> Self {
        Self {
            leader_steam_id: t.leader_steam_id.to_string(),
            members: t.members.iter().map(TeamMember::from).collect(),
        }
    }
}

impl From<AppTeamMessage> for TeamMessage {
    fn from(m: AppTeamMessage) -> Self {
        Self {
            steam_id: m.steam_id.to_string(),
            name: m.name,
            message: m.message,
            color: m.color,
            time: m.time,
        }
    }
}
