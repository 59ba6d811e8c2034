//! Rust+ companion protocol messages.
//!
//! Hand-declared `prost` messages mirroring the public `rustplus.proto`
//! schema. Only the request kinds and response/broadcast payloads the
//! client actually uses are declared; unknown fields on the wire are
//! skipped by the decoder.

// ── Requests ────────────────────────────────────────────────────────

/// Outbound request envelope. Exactly one request-kind field is set.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AppRequest {
    #[prost(uint32, required, tag = "1")]
    pub seq: u32,
    #[prost(uint64, required, tag = "2")]
    pub player_id: u64,
    #[prost(int32, required, tag = "3")]
    pub player_token: i32,
    #[prost(uint32, optional, tag = "4")]
    pub entity_id: Option<u32>,
    #[prost(message, optional, tag = "8")]
    pub get_info: Option<AppEmpty>,
    #[prost(message, optional, tag = "9")]
    pub get_time: Option<AppEmpty>,
    #[prost(message, optional, tag = "11")]
    pub get_team_info: Option<AppEmpty>,
    #[prost(message, optional, tag = "12")]
    pub get_team_chat: Option<AppEmpty>,
    #[prost(message, optional, tag = "13")]
    pub send_team_message: Option<AppSendMessage>,
    #[prost(message, optional, tag = "14")]
    pub get_entity_info: Option<AppEmpty>,
    #[prost(message, optional, tag = "15")]
    pub set_entity_value: Option<AppSetEntityValue>,
    #[prost(message, optional, tag = "16")]
    pub check_subscription: Option<AppEmpty>,
    #[prost(message, optional, tag = "17")]
    pub set_subscription: Option<AppFlag>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppEmpty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppSendMessage {
    #[prost(string, required, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppSetEntityValue {
    #[prost(bool, required, tag = "1")]
    pub value: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppFlag {
    #[prost(bool, required, tag = "1")]
    pub value: bool,
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Inbound envelope: either a response (echoes `seq`) or a broadcast.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AppMessage {
    #[prost(message, optional, tag = "1")]
    pub response: Option<AppResponse>,
    #[prost(message, optional, tag = "2")]
    pub broadcast: Option<AppBroadcast>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppResponse {
    #[prost(uint32, required, tag = "1")]
    pub seq: u32,
    #[prost(message, optional, tag = "4")]
    pub success: Option<AppEmpty>,
    #[prost(message, optional, tag = "5")]
    pub error: Option<AppError>,
    #[prost(message, optional, tag = "6")]
    pub info: Option<AppInfo>,
    #[prost(message, optional, tag = "7")]
    pub time: Option<AppTime>,
    #[prost(message, optional, tag = "9")]
    pub team_info: Option<AppTeamInfo>,
    #[prost(message, optional, tag = "10")]
    pub team_chat: Option<AppTeamChat>,
    #[prost(message, optional, tag = "11")]
    pub entity_info: Option<AppEntityInfo>,
    #[prost(message, optional, tag = "12")]
    pub flag: Option<AppFlag>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppError {
    #[prost(string, required, tag = "1")]
    pub error: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppInfo {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(string, required, tag = "2")]
    pub header_image: String,
    #[prost(string, required, tag = "3")]
    pub url: String,
    #[prost(string, required, tag = "4")]
    pub map: String,
    #[prost(uint32, required, tag = "5")]
    pub map_size: u32,
    #[prost(uint32, required, tag = "6")]
    pub wipe_time: u32,
    #[prost(uint32, required, tag = "7")]
    pub players: u32,
    #[prost(uint32, required, tag = "8")]
    pub max_players: u32,
    #[prost(uint32, required, tag = "9")]
    pub queued_players: u32,
    #[prost(uint32, optional, tag = "10")]
    pub seed: Option<u32>,
    #[prost(uint32, optional, tag = "11")]
    pub salt: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTime {
    #[prost(float, required, tag = "1")]
    pub day_length_minutes: f32,
    #[prost(float, required, tag = "2")]
    pub time_scale: f32,
    #[prost(float, required, tag = "3")]
    pub sunrise: f32,
    #[prost(float, required, tag = "4")]
    pub sunset: f32,
    #[prost(float, required, tag = "5")]
    pub time: f32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTeamInfo {
    #[prost(uint64, required, tag = "1")]
    pub leader_steam_id: u64,
    #[prost(message, repeated, tag = "2")]
    pub members: Vec<AppTeamMember>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTeamMember {
    #[prost(uint64, required, tag = "1")]
    pub steam_id: u64,
    #[prost(string, required, tag = "2")]
    pub name: String,
    #[prost(float, required, tag = "3")]
    pub x: f32,
    #[prost(float, required, tag = "4")]
    pub y: f32,
    #[prost(bool, required, tag = "5")]
    pub is_online: bool,
    #[prost(uint32, required, tag = "6")]
    pub spawn_time: u32,
    #[prost(bool, required, tag = "7")]
    pub is_alive: bool,
    #[prost(uint32, required, tag = "8")]
    pub death_time: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTeamChat {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<AppTeamMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTeamMessage {
    #[prost(uint64, required, tag = "1")]
    pub steam_id: u64,
    #[prost(string, required, tag = "2")]
    pub name: String,
    #[prost(string, required, tag = "3")]
    pub message: String,
    #[prost(string, required, tag = "4")]
    pub color: String,
    #[prost(uint32, required, tag = "5")]
    pub time: u32,
}

/// Entity snapshot. `type` is kept as a raw integer so unknown entity
/// kinds survive decoding.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AppEntityInfo {
    #[prost(int32, required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub payload: Option<AppEntityPayload>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppEntityPayload {
    #[prost(bool, optional, tag = "1")]
    pub value: Option<bool>,
    #[prost(message, repeated, tag = "2")]
    pub items: Vec<AppEntityItem>,
    #[prost(int32, optional, tag = "3")]
    pub capacity: Option<i32>,
    #[prost(bool, optional, tag = "4")]
    pub has_protection: Option<bool>,
    #[prost(uint32, optional, tag = "5")]
    pub protection_expiry: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppEntityItem {
    #[prost(int32, required, tag = "1")]
    pub item_id: i32,
    #[prost(int32, required, tag = "2")]
    pub quantity: i32,
    #[prost(bool, required, tag = "3")]
    pub item_is_blueprint: bool,
}

// ── Broadcasts ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppBroadcast {
    #[prost(message, optional, tag = "4")]
    pub team_changed: Option<AppTeamChanged>,
    #[prost(message, optional, tag = "5")]
    pub team_message: Option<AppNewTeamMessage>,
    #[prost(message, optional, tag = "6")]
    pub entity_changed: Option<AppEntityChanged>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppTeamChanged {
    #[prost(uint64, required, tag = "1")]
    pub player_id: u64,
    #[prost(message, optional, tag = "2")]
    pub team_info: Option<AppTeamInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppNewTeamMessage {
    #[prost(message, optional, tag = "1")]
    pub message: Option<AppTeamMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppEntityChanged {
    #[prost(uint32, required, tag = "1")]
    pub entity_id: u32,
    #[prost(message, optional, tag = "2")]
    pub payload: Option<AppEntityPayload>,
}
