//! Request encoding and message decoding against the Rust+ schema.
//!
//! Pure transforms: no state, no retries. The caller assigns the
//! sequence number; the codec attaches it together with the player
//! credentials and the request-kind field.

use prost::Message;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;
use crate::proto::{
    AppEmpty, AppFlag, AppMessage, AppRequest, AppSendMessage, AppSetEntityValue,
};

/// The player identifier/secret pair obtained out of band (pairing).
///
/// Both halves stay strings until encode time; the codec validates them
/// against the schema (`uint64` identifier, `int32` secret).
#[derive(Debug, Clone)]
pub struct PlayerCredentials {
    pub player_id: String,
    pub player_token: SecretString,
}

impl PlayerCredentials {
    pub fn new(player_id: impl Into<String>, player_token: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            player_token: SecretString::from(player_token.into()),
        }
    }
}

/// The closed set of request kinds the client issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GetInfo,
    GetTime,
    GetTeamInfo,
    GetTeamChat,
    SendTeamMessage { message: String },
    GetEntityInfo { entity_id: u32 },
    SetEntityValue { entity_id: u32, value: bool },
    CheckSubscription { entity_id: u32 },
    SetSubscription { entity_id: u32, value: bool },
}

impl Request {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetInfo => "get_info",
            Self::GetTime => "get_time",
            Self::GetTeamInfo => "get_team_info",
            Self::GetTeamChat => "get_team_chat",
            Self::SendTeamMessage { .. } => "send_team_message",
            Self::GetEntityInfo { .. } => "get_entity_info",
            Self::SetEntityValue { .. } => "set_entity_value",
            Self::CheckSubscription { .. } => "check_subscription",
            Self::SetSubscription { .. } => "set_subscription",
        }
    }

    /// The entity this request addresses, if any.
    pub fn entity_id(&self) -> Option<u32> {
        match self {
            Self::GetEntityInfo { entity_id }
            | Self::SetEntityValue { entity_id, .. }
            | Self::CheckSubscription { entity_id }
            | Self::SetSubscription { entity_id, .. } => Some(*entity_id),
            _ => None,
        }
    }
}

/// Build the wire request for `request` without serializing it.
pub fn build_request(
    seq: u32,
    credentials: &PlayerCredentials,
    request: &Request,
) -> Result<AppRequest, Error> {
    let player_id = credentials
        .player_id
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Encoding {
            field: "player_id",
            reason: e.to_string(),
        })?;
    let player_token = credentials
        .player_token
        .expose_secret()
        .trim()
        .parse::<i32>()
        .map_err(|e| Error::Encoding {
            field: "player_token",
            reason: e.to_string(),
        })?;

    let mut app = AppRequest {
        seq,
        player_id,
        player_token,
        entity_id: request.entity_id(),
        ..AppRequest::default()
    };

    match request {
        Request::GetInfo => app.get_info = Some(AppEmpty {}),
        Request::GetTime => app.get_time = Some(AppEmpty {}),
        Request::GetTeamInfo => app.get_team_info = Some(AppEmpty {}),
        Request::GetTeamChat => app.get_team_chat = Some(AppEmpty {}),
        Request::SendTeamMessage { message } => {
            app.send_team_message = Some(AppSendMessage {
                message: message.clone(),
            });
        }
        Request::GetEntityInfo { .. } => app.get_entity_info = Some(AppEmpty {}),
        Request::SetEntityValue { value, .. } => {
            app.set_entity_value = Some(AppSetEntityValue { value: *value });
        }
        Request::CheckSubscription { .. } => app.check_subscription = Some(AppEmpty {}),
        Request::SetSubscription { value, .. } => {
            app.set_subscription = Some(AppFlag { value: *value });
        }
    }

    Ok(app)
}

/// Encode a request into a binary frame.
pub fn encode_request(
    seq: u32,
    credentials: &PlayerCredentials,
    request: &Request,
) -> Result<Vec<u8>, Error> {
    let app = build_request(seq, credentials, request)?;
    Ok(app.encode_to_vec())
}

/// Decode an inbound binary frame.
pub fn decode_message(frame: &[u8]) -> Result<AppMessage, Error> {
    Ok(AppMessage::decode(frame)?)
}
