// ── Core error types ──
//
// Caller-facing errors from rustlink-core. Socket and codec details from
// rustlink-api are folded into these variants by the `From` impl below.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Message errors ───────────────────────────────────────────────
    #[error("Cannot encode request: {message}")]
    Encoding { message: String },

    #[error("Cannot decode message: {message}")]
    Decoding { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Not connected to a server")]
    NotConnected,

    #[error("Already connected or connecting; disconnect first")]
    AlreadyConnected,

    #[error("Connection lost before the request completed")]
    ConnectionLost,

    #[error("Transport failure: {reason}")]
    TransportFailure { reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Remote errors ────────────────────────────────────────────────
    /// The server answered with an explicit error response.
    #[error("{message} ({code})")]
    RemoteOperation { code: String, message: String },

    #[error("Unexpected response: expected {expected}")]
    UnexpectedResponse { expected: &'static str },

    // ── Entity errors ────────────────────────────────────────────────
    #[error("Entity {entity_id} is not tracked")]
    EntityNotTracked { entity_id: u32 },

    #[error("Entity {entity_id} is already tracked")]
    EntityAlreadyTracked { entity_id: u32 },

    #[error("Entity {entity_id} is a {entity_type}, which cannot be switched")]
    NotControllable {
        entity_id: u32,
        entity_type: String,
    },

    // ── Local errors ─────────────────────────────────────────────────
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Build a `RemoteOperation` from a raw server error code.
    pub fn remote(code: impl Into<String>) -> Self {
        let code = code.into();
        let message = humanize_remote_code(&code);
        Self::RemoteOperation { code, message }
    }

    /// Returns `true` when the failure came from the link going away rather
    /// than from the request itself.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionLost | Self::TransportFailure { .. }
        )
    }
}

/// Map the server's snake_case error codes onto readable messages.
pub fn humanize_remote_code(code: &str) -> String {
    match code {
        "not_found" => "entity not found".into(),
        "access_denied" => "permission denied".into(),
        "wrong_type" => "entity type does not support this operation".into(),
        "no_player" => "player is not on the server".into(),
        "no_team" => "player is not in a team".into(),
        "rate_limit" => "rate limited by the server".into(),
        "server_error" => "server error".into(),
        "message_not_sent" => "team message was not sent".into(),
        "banned" => "player is banned".into(),
        "invalid_playerid" => "invalid player id".into(),
        "invalid_motd" => "invalid message of the day".into(),
        other => other.replace('_', " "),
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rustlink_api::Error> for CoreError {
    fn from(err: rustlink_api::Error) -> Self {
        match err {
            rustlink_api::Error::Encoding { field, reason } => CoreError::Encoding {
                message: format!("{field}: {reason}"),
            },
            rustlink_api::Error::Decoding(e) => CoreError::Decoding {
                message: e.to_string(),
            },
            rustlink_api::Error::NotConnected => CoreError::NotConnected,
            rustlink_api::Error::WebSocketConnect(reason) => CoreError::TransportFailure {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            rustlink_api::Error::ConnectTimeout { timeout_ms } => CoreError::TransportFailure {
                reason: format!("connection timed out after {timeout_ms}ms"),
            },
            rustlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid server address: {e}"),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Persistence {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_codes_are_humanized_but_kept() {
        let err = CoreError::remote("not_found");
        assert_eq!(err.to_string(), "entity not found (not_found)");

        let CoreError::RemoteOperation { code, message } = CoreError::remote("access_denied")
        else {
            panic!("expected RemoteOperation");
        };
        assert_eq!(code, "access_denied");
        assert_eq!(message, "permission denied");
    }

    #[test]
    fn unknown_remote_code_falls_back_to_words() {
        assert_eq!(humanize_remote_code("some_new_code"), "some new code");
    }

    #[test]
    fn api_errors_map_to_core_variants() {
        assert!(matches!(
            CoreError::from(rustlink_api::Error::NotConnected),
            CoreError::NotConnected
        ));
        let err = CoreError::from(rustlink_api::Error::WebSocketConnect("refused".into()));
        assert!(err.is_connection_error());
        let err = CoreError::from(rustlink_api::Error::Encoding {
            field: "player_id",
            reason: "invalid digit".into(),
        });
        assert!(matches!(err, CoreError::Encoding { .. }));
    }
}
