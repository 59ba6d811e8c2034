// ── Connection status ──

use serde::Serialize;
use strum::{Display, EnumString};

/// Session lifecycle state, observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A state plus an optional human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub message: Option<String>,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    pub fn with_message(state: ConnectionState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: Some(message.into()),
        }
    }

    /// `connect` is only accepted from an idle state.
    pub fn is_idle(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Error
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} ({msg})", self.state),
            None => write!(f, "{}", self.state),
        }
    }
}
