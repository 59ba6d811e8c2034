//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use rustlink_config::ConfigError;
use rustlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const REMOTE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {endpoint}: {reason}")]
    #[diagnostic(
        code(rustlink::connection_failed),
        help(
            "Check that the server is online and its app port is reachable.\n\
             Endpoint: {endpoint}"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Connection problem: {reason}")]
    #[diagnostic(code(rustlink::connection))]
    Connection { reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(rustlink::timeout),
        help("Raise defaults.request_timeout in the config or check the server.")
    )]
    Timeout { seconds: u64 },

    // ── Credentials ──────────────────────────────────────────────────
    #[error("No player token configured for profile '{profile}'")]
    #[diagnostic(
        code(rustlink::no_credentials),
        help(
            "Store one with: rustlink config set-token --profile {profile}\n\
             Or set player_token_env in the profile."
        )
    )]
    NoCredentials { profile: String },

    #[error("Keyring error: {message}")]
    #[diagnostic(code(rustlink::keyring))]
    Keyring { message: String },

    // ── Remote / entities ────────────────────────────────────────────
    #[error("Server refused the request: {message} ({code})")]
    #[diagnostic(code(rustlink::remote))]
    Remote { code: String, message: String },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(rustlink::not_found),
        help("Run: rustlink {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(rustlink::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    #[error("Entity {entity_id} is a {entity_type} and cannot be switched")]
    #[diagnostic(
        code(rustlink::not_controllable),
        help("Only smart switches accept set/toggle.")
    )]
    NotControllable { entity_id: u32, entity_type: String },

    #[error("Protocol error: {message}")]
    #[diagnostic(code(rustlink::protocol))]
    Protocol { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rustlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(rustlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: rustlink config init --host <HOST> --player-id <ID>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(rustlink::config))]
    Config { message: String },

    #[error("Local state error: {message}")]
    #[diagnostic(code(rustlink::persistence))]
    Persistence { message: String },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(rustlink::json), help("Check the JSON input and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Connection { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NoCredentials { .. } | Self::Keyring { .. } => exit_code::AUTH,
            Self::Remote { code, .. } if code == "not_found" => exit_code::NOT_FOUND,
            Self::Remote { .. } => exit_code::REMOTE,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NotControllable { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Encoding { message } | CoreError::Decoding { message } => {
                CliError::Protocol { message }
            }

            CoreError::UnexpectedResponse { expected } => CliError::Protocol {
                message: format!("server sent the wrong response shape (expected {expected})"),
            },

            e @ (CoreError::NotConnected
            | CoreError::AlreadyConnected
            | CoreError::ConnectionLost) => CliError::Connection {
                reason: e.to_string(),
            },

            CoreError::TransportFailure { reason } => CliError::Connection { reason },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::RemoteOperation { code, message } => CliError::Remote { code, message },

            CoreError::EntityNotTracked { entity_id } => CliError::NotFound {
                resource_type: "tracked entity".into(),
                identifier: entity_id.to_string(),
                list_command: "entity list".into(),
            },

            CoreError::EntityAlreadyTracked { entity_id } => CliError::Conflict {
                resource_type: "tracked entity".into(),
                identifier: entity_id.to_string(),
            },

            CoreError::NotControllable {
                entity_id,
                entity_type,
            } => CliError::NotControllable {
                entity_id,
                entity_type,
            },

            CoreError::Persistence { message } => CliError::Persistence { message },

            CoreError::Config { message } => CliError::Config { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Keyring(message) => CliError::Keyring { message },
            ConfigError::Io(e) => CliError::Io(e),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => {
                CliError::Config {
                    message: other.to_string(),
                }
            }
        }
    }
}
