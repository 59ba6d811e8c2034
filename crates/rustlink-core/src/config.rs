// ── Runtime connection configuration ──
//
// These types describe *how* to talk to a game server. They carry
// credential data and session tuning, but never touch disk. The CLI
// builds them from its config profile and hands them in.

use std::time::Duration;

use rustlink_api::{DEFAULT_PROTOCOL_VERSION, Endpoint, PlayerCredentials};

/// Linear reconnect backoff: attempt `k` waits `base_delay * k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    /// Attempts after a drop before giving up. `0` disables reconnection.
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Session tuning shared by every connection a `Controller` makes.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub protocol_version: u64,
    pub reconnect: ReconnectConfig,
    /// Period of the best-effort server-info refresh. `None` disables it.
    pub refresh_interval: Option<Duration>,
    /// Pending requests older than this fail with `Timeout`. `None` waits
    /// until the link drops.
    pub request_timeout: Option<Duration>,
    /// Issue server-info and team-info requests as soon as a session opens.
    pub prime_on_connect: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            reconnect: ReconnectConfig::default(),
            refresh_interval: Some(Duration::from_secs(30)),
            request_timeout: Some(Duration::from_secs(15)),
            prime_on_connect: true,
        }
    }
}

/// A paired game server.
#[derive(Debug, Clone)]
pub struct Server {
    /// Stable identifier used to key persisted state (usually `host:port`).
    pub id: String,
    pub name: String,
    pub endpoint: Endpoint,
    pub credentials: PlayerCredentials,
}

impl Server {
    pub fn new(name: impl Into<String>, endpoint: Endpoint, credentials: PlayerCredentials) -> Self {
        Self {
            id: endpoint.to_string(),
            name: name.into(),
            endpoint,
            credentials,
        }
    }
}
