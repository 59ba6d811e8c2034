//! Shared helpers for command handlers: config lookup, session setup and
//! input reading.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rustlink_config::{Config, Profile};
use rustlink_core::{
    Controller, CoreError, EntityManager, EventBus, JsonFileStore, Persistence, Server,
};
use rustlink_api::WebSocketTransport;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Config ──────────────────────────────────────────────────────────

pub fn load_config() -> Result<Config, CliError> {
    Ok(rustlink_config::load_config()?)
}

/// Resolve the active profile, listing the alternatives on a miss.
pub fn active_profile<'a>(
    cfg: &'a Config,
    global: &GlobalOpts,
) -> Result<(&'a str, &'a Profile), CliError> {
    cfg.profile(global.profile.as_deref()).map_err(|e| match e {
        rustlink_config::ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
            name,
            available: available_profiles(cfg),
        },
        other => other.into(),
    })
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

pub fn open_store(cfg: &Config) -> Arc<dyn Persistence> {
    Arc::new(JsonFileStore::new(rustlink_config::data_dir(cfg)))
}

// ── Session ─────────────────────────────────────────────────────────

/// How long the session is expected to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One request or two, then exit. No timers, no reconnects.
    OneShot,
    /// Long-lived: refresh timer, priming and reconnects as configured.
    Watch,
}

pub struct Session {
    pub controller: Controller,
    pub bus: Arc<EventBus>,
    pub server: Server,
    pub store: Arc<dyn Persistence>,
}

/// Connect to the active profile's server.
pub async fn open_session(global: &GlobalOpts, mode: Mode) -> Result<Session, CliError> {
    let cfg = load_config()?;
    let (profile_name, profile) = active_profile(&cfg, global)?;
    let server = rustlink_config::profile_to_server(profile, profile_name)?;

    let mut controller_config = rustlink_config::controller_config(&cfg.defaults, Some(profile));
    if mode == Mode::OneShot {
        controller_config.refresh_interval = None;
        controller_config.prime_on_connect = false;
        controller_config.reconnect.max_attempts = 0;
    }

    let transport = WebSocketTransport::new(rustlink_config::connect_timeout(&cfg.defaults));
    let bus = Arc::new(EventBus::new());
    let controller = Controller::new(controller_config, transport, bus.clone());

    tracing::debug!(profile = profile_name, endpoint = %server.endpoint, "opening session");
    controller
        .connect(server.clone())
        .await
        .map_err(|e| match e {
            CoreError::TransportFailure { reason } => CliError::ConnectionFailed {
                endpoint: server.endpoint.to_string(),
                reason,
            },
            other => other.into(),
        })?;

    Ok(Session {
        controller,
        bus,
        server,
        store: open_store(&cfg),
    })
}

impl Session {
    /// Entity manager for this server with persisted state loaded.
    pub fn entities(&self) -> Result<EntityManager<Controller>, CliError> {
        let manager = EntityManager::new(self.controller.clone(), self.server.id.clone())
            .with_store(Arc::clone(&self.store));
        manager.load()?;
        Ok(manager)
    }

    pub async fn close(self) {
        self.controller.disconnect().await;
    }
}

// ── Input ───────────────────────────────────────────────────────────

/// Read a whole file, or stdin when `path` is `None` or `-`.
pub fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(p) if p != Path::new("-") => Ok(std::fs::read_to_string(p)?),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}
