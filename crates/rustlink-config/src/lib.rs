//! Shared configuration for the rustlink binary.
//!
//! TOML server profiles, player-token resolution (env + keyring +
//! plaintext), and translation to `rustlink_core::{Server, ControllerConfig}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use rustlink_api::{DEFAULT_PROTOCOL_VERSION, Endpoint, PlayerCredentials};
use rustlink_core::{ControllerConfig, ReconnectConfig, Server};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KEYRING_SERVICE: &str = "rustlink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no player token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Paired servers by profile name.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Reconnect attempts after a dropped session.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Base reconnect delay in seconds; attempt `k` waits `k` times this.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    /// Server-info refresh period in seconds, `0` to disable.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Per-request timeout in seconds, `0` to wait for the link instead.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: u64,

    /// Where entity lists and the push ledger are kept.
    pub data_dir: Option<PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay: default_reconnect_delay(),
            refresh_interval: default_refresh_interval(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            protocol_version: default_protocol_version(),
            data_dir: None,
        }
    }
}

fn default_output() -> String {
    "plain".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_refresh_interval() -> u64 {
    30
}
fn default_request_timeout() -> u64 {
    15
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_protocol_version() -> u64 {
    DEFAULT_PROTOCOL_VERSION
}

/// A paired game server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Display name; defaults to the profile name.
    pub name: Option<String>,

    /// Server address as delivered in the pairing notification.
    pub host: String,

    /// Companion app port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Steam id of the paired player.
    pub player_id: String,

    /// Player token (plaintext; prefer keyring or env var).
    pub player_token: Option<String>,

    /// Environment variable holding the player token.
    pub player_token_env: Option<String>,

    /// Override refresh interval.
    pub refresh_interval: Option<u64>,

    /// Override request timeout.
    pub request_timeout: Option<u64>,
}

fn default_port() -> u16 {
    28082
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "rustlink", "rustlink")
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("rustlink");
    p
}

/// Config file path: `RUSTLINK_CONFIG`, else the platform config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("RUSTLINK_CONFIG") {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Data directory for persisted state: `RUSTLINK_DATA_DIR`, then the
/// configured `defaults.data_dir`, else the platform data dir.
pub fn data_dir(cfg: &Config) -> PathBuf {
    if let Some(path) = std::env::var_os("RUSTLINK_DATA_DIR") {
        return PathBuf::from(path);
    }
    if let Some(ref dir) = cfg.defaults.data_dir {
        return dir.clone();
    }
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Layered load: defaults, then `path`, then `RUSTLINK_*` variables
/// (`__` separates nesting, e.g. `RUSTLINK_DEFAULTS__OUTPUT`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RUSTLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to pretty TOML at `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Player token ────────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/player-token"),
    )?)
}

/// Resolve the player token: env var, then keyring, then plaintext.
pub fn resolve_player_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's player_token_env → env var lookup
    if let Some(ref env_name) = profile.player_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.player_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

pub fn store_player_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

/// Remove a keyring token; a missing entry is not an error.
pub fn delete_player_token(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to core types ───────────────────────────────────────

/// Build the core `Server` for a profile, resolving its token.
pub fn profile_to_server(profile: &Profile, profile_name: &str) -> Result<Server, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }
    if profile.player_id.parse::<u64>().is_err() {
        return Err(ConfigError::Validation {
            field: "player_id".into(),
            reason: format!("expected a numeric Steam id, got '{}'", profile.player_id),
        });
    }

    let token = resolve_player_token(profile, profile_name)?;
    let name = profile.name.clone().unwrap_or_else(|| profile_name.into());

    Ok(Server::new(
        name,
        Endpoint::new(profile.host.trim(), profile.port),
        PlayerCredentials::new(profile.player_id.clone(), token.expose_secret()),
    ))
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Session tuning from global defaults plus per-profile overrides.
pub fn controller_config(defaults: &Defaults, profile: Option<&Profile>) -> ControllerConfig {
    let refresh = profile
        .and_then(|p| p.refresh_interval)
        .unwrap_or(defaults.refresh_interval);
    let timeout = profile
        .and_then(|p| p.request_timeout)
        .unwrap_or(defaults.request_timeout);

    ControllerConfig {
        protocol_version: defaults.protocol_version,
        reconnect: ReconnectConfig {
            base_delay: Duration::from_secs(defaults.reconnect_delay),
            max_attempts: defaults.reconnect_attempts,
        },
        refresh_interval: seconds(refresh),
        request_timeout: seconds(timeout),
        prime_on_connect: true,
    }
}

pub fn connect_timeout(defaults: &Defaults) -> Duration {
    Duration::from_secs(defaults.connect_timeout.max(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"
reconnect_attempts = 3
refresh_interval = 0

[profiles.home]
name = "Rustopia EU"
host = "203.0.113.7"
port = 28083
player_id = "76561198000000000"
player_token = "-12345"
player_token_env = "RUSTLINK_TEST_TOKEN_THAT_IS_NOT_SET"
"#;

    fn sample() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = load_config_from(&path).unwrap();
        (dir, cfg)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert_eq!(cfg.defaults.reconnect_delay, 5);
        assert_eq!(cfg.defaults.request_timeout, 15);
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn file_overrides_defaults_field_by_field() {
        let (_dir, cfg) = sample();
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.reconnect_attempts, 3);
        assert_eq!(cfg.defaults.connect_timeout, 10);

        let (name, profile) = cfg.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(profile.port, 28083);
    }

    #[test]
    fn unknown_profile_is_reported() {
        let (_dir, cfg) = sample();
        assert!(matches!(
            cfg.profile(Some("work")),
            Err(ConfigError::UnknownProfile { ref name }) if name == "work"
        ));
    }

    #[test]
    fn profile_becomes_server() {
        let (_dir, cfg) = sample();
        let (name, profile) = cfg.profile(None).unwrap();
        let server = profile_to_server(profile, name).unwrap();

        assert_eq!(server.id, "203.0.113.7:28083");
        assert_eq!(server.name, "Rustopia EU");
        assert_eq!(server.credentials.player_id, "76561198000000000");
    }

    #[test]
    fn bad_player_id_is_a_validation_error() {
        let profile = Profile {
            name: None,
            host: "h".into(),
            port: 1,
            player_id: "steam".into(),
            player_token: Some("1".into()),
            player_token_env: None,
            refresh_interval: None,
            request_timeout: None,
        };
        assert!(matches!(
            profile_to_server(&profile, "x"),
            Err(ConfigError::Validation { ref field, .. }) if field == "player_id"
        ));
    }

    #[test]
    fn zero_disables_timers() {
        let (_dir, cfg) = sample();
        let (_, profile) = cfg.profile(None).unwrap();
        let cc = controller_config(&cfg.defaults, Some(profile));

        assert_eq!(cc.refresh_interval, None);
        assert_eq!(cc.request_timeout, Some(Duration::from_secs(15)));
        assert_eq!(cc.reconnect.max_attempts, 3);
        assert_eq!(cc.reconnect.delay_for(2), Duration::from_secs(10));
    }

    #[test]
    fn save_round_trips_through_toml() {
        let (dir, mut cfg) = sample();
        cfg.defaults.output = "yaml".into();
        let path = dir.path().join("nested").join("out.toml");
        save_config_to(&cfg, &path).unwrap();

        let back = load_config_from(&path).unwrap();
        assert_eq!(back.defaults.output, "yaml");
        assert_eq!(back.profiles["home"].host, "203.0.113.7");
    }

    #[test]
    fn data_dir_prefers_configured_path() {
        let mut cfg = Config::default();
        cfg.defaults.data_dir = Some(PathBuf::from("/srv/rustlink"));
        if std::env::var_os("RUSTLINK_DATA_DIR").is_none() {
            assert_eq!(data_dir(&cfg), PathBuf::from("/srv/rustlink"));
        }
    }
}
