//! Clap derive structures for the `rustlink` CLI.

use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, Parser, Subcommand, ValueEnum};
use rustlink_config::Defaults;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rustlink -- Rust+ companion client for the terminal
#[derive(Debug, Parser)]
#[command(
    name = "rustlink",
    version,
    about = "Talk to Rust+ game servers from the command line",
    long_about = "Companion client for Rust+ game servers.\n\n\
        Queries server and team state, switches smart devices, streams live\n\
        events and classifies push notifications delivered out of band.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "RUSTLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RUSTLINK_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

impl GlobalOpts {
    /// Take `--output` and `--color` from the config's `[defaults]` when
    /// neither the command line nor the environment set them.
    pub fn apply_config_defaults(&mut self, defaults: &Defaults, matches: &ArgMatches) {
        let defaulted = |id: &str| matches.value_source(id) == Some(ValueSource::DefaultValue);

        if defaulted("output") {
            match <OutputFormat as ValueEnum>::from_str(&defaults.output, true) {
                Ok(format) => self.output = format,
                Err(_) => tracing::warn!(value = %defaults.output, "ignoring unknown defaults.output"),
            }
        }
        if defaulted("color") {
            match <ColorMode as ValueEnum>::from_str(&defaults.color, true) {
                Ok(mode) => self.color = mode,
                Err(_) => tracing::warn!(value = %defaults.color, "ignoring unknown defaults.color"),
            }
        }
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and summaries (default)
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Query the paired server and its team
    #[command(alias = "s")]
    Server(ServerArgs),

    /// Inspect and control smart entities
    #[command(alias = "e")]
    Entity(EntityArgs),

    /// Classify push notifications
    Push(PushArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Server ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ServerArgs {
    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Debug, Subcommand)]
pub enum ServerCommand {
    /// Server name, map and population
    Info,

    /// In-game time of day
    Time,

    /// Team roster
    Team,

    /// Recent team chat
    Messages,

    /// Send a team chat message
    Chat {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Stream live events until interrupted
    Watch {
        /// Don't restore entity subscriptions or follow entity state
        #[arg(long)]
        no_entities: bool,
    },
}

// ── Entity ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    pub command: EntityCommand,
}

#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    /// List tracked entities
    #[command(alias = "ls")]
    List,

    /// Current type and value of an entity
    Info {
        /// Entity id
        id: u32,
    },

    /// Switch a smart switch on or off
    Set {
        /// Entity id
        id: u32,
        /// Desired state
        state: SwitchState,
    },

    /// Flip a smart switch
    Toggle {
        /// Entity id
        id: u32,
    },

    /// Start tracking an entity
    Track {
        /// Entity id
        id: u32,
        /// Display name
        #[arg(long, short = 'n')]
        name: Option<String>,
        /// Subscribe to change broadcasts right away
        #[arg(long)]
        subscribe: bool,
    },

    /// Stop tracking an entity
    #[command(alias = "rm")]
    Untrack {
        /// Entity id
        id: u32,
    },

    /// Subscribe a tracked entity to change broadcasts
    Subscribe {
        /// Entity id
        id: u32,
    },

    /// Cancel a tracked entity's subscription
    Unsubscribe {
        /// Entity id
        id: u32,
    },

    /// Re-read every tracked entity
    Refresh,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_bool(self) -> bool {
        matches!(self, Self::On)
    }
}

// ── Push ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PushArgs {
    #[command(subcommand)]
    pub command: PushCommand,
}

#[derive(Debug, Subcommand)]
pub enum PushCommand {
    /// Classify one envelope (JSON) from a file or stdin
    Classify {
        /// Envelope file; reads stdin when omitted or "-"
        file: Option<PathBuf>,
        /// Classify even if the ledger has seen it
        #[arg(long)]
        no_dedup: bool,
    },

    /// Classify newline-delimited envelopes from stdin until EOF
    Listen {
        /// Classify even if the ledger has seen it
        #[arg(long)]
        no_dedup: bool,
    },

    /// Show or reset the dedup ledger
    Ledger {
        /// Forget every delivery seen so far
        #[arg(long)]
        reset: bool,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add or replace a server profile
    Init {
        /// Server address
        #[arg(long)]
        host: String,
        /// Companion app port
        #[arg(long, default_value = "28082")]
        port: u16,
        /// Steam id of the paired player
        #[arg(long)]
        player_id: String,
        /// Display name for the server
        #[arg(long)]
        name: Option<String>,
        /// Write the token into the config file instead of the keyring
        #[arg(long)]
        plaintext: bool,
    },

    /// Display current resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store the active profile's player token in the system keyring
    SetToken,

    /// Delete a profile and its stored token
    Remove {
        /// Profile name
        name: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    fn resolve(args: &[&str], defaults: &Defaults) -> GlobalOpts {
        let matches = Cli::command().try_get_matches_from(args).unwrap();
        let mut cli = Cli::from_arg_matches(&matches).unwrap();
        cli.global.apply_config_defaults(defaults, &matches);
        cli.global
    }

    fn defaults(output: &str, color: &str) -> Defaults {
        Defaults {
            output: output.into(),
            color: color.into(),
            ..Defaults::default()
        }
    }

    #[test]
    fn config_defaults_fill_unset_flags() {
        let global = resolve(&["rustlink", "push", "ledger"], &defaults("json", "never"));
        assert!(matches!(global.output, OutputFormat::Json));
        assert!(matches!(global.color, ColorMode::Never));
    }

    #[test]
    fn explicit_flags_beat_config_defaults() {
        let global = resolve(
            &["rustlink", "push", "ledger", "-o", "yaml", "--color", "always"],
            &defaults("json", "never"),
        );
        assert!(matches!(global.output, OutputFormat::Yaml));
        assert!(matches!(global.color, ColorMode::Always));
    }

    #[test]
    fn unknown_config_values_keep_builtin_defaults() {
        let global = resolve(&["rustlink", "push", "ledger"], &defaults("xml", "sometimes"));
        assert!(matches!(global.output, OutputFormat::Plain));
        assert!(matches!(global.color, ColorMode::Auto));
    }
}
