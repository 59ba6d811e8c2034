//! Config subcommand handlers.

use secrecy::{ExposeSecret, SecretString};

use rustlink_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Helpers ─────────────────────────────────────────────────────────

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_token() -> Result<SecretString, CliError> {
    let token = rpassword::prompt_password("Player token: ").map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "player_token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(SecretString::from(token.trim().to_string()))
}

/// Copy of the config with plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.player_token.is_some() {
            profile.player_token = Some("********".into());
        }
    }
    cfg
}

fn not_found(name: String, cfg: &Config) -> CliError {
    CliError::ProfileNotFound {
        name,
        available: util::available_profiles(cfg),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init {
            host,
            port,
            player_id,
            name,
            plaintext,
        } => {
            let mut cfg = rustlink_config::load_config_or_default();
            let profile_name = global.profile.clone().unwrap_or_else(|| "default".into());

            let token = prompt_token()?;
            let player_token = if plaintext {
                Some(token.expose_secret().to_string())
            } else {
                rustlink_config::store_player_token(&profile_name, &token)?;
                eprintln!("Player token stored in system keyring");
                None
            };

            let profile = Profile {
                name,
                host,
                port,
                player_id,
                player_token,
                player_token_env: None,
                refresh_interval: None,
                request_timeout: None,
            };
            // Fail before writing anything unusable.
            rustlink_config::profile_to_server(&profile, &profile_name)?;

            cfg.profiles.insert(profile_name.clone(), profile);
            if cfg
                .default_profile
                .as_ref()
                .is_none_or(|d| !cfg.profiles.contains_key(d))
            {
                cfg.default_profile = Some(profile_name.clone());
            }
            rustlink_config::save_config(&cfg)?;

            let path = rustlink_config::config_path();
            eprintln!("Profile '{profile_name}' written to {}", path.display());
            eprintln!("Test it: rustlink server info -p {profile_name}");
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&util::load_config()?);
            let out = output::render_single(&global.output, &cfg, |c| format!("{c:#?}"));
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = rustlink_config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: rustlink config init");
            } else {
                for (name, profile) in &cfg.profiles {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}  {}:{}", profile.host, profile.port);
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = rustlink_config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(not_found(name, &cfg));
            }
            cfg.default_profile = Some(name.clone());
            rustlink_config::save_config(&cfg)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetToken => {
            let cfg = rustlink_config::load_config_or_default();
            let (profile_name, _) = util::active_profile(&cfg, global)?;
            let token = prompt_token()?;
            rustlink_config::store_player_token(profile_name, &token)?;
            eprintln!("Player token stored in system keyring for profile '{profile_name}'");
            Ok(())
        }

        ConfigCommand::Remove { name } => {
            let mut cfg = rustlink_config::load_config_or_default();
            if cfg.profiles.remove(&name).is_none() {
                return Err(not_found(name, &cfg));
            }
            if cfg.default_profile.as_deref() == Some(name.as_str()) {
                cfg.default_profile = cfg.profiles.keys().next().cloned();
            }
            if let Err(e) = rustlink_config::delete_player_token(&name) {
                tracing::warn!(profile = %name, error = %e, "could not delete keyring token");
            }
            rustlink_config::save_config(&cfg)?;
            eprintln!("Removed profile '{name}'");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "main".into(),
            Profile {
                name: None,
                host: "10.0.0.1".into(),
                port: 28082,
                player_id: "7656".into(),
                player_token: Some("-123".into()),
                player_token_env: None,
                refresh_interval: None,
                request_timeout: None,
            },
        );
        let shown = redacted(&cfg);
        assert_eq!(
            shown.profiles["main"].player_token.as_deref(),
            Some("********")
        );
        assert!(!format!("{shown:?}").contains("-123"));
    }
}
