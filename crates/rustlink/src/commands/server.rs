//! Server command handlers.

use std::sync::Arc;

use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use rustlink_core::{DomainEvent, EntityManager, GameTime, ServerInfo, TeamMember, TeamMessage};

use crate::cli::{GlobalOpts, OutputFormat, ServerArgs, ServerCommand};
use crate::error::CliError;
use crate::output;

use super::util::{self, Mode};

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "Steam ID")]
    steam_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Alive")]
    alive: String,
    #[tabled(rename = "Position")]
    position: String,
}

impl From<&TeamMember> for MemberRow {
    fn from(m: &TeamMember) -> Self {
        Self {
            steam_id: m.steam_id.clone(),
            name: m.name.clone(),
            online: if m.is_online { "yes" } else { "no" }.into(),
            alive: if m.is_alive { "yes" } else { "no" }.into(),
            position: format!("{:.0}, {:.0}", m.x, m.y),
        }
    }
}

#[derive(Tabled)]
struct MessageRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "From")]
    name: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&TeamMessage> for MessageRow {
    fn from(m: &TeamMessage) -> Self {
        let time = chrono::DateTime::from_timestamp(i64::from(m.time), 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        Self {
            time,
            name: m.name.clone(),
            message: m.message.clone(),
        }
    }
}

fn info_detail(info: &ServerInfo) -> String {
    let mut pairs = vec![
        ("Name", info.name.clone()),
        ("Map", format!("{} ({})", info.map, info.map_size)),
        (
            "Players",
            format!("{}/{}", info.players, info.max_players),
        ),
        ("Queued", info.queued_players.to_string()),
    ];
    if let Some(wiped) = chrono::DateTime::from_timestamp(i64::from(info.wipe_time), 0) {
        pairs.push(("Wiped", wiped.format("%Y-%m-%d %H:%M UTC").to_string()));
    }
    if !info.url.is_empty() {
        pairs.push(("URL", info.url.clone()));
    }
    output::detail(&pairs)
}

fn time_detail(time: &GameTime) -> String {
    output::detail(&[
        ("Time", time.clock()),
        (
            "Phase",
            if time.is_daytime() { "day" } else { "night" }.into(),
        ),
        (
            "Sunrise/Sunset",
            format!("{:.2} / {:.2}", time.sunrise, time.sunset),
        ),
    ])
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ServerArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let ServerCommand::Watch { no_entities } = args.command {
        return watch(global, no_entities).await;
    }

    let session = util::open_session(global, Mode::OneShot).await?;
    let result = run_oneshot(&session, args.command, global).await;
    session.close().await;
    result
}

async fn run_oneshot(
    session: &util::Session,
    command: ServerCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = &session.controller;
    match command {
        ServerCommand::Info => {
            let info = controller.get_server_info().await?;
            let out = output::render_single(&global.output, &info, info_detail);
            output::print_output(&out, global.quiet);
        }

        ServerCommand::Time => {
            let time = controller.get_time().await?;
            let out = output::render_single(&global.output, &time, time_detail);
            output::print_output(&out, global.quiet);
        }

        ServerCommand::Team => {
            let team = controller.get_team_info().await?;
            let out = match global.output {
                OutputFormat::Plain => {
                    output::render_list(&global.output, &team.members, |m| MemberRow::from(m))
                }
                _ => output::render_single(&global.output, &team, |_| String::new()),
            };
            output::print_output(&out, global.quiet);
        }

        ServerCommand::Messages => {
            let messages = controller.get_team_chat().await?;
            let out = output::render_list(&global.output, &messages, |m| MessageRow::from(m));
            output::print_output(&out, global.quiet);
        }

        ServerCommand::Chat { message } => {
            let text = message.join(" ");
            controller.send_team_message(text).await?;
            if !global.quiet {
                eprintln!("Message sent");
            }
        }

        ServerCommand::Watch { .. } => unreachable!("watch is handled before connecting"),
    }
    Ok(())
}

// ── Watch ───────────────────────────────────────────────────────────

/// Stream status transitions and domain events until Ctrl-C.
async fn watch(global: &GlobalOpts, no_entities: bool) -> Result<(), CliError> {
    let session = util::open_session(global, Mode::Watch).await?;
    let color = output::should_color(&global.color);
    let cancel = CancellationToken::new();

    let follower = if no_entities {
        None
    } else {
        let manager = Arc::new(session.entities()?);
        manager.mark_online().await;
        let events = session.bus.subscribe();
        let status = session.controller.status();
        let cancel = cancel.clone();
        let task_manager = Arc::clone(&manager);
        Some((
            manager,
            tokio::spawn(async move { task_manager.follow(events, status, cancel).await }),
        ))
    };

    if !global.quiet {
        eprintln!(
            "Watching {} ({}), Ctrl-C to stop",
            session.server.name, session.server.endpoint
        );
    }

    let mut events = session.bus.subscribe();
    let mut status = session.controller.status();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if !global.quiet {
                    let state = output::paint_state(current.state, color);
                    match current.message {
                        Some(msg) => eprintln!("status: {state} ({msg})"),
                        None => eprintln!("status: {state}"),
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event, &global.output, global.quiet, color),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    if let Some((manager, task)) = follower {
        let _ = task.await;
        finish_entities(&manager);
    }
    session.close().await;
    Ok(())
}

/// One event per line in the chosen format.
pub(crate) fn print_event(event: &DomainEvent, format: &OutputFormat, quiet: bool, color: bool) {
    let line = match format {
        OutputFormat::Plain => output::paint_event(event, color),
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event).trim_end()),
    };
    output::print_output(&line, quiet);
}

fn finish_entities<C: rustlink_core::EntityControl>(manager: &EntityManager<C>) {
    if let Err(e) = manager.save() {
        tracing::warn!(error = %e, "failed to save entity state");
    }
}
