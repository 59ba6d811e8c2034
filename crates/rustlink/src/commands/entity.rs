//! Entity command handlers.

use tabled::Tabled;

use rustlink_api::Endpoint;
use rustlink_core::store::{entities_key, load_as};
use rustlink_core::{Entity, EntityInfo, EntityValue};

use crate::cli::{EntityArgs, EntityCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, Mode};

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Subscribed")]
    subscribed: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&Entity> for EntityRow {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.entity_id,
            name: e.name.clone(),
            kind: e.entity_type.label().into(),
            value: e
                .last_value
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            subscribed: if e.subscribed { "yes" } else { "no" }.into(),
            updated: e.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn info_detail(entity_id: u32, info: &EntityInfo) -> String {
    let mut pairs = vec![
        ("ID", entity_id.to_string()),
        ("Type", info.entity_type.label().into()),
        ("Value", info.value.to_string()),
    ];
    if let Some(capacity) = info.capacity {
        pairs.push(("Capacity", capacity.to_string()));
    }
    if let Some(protected) = info.has_protection {
        pairs.push(("Protected", if protected { "yes" } else { "no" }.into()));
    }
    if !info.items.is_empty() {
        let kinds = info.items.len();
        pairs.push(("Item stacks", kinds.to_string()));
    }
    output::detail(&pairs)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: EntityArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let EntityCommand::List = args.command {
        return list(global);
    }

    let session = util::open_session(global, Mode::OneShot).await?;
    let result = run(&session, args.command, global).await;
    session.close().await;
    result
}

/// Tracked entities straight from local state; no connection needed.
fn list(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = util::load_config()?;
    let (_, profile) = util::active_profile(&cfg, global)?;
    let server_id = Endpoint::new(profile.host.trim(), profile.port).to_string();
    let store = util::open_store(&cfg);

    let entities: Vec<Entity> =
        load_as(store.as_ref(), &entities_key(&server_id))?.unwrap_or_default();
    let out = output::render_list(&global.output, &entities, |e| EntityRow::from(e));
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn run(
    session: &util::Session,
    command: EntityCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let manager = session.entities()?;
    let say = |msg: String| {
        if !global.quiet {
            eprintln!("{msg}");
        }
    };

    match command {
        EntityCommand::Info { id } => {
            let info = manager.get_info(id).await?;
            let out = output::render_single(&global.output, &info, |i| info_detail(id, i));
            output::print_output(&out, global.quiet);
            manager.save()?;
        }

        EntityCommand::Set { id, state } => {
            manager.set_value(id, state.as_bool()).await?;
            say(format!("Entity {id} switched {}", EntityValue::Flag(state.as_bool())));
        }

        EntityCommand::Toggle { id } => {
            let now = manager.toggle(id).await?;
            say(format!("Entity {id} switched {}", EntityValue::Flag(now)));
        }

        EntityCommand::Track {
            id,
            name,
            subscribe,
        } => {
            let entity = manager.track(id, name).await?;
            if subscribe {
                manager.subscribe(id).await?;
            }
            let out = output::render_single(&global.output, &entity, |e| {
                format!("Tracking {} ({}, #{})", e.name, e.entity_type, e.entity_id)
            });
            output::print_output(&out, global.quiet);
        }

        EntityCommand::Untrack { id } => {
            let entity = manager.remove(id).await?;
            say(format!("Stopped tracking {} (#{id})", entity.name));
        }

        EntityCommand::Subscribe { id } => {
            manager.subscribe(id).await?;
            say(format!("Entity {id} will be followed by `server watch`"));
        }

        EntityCommand::Unsubscribe { id } => {
            manager.unsubscribe(id).await?;
            say(format!("Entity {id} unsubscribed"));
        }

        EntityCommand::Refresh => {
            let total = manager.list().len();
            let refreshed = manager.refresh_all().await;
            let entities = manager.list();
            let out = output::render_list(&global.output, &entities, |e| EntityRow::from(e));
            output::print_output(&out, global.quiet);
            say(format!("Refreshed {refreshed}/{total} entities"));
        }

        EntityCommand::List => unreachable!("list is served from local state"),
    }
    Ok(())
}
