//! Push notification handlers.
//!
//! These never touch a game server: envelopes come from a file or stdin,
//! so they work before any profile is configured.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rustlink_core::push::LedgerState;
use rustlink_core::store::{LEDGER_KEY, load_as};
use rustlink_core::{
    CollectingSink, DomainEvent, EventBus, EventSink, PushEnvelope, PushPipeline,
};

use crate::cli::{GlobalOpts, PushArgs, PushCommand};
use crate::error::CliError;
use crate::output;

use super::server::print_event;
use super::util;

const DELIVERY_QUEUE: usize = 64;

pub async fn handle(args: PushArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        PushCommand::Classify { file, no_dedup } => classify(file.as_deref(), no_dedup, global),
        PushCommand::Listen { no_dedup } => listen(no_dedup, global).await,
        PushCommand::Ledger { reset } => ledger(reset, global),
    }
}

fn pipeline(sink: Arc<dyn EventSink>, no_dedup: bool) -> Result<PushPipeline, CliError> {
    let cfg = rustlink_config::load_config_or_default();
    let pipeline = PushPipeline::new(sink).with_store(util::open_store(&cfg));
    if no_dedup {
        return Ok(pipeline.without_dedup());
    }
    pipeline.load()?;
    Ok(pipeline)
}

// ── Classify ────────────────────────────────────────────────────────

fn classify(
    file: Option<&Path>,
    no_dedup: bool,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let raw = util::read_input(file)?;
    let envelope: PushEnvelope = serde_json::from_str(&raw)?;

    let pipeline = pipeline(Arc::new(CollectingSink::new()), no_dedup)?;
    match pipeline.deliver(&envelope) {
        Some(event) => {
            let color = output::should_color(&global.color);
            let out = output::render_single(&global.output, &event, |e: &DomainEvent| {
                output::paint_event(e, color)
            });
            output::print_output(&out, global.quiet);
        }
        None => {
            if !global.quiet {
                eprintln!(
                    "skipped: {} already seen (sent {})",
                    envelope.persistent_id, envelope.sent
                );
            }
        }
    }
    Ok(())
}

// ── Listen ──────────────────────────────────────────────────────────

/// One envelope per stdin line until EOF or Ctrl-C.
async fn listen(no_dedup: bool, global: &GlobalOpts) -> Result<(), CliError> {
    let bus = Arc::new(EventBus::new());
    let pipeline = pipeline(bus.clone(), no_dedup)?;
    let color = output::should_color(&global.color);
    let cancel = CancellationToken::new();

    let mut events = bus.subscribe();
    let printer = {
        let quiet = global.quiet;
        let format = global.output.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => print_event(&event, &format, quiet, color),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    let (tx, rx) = mpsc::channel(DELIVERY_QUEUE);
    // Plain thread: a pending stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || read_envelopes(&tx));

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let published = pipeline.run(rx, cancel).await;

    // Closing the bus ends the printer once it has drained.
    drop(pipeline);
    drop(bus);
    let _ = printer.await;

    if !global.quiet {
        eprintln!("{published} notification(s) classified");
    }
    Ok(())
}

fn read_envelopes(tx: &mpsc::Sender<PushEnvelope>) {
    for (idx, line) in std::io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PushEnvelope>(&line) {
            Ok(envelope) => {
                if tx.blocking_send(envelope).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(line = idx + 1, error = %e, "skipping malformed envelope"),
        }
    }
}

// ── Ledger ──────────────────────────────────────────────────────────

fn ledger(reset: bool, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = rustlink_config::load_config_or_default();
    let store = util::open_store(&cfg);

    if reset {
        store.remove(LEDGER_KEY)?;
        if !global.quiet {
            eprintln!("Push ledger cleared");
        }
        return Ok(());
    }

    let state: LedgerState = load_as(store.as_ref(), LEDGER_KEY)?.unwrap_or_default();
    let out = output::render_single(&global.output, &state, |s| {
        let mark = s
            .high_water_mark
            .map_or_else(|| "none".to_string(), |m| m.to_string());
        let latest = s.known_ids.last().cloned().unwrap_or_else(|| "-".into());
        output::detail(&[
            ("High-water mark", mark),
            ("Known ids", s.known_ids.len().to_string()),
            ("Latest id", latest),
        ])
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
