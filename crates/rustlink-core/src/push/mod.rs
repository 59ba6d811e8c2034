// ── Push pipeline ──
//
// Out-of-band notifications, independent of the live session:
// dedup gate → ledger persistence → classification → event sink.

pub mod classifier;
pub mod envelope;
pub mod ledger;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use classifier::{ALARM_CHANNEL, DEATH_CHANNEL, Rule, classify};
pub use envelope::{AppDataEntry, PushEnvelope};
pub use ledger::{DedupLedger, LedgerState};

use crate::error::CoreError;
use crate::model::DomainEvent;
use crate::sink::EventSink;
use crate::store::{LEDGER_KEY, Persistence, load_as, save_as};

pub struct PushPipeline {
    ledger: Mutex<DedupLedger>,
    sink: Arc<dyn EventSink>,
    store: Option<Arc<dyn Persistence>>,
    dedup: bool,
}

impl PushPipeline {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            ledger: Mutex::new(DedupLedger::new()),
            sink,
            store: None,
            dedup: true,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = Some(store);
        self
    }

    /// Classify every delivery, skipping the ledger entirely.
    pub fn without_dedup(mut self) -> Self {
        self.dedup = false;
        self
    }

    /// Restore ledger state from the store, if any was saved.
    pub fn load(&self) -> Result<(), CoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(state) = load_as::<LedgerState>(store.as_ref(), LEDGER_KEY)? {
            debug!(mark = ?state.high_water_mark, ids = state.known_ids.len(), "push ledger loaded");
            *self.ledger() = DedupLedger::restore(state);
        }
        Ok(())
    }

    pub fn high_water_mark(&self) -> Option<i64> {
        self.ledger().high_water_mark()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, DedupLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Process one delivery. Returns the published event, or `None` when the
    /// ledger rejected it as stale or replayed.
    pub fn deliver(&self, envelope: &PushEnvelope) -> Option<DomainEvent> {
        if self.dedup {
            let state = {
                let mut ledger = self.ledger();
                if !ledger.accept(envelope) {
                    return None;
                }
                ledger.state()
            };
            if let Some(store) = &self.store {
                if let Err(e) = save_as(store.as_ref(), LEDGER_KEY, &state) {
                    warn!(error = %e, "failed to persist push ledger");
                }
            }
        }

        let (rule, event) = classify(envelope);
        info!(id = %envelope.persistent_id, %rule, kind = event.kind(), "push classified");
        self.sink.publish(event.clone());
        Some(event)
    }

    /// Drain deliveries until the channel closes or `cancel` fires.
    /// Returns how many events were published.
    pub async fn run(
        &self,
        mut deliveries: mpsc::Receiver<PushEnvelope>,
        cancel: CancellationToken,
    ) -> usize {
        let mut published = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = deliveries.recv() => match next {
                    Some(envelope) => {
                        if self.deliver(&envelope).is_some() {
                            published += 1;
                        }
                    }
                    None => break,
                },
            }
        }
        published
    }
}
