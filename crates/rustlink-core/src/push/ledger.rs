// ── Dedup ledger ──
//
// Monotonic timestamp gate plus a bounded memory of recent persistent ids.
// Two envelopes sent at the same timestamp are duplicates even when their
// content differs.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::envelope::PushEnvelope;

pub const KNOWN_ID_CAPACITY: usize = 1024;

/// Persisted form of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub high_water_mark: Option<i64>,
    #[serde(default)]
    pub known_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DedupLedger {
    high_water_mark: Option<i64>,
    known_ids: IndexSet<String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high_water_mark(&self) -> Option<i64> {
        self.high_water_mark
    }

    /// Gate one delivery. On acceptance the high-water mark advances to the
    /// envelope's timestamp.
    pub fn accept(&mut self, envelope: &PushEnvelope) -> bool {
        let Some(sent) = envelope.sent_timestamp() else {
            debug!(sent = %envelope.sent, "push rejected: unparseable timestamp");
            return false;
        };

        if !envelope.persistent_id.is_empty() && self.known_ids.contains(&envelope.persistent_id) {
            debug!(id = %envelope.persistent_id, "push rejected: replayed id");
            return false;
        }

        // An empty ledger gates at zero.
        let mark = self.high_water_mark.unwrap_or(0);
        if sent <= mark {
            debug!(sent, mark, "push rejected: stale timestamp");
            return false;
        }

        self.high_water_mark = Some(sent);
        if !envelope.persistent_id.is_empty() {
            self.remember(envelope.persistent_id.clone());
        }
        true
    }

    fn remember(&mut self, id: String) {
        self.known_ids.insert(id);
        while self.known_ids.len() > KNOWN_ID_CAPACITY {
            self.known_ids.shift_remove_index(0);
        }
    }

    pub fn state(&self) -> LedgerState {
        LedgerState {
            high_water_mark: self.high_water_mark,
            known_ids: self.known_ids.iter().cloned().collect(),
        }
    }

    pub fn restore(state: LedgerState) -> Self {
        let mut ledger = Self {
            high_water_mark: state.high_water_mark,
            known_ids: IndexSet::with_capacity(state.known_ids.len()),
        };
        for id in state.known_ids {
            ledger.remember(id);
        }
        ledger
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(sent: &str) -> PushEnvelope {
        PushEnvelope::new("", sent)
    }

    #[test]
    fn monotonic_gate() {
        let mut ledger = DedupLedger::new();
        let accepted: Vec<bool> = ["100", "100", "99", "101"]
            .into_iter()
            .map(|ts| ledger.accept(&at(ts)))
            .collect();
        assert_eq!(accepted, vec![true, false, false, true]);
        assert_eq!(ledger.high_water_mark(), Some(101));
    }

    #[test]
    fn fresh_ledger_rejects_zero_and_negative_timestamps() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.accept(&at("0")));
        assert!(!ledger.accept(&at("-5")));
        assert!(!ledger.accept(&at("-3")));
        assert_eq!(ledger.high_water_mark(), None);
        assert!(ledger.accept(&at("1")));
    }

    #[test]
    fn unparseable_timestamp_is_rejected_without_moving_the_mark() {
        let mut ledger = DedupLedger::new();
        assert!(ledger.accept(&at("10")));
        assert!(!ledger.accept(&at("")));
        assert!(!ledger.accept(&at("1e9")));
        assert_eq!(ledger.high_water_mark(), Some(10));
    }

    #[test]
    fn replayed_id_is_rejected_even_with_newer_timestamp() {
        let mut ledger = DedupLedger::new();
        assert!(ledger.accept(&PushEnvelope::new("0:a", "1")));
        assert!(!ledger.accept(&PushEnvelope::new("0:a", "2")));
        assert!(ledger.accept(&PushEnvelope::new("0:b", "3")));
    }

    #[test]
    fn known_ids_are_bounded() {
        let mut ledger = DedupLedger::new();
        for i in 0..(KNOWN_ID_CAPACITY + 10) {
            let sent = i64::try_from(i).unwrap() + 1;
            assert!(ledger.accept(&PushEnvelope::new(format!("id-{i}"), sent.to_string())));
        }
        let state = ledger.state();
        assert_eq!(state.known_ids.len(), KNOWN_ID_CAPACITY);
        assert_eq!(state.known_ids[0], "id-10");
    }

    #[test]
    fn state_survives_restore() {
        let mut ledger = DedupLedger::new();
        ledger.accept(&PushEnvelope::new("0:a", "500"));

        let json = serde_json::to_value(ledger.state()).unwrap();
        let mut restored = DedupLedger::restore(serde_json::from_value(json).unwrap());

        assert!(!restored.accept(&PushEnvelope::new("0:b", "500")));
        assert!(!restored.accept(&PushEnvelope::new("0:a", "600")));
        assert!(restored.accept(&PushEnvelope::new("0:c", "501")));
    }
}
