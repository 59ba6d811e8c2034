// ── Request correlation ──
//
// One `Correlator` per session. Sequence numbers are scoped to the
// instance, so a response that arrives after its session was torn down can
// never be matched against a newer session's table.

use std::collections::HashMap;
use std::time::Duration;

use rustlink_api::proto::AppResponse;
use rustlink_api::{PlayerCredentials, Request, TransportHandle, encode_request};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::CoreError;

pub(crate) type Reply = oneshot::Sender<Result<AppResponse, CoreError>>;

/// Who is waiting on a pending request.
#[derive(Debug)]
pub(crate) enum Completion {
    /// A public API caller awaiting the raw response.
    Caller(Reply),
    /// Periodic or priming server-info refresh; result feeds the info watch.
    RefreshInfo,
    /// Priming team-info request; roster seeds the broadcast baseline.
    SeedRoster,
}

impl Completion {
    fn fail(self, err: CoreError) {
        match self {
            Self::Caller(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::RefreshInfo | Self::SeedRoster => {
                debug!(error = %err, "internal request abandoned");
            }
        }
    }
}

#[derive(Debug)]
struct Pending {
    completion: Completion,
    kind: &'static str,
    issued_at: Instant,
}

/// Outcome of routing one inbound response.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// Handed to a waiting caller.
    Delivered,
    /// Belongs to a request the session itself issued.
    Internal(Completion, AppResponse),
    /// No pending request carries this sequence number.
    Unmatched(AppResponse),
}

#[derive(Debug)]
pub(crate) struct Correlator {
    credentials: PlayerCredentials,
    next_seq: u32,
    pending: HashMap<u32, Pending>,
}

impl Correlator {
    pub fn new(credentials: PlayerCredentials) -> Self {
        Self {
            credentials,
            next_seq: 1,
            pending: HashMap::new(),
        }
    }

    fn allocate_seq(&mut self) -> u32 {
        loop {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1).max(1);
            if !self.pending.contains_key(&seq) {
                return seq;
            }
        }
    }

    /// Encode, transmit and register a request.
    ///
    /// On failure the completion is failed with the same error before it is
    /// returned, so a waiting caller always hears back.
    pub fn issue(
        &mut self,
        request: &Request,
        completion: Completion,
        link: &TransportHandle,
    ) -> Result<u32, CoreError> {
        let seq = self.allocate_seq();
        let sent = encode_request(seq, &self.credentials, request)
            .and_then(|frame| link.send(frame))
            .map_err(CoreError::from);

        if let Err(err) = sent {
            completion.fail(err.clone());
            return Err(err);
        }

        trace!(seq, kind = request.kind(), "request issued");
        self.pending.insert(
            seq,
            Pending {
                completion,
                kind: request.kind(),
                issued_at: Instant::now(),
            },
        );
        Ok(seq)
    }

    /// Route an inbound response to whoever issued its sequence number.
    ///
    /// The entry is removed before the completion runs.
    pub fn resolve(&mut self, response: AppResponse) -> Resolution {
        let Some(pending) = self.pending.remove(&response.seq) else {
            return Resolution::Unmatched(response);
        };
        trace!(seq = response.seq, kind = pending.kind, "response matched");
        match pending.completion {
            Completion::Caller(reply) => {
                // Caller may have given up; that is not our problem.
                let _ = reply.send(Ok(response));
                Resolution::Delivered
            }
            internal => Resolution::Internal(internal, response),
        }
    }

    /// Fail every pending request with `err`, leaving the table empty.
    pub fn fail_all(&mut self, err: &CoreError) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.completion.fail(err.clone());
        }
        if count > 0 {
            debug!(count, error = %err, "failed pending requests");
        }
        count
    }

    /// Fail requests issued more than `timeout` before `now`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.issued_at) >= timeout)
            .map(|(seq, _)| *seq)
            .collect();

        for seq in &expired {
            if let Some(pending) = self.pending.remove(seq) {
                debug!(seq, kind = pending.kind, "request timed out");
                pending.completion.fail(CoreError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
