// Transport seam between the session logic and the socket.
//
// A `Transport` opens a bidirectional binary link and hands back a
// `TransportHandle`. The handle is channel-backed so the same shape serves
// the real WebSocket pump and in-memory doubles in tests.

use std::future::Future;
use std::net::IpAddr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// Protocol version the game server expects in the `v` query parameter.
pub const DEFAULT_PROTOCOL_VERSION: u64 = 1_601_585_622_782;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Network address of a game server's companion port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build the `ws://host:port/?v=<version>` URL for this endpoint.
    pub fn url(&self, protocol_version: u64) -> Result<Url, Error> {
        let host = self.host.trim();
        let host = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
            _ => host.to_owned(),
        };
        let mut url = Url::parse(&format!("ws://{host}:{}/", self.port))?;
        url.query_pairs_mut()
            .append_pair("v", &protocol_version.to_string());
        Ok(url)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// What a transport reports back to its owner.
///
/// `Closed` and `Failed` are terminal: a handle yields exactly one of
/// them and nothing afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(Bytes),
    Closed { code: Option<u16>, reason: String },
    Failed(String),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Frame(_))
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Owner's side of an open link.
///
/// Dropping the handle cancels the link.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    cancel: CancellationToken,
    terminated: bool,
}

/// The far side of a [`TransportHandle`]: whatever pumps bytes to and
/// from the socket (or a test double) holds this.
#[derive(Debug)]
pub struct RemoteEnd {
    pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub cancel: CancellationToken,
}

impl TransportHandle {
    /// Create a connected handle/remote pair.
    pub fn pair() -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = Self {
            outbound: out_tx,
            events: ev_rx,
            cancel: cancel.clone(),
            terminated: false,
        };
        let remote = RemoteEnd {
            outbound: out_rx,
            events: ev_tx,
            cancel,
        };
        (handle, remote)
    }

    /// Queue a binary frame for transmission.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), Error> {
        if self.terminated || self.cancel.is_cancelled() {
            return Err(Error::NotConnected);
        }
        self.outbound.send(frame).map_err(|_| Error::NotConnected)
    }

    /// Next inbound event.
    ///
    /// Yields exactly one terminal event over the handle's lifetime. If the
    /// remote side vanishes without reporting, a `Closed` is synthesized.
    /// Returns `None` once the terminal event has been delivered.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.terminated {
            return None;
        }
        let event = match self.events.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed {
                code: None,
                reason: "transport dropped".into(),
            },
        };
        if event.is_terminal() {
            self.terminated = true;
        }
        Some(event)
    }

    /// Ask the remote side to close. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Transport trait ──────────────────────────────────────────────────

/// Opens links to a game server.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, url: &Url) -> impl Future<Output = Result<TransportHandle, Error>> + Send;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn endpoint_url_carries_protocol_version() {
        let url = Endpoint::new("203.0.113.7", 28082)
            .url(DEFAULT_PROTOCOL_VERSION)
            .unwrap();
        assert_eq!(url.as_str(), "ws://203.0.113.7:28082/?v=1601585622782");
    }

    #[test]
    fn endpoint_url_brackets_ipv6() {
        let url = Endpoint::new("::1", 28082).url(1).unwrap();
        assert_eq!(url.host_str(), Some("[::1]"));
        assert_eq!(url.port(), Some(28082));
    }

    #[test]
    fn endpoint_rejects_garbage_host() {
        let err = Endpoint::new("bad host/", 1).url(1).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn frames_then_single_terminal_event() {
        let (mut handle, remote) = TransportHandle::pair();
        remote
            .events
            .send(TransportEvent::Frame(Bytes::from_static(b"a")))
            .unwrap();
        remote
            .events
            .send(TransportEvent::Failed("reset".into()))
            .unwrap();
        remote
            .events
            .send(TransportEvent::Closed {
                code: Some(1000),
                reason: String::new(),
            })
            .unwrap();

        assert_eq!(
            handle.next_event().await,
            Some(TransportEvent::Frame(Bytes::from_static(b"a")))
        );
        assert_eq!(
            handle.next_event().await,
            Some(TransportEvent::Failed("reset".into()))
        );
        assert_eq!(handle.next_event().await, None);
        assert!(handle.send(vec![1]).is_err());
    }

    #[tokio::test]
    async fn dropped_remote_synthesizes_close() {
        let (mut handle, remote) = TransportHandle::pair();
        drop(remote);

        let event = handle.next_event().await.unwrap();
        assert!(matches!(event, TransportEvent::Closed { code: None, .. }));
        assert_eq!(handle.next_event().await, None);
    }

    #[test]
    fn send_reaches_remote_and_drop_cancels() {
        let (handle, mut remote) = TransportHandle::pair();
        handle.send(vec![1, 2, 3]).unwrap();
        assert_eq!(remote.outbound.try_recv().unwrap(), vec![1, 2, 3]);

        drop(handle);
        assert!(remote.cancel.is_cancelled());
    }
}
