// In-memory transport double for session tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use prost::Message;
use rustlink_api::proto::{AppBroadcast, AppMessage, AppRequest, AppResponse};
use rustlink_api::transport::RemoteEnd;
use rustlink_api::{Error, Transport, TransportEvent, TransportHandle};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Default)]
struct Shared {
    opens: Mutex<Vec<Instant>>,
    failures_left: AtomicU32,
}

/// `Transport` whose links are driven by the test through `MockPeer`s.
#[derive(Debug, Clone)]
pub(crate) struct MockTransport {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

/// Test-side view of a `MockTransport`.
#[derive(Debug)]
pub(crate) struct MockServer {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedReceiver<MockPeer>,
}

pub(crate) fn mock_transport() -> (MockTransport, MockServer) {
    let shared = Arc::new(Shared::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MockTransport {
            shared: Arc::clone(&shared),
            peers: tx,
        },
        MockServer { shared, peers: rx },
    )
}

impl Transport for MockTransport {
    async fn open(&self, _url: &Url) -> Result<TransportHandle, Error> {
        self.shared.opens.lock().unwrap().push(Instant::now());
        let refused = self
            .shared
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::WebSocketConnect("connection refused".into()));
        }
        let (handle, remote) = TransportHandle::pair();
        let _ = self.peers.send(MockPeer { remote });
        Ok(handle)
    }
}

impl MockServer {
    /// Make the next `n` opens fail.
    pub fn refuse_next(&self, n: u32) {
        self.shared.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.shared.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.lock().unwrap().len()
    }

    pub async fn accept(&mut self) -> MockPeer {
        self.peers.recv().await.expect("transport dropped")
    }
}

/// The server end of one open link.
#[derive(Debug)]
pub(crate) struct MockPeer {
    remote: RemoteEnd,
}

impl MockPeer {
    pub async fn next_request(&mut self) -> AppRequest {
        let frame = self.remote.outbound.recv().await.expect("link closed");
        AppRequest::decode(frame.as_slice()).unwrap()
    }

    fn push(&self, msg: &AppMessage) {
        let _ = self
            .remote
            .events
            .send(TransportEvent::Frame(Bytes::from(msg.encode_to_vec())));
    }

    pub fn respond(&self, response: AppResponse) {
        self.push(&AppMessage {
            response: Some(response),
            broadcast: None,
        });
    }

    pub fn broadcast(&self, broadcast: AppBroadcast) {
        self.push(&AppMessage {
            response: None,
            broadcast: Some(broadcast),
        });
    }

    pub fn send_raw(&self, bytes: &'static [u8]) {
        let _ = self
            .remote
            .events
            .send(TransportEvent::Frame(Bytes::from_static(bytes)));
    }

    pub fn close(&self) {
        let _ = self.remote.events.send(TransportEvent::Closed {
            code: Some(1000),
            reason: "server shutdown".into(),
        });
    }

    pub fn fail(&self, reason: &str) {
        let _ = self
            .remote
            .events
            .send(TransportEvent::Failed(reason.to_owned()));
    }

    pub fn is_closed(&self) -> bool {
        self.remote.cancel.is_cancelled()
    }
}

/// Response skeleton echoing `seq`.
pub(crate) fn reply(seq: u32) -> AppResponse {
    AppResponse {
        seq,
        ..AppResponse::default()
    }
}
