//! WebSocket transport for the companion port.
//!
//! Opens a single connection per [`Transport::open`] call and spawns a pump
//! task that shuttles binary frames between the socket and the returned
//! [`TransportHandle`]. Reconnection policy lives a layer up, in the
//! session supervisor; this module never retries.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::transport::{RemoteEnd, Transport, TransportEvent, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── WebSocketTransport ───────────────────────────────────────────────

/// [`Transport`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<TransportHandle, Error> {
        tracing::info!(url = %url, "Connecting to WebSocket");

        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws_stream, _response) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| Error::ConnectTimeout {
                timeout_ms: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("WebSocket connected");

        let (handle, remote) = TransportHandle::pair();
        tokio::spawn(pump(ws_stream, remote));
        Ok(handle)
    }
}

// ── Frame pump ───────────────────────────────────────────────────────

/// Move frames until either side goes away, then report exactly one
/// terminal event.
async fn pump(ws_stream: WsStream, remote: RemoteEnd) {
    let RemoteEnd {
        mut outbound,
        events,
        cancel,
    } = remote;
    let (mut write, mut read) = ws_stream.split();

    let terminal = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break TransportEvent::Closed {
                    code: None,
                    reason: "closed locally".into(),
                };
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    break TransportEvent::Closed {
                        code: None,
                        reason: "handle dropped".into(),
                    };
                };
                if let Err(e) = write.send(Message::Binary(frame.into())).await {
                    break TransportEvent::Failed(e.to_string());
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        let _ = events.send(TransportEvent::Frame(data));
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(len = text.len(), "Text frame on binary protocol");
                        let _ = events.send(TransportEvent::Frame(bytes::Bytes::copy_from_slice(
                            text.as_bytes(),
                        )));
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(cf) => (Some(u16::from(cf.code)), cf.reason.to_string()),
                            None => (None, String::new()),
                        };
                        tracing::info!(?code, %reason, "WebSocket close frame received");
                        break TransportEvent::Closed { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Failed(e.to_string()),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".into(),
                        };
                    }
                }
            }
        }
    };

    tracing::debug!(event = ?terminal, "WebSocket pump exiting");
    let _ = events.send(terminal);
}
