use thiserror::Error;

/// Top-level error type for the `rustlink-api` crate.
///
/// Covers every failure mode of the protocol plumbing: encoding and
/// decoding against the wire schema, and the WebSocket transport.
/// `rustlink-core` maps these into caller-facing variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Codec ───────────────────────────────────────────────────────
    /// A request field violates the wire schema's type constraints.
    #[error("Cannot encode {field}: {reason}")]
    Encoding { field: &'static str, reason: String },

    /// An inbound frame could not be decoded (truncated, wrong wire type, ...).
    #[error("Cannot decode message: {0}")]
    Decoding(#[from] prost::DecodeError),

    // ── Transport ───────────────────────────────────────────────────
    /// `send` was invoked on a transport that is not open.
    #[error("Transport is not connected")]
    NotConnected,

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The handshake did not complete in time.
    #[error("Connection timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
