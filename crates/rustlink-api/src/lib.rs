// rustlink-api: wire codec and WebSocket transport for the Rust+ companion protocol

pub mod codec;
pub mod error;
pub mod proto;
pub mod transport;
pub mod websocket;

pub use codec::{PlayerCredentials, Request, decode_message, encode_request};
pub use error::Error;
pub use transport::{DEFAULT_PROTOCOL_VERSION, Endpoint, Transport, TransportEvent, TransportHandle};
pub use websocket::WebSocketTransport;
