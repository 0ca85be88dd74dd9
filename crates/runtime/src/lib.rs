//! Connection lifecycle and message transport for coderun sessions.
//!
//! [`Channel`] owns one backend connection and multiplexes outbound and
//! inbound frames over it. Transports plug in through the [`Transport`] and
//! [`TransportReceiver`] traits: [`WebSocketTransport`] in production and
//! [`FakeTransportBuilder`] in tests.

pub mod channel;
pub mod error;
pub mod fake_transport;
pub mod transport;

pub use channel::{Channel, ChannelEvent, ChannelEvents, ConnectionState};
pub use error::{Error, Result};
pub use fake_transport::{FakeTransportBuilder, FakeTransportController};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
