//! Transport-level errors.

use std::time::Duration;

use crate::ConnectionState;

/// Errors raised by the channel and its transports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A frame was submitted while the connection was not open.
	#[error("connection is not open (state: {0})")]
	NotOpen(ConnectionState),

	/// The handshake did not finish within the connect timeout.
	#[error("timed out connecting to {url} after {}ms", timeout.as_millis())]
	ConnectTimeout { url: String, timeout: Duration },

	/// WebSocket protocol or I/O failure.
	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	/// The peer went away while a frame was in flight.
	#[error("connection closed")]
	ConnectionClosed,

	/// A frame that cannot be carried as UTF-8 text.
	#[error("invalid frame: {0}")]
	InvalidFrame(String),
}

impl Error {
	/// Returns `true` if the error means the connection is unusable.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::NotOpen(ConnectionState::Closed) | Error::ConnectionClosed)
	}
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
