//! Error types for coderun sessions.

use coderun_protocol::{DecodeError, EncodeError, Language};
use thiserror::Error;

/// A command issued in a state where it is not allowed.
///
/// Misuse is rejected before anything reaches the backend and never changes
/// session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Misuse {
	/// `start` while a run is already active.
	#[error("a run is already active")]
	AlreadyRunning,

	/// `stop` or `send_input` with no active run.
	#[error("cannot {operation}: no run is active")]
	NotRunning { operation: &'static str },

	/// The language is not in the session's supported set.
	#[error("language {0} is not supported by this session")]
	UnsupportedLanguage(Language),
}

/// Main error type for coderun operations.
#[derive(Debug, Error)]
pub enum Error {
	/// The connection is not open, or writing to it failed
	#[error("transport error: {0}")]
	Transport(#[from] coderun_runtime::Error),

	/// An outbound command could not be serialized
	#[error(transparent)]
	Encode(#[from] EncodeError),

	/// An inbound frame could not be interpreted
	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	/// Command rejected by the session state machine
	#[error("protocol misuse: {0}")]
	Misuse(#[from] Misuse),

	/// Invalid configuration
	#[error("configuration error: {0}")]
	Config(String),

	/// IO error
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	/// Serialization/deserialization errors
	#[error("serialization error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_misuse(&self) -> bool {
		matches!(self, Error::Misuse(_))
	}

	/// Returns `true` if the connection is not (or no longer) open.
	pub fn is_not_connected(&self) -> bool {
		matches!(self, Error::Transport(coderun_runtime::Error::NotOpen(_)))
	}
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
