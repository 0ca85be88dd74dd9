//! Text-frame codec for commands and events.
//!
//! Every frame is a single UTF-8 JSON object; the WebSocket layer provides
//! the framing, so there is no length prefix or envelope here.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Command, Event};

/// Failure to turn a [`Command`] into a frame.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode {command} command: {source}")]
pub struct EncodeError {
	pub command: &'static str,
	#[source]
	pub source: serde_json::Error,
}

/// Failure to interpret an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("malformed frame: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("{kind} event is missing string field `{field}`")]
	MissingField { kind: &'static str, field: &'static str },
}

#[derive(Deserialize)]
struct RawEvent {
	#[serde(rename = "type")]
	kind: String,
	#[serde(flatten)]
	fields: Map<String, Value>,
}

/// Serializes a command into a text frame.
pub fn encode(command: &Command) -> Result<String, EncodeError> {
	serde_json::to_string(command).map_err(|source| EncodeError {
		command: command.name(),
		source,
	})
}

/// Parses a text frame into an [`Event`].
///
/// Frames whose `type` is not recognized decode to [`Event::Other`] with the
/// remaining fields as payload.
pub fn decode(frame: &str) -> Result<Event, DecodeError> {
	let RawEvent { kind, mut fields } = serde_json::from_str(frame)?;

	match kind.as_str() {
		"stdout" => match fields.remove("data") {
			Some(Value::String(chunk)) => Ok(Event::Stdout { chunk }),
			_ => Err(DecodeError::MissingField {
				kind: "stdout",
				field: "data",
			}),
		},
		_ => Ok(Event::Other {
			kind,
			payload: Value::Object(fields),
		}),
	}
}
