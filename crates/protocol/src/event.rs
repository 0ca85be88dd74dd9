use serde_json::Value;

/// Backend-to-client message.
///
/// Inbound frames carry a `type` discriminator. Only `stdout` is understood;
/// everything else is kept as [`Event::Other`] so newer backends never break
/// older clients.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
	/// A fragment of the running program's standard output.
	Stdout { chunk: String },
	/// An event type this client does not interpret.
	Other { kind: String, payload: Value },
}

impl Event {
	/// Wire discriminator of this event.
	pub fn kind(&self) -> &str {
		match self {
			Event::Stdout { .. } => "stdout",
			Event::Other { kind, .. } => kind,
		}
	}
}
