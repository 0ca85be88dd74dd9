use serde::{Deserialize, Serialize};

use crate::Language;

/// Client-to-backend message.
///
/// Serialized with a `command` discriminator:
/// ```json
/// {"command": "run", "code": "print(1)", "language": "python", "input": ""}
/// {"command": "stop"}
/// {"command": "input", "input": "3\n"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
	/// Start executing `code`; `input` is the initial stdin.
	Run { code: String, language: Language, input: String },
	/// Ask the backend to interrupt the current run.
	Stop,
	/// Feed `text` to the running program's stdin, sent verbatim.
	Input {
		#[serde(rename = "input")]
		text: String,
	},
}

impl Command {
	/// Wire discriminator of this command.
	pub fn name(&self) -> &'static str {
		match self {
			Command::Run { .. } => "run",
			Command::Stop => "stop",
			Command::Input { .. } => "input",
		}
	}
}
