use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Languages the execution backend can interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
	Python,
	#[serde(alias = "js")]
	JavaScript,
}

impl Language {
	/// Every language known to the protocol, in wire order.
	pub const ALL: [Language; 2] = [Language::Python, Language::JavaScript];

	/// Wire name, as sent in the `language` field of a run command.
	pub fn as_str(self) -> &'static str {
		match self {
			Language::Python => "python",
			Language::JavaScript => "javascript",
		}
	}

	/// Guesses the language from a source file extension.
	pub fn from_extension(ext: &str) -> Option<Self> {
		match ext.to_ascii_lowercase().as_str() {
			"py" => Some(Language::Python),
			"js" | "mjs" | "cjs" => Some(Language::JavaScript),
			_ => None,
		}
	}
}

impl fmt::Display for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Returned when a string names no known [`Language`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
	type Err = UnknownLanguage;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"python" | "py" => Ok(Language::Python),
			"javascript" | "js" => Ok(Language::JavaScript),
			_ => Err(UnknownLanguage(s.to_string())),
		}
	}
}
