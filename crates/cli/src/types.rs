use clap::ValueEnum;
use coderun::Language;

/// Language choices accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LanguageArg {
	#[value(alias = "py")]
	Python,
	#[value(name = "javascript", alias = "js")]
	JavaScript,
}

impl From<LanguageArg> for Language {
	fn from(arg: LanguageArg) -> Self {
		match arg {
			LanguageArg::Python => Language::Python,
			LanguageArg::JavaScript => Language::JavaScript,
		}
	}
}
