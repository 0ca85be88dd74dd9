use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::LanguageArg;

#[derive(Parser, Debug)]
#[command(name = "coderun")]
#[command(about = "Run code on a remote execution backend and stream its output")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Backend WebSocket URL (overrides the config file)
	#[arg(long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// Load session settings from a JSON file
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a source file, streaming output and forwarding stdin lines
	Run(RunArgs),

	/// Print the effective configuration as JSON
	Config,
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Source file to execute
	pub file: PathBuf,

	/// Language of the source (inferred from the extension when omitted)
	#[arg(short, long, value_enum)]
	pub language: Option<LanguageArg>,

	/// Initial stdin sent with the run
	#[arg(short, long, conflicts_with = "input_file")]
	pub input: Option<String>,

	/// Read initial stdin from a file
	#[arg(long, value_name = "FILE")]
	pub input_file: Option<PathBuf>,

	/// Stop the run and exit after this many milliseconds without output
	#[arg(long, value_name = "MS")]
	pub stop_when_idle: Option<u64>,

	/// Do not forward terminal input to the program
	#[arg(long)]
	pub no_stdin: bool,
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_consistent() {
		Cli::command().debug_assert();
	}

	#[test]
	fn parses_run_with_global_flags_after_subcommand() {
		let cli = Cli::parse_from(["coderun", "run", "main.py", "-l", "py", "--endpoint", "ws://localhost:1/ws", "-vv"]);
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.endpoint.as_deref(), Some("ws://localhost:1/ws"));
		match cli.command {
			Commands::Run(args) => {
				assert_eq!(args.file, PathBuf::from("main.py"));
				assert_eq!(args.language, Some(LanguageArg::Python));
				assert!(args.input.is_none());
			}
			other => panic!("expected run, got {other:?}"),
		}
	}

	#[test]
	fn input_and_input_file_conflict() {
		let result = Cli::try_parse_from(["coderun", "run", "a.py", "--input", "x", "--input-file", "in.txt"]);
		assert!(result.is_err());
	}
}
