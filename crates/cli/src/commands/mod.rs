mod config;
mod run;

use std::path::Path;

use anyhow::{Context, Result};
use coderun::SessionConfig;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let config = load_config(cli.config.as_deref(), cli.endpoint)?;

	match cli.command {
		Commands::Run(args) => run::execute(config, args).await,
		Commands::Config => config::execute(&config),
	}
}

/// Config file (or defaults) with the `--endpoint` override applied.
fn load_config(path: Option<&Path>, endpoint: Option<String>) -> Result<SessionConfig> {
	let mut config = match path {
		Some(path) => SessionConfig::from_file(path).with_context(|| format!("failed to load config from {}", path.display()))?,
		None => SessionConfig::default(),
	};

	if let Some(endpoint) = endpoint {
		config.endpoint = endpoint;
	}

	config.validate()?;
	Ok(config)
}
