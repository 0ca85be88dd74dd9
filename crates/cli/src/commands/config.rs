use anyhow::Result;
use coderun::SessionConfig;

pub fn execute(config: &SessionConfig) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(config)?);
	Ok(())
}
