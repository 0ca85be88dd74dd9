use std::io::BufRead;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use coderun::{Language, Session, SessionConfig, SessionUpdate};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::RunArgs;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum Outcome {
	Disconnected(Option<String>),
	Interrupted,
	Idle,
}

pub async fn execute(mut config: SessionConfig, args: RunArgs) -> Result<()> {
	let code = std::fs::read_to_string(&args.file).with_context(|| format!("failed to read {}", args.file.display()))?;
	let language = resolve_language(&args.file, args.language.map(Language::from))?;
	let input = match &args.input_file {
		Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?,
		None => args.input.clone().unwrap_or_default(),
	};

	if !config.supports(language) {
		bail!("{language} is not enabled in the configured languages");
	}
	if let Some(ms) = args.stop_when_idle {
		config.stale_run_timeout_ms = Some(ms);
	}

	let (session, mut updates) = Session::open(config)?;
	if let Err(err) = session.wait_open().await {
		let reason = match updates.recv().await {
			Some(SessionUpdate::Closed { reason: Some(reason) }) => reason,
			_ => err.to_string(),
		};
		bail!("could not connect to {}: {reason}", session.config().endpoint);
	}

	let run = session.start(code, language, input)?;
	info!(target = "coderun.cli", run, %language, file = %args.file.display(), "run started");

	let mut lines = (!args.no_stdin).then(spawn_stdin_reader);
	let mut stdout = tokio::io::stdout();

	// Registered once so a signal arriving mid-write is not lost.
	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	let outcome = loop {
		tokio::select! {
			update = updates.recv() => match update {
				Some(SessionUpdate::Output { chunk, .. }) => {
					stdout.write_all(chunk.as_bytes()).await?;
					stdout.flush().await?;
				}
				Some(SessionUpdate::RunStale { idle_for, .. }) => {
					info!(target = "coderun.cli", idle_ms = idle_for.as_millis() as u64, "no output, stopping run");
					if session.is_running() {
						session.stop()?;
					}
					break Outcome::Idle;
				}
				Some(SessionUpdate::Error(err)) => warn!(target = "coderun.cli", error = %err, "session error"),
				Some(SessionUpdate::Connected) => {}
				Some(SessionUpdate::Closed { reason }) => break Outcome::Disconnected(reason),
				None => break Outcome::Disconnected(None),
			},
			line = next_line(&mut lines) => match line {
				Some(line) => {
					if let Err(err) = session.send_input(&line) {
						warn!(target = "coderun.cli", error = %err, "input not sent");
					}
				}
				None => {
					debug!(target = "coderun.cli", "stdin closed");
					lines = None;
				}
			},
			_ = &mut ctrl_c => {
				if session.is_running() {
					session.stop()?;
				}
				break Outcome::Interrupted;
			}
		}
	};

	session.close();
	if !matches!(outcome, Outcome::Disconnected(_)) {
		drain_until_closed(&mut updates).await;
	}

	match outcome {
		Outcome::Disconnected(Some(reason)) => bail!("connection lost: {reason}"),
		Outcome::Disconnected(None) => debug!(target = "coderun.cli", "backend closed the connection"),
		Outcome::Interrupted => info!(target = "coderun.cli", "interrupted"),
		Outcome::Idle => {}
	}
	Ok(())
}

/// Lets queued frames (a final `stop`) reach the backend before exit.
async fn drain_until_closed(updates: &mut coderun::SessionUpdates) {
	let drained = tokio::time::timeout(CLOSE_GRACE, async {
		while let Some(update) = updates.recv().await {
			if let SessionUpdate::Closed { .. } = update {
				break;
			}
		}
	});
	if drained.await.is_err() {
		debug!(target = "coderun.cli", "close handshake timed out");
	}
}

fn resolve_language(file: &Path, explicit: Option<Language>) -> Result<Language> {
	if let Some(language) = explicit {
		return Ok(language);
	}

	file.extension()
		.and_then(|ext| ext.to_str())
		.and_then(Language::from_extension)
		.with_context(|| format!("cannot infer language of {}; pass --language", file.display()))
}

/// Reads terminal lines on a dedicated thread; tokio's stdin would keep the
/// runtime from shutting down while a read is pending.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
	let (tx, rx) = mpsc::unbounded_channel();
	std::thread::spawn(move || {
		for line in std::io::stdin().lock().lines() {
			let Ok(line) = line else { break };
			if tx.send(line).is_err() {
				break;
			}
		}
	});
	rx
}

async fn next_line(lines: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
	match lines {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}
