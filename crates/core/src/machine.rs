//! Session state machine.
//!
//! [`SessionMachine`] decides which commands are legal, emits them through a
//! [`CommandSink`], and folds inbound events into the output buffer. It does
//! no I/O of its own, so the same transitions drive a live connection in
//! [`Session`](crate::Session) and a recording sink in tests.
//!
//! ```text
//!            start            stop
//!   Idle ───────────▶ Running ─────▶ Idle
//!                      │   ▲
//!                      └───┘ send_input / stdout
//! ```
//!
//! The backend sends no completion event, so `Running → Idle` only happens on
//! a client `stop`. That stop is optimistic: output still arriving afterwards
//! is appended.

use std::time::Duration;

use coderun_protocol::{Command, Event, Language};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{Misuse, Result};
use crate::output::OutputBuffer;

/// Whether a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
	Idle,
	Running,
}

/// Destination for commands the state machine emits.
///
/// A failed send aborts the transition that produced the command.
pub trait CommandSink {
	fn send_command(&self, command: &Command) -> Result<()>;
}

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
	pub code: String,
	pub language: Language,
	/// Initial stdin, delivered with the run command.
	pub input: String,
}

impl RunRequest {
	pub fn new(code: impl Into<String>, language: Language, input: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			language,
			input: input.into(),
		}
	}
}

/// Client-side run state for one session.
#[derive(Debug)]
pub struct SessionMachine {
	state: RunState,
	output: OutputBuffer,
	languages: Vec<Language>,
	run_id: u64,
	last_activity: Option<Instant>,
	stale_reported: bool,
}

impl SessionMachine {
	pub fn new(languages: Vec<Language>, output: OutputBuffer) -> Self {
		Self {
			state: RunState::Idle,
			output,
			languages,
			run_id: 0,
			last_activity: None,
			stale_reported: false,
		}
	}

	pub fn from_config(config: &SessionConfig) -> Self {
		let output = match config.output_limit_bytes {
			Some(limit) => OutputBuffer::with_limit(limit),
			None => OutputBuffer::new(),
		};
		Self::new(config.languages.clone(), output)
	}

	pub fn run_state(&self) -> RunState {
		self.state
	}

	pub fn is_running(&self) -> bool {
		self.state == RunState::Running
	}

	/// Identifier of the most recent run; `0` before the first `start`.
	pub fn run_id(&self) -> u64 {
		self.run_id
	}

	pub fn output(&self) -> &OutputBuffer {
		&self.output
	}

	pub fn snapshot(&self) -> String {
		self.output.snapshot()
	}

	/// Starts a run.
	///
	/// Rejected while another run is active or for an unsupported language.
	/// Output from the previous run is cleared only once the `Run` command has
	/// been accepted by the sink. Returns the new run's id.
	pub fn start<S: CommandSink + ?Sized>(&mut self, request: RunRequest, sink: &S) -> Result<u64> {
		if self.state == RunState::Running {
			return Err(Misuse::AlreadyRunning.into());
		}
		if !self.languages.contains(&request.language) {
			return Err(Misuse::UnsupportedLanguage(request.language).into());
		}

		let RunRequest { code, language, input } = request;
		sink.send_command(&Command::Run { code, language, input })?;

		self.output.reset();
		self.state = RunState::Running;
		self.run_id += 1;
		self.last_activity = Some(Instant::now());
		self.stale_reported = false;

		debug!(target = "coderun.session", run = self.run_id, %language, "run started");
		Ok(self.run_id)
	}

	/// Stops the active run without waiting for the backend to confirm.
	pub fn stop<S: CommandSink + ?Sized>(&mut self, sink: &S) -> Result<()> {
		if self.state != RunState::Running {
			return Err(Misuse::NotRunning { operation: "stop" }.into());
		}

		sink.send_command(&Command::Stop)?;

		self.state = RunState::Idle;
		self.last_activity = None;

		debug!(target = "coderun.session", run = self.run_id, "run stopped");
		Ok(())
	}

	/// Sends one line of stdin to the active run; a newline is appended.
	pub fn send_input<S: CommandSink + ?Sized>(&mut self, text: &str, sink: &S) -> Result<()> {
		if self.state != RunState::Running {
			return Err(Misuse::NotRunning { operation: "send input" }.into());
		}

		sink.send_command(&Command::Input { text: format!("{text}\n") })
	}

	/// Applies an inbound event.
	///
	/// Returns the appended chunk for `stdout`, in any state. Other event
	/// types are ignored.
	pub fn on_event(&mut self, event: Event) -> Option<String> {
		match event {
			Event::Stdout { chunk } => {
				let was_truncated = self.output.evicted() > 0;
				self.output.append(&chunk);
				if !was_truncated && self.output.evicted() > 0 {
					warn!(target = "coderun.session", run = self.run_id, limit = self.output.limit(), "output limit reached, dropping oldest output");
				}
				if self.state == RunState::Running {
					self.last_activity = Some(Instant::now());
				}
				Some(chunk)
			}
			other => {
				debug!(target = "coderun.session", kind = other.kind(), "ignoring event");
				None
			}
		}
	}

	/// Bytes of this run's output dropped by the output limit.
	pub fn output_evicted(&self) -> usize {
		self.output.evicted()
	}

	/// When the active run becomes stale if no output arrives.
	///
	/// `None` when idle or when staleness was already reported for this run.
	pub fn stale_deadline(&self, timeout: Duration) -> Option<Instant> {
		if self.state != RunState::Running || self.stale_reported {
			return None;
		}
		self.last_activity.map(|at| at + timeout)
	}

	/// Reports how long the active run has been silent, once per run.
	pub fn check_stale(&mut self, now: Instant, timeout: Duration) -> Option<Duration> {
		let deadline = self.stale_deadline(timeout)?;
		if now < deadline {
			return None;
		}

		self.stale_reported = true;
		self.last_activity.map(|at| now.saturating_duration_since(at))
	}
}
