//! Public session API.
//!
//! A [`Session`] owns one backend connection for its whole life and runs the
//! state machine on top of it. Commands are issued synchronously from the
//! caller; everything the backend says arrives on the [`SessionUpdates`]
//! stream returned alongside the session.
//!
//! # Example
//!
//! ```ignore
//! let (session, mut updates) = Session::open(SessionConfig::default())?;
//! session.wait_open().await?;
//! session.start("print(input())", Language::Python, "")?;
//! session.send_input("hello")?;
//!
//! while let Some(update) = updates.recv().await {
//!     match update {
//!         SessionUpdate::Output { chunk, .. } => print!("{chunk}"),
//!         SessionUpdate::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coderun_protocol::{Command, Language, decode, encode};
use coderun_runtime::{Channel, ChannelEvent, ChannelEvents, ConnectionState, TransportParts};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::machine::{CommandSink, RunRequest, RunState, SessionMachine};

/// Something the subscriber of a session should know about.
#[derive(Debug)]
pub enum SessionUpdate {
	/// The connection is open; commands can be sent.
	Connected,
	/// New output appended to the buffer of run `run`.
	///
	/// `evicted` counts the bytes of this run's output dropped by the
	/// output limit so far; while it is non-zero, [`Session::output`] holds
	/// only the most recent output.
	Output { run: u64, chunk: String, evicted: usize },
	/// Run `run` has produced no output for `idle_for`.
	RunStale { run: u64, idle_for: Duration },
	/// A recoverable failure: an undecodable frame or a failed write.
	Error(Error),
	/// The connection is gone; no further updates follow.
	Closed { reason: Option<String> },
}

/// Stream of [`SessionUpdate`]s for one session. Not restartable.
pub type SessionUpdates = mpsc::UnboundedReceiver<SessionUpdate>;

impl CommandSink for Channel {
	fn send_command(&self, command: &Command) -> Result<()> {
		let frame = encode(command)?;
		self.send(frame)?;
		Ok(())
	}
}

/// Client side of one interactive execution session.
///
/// Dropping the session closes its connection.
pub struct Session {
	config: SessionConfig,
	machine: Arc<Mutex<SessionMachine>>,
	channel: Channel,
	run_started: Arc<Notify>,
}

impl Session {
	/// Connects to `config.endpoint` and returns the session with its update stream.
	///
	/// The handshake continues in the background; use [`Session::wait_open`]
	/// or wait for [`SessionUpdate::Connected`] before starting a run. Must be
	/// called inside a Tokio runtime.
	pub fn open(config: SessionConfig) -> Result<(Self, SessionUpdates)> {
		config.validate()?;
		let (channel, events) = Channel::open(&config.endpoint, config.connect_timeout());
		Ok(Self::assemble(config, channel, events))
	}

	/// Like [`Session::open`], over whatever transport `connect` produces.
	///
	/// `config.endpoint` is validated but not dialed.
	pub fn with_transport<F>(config: SessionConfig, connect: F) -> Result<(Self, SessionUpdates)>
	where
		F: Future<Output = coderun_runtime::Result<TransportParts>> + Send + 'static,
	{
		config.validate()?;
		let (channel, events) = Channel::spawn(connect);
		Ok(Self::assemble(config, channel, events))
	}

	fn assemble(config: SessionConfig, channel: Channel, events: ChannelEvents) -> (Self, SessionUpdates) {
		let machine = Arc::new(Mutex::new(SessionMachine::from_config(&config)));
		let run_started = Arc::new(Notify::new());
		let (updates_tx, updates_rx) = mpsc::unbounded_channel();

		tokio::spawn(dispatch(
			events,
			Arc::clone(&machine),
			Arc::clone(&run_started),
			updates_tx,
			config.stale_run_timeout(),
		));

		debug!(target = "coderun.session", endpoint = %config.endpoint, "session created");
		(
			Self {
				config,
				machine,
				channel,
				run_started,
			},
			updates_rx,
		)
	}

	/// Starts running `code`, with `input` as its initial stdin.
	///
	/// Clears the output of the previous run. Returns the new run's id.
	pub fn start(&self, code: impl Into<String>, language: Language, input: impl Into<String>) -> Result<u64> {
		let request = RunRequest::new(code, language, input);
		let run = self.machine.lock().start(request, &self.channel)?;
		self.run_started.notify_one();
		Ok(run)
	}

	/// Asks the backend to stop the active run. The session is idle
	/// immediately; late output is still delivered.
	pub fn stop(&self) -> Result<()> {
		self.machine.lock().stop(&self.channel)
	}

	/// Sends `text` followed by a newline to the active run's stdin.
	pub fn send_input(&self, text: &str) -> Result<()> {
		self.machine.lock().send_input(text, &self.channel)
	}

	pub fn run_state(&self) -> RunState {
		self.machine.lock().run_state()
	}

	pub fn is_running(&self) -> bool {
		self.run_state() == RunState::Running
	}

	/// Id of the most recent run; `0` before the first `start`.
	pub fn run_id(&self) -> u64 {
		self.machine.lock().run_id()
	}

	/// Output accumulated since the last `start`.
	pub fn output(&self) -> String {
		self.machine.lock().snapshot()
	}

	/// Bytes dropped from the front of [`Session::output`] by the output limit.
	pub fn output_evicted(&self) -> usize {
		self.machine.lock().output_evicted()
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.channel.state()
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Waits for the connection to open; fails if it closed first.
	pub async fn wait_open(&self) -> Result<()> {
		self.channel.wait_open().await.map_err(Error::from)
	}

	/// Closes the connection. Idempotent; also done on drop.
	pub fn close(&self) {
		self.channel.close();
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("endpoint", &self.config.endpoint)
			.field("connection", &self.connection_state())
			.field("run_state", &self.run_state())
			.finish()
	}
}

/// Applies channel events to the machine, in arrival order, and publishes updates.
async fn dispatch(
	mut events: ChannelEvents,
	machine: Arc<Mutex<SessionMachine>>,
	run_started: Arc<Notify>,
	updates: mpsc::UnboundedSender<SessionUpdate>,
	stale_timeout: Option<Duration>,
) {
	loop {
		let deadline = stale_timeout.and_then(|timeout| machine.lock().stale_deadline(timeout));

		let event = tokio::select! {
			event = events.recv() => event,
			// A new run arms a fresh deadline.
			_ = run_started.notified() => continue,
			_ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
				let Some(timeout) = stale_timeout else { continue };
				let stale = {
					let mut machine = machine.lock();
					machine.check_stale(Instant::now(), timeout).map(|idle_for| (machine.run_id(), idle_for))
				};
				if let Some((run, idle_for)) = stale {
					warn!(target = "coderun.session", run, idle_ms = idle_for.as_millis() as u64, "run produced no output");
					let _ = updates.send(SessionUpdate::RunStale { run, idle_for });
				}
				continue;
			}
		};

		let Some(event) = event else {
			break;
		};

		match event {
			ChannelEvent::Opened => {
				info!(target = "coderun.session", "session connected");
				let _ = updates.send(SessionUpdate::Connected);
			}
			ChannelEvent::Message(frame) => match decode(&frame) {
				Ok(event) => {
					let appended = {
						let mut machine = machine.lock();
						machine.on_event(event).map(|chunk| (machine.run_id(), chunk, machine.output_evicted()))
					};
					if let Some((run, chunk, evicted)) = appended {
						let _ = updates.send(SessionUpdate::Output { run, chunk, evicted });
					}
				}
				Err(e) => {
					warn!(target = "coderun.session", error = %e, frame = %frame, "dropping undecodable frame");
					let _ = updates.send(SessionUpdate::Error(e.into()));
				}
			},
			ChannelEvent::SendFailed(e) => {
				let _ = updates.send(SessionUpdate::Error(e.into()));
			}
			ChannelEvent::Closed { reason } => {
				info!(target = "coderun.session", reason = reason.as_deref().unwrap_or("closed"), "session disconnected");
				let _ = updates.send(SessionUpdate::Closed { reason });
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use coderun_runtime::{FakeTransportBuilder, FakeTransportController};
	use serde_json::json;

	async fn next_update(updates: &mut SessionUpdates) -> SessionUpdate {
		tokio::time::timeout(Duration::from_secs(1), updates.recv())
			.await
			.expect("timed out waiting for session update")
			.expect("session updates ended")
	}

	async fn open_fake(config: SessionConfig) -> (Session, SessionUpdates, FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (session, mut updates) = Session::with_transport(config, async move { Ok(parts) }).unwrap();
		session.wait_open().await.unwrap();
		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Connected));
		(session, updates, controller)
	}

	async fn next_output(updates: &mut SessionUpdates) -> (u64, String) {
		match next_update(updates).await {
			SessionUpdate::Output { run, chunk, .. } => (run, chunk),
			other => panic!("expected Output, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_run_streams_output_then_stops() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;

		let run = session.start("print(1)", Language::Python, "").unwrap();
		assert_eq!(
			controller.next_sent_json().await.unwrap(),
			json!({"command": "run", "code": "print(1)", "language": "python", "input": ""})
		);

		controller.inject_stdout("1\n");
		controller.inject_stdout("1\n");
		assert_eq!(next_output(&mut updates).await, (run, "1\n".to_string()));
		assert_eq!(next_output(&mut updates).await, (run, "1\n".to_string()));
		assert_eq!(session.output(), "1\n1\n");

		session.stop().unwrap();
		assert_eq!(session.run_state(), RunState::Idle);
		assert_eq!(controller.next_sent_json().await.unwrap(), json!({"command": "stop"}));
	}

	#[tokio::test]
	async fn test_send_input_emits_one_input_command() {
		let (session, _updates, controller) = open_fake(SessionConfig::default()).await;
		session.start("input()", Language::Python, "").unwrap();
		controller.next_sent().await.unwrap();

		session.send_input("3").unwrap();

		assert_eq!(controller.next_sent_json().await.unwrap(), json!({"command": "input", "input": "3\n"}));
		tokio::task::yield_now().await;
		assert!(controller.take_sent().await.is_empty());
	}

	#[tokio::test]
	async fn test_misuse_sends_nothing() {
		let (session, _updates, controller) = open_fake(SessionConfig::default()).await;

		assert!(session.stop().unwrap_err().is_misuse());
		assert!(session.send_input("x").unwrap_err().is_misuse());

		session.start("a", Language::JavaScript, "").unwrap();
		assert!(session.start("b", Language::JavaScript, "").unwrap_err().is_misuse());

		let first = controller.next_sent_json().await.unwrap();
		assert_eq!(first["code"], "a");
		tokio::task::yield_now().await;
		assert!(controller.take_sent().await.is_empty());
	}

	#[tokio::test]
	async fn test_start_before_open_is_not_connected() {
		let (session, _updates) = Session::with_transport(SessionConfig::default(), std::future::pending()).unwrap();

		assert_eq!(session.connection_state(), ConnectionState::Connecting);
		let err = session.start("print(1)", Language::Python, "").unwrap_err();
		assert!(err.is_not_connected());
		assert_eq!(session.run_state(), RunState::Idle);
		assert_eq!(session.run_id(), 0);
	}

	#[tokio::test]
	async fn test_bad_frames_are_reported_and_session_survives() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;
		session.start("x", Language::Python, "").unwrap();

		controller.inject("{not json");
		controller.inject_json(json!({"type": "exit_code", "data": 0}));
		controller.inject_stdout("still here");

		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Error(Error::Decode(_))));
		assert_eq!(next_output(&mut updates).await.1, "still here");
		assert_eq!(session.output(), "still here");
		assert_eq!(session.connection_state(), ConnectionState::Open);
	}

	#[tokio::test]
	async fn test_late_output_after_stop_is_delivered() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;
		let run = session.start("loop", Language::Python, "").unwrap();
		session.stop().unwrap();

		controller.inject_stdout("late");
		assert_eq!(next_output(&mut updates).await, (run, "late".to_string()));
		assert_eq!(session.output(), "late");
	}

	#[tokio::test]
	async fn test_restart_clears_output() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;

		session.start("a", Language::Python, "").unwrap();
		controller.inject_stdout("a");
		next_output(&mut updates).await;
		session.stop().unwrap();

		let second = session.start("b", Language::Python, "").unwrap();
		controller.inject_stdout("b");
		assert_eq!(next_output(&mut updates).await, (second, "b".to_string()));
		assert_eq!(session.output(), "b");
	}

	#[tokio::test]
	async fn test_backend_disconnect_is_observable() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;
		session.start("x", Language::Python, "").unwrap();

		controller.disconnect();

		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Closed { reason: None }));
		assert_eq!(session.connection_state(), ConnectionState::Closed);
		assert!(session.stop().unwrap_err().is_not_connected());
		assert_eq!(session.run_state(), RunState::Running);
		assert!(updates.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_drop_closes_connection() {
		let (session, mut updates, controller) = open_fake(SessionConfig::default()).await;

		drop(session);

		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Closed { .. }));
		assert!(controller.client_closed());
	}

	#[tokio::test]
	async fn test_unsupported_language_from_config() {
		let config = SessionConfig {
			languages: vec![Language::Python],
			..SessionConfig::default()
		};
		let (session, _updates, _controller) = open_fake(config).await;

		assert!(session.start("1", Language::JavaScript, "").unwrap_err().is_misuse());
	}

	#[tokio::test]
	async fn test_invalid_config_is_rejected_before_connecting() {
		let config = SessionConfig::with_endpoint("http://example.com");
		let err = Session::with_transport(config, std::future::pending()).unwrap_err();
		assert!(matches!(err, Error::Config(_)));
	}

	#[tokio::test]
	async fn test_output_limit_truncation_is_visible() {
		let config = SessionConfig {
			output_limit_bytes: Some(8),
			..SessionConfig::default()
		};
		let (session, mut updates, controller) = open_fake(config).await;
		let run = session.start("flood", Language::Python, "").unwrap();

		controller.inject_stdout("12345");
		controller.inject_stdout("67890");

		match next_update(&mut updates).await {
			SessionUpdate::Output { evicted, .. } => assert_eq!(evicted, 0),
			other => panic!("expected Output, got {other:?}"),
		}
		match next_update(&mut updates).await {
			SessionUpdate::Output { run: r, chunk, evicted } => {
				assert_eq!((r, chunk.as_str(), evicted), (run, "67890", 2));
			}
			other => panic!("expected Output, got {other:?}"),
		}
		assert_eq!(session.output(), "34567890");
		assert_eq!(session.output_evicted(), 2);

		session.stop().unwrap();
		session.start("again", Language::Python, "").unwrap();
		assert_eq!(session.output_evicted(), 0);
	}

	#[tokio::test]
	async fn test_write_failure_is_reported_then_closed() {
		let (parts, _controller) = FakeTransportBuilder::new().fail_sends().build();
		let (session, mut updates) = Session::with_transport(SessionConfig::default(), async move { Ok(parts) }).unwrap();
		session.wait_open().await.unwrap();
		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Connected));

		// Queued before the write fails, so the run is accepted locally.
		session.start("print(1)", Language::Python, "").unwrap();

		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Error(Error::Transport(_))));
		assert!(matches!(next_update(&mut updates).await, SessionUpdate::Closed { reason: Some(_) }));
		assert_eq!(session.connection_state(), ConnectionState::Closed);
		assert!(session.send_input("x").unwrap_err().is_not_connected());
	}

	#[tokio::test(start_paused = true)]
	async fn test_silent_run_is_reported_stale() {
		let config = SessionConfig {
			stale_run_timeout_ms: Some(50),
			..SessionConfig::default()
		};
		let (session, mut updates, controller) = open_fake(config).await;
		let run = session.start("while True: pass", Language::Python, "").unwrap();

		match next_update(&mut updates).await {
			SessionUpdate::RunStale { run: stale_run, idle_for } => {
				assert_eq!(stale_run, run);
				assert!(idle_for >= Duration::from_millis(50));
			}
			other => panic!("expected RunStale, got {other:?}"),
		}
		assert!(session.is_running());

		// Reported once per run, even after more output.
		controller.inject_stdout("tick");
		assert_eq!(next_output(&mut updates).await.1, "tick");
		session.stop().unwrap();

		let next_run = session.start("again", Language::Python, "").unwrap();
		match next_update(&mut updates).await {
			SessionUpdate::RunStale { run, .. } => assert_eq!(run, next_run),
			other => panic!("expected RunStale, got {other:?}"),
		}
	}
}
