//! Fake transport for unit testing sessions without a backend.
//!
//! Provides an in-memory transport: frames the client sends are recorded, and
//! the test injects whatever the "backend" should say.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let (channel, mut events) = Channel::from_parts(parts);
//!
//! channel.wait_open().await?;
//! channel.send(r#"{"command":"stop"}"#.to_string())?;
//! assert_eq!(controller.next_sent().await.as_deref(), Some(r#"{"command":"stop"}"#));
//!
//! controller.inject_stdout("hello\n");
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for creating fake transport instances.
pub struct FakeTransportBuilder {
	fail_sends: bool,
}

impl FakeTransportBuilder {
	/// Create a new fake transport builder.
	pub fn new() -> Self {
		Self { fail_sends: false }
	}

	/// Makes every send fail with [`Error::ConnectionClosed`].
	pub fn fail_sends(mut self) -> Self {
		self.fail_sends = true;
		self
	}

	/// Build the fake transport and return both parts and a controller.
	///
	/// Returns [`TransportParts`] for opening a [`Channel`] and a
	/// [`FakeTransportController`] for injecting frames and inspecting sent ones.
	///
	/// [`Channel`]: crate::Channel
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let closed = Arc::new(AtomicBool::new(false));

		let sender = FakeTransportSender {
			sent: sent_tx,
			closed: Arc::clone(&closed),
			fail_sends: self.fail_sends,
		};

		let receiver = FakeTransportReceiver { inbound_rx, message_tx };

		let controller = FakeTransportController {
			inbound_tx: Mutex::new(Some(inbound_tx)),
			sent: AsyncMutex::new(sent_rx),
			closed,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Controller for injecting inbound frames and inspecting sent frames.
pub struct FakeTransportController {
	inbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
	sent: AsyncMutex<mpsc::UnboundedReceiver<String>>,
	closed: Arc<AtomicBool>,
}

impl FakeTransportController {
	/// Inject a raw text frame, as if the backend had sent it.
	pub fn inject(&self, frame: impl Into<String>) {
		if let Some(tx) = self.inbound_tx.lock().as_ref() {
			let _ = tx.send(frame.into());
		}
	}

	/// Inject a JSON frame.
	pub fn inject_json(&self, message: JsonValue) {
		self.inject(message.to_string());
	}

	/// Inject a `stdout` event carrying `chunk`.
	pub fn inject_stdout(&self, chunk: &str) {
		self.inject_json(serde_json::json!({
			"type": "stdout",
			"data": chunk
		}));
	}

	/// Simulate the backend closing the connection.
	///
	/// Frames injected before this call are still delivered.
	pub fn disconnect(&self) {
		self.inbound_tx.lock().take();
	}

	/// Wait for the next frame the client sends.
	///
	/// Returns `None` once the client side of the transport is gone.
	pub async fn next_sent(&self) -> Option<String> {
		self.sent.lock().await.recv().await
	}

	/// Wait for the next sent frame and parse it as JSON.
	pub async fn next_sent_json(&self) -> Option<JsonValue> {
		let frame = self.next_sent().await?;
		serde_json::from_str(&frame).ok()
	}

	/// Take all frames sent so far without waiting.
	pub async fn take_sent(&self) -> Vec<String> {
		let mut sent = self.sent.lock().await;
		let mut frames = Vec::new();
		while let Ok(frame) = sent.try_recv() {
			frames.push(frame);
		}
		frames
	}

	/// Returns `true` once the client has closed its side.
	pub fn client_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

struct FakeTransportSender {
	sent: mpsc::UnboundedSender<String>,
	closed: Arc<AtomicBool>,
	fail_sends: bool,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.fail_sends || self.closed.load(Ordering::SeqCst) {
				return Err(Error::ConnectionClosed);
			}
			self.sent.send(frame).map_err(|_| Error::ConnectionClosed)
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			self.closed.store(true, Ordering::SeqCst);
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<String>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.inbound_rx.recv().await {
				if self.message_tx.send(frame).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fake_transport_send_capture() {
		let (mut parts, controller) = FakeTransportBuilder::new().build();

		parts.sender.send("first".to_string()).await.unwrap();
		parts.sender.send("second".to_string()).await.unwrap();

		assert_eq!(controller.next_sent().await.as_deref(), Some("first"));
		assert_eq!(controller.take_sent().await, vec!["second".to_string()]);
		assert!(controller.take_sent().await.is_empty());
	}

	#[tokio::test]
	async fn test_fake_transport_injection_reaches_queue_in_order() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let TransportParts {
			receiver, mut message_rx, ..
		} = parts;
		let recv_task = tokio::spawn(receiver.run());

		controller.inject("a");
		controller.inject_stdout("b");
		controller.disconnect();

		assert_eq!(message_rx.recv().await.as_deref(), Some("a"));
		let second: JsonValue = serde_json::from_str(&message_rx.recv().await.unwrap()).unwrap();
		assert_eq!(second["type"], "stdout");
		assert_eq!(second["data"], "b");
		assert!(message_rx.recv().await.is_none(), "queue should end after disconnect");

		recv_task.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_fake_transport_close_rejects_later_sends() {
		let (mut parts, controller) = FakeTransportBuilder::new().build();

		parts.sender.close().await.unwrap();
		assert!(controller.client_closed());
		assert!(matches!(parts.sender.send("late".to_string()).await, Err(Error::ConnectionClosed)));
	}

	#[tokio::test]
	async fn test_fake_transport_failing_sends() {
		let (mut parts, _controller) = FakeTransportBuilder::new().fail_sends().build();
		assert!(parts.sender.send("x".to_string()).await.is_err());
	}
}
