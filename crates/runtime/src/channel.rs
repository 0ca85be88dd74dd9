//! Long-lived, message-oriented connection to the execution backend.
//!
//! A [`Channel`] owns one transport for its whole life. It is returned
//! immediately by [`Channel::open`] while the handshake runs on a background
//! driver task, mirroring how a browser `WebSocket` is usable (and queryable)
//! the moment it is constructed.
//!
//! # Message Flow
//!
//! 1. Caller submits a frame with [`Channel::send`] (non-blocking)
//! 2. The frame is rejected right away unless the state is [`ConnectionState::Open`]
//! 3. Accepted frames are queued and written by the driver in submission order
//! 4. Inbound frames are forwarded as [`ChannelEvent::Message`] in arrival order
//! 5. [`ChannelEvent::Closed`] is always the last event

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::transport::{TransportParts, WebSocketTransport};

/// Lifecycle of a [`Channel`]'s connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	Connecting,
	Open,
	Closed,
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ConnectionState::Connecting => "connecting",
			ConnectionState::Open => "open",
			ConnectionState::Closed => "closed",
		})
	}
}

/// Notifications produced by a [`Channel`].
#[derive(Debug)]
pub enum ChannelEvent {
	/// The handshake finished and frames can be sent.
	Opened,
	/// An inbound frame.
	Message(String),
	/// A frame accepted by [`Channel::send`] could not be written.
	SendFailed(Error),
	/// The connection is gone. `reason` is `None` for an orderly close.
	Closed { reason: Option<String> },
}

/// Stream of [`ChannelEvent`]s for one channel.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

enum Outbound {
	Frame(String),
	Close,
}

/// Exclusive handle to one backend connection.
///
/// Dropping the handle closes the connection.
pub struct Channel {
	state: Arc<watch::Sender<ConnectionState>>,
	outbound: mpsc::UnboundedSender<Outbound>,
}

impl Channel {
	/// Opens a WebSocket connection to `url`.
	///
	/// Must be called inside a Tokio runtime. The handshake is bounded by
	/// `connect_timeout`; a failed or timed out handshake ends in
	/// [`ChannelEvent::Closed`] with the failure as reason.
	pub fn open(url: &str, connect_timeout: Duration) -> (Self, ChannelEvents) {
		let url = url.to_string();
		Self::spawn(async move {
			info!(target = "coderun.channel", url = %url, "connecting");
			match tokio::time::timeout(connect_timeout, WebSocketTransport::connect(&url)).await {
				Ok(Ok((transport, message_rx))) => Ok(transport.into_transport_parts(message_rx)),
				Ok(Err(e)) => Err(e),
				Err(_) => Err(Error::ConnectTimeout {
					url,
					timeout: connect_timeout,
				}),
			}
		})
	}

	/// Drives already connected transport parts.
	pub fn from_parts(parts: TransportParts) -> (Self, ChannelEvents) {
		Self::spawn(async move { Ok(parts) })
	}

	/// Drives whatever transport `connect` produces.
	pub fn spawn<F>(connect: F) -> (Self, ChannelEvents)
	where
		F: Future<Output = Result<TransportParts>> + Send + 'static,
	{
		let (state, _) = watch::channel(ConnectionState::Connecting);
		let state = Arc::new(state);
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();

		tokio::spawn(drive(connect, Arc::clone(&state), outbound_rx, events_tx));

		(Self { state, outbound: outbound_tx }, events_rx)
	}

	/// Current connection state.
	pub fn state(&self) -> ConnectionState {
		*self.state.borrow()
	}

	/// Queues `frame` for sending.
	///
	/// Fails with [`Error::NotOpen`] unless the connection is open; nothing is
	/// queued in that case. Write failures after queueing are reported as
	/// [`ChannelEvent::SendFailed`].
	pub fn send(&self, frame: String) -> Result<()> {
		let state = self.state();
		if state != ConnectionState::Open {
			error!(target = "coderun.channel", %state, "cannot send frame: connection is not open");
			return Err(Error::NotOpen(state));
		}

		self.outbound
			.send(Outbound::Frame(frame))
			.map_err(|_| Error::NotOpen(ConnectionState::Closed))
	}

	/// Waits until the handshake has finished.
	///
	/// Resolves immediately if the connection is already open, and fails if it
	/// closed before opening.
	pub async fn wait_open(&self) -> Result<()> {
		let mut state = self.state.subscribe();
		let current = *state
			.wait_for(|s| *s != ConnectionState::Connecting)
			.await
			.map_err(|_| Error::ConnectionClosed)?;

		match current {
			ConnectionState::Open => Ok(()),
			other => Err(Error::NotOpen(other)),
		}
	}

	/// Closes the connection. Idempotent.
	///
	/// The state is `Closed` as soon as this returns; the close handshake
	/// itself completes in the background.
	pub fn close(&self) {
		let previous = self.state.send_replace(ConnectionState::Closed);
		if previous != ConnectionState::Closed {
			debug!(target = "coderun.channel", %previous, "closing connection");
			let _ = self.outbound.send(Outbound::Close);
		}
	}
}

impl Drop for Channel {
	fn drop(&mut self) {
		self.close();
	}
}

impl fmt::Debug for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Channel").field("state", &self.state()).finish()
	}
}

async fn drive<F>(
	connect: F,
	state: Arc<watch::Sender<ConnectionState>>,
	mut outbound: mpsc::UnboundedReceiver<Outbound>,
	events: mpsc::UnboundedSender<ChannelEvent>,
) where
	F: Future<Output = Result<TransportParts>> + Send + 'static,
{
	// Frames cannot be queued before Open, so anything arriving here is a close.
	let parts = tokio::select! {
		result = connect => match result {
			Ok(parts) => parts,
			Err(e) => {
				error!(target = "coderun.channel", error = %e, "connection failed");
				state.send_replace(ConnectionState::Closed);
				let _ = events.send(ChannelEvent::Closed { reason: Some(e.to_string()) });
				return;
			}
		},
		_ = outbound.recv() => {
			debug!(target = "coderun.channel", "closed while connecting");
			state.send_replace(ConnectionState::Closed);
			let _ = events.send(ChannelEvent::Closed { reason: None });
			return;
		}
	};

	let TransportParts {
		mut sender,
		receiver,
		mut message_rx,
	} = parts;

	let opened = state.send_if_modified(|s| {
		if *s == ConnectionState::Connecting {
			*s = ConnectionState::Open;
			true
		} else {
			false
		}
	});
	if !opened {
		let _ = sender.close().await;
		let _ = events.send(ChannelEvent::Closed { reason: None });
		return;
	}

	info!(target = "coderun.channel", "connection established");
	let _ = events.send(ChannelEvent::Opened);

	let mut recv_task = tokio::spawn(receiver.run());

	let reason = loop {
		tokio::select! {
			command = outbound.recv() => match command {
				Some(Outbound::Frame(frame)) => {
					if let Err(e) = sender.send(frame).await {
						warn!(target = "coderun.channel", error = %e, "failed to send frame");
						let lost = e.is_closed();
						let _ = events.send(ChannelEvent::SendFailed(e));
						if lost {
							break Some("connection lost while sending".to_string());
						}
					}
				}
				Some(Outbound::Close) | None => {
					if let Err(e) = sender.close().await {
						debug!(target = "coderun.channel", error = %e, "close handshake failed");
					}
					break None;
				}
			},

			frame = message_rx.recv() => match frame {
				Some(frame) => {
					let _ = events.send(ChannelEvent::Message(frame));
				}
				None => {
					break match (&mut recv_task).await {
						Ok(Ok(())) => None,
						Ok(Err(e)) => Some(e.to_string()),
						Err(e) => Some(e.to_string()),
					};
				}
			},
		}
	};

	recv_task.abort();
	state.send_replace(ConnectionState::Closed);
	match &reason {
		Some(reason) => warn!(target = "coderun.channel", %reason, "connection closed"),
		None => info!(target = "coderun.channel", "connection closed"),
	}
	let _ = events.send(ChannelEvent::Closed { reason });
}
