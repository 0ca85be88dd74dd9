//! Message transports.
//!
//! A transport is split into two halves so writing and reading never contend:
//! a [`Transport`] that writes frames, and a [`TransportReceiver`] that pumps
//! inbound frames into an unbounded queue until the peer goes away. Frames are
//! opaque UTF-8 text at this layer; interpretation belongs to the codec.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Writing half of a connection.
pub trait Transport: Send {
	/// Writes one frame.
	fn send(&mut self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Starts a graceful close. Closing an already closed transport is not an error.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Reading half of a connection.
pub trait TransportReceiver: Send {
	/// Forwards inbound frames until the peer closes or the queue is dropped.
	///
	/// The inbound queue's sender is dropped when this future completes, which
	/// is how consumers observe the end of the stream.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves of a transport plus the queue inbound frames arrive on.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<String>,
}

/// WebSocket client transport over TCP or TLS.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl WebSocketTransport {
	/// Performs the WebSocket handshake with `url` (`ws://` or `wss://`).
	///
	/// Returns the transport and the queue its receiver will fill.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
		let (ws, response) = connect_async(url).await?;
		debug!(target = "coderun.channel", url, status = %response.status(), "websocket handshake complete");

		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { sink, stream, message_tx }, message_rx))
	}

	/// Splits into the parts a [`Channel`](crate::Channel) drives.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<String>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketSender { sink: self.sink }),
			receiver: Box::new(WebSocketReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			trace!(target = "coderun.channel", bytes = frame.len(), "send frame");
			self.sink.send(Message::Text(frame.into())).await.map_err(map_closed)
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) => Ok(()),
				Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
				Err(e) => Err(e.into()),
			}
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.stream.next().await {
				let frame = match message {
					Ok(Message::Text(text)) => text.to_string(),
					Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
						Ok(text) => text.to_string(),
						Err(e) => {
							warn!(target = "coderun.channel", error = %e, "dropping non-UTF-8 binary frame");
							continue;
						}
					},
					Ok(Message::Close(frame)) => {
						debug!(target = "coderun.channel", ?frame, "peer sent close frame");
						break;
					}
					Ok(_) => continue,
					Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
					Err(e) => return Err(e.into()),
				};

				trace!(target = "coderun.channel", bytes = frame.len(), "received frame");
				if self.message_tx.send(frame).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

fn map_closed(error: tungstenite::Error) -> Error {
	match error {
		tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Error::ConnectionClosed,
		other => other.into(),
	}
}
