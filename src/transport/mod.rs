//! Real-time chat stream
//!
//! One WebSocket per conversation room. Inbound frames are decoded and
//! handed to the owner over an mpsc channel, outbound sends are
//! fire-and-forget.

pub mod codec;
pub mod websocket;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{ChatMessage, RoomId};

pub use websocket::{ChatSocket, SocketEndpoint};

/// Lifecycle of a single connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection already used (state: {0:?})")]
    AlreadyUsed(ConnectionState),
    #[error("opening handshake timed out after {0:?}")]
    ConnectTimeout(Duration),
}

/// Connection seam used by the chat session.
#[async_trait]
pub trait ChatTransport: Send {
    /// Open the stream for `room` and start delivering decoded inbound
    /// messages to `deliveries`, in stream order.
    async fn connect(
        &mut self,
        room: &RoomId,
        sender_id: &str,
        credential: &str,
        deliveries: mpsc::UnboundedSender<ChatMessage>,
    ) -> Result<()>;

    /// Transmit one message. Failures are logged, never returned.
    async fn send(&mut self, message: &ChatMessage, recipient_id: &str);

    /// Close the stream. Safe to call in any state, any number of times.
    async fn disconnect(&mut self);

    fn state(&self) -> ConnectionState;
}
