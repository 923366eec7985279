//! Chat session: one conversation screen's worth of state
//!
//! Binds a room and the local identity to a transport connection and the
//! REST backend. The task that owns a `ChatSession` is the only one that
//! touches its message list; inbound frames reach it through `recv()`.

pub mod interactive;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::api::ChatBackend;
use crate::auth::CredentialProvider;
use crate::models::{ChatMessage, GroupId, RoomId};
use crate::transport::{codec, ChatTransport, ConnectionState};

/// Optimistic messages remembered for echo matching.
const PENDING_ECHO_LIMIT: usize = 64;
/// An echo arriving later than this is treated as a new message.
const PENDING_ECHO_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("conversation not ready yet (no chat group)")]
    NoGroup,
}

/// A sent message not yet seen coming back from the server.
struct PendingEcho {
    id: String,
    content: String,
    sent_at: Instant,
}

pub struct ChatSession {
    user_id: String,
    counterpart_id: String,
    room: RoomId,
    group_id: Option<GroupId>,
    messages: Vec<ChatMessage>,
    pending: VecDeque<PendingEcho>,
    backend: Arc<dyn ChatBackend>,
    credentials: Arc<dyn CredentialProvider>,
    transport: Box<dyn ChatTransport>,
    inbound: Option<mpsc::UnboundedReceiver<ChatMessage>>,
}

impl ChatSession {
    pub fn new(
        user_id: &str,
        counterpart_id: &str,
        backend: Arc<dyn ChatBackend>,
        credentials: Arc<dyn CredentialProvider>,
        transport: Box<dyn ChatTransport>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            room: RoomId::for_pair(user_id, counterpart_id),
            group_id: None,
            messages: Vec::new(),
            pending: VecDeque::new(),
            backend,
            credentials,
            transport,
            inbound: None,
        }
    }

    /// Resolve the group, load history, then open the live stream.
    ///
    /// Only a failed group lookup is returned as an error. History,
    /// credential and connect failures are logged and leave the session
    /// usable without that piece.
    pub async fn activate(&mut self) -> Result<()> {
        let group = self
            .backend
            .resolve_group(&self.user_id, &self.counterpart_id)
            .await
            .context("Failed to resolve chat group");
        let group = match group {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!("{:#}", e);
                return Err(e);
            }
        };
        self.group_id = Some(group);
        tracing::info!("Chat group {} (room {})", group, self.room);

        match self.backend.fetch_history(group).await {
            Ok(history) => {
                tracing::info!("Loaded {} messages", history.len());
                self.messages = history;
            }
            Err(e) => tracing::warn!("Failed to load history: {:#}", e),
        }

        let credential = match self.credentials.fresh_credential().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("No credential for chat stream: {:#}", e);
                return Ok(());
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        match self
            .transport
            .connect(&self.room, &self.user_id, &credential, tx)
            .await
        {
            Ok(()) => self.inbound = Some(rx),
            Err(e) => tracing::warn!("Chat stream unavailable: {:#}", e),
        }

        Ok(())
    }

    /// Validate, append locally, transmit, and persist one message.
    ///
    /// Transmission and persistence are independent: either can fail
    /// without the other being undone.
    pub async fn send(&mut self, text: &str) -> Result<ChatMessage, ComposeError> {
        if text.trim().is_empty() {
            return Err(ComposeError::EmptyMessage);
        }
        let group = self.group_id.ok_or(ComposeError::NoGroup)?;

        let message = ChatMessage::outgoing(&self.user_id, text);
        self.messages.push(message.clone());
        if let Some(id) = &message.id {
            self.pending.push_back(PendingEcho {
                id: id.clone(),
                content: message.content.clone(),
                sent_at: Instant::now(),
            });
            if self.pending.len() > PENDING_ECHO_LIMIT {
                self.pending.pop_front();
            }
        }

        self.transport.send(&message, &self.counterpart_id).await;

        let backend = Arc::clone(&self.backend);
        let request = codec::save_request(group, &message);
        tokio::spawn(async move {
            if let Err(e) = backend.save_message(&request).await {
                tracing::warn!("Failed to save message: {:#}", e);
            }
        });

        Ok(message)
    }

    /// Wait for the next inbound message and append it.
    ///
    /// Returns `None` once the stream has ended (or was never opened).
    /// Echoes of our own optimistic messages are absorbed, not returned.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        loop {
            let message = self.inbound.as_mut()?.recv().await;
            let Some(message) = message else {
                self.inbound = None;
                return None;
            };
            if let Some(appended) = self.apply_inbound(message) {
                return Some(appended);
            }
        }
    }

    fn apply_inbound(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.expire_pending(Instant::now());
        if self.is_echo(&message) {
            tracing::debug!("Echo of own message absorbed: {:?}", message.id);
            return None;
        }
        self.messages.push(message.clone());
        Some(message)
    }

    /// Forget sends older than the echo window.
    fn expire_pending(&mut self, now: Instant) {
        self.pending
            .retain(|p| now.saturating_duration_since(p.sent_at) <= PENDING_ECHO_WINDOW);
    }

    /// Matches by id first. A frame without an id is our own outbound frame
    /// relayed back, so it is matched by content against unconfirmed sends.
    fn is_echo(&mut self, message: &ChatMessage) -> bool {
        if let Some(id) = &message.id {
            if let Some(pos) = self.pending.iter().position(|p| &p.id == id) {
                self.pending.remove(pos);
                return true;
            }
            return self
                .messages
                .iter()
                .any(|m| m.id.as_deref() == Some(id.as_str()));
        }

        if message.is_from(&self.user_id) {
            if let Some(pos) = self
                .pending
                .iter()
                .position(|p| p.content == message.content)
            {
                self.pending.remove(pos);
                return true;
            }
        }

        false
    }

    /// Close the stream. Pending saves are left to finish on their own.
    pub async fn teardown(&mut self) {
        self.transport.disconnect().await;
        self.inbound = None;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }
}
