//! Chat WebSocket connection and frame handling

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{codec, ChatTransport, ConnectionState, TransportError};
use crate::config::Config;
use crate::models::{ChatMessage, RoomId};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Where and how to open room streams.
#[derive(Debug, Clone)]
pub struct SocketEndpoint {
    /// `wss://host` (or `ws://` for local servers), without the room path.
    pub base_url: String,
    /// Also send the sender id as `?token=`, for servers on the old contract.
    pub legacy_token_query: bool,
    pub connect_timeout: Duration,
}

impl SocketEndpoint {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.socket_url.clone(),
            legacy_token_query: config.legacy_token_query,
            connect_timeout: config.request_timeout(),
        }
    }

    /// `{base}/ws/chat/{room}/`, with the room percent-encoded as one segment.
    pub fn room_url(&self, room: &RoomId, sender_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid socket URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Socket URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(["ws", "chat", room.as_str(), ""]);
        if self.legacy_token_query {
            url.query_pairs_mut().append_pair("token", sender_id);
        }
        Ok(url)
    }

    /// Perform the opening handshake with the credential as a bearer header.
    pub async fn open(&self, room: &RoomId, sender_id: &str, credential: &str) -> Result<WsStream> {
        let url = self.room_url(room, sender_id)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .context("Failed to build WebSocket request")?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential))
            .context("Credential is not a valid header value")?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        tracing::info!("Connecting WebSocket to {}", url);

        let timeout = self.connect_timeout;
        let (stream, response) = time::timeout(timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::ConnectTimeout(timeout))?
            .context("WebSocket connection failed")?;

        tracing::info!("WebSocket connected (status={})", response.status());
        Ok(stream)
    }
}

/// One room stream. Built per chat session and discarded once closed.
pub struct ChatSocket {
    endpoint: SocketEndpoint,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl ChatSocket {
    pub fn new(endpoint: SocketEndpoint) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            endpoint,
            state: Arc::new(state),
            writer: None,
            reader: None,
        }
    }
}

#[async_trait]
impl ChatTransport for ChatSocket {
    async fn connect(
        &mut self,
        room: &RoomId,
        sender_id: &str,
        credential: &str,
        deliveries: mpsc::UnboundedSender<ChatMessage>,
    ) -> Result<()> {
        let current = *self.state.borrow();
        if current != ConnectionState::Idle {
            return Err(TransportError::AlreadyUsed(current).into());
        }
        self.state.send_replace(ConnectionState::Connecting);

        let stream = match self.endpoint.open(room, sender_id, credential).await {
            Ok(s) => s,
            Err(e) => {
                self.state.send_replace(ConnectionState::Closed);
                return Err(e);
            }
        };

        let (writer, reader) = stream.split();
        self.writer = Some(writer);
        self.state.send_replace(ConnectionState::Open);
        self.reader = Some(tokio::spawn(receive_loop(
            reader,
            deliveries,
            Arc::clone(&self.state),
        )));

        Ok(())
    }

    async fn send(&mut self, message: &ChatMessage, recipient_id: &str) {
        let Some(writer) = self.writer.as_mut() else {
            tracing::warn!(
                "Dropping outbound message, socket not open (state: {:?})",
                *self.state.borrow()
            );
            return;
        };

        let frame = match codec::encode_outbound(message, recipient_id) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Failed to encode outbound message: {}", e);
                return;
            }
        };

        tracing::debug!("WS send: {}", frame);
        if let Err(e) = writer.send(Message::Text(frame)).await {
            tracing::warn!("Failed to send WebSocket message: {}", e);
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }));
            if let Err(e) = writer.send(close).await {
                tracing::debug!("Close frame not sent: {}", e);
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        let previous = *self.state.borrow();
        match previous {
            ConnectionState::Idle => {}
            ConnectionState::Closed => tracing::debug!("WebSocket already closed"),
            _ => {
                self.state.send_replace(ConnectionState::Closed);
                tracing::info!("WebSocket disconnected");
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Forward decoded frames until the stream ends.
///
/// Undecodable frames are skipped. A close frame, a transport error or the
/// receiving side going away all end the loop; there is no reconnect.
async fn receive_loop(
    mut reader: SplitStream<WsStream>,
    deliveries: mpsc::UnboundedSender<ChatMessage>,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    while let Some(frame) = reader.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => {
                tracing::debug!("WS recv: {}", text);
                text.into_bytes()
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!("WS recv: {} bytes", data.len());
                data
            }
            Ok(Message::Close(frame)) => {
                tracing::info!("WebSocket closed: {:?}", frame);
                break;
            }
            Ok(other) => {
                tracing::debug!("WS frame (ignored): {:?}", other);
                continue;
            }
            Err(e) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match codec::decode_frame(&payload) {
            Ok(message) => {
                if deliveries.send(message).is_err() {
                    tracing::debug!("Delivery channel closed, stopping receive loop");
                    break;
                }
            }
            Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
        }
    }

    state.send_replace(ConnectionState::Closed);
}
