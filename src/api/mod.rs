//! REST client for the chat backend

mod chat;
pub mod client;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatMessage, ChatSummary, GroupId};
use crate::transport::codec::SaveMessageRequest;

pub use chat::format_line;

/// REST operations the chat session depends on.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Recent conversations of `user_id`.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>>;

    /// Resolve or create the group for a participant pair. Repeated calls
    /// return the same group.
    async fn resolve_group(&self, user_id: &str, counterpart_id: &str) -> Result<GroupId>;

    /// Stored messages of a group, in server order.
    async fn fetch_history(&self, group: GroupId) -> Result<Vec<ChatMessage>>;

    async fn save_message(&self, request: &SaveMessageRequest) -> Result<()>;
}

/// List recent conversations
pub async fn list_chats() -> Result<()> {
    chat::list_chats().await
}

/// Print stored history of a conversation
pub async fn show_history(counterpart_id: &str) -> Result<()> {
    chat::show_history(counterpart_id).await
}
