//! Conversation, history and save endpoints

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::client::BackendClient;
use super::ChatBackend;
use crate::config::Config;
use crate::models::{ChatMessage, ChatSummary, GroupId};
use crate::transport::codec::{self, SaveMessageRequest};

#[derive(Debug, Deserialize)]
struct GroupResponse {
    id: GroupId,
}

#[async_trait]
impl ChatBackend for BackendClient {
    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        let resp = self.get(&["chats", user_id]).await?;
        resp.json()
            .await
            .context("Failed to parse conversations response")
    }

    async fn resolve_group(&self, user_id: &str, counterpart_id: &str) -> Result<GroupId> {
        let resp = self
            .get(&["chat", "group", user_id, counterpart_id])
            .await?;
        let group: GroupResponse = resp
            .json()
            .await
            .context("Failed to parse chat group response")?;
        tracing::debug!("Chat group {} for {}/{}", group.id, user_id, counterpart_id);
        Ok(group.id)
    }

    async fn fetch_history(&self, group: GroupId) -> Result<Vec<ChatMessage>> {
        let group = group.to_string();
        let resp = self.get(&["messages", "group", &group]).await?;
        let body = resp
            .bytes()
            .await
            .context("Failed to read history response")?;
        codec::decode_history(&body).context("Failed to parse history response")
    }

    async fn save_message(&self, request: &SaveMessageRequest) -> Result<()> {
        self.post(&["chat", "save"], request).await?;
        tracing::debug!("Message saved to group {}", request.group);
        Ok(())
    }
}

/// List recent conversations (prints to stdout).
pub async fn list_chats() -> Result<()> {
    let config = Config::load()?;
    let user_id = config.require_user_id()?;
    let client = BackendClient::new(&config)?;
    let chats = client.list_chats(&user_id).await?;

    println!("\nMessages:");
    println!("{:-<60}", "");

    if chats.is_empty() {
        println!("  (no messages yet)");
        return Ok(());
    }

    for chat in &chats {
        println!("{}", chat.counterpart.full_name);
        println!("  {}", chat.counterpart.specialty);
        println!("  ID: {}", chat.counterpart.firebase_id);
        println!("  Group: {}", chat.id);
        println!();
    }

    Ok(())
}

/// Print the stored history of the conversation with `counterpart_id`.
pub async fn show_history(counterpart_id: &str) -> Result<()> {
    let config = Config::load()?;
    let user_id = config.require_user_id()?;
    let client = BackendClient::new(&config)?;

    let group = client.resolve_group(&user_id, counterpart_id).await?;
    let msgs = client.fetch_history(group).await?;

    if msgs.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    for msg in &msgs {
        println!("{}", format_line(msg, &user_id));
    }

    Ok(())
}

/// One display line: `[HH:MM] sender: content`, local time.
pub fn format_line(msg: &ChatMessage, user_id: &str) -> String {
    let time = msg
        .timestamp
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let sender = if msg.is_from(user_id) {
        "me"
    } else {
        msg.sender_id.as_str()
    };
    format!("[{}] {}: {}", time, sender, msg.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::with_http(reqwest::Client::new(), &format!("{}/api", server.uri()))
    }

    #[tokio::test]
    async fn test_resolve_group() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/group/alice/bob/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "user": "alice"})))
            .expect(1)
            .mount(&server)
            .await;

        let group = client(&server).resolve_group("alice", "bob").await.unwrap();
        assert_eq!(group, 42);
    }

    #[tokio::test]
    async fn test_resolve_group_escapes_counterpart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chat/group/alice/b%2Fc%3Fx=1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let group = client(&server).resolve_group("alice", "b/c?x=1").await.unwrap();
        assert_eq!(group, 7);
    }

    #[tokio::test]
    async fn test_fetch_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/group/42/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "sender_id": "bob", "content": "hi", "timestamp": "2024-01-01T10:00:00Z"},
                {"content": "orphan"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let msgs = client(&server).fetch_history(42).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_save_message_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat/save/"))
            .and(body_partial_json(json!({
                "group": 42,
                "sender_id": "alice",
                "content": "hello"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let request = SaveMessageRequest {
            group: 42,
            sender_id: "alice".into(),
            content: "hello".into(),
            timestamp: "2024-01-01T10:00:00+00:00".into(),
        };
        client(&server).save_message(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/messages/group/7/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
            .mount(&server)
            .await;

        let err = client(&server).fetch_history(7).await.unwrap_err();
        let text = format!("{:#}", err);
        assert!(text.contains("HTTP 404"), "{}", text);
    }

    #[tokio::test]
    async fn test_unauthorized_hints_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/alice/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).list_chats("alice").await.unwrap_err();
        assert!(format!("{:#}", err).contains("umit-chat login"));
    }

    #[tokio::test]
    async fn test_list_chats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/chats/alice/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 3,
                "doctor": {
                    "id": 1,
                    "doctor_firebase_id": "doc",
                    "medic_name": "Dr. A",
                    "speciality": "ENT",
                    "medic_image": "https://img"
                }
            }])))
            .mount(&server)
            .await;

        let chats = client(&server).list_chats("alice").await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].counterpart.full_name, "Dr. A");
    }

    #[test]
    fn test_format_line_marks_own_messages() {
        let mut msg = ChatMessage::outgoing("alice", "hello");
        msg.timestamp = None;
        assert_eq!(format_line(&msg, "alice"), "[--:--] me: hello");
        assert_eq!(format_line(&msg, "bob"), "[--:--] alice: hello");
    }
}
