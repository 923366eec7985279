//! Line-oriented chat in the terminal

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;

use super::{ChatSession, ComposeError};
use crate::api::client::BackendClient;
use crate::api::format_line;
use crate::auth::FirebaseCredentials;
use crate::config::Config;
use crate::transport::{ChatSocket, ConnectionState, SocketEndpoint};

/// Open the conversation with `counterpart_id` until `/quit`, EOF or Ctrl-C.
pub async fn run(counterpart_id: &str) -> Result<()> {
    let config = Config::load()?;
    let user_id = config.require_user_id()?;

    let backend = Arc::new(BackendClient::new(&config)?);
    let credentials = Arc::new(FirebaseCredentials::new(&config)?);
    let socket = ChatSocket::new(SocketEndpoint::from_config(&config));
    let mut session = ChatSession::new(
        &user_id,
        counterpart_id,
        backend,
        credentials,
        Box::new(socket),
    );

    session.activate().await?;

    for msg in session.messages() {
        println!("{}", format_line(msg, &user_id));
    }
    if session.state() == ConnectionState::Open {
        println!(
            "-- connected to {} (group {}), type /quit to leave --",
            session.room(),
            session.group_id().unwrap_or_default()
        );
    } else {
        println!("-- live updates unavailable, messages are still saved --");
    }

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut live = session.state() == ConnectionState::Open;

    loop {
        tokio::select! {
            inbound = session.recv(), if live => match inbound {
                Some(msg) => println!("{}", format_line(&msg, &user_id)),
                None => {
                    println!("-- connection closed --");
                    live = false;
                }
            },
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if line.trim() == "/quit" {
                        break;
                    }
                    match session.send(&line).await {
                        Ok(_) | Err(ComposeError::EmptyMessage) => {}
                        Err(e) => eprintln!("Not sent: {}", e),
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("Failed to read input: {}", e);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    session.teardown().await;
    Ok(())
}
