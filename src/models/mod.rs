//! Data models for chat entities

mod chat;
mod message;

pub use chat::*;
pub use message::*;
