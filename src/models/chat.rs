//! Chat-related models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Server-side conversation record id.
pub type GroupId = i64;

/// Stream routing key for a pair of participants.
///
/// Both identities sorted and joined with `_`, so either side derives the
/// same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_pair(a: &str, b: &str) -> Self {
        let mut pair = [a, b];
        pair.sort_unstable();
        Self(pair.join("_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counterpart profile attached to a conversation summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counterpart {
    pub id: i64,
    #[serde(rename = "doctor_firebase_id")]
    pub firebase_id: String,
    #[serde(rename = "medic_name")]
    pub full_name: String,
    #[serde(rename = "speciality")]
    pub specialty: String,
    #[serde(rename = "medic_image", default)]
    pub image_url: Option<String>,
}

/// Entry of the recent conversations list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: GroupId,
    #[serde(rename = "doctor")]
    pub counterpart: Counterpart,
}
