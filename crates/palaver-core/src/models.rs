//! Data models for Palaver
//!
//! Defines the core data structures: User and Message, plus the payloads
//! the client submits when creating them. Wire shape is camelCase JSON,
//! matching what the chat server emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Login email, also used as the display name
    pub email: String,
    /// Avatar image URL, if the server assigned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Create a user with the given id and email
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            avatar_url: None,
        }
    }
}

/// Payload for creating a user account (signup)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
}

/// A chat message
///
/// Immutable once created. The server assigns `id` and `created_at`;
/// `user` is the author snapshot the server may embed when resolving
/// `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier
    pub id: Uuid,
    /// Message body
    pub text: String,
    /// Server-assigned creation time, the ordering key
    pub created_at: DateTime<Utc>,
    /// Author id
    pub user_id: Uuid,
    /// Author snapshot, when the server embeds it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl Message {
    /// Ordering key: chronological, ties broken by id for determinism
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }

    /// Author email for display, if the snapshot is present
    pub fn author_email(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.email.as_str())
    }
}

/// Payload for creating a message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub text: String,
}

impl NewMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
