//! `GroupMe` API and callback types

use serde::{Deserialize, Serialize};

use crate::channels::GroupMessage;

/// `GroupMe` API base URL
pub const API_BASE: &str = "https://api.groupme.com/v3";

/// Sender type reported for bot posts
pub const SENDER_TYPE_BOT: &str = "bot";

/// Sender type reported for platform notices
pub const SENDER_TYPE_SYSTEM: &str = "system";

/// Bot callback payload delivered to the push webhook
///
/// Every field is optional so a malformed or partial callback still
/// deserializes and gets acknowledged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMePush {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub system: bool,
}

impl GroupMePush {
    /// Whether a bot (possibly this relay) posted the message
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.sender_type.as_deref() == Some(SENDER_TYPE_BOT)
    }

    /// Whether the message is a platform notice
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system || self.sender_type.as_deref() == Some(SENDER_TYPE_SYSTEM)
    }

    /// Identifier used to key the sender's conversation memory
    #[must_use]
    pub fn user_key(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.sender_id.as_deref())
    }
}

/// Envelope of `GET /groups/:id/messages`
#[derive(Debug, Deserialize)]
pub struct MessagesEnvelope {
    pub response: Option<MessagesResponse>,
}

/// Payload of the messages endpoint
#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

/// A message as returned by the messages endpoint
#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    pub id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub system: bool,
}

impl ApiMessage {
    /// Convert into the platform-neutral form
    #[must_use]
    pub fn into_group_message(self, fallback_group: &str) -> GroupMessage {
        let is_bot = self.sender_type.as_deref() == Some(SENDER_TYPE_BOT);
        let is_system = self.system || self.sender_type.as_deref() == Some(SENDER_TYPE_SYSTEM);
        let sender_id = self
            .user_id
            .or(self.sender_id)
            .unwrap_or_default();

        GroupMessage {
            id: self.id,
            group_id: self.group_id.unwrap_or_else(|| fallback_group.to_string()),
            text: self.text.unwrap_or_default(),
            sender_id,
            sender_name: self.name.unwrap_or_else(|| "User".to_string()),
            is_system,
            is_bot,
        }
    }
}

/// Body of `POST /bots/post`
#[derive(Debug, Serialize)]
pub struct BotPost<'a> {
    pub bot_id: &'a str,
    pub text: &'a str,
}
