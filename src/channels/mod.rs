//! Messaging platform adapters
//!
//! The relay talks to a platform through `MessagingGateway`: post a reply
//! into the group, and fetch messages newer than a cursor for polling.

pub mod groupme;

use async_trait::async_trait;

pub use groupme::{GroupMeGateway, GroupMePush};

use crate::Result;

/// A message fetched from a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    /// Platform message id, increasing within a group
    pub id: String,

    /// Group the message was posted in
    pub group_id: String,

    /// Message text (empty for attachment-only messages)
    pub text: String,

    /// Sender identifier
    pub sender_id: String,

    /// Sender display name
    pub sender_name: String,

    /// Platform-generated notice (member joined, topic changed, ...)
    pub is_system: bool,

    /// Posted by a bot, including this relay
    pub is_bot: bool,
}

impl GroupMessage {
    /// Whether the relay should never hand this message to the model
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        self.is_system || self.is_bot
    }
}

/// Trait for messaging platform adapters
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Get the platform name
    fn name(&self) -> &'static str;

    /// Post a message into the bot's group
    ///
    /// # Errors
    ///
    /// Returns error if the platform rejects or never receives the post
    async fn post(&self, text: &str) -> Result<()>;

    /// Fetch messages after `cursor`, oldest first
    ///
    /// A `None` cursor fetches the most recent page. Rate limiting and
    /// server-side failures yield an empty list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns error on network failures or malformed responses
    async fn fetch_since(
        &self,
        group_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GroupMessage>>;
}
