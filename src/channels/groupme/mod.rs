//! `GroupMe` gateway: bot posts and group message polling

pub mod status;
pub mod types;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

pub use types::GroupMePush;

use self::types::{API_BASE, BotPost, MessagesEnvelope};
use super::{GroupMessage, MessagingGateway};
use crate::db::compare_message_ids;
use crate::{Error, Result};

/// `GroupMe` page size ceiling
pub const MAX_PAGE_SIZE: usize = 100;

/// `GroupMe` gateway
///
/// Posting needs the bot id; fetching needs a user access token. Either may
/// be absent, in which case the corresponding call fails with a
/// configuration error.
pub struct GroupMeGateway {
    client: reqwest::Client,
    api_base: String,
    bot_id: Option<SecretString>,
    access_token: Option<SecretString>,
}

impl std::fmt::Debug for GroupMeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupMeGateway")
            .field("api_base", &self.api_base)
            .field("can_post", &self.bot_id.is_some())
            .field("can_fetch", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

impl GroupMeGateway {
    /// Create a new gateway
    #[must_use]
    pub fn new(bot_id: Option<SecretString>, access_token: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            bot_id,
            access_token,
        }
    }

    /// Use a different API base (for tests against a local server)
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether a fetch can be attempted at all
    #[must_use]
    pub const fn can_fetch(&self) -> bool {
        self.access_token.is_some()
    }
}

#[async_trait]
impl MessagingGateway for GroupMeGateway {
    fn name(&self) -> &'static str {
        "groupme"
    }

    async fn post(&self, text: &str) -> Result<()> {
        let Some(bot_id) = &self.bot_id else {
            return Err(Error::Config("GROUPME_BOT_ID not set".to_string()));
        };

        let response = self
            .client
            .post(format!("{}/bots/post", self.api_base))
            .json(&BotPost {
                bot_id: bot_id.expose_secret(),
                text,
            })
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "GroupMe post sent");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!("post failed with {status}: {body}")));
        }

        Ok(())
    }

    async fn fetch_since(
        &self,
        group_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GroupMessage>> {
        let Some(token) = &self.access_token else {
            return Err(Error::Config("GROUPME_ACCESS_TOKEN not set".to_string()));
        };

        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query: Vec<(&str, &str)> =
            vec![("token", token.expose_secret()), ("limit", limit.as_str())];
        if let Some(after) = cursor {
            query.push(("after_id", after));
        }

        let response = self
            .client
            .get(format!("{}/groups/{group_id}/messages", self.api_base))
            .query(&query)
            .send()
            .await?;

        let code = response.status().as_u16();
        if status::is_no_new_messages(code) {
            return Ok(Vec::new());
        }
        if status::is_transient(code) {
            tracing::warn!(status = code, group_id, "GroupMe fetch throttled or unavailable");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Gateway(format!("fetch failed with {code}: {body}")));
        }

        let envelope: MessagesEnvelope = response.json().await?;
        let mut messages: Vec<GroupMessage> = envelope
            .response
            .map(|r| r.messages)
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.into_group_message(group_id))
            .collect();

        // Pages without a cursor come newest-first
        messages.sort_by(|a, b| compare_message_ids(&a.id, &b.id));

        if let Some(after) = cursor {
            messages.retain(|m| compare_message_ids(&m.id, after).is_gt());
        }

        Ok(messages)
    }
}
