//! Language-model completion clients

mod openai;

use async_trait::async_trait;

pub use openai::{DEFAULT_BASE_URL, OpenAiClient};

use crate::Result;
use crate::db::Turn;

/// Generates a reply for an ordered list of role-tagged turns
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a completion
    ///
    /// # Errors
    ///
    /// Returns error if the service is unreachable, rejects the request,
    /// or returns no content
    async fn complete(&self, messages: &[Turn], temperature: f32, max_tokens: u32)
    -> Result<String>;
}
