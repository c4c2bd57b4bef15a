//! Delivery reconciliation: exactly-once processing across push and poll
//!
//! Messages reach the relay two ways: the platform pushes them to the
//! webhook, and the poller pulls them after the persisted per-group
//! checkpoint. Both paths funnel into [`DeliveryReconciler::process_message`],
//! where the shared [`DedupCache`] lets the first arrival win.

pub mod dedup;
pub mod poller;

use std::sync::Arc;

pub use dedup::DedupCache;
pub use poller::Poller;

use crate::Result;
use crate::channels::{GroupMePush, MessagingGateway};
use crate::db::{CheckpointRepo, ConversationRepo, Turn};
use crate::llm::CompletionClient;
use crate::memory::MemoryCompactor;

/// Reply sent when the completion service fails
pub const FALLBACK_REPLY: &str = "⚠️ Sorry, I had trouble thinking of a response.";

const REPLY_TEMPERATURE: f32 = 0.7;
const REPLY_MAX_TOKENS: u32 = 300;

/// Default number of messages requested per fetch
pub const DEFAULT_FETCH_LIMIT: usize = 20;

/// Tunables for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Messages requested per fetch
    pub fetch_limit: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

/// What happened to a pushed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sent by a bot, possibly this relay
    IgnoredBot,
    /// Platform notice
    IgnoredSystem,
    /// Missing message id or sender
    Malformed,
    /// Handed to the pipeline
    Handled(ProcessOutcome),
}

/// What happened to a message handed to the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already seen by this reconciler
    Duplicate,
    /// No text to answer
    Empty,
    /// A reply was generated and a post attempted
    Replied {
        /// The fallback text was used
        degraded: bool,
        /// The gateway accepted the post
        posted: bool,
    },
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Messages returned by the fetch
    pub fetched: usize,
    /// Messages that produced a reply attempt
    pub processed: usize,
    /// Bot, system, empty and duplicate messages
    pub skipped: usize,
    /// Checkpoint after the cycle
    pub checkpoint: Option<String>,
}

/// Generated reply for one user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// The completion failed and `text` is the fallback
    pub degraded: bool,
}

/// Persona and fallback text for one delivery surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyStyle<'a> {
    /// Leading system turn for conversations that do not have one yet
    pub system_prompt: &'a str,
    /// Sent when the completion service fails
    pub fallback: &'a str,
}

/// Routes inbound messages through memory, completion and delivery
pub struct DeliveryReconciler {
    conversations: ConversationRepo,
    checkpoints: CheckpointRepo,
    memory: MemoryCompactor,
    completion: Arc<dyn CompletionClient>,
    gateway: Arc<dyn MessagingGateway>,
    dedup: DedupCache,
    config: ReconcilerConfig,
}

impl DeliveryReconciler {
    /// Create a new reconciler
    #[must_use]
    pub fn new(
        conversations: ConversationRepo,
        checkpoints: CheckpointRepo,
        memory: MemoryCompactor,
        completion: Arc<dyn CompletionClient>,
        gateway: Arc<dyn MessagingGateway>,
        dedup: DedupCache,
    ) -> Self {
        Self {
            conversations,
            checkpoints,
            memory,
            completion,
            gateway,
            dedup,
            config: ReconcilerConfig::default(),
        }
    }

    /// Override the default tunables
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Messages requested per fetch
    #[must_use]
    pub const fn fetch_limit(&self) -> usize {
        self.config.fetch_limit
    }

    /// Conversation store used by this reconciler
    #[must_use]
    pub const fn conversations(&self) -> &ConversationRepo {
        &self.conversations
    }

    /// Checkpoint store used by this reconciler
    #[must_use]
    pub const fn checkpoints(&self) -> &CheckpointRepo {
        &self.checkpoints
    }

    /// Handle a message delivered by the push webhook
    ///
    /// The group checkpoint moves to the message before processing, so the
    /// poller will not fetch it again.
    pub async fn on_push(&self, push: &GroupMePush) -> PushOutcome {
        if push.is_bot() {
            tracing::debug!(message_id = ?push.id, "ignoring bot message");
            return PushOutcome::IgnoredBot;
        }
        if push.is_system() {
            tracing::debug!(message_id = ?push.id, "ignoring system message");
            return PushOutcome::IgnoredSystem;
        }

        let (Some(message_id), Some(user_id)) = (push.id.as_deref(), push.user_key()) else {
            tracing::warn!("push payload without message id or sender");
            return PushOutcome::Malformed;
        };

        if let Some(group_id) = push.group_id.as_deref() {
            self.checkpoints.advance(group_id, message_id).await;
        }

        let sender_name = push.name.as_deref().unwrap_or("User");
        let text = push.text.as_deref().unwrap_or_default();

        PushOutcome::Handled(
            self.process_message(message_id, user_id, sender_name, text)
                .await,
        )
    }

    /// Fetch and handle every message after the group's checkpoint
    ///
    /// The checkpoint advances past each message only once it has been
    /// skipped or a reply attempted. Dropping the future mid-cycle leaves
    /// the unfinished message to be fetched again.
    ///
    /// # Errors
    ///
    /// Returns error if the fetch fails
    pub async fn poll_once(&self, group_id: &str) -> Result<PollReport> {
        let cursor = self.checkpoints.get(group_id).await;
        let messages = self
            .gateway
            .fetch_since(group_id, cursor.as_deref(), self.config.fetch_limit)
            .await?;

        let mut report = PollReport {
            fetched: messages.len(),
            checkpoint: cursor,
            ..PollReport::default()
        };

        for message in messages {
            if message.is_skippable() {
                report.skipped += 1;
            } else {
                let outcome = self
                    .process_message(
                        &message.id,
                        &message.sender_id,
                        &message.sender_name,
                        &message.text,
                    )
                    .await;

                match outcome {
                    ProcessOutcome::Replied { .. } => report.processed += 1,
                    ProcessOutcome::Duplicate | ProcessOutcome::Empty => report.skipped += 1,
                }
            }

            self.checkpoints.advance(group_id, &message.id).await;
            report.checkpoint = Some(message.id);
        }

        if report.fetched > 0 {
            tracing::info!(
                group_id,
                fetched = report.fetched,
                processed = report.processed,
                skipped = report.skipped,
                checkpoint = ?report.checkpoint,
                "poll cycle complete"
            );
        }

        Ok(report)
    }

    /// Reply to one message unless this reconciler has already seen it
    pub async fn process_message(
        &self,
        message_id: &str,
        user_id: &str,
        sender_name: &str,
        text: &str,
    ) -> ProcessOutcome {
        if text.trim().is_empty() {
            tracing::debug!(message_id, "skipping message without text");
            return ProcessOutcome::Empty;
        }

        if !self.dedup.insert(message_id) {
            tracing::debug!(message_id, "duplicate message");
            return ProcessOutcome::Duplicate;
        }

        tracing::info!(message_id, user_id, sender_name, "processing message");

        let reply = self.generate_reply(user_id, text).await;

        let posted = match self.gateway.post(&reply.text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    message_id,
                    gateway = self.gateway.name(),
                    error = %e,
                    "failed to post reply"
                );
                false
            }
        };

        ProcessOutcome::Replied {
            degraded: reply.degraded,
            posted,
        }
    }

    /// Group chat style: the configured system prompt and [`FALLBACK_REPLY`]
    #[must_use]
    pub fn group_style(&self) -> ReplyStyle<'_> {
        ReplyStyle {
            system_prompt: &self.memory.config().system_prompt,
            fallback: FALLBACK_REPLY,
        }
    }

    /// Generate a group chat reply, without dedup or posting
    pub async fn generate_reply(&self, user_id: &str, text: &str) -> Reply {
        self.generate_reply_as(user_id, text, self.group_style()).await
    }

    /// Generate a reply in `style` and record the exchange
    ///
    /// On completion failure the style's fallback is returned and only the
    /// user turn is recorded.
    pub async fn generate_reply_as(
        &self,
        user_id: &str,
        text: &str,
        style: ReplyStyle<'_>,
    ) -> Reply {
        let mut record = self.conversations.load(user_id).await;
        record.ensure_system_turn(style.system_prompt);

        let context = self
            .memory
            .build_context(&record.history, &record.summary, text);

        let reply = match self
            .completion
            .complete(&context.messages, REPLY_TEMPERATURE, REPLY_MAX_TOKENS)
            .await
        {
            Ok(text) => Reply {
                text,
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(user_id, error = %e, "completion failed, using fallback reply");
                Reply {
                    text: style.fallback.to_string(),
                    degraded: true,
                }
            }
        };

        record.history.push(Turn::user(text));
        if !reply.degraded {
            record.history.push(Turn::assistant(reply.text.clone()));
        }

        if self.memory.needs_compaction(record.history.len()) {
            let compaction = self.memory.compact(&record.history, &record.summary).await;
            record.history = compaction.history;
            record.summary = compaction.summary;
        }

        self.conversations.save(user_id, &record).await;

        reply
    }
}
