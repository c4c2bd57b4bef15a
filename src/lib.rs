//! Chat Relay - conversation-memory relay between group chats and an LLM
//!
//! This library provides the core functionality for the relay:
//! - Exactly-once message handling across push webhooks and polling
//! - Per-user conversation memory with rolling-summary compaction
//! - Durable per-group checkpoints for restart recovery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Inbound                           │
//! │   GroupMe webhook  │  GroupMe poller  │  SMS webhook │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Delivery Reconciler                    │
//! │   Dedup  │  Checkpoints  │  Memory  │  Compaction    │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │         Completion service  │  GroupMe bot post      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod llm;
pub mod memory;
pub mod reconciler;

pub use channels::{GroupMeGateway, GroupMePush, GroupMessage, MessagingGateway};
pub use config::Config;
pub use daemon::Daemon;
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use llm::{CompletionClient, OpenAiClient};
pub use memory::{MemoryCompactor, MemoryConfig};
pub use reconciler::{
    DedupCache, DeliveryReconciler, PollReport, Poller, ProcessOutcome, PushOutcome,
};
