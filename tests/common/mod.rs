//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chat_relay::db::{self, CheckpointRepo, ConversationRepo, Turn};
use chat_relay::{
    CompletionClient, DbPool, DedupCache, DeliveryReconciler, Error, GroupMessage,
    MemoryCompactor, MemoryConfig, MessagingGateway, Result,
};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Completion client that records every request
#[derive(Default)]
pub struct MockCompletion {
    reply: Option<String>,
    /// Requests whose last turn contains this text never complete
    hang_on: Option<String>,
    calls: Mutex<Vec<Vec<Turn>>>,
}

impl MockCompletion {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging_on(reply: &str, marker: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            hang_on: Some(marker.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Vec<Turn>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(
        &self,
        messages: &[Turn],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());

        if let Some(marker) = &self.hang_on {
            let last = messages.last().map(|t| t.content.as_str()).unwrap_or_default();
            if last.contains(marker.as_str()) {
                std::future::pending::<()>().await;
            }
        }

        self.reply
            .clone()
            .ok_or_else(|| Error::Completion("mock failure".to_string()))
    }
}

/// Gateway backed by an in-memory group timeline
#[derive(Default)]
pub struct MockGateway {
    timeline: Mutex<Vec<GroupMessage>>,
    posts: Mutex<Vec<String>>,
    fail_fetch: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_messages(messages: Vec<GroupMessage>) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.timeline.lock().unwrap() = messages;
        Arc::new(gateway)
    }

    pub fn push_message(&self, message: GroupMessage) {
        self.timeline.lock().unwrap().push(message);
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn post(&self, text: &str) -> Result<()> {
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn fetch_since(
        &self,
        _group_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GroupMessage>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Gateway("mock fetch failure".to_string()));
        }

        let timeline = self.timeline.lock().unwrap();
        let after: Vec<GroupMessage> = timeline
            .iter()
            .filter(|m| {
                cursor.is_none_or(|c| {
                    db::compare_message_ids(&m.id, c) == std::cmp::Ordering::Greater
                })
            })
            .cloned()
            .collect();

        Ok(after.into_iter().take(limit).collect())
    }
}

/// Build a reconciler over the given collaborators
pub fn reconciler(
    db: &DbPool,
    completion: Arc<MockCompletion>,
    gateway: Arc<MockGateway>,
) -> DeliveryReconciler {
    DeliveryReconciler::new(
        ConversationRepo::new(db.clone()),
        CheckpointRepo::new(db.clone()),
        MemoryCompactor::new(MemoryConfig::default(), completion.clone()),
        completion,
        gateway,
        DedupCache::new(1000),
    )
}

/// A user message in group `g`
pub fn user_message(id: &str, user: &str, text: &str) -> GroupMessage {
    GroupMessage {
        id: id.to_string(),
        group_id: "g".to_string(),
        text: text.to_string(),
        sender_id: user.to_string(),
        sender_name: "Tester".to_string(),
        is_system: false,
        is_bot: false,
    }
}

/// A bot message in group `g`
pub fn bot_message(id: &str, text: &str) -> GroupMessage {
    GroupMessage {
        is_bot: true,
        ..user_message(id, "bot", text)
    }
}

/// A platform notice in group `g`
pub fn system_message(id: &str, text: &str) -> GroupMessage {
    GroupMessage {
        is_system: true,
        ..user_message(id, "system", text)
    }
}
