//! Daemon - the main relay service
//!
//! Wires storage, the completion client, the `GroupMe` gateway and the
//! reconciler together, then serves webhooks and polls until interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::api::ApiServerBuilder;
use crate::channels::GroupMeGateway;
use crate::db::{self, CheckpointRepo, ConversationRepo, DbPool};
use crate::llm::OpenAiClient;
use crate::memory::MemoryCompactor;
use crate::reconciler::{DedupCache, DeliveryReconciler, Poller, ReconcilerConfig};
use crate::{Config, Error, Result};

/// The relay daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
    reconciler: Arc<DeliveryReconciler>,
    /// An access token was configured (it now lives in the gateway)
    can_fetch: bool,
    poller_started: AtomicBool,
}

impl Daemon {
    /// Create a new daemon, opening the database at the configured path
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened
    pub fn new(config: Config) -> Result<Self> {
        let db = db::init(&config.server.db_path)?;
        tracing::info!(path = %config.server.db_path.display(), "database ready");
        Ok(Self::with_pool(config, db))
    }

    /// Create a daemon over an existing pool
    ///
    /// Credentials move out of `config` into the clients.
    #[must_use]
    pub fn with_pool(mut config: Config, db: DbPool) -> Self {
        let completion = OpenAiClient::new(config.llm.api_key.take(), config.llm.model.clone())
            .with_base_url(config.llm.base_url.clone());

        if completion.has_api_key() {
            tracing::info!(model = completion.model(), "completion client ready");
        } else {
            tracing::warn!("OPENAI_API_KEY not set, every reply will be the fallback");
        }

        let gateway = GroupMeGateway::new(
            config.groupme.bot_id.take(),
            config.groupme.access_token.take(),
        );
        let can_fetch = gateway.can_fetch();

        let completion = Arc::new(completion);
        let reconciler = DeliveryReconciler::new(
            ConversationRepo::new(db.clone()),
            CheckpointRepo::new(db.clone()),
            MemoryCompactor::new(config.memory.clone(), completion.clone()),
            completion,
            Arc::new(gateway),
            DedupCache::new(config.server.dedup_capacity),
        )
        .with_config(ReconcilerConfig {
            fetch_limit: config.groupme.fetch_limit,
        });

        Self {
            config,
            db,
            reconciler: Arc::new(reconciler),
            can_fetch,
            poller_started: AtomicBool::new(false),
        }
    }

    /// Database pool
    #[must_use]
    pub const fn db(&self) -> &DbPool {
        &self.db
    }

    /// Shared reconciler
    #[must_use]
    pub fn reconciler(&self) -> Arc<DeliveryReconciler> {
        self.reconciler.clone()
    }

    fn build_poller(&self) -> Result<Poller> {
        if !self.can_fetch {
            return Err(Error::Config("GROUPME_ACCESS_TOKEN not set".to_string()));
        }
        let group_id = self
            .config
            .groupme
            .group_id
            .as_deref()
            .ok_or_else(|| Error::Config("GROUPME_GROUP_ID not set".to_string()))?;

        Ok(Poller::new(self.reconciler.clone(), group_id)
            .with_interval(self.config.groupme.poll_interval))
    }

    /// Start the background poller
    ///
    /// Only the first call starts anything; later calls return `None`.
    /// Missing polling credentials also yield `None`, leaving the push
    /// webhook as the only delivery path.
    pub fn start_poller(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.poller_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("poller already started");
            return None;
        }

        match self.build_poller() {
            Ok(poller) => {
                tracing::info!(group_id = poller.group_id(), "starting poller");
                Some(poller.spawn())
            }
            Err(e) => {
                tracing::warn!(error = %e, "polling disabled");
                None
            }
        }
    }

    /// Run one catch-up pass and return the number of messages processed
    ///
    /// # Errors
    ///
    /// Returns error if polling credentials are missing
    pub async fn catch_up(&self) -> Result<usize> {
        let poller = self.build_poller()?;
        Ok(poller.catch_up().await)
    }

    /// Run the daemon until ctrl-c or a server failure
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails to bind or crashes
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            port = self.config.server.port,
            model = %self.config.llm.model,
            group_id = ?self.config.groupme.group_id,
            "starting chat relay"
        );

        let server = ApiServerBuilder::new(self.db.clone(), self.reconciler.clone())
            .port(self.config.server.port)
            .sms_dedup_capacity(self.config.server.dedup_capacity)
            .build();
        let mut server_handle = server.spawn();

        let poller = self.start_poller();

        let result = tokio::select! {
            joined = &mut server_handle => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(Error::Config(format!("API server task failed: {e}"))),
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for shutdown signal");
                }
                tracing::info!("shutting down");
                Ok(())
            }
        };

        if let Some(handle) = poller {
            handle.abort();
        }
        server_handle.abort();

        result
    }
}
