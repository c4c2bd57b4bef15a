//! HTTP API server for the relay

pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::db::DbPool;
use crate::reconciler::{DedupCache, DeliveryReconciler};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub reconciler: Arc<DeliveryReconciler>,
    /// SMS message sids already answered
    pub sms_dedup: Arc<DedupCache>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    reconciler: Arc<DeliveryReconciler>,
    port: u16,
    sms_dedup_capacity: usize,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(db: DbPool, reconciler: Arc<DeliveryReconciler>) -> Self {
        Self {
            db,
            reconciler,
            port: crate::config::DEFAULT_PORT,
            sms_dedup_capacity: crate::reconciler::dedup::DEFAULT_CAPACITY,
        }
    }

    /// Set the listen port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set how many SMS message sids are remembered
    #[must_use]
    pub const fn sms_dedup_capacity(mut self, capacity: usize) -> Self {
        self.sms_dedup_capacity = capacity;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                db: self.db,
                reconciler: self.reconciler,
                sms_dedup: Arc::new(DedupCache::new(self.sms_dedup_capacity)),
            }),
            port: self.port,
        }
    }
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(webhooks::router(state.clone()))
        .nest("/api/webhooks", webhooks::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
