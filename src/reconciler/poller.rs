//! Continuous group polling

use std::sync::Arc;
use std::time::Duration;

use super::DeliveryReconciler;

/// Default delay between poll cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Background poller for one group
pub struct Poller {
    reconciler: Arc<DeliveryReconciler>,
    group_id: String,
    interval: Duration,
}

impl Poller {
    /// Create a poller for `group_id`
    #[must_use]
    pub fn new(reconciler: Arc<DeliveryReconciler>, group_id: impl Into<String>) -> Self {
        Self {
            reconciler,
            group_id: group_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the delay between cycles
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Group being polled
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Poll back-to-back until a fetch comes back empty or fails
    ///
    /// A cycle that leaves the checkpoint where it was also ends the loop,
    /// since repeating it would fetch the same page forever.
    ///
    /// Returns the number of messages processed.
    pub async fn catch_up(&self) -> usize {
        let mut processed = 0;
        let mut last_checkpoint = None;

        loop {
            match self.reconciler.poll_once(&self.group_id).await {
                Ok(report) => {
                    processed += report.processed;
                    if report.fetched == 0 || report.checkpoint == last_checkpoint {
                        break;
                    }
                    last_checkpoint = report.checkpoint;
                }
                Err(e) => {
                    tracing::warn!(group_id = %self.group_id, error = %e, "catch-up poll failed");
                    break;
                }
            }
        }

        tracing::info!(group_id = %self.group_id, processed, "catch-up complete");
        processed
    }

    /// Catch up, then poll on the interval forever
    pub async fn run(self) {
        tracing::info!(
            group_id = %self.group_id,
            interval_secs = self.interval.as_secs(),
            "poller started"
        );

        self.catch_up().await;

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            match self.reconciler.poll_once(&self.group_id).await {
                // A full page means more may be waiting
                Ok(report) if report.fetched >= self.reconciler.fetch_limit() => {
                    self.catch_up().await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(group_id = %self.group_id, error = %e, "poll cycle failed");
                }
            }
        }
    }

    /// Run the poller in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
