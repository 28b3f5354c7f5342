//! Quota watch loop.
//!
//! A single writer keeps the latest [`QuotaSnapshot`] of the configured quota
//! in a `watch` channel. Readers clone the current value or await changes.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::config::QuotaConfig;
use crate::error::{ControlError, ControlResult};
use crate::types::QuotaSnapshot;

/// Calculate the exponential backoff before reopening a watch.
///
/// The delay doubles with each attempt (2^attempt * initial_delay), capped at max_delay.
fn calculate_backoff_delay(attempt: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|multiplier| initial_delay.checked_mul(multiplier))
        .map_or(max_delay, |delay| delay.min(max_delay))
}

/// Keeps the latest snapshot of one quota up to date.
pub struct QuotaWatcher {
    cluster: Arc<dyn ClusterClient>,
    quota_name: String,
    config: QuotaConfig,
    sender: watch::Sender<Option<QuotaSnapshot>>,
}

impl QuotaWatcher {
    /// Create a watcher for the quota named `quota_name`.
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        quota_name: impl Into<String>,
        config: QuotaConfig,
    ) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            cluster,
            quota_name: quota_name.into(),
            config,
            sender,
        }
    }

    /// Receive every future snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<QuotaSnapshot>> {
        self.sender.subscribe()
    }

    /// Latest snapshot, if one has been observed.
    #[must_use]
    pub fn current(&self) -> Option<QuotaSnapshot> {
        self.sender.borrow().clone()
    }

    /// Fetch the quota once and publish it.
    pub async fn refresh(&self) -> ControlResult<QuotaSnapshot> {
        let snapshot = self.cluster.get_quota(&self.quota_name).await?;
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    fn publish(&self, snapshot: QuotaSnapshot) {
        debug!(
            quota = %snapshot.name,
            used = snapshot.used,
            hard = snapshot.hard,
            "quota updated"
        );
        self.sender.send_replace(Some(snapshot));
    }

    /// Watch the quota until `cancel` fires.
    ///
    /// A failed or closed watch is reopened after a backoff that resets once
    /// an event arrives.
    pub async fn run(&self, cancel: CancellationToken) {
        let initial = Duration::from_millis(self.config.initial_backoff_ms);
        let max = Duration::from_millis(self.config.max_backoff_ms);
        let mut failures: u32 = 0;

        info!(quota = %self.quota_name, "starting quota watch");

        loop {
            let error = tokio::select! {
                () = cancel.cancelled() => break,
                error = self.watch_once(&mut failures) => error,
            };

            let delay = calculate_backoff_delay(failures.saturating_sub(1), initial, max);
            warn!(
                quota = %self.quota_name,
                error = %error,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "quota watch interrupted"
            );

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!(quota = %self.quota_name, "quota watch stopped");
    }

    /// Consume one watch until it fails, returning the reason.
    async fn watch_once(&self, failures: &mut u32) -> ControlError {
        let mut stream = match self.cluster.watch_quotas().await {
            Ok(stream) => stream,
            Err(e) => {
                *failures += 1;
                return e;
            }
        };

        while let Some(event) = stream.next().await {
            match event {
                Ok(snapshot) => {
                    *failures = 0;
                    if snapshot.name == self.quota_name {
                        self.publish(snapshot);
                    }
                }
                Err(e) => {
                    *failures += 1;
                    return e;
                }
            }
        }

        *failures += 1;
        ControlError::cluster("quota watch closed")
    }
}

impl std::fmt::Debug for QuotaWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaWatcher")
            .field("quota_name", &self.quota_name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
