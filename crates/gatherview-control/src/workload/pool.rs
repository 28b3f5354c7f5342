//! Bounded background teardowns.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use super::manager::teardown_instance;
use crate::cluster::ClusterClient;
use crate::types::InstanceLabel;

/// Runs teardowns in the background, at most `max_concurrent` at a time.
///
/// Each task logs its own outcome; nothing is reported back to the submitter.
pub struct TeardownPool {
    cluster: Arc<dyn ClusterClient>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl TeardownPool {
    /// Create a pool running on the current tokio runtime.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterClient>, max_concurrent: usize) -> Self {
        Self {
            cluster,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Queue a teardown of `label`.
    pub fn submit(&self, label: InstanceLabel) {
        let cluster = Arc::clone(&self.cluster);
        let permits = Arc::clone(&self.permits);

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            match teardown_instance(cluster.as_ref(), &label).await {
                Ok(log) => info!(
                    label = %label,
                    removed = log.entries().len(),
                    "reclaimed expired workload"
                ),
                Err(e) => error!(label = %label, error = %e, "failed to reclaim workload"),
            }
        });
    }

    /// Number of teardowns queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every submitted teardown has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl std::fmt::Debug for TeardownPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownPool")
            .field("pending", &self.pending())
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}
