//! Service lifecycle management.
//!
//! Runs the reclamation sweep and the quota watch until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::cluster::{ClusterClient, KubeCluster};
use crate::config::ViewerConfig;
use crate::error::ControlResult;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::quota::QuotaWatcher;
use crate::types::QuotaSnapshot;
use crate::workload::WorkloadManager;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// The viewer service.
///
/// Owns the background loops that keep the namespace tidy:
/// - periodic reclamation of expired workloads
/// - the quota watch, with capacity changes reported to a [`Notifier`]
pub struct ViewerService {
    config: ViewerConfig,
    cancel: CancellationToken,
}

impl ViewerService {
    /// Create a new viewer service with the given configuration.
    #[must_use]
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Connect to the cluster and run until shutdown.
    pub async fn run(&self) -> ControlResult<()> {
        let cluster = KubeCluster::connect(self.config.cluster.namespace.clone()).await?;
        info!(namespace = %cluster.namespace(), "connected to cluster");
        self.run_with(Arc::new(cluster), Arc::new(TracingNotifier))
            .await
    }

    /// Run against an existing cluster client until shutdown.
    ///
    /// Outstanding teardowns are awaited before returning.
    pub async fn run_with(
        &self,
        cluster: Arc<dyn ClusterClient>,
        notifier: Arc<dyn Notifier>,
    ) -> ControlResult<()> {
        let manager = Arc::new(WorkloadManager::from_config(
            Arc::clone(&cluster),
            &self.config,
        ));
        let quota = Arc::new(QuotaWatcher::new(
            cluster,
            self.config.cluster.quota_name.clone(),
            self.config.quota.clone(),
        ));

        if let Err(e) = quota.refresh().await {
            warn!(quota = %self.config.cluster.quota_name, error = %e, "initial quota fetch failed");
        }

        let loops = self.cancel.child_token();
        let tracker = TaskTracker::new();

        tracker.spawn(sweep_loop(Arc::clone(&manager), loops.clone()));
        tracker.spawn(forward_quota(quota.subscribe(), notifier, loops.clone()));
        {
            let quota = Arc::clone(&quota);
            let cancel = loops.clone();
            tracker.spawn(async move { quota.run(cancel).await });
        }
        tracker.close();

        info!(
            namespace = %self.config.cluster.namespace,
            sweep_interval_secs = self.config.lifecycle.sweep_interval_secs,
            max_age_secs = self.config.lifecycle.max_age_secs,
            "viewer service running"
        );

        shutdown_signal(self.cancel.clone()).await;

        loops.cancel();
        tracker.wait().await;
        manager.wait_for_teardowns().await;

        info!("viewer service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn sweep_loop(manager: Arc<WorkloadManager>, cancel: CancellationToken) {
    let max_age = manager.lifecycle().max_age();
    let mut ticker = tokio::time::interval(manager.lifecycle().sweep_interval().max(MIN_SWEEP_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match manager.reclaim_expired(max_age).await {
            Ok(report) => info!(
                submitted = report.submitted.len(),
                retained = report.retained,
                skipped = report.skipped,
                "reclamation sweep finished"
            ),
            Err(e) => error!(error = %e, "reclamation sweep failed"),
        }
    }
}

async fn forward_quota(
    mut receiver: watch::Receiver<Option<QuotaSnapshot>>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = receiver.borrow_and_update().clone();
        if let Some(snapshot) = snapshot {
            notifier.notify(Notification::Quota(snapshot));
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}
