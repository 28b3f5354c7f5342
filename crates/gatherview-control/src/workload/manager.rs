//! Core workload orchestration logic.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::pool::TeardownPool;
use crate::cluster::{ClusterClient, Deletion};
use crate::config::{ImageConfig, LifecycleConfig, ViewerConfig};
use crate::error::{ControlError, ControlResult};
use crate::resources::{self, ResourceSetBuilder};
use crate::state::{Failed, Provisioning, Ready, Workload};
use crate::types::{
    Endpoints, ExpiryStatus, InstanceLabel, ProvisionStatus, ResourceKind, TeardownLog,
    WorkloadInstance,
};

/// Available replicas at which a workload counts as ready.
pub const REQUIRED_REPLICAS: i32 = 1;

/// Labels generated before label allocation gives up.
pub const LABEL_ATTEMPTS: usize = 5;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one reclamation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Instances handed to the teardown pool.
    pub submitted: Vec<InstanceLabel>,
    /// Instances younger than the maximum age.
    pub retained: usize,
    /// Deployments without a label or creation time.
    pub skipped: usize,
}

/// Orchestrates viewer workload lifecycle operations.
pub struct WorkloadManager {
    cluster: Arc<dyn ClusterClient>,
    images: ImageConfig,
    lifecycle: LifecycleConfig,
    pool: TeardownPool,
}

impl WorkloadManager {
    /// Create a new workload manager.
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        images: ImageConfig,
        lifecycle: LifecycleConfig,
    ) -> Self {
        let pool = TeardownPool::new(Arc::clone(&cluster), lifecycle.max_concurrent_teardowns);
        Self {
            cluster,
            images,
            lifecycle,
            pool,
        }
    }

    /// Create a manager from the service configuration.
    pub fn from_config(cluster: Arc<dyn ClusterClient>, config: &ViewerConfig) -> Self {
        Self::new(cluster, config.images.clone(), config.lifecycle.clone())
    }

    /// Cluster this manager operates on.
    #[must_use]
    pub fn cluster(&self) -> &Arc<dyn ClusterClient> {
        &self.cluster
    }

    /// Lifecycle timing in use.
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleConfig {
        &self.lifecycle
    }

    /// Pick a label that no service or deployment carries yet.
    pub async fn allocate_label(&self) -> ControlResult<InstanceLabel> {
        self.allocate_label_from(InstanceLabel::generate).await
    }

    async fn allocate_label_from(
        &self,
        mut generate: impl FnMut() -> InstanceLabel + Send,
    ) -> ControlResult<InstanceLabel> {
        let mut last = None;
        for attempt in 1..=LABEL_ATTEMPTS {
            let label = generate();
            if !self.label_in_use(&label).await? {
                debug!(label = %label, attempt, "allocated label");
                return Ok(label);
            }
            debug!(label = %label, attempt, "label already in use");
            last = Some(label);
        }

        Err(ControlError::Creation {
            kind: ResourceKind::Service,
            name: last.map(|l| l.to_string()).unwrap_or_default(),
            reason: format!("no unused label after {LABEL_ATTEMPTS} attempts"),
            completed: Vec::new(),
        })
    }

    async fn label_in_use(&self, label: &InstanceLabel) -> ControlResult<bool> {
        let selector = label.selector();
        for kind in [ResourceKind::Service, ResourceKind::Deployment] {
            if !self.cluster.list_names(kind, &selector).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Create the resources of a new instance.
    ///
    /// Resources are created one at a time: service, API route, console route,
    /// deployment. A failure stops the launch and leaves everything created
    /// before it in place.
    pub async fn launch(&self, label: &InstanceLabel, archive_url: &str) -> ControlResult<Endpoints> {
        let builder = ResourceSetBuilder::new(&self.images, label, archive_url);
        let mut completed = Vec::new();

        info!(label = %label, archive_url = %archive_url, "launching workload");

        let service = builder.service();
        record(
            &mut completed,
            ResourceKind::Service,
            resources::service_name(label),
            self.cluster.create_service(&service).await,
        )?;

        let api_host = record(
            &mut completed,
            ResourceKind::Route,
            resources::api_route_name(label),
            self.cluster.create_route(&builder.api_route()).await,
        )?;
        let api = format!("https://{api_host}");

        let console_host = record(
            &mut completed,
            ResourceKind::Route,
            resources::console_route_name(label),
            self.cluster.create_route(&builder.console_route()).await,
        )?;
        let console = format!("https://{console_host}");

        let deployment = builder.deployment(&api);
        record(
            &mut completed,
            ResourceKind::Deployment,
            resources::deployment_name(label),
            self.cluster.create_deployment(&deployment).await,
        )?;

        Ok(Endpoints { api, console })
    }

    /// Poll the instance's deployment until it has the required replicas.
    ///
    /// The first poll happens immediately. A failed poll ends the wait.
    pub async fn await_ready(&self, label: &InstanceLabel, timeout: Duration) -> ControlResult<()> {
        let name = resources::deployment_name(label);
        let interval = self.lifecycle.poll_interval().max(MIN_POLL_INTERVAL);

        let poll = async {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let available = self
                    .cluster
                    .available_replicas(&name)
                    .await
                    .map_err(|e| ControlError::fetch(format!("deployment {name}: {e}")))?;

                debug!(label = %label, available, "polled deployment");
                if is_ready(available) {
                    return Ok(());
                }
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(label = %label, timeout_secs = timeout.as_secs(), "workload not ready in time");
                Err(ControlError::Timeout {
                    label: label.clone(),
                    waited: timeout,
                })
            }
        }
    }

    /// Launch an instance and wait for it to become ready.
    pub async fn provision(
        &self,
        label: InstanceLabel,
        archive_url: &str,
    ) -> Result<Workload<Ready>, (Workload<Failed>, ControlError)> {
        let provisioning = Workload::<Provisioning>::start(label, archive_url);

        let endpoints = match self.launch(provisioning.label(), archive_url).await {
            Ok(endpoints) => endpoints,
            Err(e) => return Err(fail(provisioning, e)),
        };

        if let Err(e) = self
            .await_ready(provisioning.label(), self.lifecycle.ready_timeout())
            .await
        {
            return Err(fail(provisioning, e));
        }

        info!(label = %provisioning.label(), api = %endpoints.api, "workload ready");
        Ok(provisioning.ready(endpoints))
    }

    /// Delete every resource of an instance.
    pub async fn teardown(&self, label: &InstanceLabel) -> ControlResult<TeardownLog> {
        teardown_instance(self.cluster.as_ref(), label).await
    }

    /// Submit every instance at or past `max_age` for teardown.
    ///
    /// Does not wait for the teardowns to finish.
    pub async fn reclaim_expired(&self, max_age: Duration) -> ControlResult<SweepReport> {
        self.reclaim_expired_at(Utc::now(), max_age).await
    }

    /// [`reclaim_expired`](Self::reclaim_expired) with an explicit clock.
    pub async fn reclaim_expired_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> ControlResult<SweepReport> {
        let workloads = self.cluster.list_workloads().await?;
        let mut report = SweepReport::default();
        let mut seen = HashSet::new();

        for workload in workloads {
            let (Some(label), Some(created_at)) = (workload.label, workload.created_at) else {
                debug!(name = %workload.name, "skipping unlabelled workload");
                report.skipped += 1;
                continue;
            };

            match ExpiryStatus::classify(created_at, now, max_age) {
                ExpiryStatus::Active => report.retained += 1,
                ExpiryStatus::Expired => {
                    if seen.insert(label.clone()) {
                        info!(label = %label, created_at = %created_at, "reclaiming expired workload");
                        self.pool.submit(label.clone());
                        report.submitted.push(label);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Teardowns submitted by sweeps that have not finished yet.
    #[must_use]
    pub fn pending_teardowns(&self) -> usize {
        self.pool.pending()
    }

    /// Wait for every teardown submitted by a sweep to finish.
    pub async fn wait_for_teardowns(&self) {
        self.pool.wait().await;
    }

    /// Live instances, reconstructed from the cluster's objects.
    pub async fn instances(&self) -> ControlResult<Vec<WorkloadInstance>> {
        let now = Utc::now();
        let mut instances = Vec::new();

        for workload in self.cluster.list_workloads().await? {
            let (Some(label), Some(created_at)) = (workload.label, workload.created_at) else {
                continue;
            };

            let routes = self.cluster.list_routes(&label.selector()).await?;
            let endpoint = |name: String| {
                routes
                    .iter()
                    .find(|r| r.name == name)
                    .and_then(|r| r.host.as_ref())
                    .map(|host| format!("https://{host}"))
            };

            let status = if is_ready(workload.available_replicas) {
                ProvisionStatus::Ready
            } else {
                ProvisionStatus::Provisioning
            };

            instances.push(WorkloadInstance {
                api_endpoint: endpoint(resources::api_route_name(&label)),
                console_endpoint: endpoint(resources::console_route_name(&label)),
                expiry: ExpiryStatus::classify(created_at, now, self.lifecycle.max_age()),
                label,
                created_at,
                archive_url: workload.archive_url,
                status,
            });
        }

        Ok(instances)
    }
}

impl std::fmt::Debug for WorkloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkloadManager")
            .field("lifecycle", &self.lifecycle)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Returns true if a deployment with `available` replicas counts as ready.
const fn is_ready(available: i32) -> bool {
    available == REQUIRED_REPLICAS
}

fn record<T>(
    completed: &mut Vec<String>,
    kind: ResourceKind,
    name: String,
    result: ControlResult<T>,
) -> ControlResult<T> {
    match result {
        Ok(value) => {
            debug!(kind = %kind, name = %name, "created resource");
            completed.push(format!("Created {kind} {name}"));
            Ok(value)
        }
        Err(e) => {
            error!(kind = %kind, name = %name, error = %e, "failed to create resource");
            Err(ControlError::Creation {
                kind,
                name,
                reason: e.to_string(),
                completed: std::mem::take(completed),
            })
        }
    }
}

fn fail(workload: Workload<Provisioning>, error: ControlError) -> (Workload<Failed>, ControlError) {
    error!(label = %workload.label(), error = %error, "provisioning failed");
    (workload.fail(error.to_string()), error)
}

/// Delete the services, deployments, config maps and routes of an instance.
pub(crate) async fn teardown_instance(
    cluster: &dyn ClusterClient,
    label: &InstanceLabel,
) -> ControlResult<TeardownLog> {
    let selector = label.selector();
    let mut log = TeardownLog::default();

    for kind in ResourceKind::TEARDOWN_ORDER {
        let names = match cluster.list_names(kind, &selector).await {
            Ok(names) => names,
            Err(e) => return Err(partial_failure(label, log, format!("listing {kind}: {e}"))),
        };

        for name in names {
            match cluster.delete(kind, &name).await {
                Ok(Deletion::Deleted) => {
                    info!(label = %label, kind = %kind, name = %name, "removed resource");
                    log.removed(kind, &name);
                }
                Ok(Deletion::AlreadyGone) => {
                    debug!(label = %label, kind = %kind, name = %name, "resource already gone");
                }
                Err(e) => {
                    return Err(partial_failure(
                        label,
                        log,
                        format!("deleting {kind} {name}: {e}"),
                    ))
                }
            }
        }
    }

    Ok(log)
}

fn partial_failure(label: &InstanceLabel, log: TeardownLog, reason: String) -> ControlError {
    warn!(label = %label, removed = log.entries().len(), reason = %reason, "teardown stopped");
    ControlError::PartialFailure {
        label: label.clone(),
        log,
        reason,
    }
}
