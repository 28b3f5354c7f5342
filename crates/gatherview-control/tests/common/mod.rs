//! Common test utilities for control-plane integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatherview_control::cluster::QuotaStream;
use gatherview_control::config::{ImageConfig, LifecycleConfig};
use gatherview_control::resources::Route;
use gatherview_control::types::{RouteSummary, WorkloadSummary};
use gatherview_control::{
    ClusterClient, ControlError, ControlResult, Deletion, MockCluster, QuotaSnapshot,
    ResourceKind, WorkloadManager,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use tokio::sync::watch;

/// A mock cluster and a manager wired to it with fast timings.
pub struct TestEnv {
    pub cluster: Arc<MockCluster>,
    pub manager: Arc<WorkloadManager>,
}

impl TestEnv {
    /// Creates an environment polling every 5ms with a 200ms readiness timeout.
    pub fn new() -> Self {
        Self::with_lifecycle(fast_lifecycle())
    }

    /// Creates an environment with custom lifecycle timings.
    pub fn with_lifecycle(lifecycle: LifecycleConfig) -> Self {
        let cluster = Arc::new(MockCluster::new());
        let client: Arc<dyn ClusterClient> = cluster.clone();
        let manager = Arc::new(WorkloadManager::new(
            client,
            ImageConfig::default(),
            lifecycle,
        ));
        Self { cluster, manager }
    }
}

/// A [`MockCluster`] whose deletes block until [`GatedCluster::open`] is called.
pub struct GatedCluster {
    pub inner: Arc<MockCluster>,
    gate: watch::Sender<bool>,
}

impl GatedCluster {
    pub fn new(inner: Arc<MockCluster>) -> Self {
        let (gate, _) = watch::channel(false);
        Self { inner, gate }
    }

    /// Lets every waiting and future delete through.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl ClusterClient for GatedCluster {
    async fn create_service(&self, service: &Service) -> ControlResult<()> {
        self.inner.create_service(service).await
    }

    async fn create_route(&self, route: &Route) -> ControlResult<String> {
        self.inner.create_route(route).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> ControlResult<()> {
        self.inner.create_deployment(deployment).await
    }

    async fn available_replicas(&self, name: &str) -> ControlResult<i32> {
        self.inner.available_replicas(name).await
    }

    async fn list_names(&self, kind: ResourceKind, selector: &str) -> ControlResult<Vec<String>> {
        self.inner.list_names(kind, selector).await
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> ControlResult<Deletion> {
        let mut gate = self.gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        if !opened {
            return Err(ControlError::internal("gate dropped"));
        }
        self.inner.delete(kind, name).await
    }

    async fn list_workloads(&self) -> ControlResult<Vec<WorkloadSummary>> {
        self.inner.list_workloads().await
    }

    async fn list_routes(&self, selector: &str) -> ControlResult<Vec<RouteSummary>> {
        self.inner.list_routes(selector).await
    }

    async fn get_quota(&self, name: &str) -> ControlResult<QuotaSnapshot> {
        self.inner.get_quota(name).await
    }

    async fn watch_quotas(&self) -> ControlResult<QuotaStream> {
        self.inner.watch_quotas().await
    }
}

/// Lifecycle timings suitable for tests.
pub fn fast_lifecycle() -> LifecycleConfig {
    LifecycleConfig {
        ready_timeout_secs: 1,
        poll_interval_ms: 5,
        ..LifecycleConfig::default()
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
