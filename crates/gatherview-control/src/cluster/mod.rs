//! Access to the orchestration platform.
//!
//! Everything the lifecycle manager and the quota loop need from the cluster
//! goes through [`ClusterClient`], so the kube-backed implementation can be
//! swapped for the in-memory [`MockCluster`] in tests.

mod kubernetes;
mod mock;

pub use kubernetes::KubeCluster;
pub use mock::MockCluster;

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

use crate::error::ControlResult;
use crate::resources::Route;
use crate::types::{QuotaSnapshot, ResourceKind, RouteSummary, WorkloadSummary};

/// Outcome of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The object existed and was deleted.
    Deleted,
    /// The object did not exist.
    AlreadyGone,
}

/// Stream of quota snapshots from an open watch.
pub type QuotaStream = BoxStream<'static, ControlResult<QuotaSnapshot>>;

/// Operations on the namespace holding viewer workloads.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a service.
    async fn create_service(&self, service: &Service) -> ControlResult<()>;

    /// Create a route and return the host the platform assigned to it.
    async fn create_route(&self, route: &Route) -> ControlResult<String>;

    /// Create a deployment.
    async fn create_deployment(&self, deployment: &Deployment) -> ControlResult<()>;

    /// Number of available replicas of a deployment.
    async fn available_replicas(&self, name: &str) -> ControlResult<i32>;

    /// Names of the objects of `kind` matching a label selector.
    async fn list_names(&self, kind: ResourceKind, selector: &str) -> ControlResult<Vec<String>>;

    /// Delete an object by kind and name.
    async fn delete(&self, kind: ResourceKind, name: &str) -> ControlResult<Deletion>;

    /// Every deployment in the namespace.
    async fn list_workloads(&self) -> ControlResult<Vec<WorkloadSummary>>;

    /// Routes matching a label selector.
    async fn list_routes(&self, selector: &str) -> ControlResult<Vec<RouteSummary>>;

    /// Current pod usage of a quota.
    async fn get_quota(&self, name: &str) -> ControlResult<QuotaSnapshot>;

    /// Open a watch on every quota in the namespace.
    ///
    /// Fails if the watch cannot be established. Errors after that arrive on
    /// the stream.
    async fn watch_quotas(&self) -> ControlResult<QuotaStream>;
}
