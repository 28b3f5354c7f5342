//! Cluster access through the Kubernetes API.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ResourceQuota, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::runtime::watcher::{self, watcher, Event};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{ClusterClient, Deletion, QuotaStream};
use crate::error::{ControlError, ControlResult};
use crate::resources::{self, Route, ROUTE_GROUP, ROUTE_KIND, ROUTE_VERSION};
use crate::types::{
    InstanceLabel, QuotaSnapshot, ResourceKind, RouteSummary, WorkloadSummary, APP_LABEL,
};

const POD_RESOURCE: &str = "pods";

/// [`ClusterClient`] backed by a kube client scoped to one namespace.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    routes: ApiResource,
}

impl KubeCluster {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let gvk = GroupVersionKind::gvk(ROUTE_GROUP, ROUTE_VERSION, ROUTE_KIND);
        Self {
            client,
            namespace: namespace.into(),
            routes: ApiResource::from_gvk(&gvk),
        }
    }

    /// Connect using the ambient kubeconfig or in-cluster environment.
    pub async fn connect(namespace: impl Into<String>) -> ControlResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| ControlError::cluster(format!("failed to create client: {e}")))?;
        Ok(Self::new(client, namespace))
    }

    /// Namespace this client operates in.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn route_api(&self) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, &self.routes)
    }
}

impl Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn cluster_error(e: kube::Error) -> ControlError {
    ControlError::cluster(e.to_string())
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(response) if response.code == 404)
}

async fn names<K>(api: Api<K>, selector: &str) -> ControlResult<Vec<String>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let list = api
        .list(&ListParams::default().labels(selector))
        .await
        .map_err(cluster_error)?;
    Ok(list.items.iter().map(ResourceExt::name_any).collect())
}

async fn delete_named<K>(api: Api<K>, name: &str) -> ControlResult<Deletion>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(Deletion::Deleted),
        Err(e) if is_not_found(&e) => Ok(Deletion::AlreadyGone),
        Err(e) => Err(cluster_error(e)),
    }
}

/// Integer value of a Kubernetes quantity such as `10`, `1k`, `1.5k` or `2Ki`.
///
/// Fractions are truncated. Exponent notation and milli-units are not
/// accepted.
fn parse_quantity(quantity: &str) -> Option<i64> {
    let quantity = quantity.trim();
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let multiplier: i64 = match suffix {
        "" => 1,
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        "Ki" => 1 << 10,
        "Mi" => 1 << 20,
        "Gi" => 1 << 30,
        "Ti" => 1 << 40,
        "Pi" => 1 << 50,
        "Ei" => 1 << 60,
        _ => return None,
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(multiplier)?;

    if !fraction.is_empty() {
        let digits: i64 = fraction.parse().ok()?;
        let scale = 10i64.checked_pow(u32::try_from(fraction.len()).ok()?)?;
        value = value.checked_add(digits.checked_mul(multiplier)? / scale)?;
    }

    Some(value)
}

fn pod_count(
    quota: &str,
    quantities: Option<&std::collections::BTreeMap<String, Quantity>>,
) -> ControlResult<i64> {
    match quantities.and_then(|q| q.get(POD_RESOURCE)) {
        None => Ok(0),
        Some(quantity) => parse_quantity(&quantity.0).ok_or_else(|| {
            ControlError::cluster(format!(
                "quota {quota} has unreadable pod count {:?}",
                quantity.0
            ))
        }),
    }
}

fn quota_snapshot(quota: &ResourceQuota) -> ControlResult<QuotaSnapshot> {
    let name = quota.name_any();
    let status = quota.status.as_ref();
    Ok(QuotaSnapshot {
        used: pod_count(&name, status.and_then(|s| s.used.as_ref()))?,
        hard: pod_count(&name, status.and_then(|s| s.hard.as_ref()))?,
        name,
    })
}

fn workload_summary(deployment: &Deployment) -> WorkloadSummary {
    WorkloadSummary {
        name: deployment.name_any(),
        label: deployment.labels().get(APP_LABEL).map(InstanceLabel::new),
        created_at: deployment.creation_timestamp().map(|t| t.0),
        archive_url: resources::archive_url_of(deployment),
        available_replicas: deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0),
    }
}

fn route_host(route: &DynamicObject) -> Option<String> {
    route.data["spec"]["host"].as_str().map(str::to_owned)
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_service(&self, service: &Service) -> ControlResult<()> {
        self.api::<Service>()
            .create(&PostParams::default(), service)
            .await
            .map_err(cluster_error)?;
        Ok(())
    }

    async fn create_route(&self, route: &Route) -> ControlResult<String> {
        let name = route.metadata.name.clone().unwrap_or_default();
        let mut object = DynamicObject::new(&name, &self.routes).within(&self.namespace);
        object.metadata.labels = route.metadata.labels.clone();
        object.data = serde_json::json!({
            "spec": serde_json::to_value(&route.spec)
                .map_err(|e| ControlError::internal(format!("failed to encode route: {e}")))?,
        });

        let created = self
            .route_api()
            .create(&PostParams::default(), &object)
            .await
            .map_err(cluster_error)?;

        route_host(&created)
            .ok_or_else(|| ControlError::cluster(format!("route {name} has no assigned host")))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> ControlResult<()> {
        self.api::<Deployment>()
            .create(&PostParams::default(), deployment)
            .await
            .map_err(cluster_error)?;
        Ok(())
    }

    async fn available_replicas(&self, name: &str) -> ControlResult<i32> {
        let deployment = self
            .api::<Deployment>()
            .get(name)
            .await
            .map_err(cluster_error)?;
        Ok(workload_summary(&deployment).available_replicas)
    }

    async fn list_names(&self, kind: ResourceKind, selector: &str) -> ControlResult<Vec<String>> {
        match kind {
            ResourceKind::Service => names(self.api::<Service>(), selector).await,
            ResourceKind::Deployment => names(self.api::<Deployment>(), selector).await,
            ResourceKind::ConfigMap => names(self.api::<ConfigMap>(), selector).await,
            ResourceKind::Route => names(self.route_api(), selector).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> ControlResult<Deletion> {
        match kind {
            ResourceKind::Service => delete_named(self.api::<Service>(), name).await,
            ResourceKind::Deployment => delete_named(self.api::<Deployment>(), name).await,
            ResourceKind::ConfigMap => delete_named(self.api::<ConfigMap>(), name).await,
            ResourceKind::Route => delete_named(self.route_api(), name).await,
        }
    }

    async fn list_workloads(&self) -> ControlResult<Vec<WorkloadSummary>> {
        let list = self
            .api::<Deployment>()
            .list(&ListParams::default())
            .await
            .map_err(cluster_error)?;
        Ok(list.items.iter().map(workload_summary).collect())
    }

    async fn list_routes(&self, selector: &str) -> ControlResult<Vec<RouteSummary>> {
        let list = self
            .route_api()
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(cluster_error)?;
        Ok(list
            .items
            .iter()
            .map(|route| RouteSummary {
                name: route.name_any(),
                host: route_host(route),
            })
            .collect())
    }

    async fn get_quota(&self, name: &str) -> ControlResult<QuotaSnapshot> {
        let quota = self
            .api::<ResourceQuota>()
            .get(name)
            .await
            .map_err(cluster_error)?;
        quota_snapshot(&quota)
    }

    async fn watch_quotas(&self) -> ControlResult<QuotaStream> {
        let api = self.api::<ResourceQuota>();

        // The watcher only reports setup problems once polled, so list once first.
        api.list(&ListParams::default().limit(1))
            .await
            .map_err(cluster_error)?;

        let stream = watcher(api, watcher::Config::default())
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Apply(quota) | Event::InitApply(quota)) => {
                        match quota_snapshot(&quota) {
                            Ok(snapshot) => Some(Ok(snapshot)),
                            Err(e) => {
                                warn!(error = %e, "skipping quota update");
                                None
                            }
                        }
                    }
                    Ok(Event::Delete(_) | Event::Init | Event::InitDone) => None,
                    Err(e) => Some(Err(ControlError::cluster(format!("quota watch: {e}")))),
                }
            })
            .boxed();

        Ok(stream)
    }
}
