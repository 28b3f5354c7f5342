//! In-memory cluster for tests and local runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{ClusterClient, Deletion, QuotaStream};
use crate::error::{ControlError, ControlResult};
use crate::resources::{self, Route};
use crate::types::{
    InstanceLabel, QuotaSnapshot, ResourceKind, RouteSummary, WorkloadSummary, APP_LABEL,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    Create,
    List,
    Delete,
}

#[derive(Debug, Clone)]
enum QuotaEvent {
    Update(QuotaSnapshot),
    Error(String),
}

#[derive(Debug, Clone, Default)]
struct StoredObject {
    labels: BTreeMap<String, String>,
    created_at: Option<DateTime<Utc>>,
    archive_url: Option<String>,
    host: Option<String>,
    available_replicas: i32,
    polls: u32,
}

impl StoredObject {
    fn from_meta(metadata: &ObjectMeta) -> Self {
        Self {
            labels: metadata.labels.clone().unwrap_or_default(),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    fn matches(&self, selector: &str) -> bool {
        match selector.split_once('=') {
            Some((key, value)) => self.labels.get(key).is_some_and(|v| v == value),
            None => self.labels.contains_key(selector),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    objects: HashMap<ResourceKind, BTreeMap<String, StoredObject>>,
    failures: HashMap<(Operation, ResourceKind), String>,
    fail_replicas: Option<String>,
    ready_after: Option<u32>,
    created: Vec<(ResourceKind, String)>,
    deleted: Vec<(ResourceKind, String)>,
    quotas: BTreeMap<String, QuotaSnapshot>,
    failing_watches: u32,
    watch_attempts: u32,
    open_watches: u32,
}

/// In-memory [`ClusterClient`].
///
/// Deployments become available on their first readiness poll unless
/// configured otherwise. Route hosts are `<route name>.apps.example.test`.
#[derive(Debug)]
pub struct MockCluster {
    state: Mutex<MockState>,
    quota_events: broadcast::Sender<QuotaEvent>,
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCluster {
    /// Suffix appended to route names to form their hosts.
    pub const HOST_SUFFIX: &'static str = "apps.example.test";

    /// Create an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        let (quota_events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState {
                ready_after: Some(1),
                ..MockState::default()
            }),
            quota_events,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> ControlResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ControlError::internal("lock poisoned"))?;
        Ok(f(&mut state))
    }

    fn configure(&self, f: impl FnOnce(&mut MockState)) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state);
    }

    fn inspect<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&state)
    }

    /// Make every create call for `kind` fail.
    pub fn fail_create(&self, kind: ResourceKind, reason: impl Into<String>) {
        self.configure(|s| {
            s.failures.insert((Operation::Create, kind), reason.into());
        });
    }

    /// Make every list call for `kind` fail.
    pub fn fail_list(&self, kind: ResourceKind, reason: impl Into<String>) {
        self.configure(|s| {
            s.failures.insert((Operation::List, kind), reason.into());
        });
    }

    /// Make every delete call for `kind` fail.
    pub fn fail_delete(&self, kind: ResourceKind, reason: impl Into<String>) {
        self.configure(|s| {
            s.failures.insert((Operation::Delete, kind), reason.into());
        });
    }

    /// Make readiness polls fail.
    pub fn fail_replicas(&self, reason: impl Into<String>) {
        self.configure(|s| s.fail_replicas = Some(reason.into()));
    }

    /// Deployments become available on their `polls`-th readiness poll.
    pub fn ready_after(&self, polls: u32) {
        self.configure(|s| s.ready_after = Some(polls));
    }

    /// Deployments never become available.
    pub fn never_ready(&self) {
        self.configure(|s| s.ready_after = None);
    }

    /// Add an object of `kind` carrying `app=<label>`.
    pub fn insert(&self, kind: ResourceKind, name: &str, label: &InstanceLabel) {
        self.configure(|s| {
            let object = StoredObject {
                labels: BTreeMap::from([(APP_LABEL.to_owned(), label.as_str().to_owned())]),
                created_at: Some(Utc::now()),
                ..StoredObject::default()
            };
            s.objects
                .entry(kind)
                .or_default()
                .insert(name.to_owned(), object);
        });
    }

    /// Add a deployment with an explicit creation time and optional label.
    pub fn insert_deployment(
        &self,
        name: &str,
        label: Option<&InstanceLabel>,
        created_at: Option<DateTime<Utc>>,
    ) {
        self.configure(|s| {
            let labels = label
                .map(|l| BTreeMap::from([(APP_LABEL.to_owned(), l.as_str().to_owned())]))
                .unwrap_or_default();
            let object = StoredObject {
                labels,
                created_at,
                ..StoredObject::default()
            };
            s.objects
                .entry(ResourceKind::Deployment)
                .or_default()
                .insert(name.to_owned(), object);
        });
    }

    /// Names of the stored objects of `kind`.
    #[must_use]
    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.inspect(|s| {
            s.objects
                .get(&kind)
                .map(|objects| objects.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Objects created through the client, in order.
    #[must_use]
    pub fn created(&self) -> Vec<(ResourceKind, String)> {
        self.inspect(|s| s.created.clone())
    }

    /// Objects deleted through the client, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.inspect(|s| s.deleted.clone())
    }

    /// Set a quota without notifying open watches.
    pub fn set_quota(&self, snapshot: QuotaSnapshot) {
        self.configure(|s| {
            s.quotas.insert(snapshot.name.clone(), snapshot);
        });
    }

    /// Set a quota and deliver it to open watches.
    pub fn publish_quota(&self, snapshot: QuotaSnapshot) {
        self.set_quota(snapshot.clone());
        // No open watch is not an error.
        let _ = self.quota_events.send(QuotaEvent::Update(snapshot));
    }

    /// Deliver an error to open watches.
    pub fn break_watches(&self, reason: impl Into<String>) {
        let _ = self.quota_events.send(QuotaEvent::Error(reason.into()));
    }

    /// Refuse the next `count` watch requests.
    pub fn fail_watches(&self, count: u32) {
        self.configure(|s| s.failing_watches = count);
    }

    /// Watch requests received, including refused ones.
    #[must_use]
    pub fn watch_attempts(&self) -> u32 {
        self.inspect(|s| s.watch_attempts)
    }

    /// Watch requests that succeeded.
    #[must_use]
    pub fn open_watches(&self) -> u32 {
        self.inspect(|s| s.open_watches)
    }

    fn check(state: &MockState, operation: Operation, kind: ResourceKind) -> ControlResult<()> {
        match state.failures.get(&(operation, kind)) {
            Some(reason) => Err(ControlError::cluster(reason.clone())),
            None => Ok(()),
        }
    }

    fn create(&self, kind: ResourceKind, name: Option<&str>, object: StoredObject) -> ControlResult<()> {
        let name = name
            .ok_or_else(|| ControlError::cluster(format!("{kind} has no name")))?
            .to_owned();
        self.with_state(|s| {
            Self::check(s, Operation::Create, kind)?;
            let objects = s.objects.entry(kind).or_default();
            if objects.contains_key(&name) {
                return Err(ControlError::cluster(format!("{kind} {name} already exists")));
            }
            objects.insert(name.clone(), object);
            s.created.push((kind, name));
            Ok(())
        })?
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn create_service(&self, service: &Service) -> ControlResult<()> {
        self.create(
            ResourceKind::Service,
            service.metadata.name.as_deref(),
            StoredObject::from_meta(&service.metadata),
        )
    }

    async fn create_route(&self, route: &Route) -> ControlResult<String> {
        let name = route.metadata.name.clone().unwrap_or_default();
        let host = format!("{name}.{}", Self::HOST_SUFFIX);
        let object = StoredObject {
            host: Some(host.clone()),
            ..StoredObject::from_meta(&route.metadata)
        };
        self.create(ResourceKind::Route, route.metadata.name.as_deref(), object)?;
        Ok(host)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> ControlResult<()> {
        let object = StoredObject {
            archive_url: resources::archive_url_of(deployment),
            ..StoredObject::from_meta(&deployment.metadata)
        };
        self.create(
            ResourceKind::Deployment,
            deployment.metadata.name.as_deref(),
            object,
        )
    }

    async fn available_replicas(&self, name: &str) -> ControlResult<i32> {
        self.with_state(|s| {
            if let Some(reason) = &s.fail_replicas {
                return Err(ControlError::cluster(reason.clone()));
            }
            let ready_after = s.ready_after;
            let deployment = s
                .objects
                .get_mut(&ResourceKind::Deployment)
                .and_then(|d| d.get_mut(name))
                .ok_or_else(|| ControlError::cluster(format!("deployment {name} not found")))?;

            deployment.polls += 1;
            if ready_after.is_some_and(|n| deployment.polls >= n) {
                deployment.available_replicas = 1;
            }
            Ok(deployment.available_replicas)
        })?
    }

    async fn list_names(&self, kind: ResourceKind, selector: &str) -> ControlResult<Vec<String>> {
        self.with_state(|s| {
            Self::check(s, Operation::List, kind)?;
            Ok(s.objects
                .get(&kind)
                .map(|objects| {
                    objects
                        .iter()
                        .filter(|(_, o)| o.matches(selector))
                        .map(|(name, _)| name.clone())
                        .collect()
                })
                .unwrap_or_default())
        })?
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> ControlResult<Deletion> {
        self.with_state(|s| {
            Self::check(s, Operation::Delete, kind)?;
            let removed = s
                .objects
                .get_mut(&kind)
                .and_then(|objects| objects.remove(name));
            match removed {
                Some(_) => {
                    s.deleted.push((kind, name.to_owned()));
                    Ok(Deletion::Deleted)
                }
                None => Ok(Deletion::AlreadyGone),
            }
        })?
    }

    async fn list_workloads(&self) -> ControlResult<Vec<WorkloadSummary>> {
        self.with_state(|s| {
            Self::check(s, Operation::List, ResourceKind::Deployment)?;
            Ok(s.objects
                .get(&ResourceKind::Deployment)
                .map(|objects| {
                    objects
                        .iter()
                        .map(|(name, o)| WorkloadSummary {
                            name: name.clone(),
                            label: o.labels.get(APP_LABEL).map(InstanceLabel::new),
                            created_at: o.created_at,
                            archive_url: o.archive_url.clone(),
                            available_replicas: o.available_replicas,
                        })
                        .collect()
                })
                .unwrap_or_default())
        })?
    }

    async fn list_routes(&self, selector: &str) -> ControlResult<Vec<RouteSummary>> {
        self.with_state(|s| {
            Self::check(s, Operation::List, ResourceKind::Route)?;
            Ok(s.objects
                .get(&ResourceKind::Route)
                .map(|objects| {
                    objects
                        .iter()
                        .filter(|(_, o)| o.matches(selector))
                        .map(|(name, o)| RouteSummary {
                            name: name.clone(),
                            host: o.host.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        })?
    }

    async fn get_quota(&self, name: &str) -> ControlResult<QuotaSnapshot> {
        self.with_state(|s| {
            s.quotas
                .get(name)
                .cloned()
                .ok_or_else(|| ControlError::cluster(format!("quota {name} not found")))
        })?
    }

    async fn watch_quotas(&self) -> ControlResult<QuotaStream> {
        let receiver = self.quota_events.subscribe();
        let initial = self.with_state(|s| {
            s.watch_attempts += 1;
            if s.failing_watches > 0 {
                s.failing_watches -= 1;
                return Err(ControlError::cluster("watch refused"));
            }
            s.open_watches += 1;
            Ok(s.quotas.values().cloned().collect::<Vec<_>>())
        })??;

        let updates = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(QuotaEvent::Update(snapshot)) => return Some((Ok(snapshot), receiver)),
                    Ok(QuotaEvent::Error(reason)) => {
                        return Some((Err(ControlError::cluster(reason)), receiver))
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream::iter(initial.into_iter().map(Ok)).chain(updates).boxed())
    }
}
