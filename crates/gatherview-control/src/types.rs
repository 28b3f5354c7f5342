//! Core types for gatherview-control.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Label key shared by every resource of a workload instance.
pub const APP_LABEL: &str = "app";

const LABEL_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const LABEL_LENGTH: usize = 8;

/// Unique label identifying one workload instance.
///
/// Used as the `app=<label>` selector across all of the instance's resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceLabel(String);

impl InstanceLabel {
    /// Wrap an existing label value.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Generate a random label of lowercase ASCII letters.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let label = (0..LABEL_LENGTH)
            .map(|_| char::from(LABEL_CHARSET[rng.gen_range(0..LABEL_CHARSET.len())]))
            .collect();
        Self(label)
    }

    /// Get the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label selector matching every resource of this instance.
    #[must_use]
    pub fn selector(&self) -> String {
        format!("{APP_LABEL}={}", self.0)
    }
}

impl fmt::Display for InstanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for InstanceLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Externally reachable endpoints of a ready workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// API server endpoint (`https://<host>`).
    pub api: String,
    /// Web console endpoint (`https://<host>`).
    pub console: String,
}

/// Pod usage of a quota resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Name of the quota resource.
    pub name: String,
    /// Pods currently counted against the quota.
    pub used: i64,
    /// Pod limit.
    pub hard: i64,
}

impl QuotaSnapshot {
    /// Pods that can still be scheduled.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.hard.saturating_sub(self.used)
    }

    /// Returns true if no further pods fit.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.available() <= 0
    }
}

/// Kinds of platform resources making up a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Network endpoint exposing the pods.
    Service,
    /// Externally reachable route.
    Route,
    /// Pod template and replica controller.
    Deployment,
    /// Configuration resource.
    ConfigMap,
}

impl ResourceKind {
    /// Order in which an instance's resources are deleted.
    pub const TEARDOWN_ORDER: [Self; 4] =
        [Self::Service, Self::Deployment, Self::ConfigMap, Self::Route];

    /// Human-readable name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Route => "route",
            Self::Deployment => "deployment",
            Self::ConfigMap => "config map",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable record of the deletions performed by a teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownLog {
    entries: Vec<String>,
}

impl TeardownLog {
    /// Record a deletion.
    pub fn removed(&mut self, kind: ResourceKind, name: &str) {
        self.entries.push(format!("Removed {kind} {name}"));
    }

    /// Recorded lines, in order.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns true if nothing was deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for TeardownLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join("\n"))
    }
}

/// A deployment as listed from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSummary {
    /// Deployment name.
    pub name: String,
    /// Instance label, if the deployment carries one.
    pub label: Option<InstanceLabel>,
    /// Creation timestamp assigned by the platform.
    pub created_at: Option<DateTime<Utc>>,
    /// Archive the fetch stage downloads.
    pub archive_url: Option<String>,
    /// Replicas currently available.
    pub available_replicas: i32,
}

/// A route as listed from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    /// Route name.
    pub name: String,
    /// Host assigned by the platform.
    pub host: Option<String>,
}

/// Readiness of a workload instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Resources exist but the viewer is not available yet.
    Provisioning,
    /// The viewer is available.
    Ready,
    /// Launch or readiness failed.
    Failed,
}

/// Age-based lifecycle of a workload instance.
///
/// Deleted instances have no resources left and so never appear in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    /// Younger than the configured lifetime.
    Active,
    /// At or past the configured lifetime; due for reclamation.
    Expired,
}

impl ExpiryStatus {
    /// Classify an instance created at `created_at` as seen at `now`.
    #[must_use]
    pub fn classify(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> Self {
        let age = now.signed_duration_since(created_at);
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) if age >= max_age => Self::Expired,
            _ => Self::Active,
        }
    }
}

/// Derived view of one workload instance, reconstructed from live objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInstance {
    /// Instance label.
    pub label: InstanceLabel,
    /// When the deployment was created.
    pub created_at: DateTime<Utc>,
    /// Archive being served.
    pub archive_url: Option<String>,
    /// API endpoint, if its route exists.
    pub api_endpoint: Option<String>,
    /// Console endpoint, if its route exists.
    pub console_endpoint: Option<String>,
    /// Readiness.
    pub status: ProvisionStatus,
    /// Age-based lifecycle.
    pub expiry: ExpiryStatus,
}
