//! Gatherview control plane
//!
//! This crate provisions short-lived viewer environments for CI debugging
//! archives. Given a CI run URL it finds the run's diagnostic archive, brings
//! up a workload that serves the archive through a web console, waits for it
//! to become reachable, and reclaims it once it ages out.
//!
//! # Architecture
//!
//! - **Resource set**: one service, an API route, a console route and a
//!   deployment per instance, all labelled `app=<label>`
//! - **Lifecycle manager**: launches instances step by step, polls readiness
//!   with a bounded timeout, tears instances down and sweeps expired ones
//! - **Quota watch**: keeps the latest pod-quota snapshot in a `watch` channel
//! - **Provisioner**: the end-to-end flow from CI run URL to endpoints, with
//!   progress notifications
//!
//! # State Machine
//!
//! Provisioning follows a typestate machine:
//!
//! ```text
//! Provisioning ──▶ Ready
//!       │
//!       ▼
//!    Failed
//! ```
//!
//! Reclamation is age-based and independent of provisioning: an instance is
//! `Active` until it reaches the configured lifetime, then `Expired` until its
//! resources are deleted.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod notify;
pub mod provision;
pub mod quota;
pub mod resources;
pub mod service;
pub mod state;
pub mod types;
pub mod workload;

pub use cluster::{ClusterClient, Deletion, KubeCluster, MockCluster};
pub use config::ViewerConfig;
pub use error::{ControlError, ControlResult};
pub use notify::{Notification, Notifier, TracingNotifier};
pub use provision::{ProvisionedViewer, Provisioner};
pub use quota::QuotaWatcher;
pub use service::ViewerService;
pub use state::{Failed, Provisioning, Ready, Workload, WorkloadState};
pub use types::{
    Endpoints, ExpiryStatus, InstanceLabel, ProvisionStatus, QuotaSnapshot, ResourceKind,
    TeardownLog, WorkloadInstance,
};
pub use workload::{SweepReport, WorkloadManager};
