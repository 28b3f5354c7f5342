//! Error types for gatherview-control.

use std::time::Duration;

use gatherview_locator::LocatorError;

use crate::types::{InstanceLabel, ResourceKind, TeardownLog};

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while managing viewer workloads.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Archive lookup failed.
    #[error("locator error: {0}")]
    Locator(#[from] LocatorError),

    /// A resource-creation call failed during launch.
    ///
    /// Resources created before the failure are left in place.
    #[error("failed to create {kind} {name}: {reason}")]
    Creation {
        /// Kind of the resource that failed.
        kind: ResourceKind,
        /// Name of the resource that failed.
        name: String,
        /// Platform error.
        reason: String,
        /// Steps completed before the failure.
        completed: Vec<String>,
    },

    /// The workload did not become ready in time.
    #[error("workload {label} not ready within {}s", .waited.as_secs())]
    Timeout {
        /// Instance label.
        label: InstanceLabel,
        /// How long the poll ran.
        waited: Duration,
    },

    /// Status of a resource could not be retrieved.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Teardown stopped partway.
    #[error("teardown of {label} stopped: {reason}")]
    PartialFailure {
        /// Instance label.
        label: InstanceLabel,
        /// Deletions completed before the failure.
        log: TeardownLog,
        /// Platform error.
        reason: String,
    },

    /// Orchestration platform error.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Provisioning failed after a label was allocated.
    ///
    /// The caller owns cleanup of `label`.
    #[error("provisioning {label} failed: {source}")]
    Provision {
        /// Label whose resources may be partially created.
        label: InstanceLabel,
        /// Underlying failure.
        #[source]
        source: Box<ControlError>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a cluster error.
    #[must_use]
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a fetch error.
    #[must_use]
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Label of the instance that needs cleanup, if this error leaves one behind.
    #[must_use]
    pub const fn orphaned_label(&self) -> Option<&InstanceLabel> {
        match self {
            Self::Provision { label, .. } | Self::PartialFailure { label, .. } => Some(label),
            _ => None,
        }
    }
}
