//! Typestate pattern for the provisioning state machine.
//!
//! A workload starts in [`Provisioning`] and ends in either [`Ready`] (with
//! endpoints) or [`Failed`] (with the error text). Invalid transitions are a
//! compile-time error.
//!
//! ```ignore
//! let provisioning = Workload::<Provisioning>::start(label, archive_url);
//! let ready = provisioning.ready(endpoints);
//! // ready.fail(..) would not compile
//! ```

use chrono::{DateTime, Utc};

use crate::types::{Endpoints, InstanceLabel, ProvisionStatus};

/// Marker trait for provisioning states.
pub trait WorkloadState: private::Sealed + Send + Sync {
    /// Status reported for this state.
    fn status() -> ProvisionStatus;
}

mod private {
    pub trait Sealed {}
}

/// Resources are being created or the viewer is not available yet.
#[derive(Debug, Clone, Copy)]
pub struct Provisioning;

/// The viewer is reachable.
#[derive(Debug, Clone)]
pub struct Ready {
    endpoints: Endpoints,
}

/// Launch or readiness failed.
#[derive(Debug, Clone)]
pub struct Failed {
    error: String,
}

impl private::Sealed for Provisioning {}
impl private::Sealed for Ready {}
impl private::Sealed for Failed {}

impl WorkloadState for Provisioning {
    fn status() -> ProvisionStatus {
        ProvisionStatus::Provisioning
    }
}

impl WorkloadState for Ready {
    fn status() -> ProvisionStatus {
        ProvisionStatus::Ready
    }
}

impl WorkloadState for Failed {
    fn status() -> ProvisionStatus {
        ProvisionStatus::Failed
    }
}

/// Data shared across all provisioning states.
#[derive(Debug, Clone)]
pub struct WorkloadData {
    /// Instance label.
    pub label: InstanceLabel,
    /// Archive served by the instance.
    pub archive_url: String,
    /// When provisioning started.
    pub started_at: DateTime<Utc>,
}

/// A workload instance in a specific provisioning state.
#[derive(Debug)]
pub struct Workload<S: WorkloadState> {
    data: WorkloadData,
    state: S,
}

impl<S: WorkloadState> Workload<S> {
    /// Get a reference to the workload data.
    #[must_use]
    pub const fn data(&self) -> &WorkloadData {
        &self.data
    }

    /// Get the instance label.
    #[must_use]
    pub const fn label(&self) -> &InstanceLabel {
        &self.data.label
    }

    /// Get the current status.
    #[must_use]
    pub fn status(&self) -> ProvisionStatus {
        S::status()
    }

    /// Convert into the underlying data.
    #[must_use]
    pub fn into_data(self) -> WorkloadData {
        self.data
    }

    fn transition<T: WorkloadState>(self, state: T) -> Workload<T> {
        Workload {
            data: self.data,
            state,
        }
    }
}

impl Workload<Provisioning> {
    /// Begin provisioning an instance.
    #[must_use]
    pub fn start(label: InstanceLabel, archive_url: impl Into<String>) -> Self {
        Self {
            data: WorkloadData {
                label,
                archive_url: archive_url.into(),
                started_at: Utc::now(),
            },
            state: Provisioning,
        }
    }

    /// Transition to the ready state.
    #[must_use]
    pub fn ready(self, endpoints: Endpoints) -> Workload<Ready> {
        self.transition(Ready { endpoints })
    }

    /// Transition to the failed state.
    #[must_use]
    pub fn fail(self, error: String) -> Workload<Failed> {
        self.transition(Failed { error })
    }
}

impl Workload<Ready> {
    /// Endpoints of the ready instance.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.state.endpoints
    }
}

impl Workload<Failed> {
    /// Error that ended provisioning.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.state.error
    }
}
