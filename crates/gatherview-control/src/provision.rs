//! End-to-end provisioning of a viewer for a CI run.

use std::sync::Arc;

use gatherview_locator::{ArtifactLocation, ArtifactLocator, LocatorError};
use tracing::{info, instrument};

use crate::error::{ControlError, ControlResult};
use crate::notify::{Notification, Notifier};
use crate::types::{Endpoints, InstanceLabel};
use crate::workload::WorkloadManager;

/// A viewer that finished provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionedViewer {
    /// Instance label.
    pub label: InstanceLabel,
    /// Archives found for the run.
    pub location: ArtifactLocation,
    /// Where the viewer is reachable.
    pub endpoints: Endpoints,
}

/// Finds a run's archive and brings up a viewer for it.
pub struct Provisioner {
    locator: ArtifactLocator,
    manager: Arc<WorkloadManager>,
}

impl Provisioner {
    /// Create a provisioner.
    #[must_use]
    pub const fn new(locator: ArtifactLocator, manager: Arc<WorkloadManager>) -> Self {
        Self { locator, manager }
    }

    /// Provision a viewer for the CI run at `run_url`.
    ///
    /// Progress goes to `notifier`, ending with either `Ready` or `Failed`.
    /// A failure after a label was allocated is a [`ControlError::Provision`]
    /// naming that label; tearing it down is up to the caller.
    #[instrument(skip(self, notifier))]
    pub async fn provision(
        &self,
        run_url: &str,
        notifier: &dyn Notifier,
    ) -> ControlResult<ProvisionedViewer> {
        let result = self.run(run_url, notifier).await;
        if let Err(e) = &result {
            notifier.notify(Notification::Failed {
                message: e.to_string(),
            });
        }
        result
    }

    async fn run(&self, run_url: &str, notifier: &dyn Notifier) -> ControlResult<ProvisionedViewer> {
        notifier.notify(Notification::status(format!("Finding artifacts for {run_url}")));
        let location = self.locate(run_url, notifier).await?;

        let label = self.manager.allocate_label().await?;
        notifier.notify(Notification::status(format!(
            "Launching viewer {label} for {}",
            location.archive_url
        )));

        let endpoints = match self.launch(&label, &location, notifier).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                return Err(ControlError::Provision {
                    label,
                    source: Box::new(e),
                })
            }
        };

        info!(label = %label, api = %endpoints.api, console = %endpoints.console, "viewer provisioned");
        notifier.notify(Notification::Ready {
            api: endpoints.api.clone(),
            console: endpoints.console.clone(),
        });

        Ok(ProvisionedViewer {
            label,
            location,
            endpoints,
        })
    }

    async fn locate(&self, run_url: &str, notifier: &dyn Notifier) -> ControlResult<ArtifactLocation> {
        let root = self.locator.locate_artifacts_root(run_url).await?;
        notifier.notify(Notification::status(format!("Found artifact url: {root}")));

        let targets = &self.locator.config().target_filenames;
        let dumps = self.locator.crawl_for_archives(&root, targets).await?;
        for dump in &dumps {
            notifier.notify(Notification::status(format!("Found dump archive at {dump}")));
        }

        ArtifactLocation::from_urls(dumps)
            .ok_or_else(|| LocatorError::not_found(root.as_str(), "no dump archives found").into())
    }

    async fn launch(
        &self,
        label: &InstanceLabel,
        location: &ArtifactLocation,
        notifier: &dyn Notifier,
    ) -> ControlResult<Endpoints> {
        let endpoints = self
            .manager
            .launch(label, location.archive_url.as_str())
            .await?;

        notifier.notify(Notification::status(format!(
            "Waiting for viewer {label} to become ready"
        )));
        self.manager
            .await_ready(label, self.manager.lifecycle().ready_timeout())
            .await?;

        Ok(endpoints)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("locator", &self.locator)
            .field("manager", &self.manager)
            .finish()
    }
}
