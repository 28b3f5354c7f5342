//! Integration tests for the end-to-end provisioning flow.

mod common;

use std::sync::Arc;

use common::fixtures::{ci_run, empty_run, ARCHIVE, ARTIFACTS, RUN};
use common::TestEnv;
use gatherview_control::{ControlError, Notification, Provisioner, ResourceKind};
use gatherview_locator::{ArtifactLocator, ListingSource, LocatorConfig, StaticListingSource};
use tokio::sync::mpsc;

fn provisioner(env: &TestEnv, source: StaticListingSource) -> Provisioner {
    let source: Arc<dyn ListingSource> = Arc::new(source);
    let locator = ArtifactLocator::new(source, LocatorConfig::default());
    Provisioner::new(locator, Arc::clone(&env.manager))
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        notifications.push(notification);
    }
    notifications
}

#[tokio::test]
async fn run_url_becomes_ready_viewer() {
    let env = TestEnv::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let viewer = provisioner(&env, ci_run())
        .provision(RUN, &tx)
        .await
        .unwrap();

    assert_eq!(viewer.location.archive_url.as_str(), ARCHIVE);
    assert_eq!(
        viewer.endpoints.api,
        format!("https://{}-api.apps.example.test", viewer.label)
    );
    assert_eq!(
        env.cluster.names(ResourceKind::Deployment),
        vec![format!("{}-viewer", viewer.label)]
    );

    let notifications = drain(&mut rx);
    assert_eq!(
        notifications[..3],
        [
            Notification::status(format!("Finding artifacts for {RUN}")),
            Notification::status(format!("Found artifact url: {ARTIFACTS}")),
            Notification::status(format!("Found dump archive at {ARCHIVE}")),
        ]
    );
    assert_eq!(
        notifications.last(),
        Some(&Notification::Ready {
            api: viewer.endpoints.api.clone(),
            console: viewer.endpoints.console.clone(),
        })
    );
}

#[tokio::test]
async fn missing_archive_fails_before_any_resource_is_created() {
    let env = TestEnv::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let err = provisioner(&env, empty_run())
        .provision(common::fixtures::BROWSER, &tx)
        .await
        .unwrap_err();

    assert!(matches!(err, ControlError::Locator(ref e) if e.is_not_found()));
    assert!(err.orphaned_label().is_none());
    assert!(env.cluster.created().is_empty());
    assert!(matches!(
        drain(&mut rx).last(),
        Some(Notification::Failed { .. })
    ));
}

#[tokio::test]
async fn launch_failure_names_the_label_to_clean_up() {
    let env = TestEnv::new();
    env.cluster.fail_create(ResourceKind::Deployment, "quota exceeded");
    let (tx, _rx) = mpsc::unbounded_channel::<Notification>();

    let err = provisioner(&env, ci_run())
        .provision(RUN, &tx)
        .await
        .unwrap_err();

    let label = err.orphaned_label().cloned().unwrap();
    assert!(matches!(
        err,
        ControlError::Provision { ref source, .. }
            if matches!(**source, ControlError::Creation { .. })
    ));

    let log = env.manager.teardown(&label).await.unwrap();
    assert_eq!(log.entries().len(), 3);
    assert!(env.cluster.names(ResourceKind::Route).is_empty());
}

#[tokio::test]
async fn readiness_timeout_is_reported() {
    let env = TestEnv::new();
    env.cluster.never_ready();
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

    let err = provisioner(&env, ci_run())
        .provision(RUN, &tx)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ControlError::Provision { ref source, .. }
            if matches!(**source, ControlError::Timeout { .. })
    ));
    let notifications = drain(&mut rx);
    assert!(notifications
        .iter()
        .any(|n| matches!(n, Notification::Status { message } if message.starts_with("Waiting for viewer"))));
    assert!(matches!(notifications.last(), Some(Notification::Failed { .. })));
}
