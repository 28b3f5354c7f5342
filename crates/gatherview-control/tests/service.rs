//! Integration tests for the viewer service loops.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::eventually;
use common::fixtures::seed_instance;
use gatherview_control::config::{LifecycleConfig, QuotaConfig};
use gatherview_control::{
    ClusterClient, MockCluster, Notification, Notifier, QuotaSnapshot, ResourceKind,
    ViewerConfig, ViewerService,
};
use tokio::sync::mpsc;

fn config() -> ViewerConfig {
    ViewerConfig {
        lifecycle: LifecycleConfig {
            sweep_interval_secs: 3600,
            max_age_secs: 8 * 3600,
            ..LifecycleConfig::default()
        },
        quota: QuotaConfig {
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        },
        ..ViewerConfig::default()
    }
}

#[tokio::test]
async fn service_reclaims_and_reports_until_shutdown() {
    let config = config();
    let cluster = Arc::new(MockCluster::new());
    let now = Utc::now();
    seed_instance(&cluster, "expiredd", now, chrono::Duration::hours(9));
    seed_instance(&cluster, "freshone", now, chrono::Duration::minutes(5));
    cluster.set_quota(QuotaSnapshot {
        name: config.cluster.quota_name.clone(),
        used: 2,
        hard: 10,
    });

    let service = Arc::new(ViewerService::new(config));
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let notifier: Arc<dyn Notifier> = Arc::new(tx);
    let client: Arc<dyn ClusterClient> = cluster.clone();

    let handle = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run_with(client, notifier).await })
    };

    let cluster_view = cluster.clone();
    assert!(
        eventually(Duration::from_secs(2), || cluster_view.names(ResourceKind::Deployment)
            == vec!["freshone-viewer".to_owned()])
        .await
    );

    let quota = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(quota, Notification::Quota(ref q) if q.available() == 8));

    service.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn initial_quota_is_reported_without_a_watch() {
    let mut config = config();
    config.quota = QuotaConfig {
        initial_backoff_ms: 60_000,
        max_backoff_ms: 60_000,
    };
    let cluster = Arc::new(MockCluster::new());
    cluster.fail_watches(u32::MAX);
    cluster.set_quota(QuotaSnapshot {
        name: config.cluster.quota_name.clone(),
        used: 9,
        hard: 10,
    });

    let service = Arc::new(ViewerService::new(config));
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let notifier: Arc<dyn Notifier> = Arc::new(tx);
    let client: Arc<dyn ClusterClient> = cluster.clone();

    let handle = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run_with(client, notifier).await })
    };

    let quota = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(quota, Notification::Quota(ref q) if q.available() == 1));

    let cluster_view = cluster.clone();
    assert!(eventually(Duration::from_secs(2), || cluster_view.watch_attempts() == 1).await);
    assert_eq!(cluster_view.open_watches(), 0);

    service.shutdown();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
