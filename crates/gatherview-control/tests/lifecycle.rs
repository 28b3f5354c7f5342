//! Integration tests for launching, readiness, teardown and reclamation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::fixtures::seed_instance;
use common::{fast_lifecycle, GatedCluster, TestEnv};
use gatherview_control::config::{ImageConfig, LifecycleConfig};
use gatherview_control::{
    ClusterClient, ControlError, ExpiryStatus, InstanceLabel, MockCluster, ProvisionStatus,
    ResourceKind, WorkloadManager,
};
use rstest::rstest;

const ARCHIVE: &str = "https://gcs.example/artifacts/must-gather.tar";
const EIGHT_HOURS: Duration = Duration::from_secs(8 * 3600);

#[tokio::test]
async fn launch_creates_resources_in_order() {
    let env = TestEnv::new();
    let label = InstanceLabel::new("abcdefgh");

    let endpoints = env.manager.launch(&label, ARCHIVE).await.unwrap();

    assert_eq!(endpoints.api, "https://abcdefgh-api.apps.example.test");
    assert_eq!(endpoints.console, "https://abcdefgh-console.apps.example.test");
    assert_eq!(
        env.cluster.created(),
        vec![
            (ResourceKind::Service, "abcdefgh".to_owned()),
            (ResourceKind::Route, "abcdefgh-api".to_owned()),
            (ResourceKind::Route, "abcdefgh-console".to_owned()),
            (ResourceKind::Deployment, "abcdefgh-viewer".to_owned()),
        ]
    );
}

#[tokio::test]
async fn failed_step_leaves_earlier_resources_in_place() {
    let env = TestEnv::new();
    env.cluster.fail_create(ResourceKind::Route, "admission denied");
    let label = InstanceLabel::new("abcdefgh");

    let err = env.manager.launch(&label, ARCHIVE).await.unwrap_err();

    match err {
        ControlError::Creation {
            kind,
            name,
            completed,
            ..
        } => {
            assert_eq!(kind, ResourceKind::Route);
            assert_eq!(name, "abcdefgh-api");
            assert_eq!(completed, vec!["Created service abcdefgh".to_owned()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.cluster.names(ResourceKind::Service), vec!["abcdefgh"]);
    assert!(env.cluster.names(ResourceKind::Deployment).is_empty());
}

#[rstest]
#[case(1)]
#[case(4)]
#[tokio::test]
async fn await_ready_returns_once_replicas_are_available(#[case] polls: u32) {
    let env = TestEnv::new();
    env.cluster.ready_after(polls);
    let label = InstanceLabel::new("abcdefgh");
    env.manager.launch(&label, ARCHIVE).await.unwrap();

    env.manager
        .await_ready(&label, Duration::from_secs(2))
        .await
        .unwrap();
}

#[tokio::test]
async fn await_ready_times_out() {
    let env = TestEnv::new();
    env.cluster.never_ready();
    let label = InstanceLabel::new("abcdefgh");
    env.manager.launch(&label, ARCHIVE).await.unwrap();

    let err = env
        .manager
        .await_ready(&label, Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, ControlError::Timeout { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn await_ready_stops_on_fetch_error() {
    let env = TestEnv::new();
    env.cluster.fail_replicas("connection refused");
    let label = InstanceLabel::new("abcdefgh");

    let err = env
        .manager
        .await_ready(&label, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, ControlError::Fetch(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn provision_reaches_ready() {
    let env = TestEnv::new();
    env.cluster.ready_after(2);

    let ready = env
        .manager
        .provision(InstanceLabel::new("abcdefgh"), ARCHIVE)
        .await
        .unwrap();

    assert_eq!(ready.status(), ProvisionStatus::Ready);
    assert_eq!(ready.endpoints().api, "https://abcdefgh-api.apps.example.test");
}

#[tokio::test]
async fn provision_timeout_is_recorded_as_failed() {
    let env = TestEnv::new();
    env.cluster.never_ready();

    let (failed, err) = env
        .manager
        .provision(InstanceLabel::new("abcdefgh"), ARCHIVE)
        .await
        .unwrap_err();

    assert!(matches!(err, ControlError::Timeout { .. }));
    assert!(failed.error().contains("not ready"));
}

#[tokio::test]
async fn teardown_removes_every_resource_in_order() {
    let env = TestEnv::new();
    let label = InstanceLabel::new("abcdefgh");
    env.manager.launch(&label, ARCHIVE).await.unwrap();
    env.cluster
        .insert(ResourceKind::ConfigMap, "abcdefgh-config", &label);

    let log = env.manager.teardown(&label).await.unwrap();

    assert_eq!(
        log.entries(),
        [
            "Removed service abcdefgh",
            "Removed deployment abcdefgh-viewer",
            "Removed config map abcdefgh-config",
            "Removed route abcdefgh-api",
            "Removed route abcdefgh-console",
        ]
    );
    for kind in ResourceKind::TEARDOWN_ORDER {
        assert!(env.cluster.names(kind).is_empty());
    }
}

#[tokio::test]
async fn teardown_leaves_other_instances_alone() {
    let env = TestEnv::new();
    let now = Utc::now();
    seed_instance(&env.cluster, "aaaaaaaa", now, chrono::Duration::zero());
    seed_instance(&env.cluster, "bbbbbbbb", now, chrono::Duration::zero());

    env.manager
        .teardown(&InstanceLabel::new("aaaaaaaa"))
        .await
        .unwrap();

    assert_eq!(env.cluster.names(ResourceKind::Service), vec!["bbbbbbbb"]);
    assert_eq!(
        env.cluster.names(ResourceKind::Deployment),
        vec!["bbbbbbbb-viewer"]
    );
}

#[tokio::test]
async fn teardown_of_missing_instance_is_a_no_op() {
    let env = TestEnv::new();

    let first = env
        .manager
        .teardown(&InstanceLabel::new("abcdefgh"))
        .await
        .unwrap();
    let second = env
        .manager
        .teardown(&InstanceLabel::new("abcdefgh"))
        .await
        .unwrap();

    assert!(first.is_empty());
    assert!(second.is_empty());
}

#[tokio::test]
async fn teardown_failure_carries_partial_log() {
    let env = TestEnv::new();
    let label = InstanceLabel::new("abcdefgh");
    env.manager.launch(&label, ARCHIVE).await.unwrap();
    env.cluster.fail_delete(ResourceKind::Deployment, "forbidden");

    let err = env.manager.teardown(&label).await.unwrap_err();

    match err {
        ControlError::PartialFailure { label: l, log, reason } => {
            assert_eq!(l, label);
            assert_eq!(log.entries(), ["Removed service abcdefgh"]);
            assert!(reason.contains("forbidden"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.cluster.names(ResourceKind::Route).len(), 2);
}

#[tokio::test]
async fn reclaim_submits_only_expired_instances() {
    let env = TestEnv::new();
    let now = Utc::now();
    seed_instance(&env.cluster, "youngone", now, chrono::Duration::hours(8) - chrono::Duration::seconds(1));
    seed_instance(&env.cluster, "exactage", now, chrono::Duration::hours(8));
    seed_instance(&env.cluster, "ancientt", now, chrono::Duration::hours(30));

    let report = env
        .manager
        .reclaim_expired_at(now, EIGHT_HOURS)
        .await
        .unwrap();
    env.manager.wait_for_teardowns().await;

    let mut submitted: Vec<_> = report.submitted.iter().map(|l| l.to_string()).collect();
    submitted.sort();
    assert_eq!(submitted, vec!["ancientt", "exactage"]);
    assert_eq!(report.retained, 1);
    assert_eq!(report.skipped, 0);

    assert_eq!(env.cluster.names(ResourceKind::Service), vec!["youngone"]);
    assert_eq!(
        env.cluster.names(ResourceKind::Deployment),
        vec!["youngone-viewer"]
    );
}

#[tokio::test]
async fn reclaim_skips_unlabelled_or_undated_deployments() {
    let env = TestEnv::new();
    let now = Utc::now();
    let old = now - chrono::Duration::hours(24);
    env.cluster.insert_deployment("stray", None, Some(old));
    env.cluster
        .insert_deployment("undated-viewer", Some(&InstanceLabel::new("undatedd")), None);

    let report = env
        .manager
        .reclaim_expired_at(now, EIGHT_HOURS)
        .await
        .unwrap();
    env.manager.wait_for_teardowns().await;

    assert!(report.submitted.is_empty());
    assert_eq!(report.skipped, 2);
    assert_eq!(env.cluster.names(ResourceKind::Deployment).len(), 2);
}

#[tokio::test]
async fn reclaim_submits_each_label_once_per_sweep() {
    let env = TestEnv::new();
    let now = Utc::now();
    let label = InstanceLabel::new("dupedupe");
    let old = now - chrono::Duration::hours(9);
    env.cluster.insert_deployment("dupedupe-viewer", Some(&label), Some(old));
    env.cluster.insert_deployment("dupedupe-extra", Some(&label), Some(old));

    let report = env
        .manager
        .reclaim_expired_at(now, EIGHT_HOURS)
        .await
        .unwrap();
    env.manager.wait_for_teardowns().await;

    assert_eq!(report.submitted, vec![label]);
    assert!(env.cluster.names(ResourceKind::Deployment).is_empty());
}

#[tokio::test]
async fn reclaim_returns_before_teardowns_finish() {
    let mock = Arc::new(MockCluster::new());
    let now = Utc::now();
    for label in ["aaaaaaaa", "bbbbbbbb", "cccccccc"] {
        seed_instance(&mock, label, now, chrono::Duration::hours(9));
    }
    let gated = Arc::new(GatedCluster::new(Arc::clone(&mock)));
    let client: Arc<dyn ClusterClient> = gated.clone();
    let lifecycle = LifecycleConfig {
        max_concurrent_teardowns: 1,
        ..fast_lifecycle()
    };
    let manager = WorkloadManager::new(client, ImageConfig::default(), lifecycle);

    let report = tokio::time::timeout(
        Duration::from_secs(1),
        manager.reclaim_expired_at(now, EIGHT_HOURS),
    )
    .await
    .expect("sweep waited for teardowns")
    .unwrap();

    assert_eq!(report.submitted.len(), 3);
    assert!(manager.pending_teardowns() > 0);
    assert_eq!(mock.names(ResourceKind::Deployment).len(), 3);
    assert_eq!(mock.names(ResourceKind::Service).len(), 3);

    gated.open();
    tokio::time::timeout(Duration::from_secs(2), manager.wait_for_teardowns())
        .await
        .unwrap();

    assert_eq!(manager.pending_teardowns(), 0);
    for kind in ResourceKind::TEARDOWN_ORDER {
        assert!(mock.names(kind).is_empty());
    }
}

#[tokio::test]
async fn instances_are_reconstructed_from_live_objects() {
    let env = TestEnv::new();
    let label = InstanceLabel::new("abcdefgh");
    env.manager.launch(&label, ARCHIVE).await.unwrap();
    env.manager
        .await_ready(&label, Duration::from_secs(1))
        .await
        .unwrap();

    let instances = env.manager.instances().await.unwrap();

    assert_eq!(instances.len(), 1);
    let instance = &instances[0];
    assert_eq!(instance.label, label);
    assert_eq!(instance.archive_url.as_deref(), Some(ARCHIVE));
    assert_eq!(
        instance.api_endpoint.as_deref(),
        Some("https://abcdefgh-api.apps.example.test")
    );
    assert_eq!(
        instance.console_endpoint.as_deref(),
        Some("https://abcdefgh-console.apps.example.test")
    );
    assert_eq!(instance.status, ProvisionStatus::Ready);
    assert_eq!(instance.expiry, ExpiryStatus::Active);
}

#[tokio::test]
async fn allocated_labels_are_unused() {
    let env = TestEnv::new();
    let first = env.manager.allocate_label().await.unwrap();
    env.manager.launch(&first, ARCHIVE).await.unwrap();

    let second = env.manager.allocate_label().await.unwrap();

    assert_ne!(first, second);
    assert!(second.as_str().bytes().all(|b| b.is_ascii_lowercase()));
}
