//! Listing pages and cluster contents shared by integration tests.

use chrono::{DateTime, Duration, Utc};
use gatherview_control::{InstanceLabel, MockCluster, ResourceKind};
use gatherview_locator::StaticListingSource;

pub const RUN: &str = "https://ci.example/view/gs/bucket/logs/job/7";
pub const BROWSER: &str = "https://gcsweb.example/gcs/bucket/logs/job/7/";
pub const ARTIFACTS: &str = "https://gcsweb.example/gcs/bucket/logs/job/7/artifacts/";
pub const ARCHIVE: &str =
    "https://gcsweb.example/gcs/bucket/logs/job/7/artifacts/e2e/must-gather/must-gather.tar";

/// Renders a directory-index page with the given `(href, text)` links.
pub fn listing(links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(href, text)| format!("<a href=\"{href}\">{text}</a><br>\n"))
        .collect();
    format!("<html><body>\n{anchors}</body></html>")
}

/// A CI run whose artifacts hold one must-gather archive.
pub fn ci_run() -> StaticListingSource {
    StaticListingSource::new()
        .with_page(RUN, listing(&[(BROWSER, "Artifacts")]))
        .with_page(BROWSER, listing(&[("artifacts/", "artifacts/")]))
        .with_page(ARTIFACTS, listing(&[("e2e/", "e2e/")]))
        .with_page(
            &format!("{ARTIFACTS}e2e/"),
            listing(&[("must-gather/", "must-gather/")]),
        )
        .with_page(
            &format!("{ARTIFACTS}e2e/must-gather/"),
            listing(&[("must-gather.tar", "must-gather.tar")]),
        )
}

/// A CI run whose artifacts contain no archive.
pub fn empty_run() -> StaticListingSource {
    StaticListingSource::new()
        .with_page(BROWSER, listing(&[("artifacts/", "artifacts/")]))
        .with_page(ARTIFACTS, listing(&[("junit.xml", "junit.xml")]))
}

/// Adds the full resource set of an instance created `age` before `now`.
pub fn seed_instance(cluster: &MockCluster, label: &str, now: DateTime<Utc>, age: Duration) {
    let label = InstanceLabel::new(label);
    cluster.insert(ResourceKind::Service, label.as_str(), &label);
    cluster.insert(ResourceKind::Route, &format!("{label}-api"), &label);
    cluster.insert(ResourceKind::Route, &format!("{label}-console"), &label);
    cluster.insert_deployment(&format!("{label}-viewer"), Some(&label), Some(now - age));
}
