//! Configuration for the artifact locator.

use serde::Deserialize;

/// Crawl behaviour for the artifact locator.
#[derive(Debug, Clone, Deserialize)]
pub struct LocatorConfig {
    /// Timeout for a single listing page request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum directory depth below the artifacts root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of CI-run pages followed before reaching the artifacts browser.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// File names of the archives to look for.
    #[serde(default = "default_target_filenames")]
    pub target_filenames: Vec<String>,

    /// Path segments whose subtrees never contain archives.
    #[serde(default = "default_ignored_segments")]
    pub ignored_segments: Vec<String>,
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_depth() -> usize {
    32
}

const fn default_max_redirects() -> usize {
    4
}

fn default_target_filenames() -> Vec<String> {
    vec!["must-gather.tar".to_owned(), "hypershift-dump.tar".to_owned()]
}

fn default_ignored_segments() -> Vec<String> {
    ["namespaces", "cluster-scoped-resources", "gather-extra", "cloud.google.com"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_depth: default_max_depth(),
            max_redirects: default_max_redirects(),
            target_filenames: default_target_filenames(),
            ignored_segments: default_ignored_segments(),
        }
    }
}

impl LocatorConfig {
    /// Returns true if `url` falls inside a subtree that is never crawled.
    #[must_use]
    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignored_segments
            .iter()
            .any(|segment| url.contains(segment.as_str()))
    }
}
