//! Configuration for gatherview-control.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use gatherview_locator::LocatorConfig;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level configuration for the viewer service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ViewerConfig {
    /// Cluster scoping.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Container images used by viewer workloads.
    #[serde(default)]
    pub images: ImageConfig,

    /// Readiness and reclamation timing.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Quota watch behaviour.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Archive lookup behaviour.
    #[serde(default)]
    pub locator: LocatorConfig,
}

impl ViewerConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `gatherview.toml` in the current directory (if present)
    /// 3. Environment variables with `GATHERVIEW_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_file("gatherview.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GATHERVIEW_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// Cluster scoping.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Namespace holding every viewer workload.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the quota resource capping pod count.
    #[serde(default = "default_quota_name")]
    pub quota_name: String,
}

fn default_namespace() -> String {
    "gatherview".to_owned()
}

fn default_quota_name() -> String {
    "gatherview-quota".to_owned()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            quota_name: default_quota_name(),
        }
    }
}

/// Container images used by viewer workloads.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Image serving the archive contents as an API.
    #[serde(default = "default_viewer_image")]
    pub viewer: String,

    /// Companion web console image.
    #[serde(default = "default_console_image")]
    pub console: String,

    /// Image that downloads and extracts the archive.
    #[serde(default = "default_fetcher_image")]
    pub fetcher: String,
}

fn default_viewer_image() -> String {
    "gatherview:static-kas".to_owned()
}

fn default_console_image() -> String {
    "quay.io/openshift/origin-console:latest".to_owned()
}

fn default_fetcher_image() -> String {
    "registry.access.redhat.com/ubi8/ubi:8.5".to_owned()
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            viewer: default_viewer_image(),
            console: default_console_image(),
            fetcher: default_fetcher_image(),
        }
    }
}

/// Readiness and reclamation timing.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// How long to wait for a launched workload to become ready, in seconds.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Interval between readiness polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Age after which a workload is reclaimed, in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Interval between reclamation sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum teardowns running at once.
    #[serde(default = "default_max_concurrent_teardowns")]
    pub max_concurrent_teardowns: usize,
}

const fn default_ready_timeout_secs() -> u64 {
    300 // 5 minutes
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_max_age_secs() -> u64 {
    8 * 60 * 60
}

const fn default_sweep_interval_secs() -> u64 {
    600
}

const fn default_max_concurrent_teardowns() -> usize {
    4
}

impl LifecycleConfig {
    /// Readiness timeout.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Readiness poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Workload lifetime.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_concurrent_teardowns: default_max_concurrent_teardowns(),
        }
    }
}

/// Quota watch behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// First delay before reopening a failed watch, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the reopen delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
