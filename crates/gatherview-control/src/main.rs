//! Gatherview control service binary.
//!
//! Runs the reclamation sweep and quota watch for viewer workloads.

use tracing::info;
use tracing_subscriber::EnvFilter;

use gatherview_control::{ViewerConfig, ViewerService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("gatherview_control=info".parse()?),
        )
        .init();

    info!("gatherview control service starting");

    let config = ViewerConfig::load().unwrap_or_else(|e| {
        info!(error = %e, "failed to load config, using defaults");
        ViewerConfig::default()
    });

    info!(
        namespace = %config.cluster.namespace,
        quota = %config.cluster.quota_name,
        max_age_secs = config.lifecycle.max_age_secs,
        "configuration loaded"
    );

    ViewerService::new(config).run().await?;

    Ok(())
}
