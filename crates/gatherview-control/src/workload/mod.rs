//! Workload lifecycle: launch, readiness, teardown and reclamation.

mod manager;
mod pool;

pub use manager::{SweepReport, WorkloadManager, LABEL_ATTEMPTS, REQUIRED_REPLICAS};
pub use pool::TeardownPool;
