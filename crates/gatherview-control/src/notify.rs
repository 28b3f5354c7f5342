//! Progress notifications sent to whoever requested a viewer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::types::QuotaSnapshot;

/// A message for the requester of a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Free-text progress message.
    Status {
        /// Message text.
        message: String,
    },
    /// The viewer is reachable.
    Ready {
        /// API endpoint.
        api: String,
        /// Console endpoint.
        console: String,
    },
    /// Provisioning failed.
    Failed {
        /// Error text.
        message: String,
    },
    /// Current cluster capacity.
    Quota(QuotaSnapshot),
}

impl Notification {
    /// Create a status notification.
    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

/// Sink for progress notifications.
///
/// Delivery is best effort: a requester that went away must not fail the
/// operation reporting to it.
pub trait Notifier: Send + Sync {
    /// Deliver a notification.
    fn notify(&self, notification: Notification);
}

impl Notifier for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        let _ = self.send(notification);
    }
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Status { message } => info!(%message, "status"),
            Notification::Ready { api, console } => info!(%api, %console, "viewer ready"),
            Notification::Failed { message } => info!(%message, "viewer failed"),
            Notification::Quota(quota) => {
                info!(used = quota.used, hard = quota.hard, "quota");
            }
        }
    }
}
