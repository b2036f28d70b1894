//! Notification dispatch.
//!
//! Notifications are fire-and-forget side effects emitted after a unit of
//! work commits; a failed dispatch is logged and never rolls back or fails
//! the operation that produced it.

use async_trait::async_trait;
use serde::Serialize;
use hifz_core::{Day, OfficialCode, PartNumber, StudentId};
use tracing::{info, warn};

/// An outbound message for a student or supervisor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The student completed the full official set of their track.
    QualificationEarned {
        /// Promoted student
        student_id: StudentId,
        /// Student display name
        student_name: String,
        /// Day the last qualifying exam was taken
        qualified_on: Option<Day>,
    },
    /// An unpaused plan ran past its deadline without the current part
    /// being examined.
    PartOverdue {
        /// Affected student
        student_id: StudentId,
        /// Student display name
        student_name: String,
        /// Part still owed
        part: PartNumber,
        /// Deadline that lapsed
        due_date: Day,
    },
    /// A paused plan ran past its deadline with an official exam still
    /// unrequested.
    OfficialPending {
        /// Affected student
        student_id: StudentId,
        /// Student display name
        student_name: String,
        /// Outstanding code with no active request
        code: OfficialCode,
        /// Deadline that lapsed
        due_date: Day,
    },
}

/// Delivery seam for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError>;
}

/// Notification delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP delivery failure
    #[error("webhook delivery failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Dispatch a batch best-effort, logging failures.
pub async fn dispatch_all(notifier: &dyn Notifier, notifications: &[Notification]) {
    for notification in notifications {
        if let Err(e) = notifier.notify(notification).await {
            warn!("notification dropped: {}", e);
        }
    }
}

/// Notifier that only writes to the log. Default, and handy in tests.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        info!(?notification, "notification");
        Ok(())
    }
}

/// Notifier that POSTs each notification as JSON to a webhook endpoint
/// (typically bridged to mail by the deployment).
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// Create a notifier targeting `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        self.client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
