//! Notification capability.
//!
//! The scheduler only needs to show a message now, show one later, and
//! withdraw a later one. [`Notifier`] is that seam; [`DesktopNotifier`]
//! drives the platform's command-line notifier and [`RecordingNotifier`]
//! keeps everything in memory.

use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

mod desktop;
mod recording;

pub use desktop::DesktopNotifier;
pub use recording::{Delivery, RecordingNotifier};

/// A notification waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    /// Caller-chosen identifier; scheduling the same id again replaces it.
    pub id: String,
    /// Delivery time.
    pub at: DateTime<Local>,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
}

/// Delivers user-visible notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask for (or confirm) permission to show notifications.
    async fn request_permission(&self) -> bool;

    /// Show a notification immediately.
    async fn deliver_now(&self, title: &str, body: &str) -> Result<(), NotifyError>;

    /// Show a notification at `at`, replacing any pending one with the same `id`.
    async fn deliver_at(
        &self,
        at: DateTime<Local>,
        title: &str,
        body: &str,
        id: &str,
    ) -> Result<(), NotifyError>;

    /// Withdraw the pending notification `id`, if any.
    async fn cancel_pending(&self, id: &str);

    /// Pending notifications, for diagnostics.
    async fn list_pending(&self) -> Vec<PendingNotification>;
}

/// Create the notifier for the current platform.
#[must_use]
pub fn create_notifier() -> DesktopNotifier {
    DesktopNotifier::detect()
}
