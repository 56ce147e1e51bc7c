//! Pre-sleep reminder notification.

use crate::error::NotifyError;
use crate::notify::Notifier;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::debug;

/// Stable notification id for the single outstanding reminder.
pub const REMINDER_ID: &str = "drowse-reminder";

const REMINDER_TITLE: &str = "Sleep Reminder";

/// Keeps at most one reminder scheduled with the notifier.
pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
}

impl ReminderScheduler {
    /// Create a reminder scheduler on top of `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Replace any outstanding reminder with `message` delivered at `at`.
    ///
    /// # Errors
    ///
    /// Returns the notifier's error when permission is missing or scheduling fails.
    pub async fn schedule_reminder(
        &self,
        at: DateTime<Local>,
        message: &str,
    ) -> Result<(), NotifyError> {
        if !self.notifier.request_permission().await {
            return Err(NotifyError::PermissionDenied);
        }
        self.notifier.cancel_pending(REMINDER_ID).await;
        self.notifier
            .deliver_at(at, REMINDER_TITLE, message, REMINDER_ID)
            .await?;
        debug!(%at, "sleep reminder scheduled");
        Ok(())
    }

    /// Withdraw the outstanding reminder, if any.
    pub async fn cancel_reminder(&self) {
        self.notifier.cancel_pending(REMINDER_ID).await;
    }
}
