//! In-memory notifier for tests and headless runs.

use super::{Notifier, PendingNotification};
use crate::error::NotifyError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::sync::Mutex;

/// One call observed by a [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// `deliver_now`.
    Now {
        /// Title shown.
        title: String,
        /// Body shown.
        body: String,
    },
    /// `deliver_at`.
    At(PendingNotification),
    /// `cancel_pending`.
    Cancel {
        /// Withdrawn id.
        id: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    log: Vec<Delivery>,
    pending: Vec<PendingNotification>,
}

/// Records every call instead of showing anything.
#[derive(Debug)]
pub struct RecordingNotifier {
    granted: bool,
    failure: Option<NotifyError>,
    inner: Mutex<Inner>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            granted: true,
            failure: None,
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl RecordingNotifier {
    /// A notifier whose permission request is refused.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            granted: false,
            ..Self::default()
        }
    }

    /// A notifier whose deliveries all fail with `error`.
    #[must_use]
    pub fn failing(error: NotifyError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Every successful call, in order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(&self) -> Result<(), NotifyError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn request_permission(&self) -> bool {
        self.granted
    }

    async fn deliver_now(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        self.check()?;
        self.lock().log.push(Delivery::Now {
            title: title.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }

    async fn deliver_at(
        &self,
        at: DateTime<Local>,
        title: &str,
        body: &str,
        id: &str,
    ) -> Result<(), NotifyError> {
        self.check()?;
        let entry = PendingNotification {
            id: id.to_owned(),
            at,
            title: title.to_owned(),
            body: body.to_owned(),
        };
        let mut inner = self.lock();
        inner.pending.retain(|p| p.id != id);
        inner.pending.push(entry.clone());
        inner.log.push(Delivery::At(entry));
        Ok(())
    }

    async fn cancel_pending(&self, id: &str) {
        let mut inner = self.lock();
        inner.pending.retain(|p| p.id != id);
        inner.log.push(Delivery::Cancel { id: id.to_owned() });
    }

    async fn list_pending(&self) -> Vec<PendingNotification> {
        self.lock().pending.clone()
    }
}
