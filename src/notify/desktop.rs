//! Command-line desktop notifications.
//!
//! macOS uses `osascript -e 'display notification ...'`, other platforms use
//! `notify-send`. Deferred notifications are kept as tokio timers owned by
//! this process, keyed by id.

use super::{Notifier, PendingNotification};
use crate::error::NotifyError;
use crate::schedule::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    AppleScript,
    NotifySend,
}

type PendingMap = HashMap<String, (PendingNotification, JoinHandle<()>)>;

/// Shows notifications through the platform notifier binary.
pub struct DesktopNotifier {
    program: Option<PathBuf>,
    backend: Backend,
    pending: Arc<Mutex<PendingMap>>,
    clock: Arc<dyn Clock>,
}

impl DesktopNotifier {
    /// Locate the platform notifier on `PATH`.
    #[must_use]
    pub fn detect() -> Self {
        let (name, backend) = if cfg!(target_os = "macos") {
            ("osascript", Backend::AppleScript)
        } else {
            ("notify-send", Backend::NotifySend)
        };
        let program = which::which(name).ok();
        if program.is_none() {
            warn!("{name} not found; desktop notifications are unavailable");
        }
        Self {
            program,
            backend,
            pending: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
        }
    }

    /// Measure delivery delays against `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn show(
    program: Option<PathBuf>,
    backend: Backend,
    title: &str,
    body: &str,
) -> Result<(), NotifyError> {
    let Some(program) = program else {
        return Err(NotifyError::PermissionDenied);
    };

    let mut command = tokio::process::Command::new(&program);
    match backend {
        Backend::AppleScript => {
            let script = format!(
                "display notification \"{}\" with title \"{}\" sound name \"default\"",
                applescript_escape(body),
                applescript_escape(title)
            );
            command.arg("-e").arg(script);
        }
        Backend::NotifySend => {
            command.arg("--app-name=drowse").arg(title).arg(body);
        }
    }

    let status = command
        .status()
        .await
        .map_err(|e| NotifyError::DeliveryFailed(format!("{}: {e}", program.display())))?;
    if status.success() {
        debug!(title, "notification delivered");
        Ok(())
    } else {
        Err(NotifyError::DeliveryFailed(format!(
            "{} exited with {status}",
            program.display()
        )))
    }
}

fn applescript_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn request_permission(&self) -> bool {
        self.program.is_some()
    }

    async fn deliver_now(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        show(self.program.clone(), self.backend, title, body).await
    }

    async fn deliver_at(
        &self,
        at: DateTime<Local>,
        title: &str,
        body: &str,
        id: &str,
    ) -> Result<(), NotifyError> {
        if self.program.is_none() {
            return Err(NotifyError::PermissionDenied);
        }

        let entry = PendingNotification {
            id: id.to_owned(),
            at,
            title: title.to_owned(),
            body: body.to_owned(),
        };
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let program = self.program.clone();
        let backend = self.backend;
        let pending = Arc::clone(&self.pending);
        let fired = entry.clone();

        // Held until the entry is inserted so an immediate timer cannot
        // remove it first.
        let mut map = self.pending();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut map) = pending.lock() {
                map.remove(&fired.id);
            }
            if let Err(e) = show(program, backend, &fired.title, &fired.body).await {
                warn!(id = %fired.id, "scheduled notification failed: {e}");
            }
        });

        if let Some((_, previous)) = map.insert(id.to_owned(), (entry, handle)) {
            previous.abort();
        }
        drop(map);
        debug!(id, %at, "notification scheduled");
        Ok(())
    }

    async fn cancel_pending(&self, id: &str) {
        if let Some((_, handle)) = self.pending().remove(id) {
            handle.abort();
            debug!(id, "pending notification cancelled");
        }
    }

    async fn list_pending(&self) -> Vec<PendingNotification> {
        let mut entries: Vec<PendingNotification> = self
            .pending()
            .values()
            .map(|(entry, _)| entry.clone())
            .collect();
        entries.sort_by_key(|entry| entry.at);
        entries
    }
}
