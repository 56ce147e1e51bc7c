//! Error types for the sleep scheduler.
//!
//! Each component has its own error enum so callers can match on the exact
//! failure. [`DrowseError`] wraps them for plumbing code (config, host bridge)
//! that only needs to report.

use std::path::PathBuf;

/// Failure while installing or removing the external sleep job.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The scheduling authority returned a non-zero exit code.
    #[error("scheduling authority rejected {action} of {}: exit code {code}", .path.display())]
    AuthorityRejected {
        /// `"register"` or `"unregister"`.
        action: &'static str,
        /// Job artifact the authority was asked to act on.
        path: PathBuf,
        /// Exit code reported by the authority.
        code: i32,
    },

    /// Writing, deleting or spawning failed locally.
    #[error("job artifact I/O failed for {}: {source}", .path.display())]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Removal attempted both steps and at least one failed.
    #[error("job cleanup incomplete: {}", join_errors(.0))]
    Cleanup(Vec<InstallError>),
}

/// Failure in the scheduled action store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Permission or disk failure.
    #[error("schedule store I/O failed for {}: {source}", .path.display())]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact exists but cannot be parsed.
    #[error("corrupt schedule artifact {}: {reason}", .path.display())]
    CorruptArtifact {
        /// Offending artifact.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
}

/// Failure reported by the notification capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    /// The user has not granted notification permission.
    #[error("notification permission denied")]
    PermissionDenied,

    /// The platform could not deliver or schedule the notification.
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Failure returned by [`Orchestrator::schedule`](crate::schedule::Orchestrator::schedule).
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// A pending schedule already exists; cancel it first.
    #[error("a sleep schedule is already pending ({id})")]
    AlreadyScheduled {
        /// Identifier of the pending schedule.
        id: String,
    },

    /// The requested time cannot produce a future sleep moment.
    #[error("invalid sleep time: {0}")]
    InvalidTime(String),

    /// Installing the external job failed; nothing was persisted.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Persisting the descriptor failed after the job was installed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure returned by [`Orchestrator::cancel`](crate::schedule::Orchestrator::cancel).
///
/// State has already returned to "not scheduled" when this is produced.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    /// Some cleanup steps failed; an orphaned job may remain registered.
    #[error("schedule {id} cancelled with incomplete cleanup: {}", join_messages(.failures))]
    PartialCleanup {
        /// Identifier of the cancelled schedule.
        id: String,
        /// Human-readable description of each failed step.
        failures: Vec<String>,
    },
}

/// Top-level error type for configuration and host plumbing.
#[derive(Debug, thiserror::Error)]
pub enum DrowseError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Host protocol error.
    #[error("host error: {0}")]
    Host(String),

    /// Scheduling failed.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Cancellation finished with incomplete cleanup.
    #[error(transparent)]
    Cancel(#[from] CancelError),

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DrowseError>;

fn join_errors(errors: &[InstallError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_messages(messages: &[String]) -> String {
    messages.join("; ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn cleanup_error_lists_every_failure() {
        let err = InstallError::Cleanup(vec![
            InstallError::AuthorityRejected {
                action: "unregister",
                path: PathBuf::from("/tmp/job.plist"),
                code: 5,
            },
            InstallError::Io {
                path: PathBuf::from("/tmp/job.plist"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("unregister"));
        assert!(msg.contains("exit code 5"));
        assert!(msg.contains("I/O failed"));
    }

    #[test]
    fn partial_cleanup_mentions_schedule_id() {
        let err = CancelError::PartialCleanup {
            id: "abc".to_owned(),
            failures: vec!["remove job: boom".to_owned()],
        };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn schedule_error_wraps_install_error() {
        let err: ScheduleError = InstallError::AuthorityRejected {
            action: "register",
            path: PathBuf::from("/x.plist"),
            code: 1,
        }
        .into();
        assert!(matches!(err, ScheduleError::Install(_)));
    }
}
