//! Drowse: one-shot machine sleep scheduler.
//!
//! A user picks either a clock time ("23:30") or a delay ("1h 30m"). Drowse
//! installs a launchd job that puts the machine to sleep at that moment,
//! reminds the user five minutes beforehand, and can show a live countdown.
//!
//! # Architecture
//!
//! - **Orchestrator**: single owner of the published scheduling state
//! - **Action store**: persists the active schedule descriptor
//! - **Action installer**: writes and registers the launchd job
//! - **Reminder scheduler**: pre-sleep notification through a [`notify::Notifier`]
//! - **Countdown presenter**: remaining-time ticker for the status display
//!
//! At most one schedule is pending at any time; on startup
//! [`schedule::Orchestrator::restore`] rebuilds state from disk.

pub mod config;
pub mod drowse_dirs;
pub mod error;
pub mod host;
pub mod notify;
pub mod schedule;

pub use config::DrowseConfig;
pub use error::{DrowseError, Result};
pub use schedule::{Orchestrator, ScheduleDescriptor, SchedulingState, SourceSpec};
