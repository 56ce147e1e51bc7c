//! One-shot sleep scheduling.
//!
//! - [`descriptor`] computes the sleep and reminder moments
//! - [`store`] persists the active descriptor
//! - [`installer`] and [`authority`] register the external sleep job
//! - [`reminder`] and [`countdown`] drive the user-facing side
//! - [`orchestrator`] ties them together and owns the published state

pub mod authority;
pub mod clock;
pub mod countdown;
pub mod descriptor;
pub mod installer;
pub mod orchestrator;
pub mod reminder;
pub mod store;

pub use authority::{Launchctl, SchedulingAuthority};
pub use clock::{Clock, FixedClock, SystemClock};
pub use countdown::{Countdown, CountdownPhase, CountdownPresenter, format_remaining};
pub use descriptor::{ScheduleDescriptor, ScheduleState, SourceSpec};
pub use installer::{ActionInstaller, LaunchAgentInstaller};
pub use orchestrator::{Orchestrator, RestoreReport, SchedulingState};
pub use reminder::{REMINDER_ID, ReminderScheduler};
pub use store::ActionStore;
