//! Schedule descriptor and sleep-time planning.
//!
//! A [`ScheduleDescriptor`] is the one entity the scheduler persists. It is
//! created by [`ScheduleDescriptor::plan`] from a [`SourceSpec`] and the
//! current time, and destroyed (not archived) on cancel.

use crate::error::ScheduleError;
use chrono::{DateTime, Days, Local, LocalResult, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Sleep at the next occurrence of a local clock time.
    AbsoluteTime {
        /// Hour of day (0-23, local).
        hour: u8,
        /// Minute of hour (0-59).
        minute: u8,
    },
    /// Sleep after a delay from now.
    RelativeDelay {
        /// Whole hours.
        hours: u32,
        /// Additional minutes.
        minutes: u32,
    },
}

impl SourceSpec {
    /// Returns `true` for delay-based schedules.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        matches!(self, Self::RelativeDelay { .. })
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AbsoluteTime { hour, minute } => write!(f, "at {hour:02}:{minute:02}"),
            Self::RelativeDelay { hours, minutes } => write!(f, "after {hours}h {minutes}m"),
        }
    }
}

/// Lifecycle state of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    /// Installed and not yet fired.
    Pending,
    /// Explicitly removed before firing.
    Cancelled,
}

/// Durable description of the active sleep schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    /// Fresh unique token per schedule creation.
    pub id: String,
    /// Moment the sleep action fires.
    pub sleep_at: DateTime<Local>,
    /// Moment the reminder notification is delivered.
    pub reminder_at: DateTime<Local>,
    /// The request this schedule was planned from.
    pub source: SourceSpec,
    /// Lifecycle state.
    pub state: ScheduleState,
    /// When the schedule was created.
    pub created_at: DateTime<Local>,
}

impl ScheduleDescriptor {
    /// Plan a new pending schedule with a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidTime`] when `source` cannot yield a
    /// future sleep moment.
    pub fn plan(
        source: SourceSpec,
        now: DateTime<Local>,
        lead_time: Duration,
    ) -> Result<Self, ScheduleError> {
        let sleep_at = sleep_at_for(&source, &now)?;
        let reminder_at = reminder_at_for(&sleep_at, &now, lead_time);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            sleep_at,
            reminder_at,
            source,
            state: ScheduleState::Pending,
            created_at: now,
        })
    }

    /// Returns `true` while the schedule is installed and not cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == ScheduleState::Pending
    }

    /// Returns `true` when the sleep moment passed more than `grace` ago.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Local>, grace: Duration) -> bool {
        let grace = chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::MAX);
        match self.sleep_at.checked_add_signed(grace) {
            Some(deadline) => deadline < now,
            None => false,
        }
    }

    /// Time left until the sleep moment (zero once it has passed).
    #[must_use]
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        (self.sleep_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Human-readable confirmation line.
    #[must_use]
    pub fn describe(&self) -> String {
        let at = self.sleep_at.format("%H:%M");
        match self.source {
            SourceSpec::AbsoluteTime { .. } => format!("Sleep scheduled for {at}"),
            SourceSpec::RelativeDelay { hours, minutes } => {
                format!("Sleep scheduled after {hours}h {minutes}m (at {at})")
            }
        }
    }
}

/// Compute the sleep moment for `source` relative to `now`.
///
/// Clock times at or before `now` roll forward one day; the day is chosen
/// before the local time is resolved. A clock time that falls into a
/// daylight-saving gap on the chosen day is rejected; ambiguous ones resolve
/// to the earlier instant. Delays must stay under 24 hours with minutes
/// 0-59, since the installed job matches hour and minute only.
///
/// # Errors
///
/// Returns [`ScheduleError::InvalidTime`] for out-of-range fields, a zero
/// delay, or an unrepresentable result.
pub fn sleep_at_for<Tz: TimeZone>(
    source: &SourceSpec,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, ScheduleError> {
    match *source {
        SourceSpec::AbsoluteTime { hour, minute } => {
            let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0).ok_or_else(
                || ScheduleError::InvalidTime(format!("{hour:02}:{minute:02} is not a clock time")),
            )?;
            let today = now.date_naive();
            let candidate = today.and_time(time);
            if candidate > now.naive_local() {
                let target = resolve_local(&now.timezone(), candidate)?;
                if target > *now {
                    return Ok(target);
                }
            }
            let tomorrow = today
                .checked_add_days(Days::new(1))
                .ok_or_else(|| ScheduleError::InvalidTime("date overflow".to_owned()))?;
            resolve_local(&now.timezone(), tomorrow.and_time(time))
        }
        SourceSpec::RelativeDelay { hours, minutes } => {
            if minutes >= 60 {
                return Err(ScheduleError::InvalidTime(format!(
                    "{minutes} minutes is out of range (0-59)"
                )));
            }
            if hours >= 24 {
                return Err(ScheduleError::InvalidTime(format!(
                    "{hours}h delay is out of range; the sleep job repeats daily (0-23 hours)"
                )));
            }
            let total_secs = u64::from(hours) * 3600 + u64::from(minutes) * 60;
            if total_secs == 0 {
                return Err(ScheduleError::InvalidTime(
                    "delay must be at least one minute".to_owned(),
                ));
            }
            let delay = i64::try_from(total_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .ok_or_else(|| ScheduleError::InvalidTime("delay too large".to_owned()))?;
            now.clone()
                .checked_add_signed(delay)
                .ok_or_else(|| ScheduleError::InvalidTime("delay too large".to_owned()))
        }
    }
}

/// Reminder moment: `lead_time` before `sleep_at`, never earlier than `now`.
#[must_use]
pub fn reminder_at_for<Tz: TimeZone>(
    sleep_at: &DateTime<Tz>,
    now: &DateTime<Tz>,
    lead_time: Duration,
) -> DateTime<Tz> {
    let lead = chrono::Duration::from_std(lead_time).unwrap_or(chrono::Duration::MAX);
    match sleep_at.clone().checked_sub_signed(lead) {
        Some(reminder) if reminder > *now => reminder,
        _ => now.clone(),
    }
}

fn resolve_local<Tz: TimeZone>(
    tz: &Tz,
    naive: chrono::NaiveDateTime,
) -> Result<DateTime<Tz>, ScheduleError> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(value) => Ok(value),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(ScheduleError::InvalidTime(format!(
            "{naive} does not exist in the local time zone"
        ))),
    }
}
