//! Scheduling façade.
//!
//! [`Orchestrator`] is the only writer of the published [`SchedulingState`].
//! Every mutating operation runs under one async lock, so the
//! "check pending, install, persist" sequence cannot interleave with another
//! `schedule` or `cancel`.

use crate::config::{DrowseConfig, ScheduleConfig};
use crate::error::{CancelError, ScheduleError, StoreError};
use crate::notify::{Notifier, PendingNotification, create_notifier};
use crate::schedule::authority::Launchctl;
use crate::schedule::clock::{Clock, SystemClock};
use crate::schedule::countdown::CountdownPresenter;
use crate::schedule::descriptor::{ScheduleDescriptor, ScheduleState, SourceSpec};
use crate::schedule::installer::{ActionInstaller, LaunchAgentInstaller};
use crate::schedule::reminder::ReminderScheduler;
use crate::schedule::store::ActionStore;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

/// What the UI should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "schedule", rename_all = "snake_case")]
pub enum SchedulingState {
    /// Nothing is scheduled.
    NotScheduled,
    /// A sleep job is installed and waiting.
    Pending(ScheduleDescriptor),
}

impl SchedulingState {
    /// Returns `true` when a schedule is pending.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The pending descriptor, if any.
    #[must_use]
    pub fn descriptor(&self) -> Option<&ScheduleDescriptor> {
        match self {
            Self::Pending(descriptor) => Some(descriptor),
            Self::NotScheduled => None,
        }
    }
}

/// Outcome of startup reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// State after reconciliation.
    pub state: SchedulingState,
    /// Descriptor ids removed (superseded, stale, cancelled or corrupt).
    pub discarded: Vec<String>,
    /// Job ids removed because no descriptor referenced them.
    pub orphans_removed: Vec<String>,
}

/// Coordinates the store, installer, reminder and countdown.
pub struct Orchestrator {
    store: ActionStore,
    installer: Arc<dyn ActionInstaller>,
    notifier: Arc<dyn Notifier>,
    reminders: ReminderScheduler,
    countdown: CountdownPresenter,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
    countdown_for_absolute: bool,
    op_lock: Mutex<()>,
    state: watch::Sender<SchedulingState>,
}

impl Orchestrator {
    /// Create an orchestrator with default timing and the system clock.
    #[must_use]
    pub fn new(
        store: ActionStore,
        installer: Arc<dyn ActionInstaller>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulingState::NotScheduled);
        Self {
            store,
            installer,
            reminders: ReminderScheduler::new(Arc::clone(&notifier)),
            notifier,
            countdown: CountdownPresenter::new(),
            clock: Arc::new(SystemClock),
            config: ScheduleConfig::default(),
            countdown_for_absolute: false,
            op_lock: Mutex::new(()),
            state,
        }
    }

    /// Wire the production collaborators described by `config`.
    #[must_use]
    pub fn from_config(config: &DrowseConfig) -> Self {
        let store = ActionStore::new(
            crate::drowse_dirs::schedules_dir(),
            config.job.label_prefix.clone(),
        );
        let installer = LaunchAgentInstaller::new(config.job.clone(), Arc::new(Launchctl::default()));
        Self::new(store, Arc::new(installer), Arc::new(create_notifier()))
            .with_schedule_config(config.schedule.clone())
            .with_countdown_for_absolute(config.countdown.for_absolute_time)
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the timing policy.
    #[must_use]
    pub fn with_schedule_config(mut self, config: ScheduleConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the countdown for clock-time schedules too.
    #[must_use]
    pub fn with_countdown_for_absolute(mut self, enabled: bool) -> Self {
        self.countdown_for_absolute = enabled;
        self
    }

    /// Replace the countdown presenter.
    #[must_use]
    pub fn with_countdown(mut self, countdown: CountdownPresenter) -> Self {
        self.countdown = countdown;
        self
    }

    /// Current state.
    #[must_use]
    pub fn current_state(&self) -> SchedulingState {
        self.state.borrow().clone()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SchedulingState> {
        self.state.subscribe()
    }

    /// The countdown presenter, for subscribing to remaining time.
    #[must_use]
    pub fn countdown(&self) -> &CountdownPresenter {
        &self.countdown
    }

    /// Notifications still waiting for delivery.
    pub async fn pending_notifications(&self) -> Vec<PendingNotification> {
        self.notifier.list_pending().await
    }

    /// Schedule a one-time sleep.
    ///
    /// # Errors
    ///
    /// - [`ScheduleError::AlreadyScheduled`] when a schedule is pending; no
    ///   side effects are performed.
    /// - [`ScheduleError::InvalidTime`] when `source` has no future sleep moment.
    /// - [`ScheduleError::Install`] when the job could not be installed;
    ///   nothing was persisted.
    /// - [`ScheduleError::Store`] when the descriptor could not be persisted;
    ///   the installed job is left for the next [`restore`](Self::restore).
    pub async fn schedule(&self, source: SourceSpec) -> Result<ScheduleDescriptor, ScheduleError> {
        let _op = self.op_lock.lock().await;

        let now = self.clock.now();
        self.expire_fired(now).await;
        if let Some(existing) = self.state.borrow().descriptor() {
            return Err(ScheduleError::AlreadyScheduled {
                id: existing.id.clone(),
            });
        }

        let descriptor = ScheduleDescriptor::plan(source, now, self.config.lead_time())?;

        self.installer.install(&descriptor.id, descriptor.sleep_at)?;
        if let Err(e) = self.store.persist(&descriptor) {
            error!(
                id = %descriptor.id,
                "descriptor not persisted after job install; job is orphaned until next restore: {e}"
            );
            return Err(e.into());
        }

        self.state
            .send_replace(SchedulingState::Pending(descriptor.clone()));
        info!(
            id = %descriptor.id,
            sleep_at = %descriptor.sleep_at,
            reminder_at = %descriptor.reminder_at,
            source = %descriptor.source,
            "sleep scheduled"
        );

        if self.wants_countdown(&descriptor) {
            self.countdown.start(descriptor.remaining(now));
        }

        if let Err(e) = self
            .reminders
            .schedule_reminder(descriptor.reminder_at, &reminder_message(&descriptor))
            .await
        {
            warn!(id = %descriptor.id, "sleep reminder not scheduled: {e}");
        }
        self.notify("Sleep Scheduled", &descriptor.describe()).await;

        Ok(descriptor)
    }

    /// Clear a pending schedule whose sleep moment passed more than
    /// `stale_after` ago. Returns `true` when one was cleared.
    ///
    /// The installed job fires without reporting back, so a long-running
    /// process calls this before trusting the published state.
    pub async fn expire_if_fired(&self) -> bool {
        let _op = self.op_lock.lock().await;
        let now = self.clock.now();
        self.expire_fired(now).await
    }

    /// Cancel the pending schedule. A no-op when nothing is scheduled.
    ///
    /// The published state is [`SchedulingState::NotScheduled`] afterwards
    /// even when cleanup fails.
    ///
    /// # Errors
    ///
    /// Returns [`CancelError::PartialCleanup`] when the job or descriptor
    /// could not be fully removed.
    pub async fn cancel(&self) -> Result<(), CancelError> {
        let _op = self.op_lock.lock().await;

        let Some(mut descriptor) = self.state.borrow().descriptor().cloned() else {
            debug!("cancel requested with nothing scheduled");
            return Ok(());
        };

        self.countdown.stop();

        descriptor.state = ScheduleState::Cancelled;
        if let Err(e) = self.store.persist(&descriptor) {
            warn!(id = %descriptor.id, "could not mark schedule cancelled: {e}");
        }

        let mut failures = Vec::new();
        if let Err(e) = self.installer.remove(&descriptor.id) {
            failures.push(format!("remove job: {e}"));
        }
        if let Err(e) = self.store.clear(&descriptor.id) {
            failures.push(format!("clear descriptor: {e}"));
        }

        self.state.send_replace(SchedulingState::NotScheduled);
        self.reminders.cancel_reminder().await;
        self.notify("Schedule Cancelled", "Your scheduled sleep has been cancelled")
            .await;

        if failures.is_empty() {
            info!(id = %descriptor.id, "sleep schedule cancelled");
            Ok(())
        } else {
            warn!(
                id = %descriptor.id,
                "sleep schedule cancelled with incomplete cleanup: {}",
                failures.join("; ")
            );
            Err(CancelError::PartialCleanup {
                id: descriptor.id,
                failures,
            })
        }
    }

    /// Rebuild state from persisted artifacts.
    ///
    /// Identifiers are visited in lexicographic order; the first pending,
    /// non-stale descriptor wins. Every other descriptor (superseded, stale,
    /// cancelled or corrupt) is removed together with its job, and jobs with
    /// no descriptor at all are removed as orphans. A winner whose job has
    /// disappeared is reinstalled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the store directory cannot be listed.
    pub async fn restore(&self) -> Result<RestoreReport, StoreError> {
        let _op = self.op_lock.lock().await;
        let now = self.clock.now();
        let grace = self.config.stale_after();

        let mut ids: Vec<String> = self.store.scan()?.collect();
        ids.sort();

        let installed = match self.installer.installed() {
            Ok(jobs) => Some(jobs.into_iter().collect::<HashSet<String>>()),
            Err(e) => {
                warn!("cannot list installed sleep jobs; skipping orphan cleanup: {e}");
                None
            }
        };

        let mut winner: Option<ScheduleDescriptor> = None;
        let mut discarded = Vec::new();

        for id in &ids {
            let descriptor = match self.store.load(id) {
                Ok(descriptor) => descriptor,
                Err(e @ StoreError::CorruptArtifact { .. }) => {
                    warn!(id = %id, "removing unreadable schedule: {e}");
                    self.discard(id);
                    discarded.push(id.clone());
                    continue;
                }
                Err(e) => {
                    warn!(id = %id, "leaving schedule in place, cannot read it: {e}");
                    continue;
                }
            };

            let reason = if !descriptor.is_pending() {
                "cancelled"
            } else if descriptor.is_stale(now, grace) {
                "already fired"
            } else if winner.is_some() {
                "superseded"
            } else {
                winner = Some(descriptor);
                continue;
            };
            info!(id = %id, reason, "removing leftover schedule");
            self.discard(id);
            discarded.push(id.clone());
        }

        let job_missing = match (&winner, &installed) {
            (Some(descriptor), Some(jobs)) => !jobs.contains(&descriptor.id),
            _ => false,
        };
        if job_missing && let Some(descriptor) = winner.take() {
            warn!(id = %descriptor.id, "sleep job missing; reinstalling");
            match self.installer.install(&descriptor.id, descriptor.sleep_at) {
                Ok(()) => winner = Some(descriptor),
                Err(e) => {
                    warn!(id = %descriptor.id, "reinstall failed, dropping schedule: {e}");
                    self.discard(&descriptor.id);
                    discarded.push(descriptor.id);
                }
            }
        }

        let mut orphans_removed = Vec::new();
        if let Some(jobs) = installed {
            let known: HashSet<&String> = ids.iter().collect();
            let mut orphans: Vec<String> = jobs.into_iter().filter(|id| !known.contains(id)).collect();
            orphans.sort();
            for id in orphans {
                match self.installer.remove(&id) {
                    Ok(()) => {
                        info!(id = %id, "removed orphaned sleep job");
                        orphans_removed.push(id);
                    }
                    Err(e) => warn!(id = %id, "orphaned sleep job not removed: {e}"),
                }
            }
        }

        let state = match winner {
            Some(descriptor) => {
                if self.wants_countdown(&descriptor) {
                    self.countdown.start(descriptor.remaining(now));
                }
                if descriptor.reminder_at > now {
                    if let Err(e) = self
                        .reminders
                        .schedule_reminder(descriptor.reminder_at, &reminder_message(&descriptor))
                        .await
                    {
                        warn!(id = %descriptor.id, "sleep reminder not restored: {e}");
                    }
                }
                SchedulingState::Pending(descriptor)
            }
            None => {
                self.countdown.stop();
                SchedulingState::NotScheduled
            }
        };
        self.state.send_replace(state.clone());
        info!(
            scheduled = state.is_scheduled(),
            discarded = discarded.len(),
            orphans = orphans_removed.len(),
            "schedule state restored"
        );

        Ok(RestoreReport {
            state,
            discarded,
            orphans_removed,
        })
    }

    async fn expire_fired(&self, now: DateTime<Local>) -> bool {
        let Some(fired) = self
            .state
            .borrow()
            .descriptor()
            .filter(|d| d.is_stale(now, self.config.stale_after()))
            .cloned()
        else {
            return false;
        };

        info!(id = %fired.id, sleep_at = %fired.sleep_at, "schedule already fired; clearing it");
        self.countdown.stop();
        self.discard(&fired.id);
        self.reminders.cancel_reminder().await;
        self.state.send_replace(SchedulingState::NotScheduled);
        true
    }

    fn wants_countdown(&self, descriptor: &ScheduleDescriptor) -> bool {
        descriptor.source.is_relative() || self.countdown_for_absolute
    }

    fn discard(&self, id: &str) {
        if let Err(e) = self.installer.remove(id) {
            warn!(id, "job cleanup failed: {e}");
        }
        if let Err(e) = self.store.clear(id) {
            warn!(id, "descriptor cleanup failed: {e}");
        }
    }

    async fn notify(&self, title: &str, body: &str) {
        if !self.notifier.request_permission().await {
            warn!(title, "notification permission denied; message not shown");
            return;
        }
        if let Err(e) = self.notifier.deliver_now(title, body).await {
            warn!(title, "notification not delivered: {e}");
        }
    }
}

fn reminder_message(descriptor: &ScheduleDescriptor) -> String {
    let lead = descriptor.sleep_at - descriptor.reminder_at;
    let at = descriptor.sleep_at.format("%H:%M");
    if lead.num_minutes() > 0 {
        format!("Your Mac will sleep in {} minutes (at {at})", lead.num_minutes())
    } else {
        format!("Your Mac will sleep shortly (at {at})")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::InstallError;
    use crate::notify::{Delivery, RecordingNotifier};
    use crate::schedule::clock::FixedClock;
    use crate::schedule::reminder::REMINDER_ID;
    use chrono::{DateTime, Local, TimeZone};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeInstaller {
        jobs: StdMutex<Vec<String>>,
        installs: StdMutex<Vec<(String, DateTime<Local>)>>,
        removals: StdMutex<Vec<String>>,
        fail_install: bool,
        fail_remove: bool,
    }

    impl ActionInstaller for FakeInstaller {
        fn install(&self, id: &str, sleep_at: DateTime<Local>) -> Result<(), InstallError> {
            if self.fail_install {
                return Err(InstallError::AuthorityRejected {
                    action: "register",
                    path: format!("/agents/{id}.plist").into(),
                    code: 1,
                });
            }
            self.installs.lock().unwrap().push((id.to_owned(), sleep_at));
            self.jobs.lock().unwrap().push(id.to_owned());
            Ok(())
        }

        fn remove(&self, id: &str) -> Result<(), InstallError> {
            self.removals.lock().unwrap().push(id.to_owned());
            if self.fail_remove {
                return Err(InstallError::Cleanup(vec![InstallError::AuthorityRejected {
                    action: "unregister",
                    path: format!("/agents/{id}.plist").into(),
                    code: 5,
                }]));
            }
            self.jobs.lock().unwrap().retain(|job| job != id);
            Ok(())
        }

        fn installed(&self) -> Result<Vec<String>, InstallError> {
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: ActionStore,
        installer: Arc<FakeInstaller>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
        orchestrator: Orchestrator,
    }

    fn morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 7, 15, 8, 0, 0).unwrap()
    }

    fn harness_with(installer: FakeInstaller, notifier: RecordingNotifier) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = ActionStore::new(dir.path().join("schedules"), "com.user.sleep.");
        let installer = Arc::new(installer);
        let notifier = Arc::new(notifier);
        let clock = Arc::new(FixedClock::new(morning()));
        let orchestrator = Orchestrator::new(store.clone(), installer.clone(), notifier.clone())
            .with_clock(clock.clone());
        Harness {
            _dir: dir,
            store,
            installer,
            notifier,
            clock,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeInstaller::default(), RecordingNotifier::default())
    }

    #[tokio::test]
    async fn absolute_time_scenario() {
        let h = harness();
        let d = h
            .orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap();

        assert_eq!(d.sleep_at, Local.with_ymd_and_hms(2026, 7, 15, 23, 30, 0).unwrap());
        assert_eq!(d.reminder_at, Local.with_ymd_and_hms(2026, 7, 15, 23, 25, 0).unwrap());
        assert_eq!(h.installer.installs.lock().unwrap().len(), 1);
        assert_eq!(h.store.scan().unwrap().count(), 1);

        let deliveries = h.notifier.deliveries();
        let reminders: Vec<_> = deliveries
            .iter()
            .filter(|d| matches!(d, Delivery::At(p) if p.id == REMINDER_ID))
            .collect();
        let confirmations: Vec<_> = deliveries
            .iter()
            .filter(|d| matches!(d, Delivery::Now { title, .. } if title == "Sleep Scheduled"))
            .collect();
        assert_eq!(reminders.len(), 1);
        assert_eq!(confirmations.len(), 1);
        assert!(h.orchestrator.current_state().is_scheduled());
        assert!(!h.orchestrator.countdown().snapshot().is_running());
    }

    #[tokio::test]
    async fn short_delay_clamps_reminder_and_starts_countdown() {
        let h = harness();
        let d = h
            .orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 0, minutes: 2 })
            .await
            .unwrap();

        assert_eq!((d.sleep_at - morning()).num_seconds(), 120);
        assert_eq!(d.reminder_at, morning());
        let countdown = h.orchestrator.countdown().snapshot();
        assert!(countdown.is_running());
        assert_eq!(countdown.remaining(), std::time::Duration::from_secs(120));
        h.orchestrator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn second_schedule_is_rejected_without_side_effects() {
        let h = harness();
        let first = h
            .orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap();

        for _ in 0..2 {
            let err = h
                .orchestrator
                .schedule(SourceSpec::RelativeDelay { hours: 1, minutes: 0 })
                .await
                .unwrap_err();
            assert!(matches!(err, ScheduleError::AlreadyScheduled { ref id } if *id == first.id));
        }
        assert_eq!(h.installer.installs.lock().unwrap().len(), 1);
        let ids: Vec<String> = h.store.scan().unwrap().collect();
        assert_eq!(ids, vec![first.id]);
    }

    #[tokio::test]
    async fn install_failure_persists_nothing() {
        let h = harness_with(
            FakeInstaller {
                fail_install: true,
                ..FakeInstaller::default()
            },
            RecordingNotifier::default(),
        );
        let err = h
            .orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Install(_)));
        assert_eq!(h.store.scan().unwrap().count(), 0);
        assert_eq!(h.orchestrator.current_state(), SchedulingState::NotScheduled);
        assert!(h.notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_roll_back() {
        let h = harness_with(
            FakeInstaller::default(),
            RecordingNotifier::failing(crate::error::NotifyError::DeliveryFailed("down".into())),
        );
        h.orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap();
        assert!(h.orchestrator.current_state().is_scheduled());
    }

    #[tokio::test]
    async fn cancel_clears_everything() {
        let h = harness();
        let d = h
            .orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 1, minutes: 30 })
            .await
            .unwrap();

        h.orchestrator.cancel().await.unwrap();

        assert_eq!(h.orchestrator.current_state(), SchedulingState::NotScheduled);
        assert_eq!(h.installer.removals.lock().unwrap().as_slice(), &[d.id]);
        assert_eq!(h.store.scan().unwrap().count(), 0);
        assert_eq!(h.orchestrator.countdown().remaining(), std::time::Duration::ZERO);
        assert!(h.notifier.list_pending().await.is_empty());
        assert!(matches!(
            h.notifier.deliveries().last(),
            Some(Delivery::Now { title, .. }) if title == "Schedule Cancelled"
        ));
    }

    #[tokio::test]
    async fn cancel_with_failing_authority_still_resets_state() {
        let h = harness_with(
            FakeInstaller {
                fail_remove: true,
                ..FakeInstaller::default()
            },
            RecordingNotifier::default(),
        );
        h.orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap();

        let err = h.orchestrator.cancel().await.unwrap_err();
        assert!(matches!(err, CancelError::PartialCleanup { ref failures, .. } if failures.len() == 1));
        assert_eq!(h.orchestrator.current_state(), SchedulingState::NotScheduled);
        assert_eq!(h.store.scan().unwrap().count(), 0);
    }

    #[tokio::test]
    async fn cancel_without_schedule_is_noop() {
        let h = harness();
        h.orchestrator.cancel().await.unwrap();
        assert!(h.installer.removals.lock().unwrap().is_empty());
        assert!(h.notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let h = harness();
        let mut rx = h.orchestrator.subscribe();
        h.orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_scheduled());

        h.orchestrator.cancel().await.unwrap();
        assert!(!rx.borrow_and_update().is_scheduled());
    }

    #[tokio::test]
    async fn restore_picks_smallest_id_and_cleans_the_rest() {
        let h = harness();
        let mut a = ScheduleDescriptor::plan(
            SourceSpec::AbsoluteTime { hour: 23, minute: 30 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        a.id = "aaa".to_owned();
        let mut b = a.clone();
        b.id = "bbb".to_owned();
        for d in [&a, &b] {
            h.store.persist(d).unwrap();
            h.installer.jobs.lock().unwrap().push(d.id.clone());
        }
        std::fs::write(h.store.artifact_path("000"), "garbage").unwrap();
        h.installer.jobs.lock().unwrap().push("zzz-orphan".to_owned());

        let report = h.orchestrator.restore().await.unwrap();

        assert_eq!(report.state, SchedulingState::Pending(a.clone()));
        assert_eq!(report.discarded, vec!["000".to_owned(), "bbb".to_owned()]);
        assert_eq!(report.orphans_removed, vec!["zzz-orphan".to_owned()]);
        let ids: Vec<String> = h.store.scan().unwrap().collect();
        assert_eq!(ids, vec!["aaa".to_owned()]);
        assert_eq!(h.installer.installed().unwrap(), vec!["aaa".to_owned()]);
    }

    #[tokio::test]
    async fn restore_drops_stale_and_cancelled_descriptors() {
        let h = harness();
        let stale = ScheduleDescriptor::plan(
            SourceSpec::RelativeDelay { hours: 0, minutes: 30 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        let mut cancelled = stale.clone();
        cancelled.id = format!("{}-c", stale.id);
        cancelled.state = ScheduleState::Cancelled;
        h.store.persist(&stale).unwrap();
        h.store.persist(&cancelled).unwrap();
        h.clock.advance(chrono::Duration::hours(2));

        let report = h.orchestrator.restore().await.unwrap();
        assert_eq!(report.state, SchedulingState::NotScheduled);
        assert_eq!(report.discarded.len(), 2);
        assert_eq!(h.store.scan().unwrap().count(), 0);
    }

    #[tokio::test]
    async fn restore_reinstalls_missing_job_and_resumes_countdown() {
        let h = harness();
        let d = ScheduleDescriptor::plan(
            SourceSpec::RelativeDelay { hours: 1, minutes: 0 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        h.store.persist(&d).unwrap();
        h.clock.advance(chrono::Duration::minutes(15));

        let report = h.orchestrator.restore().await.unwrap();
        assert!(report.state.is_scheduled());
        assert_eq!(h.installer.installs.lock().unwrap().len(), 1);
        assert_eq!(
            h.orchestrator.countdown().remaining(),
            std::time::Duration::from_secs(45 * 60)
        );
        h.orchestrator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn restore_rearms_future_reminder() {
        let h = harness();
        let d = ScheduleDescriptor::plan(
            SourceSpec::AbsoluteTime { hour: 23, minute: 30 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        h.store.persist(&d).unwrap();
        h.installer.jobs.lock().unwrap().push(d.id.clone());

        let report = h.orchestrator.restore().await.unwrap();
        assert!(report.state.is_scheduled());
        let pending = h.notifier.list_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, REMINDER_ID);
        assert_eq!(pending[0].at, d.reminder_at);
    }

    #[tokio::test]
    async fn restore_skips_reminder_already_due() {
        let h = harness();
        let d = ScheduleDescriptor::plan(
            SourceSpec::AbsoluteTime { hour: 23, minute: 30 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        h.store.persist(&d).unwrap();
        h.installer.jobs.lock().unwrap().push(d.id.clone());
        h.clock
            .set(Local.with_ymd_and_hms(2026, 7, 15, 23, 27, 0).unwrap());

        let report = h.orchestrator.restore().await.unwrap();
        assert!(report.state.is_scheduled());
        assert!(h.notifier.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn persist_failure_leaves_orphan_for_restore() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("schedules");
        std::fs::write(&blocked, "not a directory").unwrap();
        let installer = Arc::new(FakeInstaller::default());
        let orchestrator = Orchestrator::new(
            ActionStore::new(&blocked, "com.user.sleep."),
            installer.clone(),
            Arc::new(RecordingNotifier::default()),
        )
        .with_clock(Arc::new(FixedClock::new(morning())));

        let err = orchestrator
            .schedule(SourceSpec::AbsoluteTime { hour: 23, minute: 30 })
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Store(StoreError::Io { .. })));
        assert_eq!(orchestrator.current_state(), SchedulingState::NotScheduled);
        let orphaned = installer.installed().unwrap();
        assert_eq!(orphaned.len(), 1);

        std::fs::remove_file(&blocked).unwrap();
        let report = orchestrator.restore().await.unwrap();
        assert_eq!(report.state, SchedulingState::NotScheduled);
        assert_eq!(report.orphans_removed, orphaned);
        assert!(installer.installed().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fired_schedule_no_longer_blocks_a_new_one() {
        let h = harness();
        let first = h
            .orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 0, minutes: 30 })
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::hours(1));

        let second = h
            .orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 0, minutes: 30 })
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(h.installer.removals.lock().unwrap().as_slice(), &[first.id]);
        let ids: Vec<String> = h.store.scan().unwrap().collect();
        assert_eq!(ids, vec![second.id.clone()]);
        assert_eq!(
            h.orchestrator.current_state(),
            SchedulingState::Pending(second)
        );
        h.orchestrator.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn expire_if_fired_respects_grace() {
        let h = harness();
        h.orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 0, minutes: 30 })
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::minutes(35));
        assert!(!h.orchestrator.expire_if_fired().await);
        assert!(h.orchestrator.current_state().is_scheduled());

        h.clock.advance(chrono::Duration::minutes(10));
        assert!(h.orchestrator.expire_if_fired().await);
        assert_eq!(h.orchestrator.current_state(), SchedulingState::NotScheduled);
        assert_eq!(h.store.scan().unwrap().count(), 0);
        assert!(h.notifier.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn day_long_delay_is_rejected_before_install() {
        let h = harness();
        let err = h
            .orchestrator
            .schedule(SourceSpec::RelativeDelay { hours: 24, minutes: 30 })
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTime(_)));
        assert!(h.installer.installs.lock().unwrap().is_empty());
        assert_eq!(h.store.scan().unwrap().count(), 0);
    }

    #[test]
    fn reminder_message_mentions_lead_minutes() {
        let d = ScheduleDescriptor::plan(
            SourceSpec::AbsoluteTime { hour: 23, minute: 30 },
            morning(),
            std::time::Duration::from_secs(300),
        )
        .unwrap();
        assert_eq!(reminder_message(&d), "Your Mac will sleep in 5 minutes (at 23:30)");
    }
}
