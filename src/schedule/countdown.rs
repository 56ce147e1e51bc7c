//! Live countdown to the sleep moment.
//!
//! Purely a view: nothing here touches the installed job or the store. The
//! published [`Countdown`] value is the state machine itself; the background
//! loop only calls [`Countdown::tick`] once per interval.

use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

/// Countdown phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountdownPhase {
    /// Not counting.
    #[default]
    Idle,
    /// Decrementing once per tick.
    Running,
}

/// Remaining time plus phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Countdown {
    remaining: Duration,
    phase: CountdownPhase,
}

impl Countdown {
    /// Begin counting down from `total`. A zero total stays idle.
    pub fn start(&mut self, total: Duration) {
        self.remaining = total;
        self.phase = if total.is_zero() {
            CountdownPhase::Idle
        } else {
            CountdownPhase::Running
        };
    }

    /// Advance one second. Returns `true` when the value changed.
    pub fn tick(&mut self) -> bool {
        if self.phase != CountdownPhase::Running {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(TICK);
        if self.remaining.is_zero() {
            self.phase = CountdownPhase::Idle;
        }
        true
    }

    /// Stop and reset to zero.
    pub fn stop(&mut self) {
        self.remaining = Duration::ZERO;
        self.phase = CountdownPhase::Idle;
    }

    /// Time left.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    /// `true` while ticking.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase == CountdownPhase::Running
    }
}

/// Render `remaining` as `HH:MM` for a status line.
#[must_use]
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

/// Drives a [`Countdown`] on the tokio runtime and publishes every change.
pub struct CountdownPresenter {
    state: watch::Sender<Countdown>,
    current: Mutex<Option<CancellationToken>>,
    tick_interval: Duration,
}

impl Default for CountdownPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownPresenter {
    /// Create an idle presenter ticking once per second.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(Countdown::default());
        Self {
            state,
            current: Mutex::new(None),
            tick_interval: TICK,
        }
    }

    /// Override the wall-clock length of one tick (useful for testing).
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Observe the countdown.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Countdown> {
        self.state.subscribe()
    }

    /// Latest published value.
    #[must_use]
    pub fn snapshot(&self) -> Countdown {
        *self.state.borrow()
    }

    /// Time left.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.snapshot().remaining()
    }

    /// Restart the countdown from `total`, replacing any running loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, total: Duration) {
        let token = CancellationToken::new();
        if let Some(previous) = self.swap_token(Some(token.clone())) {
            previous.cancel();
        }
        self.state.send_modify(|countdown| countdown.start(total));
        if total.is_zero() {
            return;
        }

        debug!(total_secs = total.as_secs(), "countdown started");
        let state = self.state.clone();
        let interval = self.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let mut finished = false;
                        state.send_if_modified(|countdown| {
                            if token.is_cancelled() {
                                return false;
                            }
                            let changed = countdown.tick();
                            finished = !countdown.is_running();
                            changed
                        });
                        if finished {
                            debug!("countdown finished");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Cancel the loop and reset to zero.
    pub fn stop(&self) {
        if let Some(token) = self.swap_token(None) {
            token.cancel();
        }
        self.state.send_modify(Countdown::stop);
    }

    fn swap_token(&self, next: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}

impl Drop for CountdownPresenter {
    fn drop(&mut self) {
        if let Some(token) = self.swap_token(None) {
            token.cancel();
        }
    }
}
