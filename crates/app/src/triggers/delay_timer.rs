//! Extendable one-shot timer.
//!
//! Each [`DelayTimer::add_time`] call queues one more period. A single
//! background task sleeps through the queued periods in order and, once
//! the queue is empty, notifies `("timer_status", false)`.
//!
//! While that completion notification is being delivered the timer refuses
//! to be canceled, so a rule that reacts to it by adding time again does
//! not lose that time. The drain loop re-checks the queue under the lock
//! `add_time` takes before it lets go of the running flag.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rulehub_domain::duration::parse_duration_std;
use rulehub_domain::error::ParseDurationError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Trigger, TriggerCore};

enum Step {
    Sleep(Duration),
    Drained,
    Canceled,
}

#[derive(Debug, Default)]
struct DelayState {
    queue: VecDeque<Duration>,
    running: bool,
    suppress_cancel: bool,
    token: CancellationToken,
}

/// Fires once after the sum of every period added to it.
#[derive(Debug)]
pub struct DelayTimer {
    core: TriggerCore,
    period_text: String,
    period: Duration,
    state: Mutex<DelayState>,
}

impl DelayTimer {
    /// Build a timer adding `period` (e.g. `"5m"`) per [`add_time`](Self::add_time).
    ///
    /// # Errors
    ///
    /// Returns [`ParseDurationError`] if `period` is not a non-negative
    /// duration.
    pub fn new(name: impl Into<String>, period: &str) -> Result<Self, ParseDurationError> {
        Ok(Self {
            core: TriggerCore::new(name),
            period_text: period.to_string(),
            period: parse_duration_std(period)?,
            state: Mutex::default(),
        })
    }

    /// The configured period, as written.
    #[must_use]
    pub fn period(&self) -> &str {
        &self.period_text
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    #[must_use]
    pub fn is_not_running(&self) -> bool {
        !self.is_running()
    }

    /// Queue one more period, starting the timer if it is idle.
    pub fn add_time(self: &Arc<Self>) {
        let mut state = self.state();
        state.queue.push_back(self.period);
        tracing::debug!(
            trigger = %self.core.name(),
            period = %self.period_text,
            queued = state.queue.len(),
            "time added"
        );
        if !state.running {
            state.running = true;
            state.token = CancellationToken::new();
            let token = state.token.clone();
            drop(state);
            tokio::spawn(Arc::clone(self).run(token));
        }
    }

    fn state(&self) -> MutexGuard<'_, DelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next period. Draining the queue opens the completion window.
    fn next_step(&self, token: &CancellationToken) -> Step {
        let mut state = self.state();
        if token.is_cancelled() {
            return Step::Canceled;
        }
        match state.queue.pop_front() {
            Some(period) => Step::Sleep(period),
            None => {
                state.suppress_cancel = true;
                Step::Drained
            }
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            loop {
                let period = match self.next_step(&token) {
                    Step::Sleep(period) => period,
                    Step::Drained => break,
                    Step::Canceled => {
                        tracing::info!(trigger = %self.core.name(), "timer canceled");
                        return;
                    }
                };
                tokio::select! {
                    () = token.cancelled() => {
                        tracing::info!(trigger = %self.core.name(), "timer canceled");
                        return;
                    }
                    () = tokio::time::sleep(period) => {}
                }
            }

            self.core.notify(Some("timer_status"), &Value::Bool(false));

            let mut state = self.state();
            state.suppress_cancel = false;
            if state.queue.is_empty() {
                state.running = false;
                tracing::info!(trigger = %self.core.name(), "timer done");
                return;
            }
            tracing::debug!(trigger = %self.core.name(), "time added on completion, continuing");
        }
    }
}

impl Trigger for DelayTimer {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    /// Stop the timer and drop the queued time.
    ///
    /// Rejected while the completion notification is being delivered, and
    /// a no-op when the timer is idle. The timer can be restarted with
    /// [`add_time`](DelayTimer::add_time) afterwards.
    fn cancel(&self) {
        let mut state = self.state();
        if state.running && !state.suppress_cancel {
            tracing::info!(trigger = %self.core.name(), "cancel request");
            state.queue.clear();
            state.running = false;
            state.token.cancel();
        } else {
            tracing::info!(trigger = %self.core.name(), "cancel request rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::dispatch::tests::{Recorder, Seen};
    use crate::dispatch::{Notification, Subscriber};

    // ── Helpers ────────────────────────────────────────────────────

    fn timer(period: &str) -> (Arc<DelayTimer>, Arc<Mutex<Vec<Seen>>>) {
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let timer = Arc::new(DelayTimer::new("pantry timer", period).unwrap());
        timer.register_rule(Recorder::new("rule", &log));
        (timer, log)
    }

    /// Adds time once when notified, then tries to cancel.
    struct Extender {
        timer: Weak<DelayTimer>,
        extended: AtomicBool,
    }

    impl Subscriber for Extender {
        fn notify(&self, _: &Notification<'_>) {
            let Some(timer) = self.timer.upgrade() else {
                return;
            };
            if !self.extended.swap(true, Ordering::SeqCst) {
                timer.add_time();
                timer.cancel();
            }
        }
    }

    // ── Tests ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_complete_once_after_the_sum_of_added_time() {
        let (timer, log) = timer("10s");
        let start = tokio::time::Instant::now();

        timer.add_time();
        timer.add_time();
        timer.add_time();
        assert!(timer.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name.as_deref(), Some("timer_status"));
        assert_eq!(seen[0].value, Value::Bool(false));
        assert_eq!(seen[0].at - start, Duration::from_secs(30));
        assert!(timer.is_not_running());
    }

    #[tokio::test(start_paused = true)]
    async fn should_extend_a_running_timer() {
        let (timer, log) = timer("10s");
        let start = tokio::time::Instant::now();

        timer.add_time();
        tokio::time::sleep(Duration::from_secs(7)).await;
        timer.add_time();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].at - start, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_fire_when_canceled() {
        let (timer, log) = timer("10s");

        timer.add_time();
        tokio::time::sleep(Duration::from_secs(5)).await;
        timer.cancel();
        assert!(timer.is_not_running());
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_restart_after_cancel() {
        let (timer, log) = timer("10s");
        let start = tokio::time::Instant::now();

        timer.add_time();
        tokio::time::sleep(Duration::from_secs(5)).await;
        timer.cancel();
        timer.add_time();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let seen = log.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].at - start, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_time_added_during_completion() {
        let (timer, log) = timer("10s");
        timer.register_rule(Arc::new(Extender {
            timer: Arc::downgrade(&timer),
            extended: AtomicBool::new(false),
        }));
        let start = tokio::time::Instant::now();

        timer.add_time();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let seen = log.lock().unwrap();
        let offsets: Vec<_> = seen.iter().map(|s| (s.at - start).as_secs()).collect();
        assert_eq!(offsets, vec![10, 20]);
        assert!(timer.is_not_running());
    }

    #[test]
    fn should_expose_configured_period() {
        let timer = DelayTimer::new("t", "5m").unwrap();
        assert_eq!(timer.period(), "5m");
        assert!(timer.is_not_running());
    }
}
