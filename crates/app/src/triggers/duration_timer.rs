//! On/off cycling timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rulehub_domain::duration::parse_duration_std;
use rulehub_domain::error::ParseDurationError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Trigger, TriggerCore};

#[derive(Debug, Default)]
struct CycleState {
    running: bool,
    output: bool,
    token: CancellationToken,
}

/// Runs `max_repeats` cycles of `on_period` followed by `off_period`.
///
/// Notifies `("output_state", true)` at the start of every on period,
/// `("output_state", false)` at its end, and `("timer_status", false)`
/// once the last cycle ends or the timer is canceled. No off period follows
/// the last cycle.
#[derive(Debug)]
pub struct DurationTimer {
    core: TriggerCore,
    on_period: Duration,
    off_period: Duration,
    max_repeats: u32,
    state: Mutex<CycleState>,
}

impl DurationTimer {
    /// Single cycle of `on_period` with no off period.
    ///
    /// # Errors
    ///
    /// Returns [`ParseDurationError`] if `on_period` is not a non-negative
    /// duration.
    pub fn new(name: impl Into<String>, on_period: &str) -> Result<Self, ParseDurationError> {
        Ok(Self {
            core: TriggerCore::new(name),
            on_period: parse_duration_std(on_period)?,
            off_period: Duration::ZERO,
            max_repeats: 1,
            state: Mutex::default(),
        })
    }

    /// Repeat `max_repeats` times, pausing `off_period` between cycles.
    ///
    /// # Errors
    ///
    /// Returns [`ParseDurationError`] if `off_period` is not a non-negative
    /// duration.
    pub fn with_repeats(
        mut self,
        off_period: &str,
        max_repeats: u32,
    ) -> Result<Self, ParseDurationError> {
        self.off_period = parse_duration_std(off_period)?;
        self.max_repeats = max_repeats.max(1);
        Ok(self)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().running
    }

    #[must_use]
    pub fn is_not_running(&self) -> bool {
        !self.is_running()
    }

    /// Last notified output.
    #[must_use]
    pub fn output_state(&self) -> bool {
        self.state().output
    }

    /// Start cycling. Ignored while already running.
    pub fn start(self: &Arc<Self>) {
        let mut state = self.state();
        if state.running {
            tracing::info!(trigger = %self.core.name(), "already running, start ignored");
            return;
        }
        state.running = true;
        state.token = CancellationToken::new();
        let token = state.token.clone();
        drop(state);

        tracing::info!(trigger = %self.core.name(), "timer started");
        tokio::spawn(Arc::clone(self).run(token));
    }

    fn state(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_output(&self, output: bool) {
        self.state().output = output;
        tracing::info!(trigger = %self.core.name(), output, "output_state");
        self.core.notify(Some("output_state"), &Value::Bool(output));
    }

    async fn cycles(&self) {
        let mut repeat = 1;
        loop {
            self.set_output(true);
            tokio::time::sleep(self.on_period).await;
            self.set_output(false);
            if repeat >= self.max_repeats {
                break;
            }
            repeat += 1;
            tokio::time::sleep(self.off_period).await;
        }
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        let completed = tokio::select! {
            () = token.cancelled() => false,
            () = self.cycles() => true,
        };
        if completed {
            self.state().running = false;
            tracing::info!(trigger = %self.core.name(), "timer done");
        } else {
            tracing::info!(trigger = %self.core.name(), "timer canceled");
        }
        self.core.notify(Some("timer_status"), &Value::Bool(false));
    }
}

impl Trigger for DurationTimer {
    fn core(&self) -> &TriggerCore {
        &self.core
    }

    /// Stop cycling. The timer can be started again afterwards.
    fn cancel(&self) {
        let mut state = self.state();
        if state.running {
            tracing::info!(trigger = %self.core.name(), "cancel request");
            state.running = false;
            state.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::tests::{Recorder, Seen};

    // ── Helpers ────────────────────────────────────────────────────

    fn recorded(
        log: &Mutex<Vec<Seen>>,
        start: tokio::time::Instant,
    ) -> Vec<(String, Value, u64)> {
        log.lock()
            .unwrap()
            .iter()
            .map(|s| {
                (
                    s.name.clone().unwrap_or_default(),
                    s.value.clone(),
                    (s.at - start).as_secs(),
                )
            })
            .collect()
    }

    fn entry(name: &str, value: bool, at: u64) -> (String, Value, u64) {
        (name.to_string(), Value::Bool(value), at)
    }

    // ── Tests ──────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_cycle_on_and_off_then_report_completion() {
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let timer = Arc::new(
            DurationTimer::new("sprinkler", "5s")
                .unwrap()
                .with_repeats("3s", 2)
                .unwrap(),
        );
        timer.register_rule(Recorder::new("rule", &log));
        let start = tokio::time::Instant::now();

        timer.start();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(
            recorded(&log, start),
            vec![
                entry("output_state", true, 0),
                entry("output_state", false, 5),
                entry("output_state", true, 8),
                entry("output_state", false, 13),
                entry("timer_status", false, 13),
            ]
        );
        assert!(timer.is_not_running());
        assert!(!timer.output_state());
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_start_while_running() {
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let timer = Arc::new(DurationTimer::new("fan", "10s").unwrap());
        timer.register_rule(Recorder::new("rule", &log));

        timer.start();
        tokio::time::sleep(Duration::from_secs(2)).await;
        timer.start();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let ons = log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.value == Value::Bool(true))
            .count();
        assert_eq!(ons, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_completion_when_canceled() {
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let timer = Arc::new(DurationTimer::new("fan", "10s").unwrap());
        timer.register_rule(Recorder::new("rule", &log));
        let start = tokio::time::Instant::now();

        timer.start();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(timer.output_state());
        timer.cancel();
        assert!(timer.is_not_running());
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(
            recorded(&log, start),
            vec![
                entry("output_state", true, 0),
                entry("timer_status", false, 4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_restart_after_completion() {
        let log: Arc<Mutex<Vec<Seen>>> = Arc::default();
        let timer = Arc::new(DurationTimer::new("fan", "1s").unwrap());
        timer.register_rule(Recorder::new("rule", &log));

        timer.start();
        tokio::time::sleep(Duration::from_secs(5)).await;
        timer.start();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(log.lock().unwrap().len(), 6);
    }
}
