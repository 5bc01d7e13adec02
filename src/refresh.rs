//! Background update loop
//!
//! A single tokio task owns the `UpdateScheduler` and processes triggers one at
//! a time: the periodic alarm, manual refresh requests, and one-shot retry
//! timers all feed the same queue, so a cycle always completes before the next
//! one starts.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::badge::{Badge, BadgeColor, BadgeSink, ERROR_TEXT};
use crate::scheduler::{CycleOutcome, RetryTimer, Trigger, UpdateScheduler, UPDATE_INTERVAL};

/// Sending half of the trigger queue
pub type TriggerSender = mpsc::UnboundedSender<Trigger>;

/// Receiving half of the trigger queue
pub type TriggerReceiver = mpsc::UnboundedReceiver<Trigger>;

/// Creates the queue shared by the loop, the retry timer, and manual refreshes
pub fn trigger_channel() -> (TriggerSender, TriggerReceiver) {
    mpsc::unbounded_channel()
}

/// How often the loop compares wall-clock time against the alarm
pub const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the periodic alarm
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between scheduled ticks
    pub interval: Duration,
    /// Whether the periodic alarm (including the startup tick) runs
    pub enabled: bool,
    /// Period of the wall-clock check that catches up on ticks missed while
    /// the host was suspended
    pub wake_check: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: UPDATE_INTERVAL, // 30 minutes
            enabled: true,
            wake_check: WAKE_CHECK_INTERVAL,
        }
    }
}

/// Whether a full alarm interval of wall-clock time has passed since the last
/// scheduled tick
///
/// tokio timers run on the monotonic clock, which stops while the host is
/// suspended.
pub fn alarm_overdue(last_tick_ms: Option<i64>, now_ms: i64, interval: Duration) -> bool {
    let Some(last_tick_ms) = last_tick_ms else {
        return false;
    };
    let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(last_tick_ms) >= interval_ms
}

/// Retry timer that sleeps on the tokio runtime and then enqueues
/// `Trigger::RetryTimerFired`
#[derive(Debug, Clone)]
pub struct TokioRetryTimer {
    tx: TriggerSender,
}

impl TokioRetryTimer {
    pub fn new(tx: TriggerSender) -> Self {
        Self { tx }
    }
}

impl RetryTimer for TokioRetryTimer {
    fn schedule(&self, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The loop may already be gone on shutdown
            let _ = tx.send(Trigger::RetryTimerFired);
        });
    }
}

/// Badge sink that publishes the latest badge on a watch channel
#[derive(Debug)]
pub struct WatchBadgeSink {
    tx: watch::Sender<Badge>,
}

impl WatchBadgeSink {
    /// Creates the sink and a receiver; the initial value is a blank badge
    pub fn new() -> (Self, watch::Receiver<Badge>) {
        let (tx, rx) = watch::channel(Badge {
            text: String::new(),
            is_error: false,
        });
        (Self { tx }, rx)
    }
}

impl BadgeSink for WatchBadgeSink {
    fn set_badge(&self, text: &str, color: BadgeColor) {
        let badge = Badge {
            text: text.to_string(),
            is_error: color == BadgeColor::ERROR || text == ERROR_TEXT,
        };
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(badge);
    }
}

/// Handle for controlling the background update loop
pub struct RefreshHandle {
    /// Queue used for manual refresh requests
    trigger_tx: TriggerSender,
    /// Signals the loop to stop after the in-flight cycle
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Spawns the update loop
    ///
    /// # Arguments
    /// * `scheduler` - The state machine; its retry timer should feed `triggers`
    /// * `triggers` - Both halves of the queue from `trigger_channel`
    /// * `config` - Alarm configuration
    pub fn spawn(
        mut scheduler: UpdateScheduler,
        triggers: (TriggerSender, TriggerReceiver),
        config: RefreshConfig,
    ) -> Self {
        let (trigger_tx, mut trigger_rx) = triggers;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let clock = scheduler.clock();

        let task = tokio::spawn(async move {
            let mut alarm = tokio::time::interval(config.interval);
            alarm.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut wake = tokio::time::interval_at(
                Instant::now() + config.wake_check,
                config.wake_check,
            );
            wake.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_tick_ms: Option<i64> = None;
            info!(
                interval_secs = config.interval.as_secs(),
                enabled = config.enabled,
                "update loop started"
            );

            loop {
                // The alarm's first tick is immediate and doubles as the startup update
                let trigger = tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    Some(trigger) = trigger_rx.recv() => trigger,
                    _ = alarm.tick(), if config.enabled => {
                        last_tick_ms = Some(clock.now_ms());
                        Trigger::ScheduledTick
                    }
                    _ = wake.tick(), if config.enabled => {
                        let now_ms = clock.now_ms();
                        if !alarm_overdue(last_tick_ms, now_ms, config.interval) {
                            continue;
                        }
                        info!("alarm overdue by wall clock, running scheduled tick");
                        alarm.reset();
                        last_tick_ms = Some(now_ms);
                        Trigger::ScheduledTick
                    }
                };

                debug!(?trigger, "trigger received");
                scheduler.handle(trigger).await;
            }

            info!("update loop stopped");
        });

        Self {
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    /// Requests an immediate forced refresh
    ///
    /// Returns `false` if the loop is no longer running.
    pub fn request_refresh(&self) -> bool {
        self.trigger_tx.send(Trigger::ManualRefresh).is_ok()
    }

    /// Stops the loop once any in-flight cycle has completed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Runs one update cycle for `trigger` and, if it scheduled a retry, waits for
/// the retry and runs that too
///
/// `retries` must be the receiving half of the queue the scheduler's retry
/// timer sends to.
pub async fn run_once(
    scheduler: &mut UpdateScheduler,
    retries: &mut TriggerReceiver,
    trigger: Trigger,
) -> CycleOutcome {
    let outcome = scheduler.handle(trigger).await;
    if !matches!(outcome, CycleOutcome::RetryScheduled(_)) {
        return outcome;
    }

    match retries.recv().await {
        Some(next) => scheduler.handle(next).await,
        None => outcome,
    }
}
