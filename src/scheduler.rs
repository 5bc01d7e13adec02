//! Update/cache/retry state machine
//!
//! Every trigger runs one update cycle: read the cache, decide whether the
//! cached price is fresh enough, otherwise fetch, persist on success, and always
//! finish with exactly one badge render. A transient network failure schedules
//! a single delayed retry; the retry itself is never retried.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::badge::{render_badge, BadgeSink, BadgeValue};
use crate::cache::{CacheEntry, PriceCache};
use crate::price::{FetchError, PriceSource};

/// Age beyond which a cached price is fetched again
pub const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Delay before the single retry after a transient failure
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Period of the scheduled update alarm
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Events that start an update cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// User asked for a refresh; always fetches
    ManualRefresh,
    /// Periodic alarm; fetches only when the cache is stale or missing
    ScheduledTick,
    /// One-shot timer after a transient failure; always fetches
    RetryTimerFired,
}

impl Trigger {
    /// Whether this trigger bypasses the staleness check
    pub fn forces_fetch(self) -> bool {
        matches!(self, Trigger::ManualRefresh | Trigger::RetryTimerFired)
    }
}

/// Conceptual scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Deciding,
    Fetching,
    /// At least one scheduled retry has not fired yet
    RetryWaiting,
}

/// Why a cycle goes to the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// The trigger forces a fetch
    Forced,
    /// Nothing usable is cached
    NoCache,
    /// The cached price is older than the staleness threshold
    Stale { age_ms: i64 },
}

/// Result of the `Deciding` step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    ServeCached(CacheEntry),
    Fetch(FetchReason),
}

/// How an update cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The fresh cached price was shown without a network call
    ServedCached(f64),
    /// A new price was fetched and shown
    Fetched(f64),
    /// A transient failure; the error badge is shown and a retry is scheduled
    RetryScheduled(FetchError),
    /// A failure with no retry; the error badge is shown
    Failed(FetchError),
}

impl CycleOutcome {
    /// The value the badge was rendered from
    pub fn badge_value(&self) -> BadgeValue {
        match self {
            CycleOutcome::ServedCached(price) | CycleOutcome::Fetched(price) => {
                BadgeValue::Price(*price)
            }
            CycleOutcome::RetryScheduled(_) | CycleOutcome::Failed(_) => BadgeValue::Error,
        }
    }

    /// Whether the cycle issued a network request
    pub fn fetched(&self) -> bool {
        !matches!(self, CycleOutcome::ServedCached(_))
    }
}

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// One-shot delayed delivery of `Trigger::RetryTimerFired`
///
/// Once scheduled a retry always fires; there is no cancellation.
pub trait RetryTimer: Send + Sync {
    fn schedule(&self, delay: Duration);
}

/// Timing parameters for the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Cached prices older than this are fetched again
    pub stale_after: Duration,
    /// Delay before retrying a transient failure
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stale_after: STALE_AFTER,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// Pure `Deciding` step
///
/// Fetches when the trigger forces it, when nothing is cached, or when the
/// entry is strictly older than `stale_after`. Otherwise serves the cache.
pub fn decide(
    trigger: Trigger,
    entry: Option<CacheEntry>,
    now_ms: i64,
    stale_after: Duration,
) -> Decision {
    if trigger.forces_fetch() {
        return Decision::Fetch(FetchReason::Forced);
    }

    let Some(entry) = entry else {
        return Decision::Fetch(FetchReason::NoCache);
    };

    let age_ms = entry.age_ms(now_ms);
    let threshold_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
    if age_ms > threshold_ms {
        Decision::Fetch(FetchReason::Stale { age_ms })
    } else {
        Decision::ServeCached(entry)
    }
}

/// Drives update cycles against injected ports
///
/// `handle` takes `&mut self`, so at most one cycle (and one fetch) is in
/// flight per scheduler.
pub struct UpdateScheduler {
    source: Arc<dyn PriceSource>,
    cache: PriceCache,
    badge: Arc<dyn BadgeSink>,
    timer: Arc<dyn RetryTimer>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    state: SchedulerState,
    pending_retries: usize,
}

impl UpdateScheduler {
    pub fn new(
        source: Arc<dyn PriceSource>,
        cache: PriceCache,
        badge: Arc<dyn BadgeSink>,
        timer: Arc<dyn RetryTimer>,
    ) -> Self {
        Self {
            source,
            cache,
            badge,
            timer,
            clock: Arc::new(SystemClock),
            config: SchedulerConfig::default(),
            state: SchedulerState::Idle,
            pending_retries: 0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Current state; between cycles this is `Idle` or `RetryWaiting`
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// The wall clock used for cache ages
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Runs one full update cycle for `trigger`
    pub async fn handle(&mut self, trigger: Trigger) -> CycleOutcome {
        if trigger == Trigger::RetryTimerFired {
            self.pending_retries = self.pending_retries.saturating_sub(1);
            info!("retry timer fired");
        }
        self.transition(SchedulerState::Deciding);

        let entry = match self.cache.read() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as empty");
                None
            }
        };

        let now_ms = self.clock.now_ms();
        let outcome = match decide(trigger, entry, now_ms, self.config.stale_after) {
            Decision::ServeCached(entry) => {
                debug!(
                    price = entry.price,
                    age_ms = entry.age_ms(now_ms),
                    "serving cached price"
                );
                CycleOutcome::ServedCached(entry.price)
            }
            Decision::Fetch(reason) => {
                debug!(?trigger, ?reason, "fetching new price");
                self.fetch(trigger).await
            }
        };

        render_badge(self.badge.as_ref(), outcome.badge_value());

        let settled = if self.pending_retries > 0 {
            SchedulerState::RetryWaiting
        } else {
            SchedulerState::Idle
        };
        self.transition(settled);
        outcome
    }

    async fn fetch(&mut self, trigger: Trigger) -> CycleOutcome {
        self.transition(SchedulerState::Fetching);

        match self.source.fetch_price().await {
            Ok(price) => {
                let completed_at = self.clock.now_ms();
                if let Err(e) = self.cache.write(price, completed_at) {
                    warn!(error = %e, "failed to persist price, continuing with render");
                }
                info!(price, "price updated");
                CycleOutcome::Fetched(price)
            }
            Err(e) if e.is_transient() && trigger != Trigger::RetryTimerFired => {
                warn!(
                    error = %e,
                    delay_secs = self.config.retry_delay.as_secs(),
                    "transient fetch failure, scheduling retry"
                );
                self.timer.schedule(self.config.retry_delay);
                self.pending_retries += 1;
                CycleOutcome::RetryScheduled(e)
            }
            Err(e) => {
                warn!(error = %e, ?trigger, "fetch failed, not retrying");
                CycleOutcome::Failed(e)
            }
        }
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "scheduler transition");
            self.state = next;
        }
    }
}
