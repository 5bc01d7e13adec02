//! Integration tests for the update cycle
//!
//! Drives `UpdateScheduler` and the background loop through fake ports: a
//! scripted price source, a recording badge sink, a recording retry timer and
//! a settable clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use pricebadge::badge::{BadgeColor, BadgeSink};
use pricebadge::cache::{CacheEntry, Mapping, MemoryStore, PriceCache, StorageError, Store};
use pricebadge::price::{FetchError, PriceSource};
use pricebadge::refresh::{
    self, RefreshConfig, RefreshHandle, TokioRetryTimer, WatchBadgeSink,
};
use pricebadge::scheduler::{
    Clock, CycleOutcome, RetryTimer, SchedulerConfig, SchedulerState, Trigger, UpdateScheduler,
};

const MINUTE_MS: i64 = 60 * 1000;

/// Price source that replays a fixed script and counts requests
struct ScriptedSource {
    responses: Mutex<VecDeque<Result<f64, FetchError>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(responses: Vec<Result<f64, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_price(&self) -> Result<f64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Status(599)))
    }
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<(String, BadgeColor)>>,
}

impl RecordingSink {
    fn last(&self) -> Option<(String, BadgeColor)> {
        self.calls.lock().unwrap().last().cloned()
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BadgeSink for RecordingSink {
    fn set_badge(&self, text: &str, color: BadgeColor) {
        self.calls.lock().unwrap().push((text.to_string(), color));
    }
}

#[derive(Default)]
struct RecordingTimer {
    scheduled: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    fn scheduled(&self) -> Vec<Duration> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl RetryTimer for RecordingTimer {
    fn schedule(&self, delay: Duration) {
        self.scheduled.lock().unwrap().push(delay);
    }
}

struct ManualClock(AtomicI64);

impl ManualClock {
    fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Store whose every operation fails
struct UnavailableStore;

impl Store for UnavailableStore {
    fn get(&self, _keys: &[&str]) -> Result<Mapping, StorageError> {
        Err(StorageError::Unavailable("disk gone".to_string()))
    }

    fn set(&self, _values: Mapping) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk gone".to_string()))
    }
}

struct Fixture {
    scheduler: UpdateScheduler,
    source: Arc<ScriptedSource>,
    sink: Arc<RecordingSink>,
    timer: Arc<RecordingTimer>,
    clock: Arc<ManualClock>,
    cache: PriceCache,
}

fn fixture_with_store(
    responses: Vec<Result<f64, FetchError>>,
    now_ms: i64,
    store: Arc<dyn Store>,
) -> Fixture {
    let source = ScriptedSource::new(responses);
    let sink = Arc::new(RecordingSink::default());
    let timer = Arc::new(RecordingTimer::default());
    let clock = Arc::new(ManualClock(AtomicI64::new(now_ms)));
    let cache = PriceCache::new(store);
    let scheduler = UpdateScheduler::new(source.clone(), cache.clone(), sink.clone(), timer.clone())
        .with_clock(clock.clone());
    Fixture {
        scheduler,
        source,
        sink,
        timer,
        clock,
        cache,
    }
}

fn fixture(responses: Vec<Result<f64, FetchError>>, now_ms: i64) -> Fixture {
    fixture_with_store(responses, now_ms, Arc::new(MemoryStore::new()))
}

fn network_error() -> FetchError {
    FetchError::Network("dns lookup failed".to_string())
}

#[tokio::test]
async fn test_fresh_cache_skips_network_for_scheduled_tick() {
    let now = 1_000 * MINUTE_MS;

    for age_mins in [0, 1, 15, 29, 30] {
        let mut f = fixture(vec![Ok(999.0)], now);
        f.cache.write(4.3, now - age_mins * MINUTE_MS).unwrap();

        let outcome = f.scheduler.handle(Trigger::ScheduledTick).await;

        assert_eq!(outcome, CycleOutcome::ServedCached(4.3), "age {} min", age_mins);
        assert_eq!(f.source.calls(), 0, "age {} min", age_mins);
        assert_eq!(f.sink.last(), Some(("4.30".to_string(), BadgeColor::NEUTRAL)));
    }
}

#[tokio::test]
async fn test_stale_cache_fetches_on_scheduled_tick() {
    let now = 1_000 * MINUTE_MS;
    let mut f = fixture(vec![Ok(250.0)], now);
    f.cache.write(4.3, now - 31 * MINUTE_MS).unwrap();

    let outcome = f.scheduler.handle(Trigger::ScheduledTick).await;

    assert_eq!(outcome, CycleOutcome::Fetched(250.0));
    assert_eq!(f.source.calls(), 1);
    assert_eq!(f.sink.last(), Some(("250".to_string(), BadgeColor::NEUTRAL)));
}

#[tokio::test]
async fn test_manual_refresh_always_fetches() {
    let now = 1_000 * MINUTE_MS;
    let mut f = fixture(vec![Ok(23.456)], now);
    f.cache.write(4.3, now).unwrap();

    let outcome = f.scheduler.handle(Trigger::ManualRefresh).await;

    assert_eq!(outcome, CycleOutcome::Fetched(23.456));
    assert_eq!(f.source.calls(), 1);
    assert_eq!(f.sink.last(), Some(("23.5".to_string(), BadgeColor::NEUTRAL)));
}

#[tokio::test]
async fn test_successful_fetch_writes_matching_pair() {
    let source = ScriptedSource::new(vec![Ok(187.32)]);
    let sink = Arc::new(RecordingSink::default());
    let cache = PriceCache::new(Arc::new(MemoryStore::new()));
    let mut scheduler = UpdateScheduler::new(
        source,
        cache.clone(),
        sink,
        Arc::new(RecordingTimer::default()),
    );

    let before = Utc::now().timestamp_millis();
    scheduler.handle(Trigger::ManualRefresh).await;
    let after = Utc::now().timestamp_millis();

    let entry = cache.read().unwrap().expect("entry should be written");
    assert!((entry.price - 187.32).abs() < f64::EPSILON);
    assert!(entry.last_update >= before && entry.last_update <= after);
}

#[tokio::test]
async fn test_transient_failure_preserves_cached_price() {
    let t = 1_000 * MINUTE_MS;
    let mut f = fixture(vec![Err(network_error())], t);
    f.cache.write(150.0, t).unwrap();

    f.clock.set(t + 5 * MINUTE_MS);
    let outcome = f.scheduler.handle(Trigger::ManualRefresh).await;

    assert!(matches!(outcome, CycleOutcome::RetryScheduled(_)));
    assert_eq!(
        f.cache.read().unwrap(),
        Some(CacheEntry { price: 150.0, last_update: t })
    );
    assert_eq!(f.sink.last(), Some(("Err".to_string(), BadgeColor::ERROR)));
}

#[tokio::test]
async fn test_two_transient_failures_make_exactly_two_calls() {
    let mut f = fixture(vec![Err(network_error()), Err(network_error())], 0);

    let first = f.scheduler.handle(Trigger::ScheduledTick).await;
    assert!(matches!(first, CycleOutcome::RetryScheduled(_)));
    assert_eq!(f.timer.scheduled(), vec![Duration::from_secs(30)]);
    assert_eq!(f.scheduler.state(), SchedulerState::RetryWaiting);

    let second = f.scheduler.handle(Trigger::RetryTimerFired).await;
    assert!(matches!(second, CycleOutcome::Failed(FetchError::Network(_))));

    assert_eq!(f.source.calls(), 2);
    assert_eq!(f.timer.scheduled().len(), 1, "the retry is never retried");
    assert_eq!(f.scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_retry_ignores_fresh_cache() {
    let now = 1_000 * MINUTE_MS;
    let mut f = fixture(vec![Err(network_error()), Ok(160.0)], now);
    f.cache.write(150.0, now).unwrap();

    f.scheduler.handle(Trigger::ManualRefresh).await;
    let outcome = f.scheduler.handle(Trigger::RetryTimerFired).await;

    assert_eq!(outcome, CycleOutcome::Fetched(160.0));
    assert_eq!(f.source.calls(), 2);
}

#[tokio::test]
async fn test_application_errors_are_not_retried() {
    for error in [
        FetchError::Status(429),
        FetchError::Status(500),
        FetchError::Malformed("missing field monero.usd".to_string()),
    ] {
        let mut f = fixture(vec![Err(error.clone())], 0);

        let outcome = f.scheduler.handle(Trigger::ScheduledTick).await;

        assert_eq!(outcome, CycleOutcome::Failed(error));
        assert!(f.timer.scheduled().is_empty());
        assert_eq!(f.sink.last(), Some(("Err".to_string(), BadgeColor::ERROR)));
    }
}

#[tokio::test]
async fn test_every_cycle_renders_exactly_once() {
    let now = 1_000 * MINUTE_MS;
    let mut f = fixture(vec![Ok(10.0), Err(network_error()), Err(FetchError::Status(503))], now);

    f.scheduler.handle(Trigger::ScheduledTick).await;
    f.scheduler.handle(Trigger::ScheduledTick).await; // served from cache
    f.scheduler.handle(Trigger::ManualRefresh).await;
    f.scheduler.handle(Trigger::ManualRefresh).await;

    assert_eq!(f.sink.count(), 4);
}

#[tokio::test]
async fn test_unavailable_storage_still_fetches_and_renders() {
    let mut f = fixture_with_store(vec![Ok(187.32)], 0, Arc::new(UnavailableStore));

    let outcome = f.scheduler.handle(Trigger::ScheduledTick).await;

    assert_eq!(outcome, CycleOutcome::Fetched(187.32));
    assert_eq!(f.source.calls(), 1, "read failure is treated as no cache");
    assert_eq!(f.sink.last(), Some(("187".to_string(), BadgeColor::NEUTRAL)));
}

#[tokio::test]
async fn test_end_to_end_empty_cache_scheduled_tick() {
    let now = 1_760_000_000_000;
    let mut f = fixture(vec![Ok(187.32)], now);

    let outcome = f.scheduler.handle(Trigger::ScheduledTick).await;

    assert_eq!(outcome, CycleOutcome::Fetched(187.32));
    assert_eq!(
        f.cache.read().unwrap(),
        Some(CacheEntry { price: 187.32, last_update: now })
    );
    assert_eq!(f.sink.last(), Some(("187".to_string(), BadgeColor::NEUTRAL)));
}

async fn wait_for_badge(
    rx: &mut tokio::sync::watch::Receiver<pricebadge::badge::Badge>,
    text: &str,
) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if rx.borrow_and_update().text == text {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "badge never became {:?}", text);
    assert_eq!(rx.borrow().text, text);
}

#[tokio::test]
async fn test_loop_runs_startup_tick_and_manual_refresh() {
    let source = ScriptedSource::new(vec![Ok(187.32), Ok(23.456)]);
    let (tx, rx) = refresh::trigger_channel();
    let (sink, mut badge_rx) = WatchBadgeSink::new();
    let scheduler = UpdateScheduler::new(
        source.clone(),
        PriceCache::new(Arc::new(MemoryStore::new())),
        Arc::new(sink),
        Arc::new(TokioRetryTimer::new(tx.clone())),
    );

    let handle = RefreshHandle::spawn(scheduler, (tx, rx), RefreshConfig::default());
    wait_for_badge(&mut badge_rx, "187").await;

    assert!(handle.request_refresh());
    wait_for_badge(&mut badge_rx, "23.5").await;

    handle.shutdown().await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_loop_retries_transient_failure_once() {
    let source = ScriptedSource::new(vec![Err(network_error()), Ok(150.0)]);
    let (tx, rx) = refresh::trigger_channel();
    let (sink, mut badge_rx) = WatchBadgeSink::new();
    let scheduler = UpdateScheduler::new(
        source.clone(),
        PriceCache::new(Arc::new(MemoryStore::new())),
        Arc::new(sink),
        Arc::new(TokioRetryTimer::new(tx.clone())),
    )
    .with_config(SchedulerConfig {
        retry_delay: Duration::from_millis(20),
        ..SchedulerConfig::default()
    });

    let handle = RefreshHandle::spawn(scheduler, (tx, rx), RefreshConfig::default());
    wait_for_badge(&mut badge_rx, "150").await;

    handle.shutdown().await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_loop_catches_up_on_wall_clock_after_suspend() {
    let start_ms = Utc::now().timestamp_millis();
    let source = ScriptedSource::new(vec![Ok(187.32), Ok(23.456)]);
    let clock = Arc::new(ManualClock(AtomicI64::new(start_ms)));
    let (tx, rx) = refresh::trigger_channel();
    let (sink, mut badge_rx) = WatchBadgeSink::new();
    let scheduler = UpdateScheduler::new(
        source.clone(),
        PriceCache::new(Arc::new(MemoryStore::new())),
        Arc::new(sink),
        Arc::new(TokioRetryTimer::new(tx.clone())),
    )
    .with_clock(clock.clone());
    let config = RefreshConfig {
        interval: Duration::from_secs(3600),
        wake_check: Duration::from_millis(20),
        ..RefreshConfig::default()
    };

    let handle = RefreshHandle::spawn(scheduler, (tx, rx), config);
    wait_for_badge(&mut badge_rx, "187").await;

    // The monotonic alarm is an hour away, but two hours passed on the wall
    clock.set(start_ms + 120 * MINUTE_MS);
    wait_for_badge(&mut badge_rx, "23.5").await;

    handle.shutdown().await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_run_once_follows_a_scheduled_retry() {
    let source = ScriptedSource::new(vec![Err(network_error()), Ok(4.3)]);
    let (tx, mut rx) = refresh::trigger_channel();
    let mut scheduler = UpdateScheduler::new(
        source.clone(),
        PriceCache::new(Arc::new(MemoryStore::new())),
        Arc::new(RecordingSink::default()),
        Arc::new(TokioRetryTimer::new(tx)),
    )
    .with_config(SchedulerConfig {
        retry_delay: Duration::from_millis(10),
        ..SchedulerConfig::default()
    });

    let outcome = refresh::run_once(&mut scheduler, &mut rx, Trigger::ScheduledTick).await;

    assert_eq!(outcome, CycleOutcome::Fetched(4.3));
    assert_eq!(source.calls(), 2);
}
