use crate::dispatcher::Dispatcher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopHealth {
    pub uptime_seconds: u64,
    pub ticks_completed: u64,
    pub tick_failures: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tick: Option<OffsetDateTime>,
    pub observers: usize,
    pub events_published: u64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    ticks: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    last_tick: Arc<Mutex<Option<OffsetDateTime>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: Arc::new(AtomicU64::new(0)),
            failures: Arc::new(AtomicU64::new(0)),
            last_tick: Arc::new(Mutex::new(None)),
        }
    }

    pub fn record_tick(&self, at: OffsetDateTime) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick.lock() = Some(at);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn tick_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, dispatcher: &Dispatcher) -> LoopHealth {
        LoopHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            ticks_completed: self.ticks_completed(),
            tick_failures: self.tick_failures(),
            last_tick: *self.last_tick.lock(),
            observers: dispatcher.observer_count(),
            events_published: dispatcher.published_count(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
