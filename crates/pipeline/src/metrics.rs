use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::outcome::EntityStatus;

pub struct Metrics {
    // Entity outcomes
    entities_processed: AtomicUsize,
    entities_succeeded: AtomicUsize,
    entities_empty: AtomicUsize,
    entities_failed: AtomicUsize,

    // Provider calls, counted once per adapter call (retries included)
    searches: AtomicUsize,
    search_failures: AtomicUsize,
    extractions: AtomicUsize,
    extraction_failures: AtomicUsize,
    extractions_skipped: AtomicUsize,

    // Timing (in microseconds)
    total_search_time_us: AtomicU64,
    total_extract_time_us: AtomicU64,
    total_entity_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entities_processed: AtomicUsize::new(0),
            entities_succeeded: AtomicUsize::new(0),
            entities_empty: AtomicUsize::new(0),
            entities_failed: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            search_failures: AtomicUsize::new(0),
            extractions: AtomicUsize::new(0),
            extraction_failures: AtomicUsize::new(0),
            extractions_skipped: AtomicUsize::new(0),
            total_search_time_us: AtomicU64::new(0),
            total_extract_time_us: AtomicU64::new(0),
            total_entity_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_search(&self, duration: Duration, success: bool) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.total_search_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if !success {
            self.search_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extraction(&self, duration: Duration, success: bool) {
        self.extractions.fetch_add(1, Ordering::Relaxed);
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if !success {
            self.extraction_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Search came back empty so the model was never asked.
    pub fn record_skipped_extraction(&self) {
        self.extractions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entity(&self, duration: Duration, status: EntityStatus) {
        self.entities_processed.fetch_add(1, Ordering::Relaxed);
        self.total_entity_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        let counter = match status {
            EntityStatus::Success => &self.entities_succeeded,
            EntityStatus::Empty => &self.entities_empty,
            EntityStatus::Error => &self.entities_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entities_processed: self.entities_processed.load(Ordering::Relaxed),
            entities_succeeded: self.entities_succeeded.load(Ordering::Relaxed),
            entities_empty: self.entities_empty.load(Ordering::Relaxed),
            entities_failed: self.entities_failed.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            search_failures: self.search_failures.load(Ordering::Relaxed),
            extractions: self.extractions.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            extractions_skipped: self.extractions_skipped.load(Ordering::Relaxed),
            avg_search_time_ms: self.avg_time_ms(&self.total_search_time_us, &self.searches),
            avg_extract_time_ms: self.avg_time_ms(&self.total_extract_time_us, &self.extractions),
            avg_entity_time_ms: self.avg_time_ms(&self.total_entity_time_us, &self.entities_processed),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub entities_processed: usize,
    pub entities_succeeded: usize,
    pub entities_empty: usize,
    pub entities_failed: usize,
    pub searches: usize,
    pub search_failures: usize,
    pub extractions: usize,
    pub extraction_failures: usize,
    pub extractions_skipped: usize,
    pub avg_search_time_ms: f64,
    pub avg_extract_time_ms: f64,
    pub avg_entity_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
