//! Per-stage throughput counters and rate tracking.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Number of recent intervals a `RateMonitor` keeps.
pub const RATE_WINDOW: usize = 30;

/// Interval statistics in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct IntervalStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Tracks the spacing between recent ticks.
#[derive(Debug)]
pub struct RateMonitor {
    intervals: VecDeque<f64>,
    window: usize,
    last_tick: Option<Instant>,
}

impl Default for RateMonitor {
    fn default() -> Self {
        Self::new(RATE_WINDOW)
    }
}

impl RateMonitor {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            intervals: VecDeque::with_capacity(window),
            window,
            last_tick: None,
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Record a tick at an explicit instant.
    pub fn tick_at(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if self.intervals.len() == self.window {
                self.intervals.pop_front();
            }
            self.intervals.push_back(elapsed);
        }
        self.last_tick = Some(now);
    }

    /// Ticks per second over the retained intervals; 0 until two ticks were seen.
    pub fn fps(&self) -> f64 {
        let total: f64 = self.intervals.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.intervals.len() as f64 / total
    }

    pub fn stats(&self) -> IntervalStats {
        if self.intervals.is_empty() {
            return IntervalStats::default();
        }
        let mut min = f64::MAX;
        let mut max = 0.0f64;
        let mut sum = 0.0;
        for interval in &self.intervals {
            min = min.min(*interval);
            max = max.max(*interval);
            sum += interval;
        }
        IntervalStats {
            avg_ms: sum / self.intervals.len() as f64 * 1000.0,
            min_ms: min * 1000.0,
            max_ms: max * 1000.0,
        }
    }
}

/// Lock-free counters a stage thread updates and the handle reads.
#[derive(Debug, Default)]
pub struct StageCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    /// Fixed-point ticks-per-second times 1000, refreshed by the owning stage.
    fps_milli: AtomicU64,
}

impl StageCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_rate(&self, monitor: &RateMonitor) {
        let milli = (monitor.fps() * 1000.0).round().max(0.0) as u64;
        self.fps_milli.store(milli, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        self.fps_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// Snapshot of one stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StageStats {
    pub processed: u64,
    pub failed: u64,
    /// Items this stage tried to hand downstream but dropped on a full channel.
    pub dropped: u64,
    pub fps: f64,
}

impl StageStats {
    pub fn capture(counters: &StageCounters, dropped: u64) -> Self {
        Self {
            processed: counters.processed(),
            failed: counters.failed(),
            dropped,
            fps: counters.fps(),
        }
    }
}

/// Snapshot of the whole pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub camera: StageStats,
    pub detector: StageStats,
    pub context: StageStats,
    pub answer: StageStats,
    /// Questions dropped because the query channel was full.
    pub queries_dropped: u64,
}
