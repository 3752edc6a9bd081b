use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source for the sampler.
///
/// `now` is wall-clock seconds since the UNIX epoch and only stamps
/// `captured_at`. `monotonic` never goes backwards and gates the sampling
/// interval, so a stepped system clock cannot stall capture.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
    fn monotonic(&self) -> f64;
}

/// Wall clock plus a monotonic origin taken at construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Default)]
struct ManualTime {
    wall: f64,
    monotonic: f64,
}

/// Manually advanced clock for deterministic sampling and window tests.
///
/// `advance` moves both readings; `set` steps only the wall clock.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    time: Arc<Mutex<ManualTime>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            time: Arc::new(Mutex::new(ManualTime {
                wall: start,
                monotonic: 0.0,
            })),
        }
    }

    pub fn set(&self, value: f64) {
        if let Ok(mut time) = self.time.lock() {
            time.wall = value;
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut time) = self.time.lock() {
            time.wall += seconds;
            time.monotonic += seconds.max(0.0);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.time.lock().map(|time| time.wall).unwrap_or(0.0)
    }

    fn monotonic(&self) -> f64 {
        self.time.lock().map(|time| time.monotonic).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_wall_clock_leaves_monotonic_alone() {
        let clock = ManualClock::new(500.0);
        clock.advance(2.0);
        clock.set(100.0);
        assert_eq!(clock.now(), 100.0);
        assert_eq!(clock.monotonic(), 2.0);
    }

    #[test]
    fn system_monotonic_never_decreases() {
        let clock = SystemClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
        assert!(clock.now() > 0.0);
    }
}
