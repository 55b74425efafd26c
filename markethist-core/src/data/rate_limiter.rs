//! Request pacing shared by every worker.
//!
//! The limiter hands out evenly spaced permission slots. Each `acquire()`
//! reserves the next free slot and sleeps until it arrives, so no two callers
//! are ever released closer together than one interval, no matter how many
//! threads share the limiter.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Floor on the interval between permits, regardless of configured rate.
pub const MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Global requests-per-minute ceiling.
#[derive(Debug)]
pub struct RateLimiter {
    next_slot: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RateLimiter {
    /// Limiter that permits at most `requests_per_minute` calls per minute.
    ///
    /// A rate of zero is treated as one request per minute.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self::with_interval(Duration::from_secs(60) / rpm)
    }

    /// Limiter with an explicit spacing between permits (clamped to [`MIN_INTERVAL`]).
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            next_slot: Mutex::new(None),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Spacing enforced between consecutive permits.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the caller may issue its next request.
    ///
    /// Returns the instant at which the permit was granted.
    pub fn acquire(&self) -> Instant {
        let slot = self.reserve(Instant::now());
        let now = Instant::now();
        if slot > now {
            std::thread::sleep(slot - now);
        }
        slot
    }

    /// Reserve the next slot at or after `now` and advance the schedule.
    fn reserve(&self, now: Instant) -> Instant {
        // A poisoned lock only means another worker panicked mid-reserve;
        // the stored instant is still a valid schedule.
        let mut next = self
            .next_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match *next {
            Some(scheduled) if scheduled > now => scheduled,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }
}
