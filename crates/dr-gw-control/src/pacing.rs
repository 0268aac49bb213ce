//! ---
//! gw_section: "04-control-loop"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control loop, ramp limiting, and configuration calculation."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};

/// Async cycle pacer ensuring deterministic control loop intervals. Missed
/// ticks are delayed rather than bursted so a slow cycle never causes a
/// rapid-fire catch-up of device writes.
#[derive(Debug)]
pub struct CycleTimer {
    interval: tokio::time::Interval,
}

impl CycleTimer {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }
}

/// Tracks inter-cycle timing for the loop's diagnostic logging.
#[derive(Debug)]
pub struct CycleTimingReporter {
    target_interval: Duration,
    last_tick: Mutex<Option<Instant>>,
    worst_jitter_us: Mutex<i64>,
}

impl CycleTimingReporter {
    pub fn new(target_interval: Duration) -> Self {
        Self {
            target_interval,
            last_tick: Mutex::new(None),
            worst_jitter_us: Mutex::new(0),
        }
    }

    /// Record a tick and return the jitter against the target interval in
    /// microseconds, or `None` for the first tick.
    pub fn record_tick(&self, now: Instant) -> Option<i64> {
        let mut last_tick = self.last_tick.lock();
        let jitter = last_tick.map(|previous| {
            let actual = now.duration_since(previous);
            dr_gw_common::time::jitter_us(actual, self.target_interval)
        });
        *last_tick = Some(now);
        if let Some(jitter) = jitter {
            let mut worst = self.worst_jitter_us.lock();
            if jitter.abs() > worst.abs() {
                *worst = jitter;
            }
        }
        jitter
    }

    /// Largest deviation from the target interval observed so far.
    pub fn worst_jitter_us(&self) -> i64 {
        *self.worst_jitter_us.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_delays_missed_ticks_instead_of_bursting() {
        let mut timer = CycleTimer::new(Duration::from_secs(5));
        let first = timer.tick().await;

        // Simulate a cycle overrunning by more than one period.
        tokio::time::advance(Duration::from_secs(12)).await;
        let second = timer.tick().await;
        let third = timer.tick().await;

        assert!(second.duration_since(first) >= Duration::from_secs(5));
        // Delay behavior reschedules from the late tick, no burst.
        assert!(third.duration_since(second) >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn reporter_measures_jitter_from_successive_ticks() {
        let reporter = CycleTimingReporter::new(Duration::from_secs(5));
        let start = Instant::now();
        assert_eq!(reporter.record_tick(start), None);

        tokio::time::advance(Duration::from_millis(5_250)).await;
        let jitter = reporter.record_tick(Instant::now()).unwrap();
        assert_eq!(jitter, 250_000);
    }
}
