//! ---
//! gw_section: "04-control-loop"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control loop, ramp limiting, and configuration calculation."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use tracing::debug;

/// Changes smaller than this fraction of full scale are suppressed rather
/// than written as no-op updates.
pub const DEFAULT_MIN_RESOLUTION: f64 = 1e-4;

/// How fast a paced quantity may move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampPolicy {
    /// Cap the change to `percent_per_second` of full scale times the
    /// wall-clock seconds elapsed since the previous call.
    RateLimited { percent_per_second: f64 },
    /// Jump to the target immediately.
    Unlimited,
    /// Reach the target by an absolute deadline. The effective rate is
    /// recomputed on every call, so it adapts if the target moves mid-ramp.
    TimeBounded { deadline: Instant },
}

impl RampPolicy {
    /// Map the configured default rate: zero means unlimited.
    pub fn from_rate_percent(percent_per_second: f64) -> Self {
        if percent_per_second <= 0.0 {
            RampPolicy::Unlimited
        } else {
            RampPolicy::RateLimited { percent_per_second }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RampMemory {
    last_value: f64,
    last_at: Instant,
}

/// Software ramp-rate limiter for one scalar quantity.
///
/// The control loop is not fixed-period, so pacing uses the wall-clock time
/// elapsed between calls rather than assuming a tick length. [`Self::pace`]
/// computes the next value without committing anything; the caller commits
/// via [`Self::commit`] only after the device write is confirmed, so a failed
/// write retries from the correct baseline instead of compounding an
/// unconfirmed jump.
#[derive(Debug)]
pub struct RampLimiter {
    default_policy: RampPolicy,
    policy: RampPolicy,
    full_scale: f64,
    min_resolution: f64,
    memory: Option<RampMemory>,
}

impl RampLimiter {
    pub fn new(default_policy: RampPolicy, full_scale: f64) -> Self {
        Self {
            default_policy,
            policy: default_policy,
            full_scale,
            min_resolution: DEFAULT_MIN_RESOLUTION,
            memory: None,
        }
    }

    pub fn policy(&self) -> RampPolicy {
        self.policy
    }

    /// Apply an arbitrated rate in place of the configured default, or
    /// revert to the default when no authority carries one. A running
    /// time-bounded ramp keeps its deadline.
    pub fn set_rate_override(&mut self, percent_per_second: Option<f64>) {
        if matches!(self.policy, RampPolicy::TimeBounded { .. }) {
            return;
        }
        let next = match percent_per_second {
            Some(rate) => RampPolicy::from_rate_percent(rate),
            None => self.default_policy,
        };
        if next != self.policy {
            debug!(?next, "ramp rate override changed");
            self.policy = next;
        }
    }

    /// Switch to a time-bounded ramp ending `window` from `now`, unless one
    /// is already running. An event's ramp-time request re-arrives on every
    /// cycle it is active; only the first sighting sets the deadline.
    pub fn ensure_time_bounded(&mut self, window: Duration, now: Instant) {
        if !matches!(self.policy, RampPolicy::TimeBounded { .. }) {
            let deadline = now + window;
            debug!(window_secs = window.as_secs_f64(), "starting time-bounded ramp");
            self.policy = RampPolicy::TimeBounded { deadline };
        }
    }

    /// Compute the value to emit this cycle, given the last applied value and
    /// the desired target.
    ///
    /// Returns `None` when the permitted change is below the minimum
    /// resolution; the caller skips the write and retries next cycle. The
    /// first call after construction or a reset only records the baseline
    /// and emits no movement.
    pub fn pace(&mut self, current: f64, target: f64, now: Instant) -> Option<f64> {
        if current == target {
            return Some(target);
        }

        let Some(memory) = self.memory else {
            self.memory = Some(RampMemory {
                last_value: current,
                last_at: now,
            });
            return None;
        };

        let elapsed = now.saturating_duration_since(memory.last_at);
        let proposed = match self.policy {
            RampPolicy::Unlimited => target,
            RampPolicy::RateLimited { percent_per_second } => {
                let max_delta =
                    percent_per_second / 100.0 * elapsed.as_secs_f64() * self.full_scale;
                step_towards(current, target, max_delta)
            }
            RampPolicy::TimeBounded { deadline } => {
                if now >= deadline {
                    target
                } else {
                    let remaining = deadline.saturating_duration_since(now).as_secs_f64();
                    let rate = (target - current) / remaining;
                    step_towards(current, target, (rate * elapsed.as_secs_f64()).abs())
                }
            }
        };

        if proposed != target && (proposed - current).abs() < self.min_resolution * self.full_scale
        {
            return None;
        }
        Some(proposed)
    }

    /// Record a confirmed write. Reaching the target clears the pacing
    /// memory; a time-bounded policy whose deadline has passed or whose
    /// target was reached reverts to the configured default.
    pub fn commit(&mut self, emitted: f64, target: f64, now: Instant) {
        let settled = emitted == target;
        if settled {
            self.memory = None;
        } else {
            self.memory = Some(RampMemory {
                last_value: emitted,
                last_at: now,
            });
        }
        if let RampPolicy::TimeBounded { deadline } = self.policy {
            if settled || now >= deadline {
                self.policy = self.default_policy;
            }
        }
    }

    /// Drop pacing memory and revert to the default policy, e.g. after the
    /// device left the operate-at-ratio state.
    pub fn reset(&mut self) {
        self.memory = None;
        self.policy = self.default_policy;
    }
}

fn step_towards(current: f64, target: f64, max_delta: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primed(policy: RampPolicy, baseline: f64, at: Instant) -> RampLimiter {
        let mut limiter = RampLimiter::new(policy, 1.0);
        limiter.commit(baseline, baseline + 1.0, at);
        limiter
    }

    #[test]
    fn rate_limited_step_matches_elapsed_time() {
        let start = Instant::now();
        let mut limiter = primed(
            RampPolicy::RateLimited {
                percent_per_second: 1.0,
            },
            0.5,
            start,
        );
        let next = limiter
            .pace(0.5, 1.0, start + Duration::from_secs(10))
            .unwrap();
        assert!((next - 0.6).abs() < 1e-9);
    }

    #[test]
    fn rate_override_replaces_the_default_until_withdrawn() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.5, start);

        limiter.set_rate_override(Some(1.0));
        let next = limiter
            .pace(0.5, 1.0, start + Duration::from_secs(10))
            .unwrap();
        assert!((next - 0.6).abs() < 1e-9);

        limiter.set_rate_override(None);
        assert_eq!(limiter.policy(), RampPolicy::Unlimited);
    }

    #[test]
    fn rate_override_defers_to_a_running_time_bounded_ramp() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.0, start);
        limiter.ensure_time_bounded(Duration::from_secs(90), start);

        limiter.set_rate_override(Some(2.0));
        assert!(matches!(limiter.policy(), RampPolicy::TimeBounded { .. }));
    }

    #[test]
    fn rate_limited_does_not_overshoot() {
        let start = Instant::now();
        let mut limiter = primed(
            RampPolicy::RateLimited {
                percent_per_second: 10.0,
            },
            0.9,
            start,
        );
        let next = limiter
            .pace(0.9, 1.0, start + Duration::from_secs(60))
            .unwrap();
        assert_eq!(next, 1.0);
    }

    #[test]
    fn unlimited_jumps_immediately() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.0, start);
        let next = limiter
            .pace(0.0, 0.73, start + Duration::from_secs(1))
            .unwrap();
        assert_eq!(next, 0.73);
    }

    #[test]
    fn current_equals_target_returns_target_and_commit_resets() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.4, start);
        assert_eq!(limiter.pace(0.4, 0.4, start), Some(0.4));
        limiter.commit(0.4, 0.4, start);
        // First pace after the reset only records a new baseline.
        assert_eq!(limiter.pace(0.4, 0.9, start + Duration::from_secs(1)), None);
    }

    #[test]
    fn first_call_records_baseline_without_moving() {
        let mut limiter = RampLimiter::new(
            RampPolicy::RateLimited {
                percent_per_second: 5.0,
            },
            1.0,
        );
        assert_eq!(limiter.pace(0.0, 1.0, Instant::now()), None);
    }

    #[test]
    fn time_bounded_adapts_to_remaining_window() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.0, start);
        limiter.ensure_time_bounded(Duration::from_secs(100), start);

        // 10 seconds elapsed against 90 remaining at evaluation time.
        let next = limiter
            .pace(0.0, 1.0, start + Duration::from_secs(10))
            .unwrap();
        assert!((next - 1.0 / 9.0).abs() < 1e-6, "next was {next}");
    }

    #[test]
    fn time_bounded_reverts_to_default_after_deadline() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.0, start);
        limiter.ensure_time_bounded(Duration::from_secs(5), start);

        let after = start + Duration::from_secs(6);
        assert_eq!(limiter.pace(0.2, 0.8, after), Some(0.8));
        limiter.commit(0.8, 0.8, after);
        assert_eq!(limiter.policy(), RampPolicy::Unlimited);
    }

    #[test]
    fn running_time_bounded_ramp_keeps_its_deadline() {
        let start = Instant::now();
        let mut limiter = primed(RampPolicy::Unlimited, 0.0, start);
        limiter.ensure_time_bounded(Duration::from_secs(100), start);
        let first = limiter.policy();
        limiter.ensure_time_bounded(Duration::from_secs(100), start + Duration::from_secs(50));
        assert_eq!(limiter.policy(), first);
    }

    #[test]
    fn sub_threshold_change_is_suppressed() {
        let start = Instant::now();
        let mut limiter = primed(
            RampPolicy::RateLimited {
                percent_per_second: 1.0,
            },
            0.5,
            start,
        );
        // 1 ms at 1%/s permits a 1e-5 step, below the 1e-4 resolution.
        assert_eq!(
            limiter.pace(0.5, 1.0, start + Duration::from_millis(1)),
            None
        );
    }
}
