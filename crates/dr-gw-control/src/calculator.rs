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

use dr_gw_limits::ActiveLimit;
use serde::{Deserialize, Serialize};

use crate::ramp::RampLimiter;

/// Averaged site power measurement. `site_watts` is positive when importing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub solar_watts: f64,
    pub site_watts: f64,
}

/// Final device directive for one control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InverterConfiguration {
    /// Open the AC connection entirely.
    Disconnect,
    /// Stop producing but stay connected.
    Deenergize,
    /// Operate at a bounded output.
    Limit {
        device_count: u32,
        target_watts: f64,
        target_ratio: f64,
    },
}

/// Why no configuration was produced this cycle. These are expected
/// conditions, not errors: the caller skips the write and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No fresh measurement samples; writing would derive from stale data.
    MissingSamples,
    /// The permitted ramp step is below the minimum output resolution.
    SubThresholdChange,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingSamples => write!(f, "missing-samples"),
            SkipReason::SubThresholdChange => write!(f, "sub-threshold-change"),
        }
    }
}

/// Outcome of one calculator pass.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleDecision {
    Skip(SkipReason),
    Apply {
        config: InverterConfiguration,
        /// The ratio actually emitted, committed to the ramp limiter once
        /// the write is confirmed.
        ratio_emitted: f64,
        /// The unramped ratio the limiter is working towards.
        ratio_target: f64,
    },
}

/// Converts the arbitrated limit plus live measurements into a device
/// configuration, applying the software ramp and the per-cycle
/// rate-of-change guard.
#[derive(Debug, Clone)]
pub struct ConfigurationCalculator {
    device_count: u32,
    nameplate_max_watts: f64,
}

impl ConfigurationCalculator {
    pub fn new(device_count: u32, nameplate_max_watts: f64) -> Self {
        Self {
            device_count,
            nameplate_max_watts,
        }
    }

    /// Site full scale: per-device nameplate across the fleet. Also the
    /// denominator converting absolute watts to a 0-1 power ratio.
    pub fn full_scale_watts(&self) -> f64 {
        self.nameplate_max_watts * f64::from(self.device_count)
    }

    pub fn calculate(
        &self,
        active: &ActiveLimit,
        reading: Option<PowerReading>,
        previous: Option<&InverterConfiguration>,
        ramp: &mut RampLimiter,
        now: Instant,
    ) -> CycleDecision {
        let energize = active.energize.map(|a| a.value).unwrap_or(true);
        let connect = active.connect.map(|a| a.value).unwrap_or(true);

        // Safety states bypass measurements and ramping entirely.
        if !energize {
            return CycleDecision::Apply {
                config: InverterConfiguration::Deenergize,
                ratio_emitted: 0.0,
                ratio_target: 0.0,
            };
        }
        if !connect {
            return CycleDecision::Apply {
                config: InverterConfiguration::Disconnect,
                ratio_emitted: 0.0,
                ratio_target: 0.0,
            };
        }

        let Some(reading) = reading else {
            return CycleDecision::Skip(SkipReason::MissingSamples);
        };

        let export_limit = active
            .export_watts
            .map(|a| a.value)
            .unwrap_or(f64::INFINITY);
        let generation_limit = active
            .generation_watts
            .map(|a| a.value)
            .unwrap_or(f64::INFINITY);

        // Positive when the site currently exports more than permitted.
        let excess_export = -reading.site_watts - export_limit;
        let export_target_solar = reading.solar_watts - excess_export;

        let full_scale = self.full_scale_watts();
        let target_solar = export_target_solar
            .min(generation_limit)
            .clamp(0.0, full_scale.max(0.0));
        let desired_ratio = if full_scale == 0.0 {
            0.0
        } else {
            (target_solar / full_scale).clamp(0.0, 1.0)
        };

        ramp.set_rate_override(active.ramp_rate_percent.map(|a| a.value));
        if let Some(request) = active.ramp_time_seconds {
            ramp.ensure_time_bounded(Duration::from_secs(u64::from(request.value)), now);
        }

        // If the device was disconnected or de-energized, ramp up from zero.
        let (previous_watts, previous_ratio) = match previous {
            Some(InverterConfiguration::Limit {
                target_watts,
                target_ratio,
                ..
            }) => (*target_watts, *target_ratio),
            _ => (0.0, 0.0),
        };

        let Some(paced_ratio) = ramp.pace(previous_ratio, desired_ratio, now) else {
            return CycleDecision::Skip(SkipReason::SubThresholdChange);
        };

        let ratio_next = bounded_step(previous_ratio, paced_ratio, 1.0);
        let watts_next = bounded_step(previous_watts, target_solar, full_scale);
        let ratio_rounded = (ratio_next * 10_000.0).round() / 10_000.0;

        CycleDecision::Apply {
            config: InverterConfiguration::Limit {
                device_count: self.device_count,
                target_watts: watts_next,
                target_ratio: ratio_rounded,
            },
            ratio_emitted: ratio_rounded,
            ratio_target: desired_ratio,
        }
    }
}

/// Cap the per-cycle change to 10% of the previous value. A zero baseline
/// gets one starting step of 10% of full scale, otherwise it could never
/// leave zero.
fn bounded_step(previous: f64, proposed: f64, full_scale: f64) -> f64 {
    let cap = if previous > 0.0 {
        previous * 0.1
    } else {
        full_scale * 0.1
    };
    proposed.clamp(previous - cap, previous + cap)
}
