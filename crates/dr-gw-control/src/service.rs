//! ---
//! gw_section: "04-control-loop"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control loop, ramp limiting, and configuration calculation."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dr_gw_common::config::GatewayConfig;
use dr_gw_limits::{arbitrate, ControlLimitSnapshot, LimitAuthority};
use dr_gw_schedule::GridScheduleAuthority;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::calculator::{ConfigurationCalculator, CycleDecision, InverterConfiguration, SkipReason};
use crate::pacing::{CycleTimer, CycleTimingReporter};
use crate::ramp::{RampLimiter, RampPolicy};
use crate::samples::{MeterSample, SampleWindow};

/// Sink for inverter configuration writes. `write` must only return `Ok`
/// once the device has acknowledged the configuration: the service commits
/// ramp state and its previous-configuration memory on success.
#[async_trait]
pub trait ConfigurationWriter: Send + Sync {
    async fn write(&self, config: &InverterConfiguration) -> Result<()>;
}

/// Source of raw power measurements, polled once per control cycle.
pub trait MeasurementSource: Send {
    fn sample(&mut self, now: Instant) -> Result<MeterSample>;
}

/// The control loop host. Owns the measurement window, the arbitration
/// inputs, the configuration calculator, and the software ramp, and drives
/// one full read-arbitrate-calculate-write pass per cycle.
pub struct ControlService {
    cycle_interval: std::time::Duration,
    grid: Arc<GridScheduleAuthority>,
    authorities: Vec<Arc<dyn LimitAuthority>>,
    source: Box<dyn MeasurementSource>,
    writer: Arc<dyn ConfigurationWriter>,
    calculator: ConfigurationCalculator,
    ramp: RampLimiter,
    samples: SampleWindow,
    battery_charge_buffer_watts: Option<f64>,
    previous: Option<InverterConfiguration>,
}

impl ControlService {
    /// Secondary authorities are polled after the grid schedule, in the
    /// order given; that order decides last-snapshot-wins fields.
    pub fn new(
        config: &GatewayConfig,
        grid: Arc<GridScheduleAuthority>,
        authorities: Vec<Arc<dyn LimitAuthority>>,
        source: Box<dyn MeasurementSource>,
        writer: Arc<dyn ConfigurationWriter>,
    ) -> Self {
        let calculator = ConfigurationCalculator::new(
            config.site.device_count,
            config.site.nameplate_max_watts,
        );
        let ramp = RampLimiter::new(
            RampPolicy::from_rate_percent(config.control.default_ramp_rate_percent),
            1.0,
        );
        Self {
            cycle_interval: config.control.cycle_interval,
            grid,
            authorities,
            source,
            writer,
            calculator,
            ramp,
            samples: SampleWindow::new(config.control.sample_window),
            battery_charge_buffer_watts: config.site.battery_charge_buffer_watts,
            previous: None,
        }
    }

    /// Run cycles until the shutdown signal arrives. Individual cycle
    /// failures are logged and the loop carries on; only shutdown ends it.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut timer = CycleTimer::new(self.cycle_interval);
        let reporter = CycleTimingReporter::new(self.cycle_interval);
        info!(
            cycle_interval_secs = self.cycle_interval.as_secs_f64(),
            "control loop starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("control loop shutdown signal received");
                    debug!(
                        worst_jitter_us = reporter.worst_jitter_us(),
                        "control loop timing summary"
                    );
                    break;
                }
                instant = timer.tick() => {
                    if let Some(jitter_us) = reporter.record_tick(instant) {
                        debug!(jitter_us, "control cycle tick");
                    }
                    self.run_cycle(Instant::now()).await;
                }
            }
        }
        Ok(())
    }

    /// One full pass: sample, arbitrate, calculate, write. Exposed for the
    /// integration harness; production code only reaches it through [`run`].
    ///
    /// [`run`]: ControlService::run
    pub async fn run_cycle(&mut self, now: Instant) {
        match self.source.sample(now) {
            Ok(sample) => self.samples.push(sample),
            Err(err) => warn!(error = %err, "meter sample unavailable this cycle"),
        }

        let mut snapshots: Vec<ControlLimitSnapshot> = Vec::new();
        match self.grid.collect(Utc::now()) {
            Ok(snapshot) => {
                if !snapshot.is_empty() {
                    snapshots.push(snapshot);
                }
            }
            Err(err) => {
                // An inconsistent schedule must not drive the device.
                warn!(error = %err, "grid schedule inconsistent, skipping cycle");
                return;
            }
        }
        for authority in &self.authorities {
            if let Some(snapshot) = authority.snapshot() {
                snapshots.push(snapshot);
            }
        }

        let active = arbitrate(&snapshots, self.battery_charge_buffer_watts);
        let reading = self.samples.average(now);
        let decision =
            self.calculator
                .calculate(&active, reading, self.previous.as_ref(), &mut self.ramp, now);

        match decision {
            CycleDecision::Skip(SkipReason::MissingSamples) => {
                debug!("no measurements in window, skipping write");
            }
            CycleDecision::Skip(SkipReason::SubThresholdChange) => {
                debug!("ramp step below output resolution, skipping write");
            }
            CycleDecision::Apply {
                config,
                ratio_emitted,
                ratio_target,
            } => match self.writer.write(&config).await {
                Ok(()) => {
                    match &config {
                        InverterConfiguration::Limit { .. } => {
                            self.ramp.commit(ratio_emitted, ratio_target, now);
                        }
                        // Safety states clear pacing so recovery ramps from zero.
                        _ => self.ramp.reset(),
                    }
                    info!(config = ?config, "inverter configuration applied");
                    self.previous = Some(config);
                }
                Err(err) => {
                    warn!(error = %err, "configuration write failed, keeping previous state");
                }
            },
        }
    }

    /// Last configuration confirmed by the writer.
    pub fn previous_configuration(&self) -> Option<&InverterConfiguration> {
        self.previous.as_ref()
    }
}
