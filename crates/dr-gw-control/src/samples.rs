//! ---
//! gw_section: "04-control-loop"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control loop, ramp limiting, and configuration calculation."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::calculator::PowerReading;

/// One site power measurement. `site_watts` follows the meter convention:
/// positive means importing from the grid, negative exporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterSample {
    pub taken_at: Instant,
    pub solar_watts: f64,
    pub site_watts: f64,
}

/// Rolling averaging window over recent meter samples.
///
/// Samples older than the configured window are discarded on access. An
/// empty window yields no reading, which makes the calculator skip the cycle
/// instead of writing a value derived from stale or missing data.
#[derive(Debug)]
pub struct SampleWindow {
    window: Duration,
    samples: VecDeque<MeterSample>,
}

impl SampleWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn push(&mut self, sample: MeterSample) {
        self.samples.push_back(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Average the fresh samples, discarding anything older than the window.
    pub fn average(&mut self, now: Instant) -> Option<PowerReading> {
        let horizon = self.window;
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.taken_at) > horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        if self.samples.is_empty() {
            return None;
        }
        let count = self.samples.len() as f64;
        let (solar, site) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |(solar, site), sample| {
                (solar + sample.solar_watts, site + sample.site_watts)
            });
        Some(PowerReading {
            solar_watts: solar / count,
            site_watts: site / count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_yields_no_reading() {
        let mut window = SampleWindow::new(Duration::from_secs(60));
        assert!(window.average(Instant::now()).is_none());
    }

    #[test]
    fn averages_fresh_samples() {
        let now = Instant::now();
        let mut window = SampleWindow::new(Duration::from_secs(60));
        window.push(MeterSample {
            taken_at: now,
            solar_watts: 4_000.0,
            site_watts: -2_000.0,
        });
        window.push(MeterSample {
            taken_at: now,
            solar_watts: 6_000.0,
            site_watts: -4_000.0,
        });
        let reading = window.average(now).unwrap();
        assert_eq!(reading.solar_watts, 5_000.0);
        assert_eq!(reading.site_watts, -3_000.0);
    }

    #[test]
    fn stale_samples_age_out() {
        let now = Instant::now();
        let mut window = SampleWindow::new(Duration::from_secs(10));
        window.push(MeterSample {
            taken_at: now,
            solar_watts: 1_000.0,
            site_watts: 0.0,
        });
        assert!(window.average(now + Duration::from_secs(11)).is_none());
        assert!(window.is_empty());
    }
}
