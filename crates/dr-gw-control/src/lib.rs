//! ---
//! gw_section: "04-control-loop"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Control loop, ramp limiting, and configuration calculation."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
//! The write side of DR-GW: software ramp limiting ([`ramp`]), the
//! configuration calculator turning arbitrated limits plus live power
//! measurements into a device directive ([`calculator`]), and the control
//! loop host that wires authorities, calculator, and device writer together
//! on a fixed cadence ([`service`]).

pub mod calculator;
pub mod pacing;
pub mod ramp;
pub mod samples;
pub mod service;
pub mod sim;

pub use calculator::{
    ConfigurationCalculator, CycleDecision, InverterConfiguration, PowerReading, SkipReason,
};
pub use ramp::{RampLimiter, RampPolicy};
pub use samples::{MeterSample, SampleWindow};
pub use service::{ConfigurationWriter, ControlService, MeasurementSource};
pub use sim::{LoggingWriter, SyntheticMeterSource};
