//! ---
//! gw_section: "01-core-functionality"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Shared primitives and utilities for the gateway runtime."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
//! Core shared primitives for the DR-GW workspace.
//! This crate exposes configuration loading, logging bootstrap, and time
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{ControlConfig, GatewayConfig, LoggingConfig, Mode, SimulationConfig, SiteConfig};
pub use logging::{init_tracing, LogFormat};
