//! ---
//! gw_section: "01-core-functionality"
//! gw_subsection: "module"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Shared primitives and utilities for the gateway runtime."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_cycle_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_sample_window() -> Duration {
    Duration::from_secs(60)
}

fn default_ramp_rate_percent() -> f64 {
    2.0
}

fn default_device_count() -> u32 {
    1
}

fn default_nameplate_watts() -> f64 {
    5_000.0
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_simulation_seed() -> u64 {
    0xD1CEu64
}

/// Primary configuration object for the DR-GW runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where a [`GatewayConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedGatewayConfig {
    pub config: GatewayConfig,
    pub source: PathBuf,
}

impl GatewayConfig {
    pub const ENV_CONFIG_PATH: &str = "DR_GW_CONFIG";

    /// Load configuration from disk, respecting the `DR_GW_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedGatewayConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedGatewayConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedGatewayConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<GatewayConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Derive the effective operating mode, considering simulation overrides.
    pub fn effective_mode(&self) -> Mode {
        if let Some(force) = self.simulation.force_mode {
            return force;
        }
        self.mode
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.control.validate()?;
        self.site.validate()?;
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            control: ControlConfig::default(),
            site: SiteConfig::default(),
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl std::str::FromStr for GatewayConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: GatewayConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the gateway.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Production => write!(f, "production"),
            Mode::Simulation => write!(f, "simulation"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Control loop cadence and software ramping parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Interval between control cycles.
    #[serde(default = "default_cycle_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cycle_interval: Duration,
    /// How far back measurement samples are considered fresh.
    #[serde(default = "default_sample_window")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub sample_window: Duration,
    /// Default software ramp rate in percent of full scale per second.
    /// Zero disables software ramping (outputs jump immediately).
    #[serde(default = "default_ramp_rate_percent")]
    pub default_ramp_rate_percent: f64,
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval.is_zero() {
            return Err(anyhow!("control.cycle_interval must be greater than zero"));
        }
        if self.sample_window.is_zero() {
            return Err(anyhow!("control.sample_window must be greater than zero"));
        }
        if self.default_ramp_rate_percent < 0.0 {
            return Err(anyhow!(
                "control.default_ramp_rate_percent must not be negative"
            ));
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycle_interval: default_cycle_interval(),
            sample_window: default_sample_window(),
            default_ramp_rate_percent: default_ramp_rate_percent(),
        }
    }
}

/// Physical site parameters the calculator needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Number of controllable inverters behind the gateway.
    #[serde(default = "default_device_count")]
    pub device_count: u32,
    /// Rated maximum active power of a single device, in watts.
    #[serde(default = "default_nameplate_watts")]
    pub nameplate_max_watts: f64,
    /// Export headroom always reserved so a battery can charge from excess
    /// generation. Absent disables the widening override.
    #[serde(default)]
    pub battery_charge_buffer_watts: Option<f64>,
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.device_count == 0 {
            return Err(anyhow!("site.device_count must be at least 1"));
        }
        if self.nameplate_max_watts < 0.0 {
            return Err(anyhow!("site.nameplate_max_watts must not be negative"));
        }
        if let Some(buffer) = self.battery_charge_buffer_watts {
            if buffer < 0.0 {
                return Err(anyhow!(
                    "site.battery_charge_buffer_watts must not be negative"
                ));
            }
        }
        Ok(())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            device_count: default_device_count(),
            nameplate_max_watts: default_nameplate_watts(),
            battery_charge_buffer_watts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_seed")]
    pub random_seed: u64,
    #[serde(default)]
    pub force_mode: Option<Mode>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            random_seed: default_simulation_seed(),
            force_mode: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = GatewayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.effective_mode(), Mode::Production);
    }

    #[test]
    fn parses_minimal_toml() {
        let config: GatewayConfig = r#"
            mode = "simulation"

            [control]
            cycle_interval = 2
            sample_window = 30
            default_ramp_rate_percent = 1.0

            [site]
            device_count = 3
            nameplate_max_watts = 8000.0
            battery_charge_buffer_watts = 2000.0
        "#
        .parse()
        .unwrap();
        assert_eq!(config.mode, Mode::Simulation);
        assert_eq!(config.control.cycle_interval, Duration::from_secs(2));
        assert_eq!(config.site.device_count, 3);
        assert_eq!(config.site.battery_charge_buffer_watts, Some(2000.0));
    }

    #[test]
    fn rejects_zero_cycle_interval() {
        let parsed = r#"
            [control]
            cycle_interval = 0
        "#
        .parse::<GatewayConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn candidate_search_takes_the_first_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("gateway.toml");
        std::fs::write(&present, "mode = \"simulation\"\n").unwrap();
        let missing = dir.path().join("absent.toml");

        let loaded = GatewayConfig::load_with_source(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(loaded.source, present);
        assert_eq!(loaded.config.mode, Mode::Simulation);

        let err = GatewayConfig::load_with_source(&[missing]).unwrap_err();
        assert!(err.to_string().contains("no configuration files found"));
    }

    #[test]
    fn force_mode_overrides_configured_mode() {
        let mut config = GatewayConfig::default();
        config.simulation.force_mode = Some(Mode::Simulation);
        assert_eq!(config.effective_mode(), Mode::Simulation);
    }
}
