//! ---
//! gw_section: "05-runtime"
//! gw_subsection: "binary"
//! gw_type: "source"
//! gw_scope: "code"
//! gw_description: "Binary entrypoint for the DR-GW daemon."
//! gw_version: "v0.1.0"
//! gw_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dr_gw_common::config::{GatewayConfig, Mode};
use dr_gw_common::logging::init_tracing;
use dr_gw_control::{ControlService, LoggingWriter, SyntheticMeterSource};
use dr_gw_limits::LimitAuthority;
use dr_gw_schedule::{
    ControlEvent, EventLimits, EventPriority, FallbackEvent, GridScheduleAuthority,
    LoggingResponder,
};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "DR-GW daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override operating mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the control loop")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/example.prod.toml"));
    candidates.push(PathBuf::from("configs/example.sim.toml"));

    let loaded = GatewayConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            init_tracing("dr-gwd", &config.logging)?;
            info!(
                config_path = %loaded.source.display(),
                version = env!("CARGO_PKG_VERSION"),
                "configuration loaded"
            );
            run_daemon(config).await
        }
        Commands::CheckConfig => {
            println!(
                "{}: ok (mode: {})",
                loaded.source.display(),
                config.effective_mode()
            );
            Ok(())
        }
    }
}

async fn run_daemon(config: GatewayConfig) -> Result<()> {
    let mode = config.effective_mode();
    let seed = config.simulation.random_seed;

    let grid = Arc::new(GridScheduleAuthority::new(Arc::new(LoggingResponder), seed));
    let authorities: Vec<Arc<dyn LimitAuthority>> = Vec::new();

    let service = match mode {
        Mode::Simulation => {
            grid.update_events(demo_events(&config), Some(demo_fallback(&config)));
            let source = SyntheticMeterSource::new(config.site.nameplate_max_watts, seed);
            ControlService::new(
                &config,
                grid,
                authorities,
                Box::new(source),
                Arc::new(LoggingWriter),
            )
        }
        Mode::Production => {
            // No device backend is wired yet; production runs log writes
            // until the inverter transport lands.
            warn!("no inverter transport configured, writes are log-only");
            let source = SyntheticMeterSource::new(config.site.nameplate_max_watts, seed);
            ControlService::new(
                &config,
                grid,
                authorities,
                Box::new(source),
                Arc::new(LoggingWriter),
            )
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(16);
    let handle = tokio::spawn(service.run(shutdown_rx));

    info!(mode = %mode, "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    let _ = shutdown_tx.send(());
    handle
        .await
        .map_err(|err| anyhow::anyhow!("control loop join failure: {}", err))??;
    info!("daemon shutdown complete");
    Ok(())
}

/// A small curtailment schedule so simulation runs exercise the full
/// build-randomize-select pipeline.
fn demo_events(config: &GatewayConfig) -> Vec<ControlEvent> {
    let now = Utc::now();
    let half_scale = config.site.nameplate_max_watts * f64::from(config.site.device_count) / 2.0;
    vec![
        ControlEvent {
            id: "sim-curtail-1".into(),
            priority: EventPriority::new(1, now),
            start: now + ChronoDuration::seconds(60),
            end: now + ChronoDuration::seconds(360),
            start_jitter_secs: Some(15),
            duration_jitter_secs: Some(15),
            limits: EventLimits {
                export_watts: Some(half_scale),
                ..EventLimits::default()
            },
        },
        ControlEvent {
            id: "sim-curtail-2".into(),
            priority: EventPriority::new(2, now),
            start: now + ChronoDuration::seconds(240),
            end: now + ChronoDuration::seconds(600),
            start_jitter_secs: None,
            duration_jitter_secs: Some(30),
            limits: EventLimits {
                generation_watts: Some(half_scale / 2.0),
                ..EventLimits::default()
            },
        },
    ]
}

fn demo_fallback(config: &GatewayConfig) -> FallbackEvent {
    FallbackEvent {
        limits: EventLimits {
            export_watts: Some(
                config.site.nameplate_max_watts * f64::from(config.site.device_count),
            ),
            ..EventLimits::default()
        },
    }
}
