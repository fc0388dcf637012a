//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the solar simulator daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use solar_sim_api::{spawn_api_server, ApiState, RuntimeInfo};
use solar_sim_common::{init_tracing, AppConfig, ConfigOverrides};
use solar_sim_core::{FarmStore, SimulationClock};
use solar_sim_data::{CsvFarmLoader, FarmId, FarmSource};
use solar_sim_metrics::{new_registry, FarmExporter, SimulatorMetrics};
use tracing::{error, info};

const DEFAULT_CONFIG_CANDIDATES: [&str; 1] = ["configs/solar-sim.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Solar farm telemetry simulator",
    long_about = "Replays historical solar farm readings one step per tick and exposes them as Prometheus metrics."
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, env = "PORT", help = "HTTP port to listen on")]
    port: Option<u16>,

    #[arg(
        long,
        env = "DATA_PATH",
        value_name = "DIR",
        help = "Directory holding <farm>_data.csv files"
    )]
    data_path: Option<PathBuf>,

    #[arg(
        long,
        env = "UPDATE_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Milliseconds between simulation ticks"
    )]
    update_interval_ms: Option<u64>,

    #[arg(long, env = "LOG_LEVEL", help = "Default log filter")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            data_path: self.data_path.clone(),
            update_interval_ms: self.update_interval_ms,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let started = Instant::now();
    let cli = Cli::parse();

    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &DEFAULT_CONFIG_CANDIDATES)?;
    let mut config = loaded.config;
    config.apply_overrides(&cli.overrides());
    config.validate()?;

    init_tracing("solar-simd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    if let Err(err) = run_daemon(config, started).await {
        error!(error = %format!("{err:#}"), "simulator terminated");
        return Err(err);
    }
    Ok(())
}

async fn run_daemon(config: AppConfig, started: Instant) -> Result<()> {
    let registry = new_registry()?;
    let simulator_metrics = SimulatorMetrics::new(registry.clone())?;
    simulator_metrics.set_build_info(env!("CARGO_PKG_VERSION"));
    let exporter = Arc::new(FarmExporter::new(registry)?);

    let farms: Vec<FarmId> = config
        .simulation
        .farms
        .iter()
        .map(|name| FarmId::new(name.as_str()))
        .collect();
    let store = FarmStore::new();
    load_farms(&config, &farms, &store, &simulator_metrics).await?;

    let state = Arc::new(ApiState::new(
        started,
        farms.len(),
        Arc::new(store.clone()),
        exporter.clone(),
        RuntimeInfo {
            update_interval_ms: config.simulation.update_interval.as_millis() as u64,
            data_path: config.data.directory.display().to_string(),
        },
    ));

    let mut clock = SimulationClock::new(
        store.clone(),
        exporter.clone(),
        config.simulation.update_interval,
    );
    clock.prime();
    let api_server = spawn_api_server(state, config.server.listen)?;
    let clock = clock.start();

    info!(
        address = %api_server.addr(),
        farms = farms.len(),
        "simulator running; waiting for termination signal"
    );
    shutdown_signal().await?;

    let ticks = clock.shutdown().await?;
    info!(ticks, "simulation clock shut down");
    api_server.shutdown().await?;
    info!("shutdown complete");
    Ok(())
}

async fn load_farms(
    config: &AppConfig,
    farms: &[FarmId],
    store: &FarmStore,
    metrics: &SimulatorMetrics,
) -> Result<()> {
    let loader = CsvFarmLoader::new(config.data.directory.clone());
    info!(data_dir = %loader.data_dir().display(), farms = farms.len(), "loading solar farm data");

    let started = Instant::now();
    let requested = farms.to_vec();
    let loaded = tokio::task::spawn_blocking(move || loader.load_all(&requested))
        .await
        .context("farm data loader task failed")?
        .context("failed to load farm data")?;
    metrics.observe_data_load(started.elapsed().as_secs_f64());

    for (farm, data) in loaded {
        metrics.record_farm_loaded(farm.as_str(), data.series.len(), data.skipped_rows);
        store.install(farm, data.series);
    }
    info!(farms = store.len(), "farm data loaded");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("ctrl-c received; shutting down");
        }
        _ = terminate.recv() => {
            info!("SIGTERM received; shutting down");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("ctrl-c received; shutting down");
    Ok(())
}
