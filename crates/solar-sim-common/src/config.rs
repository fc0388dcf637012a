//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the simulator runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_update_interval() -> Duration {
    Duration::from_millis(60_000)
}

fn default_farms() -> Vec<String> {
    ["provence", "occitanie", "aquitaine"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the simulator daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "SOLAR_SIM_CONFIG";

    /// Load configuration from disk, respecting the `SOLAR_SIM_CONFIG` override.
    ///
    /// An explicit path must exist. Candidates are probed in order and the
    /// defaults are used when none of them exists.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Some(path) = explicit {
            return Self::loaded_from(path.to_path_buf());
        }

        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::loaded_from(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::loaded_from(candidate.as_ref().to_path_buf());
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn loaded_from(path: PathBuf) -> Result<LoadedAppConfig> {
        let config = Self::from_path(&path)?;
        Ok(LoadedAppConfig {
            config,
            source: Some(path),
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Apply command line / environment overrides on top of the file values.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(port) = overrides.port {
            self.server.listen.set_port(port);
        }
        if let Some(dir) = &overrides.data_path {
            self.data.directory = dir.clone();
        }
        if let Some(ms) = overrides.update_interval_ms {
            self.simulation.update_interval = Duration::from_millis(ms);
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub data_path: Option<PathBuf>,
    pub update_interval_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Wall-clock period between two simulated ticks.
    #[serde(rename = "update_interval_ms", default = "default_update_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub update_interval: Duration,
    /// Closed set of farms replayed by this deployment.
    #[serde(default = "default_farms")]
    pub farms: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            farms: default_farms(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.update_interval.is_zero() {
            return Err(anyhow!("simulation.update_interval_ms must be positive"));
        }
        if self.farms.is_empty() {
            return Err(anyhow!("configuration must contain at least one farm"));
        }
        let mut seen = HashSet::new();
        for farm in &self.farms {
            if farm.trim().is_empty() {
                return Err(anyhow!("farm identifiers must not be blank"));
            }
            if !seen.insert(farm.as_str()) {
                return Err(anyhow!("farm '{}' is declared more than once", farm));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one `<farm>_data.csv` file per farm.
    #[serde(default = "default_data_directory")]
    pub directory: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            directory: default_data_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Rolling log files are only written when a directory is set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
            file_prefix: None,
        }
    }
}
