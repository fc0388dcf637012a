//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the simulator runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the solar simulator workspace.
//! This crate exposes configuration loading and logging setup consumed by
//! the daemon and the service crates.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ConfigOverrides, DataConfig, LoadedAppConfig, LoggingConfig, ServerConfig,
    SimulationConfig,
};
pub use logging::{init_tracing, LogFormat};
