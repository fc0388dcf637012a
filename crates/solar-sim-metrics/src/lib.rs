//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

mod exporter;

pub use exporter::FarmExporter;

/// Constant label attached to every series exposed by the simulator.
pub const APP_LABEL: (&str, &str) = ("app", "solar-simulator");

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry carrying the `app` label.
pub fn new_registry() -> Result<SharedRegistry> {
    let labels = HashMap::from([(APP_LABEL.0.to_owned(), APP_LABEL.1.to_owned())]);
    let registry = Registry::new_custom(None, Some(labels))
        .context("failed to construct metrics registry")?;
    Ok(Arc::new(registry))
}

/// Metrics describing the simulator process itself.
#[derive(Clone, Debug)]
pub struct SimulatorMetrics {
    data_load_seconds: Histogram,
    records_loaded: IntGaugeVec,
    rows_skipped: IntCounterVec,
    build_info: GaugeVec,
}

impl SimulatorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let data_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "solar_sim_data_load_seconds",
                "Time spent loading farm CSV files at startup",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(data_load_seconds.clone()))?;

        let records_loaded = IntGaugeVec::new(
            Opts::new(
                "solar_sim_records_loaded",
                "Number of readings held in memory per farm",
            ),
            &["farm"],
        )?;
        registry.register(Box::new(records_loaded.clone()))?;

        let rows_skipped = IntCounterVec::new(
            Opts::new(
                "solar_sim_rows_skipped_total",
                "CSV rows dropped because they could not be parsed",
            ),
            &["farm"],
        )?;
        registry.register(Box::new(rows_skipped.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "solar_sim_build_info",
                "Build metadata for the running simulator binary",
            ),
            &["version"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            data_load_seconds,
            records_loaded,
            rows_skipped,
            build_info,
        })
    }

    pub fn observe_data_load(&self, seconds: f64) {
        self.data_load_seconds.observe(seconds);
    }

    pub fn record_farm_loaded(&self, farm: &str, records: usize, skipped_rows: usize) {
        self.records_loaded
            .with_label_values(&[farm])
            .set(i64::try_from(records).unwrap_or(i64::MAX));
        self.rows_skipped
            .with_label_values(&[farm])
            .inc_by(skipped_rows as u64);
    }

    pub fn set_build_info(&self, version: &str) {
        self.build_info.with_label_values(&[version]).set(1.0);
    }
}
