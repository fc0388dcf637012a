//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus gauges fed by farm snapshots."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use prometheus::{GaugeVec, IntCounter, IntGaugeVec, Opts, TextEncoder};
use solar_sim_core::{FarmMetrics, MetricsSink, TickSummary};
use tracing::trace;

use crate::SharedRegistry;

/// Republishes snapshots as gauges. Cumulative totals are absolute values,
/// not increments, so a farm looping back to the start of its history simply
/// reports smaller totals.
#[derive(Clone)]
pub struct FarmExporter {
    registry: SharedRegistry,
    // Held for writing while one farm is published and for reading while the
    // registry is gathered, so a scrape never sees half a farm.
    publish_lock: std::sync::Arc<RwLock<()>>,
    power_production: GaugeVec,
    irradiance: GaugeVec,
    panel_temperature: GaugeVec,
    ambient_temperature: GaugeVec,
    efficiency: GaugeVec,
    inverter_status: IntGaugeVec,
    total_energy: GaugeVec,
    total_revenue: GaugeVec,
    anomaly_count: IntGaugeVec,
    ticks_total: IntCounter,
}

impl FarmExporter {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let farm_gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help), &["farm"])?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let power_production = farm_gauge(
            "solar_power_production_kw",
            "Current power production in kilowatts",
        )?;
        let irradiance = farm_gauge(
            "solar_irradiance_wm2",
            "Solar irradiance in watts per square meter",
        )?;
        let panel_temperature = farm_gauge(
            "solar_panel_temperature_celsius",
            "Solar panel temperature in Celsius",
        )?;
        let ambient_temperature = farm_gauge(
            "solar_ambient_temperature_celsius",
            "Ambient temperature in Celsius",
        )?;
        let efficiency = farm_gauge(
            "solar_efficiency_percent",
            "Solar farm efficiency percentage",
        )?;
        let total_energy = farm_gauge(
            "solar_total_energy_kwh",
            "Energy produced since the start of the replay in kilowatt-hours",
        )?;
        let total_revenue = farm_gauge(
            "solar_total_revenue_eur",
            "Revenue since the start of the replay in euros",
        )?;

        let inverter_status = IntGaugeVec::new(
            Opts::new("solar_inverter_status", "Inverter status (0=down, 1=up)"),
            &["farm", "inverter"],
        )?;
        registry.register(Box::new(inverter_status.clone()))?;

        let anomaly_count = IntGaugeVec::new(
            Opts::new(
                "solar_anomaly_count",
                "Readings classified as anomalous since the start of the replay, by type",
            ),
            &["farm", "type"],
        )?;
        registry.register(Box::new(anomaly_count.clone()))?;

        let ticks_total = IntCounter::with_opts(Opts::new(
            "solar_sim_ticks_total",
            "Number of simulation ticks performed, including the priming tick",
        ))?;
        registry.register(Box::new(ticks_total.clone()))?;

        Ok(Self {
            registry,
            publish_lock: Default::default(),
            power_production,
            irradiance,
            panel_temperature,
            ambient_temperature,
            efficiency,
            inverter_status,
            total_energy,
            total_revenue,
            anomaly_count,
            ticks_total,
        })
    }

    /// Content type of [`FarmExporter::render`] output.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }

    /// Encode the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let families = {
            let _guard = self.publish_lock.read();
            self.registry.gather()
        };
        TextEncoder::new()
            .encode_to_string(&families)
            .context("failed to encode metrics")
    }
}

impl MetricsSink for FarmExporter {
    fn publish(&self, metrics: &FarmMetrics) {
        let farm = metrics.farm.as_str();
        let _guard = self.publish_lock.write();

        self.power_production
            .with_label_values(&[farm])
            .set(metrics.current_power_kw);
        self.irradiance
            .with_label_values(&[farm])
            .set(metrics.current_irradiance_wm2);
        self.panel_temperature
            .with_label_values(&[farm])
            .set(metrics.current_panel_temp_c);
        self.ambient_temperature
            .with_label_values(&[farm])
            .set(metrics.current_ambient_temp_c);
        self.efficiency
            .with_label_values(&[farm])
            .set(metrics.current_efficiency_percent);

        for (index, status) in metrics.inverter_status.iter().enumerate() {
            let inverter = format!("inverter_{}", index + 1);
            self.inverter_status
                .with_label_values(&[farm, inverter.as_str()])
                .set(i64::from(*status));
        }

        self.total_energy
            .with_label_values(&[farm])
            .set(metrics.total_energy_kwh);
        self.total_revenue
            .with_label_values(&[farm])
            .set(metrics.total_revenue_eur);

        for (kind, count) in metrics.anomaly_counts.iter() {
            if !kind.is_anomalous() {
                continue;
            }
            self.anomaly_count
                .with_label_values(&[farm, kind.as_ref()])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
        trace!(farm, "farm metrics published");
    }

    fn tick_completed(&self, _summary: &TickSummary) {
        self.ticks_total.inc();
    }
}

impl fmt::Debug for FarmExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FarmExporter").finish_non_exhaustive()
    }
}
