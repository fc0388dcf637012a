//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Point-in-time and cumulative farm metrics over a replayed prefix."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use solar_sim_data::{AnomalyType, FarmId, Reading, INVERTER_COUNT};
use strum::{EnumCount, IntoEnumIterator};

/// Per-category anomaly tally in [`AnomalyType`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyCounts([u64; AnomalyType::COUNT]);

impl AnomalyCounts {
    pub fn record(&mut self, kind: AnomalyType) {
        self.0[kind.index()] += 1;
    }

    pub fn get(&self, kind: AnomalyType) -> u64 {
        self.0[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnomalyType, u64)> + '_ {
        AnomalyType::iter().map(|kind| (kind, self.get(kind)))
    }

    /// Sum of every category except `NORMAL`.
    pub fn anomalous(&self) -> u64 {
        self.iter()
            .filter(|(kind, _)| kind.is_anomalous())
            .map(|(_, count)| count)
            .sum()
    }
}

impl FromIterator<AnomalyType> for AnomalyCounts {
    fn from_iter<I: IntoIterator<Item = AnomalyType>>(iter: I) -> Self {
        let mut counts = Self::default();
        for kind in iter {
            counts.record(kind);
        }
        counts
    }
}

impl Serialize for AnomalyCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(AnomalyType::COUNT))?;
        for (kind, count) in self.iter() {
            map.serialize_entry(kind.as_ref(), &count)?;
        }
        map.end()
    }
}

/// Metrics for one farm at one playback position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FarmMetrics {
    pub farm: FarmId,
    pub current_power_kw: f64,
    pub current_irradiance_wm2: f64,
    pub current_panel_temp_c: f64,
    pub current_ambient_temp_c: f64,
    pub current_efficiency_percent: f64,
    pub total_energy_kwh: f64,
    pub total_revenue_eur: f64,
    pub anomaly_counts: AnomalyCounts,
    pub inverter_status: [u8; INVERTER_COUNT],
}

impl FarmMetrics {
    /// All-zero snapshot used for farms without readings.
    pub fn empty(farm: FarmId) -> Self {
        Self {
            farm,
            current_power_kw: 0.0,
            current_irradiance_wm2: 0.0,
            current_panel_temp_c: 0.0,
            current_ambient_temp_c: 0.0,
            current_efficiency_percent: 0.0,
            total_energy_kwh: 0.0,
            total_revenue_eur: 0.0,
            anomaly_counts: AnomalyCounts::default(),
            inverter_status: [0; INVERTER_COUNT],
        }
    }
}

/// Compute the snapshot of `series` at `position`.
///
/// `position` is reduced modulo the series length, so playback loops forever.
/// Cumulative fields cover readings `0..=position % len`.
pub fn compute_snapshot(farm: &FarmId, series: &[Reading], position: usize) -> FarmMetrics {
    if series.is_empty() {
        return FarmMetrics::empty(farm.clone());
    }

    let index = position % series.len();
    let current = &series[index];
    let prefix = &series[..=index];

    FarmMetrics {
        farm: farm.clone(),
        current_power_kw: current.power_production_kw,
        current_irradiance_wm2: current.irradiance_wm2,
        current_panel_temp_c: current.panel_temp_c,
        current_ambient_temp_c: current.ambient_temp_c,
        current_efficiency_percent: current.efficiency_percent,
        total_energy_kwh: total_energy_kwh(prefix),
        total_revenue_eur: total_revenue_eur(prefix),
        anomaly_counts: prefix.iter().filter_map(|reading| reading.anomaly_type).collect(),
        inverter_status: current.inverter_status,
    }
}

/// Each reading covers one hour, so kW sum directly into kWh.
pub fn total_energy_kwh(readings: &[Reading]) -> f64 {
    readings
        .iter()
        .fold(0.0, |total, reading| total + reading.power_production_kw)
}

/// `daily_revenue_eur` is already cumulative within its day: only the highest
/// value seen per day-of-year is counted.
pub fn total_revenue_eur(readings: &[Reading]) -> f64 {
    let mut per_day: BTreeMap<u32, f64> = BTreeMap::new();
    for reading in readings {
        let best = per_day.entry(reading.day_of_year).or_insert(0.0);
        *best = best.max(reading.daily_revenue_eur);
    }
    per_day.values().sum()
}

pub fn average_efficiency(readings: &[Reading]) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }
    let total: f64 = readings.iter().map(|reading| reading.efficiency_percent).sum();
    total / readings.len() as f64
}

/// Actual over theoretical production, in percent. Zero when nothing was expected.
pub fn performance_ratio(readings: &[Reading]) -> f64 {
    let actual: f64 = readings.iter().map(|r| r.power_production_kw).sum();
    let theoretical: f64 = readings.iter().map(|r| r.theoretical_power_kw).sum();
    if theoretical == 0.0 {
        return 0.0;
    }
    actual / theoretical * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use solar_sim_data::AnomalySeverity;

    fn reading(hour: u32, day: u32, power_kw: f64, revenue_eur: f64) -> Reading {
        Reading {
            timestamp: Some(Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()),
            farm: FarmId::from("provence"),
            hour,
            day_of_year: day,
            irradiance_wm2: 100.0 * f64::from(hour),
            ambient_temp_c: 20.0,
            panel_temp_c: 30.0,
            theoretical_power_kw: power_kw,
            power_production_kw: power_kw,
            efficiency_percent: 100.0,
            inverter_status: [1, 1, 1, 1],
            daily_revenue_eur: revenue_eur,
            anomaly_type: Some(AnomalyType::Normal),
            anomaly_severity: Some(AnomalySeverity::None),
        }
    }

    fn farm() -> FarmId {
        FarmId::from("provence")
    }

    #[test]
    fn empty_series_yields_zero_snapshot() {
        let metrics = compute_snapshot(&farm(), &[], 7);
        assert_eq!(metrics, FarmMetrics::empty(farm()));
        assert_eq!(metrics.inverter_status, [0, 0, 0, 0]);
        assert!(metrics.anomaly_counts.iter().all(|(_, count)| count == 0));
        assert_eq!(metrics.total_energy_kwh, 0.0);
        assert_eq!(metrics.total_revenue_eur, 0.0);
    }

    #[test]
    fn two_hours_on_one_day() {
        let series = vec![reading(7, 152, 395.7, 71.23), reading(8, 152, 691.69, 195.73)];
        let metrics = compute_snapshot(&farm(), &series, 1);
        assert_eq!(metrics.current_power_kw, 691.69);
        assert!((metrics.total_energy_kwh - 1087.39).abs() < 1e-9);
        assert_eq!(metrics.total_revenue_eur, 195.73);
        assert_eq!(metrics.anomaly_counts.get(AnomalyType::Normal), 2);
        assert_eq!(metrics.anomaly_counts.anomalous(), 0);
    }

    #[test]
    fn current_fields_come_from_wrapped_reading() {
        let mut overheated = reading(13, 166, 1339.02, 241.02);
        overheated.panel_temp_c = 72.0;
        overheated.ambient_temp_c = 33.3;
        overheated.efficiency_percent = 88.0;
        overheated.inverter_status = [1, 0, 1, 0];
        overheated.anomaly_type = Some(AnomalyType::Overheat);
        let series = vec![reading(12, 166, 1200.0, 200.0), overheated];

        let metrics = compute_snapshot(&farm(), &series, 3);
        assert_eq!(metrics.current_power_kw, 1339.02);
        assert_eq!(metrics.current_irradiance_wm2, 1300.0);
        assert_eq!(metrics.current_panel_temp_c, 72.0);
        assert_eq!(metrics.current_ambient_temp_c, 33.3);
        assert_eq!(metrics.current_efficiency_percent, 88.0);
        assert_eq!(metrics.inverter_status, [1, 0, 1, 0]);
        assert_eq!(metrics.anomaly_counts.get(AnomalyType::Overheat), 1);
        assert_eq!(metrics.anomaly_counts.get(AnomalyType::Normal), 1);
    }

    #[test]
    fn unclassified_readings_add_energy_but_no_tally() {
        let mut unlabelled = reading(9, 152, 120.0, 80.0);
        unlabelled.timestamp = None;
        unlabelled.anomaly_type = None;
        unlabelled.anomaly_severity = None;
        let series = vec![reading(8, 152, 100.0, 50.0), unlabelled];

        let metrics = compute_snapshot(&farm(), &series, 1);
        assert_eq!(metrics.current_power_kw, 120.0);
        assert_eq!(metrics.total_energy_kwh, 220.0);
        assert_eq!(metrics.total_revenue_eur, 80.0);
        assert_eq!(metrics.anomaly_counts.get(AnomalyType::Normal), 1);
        let tallied: u64 = metrics.anomaly_counts.iter().map(|(_, count)| count).sum();
        assert_eq!(tallied, 1);
    }

    #[test]
    fn snapshot_is_invariant_under_wraparound() {
        let series: Vec<Reading> = (0..5)
            .map(|i| reading(6 + i, 150 + i / 2, 10.0 * f64::from(i + 1), 5.0 * f64::from(i)))
            .collect();
        let len = series.len();
        for position in 0..len {
            let base = compute_snapshot(&farm(), &series, position);
            for k in 1..4 {
                assert_eq!(compute_snapshot(&farm(), &series, position + k * len), base);
            }
        }
    }

    #[test]
    fn energy_accumulates_one_reading_at_a_time() {
        let series: Vec<Reading> = [12.5, 0.0, 301.25, 44.0, 9.75]
            .into_iter()
            .enumerate()
            .map(|(i, power)| reading(8 + i as u32, 152, power, 0.0))
            .collect();
        for i in 1..series.len() {
            let previous = compute_snapshot(&farm(), &series, i - 1).total_energy_kwh;
            let current = compute_snapshot(&farm(), &series, i).total_energy_kwh;
            assert_eq!(current, previous + series[i].power_production_kw);
        }
    }

    #[test]
    fn revenue_keeps_the_daily_maximum() {
        let ascending = vec![reading(9, 200, 0.0, 100.0), reading(10, 200, 0.0, 150.0)];
        let descending = vec![reading(9, 200, 0.0, 150.0), reading(10, 200, 0.0, 100.0)];
        assert_eq!(total_revenue_eur(&ascending), 150.0);
        assert_eq!(total_revenue_eur(&descending), 150.0);

        let two_days = vec![
            reading(18, 200, 0.0, 150.0),
            reading(7, 201, 0.0, 20.0),
            reading(8, 201, 0.0, 45.5),
        ];
        assert_eq!(total_revenue_eur(&two_days), 195.5);
    }

    #[test]
    fn average_efficiency_handles_empty_input() {
        assert_eq!(average_efficiency(&[]), 0.0);

        let series: Vec<Reading> = [95.0, 100.0, 90.0]
            .into_iter()
            .map(|efficiency| {
                let mut r = reading(12, 152, 1.0, 0.0);
                r.efficiency_percent = efficiency;
                r
            })
            .collect();
        assert!((average_efficiency(&series) - 95.0).abs() < 1e-9);
    }

    #[test]
    fn performance_ratio_guards_zero_theoretical() {
        assert_eq!(performance_ratio(&[]), 0.0);

        let mut no_theory = reading(12, 152, 100.0, 0.0);
        no_theory.theoretical_power_kw = 0.0;
        assert_eq!(performance_ratio(&[no_theory]), 0.0);

        let mut first = reading(12, 152, 900.0, 0.0);
        first.theoretical_power_kw = 1000.0;
        let mut second = reading(13, 152, 850.0, 0.0);
        second.theoretical_power_kw = 1000.0;
        assert!((performance_ratio(&[first, second]) - 87.5).abs() < 1e-9);
    }

    #[test]
    fn anomaly_counts_serialize_by_name() {
        let counts: AnomalyCounts = [AnomalyType::Shading, AnomalyType::Shading, AnomalyType::Normal]
            .into_iter()
            .collect();
        let value = serde_json::to_value(counts).unwrap();
        assert_eq!(value["SHADING"], 2);
        assert_eq!(value["NORMAL"], 1);
        assert_eq!(value["SENSOR_FAIL"], 0);
    }
}
