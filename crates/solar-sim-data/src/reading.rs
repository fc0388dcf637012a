//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Solar farm reading and series types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumCount, EnumIter, EnumString};

/// Number of inverters reported per reading.
pub const INVERTER_COUNT: usize = 4;

/// Identifier of a monitored farm (`provence`, `occitanie`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FarmId(String);

impl FarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FarmId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FarmId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for FarmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Classification attached to every reading.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    Normal,
    Overheat,
    InverterDown,
    Degradation,
    Shading,
    SensorFail,
}

impl AnomalyType {
    /// Stable slot used by fixed-size tallies.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_anomalous(self) -> bool {
        self != AnomalyType::Normal
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnomalySeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// One hourly row of sensor and production data for a farm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// `None` when the source cell could not be read as a date and time.
    pub timestamp: Option<DateTime<Utc>>,
    pub farm: FarmId,
    pub hour: u32,
    pub day_of_year: u32,
    pub irradiance_wm2: f64,
    pub ambient_temp_c: f64,
    pub panel_temp_c: f64,
    pub theoretical_power_kw: f64,
    pub power_production_kw: f64,
    pub efficiency_percent: f64,
    /// 0 = down, 1 = up, in inverter order.
    pub inverter_status: [u8; INVERTER_COUNT],
    /// Revenue accumulated so far on `day_of_year`, not a per-hour value.
    pub daily_revenue_eur: f64,
    /// Unrecognised or blank labels are kept as `None` and never tallied.
    pub anomaly_type: Option<AnomalyType>,
    pub anomaly_severity: Option<AnomalySeverity>,
}

/// Ordered history of readings for one farm, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    readings: Vec<Reading>,
}

impl Series {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self { readings }
    }
}

impl Deref for Series {
    type Target = [Reading];

    fn deref(&self) -> &Self::Target {
        &self.readings
    }
}

impl From<Vec<Reading>> for Series {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}

impl FromIterator<Reading> for Series {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn anomaly_names_match_source_data() {
        let names: Vec<String> = AnomalyType::iter().map(|kind| kind.to_string()).collect();
        assert_eq!(
            names,
            [
                "NORMAL",
                "OVERHEAT",
                "INVERTER_DOWN",
                "DEGRADATION",
                "SHADING",
                "SENSOR_FAIL"
            ]
        );
        assert_eq!("INVERTER_DOWN".parse::<AnomalyType>(), Ok(AnomalyType::InverterDown));
        assert!("inverter_down".parse::<AnomalyType>().is_err());
    }

    #[test]
    fn anomaly_indices_are_dense() {
        for (expected, kind) in AnomalyType::iter().enumerate() {
            assert_eq!(kind.index(), expected);
        }
        assert_eq!(AnomalyType::COUNT, 6);
        assert!(!AnomalyType::Normal.is_anomalous());
        assert!(AnomalyType::Shading.is_anomalous());
    }

    #[test]
    fn severity_is_lowercase() {
        assert_eq!("critical".parse::<AnomalySeverity>(), Ok(AnomalySeverity::Critical));
        assert_eq!(AnomalySeverity::None.to_string(), "none");
        assert_eq!(
            serde_json::to_string(&AnomalySeverity::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn farm_id_serializes_as_plain_string() {
        let id = FarmId::from("provence");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"provence\"");
        assert_eq!(id.to_string(), "provence");
    }
}
