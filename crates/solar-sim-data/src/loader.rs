//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Historical CSV loader for farm readings."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::LoadError;
use crate::reading::{FarmId, Reading, Series};

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Raw row representation when deserializing CSV files. Cells stay textual so
/// that a bad number only zeroes its own field.
#[derive(Debug, Deserialize)]
struct RawReading {
    timestamp: String,
    farm_name: String,
    hour: String,
    day_of_year: String,
    irradiance_wm2: String,
    ambient_temp_c: String,
    panel_temp_c: String,
    theoretical_power_kw: String,
    power_production_kw: String,
    efficiency_percent: String,
    inverter_1_status: String,
    inverter_2_status: String,
    inverter_3_status: String,
    inverter_4_status: String,
    daily_revenue_eur: String,
    anomaly_type: String,
    anomaly_severity: String,
}

impl From<RawReading> for Reading {
    fn from(raw: RawReading) -> Self {
        Reading {
            timestamp: parse_timestamp(&raw.timestamp),
            farm: FarmId::new(raw.farm_name.trim()),
            hour: lenient_u32(&raw.hour),
            day_of_year: lenient_u32(&raw.day_of_year),
            irradiance_wm2: lenient_f64(&raw.irradiance_wm2),
            ambient_temp_c: lenient_f64(&raw.ambient_temp_c),
            panel_temp_c: lenient_f64(&raw.panel_temp_c),
            theoretical_power_kw: lenient_f64(&raw.theoretical_power_kw),
            power_production_kw: lenient_f64(&raw.power_production_kw),
            efficiency_percent: lenient_f64(&raw.efficiency_percent),
            inverter_status: [
                lenient_status(&raw.inverter_1_status),
                lenient_status(&raw.inverter_2_status),
                lenient_status(&raw.inverter_3_status),
                lenient_status(&raw.inverter_4_status),
            ],
            daily_revenue_eur: lenient_f64(&raw.daily_revenue_eur),
            anomaly_type: raw.anomaly_type.trim().parse().ok(),
            anomaly_severity: raw.anomaly_severity.trim().parse().ok(),
        }
    }
}

/// A farm series together with the number of rows dropped while parsing it.
#[derive(Debug, Clone, Default)]
pub struct LoadedFarm {
    pub series: Series,
    pub skipped_rows: usize,
}

/// Source of per-farm series consumed once at startup.
pub trait FarmSource {
    fn load_farm(&self, farm: &FarmId) -> Result<LoadedFarm, LoadError>;

    /// Load every farm, stopping at the first farm that cannot be read.
    fn load_all(&self, farms: &[FarmId]) -> Result<IndexMap<FarmId, LoadedFarm>, LoadError> {
        let mut loaded = IndexMap::with_capacity(farms.len());
        for farm in farms {
            let data = self.load_farm(farm)?;
            loaded.insert(farm.clone(), data);
        }
        Ok(loaded)
    }
}

/// Reads `<data_dir>/<farm>_data.csv` files.
#[derive(Debug, Clone)]
pub struct CsvFarmLoader {
    data_dir: PathBuf,
}

impl CsvFarmLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, farm: &FarmId) -> PathBuf {
        self.data_dir.join(format!("{}_data.csv", farm))
    }

    /// Parse readings from any CSV source. `path` is only used in errors.
    pub fn from_reader<R: Read>(
        farm: &FarmId,
        path: &Path,
        reader: R,
    ) -> Result<LoadedFarm, LoadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        reader.headers().map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let mut readings = Vec::new();
        let mut skipped_rows = 0usize;
        for (index, row) in reader.deserialize::<RawReading>().enumerate() {
            // Header is line 1.
            let line = index + 2;
            match row {
                Ok(raw) => readings.push(Reading::from(raw)),
                Err(err) if err.is_io_error() => {
                    return Err(LoadError::Csv {
                        path: path.to_path_buf(),
                        source: err,
                    });
                }
                Err(err) => {
                    skipped_rows += 1;
                    warn!(farm = %farm, line, error = %err, "failed to parse row; skipping");
                }
            }
        }

        Ok(LoadedFarm {
            series: Series::new(readings),
            skipped_rows,
        })
    }
}

impl FarmSource for CsvFarmLoader {
    fn load_farm(&self, farm: &FarmId) -> Result<LoadedFarm, LoadError> {
        let path = self.path_for(farm);
        if !path.is_file() {
            return Err(LoadError::MissingFile {
                farm: farm.clone(),
                path,
            });
        }
        debug!(farm = %farm, path = %path.display(), "loading farm readings");
        let file = File::open(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let loaded = Self::from_reader(farm, &path, file)?;
        info!(
            farm = %farm,
            records = loaded.series.len(),
            skipped = loaded.skipped_rows,
            "loaded farm readings"
        );
        Ok(loaded)
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_f64(value: &str) -> f64 {
    match value.trim().parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => 0.0,
    }
}

fn lenient_u32(value: &str) -> u32 {
    let value = value.trim();
    if let Ok(parsed) = value.parse::<u32>() {
        return parsed;
    }
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 && parsed <= f64::from(u32::MAX) => {
            parsed.trunc() as u32
        }
        _ => 0,
    }
}

fn lenient_status(value: &str) -> u8 {
    u8::try_from(lenient_u32(value)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{AnomalySeverity, AnomalyType};
    use anyhow::Result;
    use chrono::{Datelike, Timelike};
    use std::io::Write;
    use tempfile::tempdir;

    const HEADER: &str = "timestamp,farm_name,hour,day_of_year,irradiance_wm2,ambient_temp_c,panel_temp_c,theoretical_power_kw,power_production_kw,efficiency_percent,inverter_1_status,inverter_2_status,inverter_3_status,inverter_4_status,daily_revenue_eur,anomaly_type,anomaly_severity";

    fn load_str(contents: &str) -> Result<LoadedFarm> {
        let farm = FarmId::from("provence");
        Ok(CsvFarmLoader::from_reader(
            &farm,
            Path::new("inline.csv"),
            contents.as_bytes(),
        )?)
    }

    #[test]
    fn parses_well_formed_rows() -> Result<()> {
        let csv = format!(
            "{HEADER}\n\
             2025-06-01 07:00:00,provence,7,152,238.9,26.3,32.3,395.7,395.7,100.0,1,1,1,1,71.23,NORMAL,none\n\
             2025-06-15T13:00:00,provence,13,166,1014.6,33.3,72.0,1521.62,1339.02,88.0,1,0,1,1,241.02,OVERHEAT,high\n"
        );
        let loaded = load_str(&csv)?;
        assert_eq!(loaded.skipped_rows, 0);
        assert_eq!(loaded.series.len(), 2);

        let first = &loaded.series[0];
        assert_eq!(first.farm.as_str(), "provence");
        let timestamp = first.timestamp.unwrap();
        assert_eq!(timestamp.hour(), 7);
        assert_eq!(timestamp.ordinal(), 152);
        assert_eq!(first.power_production_kw, 395.7);
        assert_eq!(first.daily_revenue_eur, 71.23);
        assert_eq!(first.anomaly_type, Some(AnomalyType::Normal));

        let second = &loaded.series[1];
        assert_eq!(second.inverter_status, [1, 0, 1, 1]);
        assert_eq!(second.anomaly_type, Some(AnomalyType::Overheat));
        assert_eq!(second.anomaly_severity, Some(AnomalySeverity::High));
        Ok(())
    }

    #[test]
    fn malformed_numbers_default_to_zero() -> Result<()> {
        let csv = format!(
            "{HEADER}\n2025-06-01T08:00:00Z,provence,eight,,abc,28.9,NaN,691.69,,100.0,1,x,1,1,195.73,NORMAL,none\n"
        );
        let loaded = load_str(&csv)?;
        assert_eq!(loaded.skipped_rows, 0);
        let reading = &loaded.series[0];
        assert_eq!(reading.hour, 0);
        assert_eq!(reading.day_of_year, 0);
        assert_eq!(reading.irradiance_wm2, 0.0);
        assert_eq!(reading.panel_temp_c, 0.0);
        assert_eq!(reading.power_production_kw, 0.0);
        assert_eq!(reading.inverter_status, [1, 0, 1, 1]);
        assert_eq!(reading.theoretical_power_kw, 691.69);
        Ok(())
    }

    #[test]
    fn unreadable_cells_keep_the_row() -> Result<()> {
        let csv = format!(
            "{HEADER}\n\
             not-a-date,provence,7,152,1,1,1,1,2.5,1,1,1,1,1,1,NORMAL,none\n\
             2025-06-01 09:00:00,provence,9,152,1,1,1,1,3.5,1,1,1,1,1,1,ECLIPSE,extreme\n\
             2025-06-01 10:00:00,provence,10,152,1,1,1,1,4.5,1,1,1,1,1,1,,\n\
             2025-06-01 11:00:00,provence,11,152,1,1,1,1,5.5,1,1,1,1,1,1,SHADING,low\n"
        );
        let loaded = load_str(&csv)?;
        assert_eq!(loaded.skipped_rows, 0);
        assert_eq!(loaded.series.len(), 4);

        let undated = &loaded.series[0];
        assert_eq!(undated.timestamp, None);
        assert_eq!(undated.power_production_kw, 2.5);
        assert_eq!(undated.anomaly_type, Some(AnomalyType::Normal));

        let unknown = &loaded.series[1];
        assert!(unknown.timestamp.is_some());
        assert_eq!(unknown.anomaly_type, None);
        assert_eq!(unknown.anomaly_severity, None);

        let blank = &loaded.series[2];
        assert_eq!(blank.anomaly_type, None);
        assert_eq!(blank.anomaly_severity, None);

        assert_eq!(loaded.series[3].anomaly_type, Some(AnomalyType::Shading));
        Ok(())
    }

    #[test]
    fn short_records_are_skipped() -> Result<()> {
        let csv = format!(
            "{HEADER}\n\
             2025-06-01 10:00:00,provence,10,152\n\
             2025-06-01 11:00:00,provence,11,152,1,1,1,1,5.5,1,1,1,1,1,1,SHADING,low\n"
        );
        let loaded = load_str(&csv)?;
        assert_eq!(loaded.skipped_rows, 1);
        assert_eq!(loaded.series.len(), 1);
        assert_eq!(loaded.series[0].power_production_kw, 5.5);
        Ok(())
    }

    #[test]
    fn header_only_file_yields_empty_series() -> Result<()> {
        let loaded = load_str(&format!("{HEADER}\n"))?;
        assert!(loaded.series.is_empty());
        Ok(())
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let loader = CsvFarmLoader::new(dir.path());
        let err = loader.load_farm(&FarmId::from("aquitaine")).unwrap_err();
        assert!(matches!(err, LoadError::MissingFile { .. }));
        assert!(err.to_string().contains("aquitaine_data.csv"));
    }

    #[test]
    fn load_all_reads_each_farm_file() -> Result<()> {
        let dir = tempdir()?;
        for (farm, power) in [("provence", "10.0"), ("occitanie", "20.0")] {
            let mut file = File::create(dir.path().join(format!("{farm}_data.csv")))?;
            writeln!(file, "{HEADER}")?;
            writeln!(
                file,
                "2025-06-01 12:00:00,{farm},12,152,900,30,50,{power},{power},100,1,1,1,1,12.5,NORMAL,none"
            )?;
        }
        let loader = CsvFarmLoader::new(dir.path());
        let farms = [FarmId::from("provence"), FarmId::from("occitanie")];
        let loaded = loader.load_all(&farms)?;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&farms[1]].series[0].power_production_kw, 20.0);

        let with_missing = [FarmId::from("provence"), FarmId::from("aquitaine")];
        assert!(loader.load_all(&with_missing).is_err());
        Ok(())
    }
}
