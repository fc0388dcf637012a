//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Reading model and loader module exports."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Historical solar farm readings and the CSV loader that brings them into memory.
//!
//! Every farm is backed by one `<farm>_data.csv` file. Rows are parsed leniently:
//! malformed numeric cells become zero and unreadable timestamps or labels are
//! kept as `None`. Only records the CSV reader rejects are dropped, with a warning.

pub mod errors;
pub mod loader;
pub mod reading;

pub use errors::LoadError;
pub use loader::{CsvFarmLoader, FarmSource, LoadedFarm};
pub use reading::{AnomalySeverity, AnomalyType, FarmId, Reading, Series, INVERTER_COUNT};
