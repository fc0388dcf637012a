//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Error types for loading farm readings."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::path::PathBuf;

use thiserror::Error;

use crate::reading::FarmId;

/// Failure to bring a farm's series into memory. Always fatal at startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file not found for farm {farm}: {path}")]
    MissingFile { farm: FarmId, path: PathBuf },
    #[error("failed to read CSV file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV file {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
