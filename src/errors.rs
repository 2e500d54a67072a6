use fwcouple_core::errors::CouplingError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while running a coupling step.
///
/// Arithmetic failures from `fwcouple_core` are wrapped unchanged; the remaining variants
/// cover files, configuration parsing and external tools.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Coupling(#[from] CouplingError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid flux table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid manifest: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },
    #[error("{tool} did not finish within {seconds} s")]
    ToolTimeout { tool: String, seconds: u64 },
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),
    #[error("Cannot open {0}: NetCDF support is not enabled (build with the `netcdf` feature)")]
    NetCdfUnavailable(PathBuf),
    #[error("{path} has no variable '{name}'")]
    MissingVariable { path: PathBuf, name: String },
    #[error("Invalid time coordinate: {0}")]
    Time(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
