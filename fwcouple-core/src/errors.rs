use thiserror::Error;

/// Errors raised by the coupling arithmetic.
///
/// Every variant is fatal to the unit of work that raised it. No failure is
/// replaced by a default value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CouplingError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Grid mismatch in {context}: expected shape {expected:?}, found {found:?}")]
    GridMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Depth window [{top}, {bottom}] m is outside the available levels [{available_top}, {available_bottom}] m")]
    DepthRange {
        top: f64,
        bottom: f64,
        available_top: f64,
        available_bottom: f64,
    },
    #[error("Empty result: {0}")]
    EmptyResult(String),
    #[error("Empty output: {0}")]
    EmptyOutput(String),
    #[error("Unrealistic value for {sector}: {value} exceeds the sanity bound of +/-{limit}")]
    UnrealisticValue {
        sector: String,
        value: f64,
        limit: f64,
    },
}

/// Convenience type for `Result<T, CouplingError>`.
pub type CouplingResult<T> = Result<T, CouplingError>;
