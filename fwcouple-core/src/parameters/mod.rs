//! Coupling parameters
//!
//! Parameter structures for the basal-melt, flux and forcing stages. Every struct
//! deserializes with `#[serde(default)]`, so a configuration file only needs to name the
//! values it changes.

mod basal_melt;
mod flux;
mod forcing;

pub use basal_melt::{BasalMeltParameters, SectorBaselines};
pub use flux::{DensityConversion, FluxParameters};
pub use forcing::ForcingParameters;

use crate::errors::{CouplingError, CouplingResult};

/// Reject non-finite or non-positive physical constants
pub(crate) fn require_positive(name: &str, value: f64) -> CouplingResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CouplingError::Configuration(format!(
            "{name} must be positive, got {value}"
        )))
    }
}
