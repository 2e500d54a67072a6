//! Discharge flux parameters

use super::require_positive;
use crate::errors::CouplingResult;
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// How ice volume is converted to mass before dividing by the volume of a gigatonne
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityConversion {
    /// Volumes are taken as water equivalent (factor 1)
    #[default]
    WaterEquivalent,
    /// Ice volumes are scaled by `rho_ice / rho_seawater`
    IceToSeawater,
}

/// Parameters of the snapshot-difference flux calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxParameters {
    /// Area of one cell of the flattened ice-sheet grid (8 km cells)
    /// unit: m^2
    /// default: 64000000.0
    pub cell_area: FloatValue,

    /// Volume of one gigatonne of water
    /// unit: m^3/Gt
    /// default: 1e9
    pub volume_per_gigatonne: FloatValue,

    /// default: water_equivalent
    pub density_conversion: DensityConversion,

    /// unit: kg/m^3
    /// default: 917.0
    pub rho_ice: FloatValue,

    /// unit: kg/m^3
    /// default: 1028.0
    pub rho_seawater: FloatValue,
}

impl Default for FluxParameters {
    fn default() -> Self {
        Self {
            cell_area: 64.0e6,
            volume_per_gigatonne: 1.0e9,
            density_conversion: DensityConversion::default(),
            rho_ice: 917.0,
            rho_seawater: 1028.0,
        }
    }
}

impl FluxParameters {
    /// Factor applied to ice volumes before the unit conversion
    pub fn density_factor(&self) -> FloatValue {
        match self.density_conversion {
            DensityConversion::WaterEquivalent => 1.0,
            DensityConversion::IceToSeawater => self.rho_ice / self.rho_seawater,
        }
    }

    pub fn validate(&self) -> CouplingResult<()> {
        require_positive("flux.cell_area", self.cell_area)?;
        require_positive("flux.volume_per_gigatonne", self.volume_per_gigatonne)?;
        require_positive("flux.rho_ice", self.rho_ice)?;
        require_positive("flux.rho_seawater", self.rho_seawater)
    }
}
