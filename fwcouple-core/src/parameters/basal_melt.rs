//! Basal Melt Parameters
//!
//! Constants of the quadratic melt parameterisation, which relates the ocean temperature
//! above the local freezing point to the melt rate at the base of the ice shelves.
//!
//! # Reference
//!
//! Favier et al. (2019), Geosci. Model Dev. 12, 2255-2283, quadratic local formulation.

use super::require_positive;
use crate::errors::{CouplingError, CouplingResult};
use crate::sectors::Sector;
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Reference temperature of every sector
///
/// Melt anomalies are computed relative to these values.
/// unit: degC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorBaselines {
    /// default: 0.27209795341055726
    pub eais: FloatValue,
    /// default: -1.471784486780416
    pub wedd: FloatValue,
    /// default: 2.1510233407460326
    pub amun: FloatValue,
    /// default: 0.5177848939696833
    pub ross: FloatValue,
    /// default: -0.6192596251283067
    pub apen: FloatValue,
}

impl Default for SectorBaselines {
    fn default() -> Self {
        Self {
            eais: 0.27209795341055726,
            wedd: -1.471784486780416,
            amun: 2.1510233407460326,
            ross: 0.5177848939696833,
            apen: -0.6192596251283067,
        }
    }
}

impl SectorBaselines {
    pub fn get(&self, sector: Sector) -> FloatValue {
        match sector {
            Sector::Eais => self.eais,
            Sector::Wedd => self.wedd,
            Sector::Amun => self.amun,
            Sector::Ross => self.ross,
            Sector::Apen => self.apen,
        }
    }
}

/// Parameters for the basal-melt parameterisation
///
/// The melt sensitivity is
///
/// $$K = \gamma \cdot 10^5 \cdot \left(\frac{\rho_{sw} c_p}{\rho_i L_i}\right)^2$$
///
/// and the melt rate at temperature $T$ is $K (T - T_f) |T - T_f|$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasalMeltParameters {
    /// Density of ice
    /// unit: kg/m^3
    /// default: 917.0
    pub rho_ice: FloatValue,

    /// Density of sea water
    /// unit: kg/m^3
    /// default: 1028.0
    pub rho_seawater: FloatValue,

    /// Specific heat capacity of the ocean mixed layer
    /// unit: J/kg/K
    /// default: 3974.0
    pub heat_capacity: FloatValue,

    /// Latent heat of fusion of ice
    /// unit: J/kg
    /// default: 3.34e5
    pub latent_heat: FloatValue,

    /// Freezing temperature of sea water at the shelf base
    /// unit: degC
    /// default: -1.6
    pub freezing_point: FloatValue,

    /// Heat exchange velocity calibration
    /// unit: dimensionless
    /// default: 0.05
    pub gamma: FloatValue,

    /// Largest plausible magnitude of a melt-rate anomaly
    /// unit: m/yr
    /// default: 100.0
    pub anomaly_limit: FloatValue,

    pub baseline: SectorBaselines,
}

impl Default for BasalMeltParameters {
    fn default() -> Self {
        Self {
            rho_ice: 917.0,
            rho_seawater: 1028.0,
            heat_capacity: 3974.0,
            latent_heat: 3.34e5,
            freezing_point: -1.6,
            gamma: 0.05,
            anomaly_limit: 100.0,
            baseline: SectorBaselines::default(),
        }
    }
}

impl BasalMeltParameters {
    pub fn validate(&self) -> CouplingResult<()> {
        require_positive("basal_melt.rho_ice", self.rho_ice)?;
        require_positive("basal_melt.rho_seawater", self.rho_seawater)?;
        require_positive("basal_melt.heat_capacity", self.heat_capacity)?;
        require_positive("basal_melt.latent_heat", self.latent_heat)?;
        require_positive("basal_melt.anomaly_limit", self.anomaly_limit)?;
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(CouplingError::Configuration(format!(
                "basal_melt.gamma must be non-negative, got {}",
                self.gamma
            )));
        }
        if !self.freezing_point.is_finite() {
            return Err(CouplingError::Configuration(
                "basal_melt.freezing_point must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
