//! Forcing file parameters
//!
//! Unit conversions and the variable naming expected by the ocean model (NEMO).

use super::require_positive;
use crate::errors::CouplingResult;
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForcingParameters {
    /// unit: kg/Gt
    /// default: 1e12
    pub kg_per_gigatonne: FloatValue,

    /// Length of a model year for the flux rate
    /// unit: s
    /// default: 31536000.0
    pub seconds_per_year: FloatValue,

    /// Variable receiving the calving flux
    /// default: "socalving_f"
    pub calving_variable: String,

    /// Variable receiving the basal-melt flux
    /// default: "sorunoff_f"
    pub basal_variable: String,

    /// default: "time_counter"
    pub time_dimension: String,

    /// CF units of the output time coordinate
    /// default: "seconds since 1900-01-01 00:00:00"
    pub time_units: String,

    /// default: "gregorian"
    pub calendar: String,

    /// Units attribute of both flux variables
    /// default: "kg m-2 s-1"
    pub flux_units: String,
}

impl Default for ForcingParameters {
    fn default() -> Self {
        Self {
            kg_per_gigatonne: 1.0e12,
            seconds_per_year: 3600.0 * 24.0 * 365.0,
            calving_variable: "socalving_f".to_string(),
            basal_variable: "sorunoff_f".to_string(),
            time_dimension: "time_counter".to_string(),
            time_units: "seconds since 1900-01-01 00:00:00".to_string(),
            calendar: "gregorian".to_string(),
            flux_units: "kg m-2 s-1".to_string(),
        }
    }
}

impl ForcingParameters {
    pub fn validate(&self) -> CouplingResult<()> {
        require_positive("forcing.kg_per_gigatonne", self.kg_per_gigatonne)?;
        require_positive("forcing.seconds_per_year", self.seconds_per_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let params = ForcingParameters::default();
        assert_eq!(params.seconds_per_year, 31_536_000.0);
        assert_eq!(params.basal_variable, "sorunoff_f");
        assert!(params.validate().is_ok());
    }
}
