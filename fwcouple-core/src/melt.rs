//! Quadratic basal-melt parameterisation
//!
//! Converts a sector-mean ocean temperature into a basal melt rate (m/yr of ice). The rate
//! grows with the square of the thermal forcing `T - T_f` and keeps its sign, so water below
//! the freezing point gives refreezing.

use crate::errors::{CouplingError, CouplingResult};
use crate::parameters::{BasalMeltParameters, SectorBaselines};
use crate::sectors::Sector;
use crate::timeseries::{FloatValue, SectorTimeseries};
use tracing::debug;

pub const BASAL_MELT_ANOMALY: &str = "Basal Melt Anomaly";
pub const MELT_UNIT: &str = "m/yr";

#[derive(Debug, Clone, PartialEq)]
pub struct BasalMeltModel {
    parameters: BasalMeltParameters,
    melt_sensitivity: FloatValue,
}

impl BasalMeltModel {
    pub fn from_parameters(parameters: BasalMeltParameters) -> CouplingResult<Self> {
        parameters.validate()?;
        let p = &parameters;
        let exchange = (p.rho_seawater * p.heat_capacity) / (p.rho_ice * p.latent_heat);
        let melt_sensitivity = p.gamma * 1.0e5 * exchange.powi(2);
        Ok(Self {
            parameters,
            melt_sensitivity,
        })
    }

    /// Model with default physical constants and the given calibration `gamma`
    pub fn new(gamma: FloatValue) -> CouplingResult<Self> {
        Self::from_parameters(BasalMeltParameters {
            gamma,
            ..Default::default()
        })
    }

    pub fn parameters(&self) -> &BasalMeltParameters {
        &self.parameters
    }

    /// Quadratic constant `gamma * 1e5 * ((rho_sw * c_p) / (rho_i * L_i))^2`
    pub fn melt_sensitivity(&self) -> FloatValue {
        self.melt_sensitivity
    }

    /// Melt rate at temperature `t` (m/yr, negative below the freezing point)
    pub fn quadratic_melt(&self, t: FloatValue) -> FloatValue {
        let forcing = t - self.parameters.freezing_point;
        forcing * forcing.abs() * self.melt_sensitivity
    }

    /// Change in melt rate between `baseline` and `t`
    ///
    /// # Errors
    ///
    /// [`CouplingError::UnrealisticValue`] if the anomaly is NaN or larger in magnitude
    /// than the configured limit. `context` names the value in the error.
    pub fn melt_anomaly(
        &self,
        t: FloatValue,
        baseline: FloatValue,
        context: &str,
    ) -> CouplingResult<FloatValue> {
        let anomaly = self.quadratic_melt(t) - self.quadratic_melt(baseline);
        let limit = self.parameters.anomaly_limit;
        if anomaly.is_nan() || anomaly.abs() > limit {
            return Err(CouplingError::UnrealisticValue {
                sector: context.to_string(),
                value: anomaly,
                limit,
            });
        }
        Ok(anomaly)
    }

    /// Melt anomaly of every sector relative to its configured baseline
    pub fn sector_anomalies(
        &self,
        temperature: &SectorTimeseries,
    ) -> CouplingResult<SectorTimeseries> {
        let baselines = &self.parameters.baseline;
        temperature.try_map(BASAL_MELT_ANOMALY, MELT_UNIT, |sector, t| {
            let anomaly = self.melt_anomaly(t, baselines.get(sector), sector.name())?;
            debug!(sector = sector.name(), temperature = t, anomaly, "basal melt anomaly");
            Ok(anomaly)
        })
    }
}

/// Mean temperature of every sector over the years `first..=last`
///
/// Used to derive baselines from a reference period of a temperature series.
pub fn climatology(
    temperature: &SectorTimeseries,
    first: i32,
    last: i32,
) -> CouplingResult<SectorBaselines> {
    let (first, last) = (f64::from(first), f64::from(last));
    let rows: Vec<usize> = temperature
        .times()
        .iter()
        .enumerate()
        .filter(|(_, t)| **t >= first && **t <= last)
        .map(|(i, _)| i)
        .collect();
    if rows.is_empty() {
        return Err(CouplingError::EmptyResult(format!(
            "no temperature between {first} and {last}"
        )));
    }

    let mean = |sector: Sector| {
        let column = temperature.values(sector);
        rows.iter().map(|i| column[*i]).sum::<FloatValue>() / rows.len() as FloatValue
    };
    Ok(SectorBaselines {
        eais: mean(Sector::Eais),
        wedd: mean(Sector::Wedd),
        amun: mean(Sector::Amun),
        ross: mean(Sector::Ross),
        apen: mean(Sector::Apen),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::SectorValues;
    use approx::assert_relative_eq;

    fn constant_row(value: FloatValue) -> SectorValues {
        Sector::ALL.iter().map(|s| (*s, value)).collect()
    }

    #[test]
    fn melt_sensitivity_value() {
        let model = BasalMeltModel::new(0.05).unwrap();
        let expected = 0.05 * 1.0e5 * ((1028.0 * 3974.0) / (917.0 * 3.34e5_f64)).powi(2);
        assert_relative_eq!(model.melt_sensitivity(), expected);
        assert_relative_eq!(model.melt_sensitivity(), 0.88957, max_relative = 1e-4);
    }

    #[test]
    fn no_melt_at_freezing_point() {
        for gamma in [0.0, 0.01, 0.05, 1.0, 42.0] {
            let model = BasalMeltModel::new(gamma).unwrap();
            assert_eq!(model.quadratic_melt(-1.6), 0.0);
        }
    }

    #[test]
    fn melt_keeps_sign_of_forcing() {
        let model = BasalMeltModel::new(0.05).unwrap();
        let warm = model.quadratic_melt(-0.6);
        let cold = model.quadratic_melt(-2.6);
        assert_relative_eq!(warm, model.melt_sensitivity(), max_relative = 1e-12);
        assert_relative_eq!(cold, -warm, max_relative = 1e-12);
    }

    #[test]
    fn anomaly_of_baseline_is_zero() {
        let model = BasalMeltModel::new(0.05).unwrap();
        for t in [-3.0, -1.6, 0.0, 0.5177848939696833, 4.0] {
            assert_eq!(model.melt_anomaly(t, t, "ross").unwrap(), 0.0);
        }
    }

    #[test]
    fn unrealistic_anomaly_is_rejected() {
        let model = BasalMeltModel::new(0.05).unwrap();
        let err = model.melt_anomaly(20.0, 0.0, "amun").unwrap_err();
        assert!(matches!(
            err,
            CouplingError::UnrealisticValue { sector, limit, .. } if sector == "amun" && limit == 100.0
        ));
        assert!(model.melt_anomaly(f64::NAN, 0.0, "amun").is_err());
    }

    #[test]
    fn sector_anomalies_use_each_baseline() {
        let model = BasalMeltModel::new(0.05).unwrap();
        let mut temperature = SectorTimeseries::new("Ocean Temperature|Shelf Base", "degC");
        temperature.push(2000.0, &constant_row(1.0)).unwrap();

        let anomalies = model.sector_anomalies(&temperature).unwrap();
        assert_eq!(anomalies.name(), BASAL_MELT_ANOMALY);
        assert_eq!(anomalies.times(), &[2000.0]);
        for sector in Sector::ALL {
            let baseline = model.parameters().baseline.get(sector);
            assert_relative_eq!(
                anomalies.values(sector)[0],
                model.quadratic_melt(1.0) - model.quadratic_melt(baseline)
            );
        }
    }

    #[test]
    fn climatology_over_reference_period() {
        let mut temperature = SectorTimeseries::new("Ocean Temperature|Shelf Base", "degC");
        temperature.push(1850.0, &constant_row(1.0)).unwrap();
        temperature.push(1851.0, &constant_row(3.0)).unwrap();
        temperature.push(1990.0, &constant_row(10.0)).unwrap();

        let baselines = climatology(&temperature, 1850, 1930).unwrap();
        assert_relative_eq!(baselines.get(Sector::Wedd), 2.0);
        assert!(climatology(&temperature, 1700, 1800).is_err());
    }
}
