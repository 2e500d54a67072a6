//! Calving and basal-melt discharge from pairs of snapshots
//!
//! For a region, the ice lost to the ocean between two snapshots is the summed surface and
//! basal mass balance minus the volume that stayed in the ice sheet:
//!
//! $$calving = \frac{smb + bmb - \Delta h \cdot A \cdot f}{V_{Gt}}$$
//!
//! $$basal = -\frac{bmb \cdot A \cdot f}{V_{Gt}}$$
//!
//! where the sums run over the region's cells, $\Delta h$ is the change of the summed
//! thickness, $A$ is the area of one cell, $f$ the density factor and $V_{Gt}$ the volume of
//! one gigatonne. Only the thickness change is scaled to a volume in the calving budget; the
//! mass balance sums enter as they are. Mass balances are taken from the later snapshot.
//! Basal melt is negated so that melting gives a positive flux into the ocean.

use crate::errors::{CouplingError, CouplingResult};
use crate::parameters::FluxParameters;
use crate::sectors::Sector;
use crate::snapshot::{RegionSums, BASAL_SOURCE, SURFACE_SOURCE, THICKNESS};
use crate::timeseries::{FloatValue, SectorTimeseries, SectorValues, Time};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const CALVING_FLUX: &str = "Freshwater Flux|Calving";
pub const BASAL_FLUX: &str = "Freshwater Flux|Basal Melt";
pub const FLUX_UNIT: &str = "Gt";

/// Fluxes of one sector over one snapshot pair (Gt)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxRecord {
    pub sector: Sector,
    pub calving: FloatValue,
    pub basal: FloatValue,
}

/// Fluxes of every sector over one snapshot pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairFluxes {
    pub time_start: Time,
    pub time_end: Time,
    pub records: BTreeMap<Sector, FluxRecord>,
}

impl PairFluxes {
    /// Antarctica-wide calving total
    pub fn total_calving(&self) -> FloatValue {
        self.records.values().map(|r| r.calving).sum()
    }

    /// Antarctica-wide basal-melt total
    pub fn total_basal(&self) -> FloatValue {
        self.records.values().map(|r| r.basal).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FluxCalculator {
    parameters: FluxParameters,
}

impl FluxCalculator {
    pub fn new(parameters: FluxParameters) -> CouplingResult<Self> {
        parameters.validate()?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &FluxParameters {
        &self.parameters
    }

    /// Convert a sum of per-cell values in metres of ice to gigatonnes
    fn to_gigatonnes(&self, cell_sum: FloatValue) -> FloatValue {
        cell_sum * self.parameters.cell_area * self.parameters.density_factor()
            / self.parameters.volume_per_gigatonne
    }

    /// Calving discharge (Gt)
    ///
    /// `thickness_change` is the regional thickness sum of the later snapshot minus that of
    /// the earlier one.
    pub fn calving_flux(
        &self,
        smb: FloatValue,
        bmb: FloatValue,
        thickness_change: FloatValue,
    ) -> FloatValue {
        let volume_change =
            thickness_change * self.parameters.cell_area * self.parameters.density_factor();
        (smb + bmb - volume_change) / self.parameters.volume_per_gigatonne
    }

    /// Basal-melt discharge (Gt), positive when ice melts
    pub fn basal_flux(&self, bmb: FloatValue) -> FloatValue {
        -self.to_gigatonnes(bmb)
    }

    /// Fluxes of one region between two aggregated snapshots
    pub fn contributions(
        &self,
        sector: Sector,
        start: &RegionSums,
        end: &RegionSums,
    ) -> CouplingResult<FluxRecord> {
        let smb = end.get(SURFACE_SOURCE)?;
        let bmb = end.get(BASAL_SOURCE)?;
        let thickness_change = end.get(THICKNESS)? - start.get(THICKNESS)?;
        let record = FluxRecord {
            sector,
            calving: self.calving_flux(smb, bmb, thickness_change),
            basal: self.basal_flux(bmb),
        };
        debug!(
            sector = sector.name(),
            calving = record.calving,
            basal = record.basal,
            "regional flux"
        );
        Ok(record)
    }

    /// Fluxes of every sector between two snapshots
    ///
    /// # Errors
    ///
    /// [`CouplingError::Configuration`] if a sector is missing from either side.
    pub fn regional_contributions(
        &self,
        start: &BTreeMap<Sector, RegionSums>,
        end: &BTreeMap<Sector, RegionSums>,
    ) -> CouplingResult<PairFluxes> {
        let mut records = BTreeMap::new();
        let mut times = None;
        for sector in Sector::ALL {
            let (Some(s), Some(e)) = (start.get(&sector), end.get(&sector)) else {
                return Err(CouplingError::Configuration(format!(
                    "no aggregated values for sector {sector}"
                )));
            };
            times.get_or_insert((s.time, e.time));
            records.insert(sector, self.contributions(sector, s, e)?);
        }
        let (time_start, time_end) = times.unwrap_or((f64::NAN, f64::NAN));
        Ok(PairFluxes {
            time_start,
            time_end,
            records,
        })
    }
}

/// Split a list of pair fluxes into calving and basal time series, indexed by pair end time
pub fn flux_series(pairs: &[PairFluxes]) -> CouplingResult<(SectorTimeseries, SectorTimeseries)> {
    let mut calving = SectorTimeseries::new(CALVING_FLUX, FLUX_UNIT);
    let mut basal = SectorTimeseries::new(BASAL_FLUX, FLUX_UNIT);
    for pair in pairs {
        let calving_row: SectorValues =
            pair.records.iter().map(|(s, r)| (*s, r.calving)).collect();
        let basal_row: SectorValues = pair.records.iter().map(|(s, r)| (*s, r.basal)).collect();
        calving.push(pair.time_end, &calving_row)?;
        basal.push(pair.time_end, &basal_row)?;
    }
    calving.sort_by_time();
    basal.sort_by_time();
    Ok((calving, basal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::DensityConversion;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;

    fn sums(time: Time, thickness: f64, smb: f64, bmb: f64) -> RegionSums {
        RegionSums {
            time,
            values: IndexMap::from([
                (THICKNESS.to_string(), thickness),
                (SURFACE_SOURCE.to_string(), smb),
                (BASAL_SOURCE.to_string(), bmb),
            ]),
        }
    }

    fn calculator(cell_area: f64) -> FluxCalculator {
        FluxCalculator::new(FluxParameters {
            cell_area,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn hand_computed_fluxes() {
        // Two cells of 100 m2: thickness 200 -> 205, bmb -5 per cell
        let calc = calculator(100.0);
        let start = sums(0.0, 200.0, 0.0, 0.0);
        let end = sums(1.0, 205.0, 0.0, -10.0);
        let record = calc.contributions(Sector::Ross, &start, &end).unwrap();

        // (0 - 10 - 5 * 100) / 1e9
        assert_relative_eq!(record.calving, -5.1e-7, max_relative = 1e-6);
        assert_relative_eq!(record.basal, 1.0e-6, max_relative = 1e-6);
    }

    #[test]
    fn only_the_thickness_change_is_scaled_by_area() {
        let calc = calculator(1.0e9);
        // 1 + 2 - 1 * 1e9, in units of 1e9
        assert_relative_eq!(calc.calving_flux(1.0, 2.0, 1.0), 3.0e-9 - 1.0, max_relative = 1e-12);
        assert_relative_eq!(calc.basal_flux(-2.0), 2.0, max_relative = 1e-12);
    }

    #[test]
    fn ice_density_conversion() {
        let calc = FluxCalculator::new(FluxParameters {
            cell_area: 1.0e9,
            density_conversion: DensityConversion::IceToSeawater,
            ..Default::default()
        })
        .unwrap();
        assert_relative_eq!(calc.basal_flux(-1.0), 917.0 / 1028.0, max_relative = 1e-12);
    }

    #[test]
    fn steady_state_has_no_calving() {
        let calc = calculator(1.0);
        // Volume gain equals the applied mass balance
        assert_eq!(calc.calving_flux(3.0, -1.0, 2.0), 0.0);
    }

    #[test]
    fn missing_sector_is_rejected() {
        let calc = FluxCalculator::default();
        let start: BTreeMap<Sector, RegionSums> = Sector::ALL
            .iter()
            .map(|s| (*s, sums(0.0, 1.0, 0.0, 0.0)))
            .collect();
        let mut end = start.clone();
        end.remove(&Sector::Apen);
        assert!(matches!(
            calc.regional_contributions(&start, &end),
            Err(CouplingError::Configuration(_))
        ));
    }

    #[test]
    fn regional_totals_and_series() {
        let calc = calculator(1.0e9);
        let start: BTreeMap<Sector, RegionSums> = Sector::ALL
            .iter()
            .map(|s| (*s, sums(2000.0, 10.0, 0.0, 0.0)))
            .collect();
        let end: BTreeMap<Sector, RegionSums> = Sector::ALL
            .iter()
            .map(|s| (*s, sums(2001.0, 9.0, 1.0, -2.0)))
            .collect();

        let pair = calc.regional_contributions(&start, &end).unwrap();
        assert_eq!((pair.time_start, pair.time_end), (2000.0, 2001.0));
        // (1 - 2 + 1e9) / 1e9 per sector
        assert_relative_eq!(pair.total_calving(), 5.0 * (1.0 - 1.0e-9), max_relative = 1e-12);
        assert_relative_eq!(pair.total_basal(), 10.0);

        let (calving, basal) = flux_series(&[pair]).unwrap();
        assert_eq!(calving.times(), &[2001.0]);
        assert_eq!(basal.values(Sector::Wedd), &[2.0]);
    }

    #[test]
    fn invalid_parameters() {
        let params = FluxParameters {
            volume_per_gigatonne: 0.0,
            ..Default::default()
        };
        assert!(FluxCalculator::new(params).is_err());
    }
}
