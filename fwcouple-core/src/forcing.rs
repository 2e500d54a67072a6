//! Freshwater forcing on the ocean grid
//!
//! Antarctica-wide discharge totals (Gt over one model year) are spread uniformly over a
//! distribution mask on the ocean grid, giving a mass flux per unit area
//! (kg m-2 s-1). Cells outside the mask receive exactly zero.
//!
//! The forcing applies to the model year after the one the ocean temperature came from,
//! so its time coordinate is the source time shifted by one calendar year.

use crate::errors::{CouplingError, CouplingResult};
use crate::grid::GeoCoordinates;
use crate::parameters::ForcingParameters;
use crate::timeseries::FloatValue;
use chrono::{Months, NaiveDateTime};
use indexmap::IndexMap;
use ndarray::{Array2, Array3, Axis, Zip};
use tracing::{debug, info, warn};

/// A time-dependent 2D field `(time, y, x)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingField {
    pub long_name: String,
    pub units: String,
    pub data: Array3<FloatValue>,
}

/// The forcing written for the ocean model
#[derive(Debug, Clone, PartialEq)]
pub struct ForcingDataset {
    pub time_dimension: String,
    pub time: Vec<NaiveDateTime>,
    pub variables: IndexMap<String, ForcingField>,
    pub coordinates: Option<GeoCoordinates>,
}

impl ForcingDataset {
    /// Attach `nav_lat`/`nav_lon` style coordinates of the ocean grid
    pub fn with_coordinates(mut self, coordinates: GeoCoordinates) -> CouplingResult<Self> {
        if let Some(field) = self.variables.values().next() {
            let (_, ny, nx) = field.data.dim();
            if coordinates.shape() != (ny, nx) {
                return Err(CouplingError::GridMismatch {
                    context: "forcing coordinates".to_string(),
                    expected: vec![ny, nx],
                    found: vec![coordinates.shape().0, coordinates.shape().1],
                });
            }
        }
        self.coordinates = Some(coordinates);
        Ok(self)
    }

    pub fn variable(&self, name: &str) -> CouplingResult<&ForcingField> {
        self.variables.get(name).ok_or_else(|| {
            CouplingError::Configuration(format!("forcing has no variable '{name}'"))
        })
    }
}

/// Shift every time by one calendar year
///
/// Calendar arithmetic keeps the day of year across leap years; 29 February maps to
/// 28 February of a non-leap year.
pub fn shift_one_year(times: &[NaiveDateTime]) -> CouplingResult<Vec<NaiveDateTime>> {
    times
        .iter()
        .map(|t| {
            t.checked_add_months(Months::new(12)).ok_or_else(|| {
                CouplingError::Configuration(format!("cannot shift {t} by one year"))
            })
        })
        .collect()
}

/// Antarctica-wide totals for one forcing step (Gt)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluxTotals {
    pub calving: FloatValue,
    pub basal: FloatValue,
}

/// Ocean-grid cells receiving each flux
///
/// Calving and basal melt usually go to disjoint coastal cells. A single runoff mask can
/// serve both through [`DistributionMasks::shared`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionMasks {
    pub calving: Array2<bool>,
    pub basal: Array2<bool>,
}

impl DistributionMasks {
    /// Use one mask for both fluxes
    pub fn shared(mask: Array2<bool>) -> Self {
        Self {
            calving: mask.clone(),
            basal: mask,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForcingDistributor {
    parameters: ForcingParameters,
    /// Ocean cell area (m2)
    cell_area: Array2<FloatValue>,
}

impl ForcingDistributor {
    pub fn new(
        parameters: ForcingParameters,
        cell_area: Array2<FloatValue>,
    ) -> CouplingResult<Self> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            cell_area,
        })
    }

    pub fn parameters(&self) -> &ForcingParameters {
        &self.parameters
    }

    fn check_shape(&self, mask: &Array2<bool>, context: &str) -> CouplingResult<()> {
        if mask.dim() != self.cell_area.dim() {
            return Err(CouplingError::GridMismatch {
                context: context.to_string(),
                expected: self.cell_area.shape().to_vec(),
                found: mask.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Total area of the masked cells (m2); missing areas count as zero
    ///
    /// # Errors
    ///
    /// [`CouplingError::Configuration`] if the masked area is not positive.
    pub fn masked_area(&self, mask: &Array2<bool>) -> CouplingResult<FloatValue> {
        self.check_shape(mask, "distribution mask")?;
        let mut area = 0.0;
        Zip::from(mask).and(&self.cell_area).for_each(|&m, &a| {
            if m && a.is_finite() {
                area += a;
            }
        });
        if area > 0.0 {
            Ok(area)
        } else {
            Err(CouplingError::Configuration(format!(
                "distribution mask covers no ocean area ({area} m2)"
            )))
        }
    }

    /// Convert a yearly total (Gt) into a flux per unit area (kg m-2 s-1)
    pub fn flux_per_area(&self, total: FloatValue, area: FloatValue) -> FloatValue {
        total * self.parameters.kg_per_gigatonne / self.parameters.seconds_per_year / area
    }

    /// Spread `total` uniformly over the masked cells
    pub fn distribute(
        &self,
        total: FloatValue,
        mask: &Array2<bool>,
    ) -> CouplingResult<Array2<FloatValue>> {
        if !total.is_finite() {
            return Err(CouplingError::UnrealisticValue {
                sector: "antarctica".to_string(),
                value: total,
                limit: FloatValue::MAX,
            });
        }
        let area = self.masked_area(mask)?;
        let flux = self.flux_per_area(total, area);
        debug!(total, area, flux, "distributing flux");
        Ok(mask.mapv(|m| if m { flux } else { 0.0 }))
    }

    /// Build the forcing dataset for the year after `source_times`
    ///
    /// Both fields are constant in time and broadcast over every shifted time.
    pub fn assemble(
        &self,
        source_times: &[NaiveDateTime],
        totals: FluxTotals,
        masks: &DistributionMasks,
    ) -> CouplingResult<ForcingDataset> {
        if source_times.is_empty() {
            return Err(CouplingError::EmptyResult(
                "source temperature has no time coordinate".to_string(),
            ));
        }
        self.check_shape(&masks.calving, "calving distribution mask")?;
        self.check_shape(&masks.basal, "basal distribution mask")?;
        let overlap = Zip::from(&masks.calving)
            .and(&masks.basal)
            .fold(0usize, |n, &c, &b| n + usize::from(c && b));
        if overlap > 0 && masks.calving != masks.basal {
            warn!(cells = overlap, "calving and basal distribution masks overlap");
        }

        let time = shift_one_year(source_times)?;
        let p = &self.parameters;
        let mut variables = IndexMap::new();
        for (name, long_name, total, mask) in [
            (&p.basal_variable, "basal melt flux", totals.basal, &masks.basal),
            (&p.calving_variable, "calving flux", totals.calving, &masks.calving),
        ] {
            let field = self.distribute(total, mask)?;
            let data = field
                .insert_axis(Axis(0))
                .broadcast((time.len(), mask.nrows(), mask.ncols()))
                .map(|view| view.to_owned())
                .ok_or_else(|| CouplingError::GridMismatch {
                    context: format!("forcing variable '{name}'"),
                    expected: vec![time.len(), mask.nrows(), mask.ncols()],
                    found: mask.shape().to_vec(),
                })?;
            variables.insert(
                name.clone(),
                ForcingField {
                    long_name: long_name.to_string(),
                    units: p.flux_units.clone(),
                    data,
                },
            );
        }
        info!(
            steps = time.len(),
            calving = totals.calving,
            basal = totals.basal,
            "assembled forcing"
        );

        Ok(ForcingDataset {
            time_dimension: p.time_dimension.clone(),
            time,
            variables,
            coordinates: None,
        })
    }
}
