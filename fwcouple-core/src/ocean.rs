//! Sector-mean ocean temperature near the ice-shelf base
//!
//! A 4D temperature field `(time, level, j, i)` is reduced to one value per sector per
//! calendar year in three steps:
//!
//! 1. sub-annual records are averaged per calendar year ([`OceanTemperature::annual_means`])
//! 2. each level is averaged horizontally over the sector, weighted by cell area
//!    ([`VolumeWeightedOceanMean::area_weighted_profile`])
//! 3. the resulting profile is averaged over the depth band around the shelf base, weighted
//!    by the overlap thickness of each level ([`VolumeWeightedOceanMean::depth_weighted_mean`])
//!
//! Missing values (NaN, typically land cells) carry zero weight in every step.

use crate::depth::{DepthBand, DepthBandSelector, DepthBounds, DepthWindow};
use crate::errors::{CouplingError, CouplingResult};
use crate::grid::GeoCoordinates;
use crate::sectors::{mask_for, Sector};
use crate::timeseries::{SectorTimeseries, SectorValues};
use chrono::{Datelike, NaiveDateTime};
use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const SHELF_BASE_TEMPERATURE: &str = "Ocean Temperature|Shelf Base";
pub const TEMPERATURE_UNIT: &str = "degC";

/// Horizontal weight given to each ocean cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalWeighting {
    /// Cell area (`areacello`)
    #[default]
    Area,
    /// Cosine of latitude, proportional to cell area on a regular grid
    CosLatitude,
}

/// How the depth window of each sector is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DepthWindowMode {
    /// Centred on the sector's shelf-base depth
    ShelfBase { half_width: f64 },
    /// The same window for every sector
    Fixed { centre: f64, half_width: f64 },
}

impl Default for DepthWindowMode {
    fn default() -> Self {
        Self::ShelfBase { half_width: 50.0 }
    }
}

impl DepthWindowMode {
    pub fn window(&self, sector: Sector) -> CouplingResult<DepthWindow> {
        match *self {
            Self::ShelfBase { half_width } => {
                DepthWindow::centred(sector.definition().shelf_depth, half_width)
            }
            Self::Fixed { centre, half_width } => DepthWindow::centred(centre, half_width),
        }
    }
}

/// Potential temperature on the ocean grid
#[derive(Debug, Clone)]
pub struct OceanTemperature {
    times: Vec<NaiveDateTime>,
    /// `(time, level, j, i)`, degC
    thetao: Array4<f64>,
    depth_bounds: DepthBounds,
    coordinates: GeoCoordinates,
    /// `(j, i)`, m2
    cell_area: Option<Array2<f64>>,
}

impl OceanTemperature {
    pub fn new(
        times: Vec<NaiveDateTime>,
        thetao: Array4<f64>,
        depth_bounds: DepthBounds,
        coordinates: GeoCoordinates,
    ) -> CouplingResult<Self> {
        let (nt, nlev, nj, ni) = thetao.dim();
        let (cj, ci) = coordinates.shape();
        let expected = vec![times.len(), depth_bounds.len(), cj, ci];
        if vec![nt, nlev, nj, ni] != expected {
            return Err(CouplingError::GridMismatch {
                context: "thetao".to_string(),
                expected,
                found: thetao.shape().to_vec(),
            });
        }
        Ok(Self {
            times,
            thetao,
            depth_bounds,
            coordinates,
            cell_area: None,
        })
    }

    pub fn with_cell_area(mut self, cell_area: Array2<f64>) -> CouplingResult<Self> {
        if cell_area.dim() != self.coordinates.shape() {
            let (nj, ni) = self.coordinates.shape();
            return Err(CouplingError::GridMismatch {
                context: "areacello".to_string(),
                expected: vec![nj, ni],
                found: cell_area.shape().to_vec(),
            });
        }
        self.cell_area = Some(cell_area);
        Ok(self)
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn thetao(&self) -> &Array4<f64> {
        &self.thetao
    }

    pub fn depth_bounds(&self) -> &DepthBounds {
        &self.depth_bounds
    }

    pub fn coordinates(&self) -> &GeoCoordinates {
        &self.coordinates
    }

    pub fn cell_area(&self) -> Option<&Array2<f64>> {
        self.cell_area.as_ref()
    }

    /// Average all records of each calendar year, ignoring NaN
    ///
    /// A cell that is NaN in every record of a year stays NaN.
    pub fn annual_means(&self) -> CouplingResult<AnnualMeans> {
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (index, time) in self.times.iter().enumerate() {
            groups.entry(time.year()).or_default().push(index);
        }
        if groups.is_empty() {
            return Err(CouplingError::EmptyResult(
                "ocean temperature has no time records".to_string(),
            ));
        }

        let (_, nlev, nj, ni) = self.thetao.dim();
        let mut thetao = Array4::from_elem((groups.len(), nlev, nj, ni), f64::NAN);
        for (mut out, indices) in thetao.outer_iter_mut().zip(groups.values()) {
            let mut sum = Array3::<f64>::zeros((nlev, nj, ni));
            let mut count = Array3::<f64>::zeros((nlev, nj, ni));
            for index in indices {
                Zip::from(&mut sum)
                    .and(&mut count)
                    .and(self.thetao.index_axis(Axis(0), *index))
                    .for_each(|s, c, &v| {
                        if v.is_finite() {
                            *s += v;
                            *c += 1.0;
                        }
                    });
            }
            Zip::from(&mut out)
                .and(&sum)
                .and(&count)
                .for_each(|o, &s, &c| {
                    if c > 0.0 {
                        *o = s / c;
                    }
                });
        }

        Ok(AnnualMeans {
            years: groups.into_keys().collect(),
            thetao,
        })
    }
}

/// Temperature averaged per calendar year
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualMeans {
    pub years: Vec<i32>,
    /// `(year, level, j, i)`
    pub thetao: Array4<f64>,
}

/// Area-then-depth weighted mean temperature per sector
#[derive(Debug, Clone, Default)]
pub struct VolumeWeightedOceanMean {
    pub weighting: HorizontalWeighting,
    pub window_mode: DepthWindowMode,
    pub selector: DepthBandSelector,
}

impl VolumeWeightedOceanMean {
    pub fn new(weighting: HorizontalWeighting, window_mode: DepthWindowMode) -> Self {
        Self {
            weighting,
            window_mode,
            selector: DepthBandSelector::default(),
        }
    }

    /// Horizontal weight of every cell
    ///
    /// # Errors
    ///
    /// [`CouplingError::Configuration`] if area weighting is requested but the ocean data has
    /// no cell area.
    pub fn horizontal_weights(&self, ocean: &OceanTemperature) -> CouplingResult<Array2<f64>> {
        match self.weighting {
            HorizontalWeighting::Area => ocean.cell_area().cloned().ok_or_else(|| {
                CouplingError::Configuration(
                    "area weighting requires the ocean cell area".to_string(),
                )
            }),
            HorizontalWeighting::CosLatitude => Ok(ocean
                .coordinates()
                .latitude()
                .mapv(|lat| lat.to_radians().cos())),
        }
    }

    /// Weighted horizontal mean of every level over the masked cells
    ///
    /// Cells with a NaN value or a non-positive weight are ignored. A level without any
    /// valid cell is NaN.
    pub fn area_weighted_profile(
        field: ArrayView3<f64>,
        mask: ArrayView2<bool>,
        weights: ArrayView2<f64>,
    ) -> Vec<f64> {
        field
            .outer_iter()
            .map(|level| {
                let mut weighted = 0.0;
                let mut total = 0.0;
                Zip::from(&level)
                    .and(&mask)
                    .and(&weights)
                    .for_each(|&v, &m, &w| {
                        if m && v.is_finite() && w.is_finite() && w > 0.0 {
                            weighted += w * v;
                            total += w;
                        }
                    });
                if total > 0.0 {
                    weighted / total
                } else {
                    f64::NAN
                }
            })
            .collect()
    }

    /// Thickness-weighted mean of a profile over `band`
    ///
    /// # Errors
    ///
    /// [`CouplingError::EmptyResult`] if no level in the band has a value.
    pub fn depth_weighted_mean(profile: &[f64], band: &DepthBand) -> CouplingResult<f64> {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (index, weight) in band.indices().zip(&band.weights) {
            match profile.get(index) {
                Some(value) if value.is_finite() && *weight > 0.0 => {
                    weighted += weight * value;
                    total += weight;
                }
                _ => {}
            }
        }
        if total > 0.0 {
            Ok(weighted / total)
        } else {
            Err(CouplingError::EmptyResult(format!(
                "no ocean values in levels {}..={}",
                band.start,
                band.end()
            )))
        }
    }

    /// Annual mean temperature of one sector, one value per year of `annual`
    pub fn sector_mean(
        &self,
        ocean: &OceanTemperature,
        annual: &AnnualMeans,
        weights: &Array2<f64>,
        sector: Sector,
    ) -> CouplingResult<Vec<f64>> {
        let window = self.window_mode.window(sector)?;
        let band = self.selector.select(ocean.depth_bounds(), &window)?;
        debug!(
            sector = sector.name(),
            top = window.top,
            bottom = window.bottom,
            first_level = band.start,
            last_level = band.end(),
            "selected depth band"
        );
        let mask = mask_for(sector, ocean.coordinates());
        // Profiles are computed on the band's levels only
        let local_band = DepthBand {
            start: 0,
            weights: band.weights.clone(),
        };

        annual
            .thetao
            .outer_iter()
            .zip(&annual.years)
            .map(|(year_field, year)| {
                let levels = year_field.slice(s![band.indices(), .., ..]);
                let profile = Self::area_weighted_profile(levels, mask.view(), weights.view());
                let mean = Self::depth_weighted_mean(&profile, &local_band).map_err(|_| {
                    CouplingError::EmptyResult(format!(
                        "no ocean temperature for {sector} in {year}"
                    ))
                })?;
                debug!(sector = sector.name(), year, mean, "sector mean temperature");
                Ok(mean)
            })
            .collect()
    }

    /// Collect per-sector columns into a time series indexed by year
    pub fn assemble(
        years: &[i32],
        columns: BTreeMap<Sector, Vec<f64>>,
    ) -> CouplingResult<SectorTimeseries> {
        let mut series = SectorTimeseries::new(SHELF_BASE_TEMPERATURE, TEMPERATURE_UNIT);
        for (row, year) in years.iter().enumerate() {
            let values = columns
                .iter()
                .filter_map(|(sector, column)| column.get(row).map(|v| (*sector, *v)))
                .collect::<SectorValues>();
            series.push(f64::from(*year), &values)?;
        }
        Ok(series)
    }

    /// Sector-mean temperature of every sector and year
    pub fn compute(&self, ocean: &OceanTemperature) -> CouplingResult<SectorTimeseries> {
        let annual = ocean.annual_means()?;
        let weights = self.horizontal_weights(ocean)?;
        let columns = Sector::ALL
            .iter()
            .map(|sector| {
                self.sector_mean(ocean, &annual, &weights, *sector)
                    .map(|column| (*sector, column))
            })
            .collect::<CouplingResult<BTreeMap<_, _>>>()?;
        Self::assemble(&annual.years, columns)
    }
}
