//! Gridded coordinates and boolean region masks
//!
//! Two grids are involved in a coupling step: the ocean grid, described by 2D latitude and
//! longitude arrays ([`GeoCoordinates`]), and the projected ice-sheet grid, described by 1D
//! `x`/`y` axes. Region masks are stored as a [`RegionMaskGrid`] on either grid.
//!
//! Masks are usually supplied at a finer resolution than the flattened snapshots they are
//! applied to. [`RegionMaskGrid::resample_to`] reduces a mask onto a coarser grid by an
//! integer factor in each direction.

use crate::errors::{CouplingError, CouplingResult};
use ndarray::{Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Latitude and longitude of every cell centre, in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinates {
    latitude: Array2<f64>,
    longitude: Array2<f64>,
}

impl GeoCoordinates {
    pub fn new(latitude: Array2<f64>, longitude: Array2<f64>) -> CouplingResult<Self> {
        if latitude.shape() != longitude.shape() {
            return Err(CouplingError::GridMismatch {
                context: "latitude/longitude".to_string(),
                expected: latitude.shape().to_vec(),
                found: longitude.shape().to_vec(),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Build 2D coordinates of a regular grid from its 1D axes
    ///
    /// The resulting arrays have shape `(latitude.len(), longitude.len())`.
    pub fn from_axes(latitude: &Array1<f64>, longitude: &Array1<f64>) -> Self {
        let shape = (latitude.len(), longitude.len());
        Self {
            latitude: Array2::from_shape_fn(shape, |(j, _)| latitude[j]),
            longitude: Array2::from_shape_fn(shape, |(_, i)| longitude[i]),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.latitude.dim()
    }

    pub fn latitude(&self) -> &Array2<f64> {
        &self.latitude
    }

    pub fn longitude(&self) -> &Array2<f64> {
        &self.longitude
    }
}

/// How a fine mask is reduced onto a coarser grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Keep the centre cell of every block (nearest-neighbour zoom)
    #[default]
    Decimate,
    /// Set a coarse cell when at least half of its block is set
    Majority,
}

/// Boolean mask tagged with the axes of the grid it lives on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMaskGrid {
    mask: Array2<bool>,
    x: Array1<f64>,
    y: Array1<f64>,
}

impl RegionMaskGrid {
    /// Create a mask with shape `(y.len(), x.len())`
    pub fn new(mask: Array2<bool>, x: Array1<f64>, y: Array1<f64>) -> CouplingResult<Self> {
        let expected = vec![y.len(), x.len()];
        if mask.shape() != expected.as_slice() {
            return Err(CouplingError::GridMismatch {
                context: "region mask axes".to_string(),
                expected,
                found: mask.shape().to_vec(),
            });
        }
        Ok(Self { mask, x, y })
    }

    /// Interpret a numeric field as a mask: finite non-zero values are set
    pub fn from_values(
        values: ArrayView2<f64>,
        x: Array1<f64>,
        y: Array1<f64>,
    ) -> CouplingResult<Self> {
        let mask = values.mapv(|v| v.is_finite() && v != 0.0);
        Self::new(mask, x, y)
    }

    /// A uniform mask with index axes
    pub fn filled(shape: (usize, usize), value: bool) -> Self {
        Self {
            mask: Array2::from_elem(shape, value),
            x: Array1::range(0.0, shape.1 as f64, 1.0),
            y: Array1::range(0.0, shape.0 as f64, 1.0),
        }
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Number of cells that are set
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }

    /// Grid spacing along `x`, if there are at least two columns
    pub fn resolution(&self) -> Option<f64> {
        (self.x.len() > 1).then(|| (self.x[1] - self.x[0]).abs())
    }

    /// Reduce the mask onto a grid of `shape`
    ///
    /// The target must divide the mask's shape exactly in both directions. Upsampling is
    /// not supported. The axes of the result are the block means of the original axes.
    pub fn resample_to(
        &self,
        shape: (usize, usize),
        method: Resampling,
    ) -> CouplingResult<RegionMaskGrid> {
        if shape == self.shape() {
            return Ok(self.clone());
        }

        let (ny, nx) = self.shape();
        let (ty, tx) = shape;
        if ty == 0 || tx == 0 || ty > ny || tx > nx || ny % ty != 0 || nx % tx != 0 {
            return Err(CouplingError::GridMismatch {
                context: "mask resampling (needs an integer reduction factor)".to_string(),
                expected: vec![ty, tx],
                found: vec![ny, nx],
            });
        }
        let (fy, fx) = (ny / ty, nx / tx);

        let mut mask = Array2::from_elem(shape, false);
        Zip::from(&mut mask)
            .and(self.mask.exact_chunks((fy, fx)))
            .for_each(|cell, block| {
                *cell = match method {
                    Resampling::Decimate => block[(fy / 2, fx / 2)],
                    Resampling::Majority => {
                        let set = block.iter().filter(|m| **m).count();
                        2 * set >= block.len()
                    }
                };
            });

        Ok(Self {
            mask,
            x: block_means(&self.x, fx),
            y: block_means(&self.y, fy),
        })
    }
}

fn block_means(axis: &Array1<f64>, factor: usize) -> Array1<f64> {
    axis.exact_chunks(factor)
        .into_iter()
        .map(|chunk| chunk.mean().unwrap_or(f64::NAN))
        .collect()
}
