//! The complete set of sector masks used by one coupling step
//!
//! A [`RegionMaskSet`] always holds exactly one mask per [`Sector`], all on the same grid,
//! and optionally a whole-continent mask. Construction fails if a sector is missing or the
//! grids disagree, so downstream code never has to check again.

use crate::errors::{CouplingError, CouplingResult};
use crate::grid::{GeoCoordinates, RegionMaskGrid, Resampling};
use crate::sectors::{mask_for, Sector};
use ndarray::{Array1, Array2, Zip};
use std::collections::BTreeMap;
use tracing::debug;

/// Sectors in the order they are painted onto a shared field
///
/// Where masks overlap the later sector wins.
pub const PAINT_ORDER: [Sector; 5] = [
    Sector::Apen,
    Sector::Amun,
    Sector::Ross,
    Sector::Eais,
    Sector::Wedd,
];

#[derive(Debug, Clone, PartialEq)]
pub struct RegionMaskSet {
    sectors: BTreeMap<Sector, RegionMaskGrid>,
    antarctica: Option<RegionMaskGrid>,
}

impl RegionMaskSet {
    /// Assemble a mask set from independently loaded masks
    ///
    /// # Errors
    ///
    /// * [`CouplingError::Configuration`] if any sector has no mask
    /// * [`CouplingError::GridMismatch`] if the masks do not share one shape
    pub fn from_parts(
        sectors: BTreeMap<Sector, RegionMaskGrid>,
        antarctica: Option<RegionMaskGrid>,
    ) -> CouplingResult<Self> {
        let missing: Vec<&str> = Sector::ALL
            .iter()
            .filter(|s| !sectors.contains_key(*s))
            .map(|s| s.name())
            .collect();
        if !missing.is_empty() {
            return Err(CouplingError::Configuration(format!(
                "no region mask for sectors: {}",
                missing.join(", ")
            )));
        }

        let shape = sectors[&Sector::Eais].shape();
        for (name, grid) in sectors
            .iter()
            .map(|(s, g)| (s.name(), g))
            .chain(antarctica.iter().map(|g| ("antarctica", g)))
        {
            if grid.shape() != shape {
                return Err(CouplingError::GridMismatch {
                    context: format!("region mask '{name}'"),
                    expected: vec![shape.0, shape.1],
                    found: vec![grid.shape().0, grid.shape().1],
                });
            }
        }

        Ok(Self {
            sectors,
            antarctica,
        })
    }

    /// Derive the sector masks from cell-centre coordinates
    ///
    /// `x` and `y` are the axes the masks are tagged with. A cell inside the boxes of more
    /// than one sector goes to the sector painted last in [`PAINT_ORDER`], so the masks
    /// partition the whole-continent mask, which is their union.
    pub fn from_coordinates(
        coordinates: &GeoCoordinates,
        x: Array1<f64>,
        y: Array1<f64>,
    ) -> CouplingResult<Self> {
        let mut claimed = Array2::from_elem(coordinates.shape(), false);
        let mut sectors = BTreeMap::new();
        for sector in PAINT_ORDER.iter().rev() {
            let mut mask = mask_for(*sector, coordinates);
            Zip::from(&mut mask)
                .and(&mut claimed)
                .for_each(|m, c| {
                    *m = *m && !*c;
                    *c = *c || *m;
                });
            sectors.insert(*sector, RegionMaskGrid::new(mask, x.clone(), y.clone())?);
        }
        let mut set = Self::from_parts(sectors, None)?;
        set.antarctica = Some(RegionMaskGrid::new(set.union(), x, y)?);
        Ok(set)
    }

    pub fn get(&self, sector: Sector) -> &RegionMaskGrid {
        &self.sectors[&sector]
    }

    pub fn antarctica(&self) -> Option<&RegionMaskGrid> {
        self.antarctica.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sector, &RegionMaskGrid)> {
        self.sectors.iter().map(|(s, g)| (*s, g))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.get(Sector::Eais).shape()
    }

    /// Cells that belong to at least one sector
    pub fn union(&self) -> Array2<bool> {
        let mut union = Array2::from_elem(self.shape(), false);
        for grid in self.sectors.values() {
            Zip::from(&mut union)
                .and(grid.mask())
                .for_each(|u, &m| *u = *u || m);
        }
        union
    }

    /// Resample every mask onto a coarser grid
    pub fn resample_to(&self, shape: (usize, usize), method: Resampling) -> CouplingResult<Self> {
        let sectors = self
            .sectors
            .iter()
            .map(|(s, g)| g.resample_to(shape, method).map(|r| (*s, r)))
            .collect::<CouplingResult<BTreeMap<_, _>>>()?;
        let antarctica = self
            .antarctica
            .as_ref()
            .map(|g| g.resample_to(shape, method))
            .transpose()?;
        Ok(Self {
            sectors,
            antarctica,
        })
    }

    /// Map one value per sector onto the mask grid
    ///
    /// Cells outside every sector are 0. Sectors are painted in [`PAINT_ORDER`].
    pub fn paint(&self, values: &BTreeMap<Sector, f64>) -> CouplingResult<Array2<f64>> {
        let mut field = Array2::zeros(self.shape());
        for sector in PAINT_ORDER {
            let value = *values.get(&sector).ok_or_else(|| {
                CouplingError::Configuration(format!("no value to paint for sector {sector}"))
            })?;
            debug!(sector = sector.name(), value, "painting sector");
            Zip::from(&mut field)
                .and(self.get(sector).mask())
                .for_each(|f, &m| {
                    if m {
                        *f = value;
                    }
                });
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stripes() -> BTreeMap<Sector, RegionMaskGrid> {
        // Sector i owns column i of a 2x6 grid, the last column is unassigned
        Sector::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mask = Array2::from_shape_fn((2, 6), |(_, c)| c == i);
                let grid = RegionMaskGrid::new(mask, Array1::zeros(6), Array1::zeros(2)).unwrap();
                (*s, grid)
            })
            .collect()
    }

    #[test]
    fn missing_sector_is_a_configuration_error() {
        let mut parts = stripes();
        parts.remove(&Sector::Ross);
        let err = RegionMaskSet::from_parts(parts, None).unwrap_err();
        assert!(matches!(err, CouplingError::Configuration(msg) if msg.contains("ross")));
    }

    #[test]
    fn masks_must_share_a_shape() {
        let antarctica = RegionMaskGrid::filled((4, 12), true);
        let err = RegionMaskSet::from_parts(stripes(), Some(antarctica)).unwrap_err();
        assert!(matches!(err, CouplingError::GridMismatch { .. }));
    }

    #[test]
    fn union_and_paint() {
        let set = RegionMaskSet::from_parts(stripes(), None).unwrap();
        assert_eq!(set.union().iter().filter(|m| **m).count(), 10);

        let values: BTreeMap<Sector, f64> = Sector::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, (i + 1) as f64))
            .collect();
        let field = set.paint(&values).unwrap();
        assert_eq!(field.row(0), array![1.0, 2.0, 3.0, 4.0, 5.0, 0.0]);
    }

    #[test]
    fn later_sectors_win_when_painting() {
        let mut parts = stripes();
        parts.insert(Sector::Apen, RegionMaskGrid::filled((2, 6), true));
        let set = RegionMaskSet::from_parts(parts, None).unwrap();
        let mut values: BTreeMap<Sector, f64> = Sector::ALL.iter().map(|s| (*s, 1.0)).collect();
        values.insert(Sector::Wedd, 9.0);

        let field = set.paint(&values).unwrap();
        // Weddell owns column 1 and is painted last
        assert_eq!(field[(0, 1)], 9.0);
        // Apen covers everything else
        assert_eq!(field[(0, 5)], 1.0);
    }

    #[test]
    fn paint_requires_every_sector() {
        let set = RegionMaskSet::from_parts(stripes(), None).unwrap();
        let values = BTreeMap::from([(Sector::Ross, 1.0)]);
        assert!(set.paint(&values).is_err());
    }

    #[test]
    fn from_coordinates_builds_the_continent_mask() {
        let coords = GeoCoordinates::from_axes(
            &array![-85.0, -74.0, -68.0],
            &array![30.0, 180.0, 250.0, 300.0, 340.0],
        );
        let set = RegionMaskSet::from_coordinates(
            &coords,
            Array1::range(0.0, 5.0, 1.0),
            Array1::range(0.0, 3.0, 1.0),
        )
        .unwrap();

        let antarctica = set.antarctica().unwrap();
        assert_eq!(antarctica.mask(), &set.union());
        assert!(set.get(Sector::Ross).mask()[(0, 1)]);
        assert!(set.get(Sector::Wedd).mask()[(0, 4)]);
    }

    #[test]
    fn overlapping_boxes_go_to_the_last_painted_sector() {
        // 72.5S 290E is inside both the Amundsen box and the southern Peninsula box
        let coords = GeoCoordinates::from_axes(&array![-72.5, -67.0], &array![290.0, 300.0]);
        let set = RegionMaskSet::from_coordinates(
            &coords,
            Array1::range(0.0, 2.0, 1.0),
            Array1::range(0.0, 2.0, 1.0),
        )
        .unwrap();

        assert!(set.get(Sector::Amun).mask()[(0, 0)]);
        assert!(!set.get(Sector::Apen).mask()[(0, 0)]);
        // The northern Peninsula box is unaffected
        assert!(set.get(Sector::Apen).mask()[(1, 1)]);
    }
}
