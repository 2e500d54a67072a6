//! Regional reduction of ice-sheet snapshots
//!
//! A [`Snapshot`] is the flattened state of the ice-sheet model at one instant: a set of
//! named 2D fields on a uniform grid. The [`SnapshotAggregator`] reduces every requested
//! field over a region mask, after bringing the mask to the snapshot's resolution.

use crate::errors::{CouplingError, CouplingResult};
use crate::grid::{RegionMaskGrid, Resampling};
use crate::masks::RegionMaskSet;
use crate::sectors::Sector;
use crate::timeseries::{FloatValue, Time};
use indexmap::IndexMap;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Ice thickness (m)
pub const THICKNESS: &str = "thickness";
/// Surface mass balance actually applied (m/yr of ice)
pub const SURFACE_SOURCE: &str = "activeSurfaceThicknessSource";
/// Basal mass balance actually applied (m/yr of ice)
pub const BASAL_SOURCE: &str = "activeBasalThicknessSource";

/// Fields needed for the discharge fluxes
pub const FLUX_FIELDS: [&str; 3] = [THICKNESS, SURFACE_SOURCE, BASAL_SOURCE];

/// Named 2D fields captured at one time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    time: Time,
    fields: IndexMap<String, Array2<FloatValue>>,
}

impl Snapshot {
    pub fn new(time: Time) -> Self {
        Self {
            time,
            fields: IndexMap::new(),
        }
    }

    /// Add a field; all fields of a snapshot share one shape
    pub fn with_field(mut self, name: &str, values: Array2<FloatValue>) -> CouplingResult<Self> {
        if let Some(shape) = self.shape() {
            if values.dim() != shape {
                return Err(CouplingError::GridMismatch {
                    context: format!("snapshot field '{name}'"),
                    expected: vec![shape.0, shape.1],
                    found: values.shape().to_vec(),
                });
            }
        }
        self.fields.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.fields.values().next().map(|f| f.dim())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn field(&self, name: &str) -> CouplingResult<&Array2<FloatValue>> {
        self.fields.get(name).ok_or_else(|| {
            CouplingError::Configuration(format!(
                "snapshot at t={} has no field '{name}'",
                self.time
            ))
        })
    }
}

/// How masked cells are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Sum of the masked cells, NaN counted as 0
    #[default]
    Sum,
    /// Mean of the finite masked cells
    Mean,
}

/// One row of a regional aggregation: a value per field at one snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSums {
    pub time: Time,
    pub values: IndexMap<String, FloatValue>,
}

impl RegionSums {
    pub fn get(&self, field: &str) -> CouplingResult<FloatValue> {
        self.values.get(field).copied().ok_or_else(|| {
            CouplingError::EmptyResult(format!("no aggregate of '{field}' at t={}", self.time))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotAggregator {
    pub fields: Vec<String>,
    pub resampling: Resampling,
    pub reduction: Reduction,
}

impl Default for SnapshotAggregator {
    fn default() -> Self {
        Self::new(&FLUX_FIELDS)
    }
}

impl SnapshotAggregator {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            resampling: Resampling::default(),
            reduction: Reduction::default(),
        }
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    fn snapshot_shape(snapshot: &Snapshot) -> CouplingResult<(usize, usize)> {
        snapshot.shape().ok_or_else(|| {
            CouplingError::EmptyResult(format!("snapshot at t={} has no fields", snapshot.time()))
        })
    }

    /// Reduce every configured field of `snapshot` over `mask`
    ///
    /// The mask is resampled to the snapshot's shape first.
    pub fn aggregate(
        &self,
        snapshot: &Snapshot,
        mask: &RegionMaskGrid,
    ) -> CouplingResult<RegionSums> {
        let shape = Self::snapshot_shape(snapshot)?;
        let aligned = mask.resample_to(shape, self.resampling)?;
        self.reduce(snapshot, &aligned)
    }

    /// Reduce every configured field over the whole grid
    pub fn aggregate_global(&self, snapshot: &Snapshot) -> CouplingResult<RegionSums> {
        let shape = Self::snapshot_shape(snapshot)?;
        self.reduce(snapshot, &RegionMaskGrid::filled(shape, true))
    }

    /// Aggregate a series of snapshots over one mask, one row per snapshot in time order
    pub fn aggregate_all(
        &self,
        snapshots: &[Snapshot],
        mask: &RegionMaskGrid,
    ) -> CouplingResult<Vec<RegionSums>> {
        if snapshots.is_empty() {
            return Err(CouplingError::EmptyResult(
                "no snapshots to aggregate".to_string(),
            ));
        }
        let mut rows = snapshots
            .iter()
            .map(|s| self.aggregate(s, mask))
            .collect::<CouplingResult<Vec<_>>>()?;
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(rows)
    }

    /// Aggregate one snapshot over every sector of a mask set
    pub fn aggregate_sectors(
        &self,
        snapshot: &Snapshot,
        masks: &RegionMaskSet,
    ) -> CouplingResult<BTreeMap<Sector, RegionSums>> {
        let shape = Self::snapshot_shape(snapshot)?;
        let aligned = masks.resample_to(shape, self.resampling)?;
        aligned
            .iter()
            .map(|(sector, mask)| {
                if mask.count() == 0 {
                    warn!(
                        sector = sector.name(),
                        "sector mask has no cells at the snapshot resolution"
                    );
                }
                self.reduce(snapshot, mask).map(|sums| (sector, sums))
            })
            .collect()
    }

    fn reduce(&self, snapshot: &Snapshot, mask: &RegionMaskGrid) -> CouplingResult<RegionSums> {
        if self.fields.is_empty() {
            return Err(CouplingError::EmptyResult(
                "no fields requested for aggregation".to_string(),
            ));
        }

        let mut values = IndexMap::with_capacity(self.fields.len());
        for name in &self.fields {
            let field = snapshot.field(name)?;
            if field.dim() != mask.shape() {
                return Err(CouplingError::GridMismatch {
                    context: format!("mask applied to '{name}'"),
                    expected: field.shape().to_vec(),
                    found: mask.mask().shape().to_vec(),
                });
            }

            let mut sum = 0.0;
            let mut count = 0usize;
            Zip::from(field).and(mask.mask()).for_each(|&v, &m| {
                if m && v.is_finite() {
                    sum += v;
                    count += 1;
                }
            });
            let value = match self.reduction {
                Reduction::Sum => sum,
                Reduction::Mean if count > 0 => sum / count as FloatValue,
                Reduction::Mean => {
                    return Err(CouplingError::EmptyResult(format!(
                        "no valid cells of '{name}' under the mask at t={}",
                        snapshot.time()
                    )))
                }
            };
            values.insert(name.clone(), value);
        }
        debug!(time = snapshot.time(), ?values, "aggregated snapshot");

        Ok(RegionSums {
            time: snapshot.time(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn snapshot(time: Time) -> Snapshot {
        Snapshot::new(time)
            .with_field(THICKNESS, array![[1.0, 2.0], [3.0, f64::NAN]])
            .unwrap()
            .with_field(SURFACE_SOURCE, array![[0.5, 0.5], [0.5, 0.5]])
            .unwrap()
            .with_field(BASAL_SOURCE, array![[-1.0, 0.0], [0.0, -1.0]])
            .unwrap()
    }

    #[test]
    fn field_shapes_must_agree() {
        let result = Snapshot::new(0.0)
            .with_field("a", Array2::zeros((2, 2)))
            .unwrap()
            .with_field("b", Array2::zeros((3, 2)));
        assert!(matches!(result, Err(CouplingError::GridMismatch { .. })));
    }

    #[test]
    fn sums_over_mask() {
        let mask = RegionMaskGrid::new(
            array![[true, false], [true, true]],
            Array1::zeros(2),
            Array1::zeros(2),
        )
        .unwrap();
        let sums = SnapshotAggregator::default()
            .aggregate(&snapshot(1.0), &mask)
            .unwrap();

        assert_eq!(sums.get(THICKNESS).unwrap(), 4.0);
        assert_eq!(sums.get(SURFACE_SOURCE).unwrap(), 1.5);
        assert_eq!(sums.get(BASAL_SOURCE).unwrap(), -1.0);
        assert_eq!(sums.values.keys().collect::<Vec<_>>(), FLUX_FIELDS.to_vec());
    }

    #[test]
    fn all_true_mask_equals_global_sum() {
        let mask = RegionMaskGrid::filled((2, 2), true);
        let aggregator = SnapshotAggregator::default();
        assert_eq!(
            aggregator.aggregate(&snapshot(1.0), &mask).unwrap(),
            aggregator.aggregate_global(&snapshot(1.0)).unwrap()
        );
    }

    #[test]
    fn all_false_mask_sums_to_zero() {
        let mask = RegionMaskGrid::filled((2, 2), false);
        let sums = SnapshotAggregator::default()
            .aggregate(&snapshot(1.0), &mask)
            .unwrap();
        for value in sums.values.values() {
            assert_eq!(*value, 0.0);
        }
    }

    #[test]
    fn mean_reduction() {
        let aggregator = SnapshotAggregator::new(&[THICKNESS]).with_reduction(Reduction::Mean);
        let sums = aggregator.aggregate_global(&snapshot(1.0)).unwrap();
        assert_eq!(sums.get(THICKNESS).unwrap(), 2.0);

        let empty = RegionMaskGrid::filled((2, 2), false);
        assert!(matches!(
            aggregator.aggregate(&snapshot(1.0), &empty),
            Err(CouplingError::EmptyResult(_))
        ));
    }

    #[test]
    fn fine_mask_is_resampled() {
        let mask = RegionMaskGrid::filled((16, 16), true);
        let sums = SnapshotAggregator::default()
            .aggregate(&snapshot(1.0), &mask)
            .unwrap();
        assert_eq!(sums.get(THICKNESS).unwrap(), 6.0);

        let incompatible = RegionMaskGrid::filled((5, 5), true);
        assert!(matches!(
            SnapshotAggregator::default().aggregate(&snapshot(1.0), &incompatible),
            Err(CouplingError::GridMismatch { .. })
        ));
    }

    #[test]
    fn missing_field_and_empty_requests() {
        let mask = RegionMaskGrid::filled((2, 2), true);
        let missing = SnapshotAggregator::new(&["velocity"]);
        assert!(matches!(
            missing.aggregate(&snapshot(1.0), &mask),
            Err(CouplingError::Configuration(_))
        ));

        let nothing = SnapshotAggregator::new(&[]);
        assert!(matches!(
            nothing.aggregate(&snapshot(1.0), &mask),
            Err(CouplingError::EmptyResult(_))
        ));
        assert!(matches!(
            SnapshotAggregator::default().aggregate_all(&[], &mask),
            Err(CouplingError::EmptyResult(_))
        ));
    }

    #[test]
    fn aggregate_all_sorts_by_time() {
        let mask = RegionMaskGrid::filled((2, 2), true);
        let rows = SnapshotAggregator::default()
            .aggregate_all(&[snapshot(3.0), snapshot(1.0), snapshot(2.0)], &mask)
            .unwrap();
        let times: Vec<Time> = rows.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }
}
