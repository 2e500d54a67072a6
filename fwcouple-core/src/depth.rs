//! Vertical layer selection
//!
//! The ocean temperature is averaged over a depth window around the ice-shelf base. The
//! [`DepthBandSelector`] finds the model layers overlapping that window and weights each by
//! the thickness of its overlap, so partially covered layers contribute proportionally.
//!
//! Depths are in metres, positive down.

use crate::errors::{CouplingError, CouplingResult};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Largest gap or overlap tolerated between consecutive layers (m)
const CONTIGUITY_TOLERANCE: f64 = 1e-3;

/// Upper and lower bound of every ocean layer, from the surface down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthBounds {
    layers: Vec<(f64, f64)>,
}

impl DepthBounds {
    /// Validate and wrap a list of `(top, bottom)` pairs
    ///
    /// The layers must be finite, have `top <= bottom`, and tile the column without gaps.
    pub fn new(layers: Vec<(f64, f64)>) -> CouplingResult<Self> {
        if layers.is_empty() {
            return Err(CouplingError::Configuration(
                "depth bounds contain no layers".to_string(),
            ));
        }
        for (i, (top, bottom)) in layers.iter().enumerate() {
            if !top.is_finite() || !bottom.is_finite() || top > bottom {
                return Err(CouplingError::Configuration(format!(
                    "layer {i} has invalid bounds [{top}, {bottom}]"
                )));
            }
        }
        for (i, pair) in layers.windows(2).enumerate() {
            let (_, upper_bottom) = pair[0];
            let (lower_top, _) = pair[1];
            if (lower_top - upper_bottom).abs() > CONTIGUITY_TOLERANCE {
                return Err(CouplingError::Configuration(format!(
                    "layers {i} and {} are not contiguous ({upper_bottom} m vs {lower_top} m)",
                    i + 1
                )));
            }
        }
        Ok(Self { layers })
    }

    /// Read bounds stored as a `(level, 2)` array
    pub fn from_array(bounds: ArrayView2<f64>) -> CouplingResult<Self> {
        if bounds.ncols() != 2 {
            return Err(CouplingError::GridMismatch {
                context: "depth bounds".to_string(),
                expected: vec![bounds.nrows(), 2],
                found: bounds.shape().to_vec(),
            });
        }
        Self::new(bounds.rows().into_iter().map(|r| (r[0], r[1])).collect())
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[(f64, f64)] {
        &self.layers
    }

    /// Depth of the top of the first layer
    pub fn top(&self) -> f64 {
        self.layers.first().map_or(f64::NAN, |l| l.0)
    }

    /// Depth of the bottom of the last layer
    pub fn bottom(&self) -> f64 {
        self.layers.last().map_or(f64::NAN, |l| l.1)
    }
}

/// Target depth range `[top, bottom]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthWindow {
    pub top: f64,
    pub bottom: f64,
}

impl DepthWindow {
    pub fn new(top: f64, bottom: f64) -> CouplingResult<Self> {
        if !top.is_finite() || !bottom.is_finite() || top >= bottom {
            return Err(CouplingError::Configuration(format!(
                "invalid depth window [{top}, {bottom}]"
            )));
        }
        Ok(Self { top, bottom })
    }

    /// Window of `centre ± half_width`
    pub fn centred(centre: f64, half_width: f64) -> CouplingResult<Self> {
        Self::new(centre - half_width, centre + half_width)
    }

    pub fn thickness(&self) -> f64 {
        self.bottom - self.top
    }
}

/// A contiguous run of layers with their overlap thickness
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBand {
    /// Index of the first (shallowest) layer in the band
    pub start: usize,
    /// One weight per layer, starting at `start`
    pub weights: Vec<f64>,
}

impl DepthBand {
    /// Index of the last layer in the band (inclusive)
    pub fn end(&self) -> usize {
        self.start + self.weights.len() - 1
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.weights.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBandSelector {
    /// Tolerance when comparing layer bounds to the window edges (m)
    pub epsilon: f64,
}

impl Default for DepthBandSelector {
    fn default() -> Self {
        Self { epsilon: 1e-6 }
    }
}

impl DepthBandSelector {
    /// Find the layers overlapping `window`
    ///
    /// The deepest layer is the first whose lower bound reaches below the window bottom, the
    /// shallowest the last whose upper bound lies above the window top. Bounds are clipped
    /// to the window and each layer is weighted by its clipped thickness.
    ///
    /// # Errors
    ///
    /// [`CouplingError::DepthRange`] if the window is not covered by the layers.
    pub fn select(&self, bounds: &DepthBounds, window: &DepthWindow) -> CouplingResult<DepthBand> {
        let layers = bounds.layers();
        let out_of_range = || CouplingError::DepthRange {
            top: window.top,
            bottom: window.bottom,
            available_top: bounds.top(),
            available_bottom: bounds.bottom(),
        };

        let bottom_index = layers
            .iter()
            .position(|(_, bottom)| *bottom > window.bottom - self.epsilon)
            .ok_or_else(out_of_range)?;
        let top_index = layers
            .iter()
            .rposition(|(top, _)| *top < window.top + self.epsilon)
            .ok_or_else(out_of_range)?;
        if top_index > bottom_index {
            return Err(out_of_range());
        }

        let weights = layers[top_index..=bottom_index]
            .iter()
            .map(|(top, bottom)| {
                let top = top.clamp(window.top, window.bottom);
                let bottom = bottom.clamp(window.top, window.bottom);
                bottom - top
            })
            .collect();

        Ok(DepthBand {
            start: top_index,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn bounds() -> DepthBounds {
        DepthBounds::new(vec![
            (0.0, 100.0),
            (100.0, 250.0),
            (250.0, 400.0),
            (400.0, 600.0),
            (600.0, 1000.0),
        ])
        .unwrap()
    }

    #[test]
    fn bounds_validation() {
        assert!(DepthBounds::new(vec![]).is_err());
        assert!(DepthBounds::new(vec![(10.0, 0.0)]).is_err());
        assert!(DepthBounds::new(vec![(0.0, 10.0), (20.0, 30.0)]).is_err());
        assert!(DepthBounds::new(vec![(0.0, f64::NAN)]).is_err());
        assert_eq!(bounds().len(), 5);
        assert_eq!(bounds().bottom(), 1000.0);
    }

    #[test]
    fn bounds_from_array() {
        let parsed = DepthBounds::from_array(array![[0.0, 10.0], [10.0, 25.0]].view()).unwrap();
        assert_eq!(parsed.layers(), &[(0.0, 10.0), (10.0, 25.0)]);
        assert!(DepthBounds::from_array(array![[0.0, 10.0, 20.0]].view()).is_err());
    }

    #[test]
    fn window_inside_levels() {
        let window = DepthWindow::centred(369.0, 50.0).unwrap();
        let band = DepthBandSelector::default()
            .select(&bounds(), &window)
            .unwrap();

        assert_eq!(band.start, 2);
        assert_eq!(band.end(), 3);
        assert_relative_eq!(band.weights[0], 81.0);
        assert_relative_eq!(band.weights[1], 19.0);
        assert_relative_eq!(band.total_weight(), window.thickness());
    }

    #[test]
    fn window_within_one_layer() {
        let window = DepthWindow::new(620.0, 700.0).unwrap();
        let band = DepthBandSelector::default()
            .select(&bounds(), &window)
            .unwrap();
        assert_eq!(band.indices(), 4..5);
        assert_relative_eq!(band.total_weight(), 80.0);
    }

    #[test]
    fn window_aligned_with_layer_edges() {
        let window = DepthWindow::new(100.0, 400.0).unwrap();
        let band = DepthBandSelector::default()
            .select(&bounds(), &window)
            .unwrap();
        assert_eq!(band.indices(), 1..3);
        assert_eq!(band.weights, vec![150.0, 150.0]);
    }

    #[test]
    fn window_at_surface() {
        let window = DepthWindow::new(0.0, 50.0).unwrap();
        let band = DepthBandSelector::default()
            .select(&bounds(), &window)
            .unwrap();
        assert_eq!(band.start, 0);
        assert_relative_eq!(band.total_weight(), 50.0);
    }

    #[test]
    fn window_below_levels() {
        let window = DepthWindow::new(900.0, 1100.0).unwrap();
        let err = DepthBandSelector::default()
            .select(&bounds(), &window)
            .unwrap_err();
        assert!(matches!(
            err,
            CouplingError::DepthRange {
                available_bottom, ..
            } if available_bottom == 1000.0
        ));
    }

    #[test]
    fn window_above_levels() {
        let shallow = DepthBounds::new(vec![(10.0, 20.0), (20.0, 30.0)]).unwrap();
        let window = DepthWindow::new(0.0, 15.0).unwrap();
        assert!(DepthBandSelector::default()
            .select(&shallow, &window)
            .is_err());
    }

    #[test]
    fn invalid_window() {
        assert!(DepthWindow::new(100.0, 100.0).is_err());
        assert!(DepthWindow::centred(100.0, -5.0).is_err());
    }
}
