//! Conservation properties of the coupling arithmetic.
//!
//! - sector masks partition the whole-continent mask
//! - depth band weights add up to the window thickness
//! - distributed forcing integrates back to the discharge total

use approx::assert_relative_eq;
use fwcouple_core::depth::{DepthBandSelector, DepthBounds, DepthWindow};
use fwcouple_core::forcing::ForcingDistributor;
use fwcouple_core::grid::{GeoCoordinates, RegionMaskGrid};
use fwcouple_core::masks::RegionMaskSet;
use fwcouple_core::parameters::ForcingParameters;
use fwcouple_core::sectors::Sector;
use fwcouple_core::snapshot::{Snapshot, SnapshotAggregator, THICKNESS};
use ndarray::{Array1, Array2};

mod mask_partition {
    use super::*;

    fn masks_on(latitude: Array1<f64>, longitude: Array1<f64>) -> RegionMaskSet {
        let coordinates = GeoCoordinates::from_axes(&latitude, &longitude);
        let x = Array1::range(0.0, longitude.len() as f64, 1.0);
        let y = Array1::range(0.0, latitude.len() as f64, 1.0);
        RegionMaskSet::from_coordinates(&coordinates, x, y).unwrap()
    }

    fn continent() -> RegionMaskSet {
        masks_on(Array1::range(-88.0, -60.0, 2.0), Array1::range(0.0, 360.0, 15.0))
    }

    /// One-degree grid with cell centres on half degrees, crossing every box overlap
    fn one_degree() -> RegionMaskSet {
        masks_on(Array1::range(-89.5, -60.0, 1.0), Array1::range(0.5, 360.0, 1.0))
    }

    fn sector_and_continent_sums(masks: &RegionMaskSet) -> (f64, f64) {
        let thickness = Array2::from_shape_fn(masks.shape(), |(j, i)| (j * 7 + i * 3) as f64 + 0.25);
        let snapshot = Snapshot::new(0.0)
            .with_field(THICKNESS, thickness)
            .unwrap();
        let aggregator = SnapshotAggregator::new(&[THICKNESS]);

        let sector_total: f64 = aggregator
            .aggregate_sectors(&snapshot, masks)
            .unwrap()
            .values()
            .map(|sums| sums.get(THICKNESS).unwrap())
            .sum();
        let continent_total = aggregator
            .aggregate(&snapshot, masks.antarctica().unwrap())
            .unwrap()
            .get(THICKNESS)
            .unwrap();
        (sector_total, continent_total)
    }

    #[test]
    fn test_every_sector_is_populated() {
        let masks = continent();
        for (sector, mask) in masks.iter() {
            assert!(mask.count() > 0, "{sector} has no cells");
        }
    }

    #[test]
    fn test_sector_counts_add_up_to_continent() {
        let masks = continent();
        let sector_cells: usize = masks.iter().map(|(_, m)| m.count()).sum();
        assert_eq!(sector_cells, masks.antarctica().unwrap().count());
    }

    #[test]
    fn test_sector_sums_add_up_to_continent_sum() {
        let (sector_total, continent_total) = sector_and_continent_sums(&continent());
        assert_relative_eq!(sector_total, continent_total, max_relative = 1e-12);
    }

    #[test]
    fn test_one_degree_masks_partition_the_continent() {
        let masks = one_degree();
        let sector_cells: usize = masks.iter().map(|(_, m)| m.count()).sum();
        assert_eq!(sector_cells, masks.antarctica().unwrap().count());

        let (sector_total, continent_total) = sector_and_continent_sums(&masks);
        assert_relative_eq!(sector_total, continent_total, max_relative = 1e-12);
    }

    #[test]
    fn test_overlapping_boxes_belong_to_one_sector() {
        // 72.5S 290E lies in both the Amundsen box and the southern Peninsula box
        let coordinates =
            GeoCoordinates::from_axes(&Array1::from(vec![-72.5]), &Array1::from(vec![290.0]));
        let masks = RegionMaskSet::from_coordinates(
            &coordinates,
            Array1::from(vec![0.0]),
            Array1::from(vec![0.0]),
        )
        .unwrap();
        assert!(masks.get(Sector::Amun).mask()[(0, 0)]);
        assert!(!masks.get(Sector::Apen).mask()[(0, 0)]);

        let values = Sector::ALL
            .iter()
            .map(|s| (*s, usize::from(*s) as f64))
            .collect();
        let painted = masks.paint(&values).unwrap();
        assert_eq!(painted[(0, 0)], usize::from(Sector::Amun) as f64);
    }
}

mod depth_weights {
    use super::*;

    #[test]
    fn test_weights_sum_to_window_thickness() {
        let edges = [0.0, 10.0, 25.0, 50.0, 100.0, 180.0, 300.0, 450.0, 650.0, 900.0, 1200.0];
        let bounds = DepthBounds::new(edges.windows(2).map(|w| (w[0], w[1])).collect()).unwrap();
        let selector = DepthBandSelector::default();

        for (top, bottom) in [
            (0.0, 5.0),
            (3.0, 1199.0),
            (262.0, 362.0),
            (319.0, 419.0),
            (370.0, 470.0),
            (800.0, 1000.0),
            (400.0, 700.0),
            (100.0, 180.0),
        ] {
            let window = DepthWindow::new(top, bottom).unwrap();
            let band = selector.select(&bounds, &window).unwrap();
            assert_relative_eq!(band.total_weight(), bottom - top, max_relative = 1e-12);
            assert!(band.weights.iter().all(|w| *w >= 0.0));
        }
    }
}

mod forcing_mass {
    use super::*;

    #[test]
    fn test_distributed_flux_integrates_to_total() {
        let area = Array2::from_shape_fn((6, 8), |(j, _)| 1.0e8 * (1.0 + j as f64));
        let distributor = ForcingDistributor::new(ForcingParameters::default(), area.clone()).unwrap();
        let mask = Array2::from_shape_fn((6, 8), |(j, i)| j < 2 && i % 3 == 0);

        let total = 123.4;
        let field = distributor.distribute(total, &mask).unwrap();

        let params = distributor.parameters();
        let integrated = (&field * &area).sum() * params.seconds_per_year / params.kg_per_gigatonne;
        assert_relative_eq!(integrated, total, max_relative = 1e-12);
    }

    #[test]
    fn test_zero_flux_gives_exact_zeros() {
        let mut area = Array2::from_elem((3, 3), 1.0e6);
        area[(2, 2)] = f64::NAN;
        let distributor = ForcingDistributor::new(ForcingParameters::default(), area).unwrap();
        let mask = Array2::from_shape_fn((3, 3), |(j, _)| j == 0);

        let field = distributor.distribute(0.0, &mask).unwrap();
        assert!(field.iter().all(|v| *v == 0.0 && !v.is_nan()));
    }

    #[test]
    fn test_region_mask_grid_counts_survive_resampling() {
        let fine = RegionMaskGrid::filled((32, 32), true);
        let coarse = fine
            .resample_to((4, 4), fwcouple_core::grid::Resampling::Majority)
            .unwrap();
        assert_eq!(coarse.count(), 16);
    }
}
