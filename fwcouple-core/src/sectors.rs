//! Antarctic drainage sectors
//!
//! This module defines the five sectors the coupling works in and their static geometry:
//!
//! - [`Sector::Eais`]: East Antarctic Ice Sheet
//! - [`Sector::Wedd`]: Weddell Sea
//! - [`Sector::Amun`]: Amundsen Sea
//! - [`Sector::Ross`]: Ross Sea
//! - [`Sector::Apen`]: Antarctic Peninsula
//!
//! Each sector is described by one or more latitude/longitude boxes and by the depth of
//! the ice-shelf base the ocean temperature is sampled around.
//!
//! # Examples
//!
//! ```rust
//! use fwcouple_core::sectors::Sector;
//!
//! let ross = Sector::Ross.definition();
//! assert_eq!(ross.shelf_depth, 312.0);
//! assert!(ross.contains(-80.0, 180.0));
//! assert!(!ross.contains(-80.0, 250.0));
//! ```

use crate::errors::CouplingError;
use crate::grid::GeoCoordinates;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Antarctic drainage sector
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    /// East Antarctic Ice Sheet
    Eais = 0,
    /// Weddell Sea
    Wedd = 1,
    /// Amundsen Sea
    Amun = 2,
    /// Ross Sea
    Ross = 3,
    /// Antarctic Peninsula
    Apen = 4,
}

impl From<Sector> for usize {
    fn from(s: Sector) -> usize {
        s as usize
    }
}

impl Sector {
    pub const ALL: [Sector; 5] = [
        Sector::Eais,
        Sector::Wedd,
        Sector::Amun,
        Sector::Ross,
        Sector::Apen,
    ];

    /// Short identifier used in configuration files and output tables
    pub fn name(&self) -> &'static str {
        match self {
            Sector::Eais => "eais",
            Sector::Wedd => "wedd",
            Sector::Amun => "amun",
            Sector::Ross => "ross",
            Sector::Apen => "apen",
        }
    }

    pub fn definition(&self) -> &'static SectorDefinition {
        &SECTOR_DEFINITIONS[*self as usize]
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sector {
    type Err = CouplingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sector::ALL
            .iter()
            .find(|sector| sector.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| CouplingError::Configuration(format!("unknown sector '{s}'")))
    }
}

/// Latitude/longitude box in degrees, longitude in [0, 360)
///
/// Containment is strict on every edge: a point lying exactly on a boundary is outside.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub const fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let lon = normalise_longitude(lon);
        lat > self.lat_min && lat < self.lat_max && lon > self.lon_min && lon < self.lon_max
    }
}

/// Static geometry of one sector
#[derive(Clone, Debug, PartialEq)]
pub struct SectorDefinition {
    pub sector: Sector,
    /// A point belongs to the sector if it is inside any of these boxes
    pub boxes: &'static [BoundingBox],
    /// Reference depth of the ice-shelf base (m, positive down)
    pub shelf_depth: f64,
}

impl SectorDefinition {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.boxes.iter().any(|b| b.contains(lat, lon))
    }
}

// The second East Antarctic box closes the gap between 350E and the meridian.
static SECTOR_DEFINITIONS: [SectorDefinition; 5] = [
    SectorDefinition {
        sector: Sector::Eais,
        boxes: &[
            BoundingBox::new(-76.0, -65.0, 0.0, 173.0),
            BoundingBox::new(-76.0, -65.0, 350.0, 360.0),
        ],
        shelf_depth: 369.0,
    },
    SectorDefinition {
        sector: Sector::Wedd,
        boxes: &[BoundingBox::new(-90.0, -72.0, 295.0, 350.0)],
        shelf_depth: 420.0,
    },
    SectorDefinition {
        sector: Sector::Amun,
        boxes: &[BoundingBox::new(-90.0, -70.0, 210.0, 295.0)],
        shelf_depth: 305.0,
    },
    SectorDefinition {
        sector: Sector::Ross,
        boxes: &[BoundingBox::new(-90.0, -76.0, 150.0, 210.0)],
        shelf_depth: 312.0,
    },
    SectorDefinition {
        sector: Sector::Apen,
        boxes: &[
            BoundingBox::new(-70.0, -65.0, 294.0, 310.0),
            BoundingBox::new(-75.0, -70.0, 285.0, 295.0),
        ],
        shelf_depth: 420.0,
    },
];

/// Map a longitude in degrees onto [0, 360)
pub fn normalise_longitude(lon: f64) -> f64 {
    lon.rem_euclid(360.0)
}

/// Boolean mask of the cells whose centre lies inside `sector`
pub fn mask_for(sector: Sector, coordinates: &GeoCoordinates) -> Array2<bool> {
    let definition = sector.definition();
    let mut mask = Array2::from_elem(coordinates.shape(), false);
    Zip::from(&mut mask)
        .and(coordinates.latitude())
        .and(coordinates.longitude())
        .for_each(|m, &lat, &lon| *m = definition.contains(lat, lon));
    mask
}

/// Masks of all five sectors on the same coordinates
pub fn sector_masks(coordinates: &GeoCoordinates) -> BTreeMap<Sector, Array2<bool>> {
    Sector::ALL
        .iter()
        .map(|s| (*s, mask_for(*s, coordinates)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sector_names_round_trip() {
        for sector in Sector::ALL {
            assert_eq!(sector.name().parse::<Sector>().unwrap(), sector);
        }
        assert_eq!("ROSS".parse::<Sector>().unwrap(), Sector::Ross);
        assert!("anta".parse::<Sector>().is_err());
    }

    #[test]
    fn definitions_are_indexed_by_sector() {
        for sector in Sector::ALL {
            assert_eq!(sector.definition().sector, sector);
        }
    }

    #[test]
    fn shelf_depths() {
        assert_eq!(Sector::Eais.definition().shelf_depth, 369.0);
        assert_eq!(Sector::Wedd.definition().shelf_depth, 420.0);
        assert_eq!(Sector::Amun.definition().shelf_depth, 305.0);
        assert_eq!(Sector::Ross.definition().shelf_depth, 312.0);
        assert_eq!(Sector::Apen.definition().shelf_depth, 420.0);
    }

    #[test]
    fn boundary_points_are_excluded() {
        let ross = Sector::Ross.definition();
        assert!(ross.contains(-80.0, 151.0));
        assert!(!ross.contains(-80.0, 150.0));
        assert!(!ross.contains(-76.0, 180.0));
        // Shared edge between Ross and Amundsen belongs to neither
        assert!(!Sector::Amun.definition().contains(-80.0, 210.0));
    }

    #[test]
    fn negative_longitudes_are_normalised() {
        // -20E is 340E, inside the Weddell box
        assert!(Sector::Wedd.definition().contains(-75.0, -20.0));
        assert_eq!(normalise_longitude(-10.0), 350.0);
        assert_eq!(normalise_longitude(360.0), 0.0);
    }

    #[test]
    fn multi_box_sectors_are_unions() {
        let eais = Sector::Eais.definition();
        assert!(eais.contains(-70.0, 100.0));
        assert!(eais.contains(-70.0, 355.0));
        let apen = Sector::Apen.definition();
        assert!(apen.contains(-67.0, 300.0));
        assert!(apen.contains(-72.0, 290.0));
        assert!(!apen.contains(-72.0, 300.0));
    }

    #[test]
    fn mask_for_grid() {
        let coordinates = GeoCoordinates::new(
            array![[-80.0, -80.0], [-70.0, -70.0]],
            array![[180.0, 250.0], [100.0, 300.0]],
        )
        .unwrap();

        assert_eq!(
            mask_for(Sector::Ross, &coordinates),
            array![[true, false], [false, false]]
        );
        assert_eq!(
            mask_for(Sector::Amun, &coordinates),
            array![[false, true], [false, false]]
        );
        assert_eq!(
            mask_for(Sector::Eais, &coordinates),
            array![[false, false], [true, false]]
        );

        let masks = sector_masks(&coordinates);
        assert_eq!(masks.len(), 5);
    }
}
