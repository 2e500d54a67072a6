//! Conversions between [`Dataset`]s and the coupling types
//!
//! Readers check dimensionality and shapes and report the offending file; the arithmetic
//! types in `fwcouple_core` never see a raw dataset.

use super::{time, Dataset};
use crate::errors::{Error, Result};
use fwcouple_core::depth::DepthBounds;
use fwcouple_core::errors::CouplingError;
use fwcouple_core::forcing::{ForcingDataset, ForcingField};
use fwcouple_core::grid::{GeoCoordinates, RegionMaskGrid};
use fwcouple_core::ocean::OceanTemperature;
use fwcouple_core::parameters::ForcingParameters;
use fwcouple_core::snapshot::Snapshot;
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};

pub const NAV_LAT: &str = "nav_lat";
pub const NAV_LON: &str = "nav_lon";

/// Variable names of an ocean temperature file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OceanVariableNames {
    pub temperature: String,
    /// Level bounds `(level, 2)` in metres, positive down
    pub level_bounds: String,
    pub latitude: String,
    pub longitude: String,
    pub time: String,
    pub cell_area: String,
}

impl Default for OceanVariableNames {
    fn default() -> Self {
        Self {
            temperature: "thetao".to_string(),
            level_bounds: "lev_bnds".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            time: "time".to_string(),
            cell_area: "areacello".to_string(),
        }
    }
}

/// Read the first time slice of a flattened ice-sheet file
///
/// Each field may be `(time, y, x)` or `(y, x)`. The snapshot time is the first value of the
/// time coordinate.
///
/// # Errors
///
/// [`CouplingError::EmptyOutput`] if the file has no (or an empty) time dimension, which is
/// how a failed flatten run shows up.
pub fn snapshot(dataset: &Dataset, time_dimension: &str, fields: &[&str]) -> Result<Snapshot> {
    let empty = || {
        Error::from(CouplingError::EmptyOutput(format!(
            "{} has no '{time_dimension}' records",
            dataset.path.display()
        )))
    };
    match dataset.dimension_len(time_dimension) {
        Some(len) if len > 0 => {}
        _ => return Err(empty()),
    }
    let time = dataset
        .array_dyn(time_dimension)?
        .iter()
        .next()
        .copied()
        .ok_or_else(empty)?;

    let mut snapshot = Snapshot::new(time);
    for name in fields {
        let data = dataset.array_dyn(name)?;
        let field = match data.ndim() {
            2 => data.view().into_dimensionality::<Ix2>().map(|v| v.to_owned()),
            3 => data
                .view()
                .into_dimensionality::<Ix3>()
                .map(|v| v.index_axis(Axis(0), 0).to_owned()),
            n => {
                return Err(CouplingError::Configuration(format!(
                    "field '{name}' in {} has {n} dimensions",
                    dataset.path.display()
                ))
                .into())
            }
        }
        .map_err(|e| CouplingError::Configuration(format!("field '{name}': {e}")))?;
        snapshot = snapshot.with_field(name, field)?;
    }
    Ok(snapshot)
}

/// Read a region mask with its `x`/`y` axes
///
/// Masks stored as `(x, y)` are transposed to `(y, x)`.
pub fn region_mask(dataset: &Dataset, variable: &str) -> Result<RegionMaskGrid> {
    let x = dataset.array1("x")?;
    let y = dataset.array1("y")?;
    let values = dataset.array2(variable)?;
    let dims = &dataset.variable(variable)?.dimensions;
    let values = if dims.len() == 2 && dims[0] == "x" && dims[1] == "y" {
        values.reversed_axes()
    } else {
        values
    };
    Ok(RegionMaskGrid::from_values(values.view(), x, y)?)
}

/// Write a region mask or a painted field on the ice-sheet grid as `(y, x)`
pub fn grid_field(values: &Array2<f64>, grid: &RegionMaskGrid, variable: &str) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    dataset.add_dimension("y", grid.y().len())?;
    dataset.add_dimension("x", grid.x().len())?;
    dataset.add_variable("x", &["x"], grid.x().clone())?;
    dataset.add_variable("y", &["y"], grid.y().clone())?;
    dataset.add_variable(variable, &["y", "x"], values.clone())?;
    Ok(dataset)
}

fn coordinates(dataset: &Dataset, latitude: &str, longitude: &str) -> Result<GeoCoordinates> {
    let lat = dataset.array_dyn(latitude)?;
    let lon = dataset.array_dyn(longitude)?;
    if lat.ndim() == 1 && lon.ndim() == 1 {
        return Ok(GeoCoordinates::from_axes(
            &dataset.array1(latitude)?,
            &dataset.array1(longitude)?,
        ));
    }
    Ok(GeoCoordinates::new(
        dataset.array2(latitude)?,
        dataset.array2(longitude)?,
    )?)
}

fn decode_time(dataset: &Dataset, name: &str) -> Result<Vec<chrono::NaiveDateTime>> {
    let variable = dataset.variable(name)?;
    let units = variable.attribute("units").ok_or_else(|| {
        Error::Time(format!(
            "'{name}' in {} has no units",
            dataset.path.display()
        ))
    })?;
    let calendar = variable.attribute("calendar").unwrap_or("standard");
    let values: Vec<f64> = variable.data.iter().copied().collect();
    time::decode(&values, units, calendar)
}

/// Read `(time, level, j, i)` potential temperature with its grid
///
/// The cell area is attached when the file carries it.
pub fn ocean_temperature(dataset: &Dataset, names: &OceanVariableNames) -> Result<OceanTemperature> {
    let times = decode_time(dataset, &names.time)?;
    let bounds = DepthBounds::from_array(dataset.array2(&names.level_bounds)?.view())?;
    let coordinates = coordinates(dataset, &names.latitude, &names.longitude)?;
    let ocean = OceanTemperature::new(
        times,
        dataset.array4(&names.temperature)?,
        bounds,
        coordinates,
    )?;
    if dataset.has_variable(&names.cell_area) {
        return Ok(ocean.with_cell_area(cell_area(dataset, &names.cell_area)?)?);
    }
    Ok(ocean)
}

/// Read a 2D cell area field (m2)
pub fn cell_area(dataset: &Dataset, variable: &str) -> Result<Array2<f64>> {
    dataset.array2(variable)
}

/// Read a distribution mask: cells with a finite positive value receive flux
pub fn distribution_mask(dataset: &Dataset, variable: &str) -> Result<Array2<bool>> {
    let values = dataset.array_dyn(variable)?;
    let field = match values.ndim() {
        2 => dataset.array2(variable)?,
        // Climatological runoff files carry a time axis; any month marks the cell
        3 => dataset
            .array3(variable)?
            .fold_axis(Axis(0), 0.0_f64, |acc, v| if v.is_finite() { acc.max(*v) } else { *acc }),
        n => {
            return Err(CouplingError::Configuration(format!(
                "distribution mask '{variable}' has {n} dimensions"
            ))
            .into())
        }
    };
    Ok(field.mapv(|v| v.is_finite() && v > 0.0))
}

/// Encode a forcing dataset with a CF time coordinate
pub fn forcing_to_dataset(
    forcing: &ForcingDataset,
    parameters: &ForcingParameters,
) -> Result<Dataset> {
    let time_dim = forcing.time_dimension.as_str();
    let mut dataset = Dataset::new();
    dataset.add_dimension(time_dim, forcing.time.len())?;

    let encoded = time::encode(&forcing.time, &parameters.time_units, &parameters.calendar)?;
    dataset
        .add_variable(time_dim, &[time_dim], Array1::from(encoded))?
        .attributes
        .extend([
            ("units".to_string(), parameters.time_units.clone()),
            ("calendar".to_string(), parameters.calendar.clone()),
        ]);

    for (name, field) in &forcing.variables {
        let (_, ny, nx) = field.data.dim();
        dataset.add_dimension("y", ny)?;
        dataset.add_dimension("x", nx)?;
        dataset
            .add_variable(name, &[time_dim, "y", "x"], field.data.clone())?
            .attributes
            .extend([
                ("units".to_string(), field.units.clone()),
                ("long_name".to_string(), field.long_name.clone()),
            ]);
    }

    if let Some(coordinates) = &forcing.coordinates {
        let (ny, nx) = coordinates.shape();
        dataset.add_dimension("y", ny)?;
        dataset.add_dimension("x", nx)?;
        dataset.add_variable(NAV_LAT, &["y", "x"], coordinates.latitude().clone())?;
        dataset.add_variable(NAV_LON, &["y", "x"], coordinates.longitude().clone())?;
    }
    dataset
        .attributes
        .insert("title".to_string(), "Antarctic freshwater forcing".to_string());
    Ok(dataset)
}

/// Decode a forcing dataset written by [`forcing_to_dataset`]
pub fn forcing_from_dataset(
    dataset: &Dataset,
    parameters: &ForcingParameters,
) -> Result<ForcingDataset> {
    let time_dim = parameters.time_dimension.as_str();
    let time = decode_time(dataset, time_dim)?;

    let mut variables = IndexMap::new();
    for (name, variable) in &dataset.variables {
        if name == time_dim || variable.dimensions.first().map(String::as_str) != Some(time_dim) {
            continue;
        }
        variables.insert(
            name.clone(),
            ForcingField {
                long_name: variable.attribute("long_name").unwrap_or_default().to_string(),
                units: variable.attribute("units").unwrap_or_default().to_string(),
                data: dataset.array3(name)?,
            },
        );
    }

    let forcing = ForcingDataset {
        time_dimension: time_dim.to_string(),
        time,
        variables,
        coordinates: None,
    };
    if dataset.has_variable(NAV_LAT) && dataset.has_variable(NAV_LON) {
        return Ok(forcing.with_coordinates(coordinates(dataset, NAV_LAT, NAV_LON)?)?);
    }
    Ok(forcing)
}
