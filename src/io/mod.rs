//! Gridded dataset files
//!
//! Every file the coupling step reads or writes goes through the in-memory [`Dataset`]:
//! named dimensions, `f64` variables with their dimension names and string attributes,
//! and global attributes. The on-disk format is chosen from the file extension:
//!
//! - `.json`: always available, used for small grids and tests
//! - `.nc`: NetCDF, needs the `netcdf` feature
//!
//! Domain conversions to and from the core types live in [`convert`].

pub mod convert;
mod json;
#[cfg(feature = "netcdf")]
mod nc;
pub mod tables;
pub mod time;

use crate::errors::{Error, Result};
use fwcouple_core::errors::CouplingError;
use indexmap::IndexMap;
use ndarray::{Array1, Array2, Array3, Array4, ArrayD, Dimension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the attribute holding the missing-value marker
pub const FILL_VALUE: &str = "_FillValue";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub dimensions: Vec<String>,
    pub data: ArrayD<f64>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

impl Variable {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// File the dataset was read from, used in error messages
    #[serde(skip)]
    pub path: PathBuf,
    pub dimensions: IndexMap<String, usize>,
    pub variables: IndexMap<String, Variable>,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a dimension; redeclaring it with another length is an error
    pub fn add_dimension(&mut self, name: &str, len: usize) -> Result<()> {
        match self.dimensions.get(name) {
            Some(existing) if *existing != len => Err(CouplingError::GridMismatch {
                context: format!("dimension '{name}'"),
                expected: vec![*existing],
                found: vec![len],
            }
            .into()),
            _ => {
                self.dimensions.insert(name.to_string(), len);
                Ok(())
            }
        }
    }

    /// Add a variable over existing dimensions
    pub fn add_variable<D: Dimension>(
        &mut self,
        name: &str,
        dimensions: &[&str],
        data: ndarray::Array<f64, D>,
    ) -> Result<&mut Variable> {
        let expected = dimensions
            .iter()
            .map(|d| {
                self.dimensions.get(*d).copied().ok_or_else(|| {
                    CouplingError::Configuration(format!(
                        "variable '{name}' uses undeclared dimension '{d}'"
                    ))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if data.shape() != expected.as_slice() {
            return Err(CouplingError::GridMismatch {
                context: format!("variable '{name}'"),
                expected,
                found: data.shape().to_vec(),
            }
            .into());
        }
        self.variables.insert(
            name.to_string(),
            Variable {
                dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
                data: data.into_dyn(),
                attributes: IndexMap::new(),
            },
        );
        Ok(&mut self.variables[name])
    }

    pub fn dimension_len(&self, name: &str) -> Option<usize> {
        self.dimensions.get(name).copied()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::MissingVariable {
                path: self.path.clone(),
                name: name.to_string(),
            })
    }

    fn array<D: Dimension>(&self, name: &str) -> Result<ndarray::Array<f64, D>> {
        let variable = self.variable(name)?;
        let ndim = variable.data.ndim();
        variable
            .data
            .clone()
            .into_dimensionality::<D>()
            .map_err(|_| {
                CouplingError::Configuration(format!(
                    "variable '{name}' in {} has {ndim} dimensions, expected {}",
                    self.path.display(),
                    D::NDIM.unwrap_or(ndim)
                ))
                .into()
            })
    }

    pub fn array1(&self, name: &str) -> Result<Array1<f64>> {
        self.array(name)
    }

    pub fn array2(&self, name: &str) -> Result<Array2<f64>> {
        self.array(name)
    }

    pub fn array3(&self, name: &str) -> Result<Array3<f64>> {
        self.array(name)
    }

    pub fn array4(&self, name: &str) -> Result<Array4<f64>> {
        self.array(name)
    }

    /// Raw n-dimensional data of a variable
    pub fn array_dyn(&self, name: &str) -> Result<&ArrayD<f64>> {
        Ok(&self.variable(name)?.data)
    }
}

enum Format {
    Json,
    NetCdf,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("nc") | Some("nc4") => Ok(Format::NetCdf),
        _ => Err(CouplingError::Configuration(format!(
            "unsupported dataset format: {}",
            path.display()
        ))
        .into()),
    }
}

/// Read a dataset, choosing the backend from the extension
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    debug!(path = %path.display(), "reading dataset");
    let mut dataset = match format_of(path)? {
        Format::Json => json::read(path)?,
        #[cfg(feature = "netcdf")]
        Format::NetCdf => nc::read(path)?,
        #[cfg(not(feature = "netcdf"))]
        Format::NetCdf => return Err(Error::NetCdfUnavailable(path.to_path_buf())),
    };
    dataset.path = path.to_path_buf();
    Ok(dataset)
}

/// Write a dataset, choosing the backend from the extension
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    debug!(path = %path.display(), "writing dataset");
    match format_of(path)? {
        Format::Json => json::write(path, dataset),
        #[cfg(feature = "netcdf")]
        Format::NetCdf => nc::write(path, dataset),
        #[cfg(not(feature = "netcdf"))]
        Format::NetCdf => Err(Error::NetCdfUnavailable(path.to_path_buf())),
    }
}
