//! NetCDF dataset backend

use super::{Dataset, Variable};
use crate::errors::Result;
use fwcouple_core::errors::CouplingError;
use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::path::Path;

fn attribute_text(value: AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Double(v) => Some(v.to_string()),
        AttributeValue::Float(v) => Some(v.to_string()),
        AttributeValue::Int(v) => Some(v.to_string()),
        AttributeValue::Short(v) => Some(v.to_string()),
        AttributeValue::Longlong(v) => Some(v.to_string()),
        _ => None,
    }
}

fn attributes<'a>(iter: impl Iterator<Item = netcdf::Attribute<'a>>) -> IndexMap<String, String> {
    iter.filter_map(|a| {
        let name = a.name().to_string();
        a.value().ok().and_then(attribute_text).map(|v| (name, v))
    })
    .collect()
}

pub(super) fn read(path: &Path) -> Result<Dataset> {
    let file = netcdf::open(path)?;
    let mut dataset = Dataset::new();
    for dim in file.dimensions() {
        dataset.add_dimension(&dim.name(), dim.len())?;
    }

    for var in file.variables() {
        let dimensions: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let mut attributes = attributes(var.attributes());
        let mut values: Vec<f64> = var.get_values::<f64, _>(..)?;
        if let Some(fill) = attributes
            .get(super::FILL_VALUE)
            .and_then(|v| v.parse::<f64>().ok())
        {
            values.iter_mut().filter(|v| **v == fill).for_each(|v| *v = f64::NAN);
            attributes.shift_remove(super::FILL_VALUE);
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            CouplingError::Configuration(format!("variable '{}': {e}", var.name()))
        })?;
        dataset.variables.insert(
            var.name(),
            Variable {
                dimensions,
                data,
                attributes,
            },
        );
    }
    dataset.attributes = attributes(file.attributes());
    Ok(dataset)
}

pub(super) fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut file = netcdf::create(path)?;
    for (name, len) in &dataset.dimensions {
        file.add_dimension(name, *len)?;
    }
    for (name, value) in &dataset.attributes {
        file.add_attribute(name, value.as_str())?;
    }

    for (name, variable) in &dataset.variables {
        let dims: Vec<&str> = variable.dimensions.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f64>(name, &dims)?;
        let mut fill = None;
        for (key, value) in &variable.attributes {
            if key == super::FILL_VALUE {
                fill = value.parse::<f64>().ok();
                continue;
            }
            var.put_attribute(key, value.as_str())?;
        }
        if variable.data.iter().any(|v| !v.is_finite()) {
            let fill = fill.unwrap_or(1.0e20);
            var.put_attribute(super::FILL_VALUE, fill)?;
            let values: Vec<f64> = variable
                .data
                .iter()
                .map(|v| if v.is_finite() { *v } else { fill })
                .collect();
            var.put_values(&values, ..)?;
        } else {
            let values: Vec<f64> = variable.data.iter().copied().collect();
            var.put_values(&values, ..)?;
        }
    }
    Ok(())
}
