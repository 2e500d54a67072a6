//! JSON dataset backend
//!
//! JSON has no NaN, so missing values are written as a fill value recorded in the
//! variable's `_FillValue` attribute and turned back into NaN on reading.

use super::{Dataset, FILL_VALUE};
use crate::errors::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const DEFAULT_FILL: f64 = 1.0e20;

pub(super) fn read(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut dataset: Dataset = serde_json::from_reader(BufReader::new(file))?;
    for variable in dataset.variables.values_mut() {
        if let Some(fill) = variable
            .attribute(FILL_VALUE)
            .and_then(|v| v.parse::<f64>().ok())
        {
            variable.data.mapv_inplace(|v| if v == fill { f64::NAN } else { v });
        }
    }
    Ok(dataset)
}

pub(super) fn write(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut encoded = dataset.clone();
    for variable in encoded.variables.values_mut() {
        if variable.data.iter().all(|v| v.is_finite()) {
            continue;
        }
        let fill = match variable.attribute(FILL_VALUE).map(|v| v.parse::<f64>()) {
            Some(Ok(fill)) => fill,
            _ => {
                variable
                    .attributes
                    .insert(FILL_VALUE.to_string(), DEFAULT_FILL.to_string());
                DEFAULT_FILL
            }
        };
        variable
            .data
            .mapv_inplace(|v| if v.is_finite() { v } else { fill });
    }

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &encoded)?;
    Ok(())
}
