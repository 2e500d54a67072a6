//! Per-sector flux tables
//!
//! One comma-separated row per snapshot pair, one column per sector:
//!
//! ```text
//! time_start,time_end,eais,wedd,amun,ross,apen
//! 2000.0,2001.0,12.5,3.1,40.2,7.7,1.9
//! ```

use crate::errors::{Error, Result};
use fwcouple_core::errors::CouplingError;
use fwcouple_core::flux::{FluxRecord, PairFluxes};
use fwcouple_core::sectors::Sector;
use fwcouple_core::timeseries::{SectorValues, Time};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const DISCHARGE_TABLE: &str = "discharge.csv";
pub const BASAL_TABLE: &str = "basal.csv";

const HEADER: [&str; 7] = ["time_start", "time_end", "eais", "wedd", "amun", "ross", "apen"];

#[derive(Debug, Clone, PartialEq)]
pub struct FluxRow {
    pub time_start: Time,
    pub time_end: Time,
    pub values: SectorValues,
}

/// On-disk layout of one row; a sector without a record is written as NaN
#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    time_start: Time,
    time_end: Time,
    eais: f64,
    wedd: f64,
    amun: f64,
    ross: f64,
    apen: f64,
}

impl TableRecord {
    fn from_pair(pair: &PairFluxes, component: fn(&FluxRecord) -> f64) -> Self {
        let value = |sector: Sector| pair.records.get(&sector).map(component).unwrap_or(f64::NAN);
        Self {
            time_start: pair.time_start,
            time_end: pair.time_end,
            eais: value(Sector::Eais),
            wedd: value(Sector::Wedd),
            amun: value(Sector::Amun),
            ross: value(Sector::Ross),
            apen: value(Sector::Apen),
        }
    }

    fn into_row(self) -> FluxRow {
        FluxRow {
            time_start: self.time_start,
            time_end: self.time_end,
            values: SectorValues::from([
                (Sector::Eais, self.eais),
                (Sector::Wedd, self.wedd),
                (Sector::Amun, self.amun),
                (Sector::Ross, self.ross),
                (Sector::Apen, self.apen),
            ]),
        }
    }
}

/// Write one flux component of every pair as a table
pub fn write_table<W: Write>(
    writer: W,
    pairs: &[PairFluxes],
    component: fn(&FluxRecord) -> f64,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if pairs.is_empty() {
        writer.write_record(HEADER)?;
    }
    for pair in pairs {
        writer.serialize(TableRecord::from_pair(pair, component))?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Read a table written by [`write_table`]
pub fn read_table<R: Read>(reader: R) -> Result<Vec<FluxRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(CouplingError::EmptyResult("flux table is empty".to_string()).into());
    }
    if headers.iter().ne(HEADER) {
        return Err(CouplingError::Configuration(format!(
            "unexpected flux table header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        ))
        .into());
    }
    reader
        .deserialize::<TableRecord>()
        .map(|record| -> Result<FluxRow> { Ok(record?.into_row()) })
        .collect()
}

/// Write the calving and basal tables into `dir`, returning their paths
pub fn write_flux_tables(dir: &Path, pairs: &[PairFluxes]) -> Result<(PathBuf, PathBuf)> {
    let discharge = dir.join(DISCHARGE_TABLE);
    let basal = dir.join(BASAL_TABLE);
    let write = |path: &Path, component: fn(&FluxRecord) -> f64| -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
        write_table(file, pairs, component)
    };
    write(&discharge, |r| r.calving)?;
    write(&basal, |r| r.basal)?;
    Ok((discharge, basal))
}

pub fn read_flux_table(path: &Path) -> Result<Vec<FluxRow>> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    read_table(file)
}
