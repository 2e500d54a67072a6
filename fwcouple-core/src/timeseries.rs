//! Per-sector time series
//!
//! A [`SectorTimeseries`] holds one scalar per sector per time step. It is used both for
//! annual ocean temperatures (one row per year) and for fluxes (one row per snapshot pair).
//!
//! Rows may be pushed out of order, for example when they are produced by parallel workers,
//! but every pipeline that returns a series sorts it first (see [`SectorTimeseries::sort_by_time`]).

use crate::errors::{CouplingError, CouplingResult};
use crate::sectors::Sector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type FloatValue = f64;
pub type Time = f64;

/// One value per sector at a single time.
pub type SectorValues = BTreeMap<Sector, FloatValue>;

/// A collection of per-sector values indexed by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTimeseries {
    name: String,
    unit: String,
    times: Vec<Time>,
    values: BTreeMap<Sector, Vec<FloatValue>>,
}

impl SectorTimeseries {
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            times: Vec::new(),
            values: Sector::ALL.iter().map(|s| (*s, Vec::new())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    /// Add a row
    ///
    /// The row must carry a value for every sector. A partial row would leave the
    /// columns with different lengths, so it is rejected instead.
    pub fn push(&mut self, time: Time, row: &SectorValues) -> CouplingResult<()> {
        let missing: Vec<&str> = Sector::ALL
            .iter()
            .filter(|s| !row.contains_key(*s))
            .map(|s| s.name())
            .collect();
        if !missing.is_empty() {
            return Err(CouplingError::Configuration(format!(
                "{} row at t={} is missing sectors: {}",
                self.name,
                time,
                missing.join(", ")
            )));
        }

        self.times.push(time);
        for (sector, value) in row {
            self.values.entry(*sector).or_default().push(*value);
        }
        Ok(())
    }

    /// Values of one sector, in row order
    pub fn values(&self, sector: Sector) -> &[FloatValue] {
        &self.values[&sector]
    }

    pub fn row(&self, index: usize) -> Option<SectorValues> {
        if index >= self.len() {
            return None;
        }
        Some(
            self.values
                .iter()
                .map(|(sector, column)| (*sector, column[index]))
                .collect(),
        )
    }

    pub fn latest_row(&self) -> Option<SectorValues> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    pub fn rows(&self) -> impl Iterator<Item = (Time, SectorValues)> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i).map(|row| (self.times[i], row)))
    }

    /// Antarctica-wide total (sum over all sectors) for one row
    pub fn total(&self, index: usize) -> Option<FloatValue> {
        self.row(index).map(|row| row.values().sum())
    }

    pub fn is_sorted(&self) -> bool {
        self.times.windows(2).all(|w| w[0] <= w[1])
    }

    /// Reorder the rows so that time increases.
    pub fn sort_by_time(&mut self) {
        if self.is_sorted() {
            return;
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|a, b| self.times[*a].total_cmp(&self.times[*b]));

        self.times = order.iter().map(|i| self.times[*i]).collect();
        for column in self.values.values_mut() {
            *column = order.iter().map(|i| column[*i]).collect();
        }
    }

    /// Apply a fallible function to every value, keeping the time axis.
    pub fn try_map<F>(&self, name: &str, unit: &str, mut f: F) -> CouplingResult<Self>
    where
        F: FnMut(Sector, FloatValue) -> CouplingResult<FloatValue>,
    {
        let mut output = Self::new(name, unit);
        for (time, row) in self.rows() {
            let mapped = row
                .into_iter()
                .map(|(sector, value)| f(sector, value).map(|v| (sector, v)))
                .collect::<CouplingResult<SectorValues>>()?;
            output.push(time, &mapped)?;
        }
        Ok(output)
    }

    /// Merge independently produced series into one, sorted by time.
    ///
    /// All parts must share the same name and unit.
    pub fn merge(parts: Vec<SectorTimeseries>) -> CouplingResult<Self> {
        let mut iter = parts.into_iter();
        let mut merged = iter
            .next()
            .ok_or_else(|| CouplingError::EmptyResult("no series to merge".to_string()))?;

        for part in iter {
            if part.name != merged.name || part.unit != merged.unit {
                return Err(CouplingError::Configuration(format!(
                    "cannot merge '{}' ({}) into '{}' ({})",
                    part.name, part.unit, merged.name, merged.unit
                )));
            }
            for (time, row) in part.rows() {
                merged.push(time, &row)?;
            }
        }
        merged.sort_by_time();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(value: FloatValue) -> SectorValues {
        Sector::ALL.iter().map(|s| (*s, value)).collect()
    }

    #[test]
    fn adding() {
        let mut series = SectorTimeseries::new("Ocean Temperature", "degC");
        series.push(2020.0, &row(1.0)).unwrap();
        series.push(2021.0, &row(2.0)).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.values(Sector::Ross), &[1.0, 2.0]);
        assert_eq!(series.total(1), Some(10.0));
    }

    #[test]
    fn partial_row_is_rejected() {
        let mut series = SectorTimeseries::new("Ocean Temperature", "degC");
        let mut partial = row(1.0);
        partial.remove(&Sector::Apen);

        let err = series.push(2020.0, &partial).unwrap_err();
        assert!(matches!(err, CouplingError::Configuration(msg) if msg.contains("apen")));
        assert!(series.is_empty());
    }

    #[test]
    fn sorting_keeps_columns_aligned() {
        let mut series = SectorTimeseries::new("Flux", "Gt/yr");
        series.push(2022.0, &row(3.0)).unwrap();
        series.push(2020.0, &row(1.0)).unwrap();
        series.push(2021.0, &row(2.0)).unwrap();
        assert!(!series.is_sorted());

        series.sort_by_time();

        assert!(series.is_sorted());
        assert_eq!(series.times(), &[2020.0, 2021.0, 2022.0]);
        assert_eq!(series.values(Sector::Eais), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn merge_sorts_parts() {
        let mut late = SectorTimeseries::new("Flux", "Gt/yr");
        late.push(2030.0, &row(30.0)).unwrap();
        let mut early = SectorTimeseries::new("Flux", "Gt/yr");
        early.push(2010.0, &row(10.0)).unwrap();

        let merged = SectorTimeseries::merge(vec![late, early]).unwrap();
        assert_eq!(merged.times(), &[2010.0, 2030.0]);
        assert_eq!(merged.latest_row().unwrap()[&Sector::Wedd], 30.0);
    }

    #[test]
    fn merge_rejects_mismatched_units() {
        let a = SectorTimeseries::new("Flux", "Gt/yr");
        let b = SectorTimeseries::new("Flux", "kg/s");
        assert!(SectorTimeseries::merge(vec![a, b]).is_err());
    }
}
