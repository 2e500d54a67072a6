//! One coupling step
//!
//! Two independent chains meet in the forcing file:
//!
//! - ocean temperature -> sector means -> basal-melt anomaly -> melt field on the ice grid
//! - ice-sheet snapshots -> flatten -> regional sums -> fluxes -> ocean forcing
//!
//! Per-file and per-sector work runs on the rayon pool. The first failing unit aborts the
//! step, and nothing is written until every result is available.

use crate::config::{Manifest, OceanConfig};
use crate::errors::{Error, Result};
use crate::io::convert::{self, OceanVariableNames};
use crate::io::{read_dataset, tables, write_dataset, Dataset};
use crate::tools::{FlattenTool, MaskWriteTool};
use fwcouple_core::errors::{CouplingError, CouplingResult};
use fwcouple_core::flux::{FluxCalculator, PairFluxes};
use fwcouple_core::forcing::{DistributionMasks, FluxTotals, ForcingDataset, ForcingDistributor};
use fwcouple_core::grid::GeoCoordinates;
use fwcouple_core::masks::RegionMaskSet;
use fwcouple_core::melt::{climatology, BasalMeltModel};
use fwcouple_core::ocean::{OceanTemperature, VolumeWeightedOceanMean};
use fwcouple_core::parameters::BasalMeltParameters;
use fwcouple_core::sectors::Sector;
use fwcouple_core::snapshot::{RegionSums, Snapshot, SnapshotAggregator, FLUX_FIELDS};
use fwcouple_core::timeseries::{SectorTimeseries, Time};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supplies the snapshots of a coupling interval
///
/// Implementations are loaded from several threads at once.
pub trait SnapshotSource: Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&self, index: usize) -> Result<Snapshot>;
}

impl SnapshotSource for [Snapshot] {
    fn len(&self) -> usize {
        <[Snapshot]>::len(self)
    }

    fn load(&self, index: usize) -> Result<Snapshot> {
        self.get(index).cloned().ok_or_else(|| {
            CouplingError::Configuration(format!("no snapshot {index}")).into()
        })
    }
}

impl SnapshotSource for Vec<Snapshot> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn load(&self, index: usize) -> Result<Snapshot> {
        self.as_slice().load(index)
    }
}

/// AMR plot files flattened on demand
#[derive(Debug, Clone)]
pub struct FlattenedSnapshots {
    tool: FlattenTool,
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    time_dimension: String,
}

impl FlattenedSnapshots {
    pub fn new(
        tool: FlattenTool,
        files: Vec<PathBuf>,
        output_dir: PathBuf,
        time_dimension: &str,
    ) -> Self {
        Self {
            tool,
            files,
            output_dir,
            time_dimension: time_dimension.to_string(),
        }
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self::new(
            FlattenTool::from_config(&manifest.tools),
            manifest.snapshots.files.clone(),
            manifest.tools.output_dir.clone(),
            &manifest.snapshots.time_dimension,
        )
    }
}

impl SnapshotSource for FlattenedSnapshots {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn load(&self, index: usize) -> Result<Snapshot> {
        let input = self.files.get(index).ok_or_else(|| {
            Error::from(CouplingError::Configuration(format!("no snapshot file {index}")))
        })?;
        std::fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;
        let flat = self.tool.flatten(input, &self.output_dir)?;
        convert::snapshot(&read_dataset(&flat)?, &self.time_dimension, &FLUX_FIELDS)
    }
}

/// Regional sums of one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSnapshot {
    pub time: Time,
    pub sectors: BTreeMap<Sector, RegionSums>,
    /// Sums over the whole-continent mask, when one is configured
    pub antarctica: Option<RegionSums>,
}

/// Aggregate every snapshot over every sector, in time order
pub fn aggregate_snapshots<S: SnapshotSource + ?Sized>(
    source: &S,
    masks: &RegionMaskSet,
    aggregator: &SnapshotAggregator,
) -> Result<Vec<AggregatedSnapshot>> {
    if source.is_empty() {
        return Err(CouplingError::EmptyResult("no snapshots to aggregate".to_string()).into());
    }
    let mut aggregated = (0..source.len())
        .into_par_iter()
        .map(|index| -> Result<AggregatedSnapshot> {
            let snapshot = source.load(index)?;
            let sectors = aggregator.aggregate_sectors(&snapshot, masks)?;
            let antarctica = masks
                .antarctica()
                .map(|mask| aggregator.aggregate(&snapshot, mask))
                .transpose()?;
            if let Some(total) = &antarctica {
                for (field, value) in &total.values {
                    let partition: f64 = sectors.values().filter_map(|s| s.get(field).ok()).sum();
                    debug!(
                        time = snapshot.time(),
                        field = field.as_str(),
                        antarctica = *value,
                        sectors = partition,
                        "continent total"
                    );
                }
            }
            Ok(AggregatedSnapshot {
                time: snapshot.time(),
                sectors,
                antarctica,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    aggregated.sort_by(|a, b| a.time.total_cmp(&b.time));
    info!(snapshots = aggregated.len(), "aggregated snapshots");
    Ok(aggregated)
}

/// Consecutive pairs of time-ordered snapshots
///
/// # Errors
///
/// * [`CouplingError::EmptyResult`] for fewer than two snapshots
/// * [`CouplingError::Configuration`] if two snapshots share a time
pub fn snapshot_pairs(
    aggregated: &[AggregatedSnapshot],
) -> CouplingResult<Vec<(&AggregatedSnapshot, &AggregatedSnapshot)>> {
    if aggregated.len() < 2 {
        return Err(CouplingError::EmptyResult(format!(
            "need at least two snapshots, got {}",
            aggregated.len()
        )));
    }
    aggregated
        .windows(2)
        .map(|w| {
            if w[1].time <= w[0].time {
                Err(CouplingError::Configuration(format!(
                    "snapshot times must increase, got {} then {}",
                    w[0].time, w[1].time
                )))
            } else {
                Ok((&w[0], &w[1]))
            }
        })
        .collect()
}

/// Fluxes of every consecutive snapshot pair
pub fn compute_fluxes(
    calculator: &FluxCalculator,
    aggregated: &[AggregatedSnapshot],
) -> CouplingResult<Vec<PairFluxes>> {
    snapshot_pairs(aggregated)?
        .into_iter()
        .map(|(start, end)| calculator.regional_contributions(&start.sectors, &end.sectors))
        .collect()
}

/// Antarctica-wide fluxes of the coupling interval
///
/// Each pair is weighted by the time it spans, so several pairs give the mean annual flux
/// of the interval and a single pair gives that pair's flux.
///
/// # Errors
///
/// [`CouplingError::EmptyResult`] if there are no pairs or they span no time.
pub fn interval_totals(pairs: &[PairFluxes]) -> CouplingResult<FluxTotals> {
    let span: f64 = pairs.iter().map(|p| p.time_end - p.time_start).sum();
    if pairs.is_empty() || span <= 0.0 || !span.is_finite() {
        return Err(CouplingError::EmptyResult(format!(
            "{} snapshot pairs spanning {span} years",
            pairs.len()
        )));
    }
    let mean = |total: fn(&PairFluxes) -> f64| {
        pairs
            .iter()
            .map(|p| total(p) * (p.time_end - p.time_start))
            .sum::<f64>()
            / span
    };
    Ok(FluxTotals {
        calving: mean(PairFluxes::total_calving),
        basal: mean(PairFluxes::total_basal),
    })
}

/// Sector-mean temperature with one sector per task
pub fn ocean_sector_means(
    ocean: &OceanTemperature,
    mean: &VolumeWeightedOceanMean,
) -> CouplingResult<SectorTimeseries> {
    let annual = ocean.annual_means()?;
    let weights = mean.horizontal_weights(ocean)?;
    let columns = Sector::ALL
        .par_iter()
        .map(|sector| {
            mean.sector_mean(ocean, &annual, &weights, *sector)
                .map(|column| (*sector, column))
        })
        .collect::<CouplingResult<BTreeMap<_, _>>>()?;
    VolumeWeightedOceanMean::assemble(&annual.years, columns)
}

/// Results of the ocean-to-ice chain
#[derive(Debug, Clone)]
pub struct MeltOutputs {
    pub temperature: SectorTimeseries,
    pub anomaly: SectorTimeseries,
    /// Latest anomaly painted onto the ice-sheet mask grid
    pub field: Dataset,
}

pub fn melt_stage(
    ocean: &OceanTemperature,
    config: &OceanConfig,
    parameters: &BasalMeltParameters,
    masks: &RegionMaskSet,
    variable: &str,
) -> Result<MeltOutputs> {
    let mean = VolumeWeightedOceanMean::new(config.weighting, config.window);
    let temperature = ocean_sector_means(ocean, &mean)?;

    let mut parameters = parameters.clone();
    if let Some((first, last)) = config.reference_period {
        parameters.baseline = climatology(&temperature, first, last)?;
        debug!(first, last, baseline = ?parameters.baseline, "derived baselines");
    }
    let model = BasalMeltModel::from_parameters(parameters)?;
    let anomaly = model.sector_anomalies(&temperature)?;

    let latest = anomaly
        .latest_row()
        .ok_or_else(|| CouplingError::EmptyResult("no basal-melt anomaly".to_string()))?;
    let painted = masks.paint(&latest)?;
    let field = convert::grid_field(&painted, masks.get(Sector::Eais), variable)?;
    info!(years = anomaly.len(), "computed basal-melt anomaly");
    Ok(MeltOutputs {
        temperature,
        anomaly,
        field,
    })
}

pub fn forcing_stage(
    distributor: &ForcingDistributor,
    source_times: &[chrono::NaiveDateTime],
    pairs: &[PairFluxes],
    masks: &DistributionMasks,
    coordinates: Option<&GeoCoordinates>,
) -> Result<ForcingDataset> {
    let totals = interval_totals(pairs)?;
    let forcing = distributor.assemble(source_times, totals, masks)?;
    match coordinates {
        Some(c) if c.shape() == masks.calving.dim() => Ok(forcing.with_coordinates(c.clone())?),
        Some(_) => {
            debug!("ocean coordinates do not match the distribution grid; omitting them");
            Ok(forcing)
        }
        None => Ok(forcing),
    }
}

fn load_ocean(config: &OceanConfig) -> Result<OceanTemperature> {
    let names: &OceanVariableNames = &config.variables;
    let ocean = convert::ocean_temperature(&read_dataset(&config.file)?, names)?;
    match &config.area_file {
        Some(path) => {
            let area = convert::cell_area(&read_dataset(path)?, &names.cell_area)?;
            Ok(ocean.with_cell_area(area)?)
        }
        None => Ok(ocean),
    }
}

fn load_distribution(manifest: &Manifest) -> Result<(ForcingDistributor, DistributionMasks)> {
    let d = &manifest.distribution;
    let area = convert::cell_area(&read_dataset(&d.area_file)?, &d.area_variable)?;
    let mask = |path: &Path| convert::distribution_mask(&read_dataset(path)?, &d.mask_variable);
    let shared = mask(&d.mask_file)?;
    let masks = DistributionMasks {
        calving: match &d.calving_mask_file {
            Some(p) => mask(p)?,
            None => shared.clone(),
        },
        basal: match &d.basal_mask_file {
            Some(p) => mask(p)?,
            None => shared,
        },
    };
    let distributor = ForcingDistributor::new(manifest.forcing.clone(), area)?;
    Ok((distributor, masks))
}

/// Everything a coupling step produces
#[derive(Debug, Clone)]
pub struct CouplingOutputs {
    pub pairs: Vec<PairFluxes>,
    pub melt: MeltOutputs,
    pub forcing: ForcingDataset,
}

/// Paths written by [`CouplingStep::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFiles {
    pub discharge_table: PathBuf,
    pub basal_table: PathBuf,
    pub melt_field: PathBuf,
    pub forcing: PathBuf,
}

pub struct CouplingStep<'a, S: SnapshotSource + ?Sized> {
    manifest: &'a Manifest,
    source: &'a S,
}

impl<'a, S: SnapshotSource + ?Sized> CouplingStep<'a, S> {
    pub fn new(manifest: &'a Manifest, source: &'a S) -> Self {
        Self { manifest, source }
    }

    /// Run both chains without writing anything
    pub fn compute(&self) -> Result<CouplingOutputs> {
        let m = self.manifest;
        let masks = m.load_masks()?;

        let (ocean, fluxes) = rayon::join(
            || -> Result<(OceanTemperature, MeltOutputs)> {
                let ocean = load_ocean(&m.ocean)?;
                let melt = melt_stage(
                    &ocean,
                    &m.ocean,
                    &m.basal_melt,
                    &masks,
                    &m.output.melt_variable,
                )?;
                Ok((ocean, melt))
            },
            || -> Result<Vec<PairFluxes>> {
                let aggregator =
                    SnapshotAggregator::default().with_resampling(m.masks.resampling);
                let aggregated = aggregate_snapshots(self.source, &masks, &aggregator)?;
                let calculator = FluxCalculator::new(m.flux.clone())?;
                Ok(compute_fluxes(&calculator, &aggregated)?)
            },
        );
        let (ocean, melt) = ocean?;
        let pairs = fluxes?;

        let (distributor, distribution) = load_distribution(m)?;
        let forcing = forcing_stage(
            &distributor,
            ocean.times(),
            &pairs,
            &distribution,
            Some(ocean.coordinates()),
        )?;
        Ok(CouplingOutputs {
            pairs,
            melt,
            forcing,
        })
    }

    /// Compute, write every output and hand the melt field back to the ice sheet
    pub fn run(&self) -> Result<(CouplingOutputs, WrittenFiles)> {
        let outputs = self.compute()?;
        let written = self.write(&outputs)?;
        Ok((outputs, written))
    }

    pub fn write(&self, outputs: &CouplingOutputs) -> Result<WrittenFiles> {
        let out = &self.manifest.output;
        std::fs::create_dir_all(&out.directory).map_err(|e| Error::io(&out.directory, e))?;

        let (discharge_table, basal_table) = tables::write_flux_tables(&out.directory, &outputs.pairs)?;
        let melt_field = out.directory.join(&out.melt_file);
        write_dataset(&melt_field, &outputs.melt.field)?;
        let forcing = out.directory.join(&out.forcing_file);
        write_dataset(
            &forcing,
            &convert::forcing_to_dataset(&outputs.forcing, &self.manifest.forcing)?,
        )?;
        info!(path = %forcing.display(), "wrote forcing");

        if let (Some(tool), Some(amr)) = (
            MaskWriteTool::from_config(&self.manifest.tools),
            out.amr_file.as_deref(),
        ) {
            tool.write(&melt_field, amr, &out.melt_variable)?;
        }
        Ok(WrittenFiles {
            discharge_table,
            basal_table,
            melt_field,
            forcing,
        })
    }
}
