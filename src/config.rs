//! Coupling manifest
//!
//! A coupling step is described by a single TOML file. Relative paths are resolved against
//! the directory containing the manifest.
//!
//! ```toml
//! [masks]
//! variable = "smask"
//! antarctica = "masks/antarctica.nc"
//!
//! [masks.sectors]
//! eais = "masks/eais.nc"
//! wedd = "masks/wedd.nc"
//! amun = "masks/amun.nc"
//! ross = "masks/ross.nc"
//! apen = "masks/apen.nc"
//!
//! [tools]
//! flatten = "/opt/bisicles/bin/flatten"
//! nc2amr = "/opt/bisicles/bin/nc2amr"
//!
//! [snapshots]
//! files = ["plot.000100.2d.hdf5", "plot.000110.2d.hdf5"]
//!
//! [ocean]
//! file = "thetao_Omon_historical_201401-201412.nc"
//! area_file = "areacello_Ofx.nc"
//!
//! [distribution]
//! area_file = "areacello.nc"
//! mask_file = "runoff_mask.nc"
//!
//! [output]
//! directory = "out"
//!
//! [basal_melt]
//! gamma = 0.05
//! ```

use crate::errors::{Error, Result};
use crate::io::convert::{self, OceanVariableNames};
use crate::io::read_dataset;
use fwcouple_core::errors::CouplingError;
use fwcouple_core::grid::{RegionMaskGrid, Resampling};
use fwcouple_core::masks::RegionMaskSet;
use fwcouple_core::ocean::{DepthWindowMode, HorizontalWeighting};
use fwcouple_core::parameters::{BasalMeltParameters, FluxParameters, ForcingParameters};
use fwcouple_core::sectors::Sector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

fn default_mask_variable() -> String {
    "smask".to_string()
}

/// Region masks on the ice-sheet grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskConfig {
    /// One file per sector, keyed by sector name
    pub sectors: BTreeMap<String, PathBuf>,
    /// Whole-continent mask
    #[serde(default)]
    pub antarctica: Option<PathBuf>,
    #[serde(default = "default_mask_variable")]
    pub variable: String,
    #[serde(default)]
    pub resampling: Resampling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// AMR to uniform grid converter
    pub flatten: PathBuf,
    /// Grid file to AMR converter, needed to hand the basal-melt field back
    pub nc2amr: Option<PathBuf>,
    /// AMR level to flatten
    pub level: u32,
    pub x_origin: f64,
    pub y_origin: f64,
    pub timeout_seconds: u64,
    /// Where flattened files are written
    pub output_dir: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            flatten: PathBuf::from("flatten"),
            nc2amr: None,
            level: 0,
            x_origin: -3333500.0,
            y_origin: -3333500.0,
            timeout_seconds: 600,
            output_dir: PathBuf::from("flattened"),
        }
    }
}

fn default_time_dimension() -> String {
    "time".to_string()
}

/// Ice-sheet plot files of the coupling interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    pub files: Vec<PathBuf>,
    #[serde(default = "default_time_dimension")]
    pub time_dimension: String,
}

/// Ocean temperature input for the basal-melt stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OceanConfig {
    pub file: PathBuf,
    /// Separate cell-area file, if `file` does not carry one
    #[serde(default)]
    pub area_file: Option<PathBuf>,
    #[serde(default)]
    pub variables: OceanVariableNames,
    #[serde(default)]
    pub weighting: HorizontalWeighting,
    #[serde(default)]
    pub window: DepthWindowMode,
    /// Derive baselines from these years of the input instead of `[basal_melt.baseline]`
    #[serde(default)]
    pub reference_period: Option<(i32, i32)>,
}

fn default_area_variable() -> String {
    "areacello".to_string()
}

fn default_distribution_variable() -> String {
    "friver".to_string()
}

/// Ocean cells receiving the freshwater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub area_file: PathBuf,
    #[serde(default = "default_area_variable")]
    pub area_variable: String,
    /// Mask shared by both fluxes
    pub mask_file: PathBuf,
    #[serde(default = "default_distribution_variable")]
    pub mask_variable: String,
    /// Overrides of `mask_file` for a single flux
    #[serde(default)]
    pub calving_mask_file: Option<PathBuf>,
    #[serde(default)]
    pub basal_mask_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub forcing_file: String,
    pub melt_file: String,
    pub melt_variable: String,
    /// AMR file receiving the basal-melt field through `nc2amr`
    pub amr_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            forcing_file: "freshwater_forcing.nc".to_string(),
            melt_file: "basal_melt.nc".to_string(),
            melt_variable: "bm".to_string(),
            amr_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub masks: MaskConfig,
    #[serde(default)]
    pub tools: ToolConfig,
    pub snapshots: SnapshotConfig,
    pub ocean: OceanConfig,
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub basal_melt: BasalMeltParameters,
    #[serde(default)]
    pub flux: FluxParameters,
    #[serde(default)]
    pub forcing: ForcingParameters,
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl Manifest {
    pub fn from_toml(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read, resolve and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut manifest: Manifest = toml::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.resolve_paths(base);
        manifest.validate()?;
        info!(path = %path.display(), "loaded manifest");
        Ok(manifest)
    }

    /// Make every relative path relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        self.masks.sectors.values_mut().for_each(|p| resolve(base, p));
        if let Some(p) = self.masks.antarctica.as_mut() {
            resolve(base, p);
        }
        // Bare executable names are looked up on PATH
        for tool in [Some(&mut self.tools.flatten), self.tools.nc2amr.as_mut()]
            .into_iter()
            .flatten()
        {
            if tool.components().count() > 1 {
                resolve(base, tool);
            }
        }
        resolve(base, &mut self.tools.output_dir);
        self.snapshots.files.iter_mut().for_each(|p| resolve(base, p));
        resolve(base, &mut self.ocean.file);
        if let Some(p) = self.ocean.area_file.as_mut() {
            resolve(base, p);
        }
        let d = &mut self.distribution;
        resolve(base, &mut d.area_file);
        resolve(base, &mut d.mask_file);
        for p in [d.calving_mask_file.as_mut(), d.basal_mask_file.as_mut()]
            .into_iter()
            .flatten()
        {
            resolve(base, p);
        }
        resolve(base, &mut self.output.directory);
        if let Some(p) = self.output.amr_file.as_mut() {
            resolve(base, p);
        }
    }

    /// Sector of every mask file
    ///
    /// # Errors
    ///
    /// [`CouplingError::Configuration`] for unknown sector names or missing sectors.
    pub fn sector_mask_paths(&self) -> Result<BTreeMap<Sector, &Path>> {
        let mut paths = BTreeMap::new();
        for (name, path) in &self.masks.sectors {
            paths.insert(Sector::from_str(name)?, path.as_path());
        }
        let missing: Vec<&str> = Sector::ALL
            .iter()
            .filter(|s| !paths.contains_key(*s))
            .map(|s| s.name())
            .collect();
        if !missing.is_empty() {
            return Err(CouplingError::Configuration(format!(
                "manifest has no mask for sectors: {}",
                missing.join(", ")
            ))
            .into());
        }
        Ok(paths)
    }

    pub fn validate(&self) -> Result<()> {
        self.sector_mask_paths()?;
        if self.tools.timeout_seconds == 0 {
            return Err(CouplingError::Configuration(
                "tools.timeout_seconds must be positive".to_string(),
            )
            .into());
        }
        if self.snapshots.files.len() < 2 {
            return Err(CouplingError::Configuration(format!(
                "at least two snapshot files are needed, got {}",
                self.snapshots.files.len()
            ))
            .into());
        }
        for sector in Sector::ALL {
            self.ocean.window.window(sector)?;
        }
        if let Some((first, last)) = self.ocean.reference_period {
            if first > last {
                return Err(CouplingError::Configuration(format!(
                    "ocean.reference_period {first}..{last} is reversed"
                ))
                .into());
            }
        }
        self.basal_melt.validate()?;
        self.flux.validate()?;
        self.forcing.validate()?;
        debug!("manifest is valid");
        Ok(())
    }

    fn load_mask(&self, path: &Path) -> Result<RegionMaskGrid> {
        let grid = convert::region_mask(&read_dataset(path)?, &self.masks.variable)?;
        debug!(path = %path.display(), cells = grid.count(), "loaded region mask");
        Ok(grid)
    }

    /// Load every region mask named in the manifest
    pub fn load_masks(&self) -> Result<RegionMaskSet> {
        let sectors = self
            .sector_mask_paths()?
            .into_iter()
            .map(|(sector, path)| -> Result<(Sector, RegionMaskGrid)> {
                Ok((sector, self.load_mask(path)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let antarctica = self
            .masks
            .antarctica
            .as_deref()
            .map(|p| self.load_mask(p))
            .transpose()?;
        let masks = RegionMaskSet::from_parts(sectors, antarctica)?;
        info!(shape = ?masks.shape(), "loaded region masks");
        Ok(masks)
    }
}
