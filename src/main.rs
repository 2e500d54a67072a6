use clap::{Parser, Subcommand, ValueEnum};
use fwcouple::config::Manifest;
use fwcouple::pipeline::{CouplingStep, FlattenedSnapshots};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Couple Antarctic freshwater fluxes between an ice-sheet and an ocean model
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Worker threads (defaults to the number of CPU cores)
    #[arg(long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one coupling step
    Run {
        /// Coupling manifest (TOML)
        manifest: PathBuf,
    },
    /// Check a manifest and its mask files without running anything
    Validate { manifest: PathBuf },
}

fn execute(cli: &Cli) -> fwcouple::Result<()> {
    match &cli.command {
        Command::Run { manifest } => {
            let manifest = Manifest::load(manifest)?;
            let source = FlattenedSnapshots::from_manifest(&manifest);
            let (outputs, written) = CouplingStep::new(&manifest, &source).run()?;
            info!(
                pairs = outputs.pairs.len(),
                discharge = %written.discharge_table.display(),
                basal = %written.basal_table.display(),
                melt = %written.melt_field.display(),
                forcing = %written.forcing.display(),
                "coupling step finished"
            );
        }
        Command::Validate { manifest } => {
            let manifest = Manifest::load(manifest)?;
            let masks = manifest.load_masks()?;
            for (sector, mask) in masks.iter() {
                info!(sector = sector.name(), cells = mask.count(), "mask");
            }
            info!("manifest is valid");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from(cli.log_level))
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("a global tracing subscriber is already installed");
    }

    if let Some(jobs) = cli.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
        {
            error!("cannot configure {jobs} worker threads: {e}");
            return ExitCode::FAILURE;
        }
    }

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
