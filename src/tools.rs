//! Wrappers around the ice-sheet model's command-line converters
//!
//! Each call runs synchronously with a timeout. Output is captured so a failing tool can be
//! reported with its stderr.

use crate::config::ToolConfig;
use crate::errors::{Error, Result};
use fwcouple_core::errors::CouplingError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// An executable run with a timeout
#[derive(Debug, Clone)]
pub struct ExternalTool {
    name: String,
    program: PathBuf,
    timeout: Duration,
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut stream) = stream {
            let mut bytes = Vec::new();
            if stream.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

impl ExternalTool {
    pub fn new(name: &str, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            program: program.into(),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            let polled = child.try_wait().map_err(|e| Error::io(&self.program, e))?;
            if let Some(status) = polled {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                warn!(tool = %self.name, "killing tool after timeout");
                // The child may exit between the poll and the kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ToolTimeout {
                    tool: self.name.clone(),
                    seconds: self.timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run the tool to completion
    ///
    /// # Errors
    ///
    /// * [`Error::ToolTimeout`] if it runs longer than the timeout; the process is killed
    /// * [`Error::Tool`] if it exits unsuccessfully
    pub fn run<S: AsRef<std::ffi::OsStr>>(&self, args: &[S]) -> Result<ToolOutput> {
        debug!(
            tool = %self.name,
            program = %self.program.display(),
            args = ?args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect::<Vec<_>>(),
            "running tool"
        );
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::io(&self.program, e))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let output = ToolOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };
        if !status.success() {
            return Err(Error::Tool {
                tool: self.name.clone(),
                message: format!("{status}: {}", output.stderr.trim()),
            });
        }
        Ok(output)
    }
}

/// Converts an AMR plot file to a uniform grid file
#[derive(Debug, Clone)]
pub struct FlattenTool {
    tool: ExternalTool,
    level: u32,
    x_origin: f64,
    y_origin: f64,
}

impl FlattenTool {
    pub fn new(tool: ExternalTool, level: u32, x_origin: f64, y_origin: f64) -> Self {
        Self {
            tool,
            level,
            x_origin,
            y_origin,
        }
    }

    pub fn from_config(config: &ToolConfig) -> Self {
        Self::new(
            ExternalTool::new(
                "flatten",
                &config.flatten,
                Duration::from_secs(config.timeout_seconds),
            ),
            config.level,
            config.x_origin,
            config.y_origin,
        )
    }

    /// `<output_dir>/<stem>.nc` for an input file, with the AMR suffix removed
    pub fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CouplingError::Configuration(format!("invalid input file {}", input.display()))
            })?;
        let stem = name
            .strip_suffix(".2d.hdf5")
            .or_else(|| name.strip_suffix(".hdf5"))
            .unwrap_or(name);
        Ok(output_dir.join(format!("{stem}.nc")))
    }

    /// Flatten `input` into `output_dir` and return the written file
    ///
    /// # Errors
    ///
    /// [`CouplingError::EmptyOutput`] if the tool succeeded without writing the file.
    pub fn flatten(&self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let output = Self::output_path(input, output_dir)?;
        self.tool.run(&[
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
            self.level.to_string().into(),
            self.x_origin.to_string().into(),
            self.y_origin.to_string().into(),
        ])?;
        if !output.exists() {
            return Err(CouplingError::EmptyOutput(format!(
                "{} did not write {}",
                self.tool.name(),
                output.display()
            ))
            .into());
        }
        info!(input = %input.display(), output = %output.display(), "flattened");
        Ok(output)
    }
}

/// Writes a uniform grid field back into an AMR file
#[derive(Debug, Clone)]
pub struct MaskWriteTool {
    tool: ExternalTool,
}

impl MaskWriteTool {
    pub fn new(tool: ExternalTool) -> Self {
        Self { tool }
    }

    /// `None` when no converter is configured
    pub fn from_config(config: &ToolConfig) -> Option<Self> {
        config.nc2amr.as_ref().map(|program| {
            Self::new(ExternalTool::new(
                "nc2amr",
                program,
                Duration::from_secs(config.timeout_seconds),
            ))
        })
    }

    pub fn write(&self, grid_file: &Path, amr_file: &Path, variable: &str) -> Result<()> {
        self.tool.run(&[
            grid_file.as_os_str(),
            amr_file.as_os_str(),
            std::ffi::OsStr::new(variable),
        ])?;
        info!(grid = %grid_file.display(), amr = %amr_file.display(), variable, "wrote AMR field");
        Ok(())
    }
}
