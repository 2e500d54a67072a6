#![cfg(unix)]

use fwcouple::tools::{ExternalTool, FlattenTool, MaskWriteTool};
use fwcouple::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn shell() -> ExternalTool {
    ExternalTool::new("sh", "sh", Duration::from_secs(10))
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn captures_output() {
    let output = shell().run(&["-c", "echo flattened; echo note >&2"]).unwrap();
    assert_eq!(output.stdout.trim(), "flattened");
    assert_eq!(output.stderr.trim(), "note");
}

#[test]
fn failure_reports_stderr() {
    let err = shell()
        .run(&["-c", "echo 'bad level' >&2; exit 3"])
        .unwrap_err();
    match err {
        Error::Tool { tool, message } => {
            assert_eq!(tool, "sh");
            assert!(message.contains("bad level"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn slow_tool_is_killed() {
    let tool = ExternalTool::new("sleeper", "sh", Duration::from_millis(200));
    let started = std::time::Instant::now();
    let err = tool.run(&["-c", "sleep 5"]).unwrap_err();
    assert!(matches!(err, Error::ToolTimeout { ref tool, .. } if tool == "sleeper"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn missing_executable() {
    let tool = ExternalTool::new("flatten", "/nonexistent/flatten", Duration::from_secs(1));
    assert!(matches!(tool.run(&["x"]), Err(Error::Io { .. })));
}

#[test]
fn flatten_passes_level_and_origin() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("args.txt");
    let program = script(
        dir.path(),
        "flatten.sh",
        &format!("echo \"$@\" > {}\ntouch \"$2\"", log.display()),
    );
    let tool = FlattenTool::new(
        ExternalTool::new("flatten", program, Duration::from_secs(10)),
        0,
        -3333500.0,
        -3333500.0,
    );

    let input = dir.path().join("plot.000120.2d.hdf5");
    let output = tool.flatten(&input, dir.path()).unwrap();
    assert_eq!(output, dir.path().join("plot.000120.nc"));
    assert!(output.exists());

    let args = fs::read_to_string(&log).unwrap();
    assert_eq!(
        args.trim(),
        format!(
            "{} {} 0 -3333500 -3333500",
            input.display(),
            output.display()
        )
    );
}

#[test]
fn flatten_without_output_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let program = script(dir.path(), "noop.sh", "exit 0");
    let tool = FlattenTool::new(
        ExternalTool::new("flatten", program, Duration::from_secs(10)),
        0,
        0.0,
        0.0,
    );
    assert!(matches!(
        tool.flatten(Path::new("plot.hdf5"), dir.path()),
        Err(Error::Coupling(
            fwcouple_core::errors::CouplingError::EmptyOutput(_)
        ))
    ));
}

#[test]
fn mask_write_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("args.txt");
    let program = script(
        dir.path(),
        "nc2amr.sh",
        &format!("echo \"$@\" > {}", log.display()),
    );
    let tool = MaskWriteTool::new(ExternalTool::new("nc2amr", program, Duration::from_secs(10)));
    tool.write(Path::new("bm.nc"), Path::new("bm.2d.hdf5"), "bm")
        .unwrap();
    assert_eq!(fs::read_to_string(&log).unwrap().trim(), "bm.nc bm.2d.hdf5 bm");
}
