use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

use crate::domain::TargetGroupList;
use crate::error::{Error, Result};

/// Runs a generator file that is neither `.json` nor `.yaml` as a
/// subprocess, passing the request's query arguments as repeated
/// `--key value` flags and parsing its stdout as a target-group list.
///
/// This is the Rust-idiomatic substitute for the original's in-process
/// dynamic import of a Python module's `generate_targets()` — see the
/// "Scripted generator contract" decision in DESIGN.md. When
/// `HTTPSD_TEST_MODE=1` is set in the environment, an extra `--test-mode`
/// flag is appended so a generator script can short-circuit real network
/// calls during `check`/CI runs.
pub async fn run(
    path: &Path,
    args: &BTreeMap<String, String>,
    test_mode: bool,
) -> Result<TargetGroupList> {
    if !is_executable(path) {
        return Err(Error::UnknownFileType(path.display().to_string()));
    }

    let mut cmd = Command::new(path);
    for (k, v) in args {
        cmd.arg(format!("--{k}")).arg(v);
    }
    if test_mode {
        cmd.arg("--test-mode");
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(Error::GeneratorFailure(format!(
            "{} exited with {}: {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let value: serde_json::Value = serde_json::from_str(&stdout).map_err(|e| {
        Error::GeneratorFailure(format!("{}: invalid stdout json: {e}", path.display()))
    })?;
    if value.is_null() {
        return Err(Error::GeneratorFailure(format!(
            "{} produced null",
            path.display()
        )));
    }
    serde_json::from_value(value).map_err(|e| {
        Error::GeneratorFailure(format!("{}: invalid target group list: {e}", path.display()))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.exists()
}
