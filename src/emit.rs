//! Committing a pass to disk.
//!
//! The output tree is hermetic: after a commit it holds exactly the files of
//! the pass, nothing left over from earlier builds. Files are written to a
//! sibling staging directory first and swapped in with two renames, so a
//! reader never sees a half-written tree and a failed write leaves the
//! published tree as it was.
//!
//! ```text
//! dist/                 published
//! .dist.staging/        being written
//! .dist.previous/       the old tree, removed after the swap
//! ```

use crate::report::BuildReport;
use crate::scheduler::PassOutput;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Directory under the project root for files that are not site output.
pub const STATE_DIR: &str = ".quarry";
pub const REPORT_FILE: &str = "build-report.json";

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("refusing to write outside the output directory: {0}")]
    UnsafePath(String),
}

fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{name}.{suffix}"))
}

/// Relative path made only of normal components.
fn checked(path: &str) -> Result<&Path, EmitError> {
    let rel = Path::new(path);
    let safe = !path.is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(rel)
    } else {
        Err(EmitError::UnsafePath(path.to_string()))
    }
}

/// Replace `output` with exactly `files`.
pub fn commit(output: &Path, files: &BTreeMap<String, Vec<u8>>) -> Result<(), EmitError> {
    let staging = sibling(output, "staging");
    let previous = sibling(output, "previous");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    for (path, bytes) in files {
        let target = staging.join(checked(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, bytes)?;
    }

    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    if output.exists() {
        fs::rename(output, &previous)?;
    }
    if let Err(e) = fs::rename(&staging, output) {
        if previous.exists() {
            fs::rename(&previous, output)?;
        }
        return Err(e.into());
    }
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    tracing::info!(output = %output.display(), files = files.len(), "committed output");
    Ok(())
}

/// Write the pass report to `.quarry/build-report.json` under `root`.
pub fn write_report(root: &Path, report: &BuildReport) -> Result<PathBuf, EmitError> {
    let dir = root.join(STATE_DIR);
    fs::create_dir_all(&dir)?;
    let path = dir.join(REPORT_FILE);
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    fs::write(&path, json)?;
    Ok(path)
}

/// Write the report and, when the pass succeeded, commit its files.
/// Returns whether the output tree was replaced.
pub fn publish(root: &Path, output: &Path, pass: &PassOutput) -> Result<bool, EmitError> {
    write_report(root, &pass.report)?;
    if !pass.success() {
        tracing::warn!(errors = pass.report.errors(), "build failed; output left untouched");
        return Ok(false);
    }
    commit(output, &pass.files)?;
    Ok(true)
}
