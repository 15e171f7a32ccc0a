//! Script bundling through the configured bundler (esbuild by default).

use crate::tools::{ToolCommand, ToolError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script entry not found: {}", .0.display())]
    MissingEntry(PathBuf),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Bundler produced no output at {}", .0.display())]
    NoOutput(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bundle `entry` into `output`, running the bundler from `cwd`.
pub fn bundle(
    bundler: &ToolCommand,
    entry: &Path,
    output: &Path,
    cwd: &Path,
) -> Result<PathBuf, ScriptError> {
    if !entry.is_file() {
        return Err(ScriptError::MissingEntry(entry.to_path_buf()));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    // The existence check below must only see what this run wrote.
    match fs::remove_file(output) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    bundler.run(cwd, entry, output)?;
    if !output.is_file() {
        return Err(ScriptError::NoOutput(output.to_path_buf()));
    }
    tracing::debug!(output = %output.display(), "bundled scripts");
    Ok(output.to_path_buf())
}
