//! Filesystem copy and clean steps.
//!
//! Three flavours of copy cover every static asset category:
//!
//! - [`copy_flat`]: top-level files only (fonts).
//! - [`copy_tree`]: the whole tree, structure preserved (development images).
//! - [`copy_matching`]: files whose relative path matches a glob, structure
//!   preserved (style library setup).
//!
//! A missing source directory is an error. An existing but empty one yields
//! an empty destination directory.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CopyError {
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Remove `dir` and everything under it. Returns whether anything was removed.
pub fn clean(dir: &Path) -> Result<bool, CopyError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn require_dir(src: &Path) -> Result<(), CopyError> {
    if src.is_dir() {
        Ok(())
    } else {
        Err(CopyError::SourceNotFound(src.to_path_buf()))
    }
}

/// Copy the regular files directly inside `src` into `dst`.
///
/// Returns the copied file names, sorted.
pub fn copy_flat(src: &Path, dst: &Path) -> Result<Vec<PathBuf>, CopyError> {
    require_dir(src)?;
    fs::create_dir_all(dst)?;

    let mut names = Vec::new();
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(PathBuf::from(entry.file_name()));
        }
    }
    names.sort();
    for name in &names {
        fs::copy(src.join(name), dst.join(name))?;
    }
    Ok(names)
}

/// Copy every file under `src` into `dst`, preserving relative structure.
///
/// Returns the copied paths relative to `src`, sorted.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<Vec<PathBuf>, CopyError> {
    copy_filtered(src, dst, |_| true)
}

/// Copy files under `src` whose relative path matches `pattern`.
///
/// `*` does not cross directory separators; use `**` for that.
pub fn copy_matching(src: &Path, dst: &Path, pattern: &str) -> Result<Vec<PathBuf>, CopyError> {
    let pattern = glob::Pattern::new(pattern)?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    copy_filtered(src, dst, |rel| pattern.matches_path_with(rel, options))
}

fn copy_filtered(
    src: &Path,
    dst: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, CopyError> {
    require_dir(src)?;
    fs::create_dir_all(dst)?;

    let mut copied = Vec::new();
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        if !keep(rel) {
            continue;
        }
        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(entry.path(), &target)?;
        copied.push(rel.to_path_buf());
    }
    Ok(copied)
}
