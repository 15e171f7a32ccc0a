//! Image stage: optimize for production, copy for development.
//!
//! [`optimize_images`] walks the source tree and runs every file through
//! [`optimize_file`] on the rayon pool. PNG and JPEG files are re-encoded and
//! the smaller of original and re-encoded bytes is kept; everything else is
//! copied. Relative structure is preserved. When a store directory is given,
//! results are cached by content (see [`crate::cache`]).
//!
//! [`copy_images`] is the development variant: a straight tree copy.

use crate::cache::{self, CacheManifest, CacheStats};
use crate::copy::{self, CopyError};
use crate::imaging::{BackendError, FileOutcome, ImageBackend, ImageKind, Quality, optimize_file};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ImagesError {
    #[error("Image directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("{}: {source}", .path.display())]
    Backend {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Copy(#[from] CopyError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals for one image stage run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub files: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub cache: CacheStats,
}

impl ImageReport {
    fn add(&mut self, outcome: FileOutcome) {
        self.files += 1;
        self.bytes_before += outcome.before();
        self.bytes_after += outcome.after();
        match outcome {
            FileOutcome::Cached { .. } => self.cache.hit(),
            FileOutcome::Copied { .. } => self.cache.copy(),
            FileOutcome::Reencoded { .. } | FileOutcome::Unchanged { .. } => self.cache.miss(),
        }
    }

    pub fn saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Options for [`optimize_images`].
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub quality: Quality,
    /// Store directory for the optimization cache; `None` disables caching.
    pub store: Option<PathBuf>,
}

/// Copy the image tree verbatim.
pub fn copy_images(src: &Path, dst: &Path) -> Result<ImageReport, ImagesError> {
    if !src.is_dir() {
        return Err(ImagesError::SourceNotFound(src.to_path_buf()));
    }
    let copied = copy::copy_tree(src, dst)?;
    let mut report = ImageReport::default();
    for rel in copied {
        let size = fs::metadata(dst.join(rel))?.len();
        report.add(FileOutcome::Copied { size });
    }
    Ok(report)
}

fn list_files(src: &Path) -> Result<Vec<PathBuf>, ImagesError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && let Ok(rel) = entry.path().strip_prefix(src)
        {
            files.push(rel.to_path_buf());
        }
    }
    Ok(files)
}

/// What one worker produced: the outcome and, on a fresh encode, the new
/// cache entry `(stored_name, source_hash, params_hash)`.
type Processed = (FileOutcome, Option<(String, String, String)>);

fn process_one(
    backend: &impl ImageBackend,
    manifest: &CacheManifest,
    src: &Path,
    dst: &Path,
    rel: &Path,
    options: &OptimizeOptions,
) -> Result<Processed, ImagesError> {
    let source = src.join(rel);
    let output = dst.join(rel);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let kind = ImageKind::from_path(&source);
    let store = options.store.as_deref().filter(|_| kind.is_reencodable());
    let Some(store) = store else {
        let outcome = optimize_file(backend, &source, &output, options.quality)
            .map_err(|e| backend_error(&source, e))?;
        return Ok((outcome, None));
    };

    let source_hash = cache::hash_file(&source)?;
    let params_hash = cache::hash_optimize_params(kind.as_str(), options.quality.value());
    if let Some(stored) = manifest.find_cached(&source_hash, &params_hash, store) {
        let size = fs::copy(store.join(stored), &output)?;
        return Ok((FileOutcome::Cached { size }, None));
    }

    let outcome = optimize_file(backend, &source, &output, options.quality)
        .map_err(|e| backend_error(&source, e))?;
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_ascii_lowercase();
    let name = cache::stored_name(&source_hash, &params_hash, &ext);
    fs::create_dir_all(store)?;
    fs::copy(&output, store.join(&name))?;
    Ok((outcome, Some((name, source_hash, params_hash))))
}

fn backend_error(path: &Path, source: BackendError) -> ImagesError {
    ImagesError::Backend {
        path: path.to_path_buf(),
        source,
    }
}

/// Optimize every file under `src` into `dst`.
pub fn optimize_images(
    backend: &impl ImageBackend,
    src: &Path,
    dst: &Path,
    options: &OptimizeOptions,
) -> Result<ImageReport, ImagesError> {
    if !src.is_dir() {
        return Err(ImagesError::SourceNotFound(src.to_path_buf()));
    }
    fs::create_dir_all(dst)?;

    let files = list_files(src)?;
    let mut manifest = match &options.store {
        Some(store) => CacheManifest::load(store),
        None => CacheManifest::empty(),
    };

    let processed: Vec<Processed> = files
        .par_iter()
        .map(|rel| process_one(backend, &manifest, src, dst, rel, options))
        .collect::<Result<_, _>>()?;

    let mut report = ImageReport::default();
    let mut stored_any = false;
    for (outcome, entry) in processed {
        report.add(outcome);
        if let Some((name, source_hash, params_hash)) = entry {
            manifest.insert(name, source_hash, params_hash);
            stored_any = true;
        }
    }
    if let (Some(store), true) = (&options.store, stored_any) {
        manifest.save(store)?;
    }

    tracing::debug!(files = report.files, cache = %report.cache, "images optimized");
    Ok(report)
}
