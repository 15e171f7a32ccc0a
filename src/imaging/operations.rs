//! High-level image operations.
//!
//! [`optimize_file`] decides what happens to one source file: re-encode it
//! through the backend and keep whichever of original and re-encoded is
//! smaller, or copy it unchanged when no encoder applies.

use super::backend::{BackendError, ImageBackend};
use super::params::{ImageKind, OptimizeParams, Quality};
use std::fs;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Re-encoded output was smaller and replaced the original.
    Reencoded { before: u64, after: u64 },
    /// Re-encoding did not help; the original bytes were kept.
    Unchanged { size: u64 },
    /// No encoder for this format; copied as-is.
    Copied { size: u64 },
    /// Served from the optimization cache.
    Cached { size: u64 },
}

impl FileOutcome {
    /// Size before optimization, when known.
    pub fn before(self) -> u64 {
        match self {
            FileOutcome::Reencoded { before, .. } => before,
            FileOutcome::Unchanged { size }
            | FileOutcome::Copied { size }
            | FileOutcome::Cached { size } => size,
        }
    }

    /// Size written to the output.
    pub fn after(self) -> u64 {
        match self {
            FileOutcome::Reencoded { after, .. } => after,
            FileOutcome::Unchanged { size }
            | FileOutcome::Copied { size }
            | FileOutcome::Cached { size } => size,
        }
    }
}

/// Optimize `source` into `output`. The output is never larger than the source.
pub fn optimize_file(
    backend: &impl ImageBackend,
    source: &Path,
    output: &Path,
    quality: Quality,
) -> Result<FileOutcome> {
    let original = fs::read(source)?;
    let before = original.len() as u64;
    let kind = ImageKind::from_path(source);

    if !kind.is_reencodable() {
        fs::write(output, &original)?;
        return Ok(FileOutcome::Copied { size: before });
    }

    let encoded = backend.encode(&OptimizeParams {
        source: source.to_path_buf(),
        kind,
        quality,
    })?;

    if (encoded.len() as u64) < before {
        fs::write(output, &encoded)?;
        Ok(FileOutcome::Reencoded {
            before,
            after: encoded.len() as u64,
        })
    } else {
        fs::write(output, &original)?;
        Ok(FileOutcome::Unchanged { size: before })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    #[test]
    fn smaller_encoding_replaces_original() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.png");
        fs::write(&source, vec![0u8; 100]).unwrap();
        let output = tmp.path().join("out.png");

        let backend = MockBackend::encoding_to(b"small");
        let outcome = optimize_file(&backend, &source, &output, Quality::default()).unwrap();

        assert_eq!(outcome, FileOutcome::Reencoded { before: 100, after: 5 });
        assert_eq!(fs::read(&output).unwrap(), b"small");
    }

    #[test]
    fn larger_encoding_keeps_original() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("a.jpg");
        fs::write(&source, b"abc").unwrap();
        let output = tmp.path().join("out.jpg");

        let backend = MockBackend::encoding_to(b"much bigger than three bytes");
        let outcome = optimize_file(&backend, &source, &output, Quality::new(50)).unwrap();

        assert_eq!(outcome, FileOutcome::Unchanged { size: 3 });
        assert_eq!(fs::read(&output).unwrap(), b"abc");
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Encode { quality: 50, .. }
        ));
    }

    #[test]
    fn unknown_formats_are_copied_without_backend() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("logo.svg");
        fs::write(&source, "<svg/>").unwrap();
        let output = tmp.path().join("logo.svg.out");

        let backend = MockBackend::new();
        let outcome = optimize_file(&backend, &source, &output, Quality::default()).unwrap();

        assert_eq!(outcome, FileOutcome::Copied { size: 6 });
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn backend_failure_propagates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source = tmp.path().join("bad.png");
        fs::write(&source, b"junk").unwrap();

        let backend = MockBackend::new();
        let result = optimize_file(&backend, &source, &tmp.path().join("o.png"), Quality::default());
        assert!(result.is_err());
    }
}
