//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how*. They are the interface
//! between [`operations`](super::operations), which decides what happens to
//! each file, and the [`backend`](super::backend), which does the pixel work.
//!
//! - [`Quality`]: JPEG re-encoding quality (1-100, default 80). Clamped on construction.
//! - [`ImageKind`]: which encoder a file goes through, decided by extension.
//! - [`OptimizeParams`]: one re-encode request.

use std::path::{Path, PathBuf};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Encoder family for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Png,
    Jpeg,
    /// Anything else (SVG, GIF, ICO, ...). Copied byte for byte.
    Other,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => ImageKind::Png,
            Some("jpg" | "jpeg") => ImageKind::Jpeg,
            _ => ImageKind::Other,
        }
    }

    pub fn is_reencodable(self) -> bool {
        self != ImageKind::Other
    }

    /// Stable name used in cache keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Other => "other",
        }
    }
}

/// A single re-encode request.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeParams {
    pub source: PathBuf,
    pub kind: ImageKind,
    pub quality: Quality,
}
