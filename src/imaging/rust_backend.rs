//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` with content sniffing |
//! | Encode PNG | `PngEncoder`, best compression + adaptive filtering |
//! | Encode JPEG | `JpegEncoder::new_with_quality`, RGB8 |
//!
//! PNG re-encoding is lossless. JPEG re-encoding is lossy at the configured
//! quality; alpha is dropped since JPEG cannot carry it.

use super::backend::{BackendError, ImageBackend};
use super::params::{ImageKind, OptimizeParams};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image, trusting content over extension.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {}", e)))?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100) as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn encode(&self, params: &OptimizeParams) -> Result<Vec<u8>, BackendError> {
        let img = load_image(&params.source)?;
        match params.kind {
            ImageKind::Png => encode_png(&img),
            ImageKind::Jpeg => encode_jpeg(&img, params.quality.value()),
            ImageKind::Other => Err(BackendError::ProcessingFailed(format!(
                "No encoder for {}",
                params.source.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::params::Quality;
    use crate::test_helpers::{create_test_jpeg, create_test_png};

    fn params(source: &Path, kind: ImageKind, quality: u32) -> OptimizeParams {
        OptimizeParams {
            source: source.to_path_buf(),
            kind,
            quality: Quality::new(quality),
        }
    }

    #[test]
    fn png_reencode_is_lossless() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("flat.png");
        create_test_png(&path, 64, 64);

        let bytes = RustBackend::new()
            .encode(&params(&path, ImageKind::Png, 80))
            .unwrap();

        let original = image::open(&path).unwrap().to_rgba8();
        let reencoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(original, reencoded);
    }

    #[test]
    fn jpeg_reencode_keeps_dimensions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        create_test_jpeg(&path, 120, 80);

        let bytes = RustBackend::new()
            .encode(&params(&path, ImageKind::Jpeg, 60))
            .unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[test]
    fn lower_quality_gives_smaller_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        create_test_jpeg(&path, 200, 200);

        let backend = RustBackend::new();
        let high = backend.encode(&params(&path, ImageKind::Jpeg, 95)).unwrap();
        let low = backend.encode(&params(&path, ImageKind::Jpeg, 20)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn corrupt_input_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let result = RustBackend::new().encode(&params(&path, ImageKind::Png, 80));
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn nonexistent_file_errors() {
        let result =
            RustBackend::new().encode(&params(Path::new("/nonexistent/a.jpg"), ImageKind::Jpeg, 80));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }
}
