//! Shared test utilities for the sitepipe test suite.
//!
//! Provides an isolated copy of the fixture site with a hermetic
//! configuration, plus image generators and directory snapshots.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let project = load_project(tmp.path());
//! build(&project).run(&Reporter::silent()).unwrap();
//!
//! let before = snapshot_dir(&project.paths.dist_base);
//! ```
//!
//! The fixture config replaces `sass` and `esbuild` with `cp`, so builds run
//! without any external toolchain. Fixture stylesheets are therefore plain CSS.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::CONFIG_FILENAME;
use crate::orchestrator::Project;
use crate::task::Reporter;

/// Config written next to the fixture site. Tools are stand-ins, the vendor
/// lists only reference fixture files, and the image cache is off so runs
/// never share state.
pub const FIXTURE_CONFIG: &str = r#"
[styles]
command = "cp"
args = ["{input}", "{output}"]
source_map = false

[scripts]
command = "cp"
args = ["{input}", "{output}"]

[vendor]
css = ["static/vendor/css/*"]
js = ["static/js/*"]

[images]
cache = false
"#;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and write the hermetic config.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    std::fs::write(tmp.path().join(CONFIG_FILENAME), FIXTURE_CONFIG).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Load the project at `root` with a silent reporter. Panics on bad config.
pub fn load_project(root: &Path) -> Arc<Project> {
    let project = Project::load(root, None, Reporter::silent())
        .unwrap_or_else(|e| panic!("fixture config must load: {e}"));
    Arc::new(project)
}

// =========================================================================
// Images
// =========================================================================

/// Write a PNG of flat color bands. Stored with fast compression so a
/// best-compression re-encode has room to shrink it.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |_, y| {
        let band = (y / 8 % 4) as u8;
        image::Rgb([band * 60, 200 - band * 40, 90])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    PngEncoder::new_with_quality(
        writer,
        image::codecs::png::CompressionType::Fast,
        image::codecs::png::FilterType::NoFilter,
    )
    .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
    .unwrap();
}

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    JpegEncoder::new_with_quality(writer, 95)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Snapshots
// =========================================================================

/// Every file under `dir` keyed by relative path, with its bytes.
pub fn snapshot_dir(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(dir)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry.path().strip_prefix(dir).unwrap().to_path_buf();
            (rel, std::fs::read(entry.path()).unwrap())
        })
        .collect()
}
