//! Image optimization, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` |
//! | **PNG** | lossless re-encode, best compression |
//! | **JPEG** | re-encode at configured quality |
//! | **Everything else** | byte copy |
//!
//! The module is split into:
//! - **Parameters**: data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: per-file decisions combining parameters + backend

pub mod backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use operations::{FileOutcome, optimize_file};
pub use params::{ImageKind, OptimizeParams, Quality};
pub use rust_backend::RustBackend;
