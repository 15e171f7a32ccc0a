//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between file handling and pixel
//! work. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked into the binary.

use super::params::OptimizeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// `Sync` so a single backend can be shared across rayon workers.
pub trait ImageBackend: Sync {
    /// Decode `params.source` and re-encode it in its own format.
    ///
    /// Returns the encoded bytes; the caller decides whether to keep them.
    fn encode(&self, params: &OptimizeParams) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{ImageKind, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations and returns canned bytes.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        /// Bytes returned by every `encode` call. Empty means "fail".
        pub encoded: Vec<u8>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Encode {
            source: String,
            kind: ImageKind,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn encoding_to(bytes: &[u8]) -> Self {
            Self {
                encoded: bytes.to_vec(),
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn encode(&self, params: &OptimizeParams) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                source: params.source.to_string_lossy().to_string(),
                kind: params.kind,
                quality: params.quality.value(),
            });
            if self.encoded.is_empty() {
                return Err(BackendError::ProcessingFailed("mock decode failure".into()));
            }
            Ok(self.encoded.clone())
        }
    }

    #[test]
    fn mock_records_encode() {
        let backend = MockBackend::encoding_to(b"tiny");
        let bytes = backend
            .encode(&OptimizeParams {
                source: "/img/photo.jpg".into(),
                kind: ImageKind::Jpeg,
                quality: Quality::new(70),
            })
            .unwrap();
        assert_eq!(bytes, b"tiny");

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Encode {
                kind: ImageKind::Jpeg,
                quality: 70,
                ..
            }
        ));
    }

    #[test]
    fn mock_without_bytes_fails() {
        let backend = MockBackend::new();
        let result = backend.encode(&OptimizeParams {
            source: "/img/broken.png".into(),
            kind: ImageKind::Png,
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }
}
