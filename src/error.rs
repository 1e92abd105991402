//! Conversion error types

use std::path::PathBuf;

/// Errors surfaced by the conversion library.
///
/// Per-page decode failures are not represented here: they are non-fatal
/// and reported as zero-output pages by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("no recognized pages in {path}")]
    NoPages { path: PathBuf },

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("container: {detail}")]
    Container { detail: String },

    #[error("pipeline: {detail}")]
    Pipeline { detail: String },

    #[error("worker pool destroyed")]
    PoolDestroyed,
}

impl ConvertError {
    pub fn container(detail: impl Into<String>) -> Self {
        Self::Container {
            detail: detail.into(),
        }
    }

    pub fn pipeline(detail: impl Into<String>) -> Self {
        Self::Pipeline {
            detail: detail.into(),
        }
    }
}
