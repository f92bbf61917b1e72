pub mod config;
pub mod grid;
pub mod homography;
pub mod keypoint;
pub mod topology;

pub use config::{Backend, StitchConfig};
pub use grid::ImageGrid;
pub use homography::Homography;
pub use keypoint::{KeyPoint, Match};
pub use topology::{build_pool, run_workers, Topology};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dimension mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    DimensionMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("degenerate sample: no non-collinear sample found in {attempts} attempts")]
    DegenerateSample { attempts: usize },

    #[error("insufficient inliers: best model has {found}, {required} required")]
    InsufficientInliers { found: usize, required: usize },

    #[error("unknown backend or topology: {0}")]
    UnknownBackend(String),

    #[error("backend not available: {0}")]
    BackendUnavailable(String),

    #[error("device error: {0}")]
    DeviceError(String),

    #[error("worker failed: {0}")]
    WorkerFailed(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }
}
