use crate::{Error, Result};
use std::fmt;

/// Execution strategy for every pipeline stage. One algorithm, four ways
/// of partitioning its work; all four must produce equivalent results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Single-threaded baseline, stage order = dependency order.
    Sequential,
    /// Fixed-size local thread pool, work statically partitioned by row,
    /// keypoint, or iteration range; no locking on the hot path.
    SharedMemory { threads: usize },
    /// Fixed set of workers with explicit rank and count; each computes
    /// its partition (plus halo rows where convolution needs them) and a
    /// single gather combines the partial results. Run in-process with a
    /// simulated topology so the same code path is testable anywhere.
    Distributed { workers: usize },
    /// One logical unit of work per element on a GPU, per stage.
    Accelerator,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sequential => write!(f, "sequential"),
            Backend::SharedMemory { threads } => write!(f, "shared-memory({threads})"),
            Backend::Distributed { workers } => write!(f, "distributed({workers})"),
            Backend::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// The full configuration bundle consumed by detector, matcher, and
/// estimator constructors. Immutable; validated once at construction of
/// the first component that receives it.
#[derive(Debug, Clone)]
pub struct StitchConfig {
    /// Side length of the Gaussian smoothing kernel (odd).
    pub kernel_size: usize,
    pub gaussian_sigma: f32,
    /// Minimum Harris response for a pixel to become a keypoint.
    pub corner_threshold: f32,
    /// Side length of the non-maximum-suppression window (odd).
    pub nonmax_window: usize,
    /// Harris sensitivity constant kappa.
    pub harris_k: f32,
    /// Side length of the intensity patch descriptor (odd).
    pub patch_size: usize,
    /// Maximum patch SSD for a match to be kept.
    pub match_threshold: f64,
    pub ransac_iterations: usize,
    /// Reprojection distance below which a match counts as an inlier.
    pub ransac_inlier_threshold: f64,
    /// Minimum inlier count for the final model to be accepted.
    pub ransac_min_inliers: usize,
    /// Bound on redraws when a sample turns out degenerate.
    pub max_resample_attempts: usize,
    pub base_seed: u64,
    pub backend: Backend,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            kernel_size: 5,
            gaussian_sigma: 1.0,
            corner_threshold: 1.0e6,
            nonmax_window: 5,
            harris_k: 0.04,
            patch_size: 7,
            match_threshold: f64::INFINITY,
            ransac_iterations: 500,
            ransac_inlier_threshold: 3.0,
            ransac_min_inliers: 8,
            max_resample_attempts: 32,
            base_seed: 0x5eed_1234,
            backend: Backend::Sequential,
        }
    }
}

impl StitchConfig {
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("kernel_size", self.kernel_size),
            ("nonmax_window", self.nonmax_window),
            ("patch_size", self.patch_size),
        ] {
            if size == 0 || size % 2 == 0 {
                return Err(Error::invalid_config(format!(
                    "{name} must be odd and positive, got {size}"
                )));
            }
        }
        if !(self.gaussian_sigma > 0.0) {
            return Err(Error::invalid_config(format!(
                "gaussian_sigma must be positive, got {}",
                self.gaussian_sigma
            )));
        }
        if self.ransac_iterations == 0 {
            return Err(Error::invalid_config("ransac_iterations must be >= 1"));
        }
        if self.ransac_min_inliers < 4 {
            return Err(Error::invalid_config(
                "ransac_min_inliers must be >= 4 (the minimal sample size)",
            ));
        }
        if self.max_resample_attempts == 0 {
            return Err(Error::invalid_config("max_resample_attempts must be >= 1"));
        }
        match self.backend {
            Backend::SharedMemory { threads: 0 } => Err(Error::UnknownBackend(
                "shared-memory topology requires at least one thread".into(),
            )),
            Backend::Distributed { workers: 0 } => Err(Error::UnknownBackend(
                "distributed topology requires at least one worker".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Radius of the patch descriptor window.
    pub fn patch_radius(&self) -> usize {
        self.patch_size / 2
    }

    /// Radius of the non-maximum-suppression window.
    pub fn nonmax_radius(&self) -> usize {
        self.nonmax_window / 2
    }

    /// Rows of context a distributed worker needs beyond its partition so
    /// that gradients, smoothing, and suppression near the boundary see
    /// the same neighborhood the sequential pass sees: Sobel radius plus
    /// Gaussian radius plus suppression radius.
    pub fn detector_halo(&self) -> usize {
        1 + self.kernel_size / 2 + self.nonmax_radius()
    }
}
