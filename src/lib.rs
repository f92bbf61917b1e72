//! Pairwise panorama alignment.
//!
//! The pipeline is Harris corner detection, brute-force patch matching,
//! and RANSAC homography estimation. Every stage runs under one of four
//! result-equivalent execution backends: sequential, a fixed-size local
//! thread pool, a simulated distributed topology with explicit ranks
//! and halo exchange, or a GPU compute device.
//!
//! [`Stitcher`] wires the three stages together; the individual stage
//! types are re-exported for callers that need only part of the
//! pipeline.

pub mod stitch;

pub use pano_core::{
    Backend, Error, Homography, ImageGrid, KeyPoint, Match, Result, StitchConfig,
};
pub use pano_features::{CornerDetector, KeypointMatcher};
pub use pano_imgproc::{convolve, Kernel};
pub use pano_registration::HomographyEstimator;
pub use stitch::{align_all, PairAlignment, Stitcher};
