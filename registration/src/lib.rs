pub mod dlt;
pub mod ransac;

pub use dlt::{fit_exact, fit_homography, PointPair};
pub use ransac::HomographyEstimator;
