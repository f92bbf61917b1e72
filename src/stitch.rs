use pano_core::{
    Backend, Error, Homography, ImageGrid, KeyPoint, Match, Result, StitchConfig,
};
use pano_features::{CornerDetector, KeypointMatcher};
use pano_hal::GpuContext;
use pano_registration::HomographyEstimator;
use std::sync::Arc;

/// Everything produced while aligning one image pair: the keypoints of
/// both frames, the raw matches, and the estimated source-to-target
/// homography.
#[derive(Debug, Clone)]
pub struct PairAlignment {
    pub source_keypoints: Vec<KeyPoint>,
    pub target_keypoints: Vec<KeyPoint>,
    pub matches: Vec<Match>,
    pub homography: Homography,
}

/// The full detect-match-estimate pipeline under one configuration.
///
/// When the accelerator backend is selected, a single device context is
/// created here and shared by all three stages, so one alignment never
/// opens more than one device.
pub struct Stitcher {
    config: StitchConfig,
    detector: CornerDetector,
    matcher: KeypointMatcher,
    estimator: HomographyEstimator,
}

impl Stitcher {
    pub fn new(config: StitchConfig) -> Result<Self> {
        config.validate()?;
        let gpu = match config.backend {
            Backend::Accelerator => Some(Arc::new(GpuContext::create()?)),
            _ => None,
        };
        let detector = CornerDetector::with_context(config.clone(), gpu.clone())?;
        let matcher = KeypointMatcher::with_context(config.clone(), gpu.clone())?;
        let estimator = HomographyEstimator::with_context(config.clone(), gpu)?;
        Ok(Self {
            config,
            detector,
            matcher,
            estimator,
        })
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Align one pair: the returned homography maps source image
    /// coordinates into the target frame.
    pub fn align(&self, source: &ImageGrid, target: &ImageGrid) -> Result<PairAlignment> {
        let source_keypoints = self.detector.detect(source)?;
        let target_keypoints = self.detector.detect(target)?;
        let matches = self
            .matcher
            .match_keypoints(&source_keypoints, &target_keypoints)?;
        let homography = self
            .estimator
            .estimate(&source_keypoints, &target_keypoints, &matches)?;
        log::info!(
            "aligned pair: {}/{} keypoints, {} matches, backend {}",
            source_keypoints.len(),
            target_keypoints.len(),
            matches.len(),
            self.config.backend
        );
        Ok(PairAlignment {
            source_keypoints,
            target_keypoints,
            matches,
            homography,
        })
    }
}

/// Align a whole ordered sequence against its first frame: each
/// neighboring pair is aligned, and the per-pair transforms are folded
/// so entry `i` maps frame `i` into frame 0 coordinates. Entry 0 is the
/// identity.
pub fn align_all(frames: &[ImageGrid], config: &StitchConfig) -> Result<Vec<Homography>> {
    if frames.is_empty() {
        return Err(Error::invalid_config("at least one frame is required"));
    }
    let stitcher = Stitcher::new(config.clone())?;
    let mut transforms = vec![Homography::identity()];
    for i in 1..frames.len() {
        let step = stitcher.align(&frames[i], &frames[i - 1])?.homography;
        let chained = transforms[i - 1].compose(&step).ok_or_else(|| {
            Error::invalid_config("frame chain produced a non-normalizable transform")
        })?;
        transforms.push(chained);
    }
    Ok(transforms)
}
