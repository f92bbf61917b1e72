use pano_core::{
    build_pool, run_workers, Backend, Error, KeyPoint, Match, Result, StitchConfig,
};
use pano_hal::kernels::matching::{match_patches, PatchSet};
use pano_hal::GpuContext;
use rayon::prelude::*;
use std::sync::Arc;
use wide::f32x8;

/// Brute-force patch matcher: for every source keypoint with a
/// descriptor, the target keypoint minimizing the patch SSD. Ties keep
/// the lower target index, so the result does not depend on how the
/// search is partitioned. Matches are emitted in ascending source
/// index order under every backend.
pub struct KeypointMatcher {
    config: StitchConfig,
    pool: Option<rayon::ThreadPool>,
    gpu: Option<Arc<GpuContext>>,
}

impl KeypointMatcher {
    pub fn new(config: StitchConfig) -> Result<Self> {
        let gpu = match config.backend {
            Backend::Accelerator => Some(Arc::new(GpuContext::create()?)),
            _ => None,
        };
        Self::with_context(config, gpu)
    }

    pub fn with_context(config: StitchConfig, gpu: Option<Arc<GpuContext>>) -> Result<Self> {
        config.validate()?;
        if matches!(config.backend, Backend::Accelerator) && gpu.is_none() {
            return Err(Error::backend_unavailable(
                "accelerator backend selected without a device context",
            ));
        }
        let pool = match config.backend {
            Backend::SharedMemory { threads } => Some(build_pool(threads)?),
            _ => None,
        };
        Ok(Self { config, pool, gpu })
    }

    /// Match source keypoints against target keypoints.
    ///
    /// Keypoints without a descriptor never match; a best distance that
    /// is not finite is dropped; a configured `match_threshold` drops
    /// matches whose SSD exceeds it.
    pub fn match_keypoints(&self, source: &[KeyPoint], target: &[KeyPoint]) -> Result<Vec<Match>> {
        let raw: Vec<Option<(usize, f64)>> = match self.config.backend {
            Backend::Sequential => source.iter().map(|s| best_match(s, target)).collect(),
            Backend::SharedMemory { .. } => {
                let pool = self
                    .pool
                    .as_ref()
                    .ok_or_else(|| Error::backend_unavailable("thread pool missing"))?;
                pool.install(|| {
                    source
                        .par_iter()
                        .map(|s| best_match(s, target))
                        .collect()
                })
            }
            Backend::Distributed { workers } => {
                let parts = run_workers(workers, |topology| {
                    Ok(source[topology.share(source.len())]
                        .iter()
                        .map(|s| best_match(s, target))
                        .collect::<Vec<_>>())
                })?;
                parts.into_iter().flatten().collect()
            }
            Backend::Accelerator => {
                let ctx = self
                    .gpu
                    .as_ref()
                    .ok_or_else(|| Error::backend_unavailable("device context missing"))?;
                let patch_len = self.config.patch_size * self.config.patch_size;
                let src = PatchSet::from_keypoints(source, patch_len);
                let tgt = PatchSet::from_keypoints(target, patch_len);
                match_patches(ctx, &src, &tgt)?
            }
        };

        let threshold = self.config.match_threshold;
        let matches: Vec<Match> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(i, best)| {
                best.and_then(|(j, d)| (d <= threshold).then(|| Match::new(i, j, d)))
            })
            .collect();
        log::debug!(
            "matched {} of {} source keypoints via {}",
            matches.len(),
            source.len(),
            self.config.backend
        );
        Ok(matches)
    }
}

/// Best target for one source keypoint: exhaustive SSD argmin with
/// strict-less-than updates, so the first (lowest-index) minimum wins.
fn best_match(source: &KeyPoint, target: &[KeyPoint]) -> Option<(usize, f64)> {
    let patch = source.patch.as_ref()?;
    let mut best: Option<(usize, f32)> = None;
    for (j, t) in target.iter().enumerate() {
        let Some(other) = t.patch.as_ref() else {
            continue;
        };
        if other.len() != patch.len() {
            continue;
        }
        let d = ssd(patch, other);
        match best {
            Some((_, b)) if d >= b => {}
            _ => best = Some((j, d)),
        }
    }
    let (j, d) = best?;
    d.is_finite().then_some((j, d as f64))
}

/// Sum of squared differences over two equal-length patches, eight
/// lanes at a time with a scalar tail.
fn ssd(a: &[f32], b: &[f32]) -> f32 {
    let load = |s: &[f32]| -> f32x8 {
        let mut arr = [0.0f32; 8];
        arr.copy_from_slice(&s[..8]);
        f32x8::from(arr)
    };

    let mut acc = f32x8::ZERO;
    let mut i = 0;
    while i + 8 <= a.len() {
        let d = load(&a[i..]) - load(&b[i..]);
        acc += d * d;
        i += 8;
    }
    let mut sum = acc.reduce_add();
    while i < a.len() {
        let d = a[i] - b[i];
        sum += d * d;
        i += 1;
    }
    sum
}
