use crate::dlt::{fit_homography, is_degenerate, PointPair};
use pano_core::{
    build_pool, run_workers, Backend, Error, Homography, KeyPoint, Match, Result, StitchConfig,
};
use pano_hal::GpuContext;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Arc;

/// Odd multiplier decorrelating per-iteration RNG streams derived from
/// one base seed.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// RANSAC homography estimator.
///
/// Every global iteration index owns its own RNG stream, seeded from
/// the configured base seed and the index alone. The candidate drawn
/// for iteration `i` is therefore the same no matter which thread,
/// worker, or device evaluates it, and the winner (most inliers,
/// earliest iteration on ties) is identical across backends and
/// worker counts.
pub struct HomographyEstimator {
    config: StitchConfig,
    pool: Option<rayon::ThreadPool>,
    gpu: Option<Arc<GpuContext>>,
}

#[derive(Debug, Clone)]
struct Candidate {
    model: Homography,
    inliers: usize,
    iteration: usize,
}

impl Candidate {
    /// Strict total order: more inliers wins, earliest iteration breaks
    /// ties. Iteration indices are unique, so the winner is independent
    /// of evaluation and reduction order.
    fn beats(&self, other: &Candidate) -> bool {
        self.inliers > other.inliers
            || (self.inliers == other.inliers && self.iteration < other.iteration)
    }
}

fn better(a: Option<Candidate>, b: Option<Candidate>) -> Option<Candidate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.beats(&a) { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

impl HomographyEstimator {
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

    /// Estimate the homography mapping source keypoints onto their
    /// matched target keypoints.
    pub fn estimate(
        &self,
        source: &[KeyPoint],
        target: &[KeyPoint],
        matches: &[Match],
    ) -> Result<Homography> {
        let pairs: Vec<PointPair> = matches
            .iter()
            .map(|m| {
                let s = &source[m.source_idx];
                let t = &target[m.target_idx];
                ([s.x, s.y], [t.x, t.y])
            })
            .collect();
        self.estimate_pairs(&pairs)
    }

    /// Estimate from raw point correspondences.
    pub fn estimate_pairs(&self, pairs: &[PointPair]) -> Result<Homography> {
        if pairs.len() < 4 {
            return Err(Error::InsufficientInliers {
                found: pairs.len(),
                required: self.config.ransac_min_inliers,
            });
        }

        let iterations = self.config.ransac_iterations;
        let best = match self.config.backend {
            Backend::Sequential => (0..iterations)
                .map(|i| self.evaluate(pairs, i))
                .fold(None, better),
            Backend::SharedMemory { .. } => {
                let pool = self
                    .pool
                    .as_ref()
                    .ok_or_else(|| Error::backend_unavailable("thread pool missing"))?;
                pool.install(|| {
                    (0..iterations)
                        .into_par_iter()
                        .map(|i| self.evaluate(pairs, i))
                        .reduce(|| None, better)
                })
            }
            Backend::Distributed { workers } => {
                let partial = run_workers(workers, |topology| {
                    Ok(topology
                        .share(iterations)
                        .map(|i| self.evaluate(pairs, i))
                        .fold(None, better))
                })?;
                partial.into_iter().fold(None, better)
            }
            Backend::Accelerator => self.best_on_device(pairs, iterations)?,
        };

        // Every iteration exhausted its resample budget without a valid
        // sample: no model was ever scored.
        let best = best.ok_or(Error::InsufficientInliers {
            found: 0,
            required: self.config.ransac_min_inliers,
        })?;
        log::debug!(
            "ransac winner from iteration {} with {} inliers via {}",
            best.iteration,
            best.inliers,
            self.config.backend
        );
        self.finalize(pairs, best)
    }

    /// Draw and score the candidate owned by one global iteration.
    /// Yields nothing when every redraw within the resample budget is
    /// degenerate; that iteration then simply contributes no candidate.
    fn evaluate(&self, pairs: &[PointPair], iteration: usize) -> Option<Candidate> {
        let model = self.draw_model(pairs, iteration)?;
        let inliers = count_inliers(&model, pairs, self.config.ransac_inlier_threshold);
        Some(Candidate {
            model,
            inliers,
            iteration,
        })
    }

    fn draw_model(&self, pairs: &[PointPair], iteration: usize) -> Option<Homography> {
        let seed = self.config.base_seed ^ (iteration as u64).wrapping_mul(SEED_MIX);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..self.config.max_resample_attempts {
            let picks = rand::seq::index::sample(&mut rng, pairs.len(), 4);
            let sample = [
                pairs[picks.index(0)],
                pairs[picks.index(1)],
                pairs[picks.index(2)],
                pairs[picks.index(3)],
            ];
            let source: Vec<[f64; 2]> = sample.iter().map(|p| p.0).collect();
            let target: Vec<[f64; 2]> = sample.iter().map(|p| p.1).collect();
            if is_degenerate(&source) || is_degenerate(&target) {
                continue;
            }
            if let Some(model) = fit_homography(&sample) {
                return Some(model);
            }
        }
        None
    }

    /// Accelerator strategy: candidates are still drawn on the host from
    /// the per-iteration streams, then the whole batch is scored on the
    /// device, one thread per candidate. The winner's inlier set is
    /// recomputed on the host in double precision before the refit.
    fn best_on_device(&self, pairs: &[PointPair], iterations: usize) -> Result<Option<Candidate>> {
        let ctx = self
            .gpu
            .as_ref()
            .ok_or_else(|| Error::backend_unavailable("device context missing"))?;

        let mut drawn = Vec::with_capacity(iterations);
        for i in 0..iterations {
            if let Some(model) = self.draw_model(pairs, i) {
                drawn.push((i, model));
            }
        }
        if drawn.is_empty() {
            return Ok(None);
        }

        let models: Vec<[f32; 9]> = drawn
            .iter()
            .map(|(_, m)| m.to_array().map(|v| v as f32))
            .collect();
        let points: Vec<[f32; 4]> = pairs
            .iter()
            .map(|&([sx, sy], [tx, ty])| [sx as f32, sy as f32, tx as f32, ty as f32])
            .collect();
        let counts = pano_hal::kernels::ransac::count_inliers(
            ctx,
            &models,
            &points,
            self.config.ransac_inlier_threshold,
        )?;

        // Drawn in ascending iteration order, so a strict > keeps the
        // earliest iteration on count ties.
        let mut winner = 0;
        for (idx, &count) in counts.iter().enumerate() {
            if count > counts[winner] {
                winner = idx;
            }
        }
        let (iteration, model) = drawn.swap_remove(winner);
        let inliers = count_inliers(&model, pairs, self.config.ransac_inlier_threshold);
        Ok(Some(Candidate {
            model,
            inliers,
            iteration,
        }))
    }

    /// Recompute the winner's inlier set in double precision, enforce
    /// the minimum inlier count, and refit over all inliers. A failed
    /// refit keeps the minimal-sample model.
    fn finalize(&self, pairs: &[PointPair], best: Candidate) -> Result<Homography> {
        let threshold = self.config.ransac_inlier_threshold;
        let inlier_pairs: Vec<PointPair> = pairs
            .iter()
            .copied()
            .filter(|p| is_inlier(&best.model, p, threshold))
            .collect();
        if inlier_pairs.len() < self.config.ransac_min_inliers {
            return Err(Error::InsufficientInliers {
                found: inlier_pairs.len(),
                required: self.config.ransac_min_inliers,
            });
        }
        match fit_homography(&inlier_pairs) {
            Some(refined) => Ok(refined),
            None => {
                log::warn!("least-squares refit failed, keeping minimal-sample model");
                Ok(best.model)
            }
        }
    }
}

fn is_inlier(model: &Homography, &([sx, sy], [tx, ty]): &PointPair, threshold: f64) -> bool {
    match model.project(sx, sy) {
        Some((px, py)) => {
            let (dx, dy) = (px - tx, py - ty);
            dx * dx + dy * dy < threshold * threshold
        }
        None => false,
    }
}

fn count_inliers(model: &Homography, pairs: &[PointPair], threshold: f64) -> usize {
    pairs.iter().filter(|p| is_inlier(model, p, threshold)).count()
}
