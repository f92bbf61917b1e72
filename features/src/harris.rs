use pano_core::{
    build_pool, run_workers, Backend, Error, ImageGrid, KeyPoint, Result, StitchConfig,
};
use pano_hal::GpuContext;
use pano_imgproc::{convolve, convolve_par, Kernel};
use rayon::prelude::*;
use std::sync::Arc;

/// Harris corner detector.
///
/// The pipeline is fixed: Sobel gradients, structure-tensor products,
/// Gaussian smoothing of each product, the Harris response
/// `det(M) - k * trace(M)^2`, then threshold plus non-maximum
/// suppression. The configured backend only decides how the per-pixel
/// work is partitioned; all backends emit the same keypoints in
/// ascending row-then-column order.
pub struct CornerDetector {
    config: StitchConfig,
    gaussian: Kernel,
    pool: Option<rayon::ThreadPool>,
    gpu: Option<Arc<GpuContext>>,
}

impl CornerDetector {
    /// Build a detector, creating a private device context when the
    /// accelerator backend is selected.
    pub fn new(config: StitchConfig) -> Result<Self> {
        let gpu = match config.backend {
            Backend::Accelerator => Some(Arc::new(GpuContext::create()?)),
            _ => None,
        };
        Self::with_context(config, gpu)
    }

    /// Build a detector around an existing device context, so one
    /// context can be shared across pipeline stages.
    pub fn with_context(config: StitchConfig, gpu: Option<Arc<GpuContext>>) -> Result<Self> {
        config.validate()?;
        if matches!(config.backend, Backend::Accelerator) && gpu.is_none() {
            return Err(Error::backend_unavailable(
                "accelerator backend selected without a device context",
            ));
        }
        let gaussian = Kernel::gaussian(config.kernel_size, config.gaussian_sigma)?;
        let pool = match config.backend {
            Backend::SharedMemory { threads } => Some(build_pool(threads)?),
            _ => None,
        };
        Ok(Self {
            config,
            gaussian,
            pool,
            gpu,
        })
    }

    /// Detect corners and attach patch descriptors.
    ///
    /// Descriptors are always extracted from the full image after the
    /// response stage has finished, so a keypoint near a partition
    /// boundary gets the same patch under every backend. Keypoints too
    /// close to the image edge for a full window carry no descriptor.
    pub fn detect(&self, image: &ImageGrid) -> Result<Vec<KeyPoint>> {
        let suppressed = match self.config.backend {
            Backend::Sequential => self.suppressed_seq(image),
            Backend::SharedMemory { .. } => {
                let pool = self
                    .pool
                    .as_ref()
                    .ok_or_else(|| Error::backend_unavailable("thread pool missing"))?;
                self.suppressed_par(image, pool)
            }
            Backend::Distributed { workers } => self.suppressed_dist(image, workers),
            Backend::Accelerator => {
                let ctx = self
                    .gpu
                    .as_ref()
                    .ok_or_else(|| Error::backend_unavailable("device context missing"))?;
                pano_hal::kernels::harris::suppressed_response(
                    ctx,
                    image,
                    self.gaussian.as_slice(),
                    self.gaussian.size(),
                    self.config.harris_k,
                    self.config.corner_threshold,
                    self.config.nonmax_radius(),
                )
            }
        }?;
        let keypoints = self.harvest(image, &suppressed);
        log::debug!(
            "detected {} corners on {}x{} via {}",
            keypoints.len(),
            image.rows(),
            image.cols(),
            self.config.backend
        );
        Ok(keypoints)
    }

    fn suppressed_seq(&self, image: &ImageGrid) -> Result<ImageGrid> {
        let gx = convolve(image, &Kernel::sobel_x())?;
        let gy = convolve(image, &Kernel::sobel_y())?;
        let (ixx, iyy, ixy) = tensor_products(&gx, &gy)?;
        let sxx = convolve(&ixx, &self.gaussian)?;
        let syy = convolve(&iyy, &self.gaussian)?;
        let sxy = convolve(&ixy, &self.gaussian)?;
        let response = harris_response(&sxx, &syy, &sxy, self.config.harris_k)?;
        suppress(
            &response,
            self.config.corner_threshold,
            self.config.nonmax_radius(),
        )
    }

    fn suppressed_par(&self, image: &ImageGrid, pool: &rayon::ThreadPool) -> Result<ImageGrid> {
        let gx = convolve_par(image, &Kernel::sobel_x(), pool)?;
        let gy = convolve_par(image, &Kernel::sobel_y(), pool)?;

        let product = |f: fn(f32, f32) -> f32| -> Result<ImageGrid> {
            let data = pool.install(|| {
                gx.as_slice()
                    .par_iter()
                    .zip(gy.as_slice())
                    .map(|(&a, &b)| f(a, b))
                    .collect()
            });
            ImageGrid::from_vec(image.rows(), image.cols(), data)
        };
        let ixx = product(|a, _| a * a)?;
        let iyy = product(|_, b| b * b)?;
        let ixy = product(|a, b| a * b)?;

        let sxx = convolve_par(&ixx, &self.gaussian, pool)?;
        let syy = convolve_par(&iyy, &self.gaussian, pool)?;
        let sxy = convolve_par(&ixy, &self.gaussian, pool)?;

        let k = self.config.harris_k;
        let data = pool.install(|| {
            sxx.as_slice()
                .par_iter()
                .zip(sxy.as_slice())
                .zip(syy.as_slice())
                .map(|((&a, &c), &b)| harris_score(a, b, c, k))
                .collect()
        });
        let response = ImageGrid::from_vec(image.rows(), image.cols(), data)?;

        let cols = image.cols();
        let radius = self.config.nonmax_radius();
        let threshold = self.config.corner_threshold;
        let mut out = vec![0.0f32; image.rows() * cols];
        pool.install(|| {
            out.par_chunks_mut(cols)
                .enumerate()
                .for_each(|(y, out_row)| suppress_row(&response, threshold, radius, y, out_row));
        });
        ImageGrid::from_vec(image.rows(), cols, out)
    }

    /// Distributed strategy: every worker receives its row partition
    /// plus `detector_halo()` rows of context on each side, runs the
    /// full sequential pipeline on that band, and emits the suppressed
    /// responses for its own rows only. The halo covers the Sobel,
    /// smoothing, and suppression windows, so each owned row sees the
    /// exact neighborhood the sequential pass sees.
    fn suppressed_dist(&self, image: &ImageGrid, workers: usize) -> Result<ImageGrid> {
        let rows = image.rows();
        let cols = image.cols();
        let halo = self.config.detector_halo();

        let parts = run_workers(workers, |topology| {
            let share = topology.share(rows);
            if share.is_empty() {
                return Ok(Vec::new());
            }
            let top = share.start.saturating_sub(halo);
            let bottom = (share.end + halo).min(rows);
            let band = image.row_band(top, bottom)?;
            let suppressed = self.suppressed_seq(&band)?;

            let offset = share.start - top;
            let mut owned = Vec::with_capacity(share.len() * cols);
            for y in offset..offset + share.len() {
                owned.extend_from_slice(suppressed.row(y));
            }
            Ok(owned)
        })?;

        let mut data = Vec::with_capacity(rows * cols);
        for part in parts {
            data.extend(part);
        }
        ImageGrid::from_vec(rows, cols, data)
    }

    /// Turn the suppressed response map into keypoints, scanning in
    /// ascending row then column order.
    fn harvest(&self, image: &ImageGrid, suppressed: &ImageGrid) -> Vec<KeyPoint> {
        let half = self.config.patch_radius();
        let mut out = Vec::new();
        for y in 0..suppressed.rows() {
            for x in 0..suppressed.cols() {
                let r = suppressed.get(x, y);
                if r != 0.0 {
                    let mut kp = KeyPoint::new(x as f64, y as f64).with_response(r as f64);
                    if let Some(patch) = image.patch(x, y, half) {
                        kp = kp.with_patch(patch);
                    }
                    out.push(kp);
                }
            }
        }
        out
    }
}

#[inline]
fn harris_score(sxx: f32, syy: f32, sxy: f32, k: f32) -> f32 {
    let trace = sxx + syy;
    sxx * syy - sxy * sxy - k * trace * trace
}

fn tensor_products(gx: &ImageGrid, gy: &ImageGrid) -> Result<(ImageGrid, ImageGrid, ImageGrid)> {
    gx.same_size(gy)?;
    let (rows, cols) = (gx.rows(), gx.cols());
    let mut ixx = Vec::with_capacity(rows * cols);
    let mut iyy = Vec::with_capacity(rows * cols);
    let mut ixy = Vec::with_capacity(rows * cols);
    for (&a, &b) in gx.as_slice().iter().zip(gy.as_slice()) {
        ixx.push(a * a);
        iyy.push(b * b);
        ixy.push(a * b);
    }
    Ok((
        ImageGrid::from_vec(rows, cols, ixx)?,
        ImageGrid::from_vec(rows, cols, iyy)?,
        ImageGrid::from_vec(rows, cols, ixy)?,
    ))
}

fn harris_response(
    sxx: &ImageGrid,
    syy: &ImageGrid,
    sxy: &ImageGrid,
    k: f32,
) -> Result<ImageGrid> {
    sxx.same_size(syy)?;
    sxx.same_size(sxy)?;
    let data = sxx
        .as_slice()
        .iter()
        .zip(syy.as_slice())
        .zip(sxy.as_slice())
        .map(|((&a, &b), &c)| harris_score(a, b, c, k))
        .collect();
    ImageGrid::from_vec(sxx.rows(), sxx.cols(), data)
}

/// Suppress one output row: a pixel survives when its response exceeds
/// the threshold and no pixel in the window (clamped at image edges)
/// has a strictly greater response. Equal-valued plateaus all survive.
fn suppress_row(response: &ImageGrid, threshold: f32, radius: usize, y: usize, out_row: &mut [f32]) {
    let (rows, cols) = (response.rows(), response.cols());
    let y0 = y.saturating_sub(radius);
    let y1 = (y + radius + 1).min(rows);
    'pixels: for x in 0..cols {
        let r = response.get(x, y);
        if r <= threshold {
            continue;
        }
        let x0 = x.saturating_sub(radius);
        let x1 = (x + radius + 1).min(cols);
        for ny in y0..y1 {
            let row = response.row(ny);
            for &v in &row[x0..x1] {
                if v > r {
                    continue 'pixels;
                }
            }
        }
        out_row[x] = r;
    }
}

fn suppress(response: &ImageGrid, threshold: f32, radius: usize) -> Result<ImageGrid> {
    let cols = response.cols();
    let mut out = vec![0.0f32; response.rows() * cols];
    for (y, out_row) in out.chunks_mut(cols).enumerate() {
        suppress_row(response, threshold, radius, y, out_row);
    }
    ImageGrid::from_vec(response.rows(), cols, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_peak() -> ImageGrid {
        let mut data = vec![0.0f32; 7 * 7];
        data[3 * 7 + 3] = 10.0;
        data[3 * 7 + 4] = 8.0;
        data[5 * 7 + 1] = 10.0; // second plateau-free peak
        ImageGrid::from_vec(7, 7, data).unwrap()
    }

    #[test]
    fn suppression_keeps_only_window_maxima() {
        let r = response_with_peak();
        let s = suppress(&r, 1.0, 1).unwrap();
        assert_eq!(s.get(3, 3), 10.0);
        // 8.0 is adjacent to a strictly greater response.
        assert_eq!(s.get(4, 3), 0.0);
        assert_eq!(s.get(1, 5), 10.0);
    }

    #[test]
    fn suppression_respects_threshold() {
        let r = response_with_peak();
        let s = suppress(&r, 10.0, 1).unwrap();
        // Strictly-greater-than threshold: 10.0 itself does not pass.
        assert_eq!(s.as_slice().iter().filter(|&&v| v != 0.0).count(), 0);
    }

    #[test]
    fn equal_plateau_survives_whole() {
        let mut data = vec![0.0f32; 5 * 5];
        data[2 * 5 + 1] = 5.0;
        data[2 * 5 + 2] = 5.0;
        let r = ImageGrid::from_vec(5, 5, data).unwrap();
        let s = suppress(&r, 1.0, 1).unwrap();
        assert_eq!(s.get(1, 2), 5.0);
        assert_eq!(s.get(2, 2), 5.0);
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = ImageGrid::from_vec(32, 32, vec![128.0; 32 * 32]).unwrap();
        let detector = CornerDetector::new(StitchConfig::default()).unwrap();
        assert!(detector.detect(&img).unwrap().is_empty());
    }

    #[test]
    fn score_matches_closed_form() {
        // det = 6 - 4 = 2, trace = 5, k = 0.04 -> 2 - 1 = 1.
        assert!((harris_score(2.0, 3.0, 2.0, 0.04) - 1.0).abs() < 1e-6);
    }
}
