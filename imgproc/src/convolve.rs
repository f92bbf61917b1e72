use pano_core::{Error, ImageGrid, Result};
use rayon::prelude::*;

/// A square convolution kernel of odd side length.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    data: Vec<f32>,
}

impl Kernel {
    /// Build a kernel from row-major entries. Even side lengths are
    /// rejected: convolution is undefined without a center tap.
    pub fn new(data: Vec<f32>, size: usize) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(Error::invalid_config(format!(
                "kernel side length must be odd and positive, got {size}"
            )));
        }
        if data.len() != size * size {
            return Err(Error::invalid_config(format!(
                "kernel buffer length {} does not match {size}x{size}",
                data.len()
            )));
        }
        Ok(Self { size, data })
    }

    /// The 1x1 identity kernel.
    pub fn identity() -> Self {
        Self {
            size: 1,
            data: vec![1.0],
        }
    }

    /// Horizontal Sobel gradient.
    pub fn sobel_x() -> Self {
        Self {
            size: 3,
            data: vec![-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0],
        }
    }

    /// Vertical Sobel gradient.
    pub fn sobel_y() -> Self {
        Self {
            size: 3,
            data: vec![-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0],
        }
    }

    /// Gaussian kernel of the given side length and sigma, normalized so
    /// the entries sum to 1.
    pub fn gaussian(size: usize, sigma: f32) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(Error::invalid_config(format!(
                "gaussian sigma must be positive, got {sigma}"
            )));
        }
        let center = (size / 2) as isize;
        let mut data = Vec::with_capacity(size * size);
        let mut sum = 0.0f32;
        for i in 0..size as isize {
            let y = i - center;
            for j in 0..size as isize {
                let x = j - center;
                let v = (-((x * x + y * y) as f32) / (2.0 * sigma * sigma)).exp();
                data.push(v);
                sum += v;
            }
        }
        for v in &mut data {
            *v /= sum;
        }
        Self::new(data, size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Half-width of the kernel; also the width of the border band the
    /// convolution leaves undefined.
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.size + x]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Convolve one output row. Rows within `radius` of the top or bottom
/// edge, and the first/last `radius` columns, are left untouched (zero):
/// output is only defined on interior pixels.
#[inline]
fn convolve_row(image: &ImageGrid, kernel: &Kernel, y: usize, out_row: &mut [f32]) {
    let k = kernel.radius();
    let (rows, cols) = (image.rows(), image.cols());
    if y < k || y + k >= rows {
        return;
    }
    for x in k..cols - k {
        let mut sum = 0.0f32;
        for ky in 0..kernel.size() {
            let src_row = image.row(y + ky - k);
            for kx in 0..kernel.size() {
                sum += src_row[x + kx - k] * kernel.get(kx, ky);
            }
        }
        out_row[x] = sum;
    }
}

/// Sequential 2-D convolution. Output has the input's dimensions; border
/// pixels within the kernel radius of any edge are zero.
pub fn convolve(image: &ImageGrid, kernel: &Kernel) -> Result<ImageGrid> {
    let mut out = vec![0.0f32; image.rows() * image.cols()];
    for (y, out_row) in out.chunks_mut(image.cols()).enumerate() {
        convolve_row(image, kernel, y, out_row);
    }
    ImageGrid::from_vec(image.rows(), image.cols(), out)
}

/// Row-parallel convolution on a fixed-size pool. Each pool thread owns a
/// disjoint set of output rows, so no locking is needed; the pool join is
/// the single synchronization point.
pub fn convolve_par(
    image: &ImageGrid,
    kernel: &Kernel,
    pool: &rayon::ThreadPool,
) -> Result<ImageGrid> {
    let cols = image.cols();
    let mut out = vec![0.0f32; image.rows() * cols];
    pool.install(|| {
        out.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(y, out_row)| convolve_row(image, kernel, y, out_row));
    });
    ImageGrid::from_vec(image.rows(), image.cols(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pano_core::build_pool;

    fn ramp(rows: usize, cols: usize) -> ImageGrid {
        let data = (0..rows * cols)
            .map(|i| ((i * 7919) % 256) as f32)
            .collect();
        ImageGrid::from_vec(rows, cols, data).unwrap()
    }

    #[test]
    fn even_kernel_rejected() {
        assert!(matches!(
            Kernel::new(vec![1.0; 4], 2),
            Err(Error::InvalidConfig(_))
        ));
        assert!(Kernel::new(vec![1.0; 16], 4).is_err());
    }

    #[test]
    fn identity_kernel_preserves_interior() {
        let img = ramp(8, 9);
        let out = convolve(&img, &Kernel::identity()).unwrap();
        // Radius 0: every pixel is interior.
        assert_eq!(out, img);
    }

    #[test]
    fn gaussian_sums_to_one_and_is_symmetric() {
        let k = Kernel::gaussian(7, 1.3).unwrap();
        let sum: f32 = k.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);

        // 180-degree rotational symmetry.
        let n = k.size();
        for y in 0..n {
            for x in 0..n {
                let a = k.get(x, y);
                let b = k.get(n - 1 - x, n - 1 - y);
                assert!((a - b).abs() < 1e-7, "asymmetry at ({x},{y})");
            }
        }
    }

    #[test]
    fn border_band_is_zero() {
        let img = ramp(10, 10);
        let k = Kernel::gaussian(5, 1.0).unwrap();
        let out = convolve(&img, &k).unwrap();
        for x in 0..10 {
            assert_eq!(out.get(x, 0), 0.0);
            assert_eq!(out.get(x, 1), 0.0);
            assert_eq!(out.get(x, 9), 0.0);
        }
        for y in 0..10 {
            assert_eq!(out.get(0, y), 0.0);
            assert_eq!(out.get(9, y), 0.0);
        }
        // A strictly interior pixel of a positive image is positive.
        assert!(out.get(5, 5) > 0.0);
    }

    #[test]
    fn sobel_responds_to_step_edge() {
        let mut data = vec![0.0f32; 9 * 9];
        for y in 0..9 {
            for x in 5..9 {
                data[y * 9 + x] = 100.0;
            }
        }
        let img = ImageGrid::from_vec(9, 9, data).unwrap();
        let gx = convolve(&img, &Kernel::sobel_x()).unwrap();
        let gy = convolve(&img, &Kernel::sobel_y()).unwrap();
        assert!(gx.get(4, 4) > 0.0);
        assert_eq!(gy.get(4, 4), 0.0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let img = ramp(33, 21);
        let k = Kernel::gaussian(5, 1.4).unwrap();
        let seq = convolve(&img, &k).unwrap();
        let pool = build_pool(4).unwrap();
        let par = convolve_par(&img, &k, &pool).unwrap();
        assert_eq!(seq, par);
    }
}
