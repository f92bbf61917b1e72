use crate::{Error, Result};
use image::GrayImage;

/// A single-channel intensity image: `rows x cols` values stored row-major.
///
/// Grids are never mutated after construction; every pipeline stage reads
/// the same logical grid regardless of how work is partitioned over it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGrid {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl ImageGrid {
    /// Build a grid from a row-major buffer. Fails if either dimension is
    /// zero or the buffer length does not match `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::invalid_config(format!(
                "image dimensions must be positive, got {rows}x{cols}"
            )));
        }
        if data.len() != rows * cols {
            return Err(Error::invalid_config(format!(
                "buffer length {} does not match {rows}x{cols}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// An all-zero grid of the given dimensions.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::from_vec(rows, cols, vec![0.0; rows.checked_mul(cols).unwrap_or(0)])
    }

    /// Convert an 8-bit grayscale image into an intensity grid (0..=255).
    pub fn from_gray(image: &GrayImage) -> Result<Self> {
        let data = image.as_raw().iter().map(|&p| p as f32).collect();
        Self::from_vec(image.height() as usize, image.width() as usize, data)
    }

    /// Render the grid as an 8-bit grayscale image, clamping to 0..=255.
    pub fn to_gray(&self) -> GrayImage {
        let pixels = self
            .data
            .iter()
            .map(|&v| v.clamp(0.0, 255.0).round() as u8)
            .collect();
        // Dimensions are nonzero by construction, so this cannot fail.
        GrayImage::from_vec(self.cols as u32, self.rows as u32, pixels)
            .unwrap_or_else(|| GrayImage::new(self.cols as u32, self.rows as u32))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Intensity at `(x, y)`. Panics if out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        assert!(x < self.cols && y < self.rows, "pixel ({x},{y}) out of bounds");
        self.data[y * self.cols + x]
    }

    /// Intensity at `(x, y)`, or `None` when outside the grid.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.cols && y < self.rows {
            Some(self.data[y * self.cols + x])
        } else {
            None
        }
    }

    /// One full row as a slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.cols..(y + 1) * self.cols]
    }

    /// The square patch of side `2 * half + 1` centered on `(cx, cy)`,
    /// row-major, or `None` when the window leaves the grid.
    pub fn patch(&self, cx: usize, cy: usize, half: usize) -> Option<Vec<f32>> {
        if cx < half || cy < half || cx + half >= self.cols || cy + half >= self.rows {
            return None;
        }
        let side = 2 * half + 1;
        let mut out = Vec::with_capacity(side * side);
        for y in cy - half..=cy + half {
            let row = self.row(y);
            out.extend_from_slice(&row[cx - half..=cx + half]);
        }
        Some(out)
    }

    /// Copy of the row band `[y0, y1)` as a new grid. Used to hand a
    /// distributed worker its partition plus halo rows.
    pub fn row_band(&self, y0: usize, y1: usize) -> Result<Self> {
        if y0 >= y1 || y1 > self.rows {
            return Err(Error::invalid_config(format!(
                "row band {y0}..{y1} out of range for {} rows",
                self.rows
            )));
        }
        Self::from_vec(
            y1 - y0,
            self.cols,
            self.data[y0 * self.cols..y1 * self.cols].to_vec(),
        )
    }

    /// Check that `other` has the same dimensions.
    pub fn same_size(&self, other: &Self) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(Error::DimensionMismatch {
                expected_rows: self.rows,
                expected_cols: self.cols,
                rows: other.rows,
                cols: other.cols,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            ImageGrid::from_vec(0, 10, vec![]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ImageGrid::from_vec(10, 0, vec![]),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_buffer_length() {
        assert!(ImageGrid::from_vec(2, 3, vec![0.0; 5]).is_err());
    }

    #[test]
    fn row_major_indexing() {
        let g = ImageGrid::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(g.get(0, 0), 1.0);
        assert_eq!(g.get(2, 0), 3.0);
        assert_eq!(g.get(0, 1), 4.0);
        assert_eq!(g.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(g.at(3, 0), None);
    }

    #[test]
    fn patch_inside_and_outside() {
        let g = ImageGrid::from_vec(4, 4, (0..16).map(|v| v as f32).collect()).unwrap();
        let p = g.patch(1, 1, 1).unwrap();
        assert_eq!(p, vec![0.0, 1.0, 2.0, 4.0, 5.0, 6.0, 8.0, 9.0, 10.0]);
        assert!(g.patch(0, 0, 1).is_none());
        assert!(g.patch(3, 3, 1).is_none());
    }

    #[test]
    fn row_band_extracts_rows() {
        let g = ImageGrid::from_vec(4, 2, (0..8).map(|v| v as f32).collect()).unwrap();
        let band = g.row_band(1, 3).unwrap();
        assert_eq!(band.rows(), 2);
        assert_eq!(band.as_slice(), &[2.0, 3.0, 4.0, 5.0]);
        assert!(g.row_band(3, 3).is_err());
    }

    #[test]
    fn gray_roundtrip_preserves_pixels() {
        let g = ImageGrid::from_vec(2, 3, vec![0.0, 12.0, 255.0, 300.0, -4.0, 128.4]).unwrap();
        let img = g.to_gray();
        assert_eq!(img.as_raw(), &vec![0, 12, 255, 255, 0, 128]);
        let back = ImageGrid::from_gray(&img).unwrap();
        assert_eq!(back.get(1, 0), 12.0);
    }

    #[test]
    fn same_size_reports_mismatch() {
        let a = ImageGrid::zeros(4, 4).unwrap();
        let b = ImageGrid::zeros(4, 5).unwrap();
        assert!(matches!(
            a.same_size(&b),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
