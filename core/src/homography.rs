use nalgebra::{Matrix3, Vector3};

const W_EPS: f64 = 1e-12;

/// A 3x3 projective transform mapping homogeneous source coordinates to
/// target coordinates, normalized so the bottom-right entry is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// A pure translation by `(dx, dy)`.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m: Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0),
        }
    }

    /// Normalize an arbitrary matrix so `h[2][2] == 1`. Returns `None`
    /// when the bottom-right entry is (numerically) zero or non-finite,
    /// in which case the matrix cannot represent a finite image-to-image
    /// mapping at the origin.
    pub fn from_matrix(m: Matrix3<f64>) -> Option<Self> {
        let w = m[(2, 2)];
        if !w.is_finite() || w.abs() < W_EPS {
            return None;
        }
        let m = m / w;
        if m.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { m })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Row-major entries.
    pub fn to_array(&self) -> [f64; 9] {
        [
            self.m[(0, 0)],
            self.m[(0, 1)],
            self.m[(0, 2)],
            self.m[(1, 0)],
            self.m[(1, 1)],
            self.m[(1, 2)],
            self.m[(2, 0)],
            self.m[(2, 1)],
            self.m[(2, 2)],
        ]
    }

    /// Project a source point; `None` when the point maps to infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.m * Vector3::new(x, y, 1.0);
        if !v[2].is_finite() || v[2].abs() < W_EPS {
            return None;
        }
        let (px, py) = (v[0] / v[2], v[1] / v[2]);
        if px.is_finite() && py.is_finite() {
            Some((px, py))
        } else {
            None
        }
    }

    /// The transform applying `other` first, then `self`.
    pub fn compose(&self, other: &Homography) -> Option<Homography> {
        Homography::from_matrix(self.m * other.m)
    }

    pub fn inverse(&self) -> Option<Homography> {
        self.m.try_inverse().and_then(Homography::from_matrix)
    }

    /// Largest absolute entry-wise difference to another homography.
    pub fn max_abs_diff(&self, other: &Homography) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
