use nalgebra::{DMatrix, Matrix3};
use pano_core::{Error, Homography, Result};

/// One correspondence: source point, target point.
pub type PointPair = ([f64; 2], [f64; 2]);

/// Squared-distance floor below which two points count as duplicates,
/// and the area floor below which three points count as collinear.
const DEGENERACY_EPS: f64 = 1e-9;

/// Direct linear transform: the homography minimizing the algebraic
/// error over the given correspondences, as the right singular vector
/// of the smallest singular value of the 2n x 9 design matrix. With
/// exactly four pairs this is the exact minimal solution; with more it
/// is the least-squares fit.
///
/// Returns `None` when there are fewer than four pairs, the SVD fails,
/// or the solution cannot be normalized to `h22 = 1`.
pub fn fit_homography(pairs: &[PointPair]) -> Option<Homography> {
    if pairs.len() < 4 {
        return None;
    }

    // The SVD needs at least as many rows as columns; with exactly four
    // pairs the 8x9 system is padded with a zero row.
    let rows = (2 * pairs.len()).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, &([sx, sy], [tx, ty])) in pairs.iter().enumerate() {
        let r = 2 * i;
        let upper = [sx, sy, 1.0, 0.0, 0.0, 0.0, -tx * sx, -tx * sy, -tx];
        let lower = [0.0, 0.0, 0.0, sx, sy, 1.0, -ty * sx, -ty * sy, -ty];
        for c in 0..9 {
            a[(r, c)] = upper[c];
            a[(r + 1, c)] = lower[c];
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let h = v_t.row(8);
    let m = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    Homography::from_matrix(m)
}

/// Exact four-point homography with an explicit degeneracy check on
/// both sides of the correspondences.
pub fn fit_exact(pairs: &[PointPair; 4]) -> Result<Homography> {
    let source: Vec<[f64; 2]> = pairs.iter().map(|p| p.0).collect();
    let target: Vec<[f64; 2]> = pairs.iter().map(|p| p.1).collect();
    if is_degenerate(&source) || is_degenerate(&target) {
        return Err(Error::DegenerateSample { attempts: 1 });
    }
    fit_homography(pairs).ok_or(Error::DegenerateSample { attempts: 1 })
}

/// A point set is degenerate when any two points coincide or any three
/// are collinear; such a sample does not determine a homography.
pub fn is_degenerate(points: &[[f64; 2]]) -> bool {
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let dx = points[i][0] - points[j][0];
            let dy = points[i][1] - points[j][1];
            if dx * dx + dy * dy < DEGENERACY_EPS {
                return true;
            }
            for k in j + 1..points.len() {
                let area = (points[j][0] - points[i][0]) * (points[k][1] - points[i][1])
                    - (points[j][1] - points[i][1]) * (points[k][0] - points[i][0]);
                if area.abs() < DEGENERACY_EPS {
                    return true;
                }
            }
        }
    }
    false
}
