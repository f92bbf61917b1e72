/// A detected corner: position in image coordinates, corner-strength
/// response, and an optional fixed-size intensity patch used for matching.
///
/// Keypoints are immutable once the detector has produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPoint {
    pub x: f64,
    pub y: f64,
    pub response: f64,
    pub patch: Option<Vec<f32>>,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            response: 0.0,
            patch: None,
        }
    }

    pub fn with_response(mut self, response: f64) -> Self {
        self.response = response;
        self
    }

    pub fn with_patch(mut self, patch: Vec<f32>) -> Self {
        self.patch = Some(patch);
        self
    }

    /// Squared distance to another keypoint's position.
    pub fn dist_sq(&self, other: &KeyPoint) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }
}

/// A correspondence between a source and a target keypoint, by index into
/// the respective keypoint lists, with the patch SSD distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub source_idx: usize,
    pub target_idx: usize,
    pub distance: f64,
}

impl Match {
    pub fn new(source_idx: usize, target_idx: usize, distance: f64) -> Self {
        Self {
            source_idx,
            target_idx,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let kp = KeyPoint::new(3.0, 4.0)
            .with_response(7.5)
            .with_patch(vec![1.0; 9]);
        assert_eq!(kp.response, 7.5);
        assert_eq!(kp.patch.as_ref().map(Vec::len), Some(9));
        assert_eq!(KeyPoint::new(0.0, 0.0).dist_sq(&kp), 25.0);
    }
}
