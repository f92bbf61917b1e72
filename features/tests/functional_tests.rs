use pano_core::{Backend, ImageGrid, KeyPoint, StitchConfig};
use pano_features::{CornerDetector, KeypointMatcher};

/// A dark frame with a bright axis-aligned square: strong Harris
/// responses at its four corners, none along its edges.
fn square_image(rows: usize, cols: usize, top: usize, left: usize, side: usize) -> ImageGrid {
    let mut data = vec![10.0f32; rows * cols];
    for y in top..top + side {
        for x in left..left + side {
            data[y * cols + x] = 250.0;
        }
    }
    ImageGrid::from_vec(rows, cols, data).unwrap()
}

fn test_config(backend: Backend) -> StitchConfig {
    StitchConfig {
        corner_threshold: 1.0e7,
        ..StitchConfig::default().with_backend(backend)
    }
}

fn detect(backend: Backend, image: &ImageGrid) -> Vec<KeyPoint> {
    CornerDetector::new(test_config(backend))
        .unwrap()
        .detect(image)
        .unwrap()
}

#[test]
fn finds_square_corners() {
    let image = square_image(64, 64, 20, 24, 24);
    let corners = [(24.0, 20.0), (47.0, 20.0), (24.0, 43.0), (47.0, 43.0)];

    let keypoints = detect(Backend::Sequential, &image);
    assert!(!keypoints.is_empty());
    for kp in &keypoints {
        let nearest = corners
            .iter()
            .map(|&(cx, cy)| (kp.x - cx).powi(2) + (kp.y - cy).powi(2))
            .fold(f64::INFINITY, f64::min);
        assert!(
            nearest <= 9.0,
            "keypoint at ({}, {}) is not near any square corner",
            kp.x,
            kp.y
        );
    }
    // Every corner has at least one keypoint nearby.
    for (cx, cy) in corners {
        assert!(
            keypoints
                .iter()
                .any(|kp| (kp.x - cx).powi(2) + (kp.y - cy).powi(2) <= 9.0),
            "no keypoint near corner ({cx}, {cy})"
        );
    }
}

#[test]
fn isolated_corner_is_localized_on_every_backend() {
    // A bright quadrant whose inner corner sits at (50, 50).
    let mut data = vec![10.0f32; 100 * 100];
    for y in 50..100 {
        for x in 50..100 {
            data[y * 100 + x] = 250.0;
        }
    }
    let image = ImageGrid::from_vec(100, 100, data).unwrap();

    for backend in [
        Backend::Sequential,
        Backend::SharedMemory { threads: 4 },
        Backend::Distributed { workers: 3 },
    ] {
        let keypoints = detect(backend, &image);
        assert_eq!(keypoints.len(), 1, "{backend}: expected a single keypoint");
        let kp = &keypoints[0];
        let dist = ((kp.x - 50.0).powi(2) + (kp.y - 50.0).powi(2)).sqrt();
        assert!(
            dist <= 2.0,
            "{backend}: keypoint at ({}, {}) too far from the corner",
            kp.x,
            kp.y
        );
    }
}

#[test]
fn matching_is_invariant_under_target_permutation() {
    let image = square_image(64, 64, 20, 24, 24);
    let config = test_config(Backend::Sequential);
    let detector = CornerDetector::new(config.clone()).unwrap();
    let matcher = KeypointMatcher::new(config).unwrap();

    let source = detector.detect(&image).unwrap();
    let target = source.clone();
    let mut shuffled = target.clone();
    shuffled.reverse();

    let direct = matcher.match_keypoints(&source, &target).unwrap();
    let permuted = matcher.match_keypoints(&source, &shuffled).unwrap();
    assert_eq!(direct.len(), permuted.len());
    for (a, b) in direct.iter().zip(&permuted) {
        assert_eq!(a.source_idx, b.source_idx);
        // Same keypoint matched, found at its permuted position.
        assert_eq!(target[a.target_idx], shuffled[b.target_idx]);
        assert_eq!(a.distance, b.distance);
    }
}

#[test]
fn keypoints_are_canonically_ordered() {
    let image = square_image(64, 64, 20, 24, 24);
    let keypoints = detect(Backend::Sequential, &image);
    for pair in keypoints.windows(2) {
        let earlier = (pair[0].y, pair[0].x);
        let later = (pair[1].y, pair[1].x);
        assert!(earlier < later, "keypoints out of row-then-column order");
    }
}

#[test]
fn partitioned_detection_matches_sequential() {
    let image = square_image(96, 80, 30, 17, 33);
    let seq = detect(Backend::Sequential, &image);
    assert!(!seq.is_empty());

    assert_eq!(seq, detect(Backend::SharedMemory { threads: 4 }, &image));
    for workers in [1, 2, 3, 7] {
        assert_eq!(
            seq,
            detect(Backend::Distributed { workers }, &image),
            "distributed({workers}) diverged"
        );
    }
    // Degenerate topology: more workers than image rows.
    assert_eq!(seq, detect(Backend::Distributed { workers: 128 }, &image));
}

#[test]
fn accelerator_detection_matches_sequential() {
    let image = square_image(64, 64, 20, 24, 24);
    let detector = match CornerDetector::new(test_config(Backend::Accelerator)) {
        Ok(d) => d,
        // No compute adapter on this host.
        Err(_) => return,
    };
    let gpu = detector.detect(&image).unwrap();
    let seq = detect(Backend::Sequential, &image);

    assert_eq!(gpu.len(), seq.len());
    for (g, s) in gpu.iter().zip(&seq) {
        assert_eq!((g.x, g.y), (s.x, s.y));
        let rel = (g.response - s.response).abs() / s.response.abs().max(1.0);
        assert!(rel < 1e-3, "response diverged at ({}, {})", g.x, g.y);
        assert_eq!(g.patch, s.patch);
    }
}

#[test]
fn detect_then_match_links_shifted_squares() {
    // The same square, shifted four pixels right in the second frame.
    let left = square_image(64, 64, 20, 20, 24);
    let right = square_image(64, 64, 20, 24, 24);

    let config = test_config(Backend::Sequential);
    let detector = CornerDetector::new(config.clone()).unwrap();
    let matcher = KeypointMatcher::new(config).unwrap();

    let kps_left = detector.detect(&left).unwrap();
    let kps_right = detector.detect(&right).unwrap();
    let matches = matcher.match_keypoints(&kps_left, &kps_right).unwrap();
    assert!(!matches.is_empty());

    // Every perfect-SSD match reflects the known horizontal shift.
    for m in matches.iter().filter(|m| m.distance == 0.0) {
        let s = &kps_left[m.source_idx];
        let t = &kps_right[m.target_idx];
        assert_eq!(t.x - s.x, 4.0);
        assert_eq!(t.y, s.y);
    }
}
