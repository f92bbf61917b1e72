use pano::{align_all, Backend, Homography, ImageGrid, StitchConfig, Stitcher};

/// Four bright squares of distinct intensity on a dark field, shifted
/// by `(dx, dy)`. Distinct intensities keep every corner descriptor
/// unique, so patch matching is unambiguous.
fn scene(dx: i64, dy: i64) -> ImageGrid {
    const ROWS: usize = 128;
    const COLS: usize = 128;
    let squares: [(i64, i64, i64, f32); 4] = [
        (18, 16, 14, 100.0),
        (78, 20, 16, 160.0),
        (24, 74, 12, 220.0),
        (82, 80, 18, 250.0),
    ];
    let mut data = vec![12.0f32; ROWS * COLS];
    for &(left, top, side, value) in &squares {
        for y in top + dy..top + dy + side {
            for x in left + dx..left + dx + side {
                data[y as usize * COLS + x as usize] = value;
            }
        }
    }
    ImageGrid::from_vec(ROWS, COLS, data).unwrap()
}

fn config(backend: Backend) -> StitchConfig {
    StitchConfig {
        corner_threshold: 1.0e7,
        ..StitchConfig::default().with_backend(backend)
    }
}

#[test]
fn sequential_recovers_known_translation() {
    let source = scene(0, 0);
    let target = scene(5, 3);
    let alignment = Stitcher::new(config(Backend::Sequential))
        .unwrap()
        .align(&source, &target)
        .unwrap();

    assert!(alignment.matches.len() >= 8);
    let truth = Homography::translation(5.0, 3.0);
    assert!(
        truth.max_abs_diff(&alignment.homography) < 1e-3,
        "expected ~translation(5,3), got {:?}",
        alignment.homography.to_array()
    );
}

#[test]
fn cpu_backends_produce_identical_alignments() {
    let source = scene(0, 0);
    let target = scene(5, 3);
    let reference = Stitcher::new(config(Backend::Sequential))
        .unwrap()
        .align(&source, &target)
        .unwrap();

    for backend in [
        Backend::SharedMemory { threads: 2 },
        Backend::SharedMemory { threads: 8 },
        Backend::Distributed { workers: 3 },
        Backend::Distributed { workers: 6 },
    ] {
        let alignment = Stitcher::new(config(backend))
            .unwrap()
            .align(&source, &target)
            .unwrap();
        assert_eq!(
            alignment.source_keypoints, reference.source_keypoints,
            "{backend}: keypoints diverged"
        );
        assert_eq!(
            alignment.matches, reference.matches,
            "{backend}: matches diverged"
        );
        assert!(
            alignment.homography.max_abs_diff(&reference.homography) < 1e-12,
            "{backend}: homography diverged"
        );
    }
}

#[test]
fn accelerator_agrees_with_sequential_when_available() {
    let stitcher = match Stitcher::new(config(Backend::Accelerator)) {
        Ok(s) => s,
        // No compute adapter on this host.
        Err(_) => return,
    };
    let source = scene(0, 0);
    let target = scene(5, 3);
    let gpu = stitcher.align(&source, &target).unwrap();
    let seq = Stitcher::new(config(Backend::Sequential))
        .unwrap()
        .align(&source, &target)
        .unwrap();

    let truth = Homography::translation(5.0, 3.0);
    assert!(truth.max_abs_diff(&gpu.homography) < 1e-2);
    assert!(seq.homography.max_abs_diff(&gpu.homography) < 1e-2);
}

#[test]
fn align_all_chains_into_first_frame() {
    let frames = [scene(0, 0), scene(4, 2), scene(9, 5)];
    let transforms = align_all(&frames, &config(Backend::Sequential)).unwrap();

    assert_eq!(transforms.len(), 3);
    assert!(transforms[0].max_abs_diff(&Homography::identity()) == 0.0);
    // Frame 2 sits nine pixels right and five down of frame 0, so the
    // transform into frame 0 is the inverse shift.
    assert!(transforms[1].max_abs_diff(&Homography::translation(-4.0, -2.0)) < 1e-3);
    assert!(transforms[2].max_abs_diff(&Homography::translation(-9.0, -5.0)) < 1e-3);
}

#[test]
fn invalid_configurations_are_rejected_up_front() {
    let bad = StitchConfig {
        kernel_size: 4,
        ..StitchConfig::default()
    };
    assert!(Stitcher::new(bad).is_err());
    assert!(align_all(&[], &StitchConfig::default()).is_err());
}
