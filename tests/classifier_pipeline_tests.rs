//! Calibrate -> persist -> classify pipeline tests over real files.

mod helpers;

use std::sync::Arc;

use helpers::{calibrated_stage, green_tile_frame, stage, white_tile_frame};
use tilestage::classifier::Classifier;
use tilestage::refstore::ReferenceStore;
use tilestage::status::StatusLedger;
use tilestage::TileLabel;

#[test]
fn reference_status_tracks_calibration_progress() {
    let stage = stage();
    let status = stage.orchestrator.reference_status();
    assert!(status.values().all(|ready| !ready));

    stage
        .orchestrator
        .calibrate(TileLabel::WhiteDragon, &white_tile_frame())
        .unwrap();
    let status = stage.orchestrator.reference_status();
    assert!(status[&TileLabel::WhiteDragon]);
    assert!(!status[&TileLabel::OneDot]);
}

#[test]
fn identify_matches_each_calibrated_face() {
    let stage = calibrated_stage();

    let white = stage.orchestrator.identify(&white_tile_frame());
    assert_eq!(white.label, TileLabel::WhiteDragon);
    assert!(white.confidence > 0.5, "{white:?}");

    let green = stage.orchestrator.identify(&green_tile_frame());
    assert_eq!(green.label, TileLabel::OneDot);
    assert!(green.confidence > 0.5, "{green:?}");
}

#[test]
fn capture_and_identify_uses_the_camera_frame() {
    let stage = calibrated_stage();
    stage.capture.push_frame(green_tile_frame());

    let result = stage.orchestrator.capture_and_identify().unwrap();
    assert_eq!(result.label, TileLabel::OneDot);
    assert_eq!(stage.capture.capture_count(), 1);
}

#[test]
fn verdicts_survive_a_store_reload() {
    let stage = calibrated_stage();
    let before = stage.orchestrator.identify(&white_tile_frame());

    // A second process opening the same reference directory.
    let ledger = Arc::new(StatusLedger::new());
    let store = ReferenceStore::open(stage.refs_path(), Arc::clone(&ledger)).unwrap();
    let classifier = Classifier::new(store, ledger);
    let after = classifier.identify(&white_tile_frame());

    assert_eq!(before.label, after.label);
    assert!((before.confidence - after.confidence).abs() < 1e-9);
}

#[test]
fn recalibration_overwrites_the_previous_reference() {
    let stage = calibrated_stage();
    // Re-teach white_dragon with the green face; the green frame should
    // now be ambiguous-at-best for one_dot, and the white frame should no
    // longer match white_dragon decisively.
    stage
        .orchestrator
        .calibrate(TileLabel::WhiteDragon, &green_tile_frame())
        .unwrap();

    let white = stage.orchestrator.identify(&white_tile_frame());
    assert!(
        white.label != TileLabel::WhiteDragon || white.confidence <= 0.5,
        "stale reference must not win decisively: {white:?}"
    );
}

#[test]
fn classifier_is_shareable_across_threads() {
    let stage = calibrated_stage();
    let orchestrator = Arc::new(stage.orchestrator);
    let mut handles = Vec::new();
    for _ in 0..4 {
        let orchestrator = Arc::clone(&orchestrator);
        handles.push(std::thread::spawn(move || {
            orchestrator.identify(&white_tile_frame()).label
        }));
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), TileLabel::WhiteDragon);
    }
}
