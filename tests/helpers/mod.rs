//! Shared fixtures for the integration suites: encoded tile frames and a
//! fully wired mock stage with zero gesture and settle delays.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tilestage::classifier::Classifier;
use tilestage::mock::{FixtureCapture, MockArm, RecordingSpeech};
use tilestage::orchestrator::Orchestrator;
use tilestage::refstore::ReferenceStore;
use tilestage::status::StatusLedger;
use tilestage::TileLabel;

/// A mock stage plus handles to every collaborator, so tests can inject
/// failures and assert on exact traffic.
pub struct TestStage {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<StatusLedger>,
    pub arm: Arc<MockArm>,
    pub capture: Arc<FixtureCapture>,
    pub speech: Arc<RecordingSpeech>,
    refs: tempfile::TempDir,
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img.clone())
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("encode png");
    bytes
}

/// Achromatic frame standing in for the white_dragon face.
pub fn white_tile_frame() -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(120, 120, Rgb([240, 240, 240])))
}

/// Strongly chromatic green frame standing in for the one_dot face.
pub fn green_tile_frame() -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(120, 120, Rgb([40, 200, 40])))
}

/// Stage with no calibrated references.
pub fn stage() -> TestStage {
    let ledger = Arc::new(StatusLedger::new());
    let refs = tempfile::tempdir().expect("tempdir");
    let store = ReferenceStore::open(refs.path(), Arc::clone(&ledger)).expect("open store");
    let classifier = Classifier::new(store, Arc::clone(&ledger));
    let arm = Arc::new(MockArm::new());
    let capture = Arc::new(FixtureCapture::new());
    let speech = Arc::new(RecordingSpeech::new());
    let arm_handle: Arc<dyn tilestage::capability::ArmCapability> = arm.clone();
    let capture_handle: Arc<dyn tilestage::capability::CaptureCapability> = capture.clone();
    let speech_handle: Arc<dyn tilestage::capability::SpeechCapability> = speech.clone();
    let orchestrator = Orchestrator::new(
        Arc::clone(&ledger),
        arm_handle,
        capture_handle,
        speech_handle,
        Arc::new(Mutex::new(classifier)),
    )
    .with_settle_delay(Duration::ZERO);
    TestStage {
        orchestrator,
        ledger,
        arm,
        capture,
        speech,
        refs,
    }
}

/// Stage with both labels calibrated from the fixture frames.
pub fn calibrated_stage() -> TestStage {
    let stage = stage();
    stage
        .orchestrator
        .calibrate(TileLabel::WhiteDragon, &white_tile_frame())
        .expect("calibrate white_dragon");
    stage
        .orchestrator
        .calibrate(TileLabel::OneDot, &green_tile_frame())
        .expect("calibrate one_dot");
    stage
}

impl TestStage {
    pub fn refs_path(&self) -> &std::path::Path {
        self.refs.path()
    }
}
