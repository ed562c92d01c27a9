//! Fused histogram + color-feature tile classifier.
//!
//! The histogram alone is lighting-sensitive and cannot reliably separate
//! classes with similar brightness distributions; the color statistics
//! are an orthogonal signal because one class is achromatic and the
//! other strongly chromatic. Fusing both avoids single-signal
//! brittleness without a trained model.
//!
//! `identify` never fails: it sits mid-sequence after the arm has
//! already committed to costly motion, so shortfalls (too few
//! references, undecodable frame) degrade to an explicit low-confidence
//! fallback branch instead of propagating an error.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::error::StageResult;
use crate::features::{self, ColorFeatures};
use crate::model::{RecognizeResult, TileLabel};
use crate::refstore::ReferenceStore;
use crate::status::StatusLedger;

/// Fusion weights: histogram similarity versus color-feature similarity.
const HIST_WEIGHT: f64 = 0.55;
const FEAT_WEIGHT: f64 = 0.45;

/// Weighted L1 weights across the three color statistics.
const SAT_WEIGHT: f64 = 0.5;
const COLORFUL_WEIGHT: f64 = 0.35;
const GREEN_WEIGHT: f64 = 0.15;

/// Margin-to-confidence gain: zero margin maps to 0.5, a margin of 0.2
/// saturates to 1.0.
const MARGIN_GAIN: f64 = 2.5;

/// Confidence of the degraded random fallback result.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Similarity in [0, 1] between query and reference color statistics:
/// one minus a weighted L1 distance, mapped so a distance of 0.5 scores 0.
#[must_use]
pub fn feature_similarity(query: &ColorFeatures, reference: &ColorFeatures) -> f64 {
    let distance = SAT_WEIGHT * (query.mean_saturation - reference.mean_saturation).abs()
        + COLORFUL_WEIGHT * (query.colorful_pixel_ratio - reference.colorful_pixel_ratio).abs()
        + GREEN_WEIGHT * (query.green_pixel_ratio - reference.green_pixel_ratio).abs();
    (1.0 - distance * 2.0).clamp(0.0, 1.0)
}

#[derive(Debug)]
pub struct Classifier {
    store: ReferenceStore,
    ledger: Arc<StatusLedger>,
}

impl Classifier {
    #[must_use]
    pub fn new(store: ReferenceStore, ledger: Arc<StatusLedger>) -> Self {
        Self { store, ledger }
    }

    /// Compute and persist the reference descriptor for `label`.
    pub fn calibrate(&mut self, label: TileLabel, image_bytes: &[u8]) -> StageResult<()> {
        self.store.calibrate(label, image_bytes)
    }

    /// Which labels currently have a stored reference.
    #[must_use]
    pub fn status(&self) -> std::collections::BTreeMap<TileLabel, bool> {
        self.store.status()
    }

    #[must_use]
    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    /// Classify one encoded frame. Total: every outcome is a
    /// [`RecognizeResult`], degraded cases included.
    #[must_use]
    pub fn identify(&self, image_bytes: &[u8]) -> RecognizeResult {
        if let Err(error) = self.store.ensure_ready() {
            self.ledger.log(format!("classifier: {error}, using fallback"));
            return self.fallback();
        }

        let (query, source) = match features::extract(image_bytes) {
            Ok(extracted) => extracted,
            Err(error) => {
                self.ledger.log(format!("classifier: {error}, using fallback"));
                return self.fallback();
            }
        };

        // Fused score per label; a label without color statistics falls
        // back to its histogram score alone.
        let mut scored: Vec<(TileLabel, f64, f64)> = self
            .store
            .entries()
            .iter()
            .map(|(label, entry)| {
                let hist = features::histogram_correlation(&query.histogram, &entry.histogram);
                let fused = match entry.color.as_ref() {
                    Some(reference) => {
                        HIST_WEIGHT * hist
                            + FEAT_WEIGHT * feature_similarity(&query.color, reference)
                    }
                    None => hist,
                };
                (*label, hist, fused)
            })
            .collect();
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));

        let (best_label, best_hist, best_fused) = scored[0];
        let runner_up_fused = scored.get(1).map_or(0.0, |(_, _, fused)| *fused);
        let margin = best_fused - runner_up_fused;
        let confidence = (FALLBACK_CONFIDENCE + margin * MARGIN_GAIN).clamp(0.0, 1.0);

        self.ledger.log(format!(
            "classifier [{}]: {best_label} hist={best_hist:.3} fused_margin={margin:.3} conf={confidence:.2}",
            source.as_str(),
        ));
        RecognizeResult::new(best_label, confidence)
    }

    /// Uniformly random label at the fixed fallback confidence.
    fn fallback(&self) -> RecognizeResult {
        let label = TileLabel::ALL
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(TileLabel::WhiteDragon);
        RecognizeResult::new(label, FALLBACK_CONFIDENCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn ledger() -> Arc<StatusLedger> {
        Arc::new(StatusLedger::new())
    }

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img.clone())
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .expect("encode png");
        bytes
    }

    /// Achromatic fixture for the white_dragon face.
    fn white_fixture() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(120, 120, Rgb([240, 240, 240])))
    }

    /// Chromatic fixture: green ring territory for the one_dot face.
    fn green_fixture() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(120, 120, Rgb([40, 200, 40])))
    }

    fn calibrated_classifier(dir: &std::path::Path) -> Classifier {
        let store = ReferenceStore::open(dir, ledger()).unwrap();
        let mut classifier = Classifier::new(store, ledger());
        classifier
            .calibrate(TileLabel::WhiteDragon, &white_fixture())
            .unwrap();
        classifier
            .calibrate(TileLabel::OneDot, &green_fixture())
            .unwrap();
        classifier
    }

    #[test]
    fn identical_features_score_one() {
        let features = ColorFeatures {
            mean_saturation: 0.4,
            colorful_pixel_ratio: 0.6,
            green_pixel_ratio: 0.1,
        };
        assert!((feature_similarity(&features, &features) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn distance_half_scores_zero() {
        let query = ColorFeatures {
            mean_saturation: 1.0,
            colorful_pixel_ratio: 0.0,
            green_pixel_ratio: 0.0,
        };
        let reference = ColorFeatures {
            mean_saturation: 0.0,
            colorful_pixel_ratio: 1.0,
            green_pixel_ratio: 0.0,
        };
        // Weighted L1 distance = 0.5 * 1.0 + 0.35 * 1.0 = 0.85 -> clipped.
        assert_eq!(feature_similarity(&query, &reference), 0.0);
    }

    #[test]
    fn saturation_dominates_the_distance_weights() {
        let base = ColorFeatures {
            mean_saturation: 0.5,
            colorful_pixel_ratio: 0.5,
            green_pixel_ratio: 0.5,
        };
        let sat_off = ColorFeatures {
            mean_saturation: 0.7,
            ..base
        };
        let green_off = ColorFeatures {
            green_pixel_ratio: 0.7,
            ..base
        };
        assert!(
            feature_similarity(&base, &sat_off) < feature_similarity(&base, &green_off),
            "a saturation delta must cost more than a green delta"
        );
    }

    #[test]
    fn no_references_yields_fixed_fallback_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        let classifier = Classifier::new(store, ledger());
        for _ in 0..10 {
            let result = classifier.identify(&white_fixture());
            assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        }
    }

    #[test]
    fn one_reference_still_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        let mut classifier = Classifier::new(store, ledger());
        classifier
            .calibrate(TileLabel::WhiteDragon, &white_fixture())
            .unwrap();
        let result = classifier.identify(&white_fixture());
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn undecodable_frame_falls_back_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = calibrated_classifier(dir.path());
        let result = classifier.identify(&[0xff, 0x00, 0xab]);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn self_classification_wins_decisively() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = calibrated_classifier(dir.path());

        let white = classifier.identify(&white_fixture());
        assert_eq!(white.label, TileLabel::WhiteDragon);
        assert!(white.confidence > FALLBACK_CONFIDENCE, "{white:?}");

        let green = classifier.identify(&green_fixture());
        assert_eq!(green.label, TileLabel::OneDot);
        assert!(green.confidence > FALLBACK_CONFIDENCE, "{green:?}");
    }

    #[test]
    fn identify_is_deterministic_for_fixed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = calibrated_classifier(dir.path());
        let first = classifier.identify(&white_fixture());
        let second = classifier.identify(&white_fixture());
        assert_eq!(first.label, second.label);
        assert_eq!(first.confidence, second.confidence);
    }

    #[test]
    fn label_without_color_features_degrades_to_histogram_weight() {
        let dir = tempfile::tempdir().unwrap();
        {
            let classifier = calibrated_classifier(dir.path());
            drop(classifier);
        }
        // Strip one label's color block and delete its archive so the
        // store cannot self-heal it back.
        let path = dir.path().join("references.json");
        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["one_dot"]["color"] = serde_json::Value::Null;
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        std::fs::remove_file(dir.path().join("one_dot.jpg")).unwrap();

        let store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        let classifier = Classifier::new(store, ledger());
        // Still classifies; the white fixture must keep winning on its
        // own (fully populated) reference.
        let result = classifier.identify(&white_fixture());
        assert_eq!(result.label, TileLabel::WhiteDragon);
    }
}
