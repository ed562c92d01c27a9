//! Reference descriptor store.
//!
//! One [`ReferenceEntry`] per known tile label, persisted as a single
//! JSON document that is rewritten wholesale on every calibration.
//! Alongside the document, the raw calibration image for each label is
//! archived so a missing or partially populated descriptor file can be
//! rebuilt at startup instead of leaving the classifier unusable.
//!
//! Calibration is an operator-driven, infrequent action; concurrent
//! calibration of two labels is not supported.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StageError, StageResult};
use crate::features::{self, ColorFeatures};
use crate::model::TileLabel;
use crate::status::StatusLedger;

const REFS_FILE: &str = "references.json";

/// Minimum calibrated labels before classification is meaningful.
pub const MIN_REFERENCES: usize = 2;

/// Persisted descriptor for one label.
///
/// `color: None` models a legacy or partially written file; the store
/// recomputes the missing statistics from the archived image at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub histogram: Vec<Vec<f64>>,
    #[serde(default)]
    pub color: Option<ColorFeatures>,
}

#[derive(Debug)]
pub struct ReferenceStore {
    root: PathBuf,
    ledger: Arc<StatusLedger>,
    entries: BTreeMap<TileLabel, ReferenceEntry>,
}

impl ReferenceStore {
    /// Open the store rooted at `root`, creating the directory if needed,
    /// loading any persisted entries, and self-healing from archived
    /// calibration images where the document is missing or partial.
    pub fn open(root: impl Into<PathBuf>, ledger: Arc<StatusLedger>) -> StageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let mut store = Self {
            root,
            ledger,
            entries: BTreeMap::new(),
        };
        store.load();
        Ok(store)
    }

    /// Compute and store the reference descriptor for `label`, overwriting
    /// any prior entry, archiving the raw image, and persisting the whole
    /// document.
    pub fn calibrate(&mut self, label: TileLabel, image_bytes: &[u8]) -> StageResult<()> {
        let img = features::decode_rgb(image_bytes)?;
        let (region, source) = features::analysis_region(&img);
        let descriptor = features::descriptor_of(&region);

        self.entries.insert(
            label,
            ReferenceEntry {
                histogram: descriptor.histogram,
                color: Some(descriptor.color),
            },
        );

        // Archive the raw bytes for later self-healing recalibration.
        fs::write(self.archive_path(label), image_bytes)?;
        self.persist()?;

        self.ledger.log(format!(
            "refstore: calibrated '{label}' via {} sat={:.2} colorful={:.2} green={:.2}",
            source.as_str(),
            descriptor.color.mean_saturation,
            descriptor.color.colorful_pixel_ratio,
            descriptor.color.green_pixel_ratio,
        ));
        Ok(())
    }

    /// Which known labels currently have a stored reference.
    #[must_use]
    pub fn status(&self) -> BTreeMap<TileLabel, bool> {
        TileLabel::ALL
            .into_iter()
            .map(|label| (label, self.entries.contains_key(&label)))
            .collect()
    }

    #[must_use]
    pub fn calibrated_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entry(&self, label: TileLabel) -> Option<&ReferenceEntry> {
        self.entries.get(&label)
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<TileLabel, ReferenceEntry> {
        &self.entries
    }

    /// Err when fewer than [`MIN_REFERENCES`] labels are calibrated.
    pub fn ensure_ready(&self) -> StageResult<()> {
        let have = self.calibrated_count();
        if have < MIN_REFERENCES {
            return Err(StageError::InsufficientReferences {
                have,
                need: MIN_REFERENCES,
            });
        }
        Ok(())
    }

    fn refs_path(&self) -> PathBuf {
        self.root.join(REFS_FILE)
    }

    fn archive_path(&self, label: TileLabel) -> PathBuf {
        // Bytes are stored verbatim; decoding sniffs the actual format.
        self.root.join(format!("{label}.jpg"))
    }

    fn persist(&self) -> StageResult<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(self.refs_path(), json)
            .map_err(|error| StageError::Storage(format!("write {REFS_FILE}: {error}")))
    }

    fn load(&mut self) {
        let path = self.refs_path();
        if path.exists() {
            match Self::read_entries(&path) {
                Ok(entries) => {
                    self.entries = entries;
                    self.ledger.log(format!(
                        "refstore: loaded refs for {:?}",
                        self.entries.keys().map(|label| label.as_str()).collect::<Vec<_>>()
                    ));
                }
                Err(error) => {
                    self.ledger
                        .log(format!("refstore: failed to load refs: {error}"));
                    self.entries.clear();
                }
            }
        }
        self.self_heal();
    }

    fn read_entries(path: &Path) -> StageResult<BTreeMap<TileLabel, ReferenceEntry>> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Rebuild missing entries (and missing color statistics) from the
    /// archived calibration images. Persists when anything was healed.
    fn self_heal(&mut self) {
        let mut healed = Vec::new();
        for label in TileLabel::ALL {
            let needs_entry = !self.entries.contains_key(&label);
            let needs_color = self
                .entries
                .get(&label)
                .map_or(false, |entry| entry.color.is_none());
            if !needs_entry && !needs_color {
                continue;
            }
            let archive = self.archive_path(label);
            if !archive.exists() {
                if needs_entry {
                    self.ledger
                        .log(format!("refstore: no archived image for '{label}'"));
                }
                continue;
            }
            match Self::recompute(&archive) {
                Ok((histogram, color)) => {
                    if needs_entry {
                        self.entries.insert(
                            label,
                            ReferenceEntry {
                                histogram,
                                color: Some(color),
                            },
                        );
                    } else if let Some(entry) = self.entries.get_mut(&label) {
                        entry.color = Some(color);
                    }
                    healed.push(label);
                }
                Err(error) => {
                    self.ledger
                        .log(format!("refstore: self-heal failed for '{label}': {error}"));
                }
            }
        }
        if !healed.is_empty() {
            if let Err(error) = self.persist() {
                self.ledger
                    .log(format!("refstore: persist after self-heal failed: {error}"));
            }
            self.ledger.log(format!(
                "refstore: recomputed refs for {:?}",
                healed.iter().map(|l| l.as_str()).collect::<Vec<_>>()
            ));
        }
    }

    fn recompute(archive: &Path) -> StageResult<(Vec<Vec<f64>>, ColorFeatures)> {
        let bytes = fs::read(archive)?;
        let img = features::decode_rgb(&bytes)?;
        let (region, _) = features::analysis_region(&img);
        let descriptor = features::descriptor_of(&region);
        Ok((descriptor.histogram, descriptor.color))
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

    fn white_fixture() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(120, 120, Rgb([240, 240, 240])))
    }

    fn green_fixture() -> Vec<u8> {
        encode_png(&RgbImage::from_pixel(120, 120, Rgb([40, 200, 40])))
    }

    #[test]
    fn calibrate_updates_status_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        assert_eq!(store.calibrated_count(), 0);

        store
            .calibrate(TileLabel::WhiteDragon, &white_fixture())
            .unwrap();
        let status = store.status();
        assert!(status[&TileLabel::WhiteDragon]);
        assert!(!status[&TileLabel::OneDot]);
        assert!(dir.path().join("references.json").exists());
        assert!(dir.path().join("white_dragon.jpg").exists());
    }

    #[test]
    fn calibrate_rejects_undecodable_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        let err = store
            .calibrate(TileLabel::OneDot, &[0x00, 0x01, 0x02])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DecodeFailed);
        assert_eq!(store.calibrated_count(), 0);
    }

    #[test]
    fn reload_round_trips_descriptors_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let original = {
            let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
            store
                .calibrate(TileLabel::WhiteDragon, &white_fixture())
                .unwrap();
            store.calibrate(TileLabel::OneDot, &green_fixture()).unwrap();
            store.entries().clone()
        };

        let reloaded = ReferenceStore::open(dir.path(), ledger()).unwrap();
        assert_eq!(reloaded.calibrated_count(), 2);
        for (label, entry) in &original {
            let loaded = reloaded.entry(*label).expect("entry survives reload");
            for (row_a, row_b) in entry.histogram.iter().zip(&loaded.histogram) {
                for (a, b) in row_a.iter().zip(row_b) {
                    assert!((a - b).abs() < 1e-9, "histogram drifted for {label}");
                }
            }
            let (ca, cb) = (entry.color.unwrap(), loaded.color.unwrap());
            assert!((ca.mean_saturation - cb.mean_saturation).abs() < 1e-9);
            assert!((ca.colorful_pixel_ratio - cb.colorful_pixel_ratio).abs() < 1e-9);
            assert!((ca.green_pixel_ratio - cb.green_pixel_ratio).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_document_heals_from_archived_images() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
            store
                .calibrate(TileLabel::WhiteDragon, &white_fixture())
                .unwrap();
            store.calibrate(TileLabel::OneDot, &green_fixture()).unwrap();
        }
        fs::remove_file(dir.path().join("references.json")).unwrap();

        let healed = ReferenceStore::open(dir.path(), ledger()).unwrap();
        assert_eq!(healed.calibrated_count(), 2, "rebuilt from archives");
        assert!(
            dir.path().join("references.json").exists(),
            "healing rewrites the document"
        );
    }

    #[test]
    fn partial_entry_heals_color_features() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
            store.calibrate(TileLabel::OneDot, &green_fixture()).unwrap();
        }
        // Strip the color block, simulating a legacy document.
        let path = dir.path().join("references.json");
        let mut doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        doc["one_dot"]["color"] = serde_json::Value::Null;
        fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let healed = ReferenceStore::open(dir.path(), ledger()).unwrap();
        let entry = healed.entry(TileLabel::OneDot).unwrap();
        assert!(entry.color.is_some(), "color statistics recomputed");
        assert!(entry.color.unwrap().green_pixel_ratio > 0.9);
    }

    #[test]
    fn corrupt_document_starts_empty_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("references.json"), "{ not json").unwrap();
        let store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        assert_eq!(store.calibrated_count(), 0);
    }

    #[test]
    fn ensure_ready_requires_two_labels() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::open(dir.path(), ledger()).unwrap();
        assert!(matches!(
            store.ensure_ready().unwrap_err(),
            StageError::InsufficientReferences { have: 0, need: 2 }
        ));
        store
            .calibrate(TileLabel::WhiteDragon, &white_fixture())
            .unwrap();
        assert!(store.ensure_ready().is_err());
        store.calibrate(TileLabel::OneDot, &green_fixture()).unwrap();
        assert!(store.ensure_ready().is_ok());
    }
}
