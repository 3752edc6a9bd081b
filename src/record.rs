//! Per-frame detection dumps.
//!
//! One JSON file per processed frame, `frame_000042.json`, holding the frame
//! id, capture time and detections. Pixels are never written.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{ContextConfig, ContextEngine, ContextSummary};
use crate::detect::{Detection, DetectionFrame};

/// On-disk form of one frame's detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub frame_id: u64,
    pub captured_at: f64,
    pub detections: Vec<Detection>,
}

impl DetectionRecord {
    pub fn from_frame(frame: &DetectionFrame) -> Self {
        Self {
            frame_id: frame.frame_id(),
            captured_at: frame.captured_at,
            detections: frame.detections.clone(),
        }
    }
}

/// Writes detection records into a directory.
pub struct DetectionRecorder {
    root: PathBuf,
    written: u64,
}

impl DetectionRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create detections dir {}", root.display()))?;
        Ok(Self { root, written: 0 })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn record_path(&self, frame_id: u64) -> PathBuf {
        self.root.join(format!("frame_{:06}.json", frame_id))
    }

    pub fn write(&mut self, frame: &DetectionFrame) -> Result<PathBuf> {
        let record = DetectionRecord::from_frame(frame);
        let path = self.record_path(record.frame_id);
        let payload = serde_json::to_vec_pretty(&record)?;
        fs::write(&path, payload).with_context(|| format!("write {}", path.display()))?;
        self.written += 1;
        Ok(path)
    }
}

/// Load every `frame_*.json` record under `dir`, ordered by frame id.
pub fn load_records(dir: &Path) -> Result<Vec<DetectionRecord>> {
    let mut records = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_record = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("frame_") && name.ends_with(".json"))
            .unwrap_or(false);
        if !is_record {
            continue;
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let record: DetectionRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", path.display()))?;
        for detection in &record.detections {
            detection
                .validate()
                .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
        }
        records.push(record);
    }
    records.sort_by_key(|record| record.frame_id);
    Ok(records)
}

/// Feed `records` through a fresh `ContextEngine`, in the order given.
///
/// With `last_only`, only the final summary is returned.
pub fn replay(
    config: &ContextConfig,
    records: Vec<DetectionRecord>,
    last_only: bool,
) -> Result<Vec<ContextSummary>> {
    let mut engine = ContextEngine::new(config)?;
    let mut summaries: Vec<ContextSummary> = records
        .into_iter()
        .map(|record| engine.observe(record.frame_id, record.captured_at, record.detections))
        .collect();
    if last_only {
        summaries = summaries.split_off(summaries.len().saturating_sub(1));
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::frame::Frame;

    #[test]
    fn record_file_name_is_zero_padded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = DetectionRecorder::new(dir.path().join("dumps"))?;
        assert!(recorder.root().is_dir());
        assert!(recorder.record_path(42).ends_with("frame_000042.json"));
        Ok(())
    }

    #[test]
    fn pixels_are_not_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut recorder = DetectionRecorder::new(dir.path())?;
        let frame = Frame::new(1, 5.0, 2, 2, vec![255; 12]);
        let bbox = BoundingBox::new(1.0, 1.0, 2.0, 2.0)?;
        let path = recorder.write(&DetectionFrame::new(frame, vec![Detection::new("cup", 0.9, bbox)]))?;

        let text = fs::read_to_string(path)?;
        assert!(text.contains("\"frame_id\": 1"));
        assert!(!text.contains("pixels"));
        assert!(!text.contains("255"));
        assert_eq!(recorder.written(), 1);
        Ok(())
    }

    #[test]
    fn unrelated_files_are_ignored() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("notes.txt"), "hello")?;
        assert!(load_records(dir.path())?.is_empty());
        Ok(())
    }
}
