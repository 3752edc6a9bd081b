use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::{ContextConfig, RelationConfig};
use crate::ingest::CameraConfig;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 30;
const DEFAULT_PROCESS_FPS: f64 = 3.0;
const DEFAULT_DETECTOR: &str = "scripted";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_WINDOW_SECS: f64 = 10.0;
const DEFAULT_FRAME_QUEUE: usize = 10;
const DEFAULT_DETECTION_QUEUE: usize = 30;
const DEFAULT_CONTEXT_QUEUE: usize = 30;
const DEFAULT_QUERY_QUEUE: usize = 16;
const DEFAULT_ANSWER_QUEUE: usize = 16;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_HEALTH_LOG_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    context: Option<ContextConfigFile>,
    queues: Option<QueueConfigFile>,
    runtime: Option<RuntimeConfigFile>,
    recording: Option<RecordingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source_url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    capture_fps: Option<u32>,
    process_fps: Option<f64>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ContextConfigFile {
    window_seconds: Option<f64>,
    max_window_entries: Option<usize>,
    vertical_tolerance: Option<f32>,
    horizontal_tolerance: Option<f32>,
    near_threshold: Option<f32>,
    surface_classes: Option<Vec<String>>,
    holdable_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueueConfigFile {
    frames: Option<usize>,
    detections: Option<usize>,
    contexts: Option<usize>,
    queries: Option<usize>,
    answers: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RuntimeConfigFile {
    poll_timeout_ms: Option<u64>,
    join_timeout_ms: Option<u64>,
    health_log_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    detections_dir: Option<PathBuf>,
}

/// Full runtime configuration for a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub context: ContextConfig,
    pub queues: QueueSettings,
    pub runtime: RuntimeSettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub source_url: String,
    pub width: u32,
    pub height: u32,
    /// Rate the raw source delivers at.
    pub capture_fps: u32,
    /// Rate frames are sampled for processing.
    pub process_fps: f64,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    /// Detections below this confidence are dropped before context building.
    pub min_confidence: f32,
}

/// Channel capacities, one per stage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub frames: usize,
    pub detections: usize,
    pub contexts: usize,
    pub queries: usize,
    pub answers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub poll_timeout: Duration,
    pub join_timeout: Duration,
    pub health_log_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordingSettings {
    pub detections_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings {
                source_url: DEFAULT_SOURCE_URL.to_string(),
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                capture_fps: DEFAULT_CAPTURE_FPS,
                process_fps: DEFAULT_PROCESS_FPS,
                max_frames: None,
            },
            detector: DetectorSettings {
                backend: DEFAULT_DETECTOR.to_string(),
                min_confidence: DEFAULT_MIN_CONFIDENCE,
            },
            context: ContextConfig {
                window_seconds: DEFAULT_WINDOW_SECS,
                max_window_entries: default_window_entries(DEFAULT_PROCESS_FPS, DEFAULT_WINDOW_SECS),
                relations: RelationConfig::default(),
            },
            queues: QueueSettings {
                frames: DEFAULT_FRAME_QUEUE,
                detections: DEFAULT_DETECTION_QUEUE,
                contexts: DEFAULT_CONTEXT_QUEUE,
                queries: DEFAULT_QUERY_QUEUE,
                answers: DEFAULT_ANSWER_QUEUE,
            },
            runtime: RuntimeSettings {
                poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
                join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
                health_log_interval: Duration::from_secs(DEFAULT_HEALTH_LOG_SECS),
            },
            recording: RecordingSettings::default(),
        }
    }
}

impl CaptureSettings {
    pub fn camera(&self) -> CameraConfig {
        CameraConfig {
            url: self.source_url.clone(),
            width: self.width,
            height: self.height,
            capture_fps: self.capture_fps,
            max_frames: self.max_frames,
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.process_fps)
    }
}

impl PipelineConfig {
    /// Load from `SCENE_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCENE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let explicit_max_entries = file_cfg
            .context
            .as_ref()
            .and_then(|context| context.max_window_entries);
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        if explicit_max_entries.is_none() {
            cfg.context.max_window_entries =
                default_window_entries(cfg.capture.process_fps, cfg.context.window_seconds);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let capture = file.capture.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let context = file.context.unwrap_or_default();
        let queues = file.queues.unwrap_or_default();
        let runtime = file.runtime.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();

        let relations = RelationConfig {
            vertical_tolerance: context
                .vertical_tolerance
                .unwrap_or(defaults.context.relations.vertical_tolerance),
            horizontal_tolerance: context
                .horizontal_tolerance
                .unwrap_or(defaults.context.relations.horizontal_tolerance),
            near_threshold: context
                .near_threshold
                .unwrap_or(defaults.context.relations.near_threshold),
            surface_classes: context
                .surface_classes
                .map(|classes| classes.into_iter().collect())
                .unwrap_or(defaults.context.relations.surface_classes),
            holdable_classes: context
                .holdable_classes
                .map(|classes| classes.into_iter().collect())
                .unwrap_or(defaults.context.relations.holdable_classes),
        };

        Self {
            capture: CaptureSettings {
                source_url: capture.source_url.unwrap_or(defaults.capture.source_url),
                width: capture.width.unwrap_or(defaults.capture.width),
                height: capture.height.unwrap_or(defaults.capture.height),
                capture_fps: capture.capture_fps.unwrap_or(defaults.capture.capture_fps),
                process_fps: capture.process_fps.unwrap_or(defaults.capture.process_fps),
                max_frames: capture.max_frames,
            },
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                min_confidence: detector
                    .min_confidence
                    .unwrap_or(defaults.detector.min_confidence),
            },
            context: ContextConfig {
                window_seconds: context
                    .window_seconds
                    .unwrap_or(defaults.context.window_seconds),
                max_window_entries: context
                    .max_window_entries
                    .unwrap_or(defaults.context.max_window_entries),
                relations,
            },
            queues: QueueSettings {
                frames: queues.frames.unwrap_or(defaults.queues.frames),
                detections: queues.detections.unwrap_or(defaults.queues.detections),
                contexts: queues.contexts.unwrap_or(defaults.queues.contexts),
                queries: queues.queries.unwrap_or(defaults.queues.queries),
                answers: queues.answers.unwrap_or(defaults.queues.answers),
            },
            runtime: RuntimeSettings {
                poll_timeout: runtime
                    .poll_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.runtime.poll_timeout),
                join_timeout: runtime
                    .join_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.runtime.join_timeout),
                health_log_interval: runtime
                    .health_log_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.runtime.health_log_interval),
            },
            recording: RecordingSettings {
                detections_dir: recording.detections_dir,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SCENE_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.capture.source_url = url;
            }
        }
        if let Ok(fps) = std::env::var("SCENE_PROCESS_FPS") {
            self.capture.process_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCENE_PROCESS_FPS must be a number"))?;
        }
        if let Ok(backend) = std::env::var("SCENE_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(window) = std::env::var("SCENE_WINDOW_SECS") {
            self.context.window_seconds = window
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCENE_WINDOW_SECS must be a number of seconds"))?;
        }
        if let Ok(classes) = std::env::var("SCENE_SURFACE_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.context.relations.surface_classes = parsed.into_iter().collect();
            }
        }
        if let Ok(classes) = std::env::var("SCENE_HOLDABLE_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.context.relations.holdable_classes = parsed.into_iter().collect();
            }
        }
        if let Ok(dir) = std::env::var("SCENE_DETECTIONS_DIR") {
            if !dir.trim().is_empty() {
                self.recording.detections_dir = Some(PathBuf::from(dir));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.source_url.trim().is_empty() {
            return Err(anyhow!("capture.source_url must not be empty"));
        }
        if capture.width == 0 || capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if capture.capture_fps == 0 {
            return Err(anyhow!("capture.capture_fps must be greater than zero"));
        }
        if !(capture.process_fps.is_finite() && capture.process_fps > 0.0) {
            return Err(anyhow!("capture.process_fps must be greater than zero"));
        }
        if capture.process_fps > capture.capture_fps as f64 {
            return Err(anyhow!(
                "capture.process_fps ({}) must not exceed capture.capture_fps ({})",
                capture.process_fps,
                capture.capture_fps
            ));
        }

        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector.backend must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!("detector.min_confidence must be within [0, 1]"));
        }

        let context = &self.context;
        if !(context.window_seconds.is_finite() && context.window_seconds > 0.0) {
            return Err(anyhow!("context.window_seconds must be greater than zero"));
        }
        if context.max_window_entries == 0 {
            return Err(anyhow!("context.max_window_entries must be at least 1"));
        }
        let relations = &context.relations;
        for (name, value) in [
            ("vertical_tolerance", relations.vertical_tolerance),
            ("horizontal_tolerance", relations.horizontal_tolerance),
            ("near_threshold", relations.near_threshold),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(anyhow!("context.{} must be a finite non-negative number", name));
            }
        }

        for (name, capacity) in [
            ("frames", self.queues.frames),
            ("detections", self.queues.detections),
            ("contexts", self.queues.contexts),
            ("queries", self.queues.queries),
            ("answers", self.queues.answers),
        ] {
            if capacity == 0 {
                return Err(anyhow!("queues.{} capacity must be at least 1", name));
            }
        }

        if self.runtime.poll_timeout.is_zero() {
            return Err(anyhow!("runtime.poll_timeout_ms must be greater than zero"));
        }
        if self.runtime.join_timeout.is_zero() {
            return Err(anyhow!("runtime.join_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// Enough entries to hold a full window at the processing rate.
pub fn default_window_entries(process_fps: f64, window_seconds: f64) -> usize {
    let entries = (process_fps * window_seconds).ceil();
    if entries.is_finite() && entries >= 1.0 {
        entries as usize
    } else {
        1
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.context.max_window_entries, 30);
        assert_eq!(cfg.capture.sampling_interval(), Duration::from_secs_f64(1.0 / 3.0));
    }

    #[test]
    fn window_entries_round_up() {
        assert_eq!(default_window_entries(3.0, 10.0), 30);
        assert_eq!(default_window_entries(2.5, 3.0), 8);
        assert_eq!(default_window_entries(0.01, 1.0), 1);
    }

    #[test]
    fn split_csv_skips_blanks() {
        assert_eq!(split_csv(" desk, ,shelf,"), vec!["desk", "shelf"]);
    }

    #[test]
    fn process_rate_cannot_exceed_capture_rate() {
        let mut cfg = PipelineConfig::default();
        cfg.capture.process_fps = 31.0;
        assert!(cfg.validate().is_err());
    }
}
