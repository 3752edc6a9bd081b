use anyhow::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::context::prompt::render_prompt;
use crate::context::relations::{build_relationships, RelationConfig, Relationship};
use crate::context::window::{RollingWindow, WindowEntry};
use crate::detect::{Detection, DetectionFrame};
use crate::frame::Frame;

/// Configuration for the context engine.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextConfig {
    /// Rolling window length in seconds.
    pub window_seconds: f64,
    /// Hard cap on retained window entries.
    pub max_window_entries: usize,
    pub relations: RelationConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_seconds: 10.0,
            max_window_entries: 30,
            relations: RelationConfig::default(),
        }
    }
}

/// Structured context for one processed frame. Immutable once emitted.
#[derive(Clone, Debug, Serialize)]
pub struct ContextSummary {
    pub frame_id: u64,
    pub captured_at: f64,
    pub objects_visible: Vec<String>,
    pub temporal_counts: BTreeMap<String, usize>,
    pub relationships: BTreeSet<Relationship>,
    pub rendered_prompt: String,
    pub window_depth: usize,
}

/// A summary together with the frame it describes, as handed to the answer stage.
#[derive(Debug)]
pub struct ContextUpdate {
    pub summary: ContextSummary,
    pub frame: Frame,
}

/// Rolling-window context builder.
///
/// Single-threaded: `process` is called once per detection frame, in arrival order.
pub struct ContextEngine {
    window: RollingWindow,
    relations: RelationConfig,
    window_seconds: f64,
}

impl ContextEngine {
    pub fn new(config: &ContextConfig) -> Result<Self> {
        Ok(Self {
            window: RollingWindow::new(config.window_seconds, config.max_window_entries)?,
            relations: config.relations.clone(),
            window_seconds: config.window_seconds,
        })
    }

    /// Fold a detection frame into the window and emit its summary. The frame
    /// moves on with the summary; the window keeps only the detections.
    pub fn process(&mut self, detection_frame: DetectionFrame) -> ContextUpdate {
        let DetectionFrame {
            frame,
            captured_at,
            detections,
        } = detection_frame;
        let summary = self.observe(frame.id, captured_at, detections);
        ContextUpdate { summary, frame }
    }

    /// Window maintenance, relationship inference, temporal aggregation and rendering.
    pub fn observe(
        &mut self,
        frame_id: u64,
        captured_at: f64,
        detections: Vec<Detection>,
    ) -> ContextSummary {
        let relationships = build_relationships(&detections, &self.relations);
        let objects_visible = detections.iter().map(|d| d.class_label.clone()).collect();

        let evicted = self.window.push(WindowEntry {
            frame_id,
            captured_at,
            detections,
        });
        if evicted > 0 {
            log::trace!("context window evicted {} entries", evicted);
        }

        let temporal_counts = self.window.temporal_counts();
        let current = self
            .window
            .newest()
            .map(|entry| entry.detections.as_slice())
            .unwrap_or(&[]);
        let rendered_prompt = render_prompt(
            self.window_seconds,
            current,
            &temporal_counts,
            &relationships,
        );

        ContextSummary {
            frame_id,
            captured_at,
            objects_visible,
            temporal_counts,
            relationships,
            rendered_prompt,
            window_depth: self.window.len(),
        }
    }

    /// Frame counts per class label over the current window.
    pub fn temporal_summary(&self) -> BTreeMap<String, usize> {
        self.window.temporal_counts()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::relations::Predicate;
    use crate::detect::BoundingBox;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(label, 0.8, BoundingBox::new(x1, y1, x2, y2).unwrap())
    }

    fn detection_frame(id: u64, at: f64, detections: Vec<Detection>) -> DetectionFrame {
        DetectionFrame::new(Frame::new(id, at, 2, 1, vec![7; 6]), detections)
    }

    #[test]
    fn empty_engine_has_empty_temporal_summary() {
        let engine = ContextEngine::new(&ContextConfig::default()).unwrap();
        assert!(engine.temporal_summary().is_empty());
        assert!(engine.window().is_empty());
    }

    #[test]
    fn process_passes_frame_through_with_summary() {
        let mut engine = ContextEngine::new(&ContextConfig::default()).unwrap();
        let update = engine.process(detection_frame(
            4,
            50.0,
            vec![
                det("table", 0.0, 300.0, 400.0, 320.0),
                det("cup", 150.0, 260.0, 170.0, 300.0),
            ],
        ));

        assert_eq!(update.frame.id, 4);
        assert_eq!(update.frame.pixels(), &[7; 6]);
        let summary = update.summary;
        assert_eq!(summary.frame_id, 4);
        assert_eq!(summary.captured_at, 50.0);
        assert_eq!(summary.objects_visible, vec!["table", "cup"]);
        assert_eq!(summary.window_depth, 1);
        assert!(summary
            .relationships
            .contains(&Relationship::new("cup", Predicate::On, "table")));
        assert!(summary.rendered_prompt.contains("- cup is on table"));
        assert!(summary
            .rendered_prompt
            .contains("table (confidence: 0.80), cup (confidence: 0.80)"));
    }

    #[test]
    fn relationships_come_from_current_frame_only() {
        let mut engine = ContextEngine::new(&ContextConfig::default()).unwrap();
        engine.observe(
            0,
            0.0,
            vec![
                det("person", 0.0, 0.0, 100.0, 200.0),
                det("cup", 20.0, 10.0, 40.0, 30.0),
            ],
        );
        let summary = engine.observe(1, 1.0, vec![det("cup", 20.0, 10.0, 40.0, 30.0)]);

        assert!(summary.relationships.is_empty());
        assert!(summary
            .rendered_prompt
            .contains("- No clear spatial relationships detected"));
        assert_eq!(summary.temporal_counts.get("person"), Some(&1));
        assert_eq!(summary.temporal_counts.get("cup"), Some(&2));
        assert_eq!(summary.window_depth, 2);
    }

    #[test]
    fn window_depth_respects_both_caps() {
        let config = ContextConfig {
            window_seconds: 1.0,
            max_window_entries: 3,
            ..ContextConfig::default()
        };
        let mut engine = ContextEngine::new(&config).unwrap();
        let depths: Vec<usize> = (0..6)
            .map(|i| engine.observe(i, i as f64 * 0.4, Vec::new()).window_depth)
            .collect();
        // At 0.4s spacing a 1s window holds three entries (0.0, 0.4, 0.8 at t=0.8),
        // then only those within 1s of the newest.
        assert_eq!(depths, vec![1, 2, 3, 3, 3, 3]);

        let summary = engine.observe(6, 10.0, Vec::new());
        assert_eq!(summary.window_depth, 1);
        assert!(summary.rendered_prompt.contains("**Objects Seen Recently:** None"));
    }

    #[test]
    fn rendered_prompt_mentions_window_length() {
        let config = ContextConfig {
            window_seconds: 4.0,
            ..ContextConfig::default()
        };
        let mut engine = ContextEngine::new(&config).unwrap();
        let summary = engine.observe(0, 0.0, Vec::new());
        assert!(summary
            .rendered_prompt
            .starts_with("**Scene Analysis (Last 4s):**"));
        assert!(summary
            .rendered_prompt
            .contains("**Currently Visible:** No objects detected"));
    }
}
