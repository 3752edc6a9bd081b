use anyhow::{anyhow, Result};

use crate::answer::VisionLanguageModel;
use crate::context::compose_query;
use crate::frame::Frame;

const VISIBLE_PREFIX: &str = "**Currently Visible:** ";
const RECENT_PREFIX: &str = "**Objects Seen Recently:** ";

/// Deterministic stand-in model that answers from the rendered context alone.
///
/// It reads the visible objects and relationship lines out of the composed
/// query text and restates them. Useful for demos and for exercising the
/// pipeline without model weights.
#[derive(Debug, Default)]
pub struct DescribingModel {
    calls: u64,
}

impl DescribingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl VisionLanguageModel for DescribingModel {
    fn name(&self) -> &'static str {
        "describe"
    }

    fn answer(&mut self, frame: &Frame, rendered_prompt: &str, question: &str) -> Result<String> {
        self.calls += 1;
        let input = compose_query(rendered_prompt, question);

        let visible = section_value(&input, VISIBLE_PREFIX)
            .ok_or_else(|| anyhow!("context is missing the visible objects section"))?;
        let recent = section_value(&input, RECENT_PREFIX).unwrap_or("None");
        let relations: Vec<&str> = input
            .lines()
            .filter_map(|line| line.strip_prefix("- "))
            .filter(|line| !line.starts_with("No clear"))
            .collect();

        let mut reply = format!(
            "In frame {} ({}x{}) I can see: {}.",
            frame.id, frame.width, frame.height, visible
        );
        if !relations.is_empty() {
            reply.push_str(&format!(" {}.", relations.join("; ")));
        }
        if recent != "None" {
            reply.push_str(&format!(" Recently seen: {}.", recent));
        }
        Ok(reply)
    }
}

fn section_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextConfig, ContextEngine};
    use crate::detect::{BoundingBox, Detection};

    #[test]
    fn restates_visible_objects_and_relations() {
        let mut engine = ContextEngine::new(&ContextConfig::default()).unwrap();
        let summary = engine.observe(
            9,
            1.0,
            vec![
                Detection::new("table", 0.9, BoundingBox::new(0.0, 300.0, 400.0, 320.0).unwrap()),
                Detection::new("cup", 0.7, BoundingBox::new(150.0, 260.0, 170.0, 300.0).unwrap()),
            ],
        );
        let frame = Frame::new(9, 1.0, 640, 480, Vec::new());
        let mut model = DescribingModel::new();

        let reply = model
            .answer(&frame, &summary.rendered_prompt, "where is the cup?")
            .unwrap();
        assert!(reply.starts_with("In frame 9 (640x480) I can see: table (confidence: 0.90)"));
        assert!(reply.contains("cup is on table"));
        assert!(reply.contains("Recently seen: cup (1 frames), table (1 frames)."));
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn rejects_prompt_without_context() {
        let frame = Frame::without_pixels(0, 0.0);
        assert!(DescribingModel::new().answer(&frame, "", "hi").is_err());
    }
}
