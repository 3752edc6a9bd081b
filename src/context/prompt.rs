//! Fixed-template rendering of the scene context.

use std::collections::{BTreeMap, BTreeSet};

use crate::context::relations::Relationship;
use crate::detect::Detection;

const NO_OBJECTS: &str = "No objects detected";
const NO_RECENT_OBJECTS: &str = "None";
const NO_RELATIONSHIPS: &str = "- No clear spatial relationships detected";

/// Render the context block handed to the vision-language model.
pub fn render_prompt(
    window_seconds: f64,
    detections: &[Detection],
    temporal_counts: &BTreeMap<String, usize>,
    relationships: &BTreeSet<Relationship>,
) -> String {
    let visible = if detections.is_empty() {
        NO_OBJECTS.to_string()
    } else {
        detections
            .iter()
            .map(|d| format!("{} (confidence: {:.2})", d.class_label, d.confidence))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let recent = if temporal_counts.is_empty() {
        NO_RECENT_OBJECTS.to_string()
    } else {
        temporal_counts
            .iter()
            .map(|(label, count)| format!("{} ({} frames)", label, count))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let relations = if relationships.is_empty() {
        NO_RELATIONSHIPS.to_string()
    } else {
        relationships
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "**Scene Analysis (Last {}s):**\n\n\
         **Currently Visible:** {}\n\n\
         **Objects Seen Recently:** {}\n\n\
         **Spatial Relationships:**\n{}\n",
        window_seconds, visible, recent, relations
    )
}

/// Append a question section to a rendered context block.
pub fn compose_query(rendered_prompt: &str, question: &str) -> String {
    format!(
        "{}\n**Question:** {}\n\n\
         Based on the visual scene and the analysis above, please answer the question accurately and concisely.",
        rendered_prompt,
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::relations::Predicate;
    use crate::detect::BoundingBox;

    #[test]
    fn empty_scene_renders_placeholders() {
        let prompt = render_prompt(10.0, &[], &BTreeMap::new(), &BTreeSet::new());
        assert_eq!(
            prompt,
            "**Scene Analysis (Last 10s):**\n\n\
             **Currently Visible:** No objects detected\n\n\
             **Objects Seen Recently:** None\n\n\
             **Spatial Relationships:**\n\
             - No clear spatial relationships detected\n"
        );
    }

    #[test]
    fn populated_scene_lists_everything() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let detections = vec![
            Detection::new("person", 0.914, bbox),
            Detection::new("cup", 0.5, bbox),
        ];
        let counts = BTreeMap::from([("cup".to_string(), 3), ("person".to_string(), 5)]);
        let rels = BTreeSet::from([
            Relationship::new("person", Predicate::Holding, "cup"),
            Relationship::new("cup", Predicate::LeftOf, "laptop"),
        ]);

        let prompt = render_prompt(2.5, &detections, &counts, &rels);
        assert!(prompt.starts_with("**Scene Analysis (Last 2.5s):**"));
        assert!(prompt.contains("**Currently Visible:** person (confidence: 0.91), cup (confidence: 0.50)"));
        assert!(prompt.contains("**Objects Seen Recently:** cup (3 frames), person (5 frames)"));
        assert!(prompt.contains("- cup is left of laptop\n- person is holding cup\n"));
        assert!(!prompt.contains("No clear spatial relationships"));
    }

    #[test]
    fn question_block_follows_context() {
        let composed = compose_query("CTX\n", "  what is on the table? ");
        assert!(composed.starts_with("CTX\n\n**Question:** what is on the table?\n\n"));
        assert!(composed.ends_with("accurately and concisely."));
    }
}
