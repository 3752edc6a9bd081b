use anyhow::{anyhow, Result};

use scene_kernel::answer::NOT_READY_MESSAGE;
use scene_kernel::{
    AnswerStage, BoundingBox, ContextConfig, ContextEngine, ContextUpdate, Detection,
    DetectionFrame, FailureKind, FailurePolicy, Frame, Query, VisionLanguageModel,
};

/// Returns what it was given so tests can see exactly what reached the model.
struct MirrorModel;

impl VisionLanguageModel for MirrorModel {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn answer(&mut self, frame: &Frame, rendered_prompt: &str, question: &str) -> Result<String> {
        Ok(format!(
            "frame={} pixels={} question={} prompt_lines={}",
            frame.id,
            frame.byte_len(),
            question,
            rendered_prompt.lines().count()
        ))
    }
}

struct BrokenModel;

impl VisionLanguageModel for BrokenModel {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn answer(&mut self, _frame: &Frame, _prompt: &str, _question: &str) -> Result<String> {
        Err(anyhow!("out of memory"))
    }
}

fn context_for(engine: &mut ContextEngine, id: u64, labels: &[&str]) -> ContextUpdate {
    let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
    let detections = labels
        .iter()
        .map(|label| Detection::new(*label, 0.8, bbox))
        .collect();
    let frame = Frame::new(id, id as f64, 2, 2, vec![1; 12]);
    engine.process(DetectionFrame::new(frame, detections))
}

#[test]
fn not_ready_for_any_question_without_context() {
    let mut stage = AnswerStage::new(Box::new(MirrorModel));
    for text in ["", "what is this?", "where is the cup?"] {
        let answer = stage.answer(&Query::new(text)).unwrap();
        assert_eq!(answer.text, NOT_READY_MESSAGE);
        assert_eq!(answer.grounding_frame_id, None);
        assert!(!answer.is_grounded());
    }
}

#[test]
fn model_sees_frame_and_prompt_of_latest_context() {
    let mut engine = ContextEngine::new(&ContextConfig::default()).unwrap();
    let mut stage = AnswerStage::new(Box::new(MirrorModel));

    stage.update_context(context_for(&mut engine, 10, &["cup"]));
    stage.update_context(context_for(&mut engine, 11, &["book"]));
    assert_eq!(stage.latest_frame_id(), Some(11));

    let answer = stage.answer(&Query::new("what changed?")).unwrap();
    assert_eq!(answer.grounding_frame_id, Some(11));
    assert_eq!(answer.question, "what changed?");
    assert!(answer.text.starts_with("frame=11 pixels=12 question=what changed?"));
}

#[test]
fn model_failure_is_a_per_query_collaborator_failure() {
    let mut engine = ContextEngine::new(&ContextConfig::default()).unwrap();
    let mut stage = AnswerStage::new(Box::new(BrokenModel));
    stage.update_context(context_for(&mut engine, 1, &["cup"]));

    let err = stage.answer(&Query::new("hello?")).unwrap_err();
    assert_eq!(err.kind, FailureKind::Collaborator);
    assert_eq!(err.policy(), FailurePolicy::DropItem);
    assert!(err.to_string().contains("out of memory"));

    // The held context survives the failure.
    assert_eq!(stage.latest_frame_id(), Some(1));
}
