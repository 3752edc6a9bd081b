//! Question answering over the latest scene context.
//!
//! `AnswerStage` keeps exactly one context (the most recent one it was
//! handed) and answers questions against it through a `VisionLanguageModel`.

mod describe;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::ContextUpdate;
use crate::error::{FailureKind, StageError};
use crate::frame::Frame;

pub use describe::DescribingModel;

/// Reply given to any question asked before the first context arrives.
pub const NOT_READY_MESSAGE: &str =
    "No visual context available yet. Please wait for camera to initialize.";

const STAGE: &str = "answer";

/// A user question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Reply to a `Query`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// The question this answers.
    pub question: String,
    /// Frame the visual context came from; `None` when no context existed yet.
    pub grounding_frame_id: Option<u64>,
}

impl Answer {
    pub fn not_ready(question: impl Into<String>) -> Self {
        Self {
            text: NOT_READY_MESSAGE.to_string(),
            question: question.into(),
            grounding_frame_id: None,
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.grounding_frame_id.is_some()
    }
}

/// Vision-language model collaborator.
///
/// `answer` is synchronous and may be slow; it is only ever called from the
/// answer stage's own thread.
pub trait VisionLanguageModel: Send {
    fn name(&self) -> &'static str;

    /// Load weights or open a session. Failure is fatal at startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Answer `question` about `frame`, given the rendered scene context.
    fn answer(&mut self, frame: &Frame, rendered_prompt: &str, question: &str) -> Result<String>;
}

/// Holds the latest context and answers questions against it.
pub struct AnswerStage {
    model: Box<dyn VisionLanguageModel>,
    latest: Option<ContextUpdate>,
    updates: u64,
}

impl AnswerStage {
    pub fn new(model: Box<dyn VisionLanguageModel>) -> Self {
        Self {
            model,
            latest: None,
            updates: 0,
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.model.warm_up()
    }

    /// Replace the held context. The previous one is dropped, never merged.
    pub fn update_context(&mut self, update: ContextUpdate) {
        self.latest = Some(update);
        self.updates += 1;
    }

    pub fn latest_frame_id(&self) -> Option<u64> {
        self.latest.as_ref().map(|update| update.summary.frame_id)
    }

    /// Number of context updates received so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Answer a question against the current context.
    ///
    /// Without context this is the not-ready answer, never an error. A model
    /// failure is returned as a `Collaborator` failure for this query only.
    pub fn answer(&mut self, query: &Query) -> Result<Answer, StageError> {
        let Some(latest) = self.latest.as_ref() else {
            return Ok(Answer::not_ready(query.text.clone()));
        };
        let text = self
            .model
            .answer(&latest.frame, &latest.summary.rendered_prompt, &query.text)
            .map_err(|err| StageError::from_anyhow(STAGE, FailureKind::Collaborator, &err))?;
        Ok(Answer {
            text,
            question: query.text.clone(),
            grounding_frame_id: Some(latest.summary.frame_id),
        })
    }
}
