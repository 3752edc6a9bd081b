use serde::{Deserialize, Serialize};

/// Runtime failure taxonomy shared by every stage.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The frame source cannot deliver frames any more.
    SourceExhausted,
    /// A downstream channel was full and the item was discarded.
    Backpressure,
    /// A question arrived before any context existed.
    NotReady,
    /// A detector, model or recorder call failed for one item.
    Collaborator,
    /// Connecting or warming up a collaborator failed.
    Initialization,
}

/// What a stage does when it hits a failure of a given kind.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// Stop the stage and trigger pipeline shutdown.
    StopPipeline,
    /// Count it, never surface it.
    DropSilently,
    /// Answer the user with a non-fatal message.
    ReportToUser,
    /// Drop the current item and continue with the next one.
    DropItem,
    /// Refuse to start the pipeline.
    FailStartup,
}

impl FailureKind {
    pub fn policy(self) -> FailurePolicy {
        match self {
            FailureKind::SourceExhausted => FailurePolicy::StopPipeline,
            FailureKind::Backpressure => FailurePolicy::DropSilently,
            FailureKind::NotReady => FailurePolicy::ReportToUser,
            FailureKind::Collaborator => FailurePolicy::DropItem,
            FailureKind::Initialization => FailurePolicy::FailStartup,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::SourceExhausted => "source_exhausted",
            FailureKind::Backpressure => "backpressure",
            FailureKind::NotReady => "not_ready",
            FailureKind::Collaborator => "collaborator",
            FailureKind::Initialization => "initialization",
        }
    }
}

/// A classified failure raised inside a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageError {
    pub stage: &'static str,
    pub kind: FailureKind,
    pub message: String,
}

impl StageError {
    pub fn new(stage: &'static str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Classify an `anyhow` error from a collaborator call.
    pub fn from_anyhow(stage: &'static str, kind: FailureKind, err: &anyhow::Error) -> Self {
        Self::new(stage, kind, format!("{:#}", err))
    }

    pub fn policy(&self) -> FailurePolicy {
        self.kind.policy()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.policy(),
            FailurePolicy::StopPipeline | FailurePolicy::FailStartup
        )
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.stage, self.kind.as_str(), self.message)
    }
}

impl std::error::Error for StageError {}
