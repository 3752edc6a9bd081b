//! Scene Kernel
//!
//! A real-time camera-to-answer pipeline: frames are sampled from a camera,
//! run through an object detector, folded into a rolling scene context and
//! used to answer natural-language questions about what the camera sees.
//!
//! # Architecture
//!
//! Four stages, one thread each, connected by bounded channels:
//!
//! 1. **Camera**: samples raw captures down to the processing rate.
//! 2. **Detector**: runs the detector collaborator on each sampled frame.
//! 3. **Context**: maintains the rolling window, infers spatial relationships
//!    and renders the scene prompt.
//! 4. **Answer**: keeps the latest context and answers questions with the
//!    vision-language collaborator.
//!
//! Producers never block: a full channel drops the new item. Consumers poll
//! with a timeout and re-check the shared shutdown signal between polls.
//!
//! # Module Structure
//!
//! - `channel`, `shutdown`, `clock`: pipeline primitives
//! - `frame`, `ingest`: frames, sampling and raw sources
//! - `detect`: detection records and detector backends
//! - `context`: rolling window, relationships, prompt rendering
//! - `answer`: question answering over the latest context
//! - `pipeline`: stage threads and the shutdown protocol
//! - `config`, `error`, `metrics`, `record`: ambient support

pub mod answer;
pub mod channel;
pub mod clock;
pub mod config;
pub mod context;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod shutdown;

pub use answer::{Answer, AnswerStage, DescribingModel, Query, VisionLanguageModel};
pub use channel::BoundedChannel;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use context::{
    ContextConfig, ContextEngine, ContextSummary, ContextUpdate, Predicate, RelationConfig,
    Relationship, RollingWindow,
};
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectionFrame, DetectorBackend, ScriptedBackend,
};
pub use error::{FailureKind, FailurePolicy, StageError};
pub use frame::{Frame, FrameSampler, RawCapture};
pub use ingest::{CameraConfig, CameraSource, FrameSource, SourceStats};
pub use metrics::{PipelineStats, RateMonitor};
pub use pipeline::{Pipeline, PipelineHandle, ShutdownReport};
pub use shutdown::ShutdownSignal;
