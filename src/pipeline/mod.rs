//! Pipeline orchestration.
//!
//! `Pipeline` bundles the collaborators and configuration. `spawn` connects
//! and warms up every collaborator, then starts one thread per stage:
//!
//! ```text
//! camera ──frames──▶ detector ──detections──▶ context ──contexts──▶ answer
//!                                                        queries ──▶ answer ──answers──▶ caller
//! ```
//!
//! All stages share one `ShutdownSignal`. `PipelineHandle::stop` triggers it
//! and joins every stage with a bounded timeout; stages that do not finish in
//! time are detached and reported.

mod stages;

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::answer::{Answer, AnswerStage, Query, VisionLanguageModel};
use crate::channel::BoundedChannel;
use crate::clock::{Clock, SystemClock};
use crate::config::PipelineConfig;
use crate::context::{ContextEngine, ContextUpdate};
use crate::detect::{DetectionFrame, DetectorBackend};
use crate::error::{FailureKind, StageError};
use crate::frame::{Frame, FrameSampler};
use crate::ingest::FrameSource;
use crate::metrics::{PipelineStats, StageCounters, StageStats};
use crate::record::DetectionRecorder;
use crate::shutdown::ShutdownSignal;

use stages::{
    AnswerWorker, CameraStage, ContextStage, DetectorStage, StageRuntime, ANSWER, CAMERA,
    CONTEXT, DETECTOR,
};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Stage name for failures that belong to no single stage.
const PIPELINE: &str = "pipeline";

/// Classify a startup error as an `Initialization` failure of `stage`.
fn init<T>(stage: &'static str, result: Result<T>) -> Result<T> {
    result.map_err(|err| StageError::from_anyhow(stage, FailureKind::Initialization, &err).into())
}

/// Collaborators plus configuration, ready to be started.
pub struct Pipeline {
    config: PipelineConfig,
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    model: Box<dyn VisionLanguageModel>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        model: Box<dyn VisionLanguageModel>,
    ) -> Self {
        Self {
            config,
            source,
            detector,
            model,
            clock: Arc::new(SystemClock::new()),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Use a different timestamp source for sampling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing shutdown signal (e.g. one a Ctrl-C handler triggers).
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Initialise every collaborator, then start the stage threads.
    ///
    /// Any initialisation failure is returned before a thread is started,
    /// as a `StageError` of kind `Initialization`.
    pub fn spawn(self) -> Result<PipelineHandle> {
        let Pipeline {
            config,
            source,
            mut detector,
            model,
            clock,
            shutdown,
        } = self;
        init(PIPELINE, config.validate())?;

        let mut sampler = init(
            CAMERA,
            FrameSampler::new(source, clock, config.capture.process_fps),
        )?;
        init(
            CAMERA,
            sampler
                .connect()
                .with_context(|| format!("connect frame source {}", config.capture.source_url)),
        )?;
        info!("frame source connected: {}", sampler.source().name());

        let warm = detector
            .warm_up()
            .with_context(|| format!("warm up detector {}", detector.name()));
        init(DETECTOR, warm)?;
        let mut answer_stage = AnswerStage::new(model);
        let warm = answer_stage
            .warm_up()
            .with_context(|| format!("warm up model {}", answer_stage.model_name()));
        init(ANSWER, warm)?;

        let recorder = match &config.recording.detections_dir {
            Some(dir) => {
                let recorder = init(DETECTOR, DetectionRecorder::new(dir))?;
                info!("recording detections to {}", recorder.root().display());
                Some(recorder)
            }
            None => None,
        };
        let engine = init(CONTEXT, ContextEngine::new(&config.context))?;

        let frames = init(PIPELINE, BoundedChannel::new(config.queues.frames))?;
        let detections = init(PIPELINE, BoundedChannel::new(config.queues.detections))?;
        let contexts = init(PIPELINE, BoundedChannel::new(config.queues.contexts))?;
        let queries = init(PIPELINE, BoundedChannel::new(config.queues.queries))?;
        let answers = init(PIPELINE, BoundedChannel::new(config.queues.answers))?;

        let counters = StageSet {
            camera: StageCounters::new(),
            detector: StageCounters::new(),
            context: StageCounters::new(),
            answer: StageCounters::new(),
        };
        let runtime = |counters: &Arc<StageCounters>| StageRuntime {
            shutdown: shutdown.clone(),
            counters: counters.clone(),
            poll_timeout: config.runtime.poll_timeout,
            health_log_interval: config.runtime.health_log_interval,
        };

        let camera = CameraStage {
            sampler,
            output: frames.clone(),
            runtime: runtime(&counters.camera),
        };
        let detector = DetectorStage {
            detector,
            min_confidence: config.detector.min_confidence,
            recorder,
            input: frames.clone(),
            output: detections.clone(),
            runtime: runtime(&counters.detector),
        };
        let context = ContextStage {
            engine,
            input: detections.clone(),
            output: contexts.clone(),
            runtime: runtime(&counters.context),
        };
        let answer = AnswerWorker {
            stage: answer_stage,
            contexts: contexts.clone(),
            queries: queries.clone(),
            answers: answers.clone(),
            runtime: runtime(&counters.answer),
        };

        let mut handle = PipelineHandle {
            shutdown: shutdown.clone(),
            frames,
            detections,
            contexts,
            queries,
            answers,
            counters,
            workers: Vec::with_capacity(4),
            join_timeout: config.runtime.join_timeout,
        };

        // Downstream first, so nothing is produced before its consumer exists.
        handle.start(ANSWER, move || answer.run())?;
        handle.start(CONTEXT, move || context.run())?;
        handle.start(DETECTOR, move || detector.run())?;
        handle.start(CAMERA, move || camera.run())?;
        info!("pipeline started");
        Ok(handle)
    }
}

struct StageSet {
    camera: Arc<StageCounters>,
    detector: Arc<StageCounters>,
    context: Arc<StageCounters>,
    answer: Arc<StageCounters>,
}

struct StageWorker {
    name: &'static str,
    handle: JoinHandle<Result<(), StageError>>,
}

/// Outcome of `PipelineHandle::stop`.
#[derive(Debug, Default, Serialize)]
pub struct ShutdownReport {
    /// Stages that finished within the join timeout.
    pub stopped: Vec<&'static str>,
    /// Stages still running after the join timeout; their threads were detached.
    pub abandoned: Vec<&'static str>,
    /// Stages whose thread panicked.
    pub panicked: Vec<&'static str>,
    /// Fatal errors stages stopped with.
    #[serde(skip)]
    pub failures: Vec<StageError>,
    pub stats: PipelineStats,
}

impl ShutdownReport {
    /// Every stage stopped on its own, without a fatal error.
    pub fn is_clean(&self) -> bool {
        self.abandoned.is_empty() && self.panicked.is_empty() && self.failures.is_empty()
    }
}

/// Running pipeline. Dropping the handle triggers shutdown without waiting.
pub struct PipelineHandle {
    shutdown: ShutdownSignal,
    frames: BoundedChannel<Frame>,
    detections: BoundedChannel<DetectionFrame>,
    contexts: BoundedChannel<ContextUpdate>,
    queries: BoundedChannel<Query>,
    answers: BoundedChannel<Answer>,
    counters: StageSet,
    workers: Vec<StageWorker>,
    join_timeout: Duration,
}

impl PipelineHandle {
    fn start<F>(&mut self, name: &'static str, run: F) -> Result<()>
    where
        F: FnOnce() -> Result<(), StageError> + Send + 'static,
    {
        let spawned = thread::Builder::new()
            .name(format!("scene-{}", name))
            .spawn(run);
        match spawned {
            Ok(handle) => {
                self.workers.push(StageWorker { name, handle });
                Ok(())
            }
            Err(err) => {
                self.shutdown.trigger();
                init(name, Err(err).with_context(|| format!("spawn {} stage", name)))
            }
        }
    }

    /// Queue a question. Returns `false` if it was dropped (queue full or
    /// pipeline shutting down).
    pub fn submit(&self, query: Query) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }
        self.queries.offer(query)
    }

    /// Wait up to `timeout` for the next answer.
    pub fn next_answer(&self, timeout: Duration) -> Option<Answer> {
        self.answers.take(timeout)
    }

    /// Another handle on the answer queue, for a listener thread.
    pub fn answers(&self) -> BoundedChannel<Answer> {
        self.answers.clone()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            camera: StageStats::capture(&self.counters.camera, self.frames.dropped()),
            detector: StageStats::capture(&self.counters.detector, self.detections.dropped()),
            context: StageStats::capture(&self.counters.context, self.contexts.dropped()),
            answer: StageStats::capture(&self.counters.answer, self.answers.dropped()),
            queries_dropped: self.queries.dropped(),
        }
    }

    /// Trigger shutdown and join every stage, waiting at most the configured
    /// join timeout.
    pub fn stop(mut self) -> ShutdownReport {
        self.shutdown.trigger();
        let deadline = Instant::now() + self.join_timeout;
        let mut report = ShutdownReport::default();

        for worker in std::mem::take(&mut self.workers) {
            while !worker.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if !worker.handle.is_finished() {
                warn!(
                    "{} stage did not stop within {:?}; detaching its thread",
                    worker.name, self.join_timeout
                );
                report.abandoned.push(worker.name);
                continue;
            }
            match worker.handle.join() {
                Ok(Ok(())) => report.stopped.push(worker.name),
                Ok(Err(failure)) => {
                    report.stopped.push(worker.name);
                    report.failures.push(failure);
                }
                Err(_) => {
                    error!("{} stage panicked", worker.name);
                    report.panicked.push(worker.name);
                }
            }
        }

        report.stats = self.stats();
        info!(
            "pipeline stopped (stopped={:?}, abandoned={:?}, failures={})",
            report.stopped,
            report.abandoned,
            report.failures.len()
        );
        report
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
