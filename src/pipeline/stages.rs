//! Worker loops, one per pipeline stage.
//!
//! Every loop polls its input with the configured timeout and re-checks the
//! shutdown signal after each poll. Collaborator calls happen outside any lock.

use log::{debug, error, info, warn};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::answer::{Answer, AnswerStage, Query};
use crate::channel::BoundedChannel;
use crate::context::{ContextEngine, ContextUpdate};
use crate::detect::{DetectionFrame, DetectorBackend};
use crate::error::{FailureKind, FailurePolicy, StageError};
use crate::frame::{Frame, FrameSampler};
use crate::ingest::FrameSource;
use crate::metrics::{RateMonitor, StageCounters};
use crate::record::DetectionRecorder;
use crate::shutdown::ShutdownSignal;

pub(crate) const CAMERA: &str = "camera";
pub(crate) const DETECTOR: &str = "detector";
pub(crate) const CONTEXT: &str = "context";
pub(crate) const ANSWER: &str = "answer";

/// State every stage loop carries.
pub(crate) struct StageRuntime {
    pub shutdown: ShutdownSignal,
    pub counters: Arc<StageCounters>,
    pub poll_timeout: Duration,
    pub health_log_interval: Duration,
}

/// Apply the failure policy for `err`. `Break` means the stage must stop.
fn handle_failure(
    err: StageError,
    frame_id: Option<u64>,
    runtime: &StageRuntime,
) -> ControlFlow<StageError> {
    match err.policy() {
        FailurePolicy::StopPipeline | FailurePolicy::FailStartup => {
            error!("{}; stopping pipeline", err);
            runtime.counters.record_failed();
            runtime.shutdown.trigger();
            ControlFlow::Break(err)
        }
        FailurePolicy::DropItem => {
            match frame_id {
                Some(id) => warn!("{} (frame {} dropped)", err, id),
                None => warn!("{} (item dropped)", err),
            }
            runtime.counters.record_failed();
            ControlFlow::Continue(())
        }
        FailurePolicy::DropSilently | FailurePolicy::ReportToUser => {
            match frame_id {
                Some(id) => debug!("{} (frame {})", err, id),
                None => debug!("{}", err),
            }
            ControlFlow::Continue(())
        }
    }
}

/// Offer `item` downstream. A full channel is a backpressure failure for `stage`.
fn forward<T>(
    stage: &'static str,
    output: &BoundedChannel<T>,
    item: T,
    frame_id: Option<u64>,
    runtime: &StageRuntime,
) -> ControlFlow<StageError> {
    if output.offer(item) {
        return ControlFlow::Continue(());
    }
    let failure = StageError::new(
        stage,
        FailureKind::Backpressure,
        "downstream queue full, item dropped",
    );
    handle_failure(failure, frame_id, runtime)
}

/// Source status in the form the camera health line carries.
fn source_health(source: &dyn FrameSource) -> String {
    let stats = source.stats();
    format!(
        "source health={} frames={} url={}",
        source.is_healthy(),
        stats.frames_captured,
        stats.url
    )
}

/// Periodic health line for one stage.
struct HealthLog {
    stage: &'static str,
    interval: Duration,
    last: Instant,
}

impl HealthLog {
    fn new(stage: &'static str, interval: Duration) -> Self {
        Self {
            stage,
            interval,
            last: Instant::now(),
        }
    }

    /// Returns `true` when a health line was written.
    fn maybe_log(&mut self, runtime: &StageRuntime, rate: &RateMonitor, dropped: u64) -> bool {
        runtime.counters.publish_rate(rate);
        if self.interval.is_zero() || self.last.elapsed() < self.interval {
            return false;
        }
        let stats = rate.stats();
        info!(
            "{} health processed={} failed={} dropped={} fps={:.1} avg_ms={:.1} min_ms={:.1} max_ms={:.1}",
            self.stage,
            runtime.counters.processed(),
            runtime.counters.failed(),
            dropped,
            rate.fps(),
            stats.avg_ms,
            stats.min_ms,
            stats.max_ms
        );
        self.last = Instant::now();
        true
    }
}

// ----------------------------------------------------------------------------
// Camera
// ----------------------------------------------------------------------------

pub(crate) struct CameraStage {
    pub sampler: FrameSampler,
    pub output: BoundedChannel<Frame>,
    pub runtime: StageRuntime,
}

impl CameraStage {
    pub fn run(mut self) -> Result<(), StageError> {
        info!(
            "{} stage started (source={}, interval={:.3}s)",
            CAMERA,
            self.sampler.source().name(),
            self.sampler.interval_secs()
        );
        let mut rate = RateMonitor::default();
        let mut health = HealthLog::new(CAMERA, self.runtime.health_log_interval);

        while !self.runtime.shutdown.is_triggered() {
            match self.sampler.tick() {
                Ok(Some(frame)) => {
                    let id = frame.id;
                    rate.tick();
                    self.runtime.counters.record_processed();
                    if let ControlFlow::Break(failure) =
                        forward(CAMERA, &self.output, frame, Some(id), &self.runtime)
                    {
                        return Err(failure);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    let failure =
                        StageError::from_anyhow(CAMERA, FailureKind::SourceExhausted, &err);
                    if let ControlFlow::Break(failure) = handle_failure(failure, None, &self.runtime)
                    {
                        return Err(failure);
                    }
                }
            }
            if health.maybe_log(&self.runtime, &rate, self.output.dropped()) {
                info!("{} {}", CAMERA, source_health(self.sampler.source()));
            }
        }

        info!("{} {}", CAMERA, source_health(self.sampler.source()));
        let stats = self.sampler.stats();
        info!(
            "{} stage stopped (raw={}, sampled={}, discarded={})",
            CAMERA, stats.raw_captures, stats.sampled, stats.discarded
        );
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Detector
// ----------------------------------------------------------------------------

pub(crate) struct DetectorStage {
    pub detector: Box<dyn DetectorBackend>,
    pub min_confidence: f32,
    pub recorder: Option<DetectionRecorder>,
    pub input: BoundedChannel<Frame>,
    pub output: BoundedChannel<DetectionFrame>,
    pub runtime: StageRuntime,
}

impl DetectorStage {
    pub fn run(mut self) -> Result<(), StageError> {
        info!("{} stage started (backend={})", DETECTOR, self.detector.name());
        let mut rate = RateMonitor::default();
        let mut health = HealthLog::new(DETECTOR, self.runtime.health_log_interval);

        while !self.runtime.shutdown.is_triggered() {
            if let Some(frame) = self.input.take(self.runtime.poll_timeout) {
                let id = frame.id;
                match self.detect(frame) {
                    Ok(detection_frame) => {
                        rate.tick();
                        self.runtime.counters.record_processed();
                        debug!(
                            "frame {}: {} detections",
                            id,
                            detection_frame.detections.len()
                        );
                        // A failed dump does not stop the frame from moving on.
                        if let ControlFlow::Break(failure) = self.record(&detection_frame) {
                            return Err(failure);
                        }
                        if let ControlFlow::Break(failure) =
                            forward(DETECTOR, &self.output, detection_frame, Some(id), &self.runtime)
                        {
                            return Err(failure);
                        }
                    }
                    Err(failure) => {
                        if let ControlFlow::Break(failure) =
                            handle_failure(failure, Some(id), &self.runtime)
                        {
                            return Err(failure);
                        }
                    }
                }
            }
            health.maybe_log(&self.runtime, &rate, self.output.dropped());
        }

        info!("{} stage stopped", DETECTOR);
        Ok(())
    }

    fn detect(&mut self, frame: Frame) -> Result<DetectionFrame, StageError> {
        let detections = self
            .detector
            .detect(&frame)
            .map_err(|err| StageError::from_anyhow(DETECTOR, FailureKind::Collaborator, &err))?;
        for detection in &detections {
            detection
                .validate()
                .map_err(|err| StageError::from_anyhow(DETECTOR, FailureKind::Collaborator, &err))?;
        }
        let kept = detections
            .into_iter()
            .filter(|d| d.confidence >= self.min_confidence)
            .collect();
        Ok(DetectionFrame::new(frame, kept))
    }

    fn record(&mut self, detection_frame: &DetectionFrame) -> ControlFlow<StageError> {
        let Some(recorder) = self.recorder.as_mut() else {
            return ControlFlow::Continue(());
        };
        match recorder.write(detection_frame) {
            Ok(_) => ControlFlow::Continue(()),
            Err(err) => {
                let failure = StageError::from_anyhow(DETECTOR, FailureKind::Collaborator, &err);
                handle_failure(failure, Some(detection_frame.frame.id), &self.runtime)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Context
// ----------------------------------------------------------------------------

pub(crate) struct ContextStage {
    pub engine: ContextEngine,
    pub input: BoundedChannel<DetectionFrame>,
    pub output: BoundedChannel<ContextUpdate>,
    pub runtime: StageRuntime,
}

impl ContextStage {
    pub fn run(mut self) -> Result<(), StageError> {
        info!(
            "{} stage started (window={}s, max_entries={})",
            CONTEXT,
            self.engine.window().duration_secs(),
            self.engine.window().max_entries()
        );
        let mut rate = RateMonitor::default();
        let mut health = HealthLog::new(CONTEXT, self.runtime.health_log_interval);

        while !self.runtime.shutdown.is_triggered() {
            if let Some(detection_frame) = self.input.take(self.runtime.poll_timeout) {
                let update = self.engine.process(detection_frame);
                rate.tick();
                self.runtime.counters.record_processed();
                let summary = &update.summary;
                debug!(
                    "frame {}: visible={:?} relationships={} window_depth={}",
                    summary.frame_id,
                    summary.objects_visible,
                    summary.relationships.len(),
                    summary.window_depth
                );
                let id = summary.frame_id;
                if let ControlFlow::Break(failure) =
                    forward(CONTEXT, &self.output, update, Some(id), &self.runtime)
                {
                    return Err(failure);
                }
            }
            health.maybe_log(&self.runtime, &rate, self.output.dropped());
        }

        info!("{} stage stopped", CONTEXT);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Answer
// ----------------------------------------------------------------------------

pub(crate) struct AnswerWorker {
    pub stage: AnswerStage,
    pub contexts: BoundedChannel<ContextUpdate>,
    pub queries: BoundedChannel<Query>,
    pub answers: BoundedChannel<Answer>,
    pub runtime: StageRuntime,
}

impl AnswerWorker {
    pub fn run(mut self) -> Result<(), StageError> {
        info!("{} stage started (model={})", ANSWER, self.stage.model_name());
        let mut rate = RateMonitor::default();
        let mut health = HealthLog::new(ANSWER, self.runtime.health_log_interval);

        while !self.runtime.shutdown.is_triggered() {
            self.drain_contexts();
            if let Some(query) = self.queries.take(self.runtime.poll_timeout) {
                // Pick up anything that arrived while waiting for the question.
                self.drain_contexts();
                match self.stage.answer(&query) {
                    Ok(answer) => {
                        rate.tick();
                        self.runtime.counters.record_processed();
                        let grounding = answer.grounding_frame_id;
                        if grounding.is_none() {
                            let note = StageError::new(ANSWER, FailureKind::NotReady, "no context yet");
                            if let ControlFlow::Break(failure) =
                                handle_failure(note, None, &self.runtime)
                            {
                                return Err(failure);
                            }
                        }
                        if let ControlFlow::Break(failure) =
                            forward(ANSWER, &self.answers, answer, grounding, &self.runtime)
                        {
                            return Err(failure);
                        }
                    }
                    Err(failure) => {
                        let frame_id = self.stage.latest_frame_id();
                        if let ControlFlow::Break(failure) =
                            handle_failure(failure, frame_id, &self.runtime)
                        {
                            return Err(failure);
                        }
                    }
                }
            }
            health.maybe_log(&self.runtime, &rate, self.answers.dropped());
        }

        info!(
            "{} stage stopped (context updates={})",
            ANSWER,
            self.stage.updates()
        );
        Ok(())
    }

    fn drain_contexts(&mut self) {
        while let Some(update) = self.contexts.try_take() {
            self.stage.update_context(update);
        }
    }
}
