//! scened - interactive scene question answering
//!
//! This binary:
//! 1. Loads the pipeline configuration (file, env, flags)
//! 2. Connects the camera and warms up the detector and model
//! 3. Runs the camera → detector → context → answer pipeline
//! 4. Reads questions from stdin and prints grounded answers
//!
//! Ctrl-C, `quit` or end of input stops the pipeline.

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use scene_kernel::{
    Answer, BackendRegistry, CameraSource, DescribingModel, Pipeline, PipelineConfig,
    PipelineHandle, Query, ShutdownSignal,
};

#[path = "../ui.rs"]
mod ui;

const INPUT_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "scened",
    version,
    about = "Ask questions about what the camera currently sees"
)]
struct Args {
    /// Configuration file (TOML when the extension is .toml, JSON otherwise)
    #[arg(long, env = "SCENE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the frame source URL (stub://..., image://...)
    #[arg(long, value_name = "URL")]
    source: Option<String>,

    /// Override the detector backend
    #[arg(long, value_name = "NAME")]
    detector: Option<String>,

    /// List detector backends and exit
    #[arg(long)]
    list_detectors: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut registry = BackendRegistry::with_builtin();
    if args.list_detectors {
        for name in registry.list() {
            println!("{}", name);
        }
        return Ok(());
    }

    let ui = ui::Ui::for_stderr(args.ui);
    let config = {
        let mut stage = ui.stage("Load configuration");
        load_config(&args).map_err(|e| {
            stage.fail();
            e
        })?
    };

    let shutdown = ShutdownSignal::new();
    let handle = {
        let mut stage = ui.stage("Start pipeline");
        start_pipeline(&config, &mut registry, shutdown.clone()).map_err(|e| {
            stage.fail();
            e
        })?
    };

    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        signal.trigger();
    })
    .expect("error setting Ctrl-C handler");

    let listener = spawn_answer_listener(&handle, shutdown.clone());
    print_welcome(&config);
    run_session(&handle, &shutdown);

    shutdown.trigger();
    let report = handle.stop();
    let _ = listener.join();

    log::info!(
        "stopped={:?} abandoned={:?} panicked={:?}",
        report.stopped,
        report.abandoned,
        report.panicked
    );
    if let Ok(stats) = serde_json::to_string(&report.stats) {
        log::info!("pipeline stats: {}", stats);
    }
    if let Some(failure) = report.failures.into_iter().next() {
        return Err(failure.into());
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load_from(args.config.as_deref())?;
    if let Some(source) = &args.source {
        config.capture.source_url = source.clone();
    }
    if let Some(detector) = &args.detector {
        config.detector.backend = detector.clone();
    }
    config.validate()?;
    Ok(config)
}

fn start_pipeline(
    config: &PipelineConfig,
    registry: &mut BackendRegistry,
    shutdown: ShutdownSignal,
) -> Result<PipelineHandle> {
    let source = CameraSource::new(config.capture.camera())?;
    let detector = registry.take(&config.detector.backend)?;
    Pipeline::new(
        config.clone(),
        Box::new(source),
        detector,
        Box::new(DescribingModel::new()),
    )
    .with_shutdown(shutdown)
    .spawn()
}

fn spawn_answer_listener(handle: &PipelineHandle, shutdown: ShutdownSignal) -> thread::JoinHandle<()> {
    let answers = handle.answers();
    thread::spawn(move || {
        while !shutdown.is_triggered() {
            if let Some(answer) = answers.take(INPUT_POLL) {
                print_answer(&answer);
            }
        }
    })
}

/// Read stdin on its own thread so Ctrl-C and pipeline failures are noticed
/// while waiting for input.
fn run_session(handle: &PipelineHandle, shutdown: &ShutdownSignal) {
    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    prompt();
    loop {
        if shutdown.is_triggered() {
            println!();
            println!("Pipeline stopped.");
            return;
        }
        let line = match rx.recv_timeout(INPUT_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };
        let question = line.trim();
        match question.to_lowercase().as_str() {
            "" => {}
            "quit" | "exit" | "q" => return,
            "help" => print_help(),
            "stats" => print_stats(handle),
            _ => {
                if !handle.submit(Query::new(question)) {
                    println!("Question dropped: too many questions pending.");
                }
            }
        }
        prompt();
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_answer(answer: &Answer) {
    match answer.grounding_frame_id {
        Some(frame_id) => println!("\nAnswer (frame {}): {}", frame_id, answer.text),
        None => println!("\nAnswer (no frame): {}", answer.text),
    }
    prompt();
}

fn print_welcome(config: &PipelineConfig) {
    println!("Scene question answering");
    println!(
        "source={} detector={} process_fps={} window={}s",
        config.capture.source_url,
        config.detector.backend,
        config.capture.process_fps,
        config.context.window_seconds
    );
    println!("Type a question about the scene, or 'help'.");
}

fn print_help() {
    println!("Commands:");
    println!("  help             show this message");
    println!("  stats            show per-stage counters");
    println!("  quit, exit, q    stop and exit");
    println!("Anything else is sent as a question, e.g. 'what is on the table?'");
}

fn print_stats(handle: &PipelineHandle) {
    let stats = handle.stats();
    for (name, stage) in [
        ("camera", &stats.camera),
        ("detector", &stats.detector),
        ("context", &stats.context),
        ("answer", &stats.answer),
    ] {
        println!(
            "  {:<9} processed={} failed={} dropped={} fps={:.1}",
            name, stage.processed, stage.failed, stage.dropped, stage.fps
        );
    }
    println!("  queries dropped={}", stats.queries_dropped);
}
