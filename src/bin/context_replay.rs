//! context_replay - rebuild scene context from recorded detections.
//!
//! Reads the `frame_*.json` dumps written when `recording.detections_dir`
//! is set, replays them through the context engine in frame-id order and
//! prints the rendered prompt for each frame.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use scene_kernel::{record, ContextSummary, PipelineConfig};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "context_replay",
    about = "Replay recorded detections through the context engine"
)]
struct Args {
    /// Directory of frame_*.json detection records
    #[arg(long, value_name = "PATH")]
    dir: PathBuf,

    /// Configuration file for window and relationship settings
    #[arg(long, env = "SCENE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print only the final context
    #[arg(long)]
    last: bool,

    /// Print summaries as JSON lines instead of rendered prompts
    #[arg(long)]
    json: bool,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value = "auto")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let ui = ui::Ui::for_stderr(args.ui);

    let config = {
        let mut stage = ui.stage("Load configuration");
        PipelineConfig::load_from(args.config.as_deref()).map_err(|e| {
            stage.fail();
            e
        })?
    };
    let records = {
        let mut stage = ui.stage("Load detection records");
        record::load_records(&args.dir).map_err(|e| {
            stage.fail();
            e
        })?
    };
    if records.is_empty() {
        bail!("no detection records in {}", args.dir.display());
    }

    // The spinner owns the terminal until the stage ends; print afterwards.
    let summaries = {
        let _stage = ui.stage("Replay");
        record::replay(&config.context, records, args.last)?
    };
    for summary in &summaries {
        print_summary(summary, args.json)?;
    }
    Ok(())
}

fn print_summary(summary: &ContextSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
    } else {
        println!(
            "=== frame {} (t={:.3}, window depth {}) ===",
            summary.frame_id, summary.captured_at, summary.window_depth
        );
        println!("{}", summary.rendered_prompt);
    }
    Ok(())
}
