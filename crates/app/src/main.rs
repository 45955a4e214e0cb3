use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use treeweave_core::{Event, EventParams, HandlerKind, Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

fn main() -> treeweave_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            log,
            config,
            frames,
            press,
        } => run_replay(&log, config.as_deref(), frames, &press),
        Commands::Tree { log } => run_tree(&log),
    }
}

fn load_log(path: &Path) -> treeweave_core::Result<Vec<Event>> {
    let events = Event::parse_log(&std::fs::read_to_string(path)?)?;
    tracing::info!(?path, events = events.len(), "event log loaded");
    Ok(events)
}

fn run_replay(
    log: &Path,
    config: Option<&Path>,
    frames: u32,
    press: &[String],
) -> treeweave_core::Result<()> {
    let config = match config {
        Some(path) => RuntimeConfig::from_json_file(path)?,
        None => RuntimeConfig::default(),
    };
    let frame = config.frame.interval();
    let runtime = Runtime::builder("replay").config(config).build();
    runtime.sync(&load_log(log)?);

    // Presses land on consecutive frames, then the remaining frames run out.
    let mut now = Duration::ZERO;
    let step = |runtime: &Runtime, now: &mut Duration| {
        *now += frame;
        runtime.frame(*now);
        runtime.poll(*now);
    };
    for node in press {
        let report = runtime.handle(node, HandlerKind::Press, &EventParams::new(), now)?;
        for error in &report.errors {
            tracing::error!(node = %node, %error, "press");
        }
        step(&runtime, &mut now);
    }
    for _ in 0..frames {
        step(&runtime, &mut now);
    }

    println!("{}", serde_json::to_string_pretty(&runtime.cells().snapshot())?);
    Ok(())
}

fn run_tree(log: &Path) -> treeweave_core::Result<()> {
    let runtime = Runtime::new("tree");
    runtime.sync(&load_log(log)?);
    let graph = runtime.graph_snapshot();
    for problem in graph.violations() {
        tracing::warn!(%problem, "inconsistent graph");
    }
    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Replays Treeweave event logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an event log, drive frames and presses, and print the cells.
    Replay {
        /// JSON array of events.
        log: PathBuf,
        /// Runtime configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Frames to run after the presses.
        #[arg(short, long, default_value_t = 0)]
        frames: u32,
        /// Node to press; repeatable.
        #[arg(short, long)]
        press: Vec<String>,
    },
    /// Replay an event log and print the synthesized node graph.
    Tree {
        /// JSON array of events.
        log: PathBuf,
    },
}
