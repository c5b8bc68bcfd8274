//! huginn batch CLI.
//!
//! Reads one input per line from a file or stdin, runs every line through
//! the task queue and prints one JSON object per task, in input order.

use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use huginn::config::HuginnConfig;
use huginn::queue::TaskQueue;
use huginn::{Priority, RequestDescriptor, TaskKind, TaskStatus};

/// Batch-run LLM tasks through the huginn orchestrator.
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Batch LLM task runner with caching and fallback")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Task to run for every line (categorize, translate, build-context,
    /// score, evaluate, detect-entity).
    #[arg(short, long, default_value = "categorize")]
    task: TaskKind,

    /// Routing priority (fast, balanced, accurate).
    #[arg(short, long, default_value = "balanced")]
    priority: Priority,

    /// Target language tag for the translate task.
    #[arg(long)]
    target_language: Option<String>,

    /// Override the configured concurrency.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Input file, one request per line (default: stdin).
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // default: warn for CLI; override with RUST_LOG
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = HuginnConfig::load_or_default(args.config.as_deref())?;

    let lines = read_lines(args.input.as_deref())?;
    if lines.is_empty() {
        eprintln!("huginn: no input lines");
        return Ok(());
    }

    let orchestrator = config.orchestrator_builder().await?.build()?;
    let mut queue_config = config.queue.clone();
    if let Some(n) = args.max_concurrent {
        queue_config.max_concurrent = n;
    }
    let queue = TaskQueue::new(Arc::new(orchestrator), queue_config)?;

    info!(
        version = huginn::version_string(),
        lines = lines.len(),
        task = %args.task,
        "huginn starting"
    );

    let ids = queue.enqueue_batch(lines.into_iter().map(|line| {
        let mut request = RequestDescriptor::new(line, args.task).priority(args.priority);
        if let Some(tag) = &args.target_language {
            request = request.target_language(tag.clone());
        }
        request
    }));
    queue.start();

    tokio::select! {
        _ = queue.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            let cancelled = queue.shutdown();
            eprintln!("huginn: interrupted, {cancelled} task(s) cancelled");
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for id in ids {
        if let Some(task) = queue.get_task(id) {
            serde_json::to_writer(&mut out, &task)?;
            std::io::Write::write_all(&mut out, b"\n")?;
        }
    }

    let stats = queue.stats();
    eprintln!(
        "huginn: {} completed, {} failed, {} cancelled ({:.0}% success, avg {:.0} ms)",
        stats.completed,
        stats.failed,
        stats.cancelled,
        stats.success_rate * 100.0,
        stats.average_time_ms
    );

    if queue.tasks_with_status(TaskStatus::Failed).is_empty() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

/// Non-blank lines from `path`, or from stdin when no path is given.
fn read_lines(path: Option<&std::path::Path>) -> io::Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match path {
        Some(path) => Box::new(io::BufReader::new(std::fs::File::open(path)?)),
        None => {
            if io::stdin().is_terminal() {
                eprintln!("huginn: reading lines from stdin (Ctrl-D to finish)");
            }
            Box::new(io::stdin().lock())
        }
    };
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_owned());
        }
    }
    Ok(lines)
}
