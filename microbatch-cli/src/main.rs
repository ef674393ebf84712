use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use microbatch_api::{DStream, StreamingContext};
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::graph::InputQueue;
use tracing::{Level, info};

#[derive(Parser, Debug)]
#[command(name = "microbatch")]
#[command(about = "Run micro-batch word-count pipelines over a text file", long_about = None)]
struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every pipeline.
#[derive(Args, Debug)]
struct RunArgs {
    /// Text file; each group of `--lines-per-batch` lines is one batch.
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = 1)]
    lines_per_batch: usize,
    #[arg(long, default_value_t = 1000)]
    batch_ms: u64,
    #[arg(long, default_value_t = 2)]
    parallelism: usize,
    /// Extra empty batches run after the input is exhausted.
    #[arg(long, default_value_t = 0)]
    drain_batches: usize,
    /// Elements printed per batch.
    #[arg(long, default_value_t = 10)]
    top: usize,
    /// Also write every batch under `<prefix>-<ms>/part-NNNNN`.
    #[arg(long)]
    output_prefix: Option<String>,
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
    /// Resume from the latest checkpoint in `--checkpoint-dir`.
    #[arg(long)]
    recover: bool,
    /// Print the stream graph before running.
    #[arg(long)]
    explain: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Word counts over a sliding window.
    WindowCount {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value_t = 3000)]
        window_ms: u64,
        /// Defaults to the batch duration.
        #[arg(long)]
        slide_ms: Option<u64>,
        /// Recompute every window instead of updating it incrementally.
        #[arg(long)]
        naive: bool,
    },
    /// Word counts accumulated since the first batch.
    RunningCount {
        #[command(flatten)]
        run: RunArgs,
        /// Checkpoint the running totals every this many ms.
        #[arg(long)]
        checkpoint_interval_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::WindowCount {
            run,
            window_ms,
            slide_ms,
            naive,
        } => {
            let pipeline = build_context(&run, "window-count")?;
            let window = Duration::from_millis(window_ms);
            let slide = slide_ms.map(Duration::from_millis);
            let counts = if naive {
                pipeline
                    .words
                    .reduce_by_key_and_window(|a, b| a + b, window, slide, None)?
            } else {
                pipeline.words.reduce_by_key_and_window_inv(
                    |a, b| a + b,
                    |a, b| a - b,
                    window,
                    slide,
                    None,
                    Some(Arc::new(|(_, count): &(String, i64)| *count > 0)),
                )?
            };
            execute(&pipeline, &run, &counts)
        }
        Commands::RunningCount {
            run,
            checkpoint_interval_ms,
        } => {
            let pipeline = build_context(&run, "running-count")?;
            let mut totals = pipeline.words.update_state_by_key(
                |values: &[i64], total: Option<&i64>| {
                    Some(total.copied().unwrap_or(0) + values.iter().sum::<i64>())
                },
                None,
            );
            if let Some(interval_ms) = checkpoint_interval_ms {
                totals = totals.checkpoint(Duration::from_millis(interval_ms))?;
            }
            execute(&pipeline, &run, &totals)
        }
    }
}

/// A context whose word stream reads from a queue filled at run time.
struct Pipeline {
    ctx: StreamingContext,
    queue: InputQueue<String>,
    words: DStream<(String, i64)>,
}

fn build_context(run: &RunArgs, app_name: &str) -> Result<Pipeline> {
    let mut config = StreamingConfig::new(app_name, Duration::from_millis(run.batch_ms))
        .with_default_parallelism(run.parallelism);
    if let Some(dir) = &run.checkpoint_dir {
        config = config.with_checkpoint_dir(dir);
    }
    let ctx = StreamingContext::new(config)?;
    let queue = InputQueue::new();
    let words = ctx
        .queue_stream(queue.clone(), true)
        .flat_map(|line: &String| {
            line.split_whitespace()
                .map(|w| (w.to_lowercase(), 1i64))
                .collect::<Vec<_>>()
        });
    Ok(Pipeline { ctx, queue, words })
}

/// Attach the outputs, queue the input batches not yet covered by a
/// recovered checkpoint, then run them plus the drain batches.
fn execute(pipeline: &Pipeline, run: &RunArgs, counts: &DStream<(String, i64)>) -> Result<()> {
    let ctx = &pipeline.ctx;
    counts.pprint(run.top);
    if let Some(prefix) = &run.output_prefix {
        counts.save_as_text_files(prefix, None);
    }
    if run.explain {
        print!("{}", ctx.explain());
    }

    let mut done = 0usize;
    if run.recover {
        match ctx.recover()? {
            Some(time) => {
                let zero = ctx.config().zero_time;
                done = ((time.millis() - zero.millis()) / ctx.batch_millis()).max(0) as usize;
                info!(%time, skipped = done, "resuming after checkpoint");
            }
            None => info!("no checkpoint found; starting from the beginning"),
        }
    }

    let text = std::fs::read_to_string(&run.input)
        .with_context(|| format!("failed to read {}", run.input.display()))?;
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let chunks: Vec<&[String]> = lines.chunks(run.lines_per_batch.max(1)).collect();
    for chunk in chunks.iter().skip(done) {
        pipeline
            .queue
            .push(Dataset::parallelize(chunk.to_vec(), run.parallelism))?;
    }
    let pending = pipeline.queue.len()?;
    info!(
        input = %run.input.display(),
        lines = lines.len(),
        batches = pending,
        "input loaded"
    );

    let last = ctx.run_batches(pending + run.drain_batches)?;
    info!(last = ?last, "finished");
    Ok(())
}
