//! # pipeline-client
//!
//! Drives the text pipeline through its ingest router.
//!
//! ## Usage
//!
//! ```bash
//! # One run over a file (or the built-in sample text)
//! pipeline-client run --file book.txt
//!
//! # Every *.txt under ./datasets, split into 1, 2 and 4 parallel chunks
//! pipeline-client parallel --datasets ./datasets --chunks 1 --chunks 2 --chunks 4
//!
//! # Ten timed runs after a warm-up
//! pipeline-client bench --iterations 10
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use text_pipeline::client::{read_text_files, BenchmarkReport, PipelineResult, RunOutcome};
use text_pipeline::config::loader;
use text_pipeline::{init_tracing, HttpTransport, PipelineClient, StageTransport};

const RULE: &str = "================================================================================";

const SAMPLE_TEXT: &str = "Distributed systems are computer systems in which components located on \
networked computers communicate and coordinate their actions by passing messages. The components \
interact with each other in order to achieve a common goal. Three significant characteristics of \
distributed systems are: concurrency of components, lack of a global clock, and independent failure \
of components. Parallel computing is a type of computation in which many calculations or the \
execution of processes are carried out simultaneously. Large problems can often be divided into \
smaller ones, which can then be solved at the same time.";

#[derive(Parser)]
#[command(name = "pipeline-client")]
#[command(author, version, about = "Send text through the pipeline and report the outcome", long_about = None)]
struct Cli {
    /// Pipeline topology file
    #[arg(short, long, global = true, env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Ingest router address (overrides the config)
    #[arg(short, long, global = true)]
    router: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Single run
    Run {
        /// Input file (default: built-in sample text)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the rendered report
        #[arg(long)]
        show_report: bool,
    },

    /// Chunked parallel runs
    Parallel {
        /// Input file
        #[arg(short, long, conflicts_with = "datasets")]
        file: Option<PathBuf>,

        /// Directory of *.txt inputs
        #[arg(short, long)]
        datasets: Option<PathBuf>,

        /// Parallelism levels to try, in order
        #[arg(short = 'n', long = "chunks", default_values_t = [1usize, 2, 4])]
        chunks: Vec<usize>,

        /// Pause between parallelism levels, in milliseconds
        #[arg(long, default_value_t = 3000)]
        pause_ms: u64,
    },

    /// Warm-up plus N timed runs
    Bench {
        /// Input file (default: built-in sample text repeated five times)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Measured runs
        #[arg(short, long, default_value_t = 10)]
        iterations: usize,

        /// Pause between runs, in milliseconds
        #[arg(long, default_value_t = 500)]
        pause_ms: u64,
    },
}

fn read_input(file: Option<&PathBuf>, fallback: impl FnOnce() -> String) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(fallback()),
    }
}

fn print_outcome(outcome: &RunOutcome, show_report: bool) {
    let mark = if outcome.success { "✓" } else { "✗" };
    println!(
        "{mark} {} in {:.3}s: {}",
        outcome.request_id,
        outcome.elapsed.as_secs_f64(),
        outcome.message
    );
    if outcome.success {
        println!("  words: {}", outcome.word_count);
        if show_report {
            println!("\n{}", outcome.report);
        }
    }
}

fn print_parallel(result: &PipelineResult) {
    println!("{RULE}");
    println!("PARALLEL PROCESSING RESULTS");
    println!("{RULE}");
    println!("Total processing time: {:.3}s", result.total_elapsed.as_secs_f64());
    let total = result.outcomes.len();
    println!("Successful pipelines: {}/{total}", result.success_count);
    println!("Failed pipelines: {}/{total}", result.failure_count);
    println!("Total words processed: {}", result.total_words);
    println!("Average pipeline time: {:.3}s", result.average_time.as_secs_f64());
    if result.speedup > 0.0 {
        println!("Parallel speedup: {:.2}x", result.speedup);
    }

    println!("\nPipeline details:");
    for chunk in &result.outcomes {
        let o = &chunk.outcome;
        if o.success {
            println!(
                "  Pipeline {}: ✓ {:.3}s, {} words",
                chunk.index,
                o.elapsed.as_secs_f64(),
                o.word_count
            );
        } else {
            println!("  Pipeline {}: ✗ {:.3}s, N/A", chunk.index, o.elapsed.as_secs_f64());
        }
    }
    let mut failures = result.failures().peekable();
    if failures.peek().is_some() {
        println!("\nFailures:");
        for chunk in failures {
            println!("  Pipeline {}: {}", chunk.index, chunk.outcome.message);
        }
    }
}

fn print_benchmark(report: &BenchmarkReport) {
    println!("{RULE}");
    println!("BENCHMARK RESULTS");
    println!("{RULE}");
    println!("Total iterations: {}", report.iterations);
    println!("Successful: {}", report.successes);
    println!("Failed: {}", report.iterations - report.successes);
    if let Some(stats) = &report.stats {
        println!("\nTiming statistics:");
        println!("  Mean:     {:.3}s", stats.mean);
        println!("  Median:   {:.3}s", stats.median);
        println!("  Min:      {:.3}s", stats.min);
        println!("  Max:      {:.3}s", stats.max);
        if let Some(stdev) = stats.stdev {
            println!("  Std Dev:  {stdev:.3}s");
        }
        println!("\nThroughput: {:.2} requests/second", stats.throughput);
        println!("Average latency: {:.1}ms", stats.mean * 1000.0);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = init_tracing();

    let mut config = loader::load(cli.config.as_deref()).context("loading pipeline configuration")?;
    if let Some(router) = cli.router {
        config.client.ingest_router = Some(router);
    }

    let transport: Arc<dyn StageTransport<text_pipeline::Ingest>> = Arc::new(HttpTransport::new());
    let client = PipelineClient::from_config(&config, transport);
    println!("Ingest router: {}", client.addr());

    match cli.command {
        Command::Run { file, show_report } => {
            let text = read_input(file.as_ref(), || SAMPLE_TEXT.to_string())?;
            let outcome = client.run_once(&text).await;
            print_outcome(&outcome, show_report);
            if !outcome.success {
                anyhow::bail!("pipeline run failed");
            }
        }

        Command::Parallel {
            file,
            datasets,
            chunks,
            pause_ms,
        } => {
            let inputs: Vec<(String, String)> = match (file, datasets) {
                (_, Some(dir)) => read_text_files(&dir)?
                    .into_iter()
                    .map(|f| (f.name, f.content))
                    .collect(),
                (file, None) => {
                    let name = file
                        .as_ref()
                        .map_or("sample".to_string(), |p| p.display().to_string());
                    vec![(name, read_input(file.as_ref(), || SAMPLE_TEXT.repeat(20))?)]
                }
            };
            if inputs.is_empty() {
                anyhow::bail!("no non-empty .txt inputs found");
            }

            for (name, text) in &inputs {
                println!("\n{RULE}\nPROCESSING: {name} ({} chars)\n{RULE}", text.chars().count());
                for (i, n) in chunks.iter().enumerate() {
                    println!("\n-- {n} parallel pipeline(s) --");
                    let result = client.run_chunked(text, *n).await?;
                    print_parallel(&result);
                    if i + 1 < chunks.len() && pause_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                    }
                }
            }
        }

        Command::Bench {
            file,
            iterations,
            pause_ms,
        } => {
            let text = read_input(file.as_ref(), || SAMPLE_TEXT.repeat(5))?;
            println!("Test text length: {} characters", text.chars().count());
            println!("Iterations: {iterations} (plus one warm-up)");
            let report = client
                .benchmark(&text, iterations, Duration::from_millis(pause_ms))
                .await;
            print_benchmark(&report);
        }
    }

    Ok(())
}
