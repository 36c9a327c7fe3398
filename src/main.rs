//! # stage-server
//!
//! Runs one router or one processor replica for one pipeline stage.
//!
//! ## Usage
//!
//! ```bash
//! # Router for the clean stage, listening on stages.clean.router
//! stage-server --config pipeline.toml router --stage clean
//!
//! # One clean replica; its downstream is stages.analyze.router
//! stage-server --config pipeline.toml processor --stage clean --listen 0.0.0.0:8052
//! ```
//!
//! ## Environment Variables
//!
//! - `PIPELINE_CONFIG`: path to the TOML topology (default: built-in local layout)
//! - `PIPELINE_<STAGE>_ROUTER`, `PIPELINE_<STAGE>_REPLICAS`: topology overrides
//! - `LOG_FORMAT=json`: structured JSON output
//! - `RUST_LOG=info`: log level filter

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use text_pipeline::config::loader;
use text_pipeline::{init_tracing, metrics, server, HttpTransport, Stage};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "stage-server")]
#[command(author, version, about = "Serve one router or processor of the text pipeline", long_about = None)]
struct Cli {
    /// Pipeline topology file
    #[arg(short, long, global = true, env = "PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Round-robin router in front of a stage's replicas
    Router {
        /// Stage to route (ingest, clean, analyze, report)
        #[arg(short, long)]
        stage: Stage,

        /// Listen address (default: the stage's router address from the config)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// One replica of a stage
    Processor {
        /// Stage to process (ingest, clean, analyze, report)
        #[arg(short, long)]
        stage: Stage,

        /// Listen address
        #[arg(short, long, env = "PIPELINE_LISTEN")]
        listen: String,
    },
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_tracing();
    metrics::init_metrics()?;

    let config = loader::load(cli.config.as_deref()).context("loading pipeline configuration")?;

    let (app, listen) = match cli.command {
        Command::Router { stage, listen } => {
            let listen = listen.unwrap_or_else(|| config.stage(stage).router.clone());
            info!(
                stage = %stage,
                replicas = config.stage(stage).replicas.len(),
                "starting router"
            );
            (server::build_router(&config, stage, HttpTransport::new())?, listen)
        }
        Command::Processor { stage, listen } => {
            info!(
                stage = %stage,
                downstream = config.next_router(stage).unwrap_or("-"),
                "starting processor"
            );
            (server::build_processor(&config, stage, HttpTransport::new()), listen)
        }
    };

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    server::serve(listener, app, shutdown_signal()).await?;
    Ok(())
}
