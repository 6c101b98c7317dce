use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fusion_engine::CycleScheduler;
use fusion_runtime::{load_profile, logging, render_snapshot, LogFormat, Plan};
use fusion_sources::{Credentials, SourceFetcher};
use fusion_types::Profile;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fusion-runtime", version)]
#[command(about = "Scheduled market data fusion with integrity-gated retries")]
struct Args {
    /// Console log format (filter with RUST_LOG)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run cycles until Ctrl-C or SIGTERM
    Run {
        /// Path to the instrument profile
        #[arg(short, long)]
        profile: PathBuf,
    },

    /// Run a single cycle, retries included, then exit
    Once {
        /// Path to the instrument profile
        #[arg(short, long)]
        profile: PathBuf,
    },

    /// Validate a profile and its credentials, then print the plan
    Check {
        /// Path to the instrument profile
        #[arg(short, long)]
        profile: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a persisted snapshot as a dashboard block
    Inspect {
        /// Snapshot artifact (JSON)
        snapshot: PathBuf,

        /// Symbol for the header; defaults to the artifact's directory name
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_format)?;

    match args.command {
        Command::Run { profile } => run(&profile).await,
        Command::Once { profile } => once(&profile).await,
        Command::Check { profile, json } => check(&profile, json),
        Command::Inspect { snapshot, symbol } => {
            let block = render_snapshot(&snapshot, symbol.as_deref()).await?;
            print!("{}", block.trim_start());
            Ok(())
        }
    }
}

/// Load the profile and resolve its sources against the environment.
fn prepare(path: &Path) -> Result<(Profile, SourceFetcher)> {
    let profile = load_profile(path)?;
    let fetcher = SourceFetcher::new(&profile, &Credentials::from_env())
        .with_context(|| format!("cannot resolve sources for {}", profile.symbol))?;
    Ok((profile, fetcher))
}

async fn run(path: &Path) -> Result<()> {
    let (profile, fetcher) = prepare(path)?;
    info!(
        symbol = %profile.symbol,
        sources = profile.sources.len(),
        interval = %profile.schedule.interval,
        "Starting fusion runtime"
    );

    let handle = CycleScheduler::builder(Arc::new(profile), Arc::new(fetcher))
        .build()
        .start();

    shutdown_signal().await?;
    info!(phase = %handle.status().phase, "Shutdown requested, finishing current cycle");
    handle.shutdown().await?;
    Ok(())
}

async fn once(path: &Path) -> Result<()> {
    let (profile, fetcher) = prepare(path)?;
    let scheduler = CycleScheduler::builder(Arc::new(profile), Arc::new(fetcher)).build();

    let outcome = scheduler.run_once().await;
    info!(
        attempts = outcome.attempts,
        integrity = outcome.snapshot.integrity_score,
        resolution = ?outcome.resolution,
        "Cycle finished"
    );

    if let Some(artifact) = &outcome.persisted.artifact {
        println!("{}", artifact.display());
    }
    if !outcome.persisted.is_complete() {
        bail!(
            "cycle finished but {} artifact write(s) failed",
            outcome.persisted.errors.len()
        );
    }
    Ok(())
}

fn check(path: &Path, json: bool) -> Result<()> {
    let (profile, fetcher) = prepare(path)?;
    let plan = Plan::new(&profile, &fetcher);

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", plan);
    }
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
