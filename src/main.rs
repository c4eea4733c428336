// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `object-sync`: replicate the keys of a manifest between two directory-backed
//! stores (local disks or mounted shares).
//!
//! ```text
//! object-sync -s /mnt/primary -d /mnt/replica --domain media \
//!     -j 10 --verify -f media_2024-06-01.csv
//! ```
//!
//! Exit status: 0 when no key failed, 1 when at least one key failed, 2 when
//! the run could not start (bad config, unreadable manifest, unreachable store).
//! A checkpoint write failure after the batch is logged and does not change it.

use clap::Parser;
use object_sync::config::{StagingConfig, StoreEndpoint};
use object_sync::store::FsConnector;
use object_sync::{CheckpointStore, Manifest, ReplicationEngine, ReplicationError, RunReport, SyncJob};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Catch-up replication of a manifest of keys between two object stores.
#[derive(Parser, Debug)]
#[command(name = "object-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source store root (repeatable; first reachable wins)
    #[arg(short, long = "source", value_name = "ADDR")]
    source: Vec<String>,

    /// Destination store root (repeatable; first reachable wins)
    #[arg(short, long = "destination", value_name = "ADDR")]
    destination: Vec<String>,

    /// Domain / namespace of the keys in both stores
    #[arg(long)]
    domain: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Manifest file (`;`-separated, key in field 1)
    #[arg(short, long)]
    file: PathBuf,

    /// Skip keys the destination already has
    #[arg(long)]
    verify: bool,

    /// Parent directory for per-key staging (tmpfs recommended)
    #[arg(long, value_name = "DIR")]
    staging_dir: Option<PathBuf>,

    /// Log filter (`info`, `debug`, `object_sync=trace`); RUST_LOG wins if set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Checkpoint file
    #[arg(long, value_name = "PATH")]
    checkpoint: Option<PathBuf>,

    /// Do nothing if the checkpoint already names this manifest
    #[arg(long)]
    resume: bool,

    /// Never write the checkpoint
    #[arg(long, conflicts_with = "resume")]
    no_checkpoint: bool,

    /// JSON job file; flags override its values
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("object-sync: {}", e);
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Replication aborted");
            eprintln!("object-sync: {}", e);
            ExitCode::from(2)
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> object_sync::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| ReplicationError::Config(format!("invalid log level {:?}: {}", level, e)))?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Job file (if any) with command-line overrides applied.
fn build_job(cli: &Cli) -> object_sync::Result<SyncJob> {
    let mut job = match &cli.config {
        Some(path) => SyncJob::from_json_file(path)?,
        None => SyncJob::default(),
    };

    if !cli.source.is_empty() {
        job.source = StoreEndpoint::new(cli.source.iter().cloned());
    }
    if !cli.destination.is_empty() {
        job.destination = StoreEndpoint::new(cli.destination.iter().cloned());
    }
    if let Some(domain) = &cli.domain {
        job.domain = domain.clone();
    }
    if let Some(jobs) = cli.jobs {
        job.concurrency = jobs;
    }
    if cli.verify {
        job.verify_existing = true;
    }
    if let Some(dir) = &cli.staging_dir {
        job.staging = StagingConfig {
            base_dir: Some(dir.clone()),
            ..job.staging
        };
    }
    if let Some(path) = &cli.checkpoint {
        job.checkpoint.path = path.clone();
    }

    job.validate()?;
    Ok(job)
}

async fn run(cli: Cli) -> object_sync::Result<ExitCode> {
    let job = build_job(&cli)?;
    let manifest = Manifest::load(&cli.file)?;
    let manifest_id = manifest.id().to_string();
    let checkpoint = CheckpointStore::new(&job.checkpoint.path);

    if cli.resume && checkpoint.is_recorded(&manifest_id).await? {
        info!(manifest = %manifest_id, checkpoint = %checkpoint.path().display(), "Manifest already processed");
        println!("{}: already processed, nothing to do", manifest_id);
        return Ok(ExitCode::SUCCESS);
    }

    info!(manifest = %manifest_id, keys = manifest.len(), "Starting replication");
    let mut engine = ReplicationEngine::new(job, FsConnector);

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight keys");
            cancel.cancel();
        }
    });

    let report = engine.run(manifest.into_keys()).await?;
    print_report(&manifest_id, &report);

    let checkpoint = (!cli.no_checkpoint).then_some(&checkpoint);
    Ok(ExitCode::from(finish(&report, &manifest_id, checkpoint).await))
}

/// Advance the checkpoint if the batch completed and pick the exit status:
/// 0 when no key failed, 1 otherwise. A checkpoint that cannot be written is
/// logged and leaves the status alone.
async fn finish(report: &RunReport, manifest_id: &str, checkpoint: Option<&CheckpointStore>) -> u8 {
    match checkpoint {
        None => info!("Checkpoint disabled"),
        Some(_) if !report.is_complete() => warn!(
            cancelled = report.summary.cancelled,
            "Run was cancelled, checkpoint left unchanged"
        ),
        Some(store) => {
            if let Err(e) = store.record(manifest_id).await {
                error!(error = %e, manifest = manifest_id, "Batch finished but checkpoint was not advanced");
                eprintln!("object-sync: {}", e);
            }
        }
    }

    if report.has_failures() {
        1
    } else {
        0
    }
}

fn print_report(manifest_id: &str, report: &RunReport) {
    println!("{}: {}", manifest_id, report.summary);
    for outcome in report.failed() {
        let stage = outcome
            .stage
            .map(|s| s.to_string())
            .unwrap_or_else(|| "task".to_string());
        println!(
            "FAILED {} [{}]: {}",
            outcome.key,
            stage,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}
