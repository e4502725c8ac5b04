//! CLI entry point for the refharvest tool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use refharvest_core::{
    CandidateStore, Database, ImportSubmission, JobSnapshot, JobStore, MemoryCache,
    PubmedProvider, SearchProvider, SearchSubmission, UploadedText, Worker, spawn_pool,
};
use refharvest_core::import::ExtractionMeta;
use refharvest_core::provider::default_provider_limiter;
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

/// How often the driver polls job status while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let db = Database::open(&args.database)
        .await
        .with_context(|| format!("opening database at {}", args.database.display()))?;
    let jobs = JobStore::new(db.clone());
    let candidates = CandidateStore::new(db.clone());

    match args.command {
        Command::Search {
            project,
            query,
            limit,
            filter,
        } => {
            let submission = SearchSubmission {
                project_id: project,
                query,
                limit: usize::try_from(limit).unwrap_or(usize::MAX),
                filters: filter,
            };
            let job_id = jobs.submit_search(&submission).await?;
            info!(job_id, "search job submitted");
            let snapshot = drive_to_completion(&jobs, &candidates, args.workers, job_id).await?;
            print_snapshot(job_id, &snapshot);
        }
        Command::Import { project, file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let submission = ImportSubmission {
                project_id: project,
                upload: UploadedText {
                    meta: ExtractionMeta {
                        total_pages: None,
                        truncated: false,
                        extracted_lines: text.lines().count(),
                    },
                    filename,
                    text,
                },
            };
            let job_id = jobs.submit_import(&submission).await?;
            info!(job_id, "import job submitted");
            let snapshot = drive_to_completion(&jobs, &candidates, args.workers, job_id).await?;
            print_snapshot(job_id, &snapshot);
        }
        Command::Status { job_id } => {
            let job = jobs
                .get(job_id)
                .await?
                .with_context(|| format!("job {job_id} not found"))?;
            print_snapshot(job_id, &job.snapshot());
        }
        Command::Resubmit { job_id } => {
            jobs.resubmit(job_id).await?;
            info!(job_id, "job reset to pending");
            let snapshot = drive_to_completion(&jobs, &candidates, args.workers, job_id).await?;
            print_snapshot(job_id, &snapshot);
        }
    }

    db.close().await;
    Ok(())
}

/// Spawns a worker pool, polls the job until it reaches a terminal state,
/// then shuts the pool down and returns the final snapshot.
async fn drive_to_completion(
    jobs: &JobStore,
    candidates: &CandidateStore,
    worker_count: usize,
    job_id: i64,
) -> Result<JobSnapshot> {
    let providers: Vec<Arc<dyn SearchProvider>> = match PubmedProvider::new(default_provider_limiter())
    {
        Ok(provider) => vec![Arc::new(provider)],
        Err(error) => {
            warn!(error = %error, "PubMed provider unavailable; searches will fail");
            Vec::new()
        }
    };

    let worker = Arc::new(Worker::new(
        jobs.clone(),
        candidates.clone(),
        MemoryCache::shared(),
        providers,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_pool(worker, worker_count, shutdown_rx);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let snapshot = loop {
        let Some(job) = jobs.get(job_id).await? else {
            anyhow::bail!("job {job_id} disappeared while running");
        };
        let snapshot = job.snapshot();
        bar.set_position(u64::try_from(snapshot.progress_pct).unwrap_or(0));
        bar.set_message(snapshot.progress_step.clone());

        if snapshot.state.is_terminal() {
            break snapshot;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    bar.finish_and_clear();

    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }

    Ok(snapshot)
}

/// Prints the caller-facing view of a job as pretty JSON.
fn print_snapshot(job_id: i64, snapshot: &JobSnapshot) {
    let payload = serde_json::json!({
        "job_id": job_id,
        "state": snapshot.state,
        "progress_step": snapshot.progress_step,
        "progress_pct": snapshot.progress_pct,
        "result": snapshot.result,
        "error": snapshot.error,
    });
    match serde_json::to_string_pretty(&payload) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{payload}"),
    }
}
