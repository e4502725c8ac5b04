//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use refharvest_core::config::{DEFAULT_WORKER_COUNT, MAX_SEARCH_LIMIT};

/// Ingest and deduplicate bibliographic records for literature-review
/// screening.
///
/// Refharvest turns provider searches and uploaded reference files into a
/// clean candidate set, tracked as asynchronous jobs that can be polled and
/// resubmitted.
#[derive(Parser, Debug)]
#[command(name = "refharvest")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to the project database
    #[arg(long, default_value = "refharvest.db")]
    pub database: PathBuf,

    /// Number of ingestion workers (tune to provider rate limits)
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKER_COUNT, value_parser = clap::value_parser!(usize))]
    pub workers: usize,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a provider search and wait for it to finish
    Search {
        /// Project the results belong to
        #[arg(short, long, default_value = "default")]
        project: String,

        /// Provider query string
        query: String,

        /// Maximum results to request
        #[arg(short, long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..=MAX_SEARCH_LIMIT as u64))]
        limit: u64,

        /// Filter clauses AND-ed onto the query (repeatable)
        #[arg(short, long)]
        filter: Vec<String>,
    },

    /// Submit a reference-file import and wait for it to finish
    Import {
        /// Project the results belong to
        #[arg(short, long, default_value = "default")]
        project: String,

        /// File to import (.ris, .bib; .pdf/.docx expect pre-extracted text)
        file: PathBuf,
    },

    /// Print a job's current status snapshot
    Status {
        /// Job id returned at submission
        job_id: i64,
    },

    /// Reset a failed job to pending and run it again
    Resubmit {
        /// Job id of the failed job
        job_id: i64,
    },
}
