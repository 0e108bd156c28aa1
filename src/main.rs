//! # Main — CLI Entry Point
//!
//! Routes subcommands to the proof core: verifying and inspecting `.proof`
//! files, running PRP tests with the reference engine, and executing tasks
//! from a worktodo queue.
//!
//! ## Global Options
//!
//! - `--master-dir`: root for per-worker residue caches and proof output.
//! - `--instance`: worker instance number; cache directories are isolated
//!   per `(exponent, instance)` so multiple processes can share a tree.
//! - `LOG_FORMAT=json`: structured JSON logs for fleet deployments,
//!   human-readable stderr otherwise.
//!
//! Exit code is nonzero on any failure, including an invalid proof — the
//! soundness event callers script against.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "millstone", about = "Mersenne PRP worker with verifiable proofs")]
struct Cli {
    /// Root directory for residue caches and proof output
    #[arg(long, default_value = ".")]
    master_dir: PathBuf,

    /// Worker instance number (isolates per-exponent cache directories)
    #[arg(long, default_value_t = 0)]
    instance: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a .proof file with the reference engine
    Verify {
        /// Path to the .proof file
        file: PathBuf,
    },
    /// Print proof header fields and the whole-file MD5
    Info {
        /// Path to the .proof file
        file: PathBuf,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a PRP test, caching proof points and emitting a .proof
    Prp {
        /// Prime exponent E of the Mersenne number 2^E - 1
        #[arg(long)]
        exponent: u32,
        /// Proof power in [1, 12] (default: best for the exponent)
        #[arg(long)]
        power: Option<u32>,
    },
    /// Execute the best runnable task from a worktodo file
    Work {
        /// Path to the worktodo file
        #[arg(long, default_value = "worktodo.txt")]
        worktodo: PathBuf,
    },
}

fn main() -> Result<()> {
    // Structured logging: LOG_FORMAT=json for fleet use, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Verify { file } => cli::run_verify(file),
        Commands::Info { file, json } => cli::run_info(file, *json),
        Commands::Prp { exponent, power } => cli::run_prp(&cli, *exponent, *power),
        Commands::Work { worktodo } => cli::run_work(&cli, worktodo),
    }
}
