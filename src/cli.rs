//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim: verification,
//! proof inspection, PRP runs, and worktodo execution. Results go to stdout;
//! diagnostics go through `tracing`.

use anyhow::{bail, Context, Result};
use millstone::engine::ReferenceEngine;
use millstone::proof_file::{self, mersenne_to_string, Proof};
use millstone::proof_set::ProofSet;
use millstone::prp::{self, PrpOutcome};
use millstone::worktodo::{self, TaskKind};
use millstone::{is_prime_exponent, ProofError};
use std::path::Path;
use tracing::{info, warn};

use super::Cli;

/// Verify a proof file. Exit 0 iff the proof is valid.
pub fn run_verify(file: &Path) -> Result<()> {
    let proof = Proof::load(file)
        .with_context(|| format!("cannot load proof file {}", file.display()))?;
    let mut engine = ReferenceEngine::new(proof.exponent);
    let verdict = proof
        .verify(&mut engine, &[])
        .with_context(|| format!("proof {} did not verify", file.display()))?;
    println!("M{} proved {}", proof.exponent, verdict);
    Ok(())
}

/// Print header fields and the whole-file MD5.
pub fn run_info(file: &Path, json: bool) -> Result<()> {
    let info = proof_file::info(file)
        .with_context(|| format!("cannot read proof file {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!(
            "number: {}",
            mersenne_to_string(info.exponent, &info.known_factors)
        );
        println!("power: {}", info.power);
        println!("md5: {}", info.md5);
    }
    Ok(())
}

/// Run a PRP test with the reference engine, then re-verify the fresh proof
/// against the builder's challenge sequence before reporting.
pub fn run_prp(cli: &Cli, exponent: u32, power: Option<u32>) -> Result<()> {
    if !is_prime_exponent(exponent) {
        bail!(ProofError::BadExponent { exponent });
    }
    let power = power.unwrap_or_else(|| ProofSet::best_power(exponent).min(12));
    info!(
        exponent,
        power,
        disk_gb = format_args!("{:.3}", ProofSet::disk_usage_gb(exponent, power)),
        "starting PRP"
    );

    let set = ProofSet::new(&cli.master_dir, exponent, Vec::new(), power, cli.instance)?;
    let mut engine = ReferenceEngine::new(exponent);

    match prp::run_prp(&mut engine, &set, None)? {
        PrpOutcome::Complete {
            proof,
            hashes,
            is_probable_prime,
            res64,
        } => {
            let path = proof.path_in(&cli.master_dir);
            proof.save(&path)?;
            let verdict = proof
                .verify(&mut engine, &hashes)
                .context("freshly built proof did not verify")?;
            let md5 = proof_file::file_md5(&path)?;
            debug_assert_eq!(is_probable_prime, verdict == proof_file::Verdict::ProbablePrime);
            println!("M{} is {} (res64 {:016x})", exponent, verdict, res64);
            println!("proof: {} (md5 {})", path.display(), md5);
            Ok(())
        }
        PrpOutcome::Interrupted { k } => {
            warn!(exponent, k, "PRP interrupted before completion");
            bail!("PRP of M{} interrupted at iteration {}", exponent, k)
        }
    }
}

/// Execute the best runnable task from a worktodo file, then remove its
/// line. Cert assignments need the accelerator backend and are skipped.
pub fn run_work(cli: &Cli, worktodo_path: &Path) -> Result<()> {
    let all = worktodo::tasks(worktodo_path)?;
    let task = all
        .into_iter()
        .find(|t| matches!(t.kind, TaskKind::Prp | TaskKind::Ll));
    let Some(task) = task else {
        bail!("no runnable PRP/LL task in {}", worktodo_path.display());
    };
    if !is_prime_exponent(task.exponent) {
        bail!(ProofError::BadExponent {
            exponent: task.exponent
        });
    }
    info!(exponent = task.exponent, kind = ?task.kind, aid = %task.aid, "task claimed");

    match task.kind {
        TaskKind::Prp => run_prp(cli, task.exponent, None)?,
        TaskKind::Ll => match prp::ll_test(task.exponent, None) {
            Some(is_prime) => {
                println!(
                    "M{} is {} (Lucas-Lehmer)",
                    task.exponent,
                    if is_prime { "prime" } else { "composite" }
                );
            }
            None => bail!("LL test of M{} interrupted", task.exponent),
        },
        TaskKind::Cert => unreachable!("filtered above"),
    }

    worktodo::delete_task(worktodo_path, &task)?;
    Ok(())
}
