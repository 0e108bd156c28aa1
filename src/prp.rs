//! # PRP Driver — Running a Test End to End
//!
//! The primary loop of a PRP assignment: square the seed residue 3 up to
//! iteration E, persisting the residue at every proof point on the way. The
//! loop is single-threaded and synchronous — one driver per worker instance,
//! alternating between engine calls and cache I/O, never both concurrently.
//!
//! On startup the driver resumes from the longest consistent prefix of
//! cached proof points, so a worker restarted months into a test loses at
//! most one inter-point segment. Cancellation is cooperative: a stop flag is
//! checked once per segment, in-flight engine work runs to completion, and
//! an interrupted run leaves the cache intact for the next resume.
//!
//! Also hosts the Lucas–Lehmer check for assignments on exponents with no
//! known factors; LL produces no proof, just a verdict.

use crate::engine::BigIntEngine;
use crate::proof_file::Proof;
use crate::proof_set::ProofSet;
use crate::residue::{mersenne, Residue};
use crate::ProofError;
use rug::ops::RemRounding;
use rug::Integer;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Result of driving a PRP assignment.
pub enum PrpOutcome {
    Complete {
        proof: Proof,
        /// The builder's challenge sequence, for cross-checking a fresh
        /// verification of the proof.
        hashes: Vec<u64>,
        is_probable_prime: bool,
        res64: u64,
    },
    /// Stop flag observed; the cache holds everything computed so far.
    Interrupted { k: u32 },
}

/// Run (or resume) the PRP test for `set`'s exponent and build its proof.
pub fn run_prp(
    engine: &mut dyn BigIntEngine,
    set: &ProofSet,
    stop: Option<&AtomicBool>,
) -> Result<PrpOutcome, ProofError> {
    let exponent = set.exponent;

    // Resume from the longest consistent cached prefix.
    let mut k = 0u32;
    let mut r = Residue::small(exponent, 3);
    for &p in set.points() {
        if !set.file_exists(p) {
            break;
        }
        match set.load(p) {
            Ok(cached) => {
                k = p;
                r = cached;
            }
            Err(_) => break,
        }
    }
    if k > 0 {
        info!(exponent, k, "resuming PRP from cached residue");
    }

    while k < exponent {
        if stop.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            info!(exponent, k, "PRP interrupted; cache left intact");
            return Ok(PrpOutcome::Interrupted { k });
        }
        let next_k = set.next(k);
        r = engine.exp_exp2(&r, next_k - k)?;
        set.save(next_k, &r)?;
        info!(
            exponent,
            k = next_k,
            res64 = format_args!("{:016x}", r.res64()),
            "proof point cached"
        );
        k = next_k;
    }

    let is_probable_prime = r == Residue::small(exponent, 9);
    let res64 = r.res64();
    info!(
        exponent,
        probable_prime = is_probable_prime,
        res64 = format_args!("{:016x}", res64),
        "PRP finished"
    );

    let (proof, hashes) = set.compute_proof(engine)?;
    Ok(PrpOutcome::Complete {
        proof,
        hashes,
        is_probable_prime,
        res64,
    })
}

/// Lucas–Lehmer test: s_0 = 4, s_{i+1} = s_i² − 2 mod 2^E − 1; the Mersenne
/// number is prime iff s_{E−2} = 0. Returns `None` when interrupted.
pub fn ll_test(exponent: u32, stop: Option<&AtomicBool>) -> Option<bool> {
    let m = mersenne(exponent);
    let mut s = Integer::from(4u32);
    for _ in 0..exponent - 2 {
        if stop.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            return None;
        }
        s.square_mut();
        s -= 2u32;
        s = s.rem_euc(&m);
    }
    Some(s == 0u32)
}
