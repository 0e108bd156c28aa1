//! End-to-end proof scenarios: PRP run → cache → build → file → verify.
//!
//! These exercise the whole pipeline on exponents small enough for the
//! arbitrary-precision reference engine: the known Mersenne primes M127 and
//! M521, and the known composite M11.

use millstone::engine::{BigIntEngine, ReferenceEngine};
use millstone::proof_file::{Proof, Verdict};
use millstone::proof_set::ProofSet;
use millstone::prp::{run_prp, PrpOutcome};
use millstone::residue::Residue;
use millstone::ProofError;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn complete_prp(dir: &Path, e: u32, power: u32) -> (Proof, Vec<u64>, bool) {
    let set = ProofSet::new(dir, e, Vec::new(), power, 0).unwrap();
    let mut engine = ReferenceEngine::new(e);
    match run_prp(&mut engine, &set, None).unwrap() {
        PrpOutcome::Complete {
            proof,
            hashes,
            is_probable_prime,
            ..
        } => (proof, hashes, is_probable_prime),
        PrpOutcome::Interrupted { .. } => panic!("uninterrupted run must complete"),
    }
}

/// Byte offset where the residue payload starts (after the 5-line header).
fn payload_offset(bytes: &[u8]) -> usize {
    let mut newlines = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            newlines += 1;
            if newlines == 5 {
                return i + 1;
            }
        }
    }
    panic!("no header in proof file");
}

#[test]
fn known_prime_smoke_test() {
    // M127 is a Mersenne prime: the full PRP → build → verify pipeline must
    // end in a valid proof with a probable-prime verdict.
    let tmp = tempdir().unwrap();
    let (proof, hashes, is_pp) = complete_prp(tmp.path(), 127, 2);
    assert!(is_pp);
    assert_eq!(proof.b, Residue::small(127, 9));

    let path = proof.path_in(tmp.path());
    proof.save(&path).unwrap();
    let loaded = Proof::load(&path).unwrap();
    assert_eq!(loaded, proof);

    let mut engine = ReferenceEngine::new(127);
    assert_eq!(
        loaded.verify(&mut engine, &hashes).unwrap(),
        Verdict::ProbablePrime
    );
}

#[test]
fn power_one_produces_single_middle() {
    let tmp = tempdir().unwrap();
    let (proof, hashes, _) = complete_prp(tmp.path(), 127, 1);
    assert_eq!(proof.middles.len(), 1);
    let mut engine = ReferenceEngine::new(127);
    assert_eq!(
        proof.verify(&mut engine, &hashes).unwrap(),
        Verdict::ProbablePrime
    );
}

#[test]
fn known_composite_still_proves() {
    // M11 = 2047 = 23 · 89: the test result is composite, but the proof of
    // the computation itself must still verify.
    let tmp = tempdir().unwrap();
    let (proof, hashes, is_pp) = complete_prp(tmp.path(), 11, 2);
    assert!(!is_pp);
    assert_ne!(proof.b, Residue::small(11, 9));

    let mut engine = ReferenceEngine::new(11);
    assert_eq!(
        proof.verify(&mut engine, &hashes).unwrap(),
        Verdict::Composite
    );
}

#[test]
fn deeper_proof_verifies_m521() {
    let tmp = tempdir().unwrap();
    let (proof, hashes, is_pp) = complete_prp(tmp.path(), 521, 4);
    assert!(is_pp);
    let mut engine = ReferenceEngine::new(521);
    assert_eq!(
        proof.verify(&mut engine, &hashes).unwrap(),
        Verdict::ProbablePrime
    );
}

#[test]
fn tampered_middle_fails_verification() {
    let tmp = tempdir().unwrap();
    let (proof, _, _) = complete_prp(tmp.path(), 127, 2);
    let path = proof.path_in(tmp.path());
    proof.save(&path).unwrap();

    // Flip one bit inside M[0] (the second residue in the payload).
    let mut bytes = fs::read(&path).unwrap();
    let nb = millstone::proof_bytes(127);
    let offset = payload_offset(&bytes) + nb + 2;
    bytes[offset] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let tampered = Proof::load(&path).unwrap();
    let mut engine = ReferenceEngine::new(127);
    assert!(matches!(
        tampered.verify(&mut engine, &[]),
        Err(ProofError::VerificationFailed)
    ));
}

#[test]
fn tampered_terminal_residue_fails_verification() {
    let tmp = tempdir().unwrap();
    let (proof, _, _) = complete_prp(tmp.path(), 127, 2);
    let path = proof.path_in(tmp.path());
    proof.save(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let offset = payload_offset(&bytes);
    bytes[offset] ^= 0x04; // inside bytes(B)
    fs::write(&path, &bytes).unwrap();

    let tampered = Proof::load(&path).unwrap();
    let mut engine = ReferenceEngine::new(127);
    assert!(matches!(
        tampered.verify(&mut engine, &[]),
        Err(ProofError::VerificationFailed)
    ));
}

#[test]
fn partial_cache_salvaged_at_lower_power() {
    // Run M521 at power 4, then knock out one power-4 point. The power-3
    // subset is still complete, so a coarser proof can be built from the
    // same cache — and it must verify.
    let tmp = tempdir().unwrap();
    let (_, _, _) = complete_prp(tmp.path(), 521, 4);

    let set4 = ProofSet::new(tmp.path(), 521, Vec::new(), 4, 0).unwrap();
    let victim = set4.points()[8];
    fs::remove_file(
        tmp.path()
            .join("worker-0")
            .join("521")
            .join("proof")
            .join(victim.to_string()),
    )
    .unwrap();

    assert_eq!(
        ProofSet::effective_power(tmp.path(), 521, &[], 4, 521, 0),
        3
    );

    let set3 = ProofSet::new(tmp.path(), 521, Vec::new(), 3, 0).unwrap();
    let mut engine = ReferenceEngine::new(521);
    let (proof, hashes) = set3.compute_proof(&mut engine).unwrap();
    assert_eq!(proof.middles.len(), 3);
    assert_eq!(
        proof.verify(&mut engine, &hashes).unwrap(),
        Verdict::ProbablePrime
    );
}

#[test]
fn cofactor_header_roundtrips_at_scale() {
    // Header with multiple cofactors at a wavefront-sized exponent: all
    // fields survive a save/load cycle byte for byte.
    let tmp = tempdir().unwrap();
    let e = 18_178_631u32;
    let factors: Vec<String> = ["36357263", "145429049", "8411216206439"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let proof = Proof {
        exponent: e,
        known_factors: factors.clone(),
        b: Residue::small(e, 9),
        middles: (0..8).map(|i| Residue::small(e, 3 + i)).collect(),
    };

    let path = proof.path_in(tmp.path());
    assert_eq!(path.file_name().unwrap(), "18178631-8.proof");
    proof.save(&path).unwrap();

    let loaded = Proof::load(&path).unwrap();
    assert_eq!(loaded.exponent, e);
    assert_eq!(loaded.known_factors, factors);
    assert_eq!(loaded, proof);
}

#[test]
fn interrupted_run_resumes_and_completes() {
    let tmp = tempdir().unwrap();
    let set = ProofSet::new(tmp.path(), 521, Vec::new(), 3, 0).unwrap();
    let mut engine = ReferenceEngine::new(521);

    // Seed the cache with the first few points by hand-driving the loop.
    let mut r = Residue::small(521, 3);
    let mut k = 0u32;
    for _ in 0..3 {
        let next = set.next(k);
        r = engine.exp_exp2(&r, next - k).unwrap();
        set.save(next, &r).unwrap();
        k = next;
    }

    // A fresh driver must pick up where the cache ends and finish.
    let set2 = ProofSet::new(tmp.path(), 521, Vec::new(), 3, 0).unwrap();
    match run_prp(&mut engine, &set2, None).unwrap() {
        PrpOutcome::Complete {
            proof,
            hashes,
            is_probable_prime,
            ..
        } => {
            assert!(is_probable_prime);
            let mut fresh = ReferenceEngine::new(521);
            assert_eq!(
                proof.verify(&mut fresh, &hashes).unwrap(),
                Verdict::ProbablePrime
            );
        }
        PrpOutcome::Interrupted { .. } => panic!("should complete"),
    }
}
