//! # Millstone — Core Library
//!
//! A worker for distributed primality testing of Mersenne numbers
//! N = 2^E − 1 for prime exponent E. The worker consumes assignments from a
//! worktodo queue, runs a probable-prime (PRP) or Lucas–Lehmer (LL) check,
//! caches intermediate residues at predetermined iteration indices, and — for
//! PRP — emits a `.proof` certificate that a third party can re-check in
//! roughly E/2^P squarings instead of E.
//!
//! ## Module Organization
//!
//! **Proof core** (the protocol and its artifacts):
//! - [`residue`] — residues mod 2^E − 1: word form, canonical byte codec,
//!   CRC-checked cache serialization.
//! - [`hash_chain`] — the SHA3-256 Fiat–Shamir transcript producing 64-bit
//!   public-coin challenges.
//! - [`proof_set`] — the on-disk residue cache at proof points, plus proof
//!   generation (`compute_proof`).
//! - [`proof_file`] — the `.proof` binary format, header codec, MD5 file
//!   digest, and verification.
//!
//! **Infrastructure**:
//! - [`engine`] — the [`engine::BigIntEngine`] seam to the big-integer
//!   squaring backend, with a deterministic arbitrary-precision reference
//!   implementation.
//! - [`prp`] — the PRP/LL driver loop over an engine.
//! - [`worktodo`] — work-queue line parsing (`PRP=`, `DoubleCheck=`, `Cert=`).
//!
//! ## The Proof Protocol
//!
//! A PRP test computes R_E = 3^(2^E) mod 2^E − 1 and declares 2^E − 1 a
//! probable prime iff R_E = 9. The proof is a Pietrzak-style
//! proof-of-exponentiation made non-interactive by Fiat–Shamir: the prover
//! retains residues at 2^P intermediate iterations and folds them into P
//! "middle" residues under SHA3-derived challenges; the verifier replays the
//! same challenges from the file contents and checks a single identity after
//! about E/2^P squarings.

pub mod engine;
pub mod hash_chain;
pub mod proof_file;
pub mod proof_set;
pub mod prp;
pub mod residue;
pub mod worktodo;

use std::fmt;

/// Errors from the proof subsystem.
///
/// Parse failures on proof files are returned to the caller and never crash
/// the worker; cache errors during a PRP run are reported up to the driver,
/// which may drop to a lower effective proof power rather than abort a
/// months-long test.
#[derive(Debug)]
pub enum ProofError {
    /// Proof power outside the supported range [1, 12].
    BadPower { power: u32 },
    /// Exponent is not an odd prime.
    BadExponent { exponent: u32 },
    /// Proof file header does not parse.
    MalformedHeader { detail: String },
    /// Residue byte length or value out of range.
    MalformedResidue { detail: String },
    /// A required cache file is absent or unreadable.
    MissingResidue { k: u32 },
    /// A cache file failed its CRC check.
    CorruptResidue { k: u32 },
    /// The engine returned an empty (all-zero) result.
    EngineFailure,
    /// Terminal verification identity A == B does not hold.
    VerificationFailed,
    /// Underlying filesystem error.
    Io(std::io::Error),
}

impl fmt::Display for ProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofError::BadPower { power } => {
                write!(f, "invalid proof power {} (must be 1..=12)", power)
            }
            ProofError::BadExponent { exponent } => {
                write!(f, "invalid exponent {} (must be an odd prime)", exponent)
            }
            ProofError::MalformedHeader { detail } => {
                write!(f, "invalid proof header: {}", detail)
            }
            ProofError::MalformedResidue { detail } => {
                write!(f, "malformed residue: {}", detail)
            }
            ProofError::MissingResidue { k } => {
                write!(f, "missing cached residue at iteration {}", k)
            }
            ProofError::CorruptResidue { k } => {
                write!(f, "checksum mismatch in cached residue at iteration {}", k)
            }
            ProofError::EngineFailure => write!(f, "engine returned an empty result"),
            ProofError::VerificationFailed => write!(f, "proof verification failed: A != B"),
            ProofError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ProofError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProofError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProofError {
    fn from(e: std::io::Error) -> Self {
        ProofError::Io(e)
    }
}

/// Byte length of a residue's canonical encoding: ceil(E / 8).
#[inline]
pub fn proof_bytes(exponent: u32) -> usize {
    (exponent as usize - 1) / 8 + 1
}

/// Word length of a residue's in-memory / cache-file form. One 32-bit word
/// per 32 exponent bits, rounded so the top bits of an odd exponent fit.
#[inline]
pub fn residue_words(exponent: u32) -> usize {
    exponent as usize / 32 + 1
}

/// Check that an exponent is usable for a Mersenne test: an odd prime.
pub fn is_prime_exponent(exponent: u32) -> bool {
    use rug::integer::IsPrime;
    exponent > 2
        && exponent % 2 == 1
        && rug::Integer::from(exponent).is_probably_prime(25) != IsPrime::No
}
