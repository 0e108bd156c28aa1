//! # Proof Files — The `.proof` Artifact and Its Verifier
//!
//! A proof file is an ASCII header followed by binary residues:
//!
//! ```text
//! PRP PROOF\n
//! VERSION=2\n
//! HASHSIZE=64\n
//! POWER=<P>\n
//! NUMBER=M<E>[/<factor>[/<factor>...]]\n
//! <bytes(B)> <bytes(M[0])> ... <bytes(M[P-1])>
//! ```
//!
//! Each residue occupies exactly ceil(E/8) little-endian bytes. When factors
//! are present the proof is for the cofactor residue class; parsers accept
//! both `M<E>` and `M<E>/<factors>` forms. The file itself carries no
//! checksum — integrity is surfaced to users as an MD5 over the whole file,
//! computed on demand and reported alongside the header fields.
//!
//! ## Verification
//!
//! The verifier replays the Fiat–Shamir chain from the file contents and
//! folds under each challenge h:
//!
//! ```text
//! B ← M^h · B^(1 or 2)     (squared when the current span is odd)
//! A ← A^h · M
//! span ← ceil(span / 2)
//! ```
//!
//! starting from A = 3, B = the file's terminal residue. Each fold halves
//! the remaining squaring distance while preserving A^(2^span) = B, so after
//! P folds a direct exponentiation of span ≈ E/2^P squarings settles the
//! proof. The verdict is "probable prime" iff the original B equals 9.

use crate::engine::BigIntEngine;
use crate::hash_chain::HashChain;
use crate::residue::Residue;
use crate::{proof_bytes, ProofError};
use md5::{Digest, Md5};
use rug::Integer;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Longest accepted header, matching the original format's parse buffer.
const MAX_HEADER: usize = 2048;

/// Outcome of a successful proof verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    ProbablePrime,
    Composite,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::ProbablePrime => write!(f, "probable prime"),
            Verdict::Composite => write!(f, "composite"),
        }
    }
}

/// An in-memory proof: immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub exponent: u32,
    pub known_factors: Vec<String>,
    /// The terminal PRP residue R_E.
    pub b: Residue,
    /// One middle per proof level.
    pub middles: Vec<Residue>,
}

/// Header fields plus the whole-file digest, as shown by `info`.
#[derive(Clone, Debug, Serialize)]
pub struct ProofInfo {
    pub exponent: u32,
    pub power: u32,
    pub known_factors: Vec<String>,
    pub md5: String,
}

/// Render an exponent and its known factors in worktodo notation, e.g.
/// `M124647911` or `M18178631/36357263/145429049/8411216206439`.
pub fn mersenne_to_string(exponent: u32, known_factors: &[String]) -> String {
    let mut out = format!("M{}", exponent);
    for factor in known_factors {
        out.push('/');
        out.push_str(factor);
    }
    out
}

/// Parse worktodo notation back into an exponent and factor list.
pub fn mersenne_from_string(number: &str) -> Result<(u32, Vec<String>), ProofError> {
    let rest = number.strip_prefix('M').ok_or_else(|| ProofError::MalformedHeader {
        detail: format!("Mersenne number must start with M: {:?}", number),
    })?;

    let mut parts = rest.split('/');
    let exp_str = parts.next().unwrap_or("");
    let exponent: u32 = exp_str.parse().map_err(|_| ProofError::MalformedHeader {
        detail: format!("invalid exponent: {:?}", exp_str),
    })?;

    let mut known_factors = Vec::new();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        let ok = part.bytes().all(|b| b.is_ascii_digit())
            && Integer::parse(part).map(Integer::from).map_or(false, |f| f > 1u32);
        if !ok {
            return Err(ProofError::MalformedHeader {
                detail: format!("invalid factor: {:?}", part),
            });
        }
        known_factors.push(part.to_string());
    }
    Ok((exponent, known_factors))
}

/// MD5 of an entire file, lowercase hex. Streamed in 64 KiB chunks; proof
/// files at wavefront exponents run to hundreds of MB.
pub fn file_md5(path: &Path) -> Result<String, ProofError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// Parse the ASCII header. Returns (exponent, power, factors, header length).
fn parse_header(bytes: &[u8]) -> Result<(u32, u32, Vec<String>, usize), ProofError> {
    let window = &bytes[..bytes.len().min(MAX_HEADER)];
    let mut lines: Vec<&[u8]> = Vec::with_capacity(5);
    let mut pos = 0;
    for _ in 0..5 {
        let nl = window[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| ProofError::MalformedHeader {
                detail: "truncated header".into(),
            })?;
        lines.push(&window[pos..pos + nl]);
        pos += nl + 1;
    }

    if lines[0] != b"PRP PROOF" || lines[1] != b"VERSION=2" || lines[2] != b"HASHSIZE=64" {
        return Err(ProofError::MalformedHeader {
            detail: "not a VERSION=2 PRP proof".into(),
        });
    }

    let power_str = lines[3]
        .strip_prefix(b"POWER=")
        .and_then(|s| std::str::from_utf8(s).ok())
        .ok_or_else(|| ProofError::MalformedHeader {
            detail: "missing POWER field".into(),
        })?;
    let power: u32 = power_str.parse().map_err(|_| ProofError::MalformedHeader {
        detail: format!("invalid POWER: {:?}", power_str),
    })?;
    if !(1..=12).contains(&power) {
        return Err(ProofError::BadPower { power });
    }

    let number = lines[4]
        .strip_prefix(b"NUMBER=")
        .and_then(|s| std::str::from_utf8(s).ok())
        .ok_or_else(|| ProofError::MalformedHeader {
            detail: "missing NUMBER field".into(),
        })?;
    let (exponent, known_factors) = mersenne_from_string(number)?;

    Ok((exponent, power, known_factors, pos))
}

/// Read the header fields and compute the whole-file MD5 without decoding
/// the residue payload.
pub fn info(path: &Path) -> Result<ProofInfo, ProofError> {
    let md5 = file_md5(path)?;
    let mut file = fs::File::open(path)?;
    let mut head = vec![0u8; MAX_HEADER];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);
    let (exponent, power, known_factors, _) = parse_header(&head)?;
    Ok(ProofInfo {
        exponent,
        power,
        known_factors,
        md5,
    })
}

impl Proof {
    /// Canonical file name: `<E>-<P>.proof`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.proof", self.exponent, self.middles.len())
    }

    /// The path this proof takes under a result directory.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    fn header(&self) -> String {
        format!(
            "PRP PROOF\nVERSION=2\nHASHSIZE=64\nPOWER={}\nNUMBER={}\n",
            self.middles.len(),
            mersenne_to_string(self.exponent, &self.known_factors)
        )
    }

    /// Write the proof atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), ProofError> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(self.header().as_bytes())?;
        file.write_all(&self.b.to_bytes())?;
        for middle in &self.middles {
            file.write_all(&middle.to_bytes())?;
        }
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load and fully decode a proof file.
    pub fn load(path: &Path) -> Result<Proof, ProofError> {
        let bytes = fs::read(path)?;
        let (exponent, power, known_factors, header_len) = parse_header(&bytes)?;

        let nb = proof_bytes(exponent);
        let payload = &bytes[header_len..];
        if payload.len() != (power as usize + 1) * nb {
            return Err(ProofError::MalformedResidue {
                detail: format!(
                    "expected {} payload bytes for POWER={}, got {}",
                    (power as usize + 1) * nb,
                    power,
                    payload.len()
                ),
            });
        }

        let b = Residue::from_bytes(exponent, &payload[..nb])?;
        let middles = payload[nb..]
            .chunks_exact(nb)
            .map(|chunk| Residue::from_bytes(exponent, chunk))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Proof {
            exponent,
            known_factors,
            b,
            middles,
        })
    }

    /// Verify this proof on an engine set up for the same exponent.
    ///
    /// `expected_hashes` optionally cross-checks the challenge sequence a
    /// builder reported (useful when validating a fresh build); pass `&[]`
    /// otherwise. Returns the primality verdict on success;
    /// [`ProofError::VerificationFailed`] is the soundness event.
    pub fn verify(
        &self,
        engine: &mut dyn BigIntEngine,
        expected_hashes: &[u64],
    ) -> Result<Verdict, ProofError> {
        debug_assert!(!self.middles.is_empty());
        if engine.exponent() != self.exponent {
            return Err(ProofError::BadExponent {
                exponent: engine.exponent(),
            });
        }

        let verdict = if self.b == Residue::small(self.exponent, 9) {
            Verdict::ProbablePrime
        } else {
            Verdict::Composite
        };

        let mut a = Residue::small(self.exponent, 3);
        let mut b = self.b.clone();
        let mut chain = HashChain::new(&self.b);
        let mut span = self.exponent;

        for (i, middle) in self.middles.iter().enumerate() {
            let h = chain.absorb(middle);
            if let Some(&expected) = expected_hashes.get(i) {
                if expected != h {
                    warn!(
                        level = i,
                        expected = format_args!("{:016x}", expected),
                        actual = format_args!("{:016x}", h),
                        "challenge mismatch against builder hashes"
                    );
                    return Err(ProofError::VerificationFailed);
                }
            }

            let square_b = span % 2 == 1;
            b = engine.exp_mul(middle, h, &b, square_b)?;
            a = engine.exp_mul(&a, h, middle, false)?;
            span = (span + 1) / 2;
        }

        info!(iterations = span, "proof verification: final exponentiation");
        a = engine.exp_exp2(&a, span)?;

        if a == b {
            info!(exponent = self.exponent, %verdict, "proof verified");
            Ok(verdict)
        } else {
            error!(
                exponent = self.exponent,
                a = format_args!("{:016x}", a.res64()),
                b = format_args!("{:016x}", b.res64()),
                "proof invalid"
            );
            Err(ProofError::VerificationFailed)
        }
    }
}
