//! # ProofSet — Residue Cache and Proof Generation
//!
//! Content-addressed storage for PRP residues at the iteration indices a
//! proof of a given power needs, plus the batched Pietrzak fold that turns
//! those residues into a [`Proof`](crate::proof_file::Proof).
//!
//! ## Proof Points
//!
//! A proof of power P requires residues at exactly 2^P iteration indices.
//! Starting from span_0 = ceil((E+1)/2), each level doubles the point set by
//! adding the current span to every existing point, then halves the span
//! (rounding up). The initial point 0 is replaced by E and the set sorted, so
//! `points.last() == E` always.
//!
//! ## Layout
//!
//! Residues live under `worker-<instance>/<E>/proof/<k>`, one file per
//! iteration index, in the CRC-checked word format (see
//! [`Residue`](crate::residue::Residue)). Directories are single-writer: one
//! worker instance per (E, instance) pair, so no in-process locking is
//! needed.

use crate::engine::BigIntEngine;
use crate::hash_chain::HashChain;
use crate::proof_file::Proof;
use crate::residue::Residue;
use crate::ProofError;
use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// The cache of proof-point residues for one exponent.
pub struct ProofSet {
    pub exponent: u32,
    pub power: u32,
    pub instance: u32,
    known_factors: Vec<String>,
    /// Sorted proof points followed by a `u32::MAX` guard.
    points: Vec<u32>,
    /// Monotone cursor for `next`, amortizing the common in-order scan.
    cursor: Cell<usize>,
    dir: PathBuf,
}

impl ProofSet {
    /// Open (creating directories as needed) the residue cache for
    /// `exponent` at the given proof power under `master_dir`.
    pub fn new(
        master_dir: &Path,
        exponent: u32,
        known_factors: Vec<String>,
        power: u32,
        instance: u32,
    ) -> Result<Self, ProofError> {
        if !(1..=12).contains(&power) {
            return Err(ProofError::BadPower { power });
        }
        if exponent & 1 == 0 {
            return Err(ProofError::BadExponent { exponent });
        }

        let dir = Self::proof_path(master_dir, exponent, instance);
        fs::create_dir_all(&dir)?;

        let mut points: Vec<u32> = vec![0];
        let mut span = (exponent + 1) / 2;
        for _ in 0..power {
            for i in 0..points.len() {
                points.push(points[i] + span);
            }
            span = (span + 1) / 2;
        }
        debug_assert_eq!(points.len(), 1 << power);
        points[0] = exponent;
        points.sort_unstable();
        debug_assert_eq!(*points.last().unwrap(), exponent);
        debug_assert!(points
            .iter()
            .all(|&p| Self::is_in_points(exponent, power, p)));
        points.push(u32::MAX); // guard for next()

        Ok(ProofSet {
            exponent,
            power,
            instance,
            known_factors,
            points,
            cursor: Cell::new(0),
            dir,
        })
    }

    fn proof_path(master_dir: &Path, exponent: u32, instance: u32) -> PathBuf {
        master_dir
            .join(format!("worker-{}", instance))
            .join(exponent.to_string())
            .join("proof")
    }

    /// The sorted proof points (without the guard element).
    pub fn points(&self) -> &[u32] {
        &self.points[..self.points.len() - 1]
    }

    /// The smallest proof point strictly greater than `k`, or `u32::MAX`
    /// past the last point. Amortized O(1) for monotonically increasing
    /// queries; binary search when the caller rewinds.
    pub fn next(&self, k: u32) -> u32 {
        let mut i = self.cursor.get();
        if self.points[i] <= k || (i > 0 && self.points[i - 1] > k) {
            i = self.points.partition_point(|&p| p <= k);
            self.cursor.set(i);
        }
        self.points[i]
    }

    /// Whether `k` is a proof point for (E, power), by the span-halving walk.
    pub fn is_in_points(exponent: u32, power: u32, k: u32) -> bool {
        if k == exponent {
            return true;
        }
        let mut start = 0u32;
        let mut span = (exponent + 1) / 2;
        for _ in 0..power {
            if k > start + span {
                start += span;
            } else if k == start + span {
                return true;
            }
            span = (span + 1) / 2;
        }
        false
    }

    /// Recommended proof power for an exponent, assuming no disk-space
    /// concern: one more for each fourfold increase, power 10 at the current
    /// GIMPS wavefront (60M), never below 2.
    pub fn best_power(exponent: u32) -> u32 {
        debug_assert!(exponent > 0);
        let power = 10 + ((exponent as f64 / 60e6).log2() / 2.0).floor() as i32;
        power.max(2) as u32
    }

    /// Disk usage of a full cache, in GiB: 2^power residues of E bits, plus
    /// 5% slack.
    pub fn disk_usage_gb(exponent: u32, power: u32) -> f64 {
        if power == 0 {
            return 0.0;
        }
        exponent as f64 * (power as f64 - 33.0).exp2() * 1.05
    }

    /// The largest power p' <= power whose cache is consistent through
    /// `current_k`, or 0 if none is. Lets a resumed run salvage a partial
    /// cache by choosing a coarser proof.
    pub fn effective_power(
        master_dir: &Path,
        exponent: u32,
        known_factors: &[String],
        power: u32,
        current_k: u32,
        instance: u32,
    ) -> u32 {
        for p in (1..=power).rev() {
            let ok = ProofSet::new(master_dir, exponent, known_factors.to_vec(), p, instance)
                .map(|set| set.is_valid_to(current_k))
                .unwrap_or(false);
            if ok {
                return p;
            }
        }
        0
    }

    /// True iff the cache holds a consistent chain of residues up to the
    /// largest point <= `limit`: that residue loads cleanly and every
    /// earlier point's file is present with the right size.
    pub fn is_valid_to(&self, limit: u32) -> bool {
        let points = self.points();
        let idx = points.partition_point(|&p| p <= limit);
        if idx == 0 {
            return true;
        }
        if self.load(points[idx - 1]).is_err() {
            return false;
        }
        points[..idx - 1].iter().all(|&p| self.file_exists(p))
    }

    /// Byte-exact size check for the cache file at `k`.
    pub fn file_exists(&self, k: u32) -> bool {
        fs::metadata(self.dir.join(k.to_string()))
            .map(|m| m.len() == (self.exponent as u64 / 32 + 2) * 4)
            .unwrap_or(false)
    }

    /// Persist the residue for iteration `k`, which must be a proof point.
    /// Atomic: written to a temp path, synced, then renamed into place.
    pub fn save(&self, k: u32, residue: &Residue) -> Result<(), ProofError> {
        assert!(k > 0 && k <= self.exponent);
        assert!(Self::is_in_points(self.exponent, self.power, k));

        let path = self.dir.join(k.to_string());
        let tmp = self.dir.join(format!("{}.tmp", k));
        let mut file = fs::File::create(&tmp)?;
        residue.write_checked(&mut file)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        debug_assert_eq!(self.load(k).ok().as_ref(), Some(residue));
        Ok(())
    }

    /// Load the residue cached at iteration `k`.
    pub fn load(&self, k: u32) -> Result<Residue, ProofError> {
        assert!(k > 0 && k <= self.exponent);
        assert!(Self::is_in_points(self.exponent, self.power, k));

        let mut file = fs::File::open(self.dir.join(k.to_string()))
            .map_err(|_| ProofError::MissingResidue { k })?;
        Residue::read_checked(self.exponent, &mut file, k)
    }

    /// Fold the cached residues into a proof.
    ///
    /// Level p consumes the residues at the midpoints of the 2^p current
    /// segments and reduces them into a single middle M[p] on the engine,
    /// pairing buffers tree-wise under the challenges of earlier levels:
    /// when bit k of the segment index is set, two buffers collapse via
    /// dst ← dst^h[p-1-k] · src. The hash chain then absorbs M[p] to yield
    /// h[p].
    ///
    /// Returns the proof and the challenge sequence (useful for
    /// cross-checking a verifier).
    pub fn compute_proof(
        &self,
        engine: &mut dyn BigIntEngine,
    ) -> Result<(Proof, Vec<u64>), ProofError> {
        let b = self.load(self.exponent)?;

        let mut middles: Vec<Residue> = Vec::with_capacity(self.power as usize);
        let mut hashes: Vec<u64> = Vec::with_capacity(self.power as usize);
        let mut chain = HashChain::new(&b);

        let bufs = engine.make_buffer_vector(self.power)?;

        for p in 0..self.power {
            let s = 1usize << (self.power - p - 1);
            let mut top = 0usize;
            for i in 0..(1usize << p) {
                let w = self.load(self.points[s * (2 * i + 1) - 1])?;
                engine.write_in(bufs[top], &w)?;
                top += 1;
                let mut bit = 0u32;
                while i & (1 << bit) != 0 {
                    debug_assert!(bit < p);
                    top -= 1;
                    let h = hashes[(p - 1 - bit) as usize];
                    engine.exp_mul_into(bufs[top - 1], h, bufs[top])?;
                    bit += 1;
                }
            }
            debug_assert_eq!(top, 1);

            let middle = engine.read_and_compress(bufs[0])?;
            let h = chain.absorb(&middle);
            info!(
                level = p,
                m = format_args!("{:016x}", middle.res64()),
                h = format_args!("{:016x}", h),
                "proof middle"
            );
            middles.push(middle);
            hashes.push(h);
        }

        let proof = Proof {
            exponent: self.exponent,
            known_factors: self.known_factors.clone(),
            b,
            middles,
        };
        Ok((proof, hashes))
    }
}
