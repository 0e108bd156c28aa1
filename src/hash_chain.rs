//! # HashChain — Fiat–Shamir Transcript
//!
//! Derives the sequence of 64-bit public-coin challenges that bind a proof
//! together. The chain is a running SHA3-256 digest:
//!
//! ```text
//! d_0     = SHA3-256(bytes(B))
//! d_{i+1} = SHA3-256(d_i ‖ bytes(M[i]))
//! h[i]    = low 64 bits of d_{i+1}, little-endian
//! ```
//!
//! where `bytes(·)` is the canonical ceil(E/8)-byte encoding. There is no
//! domain-separation tag beyond the concatenation order, so builder and
//! verifier must absorb middles in exactly the same order; any divergence in
//! residue encoding or ordering invalidates the proof. Given identical
//! (E, B, M[]) the chain is bit-identical across processes and platforms.

use crate::residue::Residue;
use sha3::{Digest, Sha3_256};

/// A running Fiat–Shamir transcript over residues.
pub struct HashChain {
    digest: [u8; 32],
}

impl HashChain {
    /// Seed the chain with the terminal residue B: d_0 = SHA3-256(bytes(B)).
    pub fn new(b: &Residue) -> Self {
        let digest = Sha3_256::digest(b.to_bytes()).into();
        HashChain { digest }
    }

    /// Absorb one middle residue and return the resulting challenge
    /// h = low 64 bits of the new digest.
    pub fn absorb(&mut self, middle: &Residue) -> u64 {
        let mut hasher = Sha3_256::new();
        hasher.update(self.digest);
        hasher.update(middle.to_bytes());
        self.digest = hasher.finalize().into();
        self.challenge()
    }

    /// The challenge derived from the current digest.
    pub fn challenge(&self) -> u64 {
        u64::from_le_bytes(self.digest[..8].try_into().unwrap())
    }
}
