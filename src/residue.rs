//! # Residue — Elements of ℤ/(2^E − 1) and Their Encodings
//!
//! A residue travels in three forms:
//!
//! 1. **Word form** (in memory and in cache files): `E/32 + 1` little-endian
//!    32-bit words. The top word has slack bits for odd exponents; canonical
//!    residues keep them zero.
//! 2. **Canonical byte form** (in `.proof` files and under the hash chain):
//!    exactly `ceil(E/8)` little-endian bytes, zero-padded.
//! 3. **Checked form** (cache files on disk): the word payload followed by a
//!    CRC-32 of that payload. Cache files live for months and are prone to
//!    local corruption; proof files are transient and covered by a
//!    whole-file MD5 instead.
//!
//! Two residues are equal iff their canonical encodings are equal, so
//! conversions to and from `rug::Integer` always reduce into [0, 2^E − 1).

use crate::{proof_bytes, residue_words, ProofError};
use rug::integer::Order;
use rug::Integer;
use std::io::{Read, Write};

/// A canonical residue mod 2^E − 1 in little-endian 32-bit word form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Residue {
    exponent: u32,
    words: Vec<u32>,
}

impl Residue {
    /// Build a residue from an arbitrary-precision value already in
    /// [0, 2^E − 1).
    pub fn from_int(exponent: u32, value: &Integer) -> Result<Self, ProofError> {
        let limit = mersenne(exponent);
        if *value < 0 || *value >= limit {
            return Err(ProofError::MalformedResidue {
                detail: format!("value out of range for exponent {}", exponent),
            });
        }
        let mut words = value.to_digits::<u32>(Order::Lsf);
        words.resize(residue_words(exponent), 0);
        Ok(Residue { exponent, words })
    }

    /// The distinguished small residues (3 for the PRP seed, 9 for the
    /// probable-prime target).
    pub fn small(exponent: u32, value: u32) -> Self {
        let mut words = vec![0u32; residue_words(exponent)];
        words[0] = value;
        Residue { exponent, words }
    }

    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    pub fn to_int(&self) -> Integer {
        Integer::from_digits(&self.words, Order::Lsf)
    }

    /// Canonical encoding: ceil(E/8) little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = Vec::with_capacity(self.words.len() * 4);
        for w in &self.words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes.truncate(proof_bytes(self.exponent));
        bytes
    }

    /// Decode a canonical encoding. The length must be exactly ceil(E/8) and
    /// the value must be reduced.
    pub fn from_bytes(exponent: u32, bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != proof_bytes(exponent) {
            return Err(ProofError::MalformedResidue {
                detail: format!(
                    "expected {} residue bytes, got {}",
                    proof_bytes(exponent),
                    bytes.len()
                ),
            });
        }
        Self::from_int(exponent, &Integer::from_digits(bytes, Order::Lsf))
    }

    /// Low 64 bits, for log lines.
    pub fn res64(&self) -> u64 {
        let lo = self.words[0] as u64;
        let hi = self.words.get(1).copied().unwrap_or(0) as u64;
        lo | (hi << 32)
    }

    /// Write the word payload followed by its CRC-32, the cache-file format.
    pub fn write_checked(&self, sink: &mut impl Write) -> std::io::Result<()> {
        let mut payload: Vec<u8> = Vec::with_capacity(self.words.len() * 4);
        for w in &self.words {
            payload.extend_from_slice(&w.to_le_bytes());
        }
        let crc = crc32fast::hash(&payload);
        sink.write_all(&payload)?;
        sink.write_all(&crc.to_le_bytes())
    }

    /// Read back a checked residue. `k` is the iteration index, carried for
    /// error context only.
    pub fn read_checked(
        exponent: u32,
        source: &mut impl Read,
        k: u32,
    ) -> Result<Self, ProofError> {
        let n_words = residue_words(exponent);
        let mut payload = vec![0u8; n_words * 4];
        source
            .read_exact(&mut payload)
            .map_err(|_| ProofError::MissingResidue { k })?;
        let mut crc_bytes = [0u8; 4];
        source
            .read_exact(&mut crc_bytes)
            .map_err(|_| ProofError::MissingResidue { k })?;
        if crc32fast::hash(&payload) != u32::from_le_bytes(crc_bytes) {
            return Err(ProofError::CorruptResidue { k });
        }
        let words: Vec<u32> = payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let value = Integer::from_digits(&words, Order::Lsf);
        if value >= mersenne(exponent) {
            return Err(ProofError::MalformedResidue {
                detail: format!("cached residue at iteration {} is not reduced", k),
            });
        }
        Ok(Residue { exponent, words })
    }
}

/// The Mersenne modulus 2^E − 1.
pub fn mersenne(exponent: u32) -> Integer {
    (Integer::from(1u32) << exponent) - 1u32
}
