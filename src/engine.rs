//! # Engine — Big-Integer Squaring Backend
//!
//! The proof core is engine-agnostic: everything it needs from the
//! accelerator is modular multiplication of exponent-sized residues mod
//! 2^E − 1, expressed by the [`BigIntEngine`] trait. This is the only
//! polymorphic seam in the crate — a production deployment plugs in a
//! GPU/NTT implementation; [`ReferenceEngine`] is the deterministic
//! arbitrary-precision implementation used by the verifier CLI, small PRP
//! runs, and the test suite.
//!
//! All operations observe FIFO ordering within one engine and block until
//! complete. An engine readback that comes back all-zero signals a backend
//! failure (a transient GPU error), not a legitimate residue: an honest PRP
//! residue 3^(2^k) is never ≡ 0 mod 2^E − 1 because gcd(3, 2^E − 1) = 1 for
//! odd E.

use crate::residue::{mersenne, Residue};
use crate::ProofError;
use rug::ops::RemRounding;
use rug::Integer;

/// Handle to an engine-owned residue buffer, as returned by
/// [`BigIntEngine::make_buffer_vector`]. Valid only for the engine that
/// created it.
#[derive(Clone, Copy, Debug)]
pub struct EngineBuf(usize);

/// Modular big-integer operations mod 2^E − 1.
///
/// The engine is assumed correct and deterministic; any nondeterminism is
/// expected to surface as a failed proof verification and is reported, not
/// tolerated.
pub trait BigIntEngine {
    /// The exponent E this engine was set up for.
    fn exponent(&self) -> u32;

    /// Allocate `n` residue buffers on the engine.
    fn make_buffer_vector(&mut self, n: u32) -> Result<Vec<EngineBuf>, ProofError>;

    /// Upload a residue into a buffer.
    fn write_in(&mut self, buf: EngineBuf, residue: &Residue) -> Result<(), ProofError>;

    /// Download a buffer as a canonical residue. An all-zero readback is an
    /// engine failure.
    fn read_and_compress(&mut self, buf: EngineBuf) -> Result<Residue, ProofError>;

    /// In-place fold of two buffers: dst ← dst^h · src.
    fn exp_mul_into(&mut self, dst: EngineBuf, h: u64, src: EngineBuf)
        -> Result<(), ProofError>;

    /// x^h · y, or x^h · y² when `square_y` is set.
    fn exp_mul(
        &mut self,
        x: &Residue,
        h: u64,
        y: &Residue,
        square_y: bool,
    ) -> Result<Residue, ProofError>;

    /// x^(2^n): n successive squarings.
    fn exp_exp2(&mut self, x: &Residue, n: u32) -> Result<Residue, ProofError>;
}

/// Pure-integer reference engine over `rug`.
///
/// Orders of magnitude slower than an FFT backend, but exact, portable, and
/// deterministic — the arbiter for proof verification.
pub struct ReferenceEngine {
    exponent: u32,
    modulus: Integer,
    buffers: Vec<Integer>,
}

impl ReferenceEngine {
    pub fn new(exponent: u32) -> Self {
        ReferenceEngine {
            exponent,
            modulus: mersenne(exponent),
            buffers: Vec::new(),
        }
    }

    fn pow_h(&self, base: &Integer, h: u64) -> Result<Integer, ProofError> {
        base.clone()
            .pow_mod(&Integer::from(h), &self.modulus)
            .map_err(|_| ProofError::EngineFailure)
    }
}

impl BigIntEngine for ReferenceEngine {
    fn exponent(&self) -> u32 {
        self.exponent
    }

    fn make_buffer_vector(&mut self, n: u32) -> Result<Vec<EngineBuf>, ProofError> {
        let start = self.buffers.len();
        self.buffers
            .extend((0..n).map(|_| Integer::new()));
        Ok((start..start + n as usize).map(EngineBuf).collect())
    }

    fn write_in(&mut self, buf: EngineBuf, residue: &Residue) -> Result<(), ProofError> {
        self.buffers[buf.0] = residue.to_int();
        Ok(())
    }

    fn read_and_compress(&mut self, buf: EngineBuf) -> Result<Residue, ProofError> {
        let value = self.buffers[buf.0].clone().rem_euc(&self.modulus);
        if value == 0u32 {
            return Err(ProofError::EngineFailure);
        }
        Residue::from_int(self.exponent, &value)
    }

    fn exp_mul_into(
        &mut self,
        dst: EngineBuf,
        h: u64,
        src: EngineBuf,
    ) -> Result<(), ProofError> {
        let folded =
            (self.pow_h(&self.buffers[dst.0], h)? * &self.buffers[src.0]).rem_euc(&self.modulus);
        self.buffers[dst.0] = folded;
        Ok(())
    }

    fn exp_mul(
        &mut self,
        x: &Residue,
        h: u64,
        y: &Residue,
        square_y: bool,
    ) -> Result<Residue, ProofError> {
        let y_int = y.to_int();
        let mut acc = self.pow_h(&x.to_int(), h)? * &y_int;
        if square_y {
            acc *= &y_int;
        }
        Residue::from_int(self.exponent, &acc.rem_euc(&self.modulus))
    }

    fn exp_exp2(&mut self, x: &Residue, n: u32) -> Result<Residue, ProofError> {
        let exp = Integer::from(1u32) << n;
        let value = x
            .to_int()
            .pow_mod(&exp, &self.modulus)
            .map_err(|_| ProofError::EngineFailure)?;
        Residue::from_int(self.exponent, &value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_mul_matches_direct_arithmetic() {
        let e = 127u32;
        let mut eng = ReferenceEngine::new(e);
        let x = Residue::small(e, 5);
        let y = Residue::small(e, 7);
        let m = mersenne(e);

        let x_cubed = Integer::from(5).pow_mod(&Integer::from(3), &m).unwrap();

        let plain = eng.exp_mul(&x, 3, &y, false).unwrap();
        assert_eq!(plain.to_int(), (x_cubed.clone() * 7u32) % &m);

        let squared = eng.exp_mul(&x, 3, &y, true).unwrap();
        assert_eq!(squared.to_int(), (x_cubed * 49u32) % &m);
    }

    #[test]
    fn exp_exp2_is_repeated_squaring() {
        let e = 61u32;
        let mut eng = ReferenceEngine::new(e);
        let x = Residue::small(e, 3);
        let mut expected = x.clone();
        for n in 0..10u32 {
            assert_eq!(eng.exp_exp2(&x, n).unwrap(), expected, "n={}", n);
            expected = eng.exp_mul(&expected, 1, &expected, false).unwrap();
        }
    }

    #[test]
    fn prp_residue_of_m7_is_nine() {
        // M7 = 127 is a Mersenne prime, so 3^(2^7) ≡ 9 (mod 127).
        let mut eng = ReferenceEngine::new(7);
        let r = eng.exp_exp2(&Residue::small(7, 3), 7).unwrap();
        assert_eq!(r, Residue::small(7, 9));
    }

    #[test]
    fn buffer_fold_matches_host_fold() {
        let e = 127u32;
        let mut eng = ReferenceEngine::new(e);
        let a = Residue::small(e, 12345);
        let b = Residue::small(e, 678);
        let h = 0x0123_4567_89ab_cdefu64;

        let bufs = eng.make_buffer_vector(2).unwrap();
        eng.write_in(bufs[0], &a).unwrap();
        eng.write_in(bufs[1], &b).unwrap();
        eng.exp_mul_into(bufs[0], h, bufs[1]).unwrap();
        let folded = eng.read_and_compress(bufs[0]).unwrap();

        assert_eq!(folded, eng.exp_mul(&a, h, &b, false).unwrap());
    }

    #[test]
    fn zero_readback_is_engine_failure() {
        let e = 127u32;
        let mut eng = ReferenceEngine::new(e);
        let bufs = eng.make_buffer_vector(1).unwrap();
        eng.write_in(bufs[0], &Residue::small(e, 0)).unwrap();
        assert!(matches!(
            eng.read_and_compress(bufs[0]),
            Err(ProofError::EngineFailure)
        ));
    }
}
