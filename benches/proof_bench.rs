use criterion::{black_box, criterion_group, criterion_main, Criterion};
use millstone::engine::ReferenceEngine;
use millstone::hash_chain::HashChain;
use millstone::proof_set::ProofSet;
use millstone::residue::{mersenne, Residue};
use rug::Integer;
use tempfile::tempdir;

fn bench_hash_chain(c: &mut Criterion) {
    // One level of the Fiat-Shamir chain at a mid-size exponent.
    let e = 86_243u32;
    let b = Residue::from_int(e, &(mersenne(e) - 9u32)).unwrap();
    let m = Residue::from_int(e, &(mersenne(e) - 12345u32)).unwrap();

    c.bench_function("hash_chain_absorb(86243)", |bench| {
        bench.iter(|| {
            let mut chain = HashChain::new(black_box(&b));
            black_box(chain.absorb(black_box(&m)))
        });
    });
}

fn bench_point_derivation(c: &mut Criterion) {
    let tmp = tempdir().unwrap();
    c.bench_function("proof_set_new(86243, power=12)", |bench| {
        bench.iter(|| {
            ProofSet::new(tmp.path(), black_box(86_243), Vec::new(), black_box(12), 0).unwrap()
        });
    });
}

fn bench_verify_m521(c: &mut Criterion) {
    // Build a power-4 proof for M521 once, then benchmark verification.
    let tmp = tempdir().unwrap();
    let set = ProofSet::new(tmp.path(), 521, Vec::new(), 4, 0).unwrap();
    let mut engine = ReferenceEngine::new(521);

    let m = mersenne(521);
    for &k in set.points() {
        let r = Integer::from(3u32)
            .pow_mod(&(Integer::from(1u32) << k), &m)
            .unwrap();
        set.save(k, &Residue::from_int(521, &r).unwrap()).unwrap();
    }
    let (proof, _) = set.compute_proof(&mut engine).unwrap();

    c.bench_function("verify(M521, power=4)", |bench| {
        bench.iter(|| {
            let mut eng = ReferenceEngine::new(521);
            black_box(&proof).verify(&mut eng, &[]).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_hash_chain,
    bench_point_derivation,
    bench_verify_m521
);
criterion_main!(benches);
