// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! OKVS encode/decode benchmarks using `criterion`.

use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use sherbet::{
    okvs::{Baxos, DenseType},
    AesRng,
    Block,
};
use std::time::Duration;

const N: usize = 1 << 14;

fn bench_encode(c: &mut Criterion) {
    c.bench_function(&format!("baxos::solve ({})", N), |b| {
        let mut rng = AesRng::new();
        let baxos = Baxos::new(N, 1 << 12, 3, 40, DenseType::Binary, rng.gen()).unwrap();
        let keys: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        let values: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        let mut p = vec![Block::default(); baxos.size()];
        b.iter(|| {
            baxos.solve(&keys, &values, &mut p, None, 1).unwrap();
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function(&format!("baxos::decode ({})", N), |b| {
        let mut rng = AesRng::new();
        let baxos = Baxos::new(N, 1 << 12, 3, 40, DenseType::Binary, rng.gen()).unwrap();
        let keys: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        let values: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        let mut p = vec![Block::default(); baxos.size()];
        baxos.solve(&keys, &values, &mut p, None, 1).unwrap();
        let mut out = vec![Block::default(); N];
        b.iter(|| {
            baxos.decode(&keys, &mut out, &p, 1).unwrap();
        });
    });
}

criterion_group! {
    name = paxos;
    config = Criterion::default().warm_up_time(Duration::from_millis(100)).sample_size(10);
    targets = bench_encode, bench_decode
}
criterion_main!(paxos);
