// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Private set intersection benchmarks using `criterion`.

use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use sherbet::{
    psi,
    vole::{InsecureVoleReceiver, InsecureVoleSender},
    AesRng,
    Block,
    Channel,
};
use std::{
    io::{BufReader, BufWriter},
    os::unix::net::UnixStream,
    time::Duration,
};

const N: usize = 1 << 12;

fn run_psi(sender_set: &[Block], recver_set: &[Block]) -> usize {
    let (s, r) = UnixStream::pair().unwrap();
    let sender_set = sender_set.to_vec();
    let handle = std::thread::spawn(move || {
        let mut rng = AesRng::new();
        let reader = BufReader::new(s.try_clone().unwrap());
        let writer = BufWriter::new(s);
        let mut channel = Channel::new(reader, writer);
        let mut psi = psi::Sender::new(InsecureVoleSender, N, N, 40, false, 1, false);
        psi.oprf.bin_size = 1 << 12;
        psi.run(&sender_set, &mut channel, &mut rng).unwrap();
    });
    let mut rng = AesRng::new();
    let reader = BufReader::new(r.try_clone().unwrap());
    let writer = BufWriter::new(r);
    let mut channel = Channel::new(reader, writer);
    let mut psi = psi::Receiver::new(InsecureVoleReceiver, N, N, 40, false, 1, false);
    psi.oprf.bin_size = 1 << 12;
    psi.run(recver_set, &mut channel, &mut rng).unwrap();
    handle.join().unwrap();
    psi.intersection.len()
}

fn bench_psi(c: &mut Criterion) {
    c.bench_function(&format!("psi::run ({})", N), |b| {
        let mut rng = AesRng::new();
        let sender_set: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        let mut recver_set: Vec<Block> = (0..N).map(|_| rng.gen()).collect();
        recver_set[..N / 2].copy_from_slice(&sender_set[..N / 2]);
        b.iter(|| {
            assert_eq!(run_psi(&sender_set, &recver_set), N / 2);
        });
    });
}

criterion_group! {
    name = psi_benches;
    config = Criterion::default().warm_up_time(Duration::from_millis(100)).sample_size(10);
    targets = bench_psi
}
criterion_main!(psi_benches);
