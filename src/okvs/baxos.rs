// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! The binned OKVS.
//!
//! Items are hashed into bins and each bin is solved independently, giving
//! near-linear scaling and bounded per-bin memory. Encoding runs in two
//! phases over a fixed pool of OS threads: a scatter phase where each thread
//! hashes its stripe of the input into private per-bin shards, and, after a
//! one-shot barrier, a solve phase where each thread owns every `T`-th bin.

use crate::{
    okvs::{
        hash::BATCH_SIZE,
        paxos::{build_csr, build_rows},
        DenseType,
        IdxType,
        Paxos,
        PaxosParam,
        PaxosValue,
    },
    utils::{div_ceil, Divider, Matrix, UnsafeSlice},
    AesRng,
    Block,
    Error,
};
use rand_core::SeedableRng;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Barrier,
    Mutex,
    OnceLock,
};

/// Balls-into-bins tail bound: the smallest capacity `B` such that throwing
/// `num_balls` balls into `num_bins` bins, no bin exceeds `B` except with
/// probability `2^-ssp`.
pub fn get_bin_size(num_bins: usize, num_balls: usize, ssp: usize) -> usize {
    if num_bins <= 1 || num_balls == 0 {
        return num_balls;
    }
    let n = num_balls;
    let m = num_bins as f64;
    let lp = -m.log2();
    let lq = (1.0 - 1.0 / m).log2();
    // Union bound over the bins.
    let target = -(ssp as f64) - m.log2();
    let mut log2c = 0.0f64;
    let mut i = 0usize;
    let mut b = div_ceil(num_balls, num_bins);
    while i < b {
        log2c += ((n - i) as f64).log2() - ((i + 1) as f64).log2();
        i += 1;
    }
    loop {
        if b >= n {
            return n;
        }
        // log2 of the binomial tail beyond `b`, summed until the terms stop
        // mattering. The terms decrease geometrically above the mean.
        while i < b + 1 {
            log2c += ((n - i) as f64).log2() - ((i + 1) as f64).log2();
            i += 1;
        }
        let mut total = log2c + (b + 1) as f64 * lp + (n - b - 1) as f64 * lq;
        let mut lcj = log2c;
        let mut j = b + 1;
        while j < n {
            lcj += ((n - j) as f64).log2() - ((j + 1) as f64).log2();
            let e = lcj + (j + 1) as f64 * lp + (n - j - 1) as f64 * lq;
            if e < total - 30.0 {
                break;
            }
            total = log2_add(total, e);
            j += 1;
        }
        if total <= target {
            return b;
        }
        b += 1;
    }
}

fn log2_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (1.0 + 2.0f64.powf(lo - hi)).log2()
}

/// Fold a row hash to the 64 bits fed into the bin divider.
#[inline]
pub(crate) fn bin_idx_compress(h: &Block) -> u64 {
    h.low_u64() ^ h.high_u64()
}

/// The binned OKVS. An instance holds only parameters and a seed and is
/// reusable across calls; all row, column, and output storage is owned by
/// the caller or by per-call worker scratch.
#[derive(Clone)]
pub struct Baxos {
    /// The number of items each encoding must contain.
    pub num_items: usize,
    /// The number of bins.
    pub num_bins: usize,
    /// The statistical bin capacity.
    pub items_per_bin: usize,
    /// The per-bin solver parameters, derived from `items_per_bin`.
    pub params: PaxosParam,
    /// Statistical security parameter.
    pub ssp: usize,
    seed: Block,
    /// When set, decoded values are added into the destination instead of
    /// assigned.
    pub add_to_decode: bool,
    /// Re-decode every encoded key after solving and verify the bindings.
    pub debug: bool,
}

impl Baxos {
    /// Create a binned OKVS for `num_items` items with roughly
    /// `bin_capacity` items per bin.
    pub fn new(
        num_items: usize,
        bin_capacity: usize,
        weight: usize,
        ssp: usize,
        dense_type: DenseType,
        seed: Block,
    ) -> Result<Self, Error> {
        if num_items == 0 {
            return Err(Error::InvalidParameters { nitems: 0, weight });
        }
        let num_bins = div_ceil(num_items, bin_capacity.max(1));
        let items_per_bin = get_bin_size(num_bins, num_items, ssp);
        let params = PaxosParam::new(items_per_bin, weight, ssp, dense_type)?;
        Ok(Self {
            num_items,
            num_bins,
            items_per_bin,
            params,
            ssp,
            seed,
            add_to_decode: false,
            debug: false,
        })
    }

    /// Total encoding size, in values: one solver-sized slice per bin.
    #[inline]
    pub fn size(&self) -> usize {
        self.num_bins * self.params.size()
    }

    #[inline]
    pub fn seed(&self) -> Block {
        self.seed
    }

    /// Encode `(inputs[i], values[i])` pairs into `output` using
    /// `num_threads` worker threads.
    ///
    /// When `prng_seed` is given, the unused degrees of freedom of each bin
    /// are filled from a PRNG derived from it. The encoding is a
    /// deterministic function of `(inputs, values, seed, prng_seed)`.
    pub fn solve<V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &[V],
        output: &mut [V],
        prng_seed: Option<Block>,
        num_threads: usize,
    ) -> Result<(), Error> {
        if inputs.len() != self.num_items {
            return Err(Error::ShapeMismatch {
                expected: self.num_items,
                got: inputs.len(),
            });
        }
        if values.len() != inputs.len() {
            return Err(Error::ShapeMismatch {
                expected: inputs.len(),
                got: values.len(),
            });
        }
        if output.len() != self.size() {
            return Err(Error::ShapeMismatch {
                expected: self.size(),
                got: output.len(),
            });
        }
        if self.params.dense_type == DenseType::GF128 && !V::GF128 {
            return Err(Error::InvalidParameters {
                nitems: self.num_items,
                weight: self.params.weight,
            });
        }
        match self.params.idx_bits() {
            8 => self.impl_par_solve::<u8, V>(inputs, values, output, prng_seed, num_threads),
            16 => self.impl_par_solve::<u16, V>(inputs, values, output, prng_seed, num_threads),
            24 | 32 => self.impl_par_solve::<u32, V>(inputs, values, output, prng_seed, num_threads),
            _ => self.impl_par_solve::<u64, V>(inputs, values, output, prng_seed, num_threads),
        }?;
        if self.debug {
            self.check_encoding(inputs, values, output, num_threads)?;
        }
        Ok(())
    }

    /// Decode each input against `p`.
    pub fn decode<V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &mut [V],
        p: &[V],
        num_threads: usize,
    ) -> Result<(), Error> {
        if values.len() != inputs.len() {
            return Err(Error::ShapeMismatch {
                expected: inputs.len(),
                got: values.len(),
            });
        }
        if p.len() != self.size() {
            return Err(Error::ShapeMismatch {
                expected: self.size(),
                got: p.len(),
            });
        }
        if self.params.dense_type == DenseType::GF128 && !V::GF128 {
            return Err(Error::InvalidParameters {
                nitems: self.num_items,
                weight: self.params.weight,
            });
        }
        match self.params.idx_bits() {
            8 => self.impl_par_decode::<u8, V>(inputs, values, p, num_threads),
            16 => self.impl_par_decode::<u16, V>(inputs, values, p, num_threads),
            24 | 32 => self.impl_par_decode::<u32, V>(inputs, values, p, num_threads),
            _ => self.impl_par_decode::<u64, V>(inputs, values, p, num_threads),
        }
        Ok(())
    }

    fn impl_par_solve<I: IdxType, V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &[V],
        output: &mut [V],
        prng_seed: Option<Block>,
        num_threads: usize,
    ) -> Result<(), Error> {
        let t_count = num_threads.max(1);
        if self.num_bins == 1 {
            let paxos = Paxos::<I>::new(&self.params, self.seed);
            let mut rng = prng_seed.map(AesRng::from_seed);
            return paxos.solve(inputs, values, output, rng.as_mut());
        }

        let items_per_thread = div_ceil(inputs.len(), t_count);
        let per_thrd_max = get_bin_size(self.num_bins, items_per_thread, self.ssp);
        let divider = Divider::new(self.num_bins as u64);
        let shards: Vec<OnceLock<ThreadShard<V>>> =
            (0..t_count).map(|_| OnceLock::new()).collect();
        let barrier = Barrier::new(t_count);
        let failed = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let out = UnsafeSlice::new(output);

        std::thread::scope(|s| {
            for t in 0..t_count {
                let shards = &shards;
                let barrier = &barrier;
                let failed = &failed;
                let first_error = &first_error;
                let out = &out;
                s.spawn(move || {
                    self.solve_worker::<I, V>(
                        t,
                        t_count,
                        inputs,
                        values,
                        per_thrd_max,
                        divider,
                        prng_seed,
                        shards,
                        barrier,
                        failed,
                        first_error,
                        out,
                    )
                });
            }
        });

        let slot = first_error
            .into_inner()
            .unwrap_or_else(|poison| poison.into_inner());
        match slot {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_worker<I: IdxType, V: PaxosValue>(
        &self,
        t: usize,
        t_count: usize,
        inputs: &[Block],
        values: &[V],
        per_thrd_max: usize,
        divider: Divider,
        prng_seed: Option<Block>,
        shards: &[OnceLock<ThreadShard<V>>],
        barrier: &Barrier,
        failed: &AtomicBool,
        first_error: &Mutex<Option<Error>>,
        out: &UnsafeSlice<V>,
    ) {
        let n = inputs.len();
        let begin = n * t / t_count;
        let end = n * (t + 1) / t_count;
        let my_inputs = &inputs[begin..end];
        let my_values = &values[begin..end];

        let paxos = Paxos::<I>::new(&self.params, self.seed);
        let mut shard = ThreadShard::<V>::new(self.num_bins, per_thrd_max);
        let mut hash_batch = [Block::default(); BATCH_SIZE];
        let mut bin_idxs = [0u64; BATCH_SIZE];
        'scatter: for (chunk_i, chunk) in my_inputs.chunks(BATCH_SIZE).enumerate() {
            let base = chunk_i * BATCH_SIZE;
            paxos
                .hasher()
                .hash_blocks(chunk, &mut hash_batch[..chunk.len()]);
            for (idx, h) in bin_idxs[..chunk.len()]
                .iter_mut()
                .zip(hash_batch[..chunk.len()].iter())
            {
                *idx = bin_idx_compress(h);
            }
            divider.rem_batch(&mut bin_idxs[..chunk.len()]);
            for k in 0..chunk.len() {
                let b = bin_idxs[k] as usize;
                let bin = &mut shard.bins[b];
                if bin.hashes.len() == per_thrd_max {
                    record_error(
                        failed,
                        first_error,
                        Error::BinOverflow {
                            bin: b,
                            size: per_thrd_max + 1,
                            capacity: per_thrd_max,
                        },
                    );
                    break 'scatter;
                }
                bin.hashes.push(hash_batch[k]);
                bin.values.push(my_values[base + k]);
            }
        }
        let _ = shards[t].set(shard);
        barrier.wait();
        if failed.load(Ordering::SeqCst) {
            return;
        }

        let weight = self.params.weight;
        let m = self.params.sparse_size;
        let cap = self.items_per_bin;
        let paxos_size = self.params.size();
        let mut hashes_buf: Vec<Block> = Vec::with_capacity(cap);
        let mut values_buf: Vec<V> = Vec::with_capacity(cap);
        let mut rows = vec![I::default(); cap * weight];
        let mut col_ptr = vec![0usize; m + 1];
        let mut col_rows = vec![I::default(); cap * weight];
        let mut cursors = vec![0usize; m];

        let mut bin = t;
        while bin < self.num_bins {
            if failed.load(Ordering::SeqCst) {
                return;
            }
            hashes_buf.clear();
            values_buf.clear();
            // Concatenate the thread shards in thread order; this fixes the
            // within-bin row order and hence the encoding bytes.
            for shard in shards.iter() {
                if let Some(shard) = shard.get() {
                    let b = &shard.bins[bin];
                    if hashes_buf.len() + b.hashes.len() > cap {
                        record_error(
                            failed,
                            first_error,
                            Error::BinOverflow {
                                bin,
                                size: hashes_buf.len() + b.hashes.len(),
                                capacity: cap,
                            },
                        );
                        return;
                    }
                    hashes_buf.extend_from_slice(&b.hashes);
                    values_buf.extend_from_slice(&b.values);
                }
            }
            let bn = hashes_buf.len();
            build_rows(paxos.hasher(), &hashes_buf, weight, &mut rows[..bn * weight]);
            build_csr(
                bn,
                weight,
                &rows[..bn * weight],
                &mut col_ptr,
                &mut col_rows[..bn * weight],
                &mut cursors,
            );
            // Bins are disjoint slices of the output, each with a unique
            // owner thread.
            let out_slice = unsafe { out.slice_mut(bin * paxos_size, paxos_size) };
            let mut rng =
                prng_seed.map(|s| AesRng::from_seed(s ^ Block::from(bin as u128)));
            if let Err(e) = paxos.encode(
                bn,
                &rows[..bn * weight],
                &hashes_buf,
                &col_ptr,
                &col_rows[..bn * weight],
                &values_buf,
                1,
                out_slice,
                rng.as_mut(),
            ) {
                record_error(failed, first_error, e);
                return;
            }
            bin += t_count;
        }
    }

    fn impl_par_decode<I: IdxType, V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &mut [V],
        p: &[V],
        num_threads: usize,
    ) {
        let t_count = num_threads.max(1);
        if self.num_bins == 1 {
            let mut paxos = Paxos::<I>::new(&self.params, self.seed);
            paxos.add_to_decode = self.add_to_decode;
            // Shapes were validated by the caller.
            let _ = paxos.decode(inputs, values, p);
            return;
        }
        if t_count == 1 {
            self.impl_decode_batch::<I, V>(inputs, values, p);
            return;
        }
        let n = inputs.len();
        std::thread::scope(|s| {
            let mut rest = values;
            for t in 0..t_count {
                let begin = n * t / t_count;
                let end = n * (t + 1) / t_count;
                let (chunk, tail) = rest.split_at_mut(end - begin);
                rest = tail;
                let in_chunk = &inputs[begin..end];
                s.spawn(move || self.impl_decode_batch::<I, V>(in_chunk, chunk, p));
            }
        });
    }

    /// Decode a stripe of inputs, routing keys into per-bin batches of up to
    /// 512 and flushing each batch against the bin's slice of `p`.
    fn impl_decode_batch<I: IdxType, V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &mut [V],
        p: &[V],
    ) {
        if inputs.is_empty() {
            return;
        }
        let decode_size = 512.min(inputs.len());
        let mut batches = Matrix::<Block>::new(self.num_bins, decode_size);
        let mut in_idxs = Matrix::<u64>::new(self.num_bins, decode_size);
        let mut batch_sizes = vec![0usize; self.num_bins];
        let mut paxos = Paxos::<I>::new(&self.params, self.seed);
        paxos.add_to_decode = self.add_to_decode;
        let divider = Divider::new(self.num_bins as u64);
        let paxos_size = self.params.size();
        let weight = self.params.weight;
        let mut row_buf = vec![I::default(); BATCH_SIZE * weight];
        let mut hash_batch = [Block::default(); BATCH_SIZE];
        let mut bin_idxs = [0u64; BATCH_SIZE];

        for (chunk_i, chunk) in inputs.chunks(BATCH_SIZE).enumerate() {
            let base = chunk_i * BATCH_SIZE;
            paxos
                .hasher()
                .hash_blocks(chunk, &mut hash_batch[..chunk.len()]);
            for (idx, h) in bin_idxs[..chunk.len()]
                .iter_mut()
                .zip(hash_batch[..chunk.len()].iter())
            {
                *idx = bin_idx_compress(h);
            }
            divider.rem_batch(&mut bin_idxs[..chunk.len()]);
            for k in 0..chunk.len() {
                let b = bin_idxs[k] as usize;
                let fill = batch_sizes[b];
                batches.row_mut(b)[fill] = hash_batch[k];
                in_idxs.row_mut(b)[fill] = (base + k) as u64;
                batch_sizes[b] = fill + 1;
                if batch_sizes[b] == decode_size {
                    decode_bin(
                        &paxos,
                        weight,
                        batches.row(b),
                        in_idxs.row(b),
                        values,
                        &p[b * paxos_size..(b + 1) * paxos_size],
                        &mut row_buf,
                    );
                    batch_sizes[b] = 0;
                }
            }
        }
        for b in 0..self.num_bins {
            if batch_sizes[b] > 0 {
                decode_bin(
                    &paxos,
                    weight,
                    &batches.row(b)[..batch_sizes[b]],
                    &in_idxs.row(b)[..batch_sizes[b]],
                    values,
                    &p[b * paxos_size..(b + 1) * paxos_size],
                    &mut row_buf,
                );
            }
        }
    }

    /// Re-decode every encoded key and verify the bindings; duplicates are
    /// reported explicitly.
    fn check_encoding<V: PaxosValue>(
        &self,
        inputs: &[Block],
        values: &[V],
        p: &[V],
        num_threads: usize,
    ) -> Result<(), Error> {
        let mut set = rustc_hash::FxHashSet::default();
        for x in inputs.iter() {
            if !set.insert(u128::from(*x)) {
                return Err(Error::DuplicateKey);
            }
        }
        let mut checker = self.clone();
        checker.add_to_decode = false;
        checker.debug = false;
        let mut check = vec![V::default(); inputs.len()];
        checker.decode(inputs, &mut check, p, num_threads)?;
        if check != values {
            return Err(Error::EncodeFailed);
        }
        Ok(())
    }
}

struct ThreadShard<V> {
    bins: Vec<BinShard<V>>,
}

struct BinShard<V> {
    hashes: Vec<Block>,
    values: Vec<V>,
}

impl<V> ThreadShard<V> {
    fn new(num_bins: usize, capacity: usize) -> Self {
        Self {
            bins: (0..num_bins)
                .map(|_| BinShard {
                    hashes: Vec::with_capacity(capacity),
                    values: Vec::with_capacity(capacity),
                })
                .collect(),
        }
    }
}

fn record_error(failed: &AtomicBool, slot: &Mutex<Option<Error>>, e: Error) {
    let mut guard = slot.lock().unwrap_or_else(|poison| poison.into_inner());
    if guard.is_none() {
        *guard = Some(e);
    }
    failed.store(true, Ordering::SeqCst);
}

/// Decode one bin's batch: rows are rebuilt from the stored hashes and each
/// key's inner product lands at its original position in `values`.
fn decode_bin<I: IdxType, V: PaxosValue>(
    paxos: &Paxos<I>,
    weight: usize,
    hashes: &[Block],
    in_idxs: &[u64],
    values: &mut [V],
    p_bin: &[V],
    row_buf: &mut [I],
) {
    let main = hashes.len() - hashes.len() % BATCH_SIZE;
    let mut i = 0;
    while i < main {
        paxos
            .hasher()
            .build_row32(&hashes[i..i + BATCH_SIZE], &mut row_buf[..BATCH_SIZE * weight]);
        for k in 0..BATCH_SIZE {
            let idx = in_idxs[i + k] as usize;
            paxos.decode_one(
                &row_buf[k * weight..(k + 1) * weight],
                hashes[i + k],
                &mut values[idx..idx + 1],
                p_bin,
                1,
            );
        }
        i += BATCH_SIZE;
    }
    for k in main..hashes.len() {
        paxos.hasher().build_row(hashes[k], &mut row_buf[..weight]);
        let idx = in_idxs[k] as usize;
        paxos.decode_one(
            &row_buf[..weight],
            hashes[k],
            &mut values[idx..idx + 1],
            p_bin,
            1,
        );
    }
}
