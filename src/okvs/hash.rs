// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

use crate::{okvs::IdxType, utils::Divider, Aes128, Block};
use std::marker::PhantomData;

/// The batch width used throughout the solver.
pub(crate) const BATCH_SIZE: usize = 32;

/// The seeded hasher mapping a key to its matrix row: a 128-bit key hash, `w`
/// pairwise-distinct sparse column indices, and (implicitly) the dense band.
///
/// Everything here is a pure function of `(key, seed)`.
pub struct PaxosHash<I> {
    aes: Aes128,
    weight: usize,
    sparse_size: u64,
    sparse_mod: Divider,
    _marker: PhantomData<I>,
}

impl<I: IdxType> PaxosHash<I> {
    pub fn new(seed: Block, weight: usize, sparse_size: usize) -> Self {
        Self {
            aes: Aes128::new(seed),
            weight,
            sparse_size: sparse_size as u64,
            sparse_mod: Divider::new(sparse_size as u64),
            _marker: PhantomData,
        }
    }

    /// Hash a key to its 128-bit row hash (`π(x) ⊕ x` under the seeded AES).
    #[inline]
    pub fn hash_block(&self, x: Block) -> Block {
        self.aes.encrypt(x) ^ x
    }

    /// Batched form of [`PaxosHash::hash_block`], eight keys per AES call.
    pub fn hash_blocks(&self, xs: &[Block], out: &mut [Block]) {
        debug_assert_eq!(xs.len(), out.len());
        let mut chunks = xs.chunks_exact(8);
        let mut outs = out.chunks_exact_mut(8);
        for (c, o) in (&mut chunks).zip(&mut outs) {
            let mut m = [Block::default(); 8];
            m.copy_from_slice(c);
            let mut e = self.aes.encrypt8(m);
            for (e, x) in e.iter_mut().zip(m.iter()) {
                *e ^= *x;
            }
            o.copy_from_slice(&e);
        }
        for (x, o) in chunks
            .remainder()
            .iter()
            .zip(outs.into_remainder().iter_mut())
        {
            *o = self.hash_block(*x);
        }
    }

    /// Expand a row hash into `weight` pairwise-distinct sparse column
    /// indices.
    ///
    /// Candidates are drawn from the hash itself and then, on collision, from
    /// `AES(hash ⊕ ctr)` for a domain-separated counter `ctr`, so that
    /// distinctness holds unconditionally.
    pub fn build_row(&self, hash: Block, row: &mut [I]) {
        debug_assert_eq!(row.len(), self.weight);
        let mut candidates = Candidates::new(&self.aes, hash, self.sparse_size);
        for j in 0..self.weight {
            loop {
                let idx = I::from_usize(self.sparse_mod.rem(candidates.next()) as usize);
                if !row[..j].contains(&idx) {
                    row[j] = idx;
                    break;
                }
            }
        }
    }

    /// Build `BATCH_SIZE` rows at once into a flat `BATCH_SIZE * weight`
    /// buffer. Bit-identical to the scalar form.
    pub fn build_row32(&self, hashes: &[Block], rows: &mut [I]) {
        debug_assert_eq!(hashes.len(), BATCH_SIZE);
        debug_assert_eq!(rows.len(), BATCH_SIZE * self.weight);
        for (hash, row) in hashes.iter().zip(rows.chunks_exact_mut(self.weight)) {
            self.build_row(*hash, row);
        }
    }
}

/// The per-key candidate index stream.
///
/// When the sparse range fits 32 bits the hash yields four candidates before
/// the first AES call; otherwise two.
struct Candidates<'a> {
    aes: &'a Aes128,
    hash: Block,
    cur: u128,
    next: usize,
    lanes: usize,
}

impl<'a> Candidates<'a> {
    #[inline]
    fn new(aes: &'a Aes128, hash: Block, sparse_size: u64) -> Self {
        let lanes = if sparse_size <= u32::MAX as u64 { 4 } else { 2 };
        Self {
            aes,
            hash,
            cur: u128::from(hash),
            next: 0,
            lanes,
        }
    }

    #[inline]
    fn next(&mut self) -> u64 {
        if self.next > 0 && self.next % self.lanes == 0 {
            let ctr = (self.next / self.lanes) as u128;
            self.cur = u128::from(self.aes.encrypt(self.hash ^ Block::from(ctr)));
        }
        let lane = self.next % self.lanes;
        self.next += 1;
        if self.lanes == 4 {
            (self.cur >> (32 * lane)) as u32 as u64
        } else {
            (self.cur >> (64 * lane)) as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AesRng;
    use rand::Rng;

    #[test]
    fn test_rows_distinct() {
        let mut rng = AesRng::new();
        let hasher = PaxosHash::<u16>::new(rng.gen(), 3, 40);
        let mut row = [0u16; 3];
        for _ in 0..1000 {
            hasher.build_row(rng.gen(), &mut row);
            assert!(row[0] != row[1] && row[0] != row[2] && row[1] != row[2]);
            assert!(row.iter().all(|&i| (i as usize) < 40));
        }
    }

    #[test]
    fn test_rows_deterministic() {
        let seed = rand::random::<Block>();
        let hasher = PaxosHash::<u32>::new(seed, 3, 1 << 16);
        let hasher_ = PaxosHash::<u32>::new(seed, 3, 1 << 16);
        let h = rand::random::<Block>();
        let mut row = [0u32; 3];
        let mut row_ = [0u32; 3];
        hasher.build_row(h, &mut row);
        hasher_.build_row(h, &mut row_);
        assert_eq!(row, row_);
    }

    #[test]
    fn test_batched_matches_scalar() {
        let mut rng = AesRng::new();
        let hasher = PaxosHash::<u32>::new(rng.gen(), 3, 1 << 14);
        let hashes: Vec<Block> = (0..BATCH_SIZE).map(|_| rng.gen()).collect();
        let mut rows = vec![0u32; BATCH_SIZE * 3];
        hasher.build_row32(&hashes, &mut rows);
        let mut row = [0u32; 3];
        for (i, h) in hashes.iter().enumerate() {
            hasher.build_row(*h, &mut row);
            assert_eq!(&rows[i * 3..(i + 1) * 3], &row);
        }
        let mut hashed = vec![Block::default(); BATCH_SIZE];
        let inputs: Vec<Block> = (0..BATCH_SIZE).map(|_| rng.gen()).collect();
        hasher.hash_blocks(&inputs, &mut hashed);
        for (x, h) in inputs.iter().zip(hashed.iter()) {
            assert_eq!(hasher.hash_block(*x), *h);
        }
    }
}
