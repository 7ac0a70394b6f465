// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! The VOLE correlation provider interface.
//!
//! A provider hands the two parties shares of the correlation
//! `B = Δ·A ⊕ C` over `GF(2^128)`: the sender learns `(Δ, B)` and the
//! receiver learns `(A, C)`. The OPRF layer consumes the correlation and is
//! agnostic to how it was generated; a real deployment plugs in a silent
//! VOLE generator behind these traits.

use crate::{AbstractChannel, AesRng, Block, Error};
use rand::{CryptoRng, Rng};
use rand_core::{RngCore, SeedableRng};

/// The sender's share of the correlation: `delta` and `b = delta·a ⊕ c`.
pub struct VoleSenderShare {
    pub delta: Block,
    pub b: Vec<Block>,
}

/// The receiver's share of the correlation: `a` and `c`.
pub struct VoleReceiverShare {
    pub a: Vec<Block>,
    pub c: Vec<Block>,
}

/// The sender side of a VOLE correlation generator.
pub trait VoleSender {
    /// Generate a length-`len` correlation, returning `(Δ, B)`.
    fn send<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        len: usize,
        rng: &mut RNG,
        reduced_rounds: bool,
    ) -> Result<VoleSenderShare, Error>;
}

/// The receiver side of a VOLE correlation generator.
pub trait VoleReceiver {
    /// Generate a length-`len` correlation, returning `(A, C)`.
    fn receive<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        len: usize,
        rng: &mut RNG,
        reduced_rounds: bool,
    ) -> Result<VoleReceiverShare, Error>;
}

/// An **insecure** VOLE provider expanding both shares from a jointly tossed
/// seed.
///
/// Both parties can compute the other's share, so this provides no privacy
/// whatsoever. It exists to run tests and benchmarks without a base-OT
/// stack, like the fake base OTs commonly used in PSI benchmarking
/// harnesses.
pub struct InsecureVoleSender;

/// Receiver side of [`InsecureVoleSender`].
pub struct InsecureVoleReceiver;

/// A PRG-based commitment to a seed block.
fn seed_commitment(seed: Block) -> Block {
    let mut prg = AesRng::from_seed(seed);
    let mut com = Block::default();
    prg.fill_bytes(com.as_mut());
    com
}

/// Agree on the expansion seed with the peer.
///
/// The sender commits to its seed before the receiver reveals, so neither
/// side can steer the joint seed; the reduced-rounds variant drops the
/// commitment and does a bare one-round exchange.
fn shared_seed<C: AbstractChannel, RNG: CryptoRng + Rng>(
    channel: &mut C,
    rng: &mut RNG,
    reduced_rounds: bool,
    sender: bool,
) -> Result<Block, Error> {
    let mine: Block = rng.gen();
    if reduced_rounds {
        channel.write_block(&mine)?;
        channel.flush()?;
        return Ok(mine ^ channel.read_block()?);
    }
    let theirs = if sender {
        channel.write_block(&seed_commitment(mine))?;
        channel.flush()?;
        let theirs = channel.read_block()?;
        channel.write_block(&mine)?;
        channel.flush()?;
        theirs
    } else {
        let com = channel.read_block()?;
        channel.write_block(&mine)?;
        channel.flush()?;
        let theirs = channel.read_block()?;
        if seed_commitment(theirs) != com {
            return Err(Error::CommitmentCheckFailed);
        }
        theirs
    };
    Ok(mine ^ theirs)
}

fn expand(seed: Block, len: usize) -> (Vec<Block>, Vec<Block>, Block) {
    let mut shared = AesRng::from_seed(seed);
    let a: Vec<Block> = (0..len).map(|_| shared.gen()).collect();
    let c: Vec<Block> = (0..len).map(|_| shared.gen()).collect();
    let delta: Block = shared.gen();
    (a, c, delta)
}

impl VoleSender for InsecureVoleSender {
    fn send<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        len: usize,
        rng: &mut RNG,
        reduced_rounds: bool,
    ) -> Result<VoleSenderShare, Error> {
        let seed = shared_seed(channel, rng, reduced_rounds, true)?;
        let (a, c, delta) = expand(seed, len);
        let b = a
            .iter()
            .zip(c.iter())
            .map(|(a, c)| a.gf128_mul(delta) ^ *c)
            .collect();
        Ok(VoleSenderShare { delta, b })
    }
}

impl VoleReceiver for InsecureVoleReceiver {
    fn receive<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        channel: &mut C,
        len: usize,
        rng: &mut RNG,
        reduced_rounds: bool,
    ) -> Result<VoleReceiverShare, Error> {
        let seed = shared_seed(channel, rng, reduced_rounds, false)?;
        let (a, c, _) = expand(seed, len);
        Ok(VoleReceiverShare { a, c })
    }
}
