// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! An oblivious key-value store (OKVS): a map from keys to values encoded
//! into a vector `P` such that looking up any key is a linear functional of
//! `P`, and `P` is pseudorandom to anyone not holding the keys.
//!
//! The construction is the low-weight sparse-plus-dense linear encoding
//! ("Paxos"), binned for near-linear scaling ("Baxos").

mod baxos;
mod dense;
mod hash;
mod params;
mod paxos;

pub use baxos::{get_bin_size, Baxos};
pub use hash::PaxosHash;
pub use params::{DenseType, PaxosParam};
pub use paxos::Paxos;

use crate::Block;
use rand_core::RngCore;

/// The index integer used inside the solver. The solver is monomorphized over
/// the smallest unsigned width that fits `sparse_size + 1`.
pub trait IdxType:
    Copy + Default + Eq + Ord + Send + Sync + std::fmt::Debug + 'static
{
    fn from_usize(v: usize) -> Self;
    fn to_usize(self) -> usize;
}

macro_rules! impl_idx_type {
    ($($t:ty),*) => {
        $(impl IdxType for $t {
            #[inline(always)]
            fn from_usize(v: usize) -> Self {
                v as $t
            }
            #[inline(always)]
            fn to_usize(self) -> usize {
                self as usize
            }
        })*
    };
}

impl_idx_type!(u8, u16, u32, u64);

/// An element of the commutative group the OKVS stores.
///
/// The group operation is XOR. Types flagged `GF128` additionally carry a
/// `GF(2^128)` scalar action and may be used with [`DenseType::GF128`];
/// XOR-only types are restricted to the binary dense band.
pub trait PaxosValue:
    Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    /// Whether the `GF(2^128)` dense path may be used with this type.
    const GF128: bool;

    /// The group operation (and its inverse; the group has characteristic 2).
    fn xor_assign(&mut self, rhs: &Self);

    /// Multiply by a `GF(2^128)` scalar. Only called when `GF128` is true.
    fn gf128_scale(&self, scalar: Block) -> Self;

    /// Sample a uniform element.
    fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self;
}

impl PaxosValue for Block {
    const GF128: bool = true;

    #[inline(always)]
    fn xor_assign(&mut self, rhs: &Self) {
        *self ^= *rhs;
    }

    #[inline(always)]
    fn gf128_scale(&self, scalar: Block) -> Self {
        self.gf128_mul(scalar)
    }

    #[inline(always)]
    fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut b = Block::default();
        rng.fill_bytes(b.as_mut());
        b
    }
}

macro_rules! impl_paxos_value_uint {
    ($($t:ty),*) => {
        $(impl PaxosValue for $t {
            const GF128: bool = false;

            #[inline(always)]
            fn xor_assign(&mut self, rhs: &Self) {
                *self ^= *rhs;
            }

            #[inline(always)]
            fn gf128_scale(&self, _scalar: Block) -> Self {
                unreachable!("GF(2^128) scaling on an XOR-only value type")
            }

            #[inline(always)]
            fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                rng.fill_bytes(&mut bytes);
                <$t>::from_le_bytes(bytes)
            }
        })*
    };
}

impl_paxos_value_uint!(u8, u16, u32, u64);

/// `dst ^= src`, element-wise over a row of values.
#[inline(always)]
pub(crate) fn xor_row<V: PaxosValue>(dst: &mut [V], src: &[V]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        d.xor_assign(s);
    }
}

/// `dst = src`.
#[inline(always)]
pub(crate) fn assign_row<V: PaxosValue>(dst: &mut [V], src: &[V]) {
    dst.copy_from_slice(src);
}

/// `dst ^= scalar * src` over `GF(2^128)`.
#[inline(always)]
pub(crate) fn gf128_scale_xor_row<V: PaxosValue>(dst: &mut [V], src: &[V], scalar: Block) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        let t = s.gf128_scale(scalar);
        d.xor_assign(&t);
    }
}

/// `dst = 0`.
#[inline(always)]
pub(crate) fn zero_row<V: PaxosValue>(dst: &mut [V]) {
    for d in dst.iter_mut() {
        *d = V::default();
    }
}
