// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Private set intersection from an oblivious key-value store (Paxos/Baxos)
//! and a VOLE-based oblivious PRF.

#![allow(clippy::many_single_char_names)]

mod aes;
mod block;
/// Module encapsulating the communication channel between the two parties.
pub mod channel;
mod errors;
mod hash_aes;
pub mod okvs;
pub mod oprf;
pub mod psi;
mod rand_aes;
pub mod utils;
pub mod vole;

pub use crate::{
    aes::{Aes128, FIXED_KEY_AES128},
    block::Block,
    channel::{AbstractChannel, Channel, TrackChannel},
    errors::Error,
    hash_aes::{AesHash, AES_HASH},
    rand_aes::AesRng,
};

/// A marker trait denoting that the given scheme is semi-honest secure.
pub trait SemiHonest {}
/// A marker trait denoting that the given scheme is maliciously secure.
pub trait Malicious: SemiHonest {}
