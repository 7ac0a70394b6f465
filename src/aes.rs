// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! AES-128, encryption only, using AES-NI.
//
// Portions of the below code adapted from the `aesni` crate (version 0.6.0).

use crate::Block;
use std::arch::x86_64::*;

/// AES-128, encryption only.
#[derive(Clone)]
pub struct Aes128 {
    rkeys: [__m128i; 11],
}

impl Aes128 {
    /// Create a new `Aes128` object, using `key` as the AES key.
    #[inline]
    pub fn new(key: Block) -> Self {
        let rkeys = expand(key.0);
        Aes128 { rkeys }
    }

    /// Encrypt a block, outputting the ciphertext.
    #[inline]
    pub fn encrypt(&self, m: Block) -> Block {
        let keys = self.rkeys;
        unsafe {
            let mut c = _mm_xor_si128(m.0, keys[0]);
            for rkey in &keys[1..10] {
                c = _mm_aesenc_si128(c, *rkey);
            }
            Block(_mm_aesenclast_si128(c, keys[10]))
        }
    }

    /// Encrypt eight blocks at a time, outputting the ciphertexts.
    ///
    /// Interleaving the rounds hides the latency of `aesenc`.
    #[inline]
    pub fn encrypt8(&self, m: [Block; 8]) -> [Block; 8] {
        let keys = self.rkeys;
        unsafe {
            let mut c: [__m128i; 8] = [
                _mm_xor_si128(m[0].0, keys[0]),
                _mm_xor_si128(m[1].0, keys[0]),
                _mm_xor_si128(m[2].0, keys[0]),
                _mm_xor_si128(m[3].0, keys[0]),
                _mm_xor_si128(m[4].0, keys[0]),
                _mm_xor_si128(m[5].0, keys[0]),
                _mm_xor_si128(m[6].0, keys[0]),
                _mm_xor_si128(m[7].0, keys[0]),
            ];
            for rkey in &keys[1..10] {
                for b in c.iter_mut() {
                    *b = _mm_aesenc_si128(*b, *rkey);
                }
            }
            let mut out = [Block::default(); 8];
            for (o, b) in out.iter_mut().zip(c.iter()) {
                *o = Block(_mm_aesenclast_si128(*b, keys[10]));
            }
            out
        }
    }
}

macro_rules! expand_round {
    ($keys:expr, $pos:expr, $round:literal) => {{
        let mut t1 = $keys[$pos - 1];
        let mut t2;
        let mut t3;

        t2 = _mm_aeskeygenassist_si128::<$round>(t1);
        t2 = _mm_shuffle_epi32::<0xff>(t2);
        t3 = _mm_slli_si128::<0x4>(t1);
        t1 = _mm_xor_si128(t1, t3);
        t3 = _mm_slli_si128::<0x4>(t3);
        t1 = _mm_xor_si128(t1, t3);
        t3 = _mm_slli_si128::<0x4>(t3);
        t1 = _mm_xor_si128(t1, t3);
        t1 = _mm_xor_si128(t1, t2);

        $keys[$pos] = t1;
    }};
}

#[inline(always)]
fn expand(key: __m128i) -> [__m128i; 11] {
    unsafe {
        let mut keys = [_mm_setzero_si128(); 11];
        keys[0] = key;
        expand_round!(keys, 1, 0x01);
        expand_round!(keys, 2, 0x02);
        expand_round!(keys, 3, 0x04);
        expand_round!(keys, 4, 0x08);
        expand_round!(keys, 5, 0x10);
        expand_round!(keys, 6, 0x20);
        expand_round!(keys, 7, 0x40);
        expand_round!(keys, 8, 0x80);
        expand_round!(keys, 9, 0x1B);
        expand_round!(keys, 10, 0x36);
        keys
    }
}

union __U128 {
    vector: __m128i,
    bytes: u128,
}

/// AES-128 with a fixed, publicly known key.
pub const FIXED_KEY_AES128: Aes128 = Aes128 {
    rkeys: unsafe {
        [
            (__U128 {
                bytes: 0x15B5_32C2_F193_1C94,
            })
            .vector,
            (__U128 {
                bytes: 0xD754_876D_FE7E_6726,
            })
            .vector,
            (__U128 {
                bytes: 0xA7EB_4F98_1986_CFCF,
            })
            .vector,
            (__U128 {
                bytes: 0x80E6_BBED_F88D_E8C9,
            })
            .vector,
            (__U128 {
                bytes: 0x1210_4B44_43D8_B35C,
            })
            .vector,
            (__U128 {
                bytes: 0xF467_7B3C_8DCB_047B,
            })
            .vector,
            (__U128 {
                bytes: 0x578C_DBAC_AED1_C9DC,
            })
            .vector,
            (__U128 {
                bytes: 0x295D_2051_CF6F_5E25,
            })
            .vector,
            (__U128 {
                bytes: 0x0CE1_FD36_50DE_FFAB,
            })
            .vector,
            (__U128 {
                bytes: 0xDDFA_4FE9_E2CD_2D23,
            })
            .vector,
            (__U128 {
                bytes: 0x96F6_769D_AF14_18D2,
            })
            .vector,
        ]
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_128() {
        let key = Block::from(0x3C4FCF098815F7ABA6D2AE2816157E2Bu128);
        let pt = Block::from(0x2A179373117E3DE9969F402EE2BEC16Bu128);
        let cipher = Aes128::new(key);
        let ct = cipher.encrypt(pt);
        assert_eq!(ct, Block::from(0x97EF6624F3CA9EA860367A0DB47BD73Au128));
    }

    #[test]
    fn test_encrypt8_matches_encrypt() {
        let key = rand::random::<Block>();
        let cipher = Aes128::new(key);
        let m: [Block; 8] = rand::random();
        let c = cipher.encrypt8(m);
        for (m, c) in m.iter().zip(c.iter()) {
            assert_eq!(cipher.encrypt(*m), *c);
        }
    }
}
