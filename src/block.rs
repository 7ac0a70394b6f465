// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Defines a block as a 128-bit value, and implements block-related functions,
//! including arithmetic in the field `GF(2^128)`.

use std::{
    arch::x86_64::*,
    hash::{Hash, Hasher},
};

/// A 128-bit chunk.
#[derive(Clone, Copy)]
pub struct Block(pub __m128i);

union __U128 {
    vector: __m128i,
    bytes: u128,
}

const ZERO: __m128i = unsafe { (__U128 { bytes: 0 }).vector };
const ONE: __m128i = unsafe { (__U128 { bytes: 1 }).vector };

impl Block {
    /// The all-zero block.
    pub const ZERO: Block = Block(ZERO);
    /// The block encoding the field element one.
    pub const ONE: Block = Block(ONE);

    /// Convert into a pointer.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.as_ref().as_ptr()
    }

    /// Convert into a mutable pointer.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut().as_mut_ptr()
    }

    /// Return the low 64 bits.
    #[inline]
    pub fn low_u64(&self) -> u64 {
        u128::from(*self) as u64
    }

    /// Return the high 64 bits.
    #[inline]
    pub fn high_u64(&self) -> u64 {
        (u128::from(*self) >> 64) as u64
    }

    /// Return the low 32 bits.
    #[inline]
    pub fn low_u32(&self) -> u32 {
        u128::from(*self) as u32
    }

    /// Carryless multiplication, returning the low and high halves of the
    /// 256-bit product.
    ///
    /// This code is adapted from the EMP toolkit's implementation.
    #[inline]
    pub fn clmul(self, rhs: Self) -> (Self, Self) {
        unsafe {
            let x = self.0;
            let y = rhs.0;
            let zero = _mm_clmulepi64_si128::<0x00>(x, y);
            let one = _mm_clmulepi64_si128::<0x10>(x, y);
            let two = _mm_clmulepi64_si128::<0x01>(x, y);
            let three = _mm_clmulepi64_si128::<0x11>(x, y);
            let tmp = _mm_xor_si128(one, two);
            let ll = _mm_slli_si128::<8>(tmp);
            let rl = _mm_srli_si128::<8>(tmp);
            let x = _mm_xor_si128(zero, ll);
            let y = _mm_xor_si128(three, rl);
            (Block(x), Block(y))
        }
    }

    /// Reduce a 256-bit carryless product modulo `x^128 + x^7 + x^2 + x + 1`.
    #[inline]
    pub fn gf128_reduce(lo: Self, hi: Self) -> Self {
        unsafe {
            // The modulus, less the x^128 term.
            const MODULUS: i64 = 0b1000_0111;
            let modulus = _mm_set_epi64x(0, MODULUS);
            let mut lo = lo.0;
            let mut hi = hi.0;
            let tmp = _mm_clmulepi64_si128::<0x01>(hi, modulus);
            lo = _mm_xor_si128(lo, _mm_slli_si128::<8>(tmp));
            hi = _mm_xor_si128(hi, _mm_srli_si128::<8>(tmp));
            let tmp = _mm_clmulepi64_si128::<0x00>(hi, modulus);
            Block(_mm_xor_si128(lo, tmp))
        }
    }

    /// Multiplication in `GF(2^128)`.
    #[inline]
    pub fn gf128_mul(self, rhs: Self) -> Self {
        let (lo, hi) = self.clmul(rhs);
        Self::gf128_reduce(lo, hi)
    }

    /// Squaring in `GF(2^128)`.
    #[inline]
    pub fn gf128_square(self) -> Self {
        self.gf128_mul(self)
    }

    /// Multiplicative inverse in `GF(2^128)`, computed as `self^(2^128 - 2)`.
    ///
    /// The inverse of zero is zero.
    pub fn gf128_inv(self) -> Self {
        // 2^128 - 2 = 0b111...110, i.e. 127 high bits set.
        let mut result = Block::ONE;
        let mut pow = self;
        for _ in 0..127 {
            pow = pow.gf128_square();
            result = result.gf128_mul(pow);
        }
        result
    }

    /// Try to create a `Block` from a slice of bytes. The slice must have
    /// exactly 16 bytes.
    #[inline]
    pub fn try_from_slice(bytes_slice: &[u8]) -> Option<Self> {
        if bytes_slice.len() != 16 {
            return None;
        }
        let mut bytes = [0; 16];
        bytes[..16].clone_from_slice(&bytes_slice[..16]);
        Some(Block::from(bytes))
    }
}

impl Default for Block {
    #[inline]
    fn default() -> Self {
        unsafe { Block(_mm_setzero_si128()) }
    }
}

impl PartialEq for Block {
    #[inline]
    fn eq(&self, other: &Block) -> bool {
        unsafe {
            let neq = _mm_xor_si128(self.0, other.0);
            _mm_test_all_zeros(neq, neq) != 0
        }
    }
}

impl Eq for Block {}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        u128::from(*self).cmp(&u128::from(*other))
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl AsRef<[u8]> for Block {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        unsafe { &*(self as *const Block as *const [u8; 16]) }
    }
}

impl AsMut<[u8]> for Block {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        unsafe { &mut *(self as *mut Block as *mut [u8; 16]) }
    }
}

impl std::ops::BitAnd for Block {
    type Output = Block;
    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        unsafe { Block(_mm_and_si128(self.0, rhs.0)) }
    }
}

impl std::ops::BitAndAssign for Block {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        unsafe { self.0 = _mm_and_si128(self.0, rhs.0) }
    }
}

impl std::ops::BitOr for Block {
    type Output = Block;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        unsafe { Block(_mm_or_si128(self.0, rhs.0)) }
    }
}

impl std::ops::BitXor for Block {
    type Output = Block;
    #[inline]
    fn bitxor(self, rhs: Self) -> Self {
        unsafe { Block(_mm_xor_si128(self.0, rhs.0)) }
    }
}

impl std::ops::BitXorAssign for Block {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Self) {
        unsafe { self.0 = _mm_xor_si128(self.0, rhs.0) }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let block: [u8; 16] = (*self).into();
        for byte in block.iter() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl rand::distributions::Distribution<Block> for rand::distributions::Standard {
    #[inline]
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Block {
        Block::from(rng.gen::<u128>())
    }
}

impl From<Block> for u128 {
    #[inline]
    fn from(m: Block) -> u128 {
        unsafe { *(&m as *const _ as *const u128) }
    }
}

impl From<u128> for Block {
    #[inline]
    fn from(m: u128) -> Self {
        unsafe { std::mem::transmute(m) }
    }
}

impl From<u64> for Block {
    #[inline]
    fn from(m: u64) -> Self {
        Block::from(m as u128)
    }
}

impl From<Block> for __m128i {
    #[inline]
    fn from(m: Block) -> __m128i {
        m.0
    }
}

impl From<__m128i> for Block {
    #[inline]
    fn from(m: __m128i) -> Self {
        Block(m)
    }
}

impl From<Block> for [u8; 16] {
    #[inline]
    fn from(m: Block) -> [u8; 16] {
        unsafe { *(&m as *const _ as *const [u8; 16]) }
    }
}

impl From<[u8; 16]> for Block {
    #[inline]
    fn from(m: [u8; 16]) -> Self {
        unsafe { std::mem::transmute(m) }
    }
}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let v: u128 = (*self).into();
        v.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xor() {
        let x = rand::random::<Block>();
        let y = rand::random::<Block>();
        let z = x ^ y;
        let z = z ^ y;
        assert_eq!(x, z);
    }

    #[test]
    fn test_conversion() {
        let x = rand::random::<u128>();
        let x_ = u128::from(Block::from(x));
        assert_eq!(x, x_);
    }

    #[test]
    fn test_gf128_mul_one() {
        let x = rand::random::<Block>();
        assert_eq!(x.gf128_mul(Block::ONE), x);
        assert_eq!(Block::ONE.gf128_mul(x), x);
        assert_eq!(x.gf128_mul(Block::ZERO), Block::ZERO);
    }

    #[test]
    fn test_gf128_mul_commutes() {
        for _ in 0..10 {
            let x = rand::random::<Block>();
            let y = rand::random::<Block>();
            assert_eq!(x.gf128_mul(y), y.gf128_mul(x));
        }
    }

    #[test]
    fn test_gf128_mul_distributes() {
        for _ in 0..10 {
            let x = rand::random::<Block>();
            let y = rand::random::<Block>();
            let z = rand::random::<Block>();
            assert_eq!(x.gf128_mul(y ^ z), x.gf128_mul(y) ^ x.gf128_mul(z));
        }
    }

    #[test]
    fn test_gf128_mul_associates() {
        for _ in 0..10 {
            let x = rand::random::<Block>();
            let y = rand::random::<Block>();
            let z = rand::random::<Block>();
            assert_eq!(x.gf128_mul(y).gf128_mul(z), x.gf128_mul(y.gf128_mul(z)));
        }
    }

    #[test]
    fn test_gf128_inv() {
        for _ in 0..10 {
            let x = rand::random::<Block>();
            if x == Block::ZERO {
                continue;
            }
            assert_eq!(x.gf128_mul(x.gf128_inv()), Block::ONE);
        }
    }
}
