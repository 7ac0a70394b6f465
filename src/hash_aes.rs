//! Implementations of correlation-robust hash functions based on fixed-key
//! AES.

use crate::{Aes128, Block, FIXED_KEY_AES128};

/// AES-based correlation-robust hash function.
///
/// The hash function is the standard Davies-Meyer-style construction
/// `H(x) = π(x) ⊕ x` (cf. <https://eprint.iacr.org/2019/074>, §7.2), where
/// `π` is AES under a (possibly fixed) key.
pub struct AesHash {
    aes: Aes128,
}

/// `AesHash` with a fixed key.
pub const AES_HASH: AesHash = AesHash {
    aes: FIXED_KEY_AES128,
};

impl AesHash {
    /// Initialize the hash function using `key`.
    #[inline]
    pub fn new(key: Block) -> Self {
        let aes = Aes128::new(key);
        AesHash { aes }
    }

    /// Correlation-robust hash function for 128-bit inputs.
    ///
    /// The function computes `π(x) ⊕ x`.
    #[inline]
    pub fn cr_hash(&self, x: Block) -> Block {
        self.aes.encrypt(x) ^ x
    }

    /// Eight-way batched variant of `cr_hash`.
    #[inline]
    pub fn cr_hash8(&self, xs: [Block; 8]) -> [Block; 8] {
        let mut out = self.aes.encrypt8(xs);
        for (o, x) in out.iter_mut().zip(xs.iter()) {
            *o ^= *x;
        }
        out
    }

    /// Hash a slice of blocks into `out`, processing eight blocks at a time.
    pub fn cr_hash_blocks(&self, xs: &[Block], out: &mut [Block]) {
        debug_assert_eq!(xs.len(), out.len());
        let mut chunks = xs.chunks_exact(8);
        let mut outs = out.chunks_exact_mut(8);
        for (c, o) in (&mut chunks).zip(&mut outs) {
            let mut m = [Block::default(); 8];
            m.copy_from_slice(c);
            o.copy_from_slice(&self.cr_hash8(m));
        }
        for (x, o) in chunks
            .remainder()
            .iter()
            .zip(outs.into_remainder().iter_mut())
        {
            *o = self.cr_hash(*x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batched_matches_scalar() {
        let hasher = AesHash::new(rand::random::<Block>());
        let xs: Vec<Block> = (0..37).map(|_| rand::random()).collect();
        let mut out = vec![Block::default(); xs.len()];
        hasher.cr_hash_blocks(&xs, &mut out);
        for (x, o) in xs.iter().zip(out.iter()) {
            assert_eq!(hasher.cr_hash(*x), *o);
        }
    }
}
