// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

//! Gaussian elimination on the dense residual left after peeling.
//!
//! Both solvers reduce the residual rows to reduced row echelon form and then
//! assign the pivot positions of the dense tail, folding the (already fixed)
//! free positions into the right-hand side. The residual is tiny — at most
//! the dense band width — so quadratic elimination is fine.

use crate::{
    okvs::{assign_row, gf128_scale_xor_row, xor_row, PaxosValue},
    utils::Matrix,
    Block, Error,
};

/// `dst ^= src` between two rows of the same matrix.
fn mat_xor_row<V: PaxosValue>(m: &mut Matrix<V>, dst: usize, src: usize) {
    debug_assert_ne!(dst, src);
    let w = m.cols();
    let hi = dst.max(src);
    let (head, tail) = m.data_mut().split_at_mut(hi * w);
    if dst == hi {
        xor_row(&mut tail[..w], &head[src * w..src * w + w]);
    } else {
        xor_row(&mut head[dst * w..dst * w + w], &tail[..w]);
    }
}

/// `dst ^= scalar * src` between two rows of the same matrix.
fn mat_scale_xor_row<V: PaxosValue>(m: &mut Matrix<V>, dst: usize, src: usize, scalar: Block) {
    debug_assert_ne!(dst, src);
    let w = m.cols();
    let hi = dst.max(src);
    let (head, tail) = m.data_mut().split_at_mut(hi * w);
    if dst == hi {
        gf128_scale_xor_row(&mut tail[..w], &head[src * w..src * w + w], scalar);
    } else {
        gf128_scale_xor_row(&mut head[dst * w..dst * w + w], &tail[..w], scalar);
    }
}

/// Solve the binary residual: `masks[i] · x = y[i]` over GF(2), where each
/// mask is a bit-row of dense coefficients and each `y` row is a group
/// element. Pivot positions of `p_dense` are overwritten; free positions keep
/// their initial (zero or random) value.
pub(crate) fn solve_binary<V: PaxosValue>(
    masks: &mut [u128],
    y: &mut Matrix<V>,
    p_dense: &mut [V],
    width: usize,
) -> Result<(), Error> {
    let r = masks.len();
    let mut pivots: Vec<(usize, u32)> = Vec::with_capacity(r);
    for i in 0..r {
        for &(pr, pc) in pivots.iter() {
            if (masks[i] >> pc) & 1 == 1 {
                let m = masks[pr];
                masks[i] ^= m;
                mat_xor_row(y, i, pr);
            }
        }
        if masks[i] == 0 {
            return Err(Error::EncodeFailed);
        }
        let pc = masks[i].trailing_zeros();
        for &(pr, _) in pivots.iter() {
            if (masks[pr] >> pc) & 1 == 1 {
                let m = masks[i];
                masks[pr] ^= m;
                mat_xor_row(y, pr, i);
            }
        }
        pivots.push((i, pc));
    }
    // Install the pivots: x_pc = y_i ⊕ Σ_{j ∈ mask, j ≠ pc} p_dense[j].
    let mut acc = vec![V::default(); width];
    for &(pr, pc) in pivots.iter() {
        assign_row(&mut acc, y.row(pr));
        let mut m = masks[pr] & !(1u128 << pc);
        while m != 0 {
            let j = m.trailing_zeros() as usize;
            m &= m - 1;
            xor_row(&mut acc, &p_dense[j * width..(j + 1) * width]);
        }
        assign_row(&mut p_dense[pc as usize * width..(pc as usize + 1) * width], &acc);
    }
    Ok(())
}

/// Solve the `GF(2^128)` residual: full-width pivot search, inverse
/// normalization, block-XOR elimination.
pub(crate) fn solve_gf128<V: PaxosValue>(
    coefs: &mut Matrix<Block>,
    y: &mut Matrix<V>,
    p_dense: &mut [V],
    width: usize,
) -> Result<(), Error> {
    let r = y.rows();
    let dense_size = coefs.cols();
    let mut pivots: Vec<(usize, usize)> = Vec::with_capacity(r);
    for i in 0..r {
        for k in 0..pivots.len() {
            let (pr, pc) = pivots[k];
            let c = coefs.row(i)[pc];
            if c != Block::ZERO {
                mat_scale_xor_row(coefs, i, pr, c);
                mat_scale_xor_row(y, i, pr, c);
            }
        }
        let pc = match coefs.row(i).iter().position(|&c| c != Block::ZERO) {
            Some(pc) => pc,
            None => return Err(Error::EncodeFailed),
        };
        // Normalize so the pivot coefficient is one.
        let inv = coefs.row(i)[pc].gf128_inv();
        for c in coefs.row_mut(i).iter_mut() {
            *c = c.gf128_mul(inv);
        }
        for v in y.row_mut(i).iter_mut() {
            *v = v.gf128_scale(inv);
        }
        for k in 0..pivots.len() {
            let (pr, _) = pivots[k];
            let c = coefs.row(pr)[pc];
            if c != Block::ZERO {
                mat_scale_xor_row(coefs, pr, i, c);
                mat_scale_xor_row(y, pr, i, c);
            }
        }
        pivots.push((i, pc));
    }
    let mut acc = vec![V::default(); width];
    for &(pr, pc) in pivots.iter() {
        assign_row(&mut acc, y.row(pr));
        for j in 0..dense_size {
            let c = coefs.row(pr)[j];
            if j == pc || c == Block::ZERO {
                continue;
            }
            gf128_scale_xor_row(&mut acc, &p_dense[j * width..(j + 1) * width], c);
        }
        assign_row(&mut p_dense[pc * width..(pc + 1) * width], &acc);
    }
    Ok(())
}
