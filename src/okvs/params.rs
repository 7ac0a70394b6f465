// -*- mode: rust; -*-
//
// This file is part of `sherbet`.
// Copyright © 2021 Galois, Inc.
// See LICENSE for licensing information.

use crate::{utils::log2_ceil, Error};

/// The field the dense band lives in.
///
/// The binary band works for any XOR-group value type; the `GF(2^128)` band
/// is shorter but requires the value type to carry a field scalar action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenseType {
    /// Dense coefficients are bits of the key hash.
    Binary,
    /// Dense coefficients are successive `GF(2^128)` squarings of the key
    /// hash.
    GF128,
}

/// Geometric parameters of a single-bin Paxos encoding, derived from the item
/// count, the row weight, and the statistical security parameter.
#[derive(Clone, Copy, Debug)]
pub struct PaxosParam {
    /// Number of sparse columns.
    pub sparse_size: usize,
    /// Number of dense columns (bits for `Binary`, field elements for
    /// `GF128`).
    pub dense_size: usize,
    /// Row weight, i.e. the number of sparse positions per key.
    pub weight: usize,
    /// Statistical security parameter.
    pub ssp: usize,
    /// The dense band field.
    pub dense_type: DenseType,
}

impl PaxosParam {
    /// Derive parameters for encoding `nitems` items with row weight
    /// `weight`.
    ///
    /// The sparse expansion factors are chosen so that peeling leaves a
    /// residual no larger than the dense band with probability at least
    /// `1 - 2^-ssp`; weight 3 is the intended default, weight 2 is permitted
    /// at the cost of a larger expansion.
    pub fn new(
        nitems: usize,
        weight: usize,
        ssp: usize,
        dense_type: DenseType,
    ) -> Result<Self, Error> {
        if nitems == 0 || weight < 2 {
            return Err(Error::InvalidParameters { nitems, weight });
        }
        let log_n = log2_ceil(nitems) as f64;
        let (expansion, gap) = if weight == 2 {
            // Fitted curve for the weight-2 residual; the gap grows roughly
            // linearly in ssp with a slope depending on log2(n).
            let lambda_vs_gap = 7.529 / (log_n.max(3.56) - 2.556) + 0.61;
            let gap = (ssp as f64 / lambda_vs_gap + 1.9).ceil() as usize;
            (2.75, gap)
        } else {
            // At expansion 2.4 the weight-3 hypergraph peels almost
            // completely; the residual is logarithmic in n.
            (2.4, log2_ceil(nitems) as usize + 5)
        };
        let sparse_size = ((nitems as f64 * expansion).ceil() as usize).max(weight + 1);
        let dense_size = match dense_type {
            DenseType::Binary => gap + ssp,
            DenseType::GF128 => gap,
        };
        if dense_type == DenseType::Binary && dense_size > 128 {
            // The binary band is drawn from the 128-bit key hash.
            return Err(Error::InvalidParameters { nitems, weight });
        }
        Ok(Self {
            sparse_size,
            dense_size,
            weight,
            ssp,
            dense_type,
        })
    }

    /// Total encoding size, in values.
    #[inline]
    pub fn size(&self) -> usize {
        self.sparse_size + self.dense_size
    }

    /// The number of bits needed to index `sparse_size + 1` values, rounded
    /// up to a machine integer width. Used to pick the solver's index type.
    #[inline]
    pub fn idx_bits(&self) -> u32 {
        let bits = log2_ceil(self.sparse_size + 1);
        ((bits + 7) / 8) * 8
    }
}
