// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The block-level compute stage.
//!
//! [`BlockwiseGemm`] multiplies the A and B tiles of one scratch stage into
//! the per-worker accumulators. Worker `w` owns the
//! `m_per_thread × n_per_thread` sub-tile at row `w / grid_n`, column
//! `w % grid_n` of the compute grid. For each stage it gathers its A and
//! B panels out of scratch and hands them to a [`MatrixFma`] unit.

use std::fmt;
use tile_planner::TileConfig;

/// A multiply-accumulate unit over one worker's panels.
///
/// The backend is a type parameter of the kernel, chosen once per launch.
pub trait MatrixFma: Copy + Default + Send + Sync + fmt::Debug + 'static {
    /// Backend name used in kernel names and logs.
    const NAME: &'static str;

    /// `c[i·n + j] += Σ_p a[p·m + i] · b[p·n + j]` for `p < k`.
    ///
    /// The sum over `p` is accumulated in ascending order for every
    /// element.
    fn fma(&self, k: usize, a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize);
}

/// One multiply and one add per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarFma;

impl MatrixFma for ScalarFma {
    const NAME: &'static str = "scalar";

    fn fma(&self, k: usize, a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize) {
        for p in 0..k {
            let bp = &b[p * n..(p + 1) * n];
            for (i, &av) in a[p * m..(p + 1) * m].iter().enumerate() {
                for (cv, &bv) in c[i * n..(i + 1) * n].iter_mut().zip(bp) {
                    *cv += av * bv;
                }
            }
        }
    }
}

/// 4×4 output fragments held in registers across the whole `k` loop, with
/// fused multiply-adds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentFma;

impl FragmentFma {
    pub const FRAGMENT: usize = 4;
}

impl MatrixFma for FragmentFma {
    const NAME: &'static str = "fragment";

    fn fma(&self, k: usize, a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize) {
        const F: usize = FragmentFma::FRAGMENT;
        for i0 in (0..m).step_by(F) {
            let mi = F.min(m - i0);
            for j0 in (0..n).step_by(F) {
                let nj = F.min(n - j0);
                let mut frag = [[0.0f32; F]; F];
                for i in 0..mi {
                    frag[i][..nj].copy_from_slice(&c[(i0 + i) * n + j0..(i0 + i) * n + j0 + nj]);
                }
                for p in 0..k {
                    let ap = &a[p * m + i0..p * m + i0 + mi];
                    let bp = &b[p * n + j0..p * n + j0 + nj];
                    for (row, &av) in frag.iter_mut().zip(ap) {
                        for (acc, &bv) in row.iter_mut().zip(bp) {
                            *acc = av.mul_add(bv, *acc);
                        }
                    }
                }
                for i in 0..mi {
                    c[(i0 + i) * n + j0..(i0 + i) * n + j0 + nj].copy_from_slice(&frag[i][..nj]);
                }
            }
        }
    }
}

/// The accumulators of every worker of a group.
#[derive(Debug, Clone)]
pub struct AccumulatorTile {
    data: Vec<f32>,
    m_per_thread: usize,
    n_per_thread: usize,
    grid_n: usize,
}

impl AccumulatorTile {
    pub fn new(tile: &TileConfig) -> Self {
        let (gm, gn) = tile.compute_grid();
        Self {
            data: vec![0.0; gm * gn * tile.m_per_thread * tile.n_per_thread],
            m_per_thread: tile.m_per_thread,
            n_per_thread: tile.n_per_thread,
            grid_n: gn,
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    fn per_worker(&self) -> usize {
        self.m_per_thread * self.n_per_thread
    }

    pub fn workers(&self) -> usize {
        self.data.len() / self.per_worker()
    }

    /// Row-major `m_per_thread × n_per_thread` accumulators of `worker`.
    pub fn worker(&self, worker: usize) -> &[f32] {
        let len = self.per_worker();
        &self.data[worker * len..(worker + 1) * len]
    }

    pub fn worker_mut(&mut self, worker: usize) -> &mut [f32] {
        let len = self.per_worker();
        &mut self.data[worker * len..(worker + 1) * len]
    }

    /// The accumulator of block-local element `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let worker = (row / self.m_per_thread) * self.grid_n + col / self.n_per_thread;
        let local = (row % self.m_per_thread) * self.n_per_thread + col % self.n_per_thread;
        self.data[worker * self.per_worker() + local]
    }
}

/// Multiplies one scratch stage into the accumulators.
#[derive(Debug, Clone)]
pub struct BlockwiseGemm<F: MatrixFma> {
    fma: F,
    k0: usize,
    k1: usize,
    a_k0_stride: usize,
    b_k0_stride: usize,
    m_per_thread: usize,
    n_per_thread: usize,
    grid_n: usize,
    workers: usize,
    a_panel: Vec<f32>,
    b_panel: Vec<f32>,
}

impl<F: MatrixFma> BlockwiseGemm<F> {
    /// Compute stage for `tile`. The scratch tiles are `[K0, M, K1]` and
    /// `[K0, N, K1]` with the tile's extra lanes after every row.
    pub fn new(fma: F, tile: &TileConfig) -> Self {
        let (gm, gn) = tile.compute_grid();
        let k = tile.k_per_block();
        Self {
            fma,
            k0: tile.k0_per_block,
            k1: tile.k1,
            a_k0_stride: (tile.m_per_block + tile.scratch_extra_m) * tile.k1,
            b_k0_stride: (tile.n_per_block + tile.scratch_extra_n) * tile.k1,
            m_per_thread: tile.m_per_thread,
            n_per_thread: tile.n_per_thread,
            grid_n: gn,
            workers: gm * gn,
            a_panel: vec![0.0; k * tile.m_per_thread],
            b_panel: vec![0.0; k * tile.n_per_thread],
        }
    }

    /// `acc += A · B` over one stage.
    pub fn run(&mut self, a: &[f32], b: &[f32], acc: &mut AccumulatorTile) {
        let (mpt, npt, k1) = (self.m_per_thread, self.n_per_thread, self.k1);
        let k = self.k0 * k1;
        for w in 0..self.workers {
            let (row0, col0) = ((w / self.grid_n) * mpt, (w % self.grid_n) * npt);
            for k0 in 0..self.k0 {
                for kk in 0..k1 {
                    let p = k0 * k1 + kk;
                    let a_base = k0 * self.a_k0_stride + kk;
                    let b_base = k0 * self.b_k0_stride + kk;
                    for i in 0..mpt {
                        self.a_panel[p * mpt + i] = a[a_base + (row0 + i) * k1];
                    }
                    for j in 0..npt {
                        self.b_panel[p * npt + j] = b[b_base + (col0 + j) * k1];
                    }
                }
            }
            self.fma.fma(k, &self.a_panel, &self.b_panel, acc.worker_mut(w), mpt, npt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn naive(k: usize, a: &[f32], b: &[f32], m: usize, n: usize) -> Vec<f32> {
        let mut c = vec![0.0f32; m * n];
        for i in 0..m {
            for j in 0..n {
                for p in 0..k {
                    c[i * n + j] += a[p * m + i] * b[p * n + j];
                }
            }
        }
        c
    }

    #[test]
    fn test_scalar_matches_naive_exactly() {
        let (k, m, n) = (5, 3, 4);
        let a: Vec<f32> = (0..k * m).map(|i| (i % 7) as f32 - 3.0).collect();
        let b: Vec<f32> = (0..k * n).map(|i| (i % 5) as f32 * 0.5).collect();
        let mut c = vec![0.0; m * n];
        ScalarFma.fma(k, &a, &b, &mut c, m, n);
        assert_eq!(c, naive(k, &a, &b, m, n));
    }

    proptest! {
        #[test]
        fn prop_fragment_matches_scalar(
            k in 1usize..12,
            m in 1usize..10,
            n in 1usize..10,
            seed in 0u32..1000,
        ) {
            let val = |i: usize| (((i as u32).wrapping_mul(2654435761).wrapping_add(seed) % 200) as f32 - 100.0) / 50.0;
            let a: Vec<f32> = (0..k * m).map(val).collect();
            let b: Vec<f32> = (0..k * n).map(|i| val(i + 7)).collect();
            let mut c_scalar: Vec<f32> = (0..m * n).map(|i| val(i + 13)).collect();
            let mut c_frag = c_scalar.clone();
            ScalarFma.fma(k, &a, &b, &mut c_scalar, m, n);
            FragmentFma.fma(k, &a, &b, &mut c_frag, m, n);
            for (s, f) in c_scalar.iter().zip(&c_frag) {
                prop_assert!((s - f).abs() <= 1e-4 * s.abs().max(1.0), "{s} vs {f}");
            }
        }
    }

    #[test]
    fn test_accumulator_get_maps_to_owner() {
        let tile = TileConfig::preset("small").unwrap();
        let mut acc = AccumulatorTile::new(&tile);
        assert_eq!(acc.workers(), 16);
        // Worker 5 sits at compute-grid (1, 1): rows 4..8, cols 4..8.
        acc.worker_mut(5)[2 * 4 + 3] = 7.0;
        assert_eq!(acc.get(6, 7), 7.0);
        acc.clear();
        assert_eq!(acc.get(6, 7), 0.0);
    }

    /// A and B tiles of one stage filled from `a(m, k)` and `b(n, k)`.
    fn stage(tile: &TileConfig, a: impl Fn(usize, usize) -> f32, b: impl Fn(usize, usize) -> f32) -> (Vec<f32>, Vec<f32>) {
        let mut sa = vec![f32::NAN; tile.a_tile_lanes()];
        let mut sb = vec![f32::NAN; tile.b_tile_lanes()];
        let (ma, nb) = (tile.m_per_block + tile.scratch_extra_m, tile.n_per_block + tile.scratch_extra_n);
        for k0 in 0..tile.k0_per_block {
            for k1 in 0..tile.k1 {
                let k = k0 * tile.k1 + k1;
                for m in 0..tile.m_per_block {
                    sa[(k0 * ma + m) * tile.k1 + k1] = a(m, k);
                }
                for n in 0..tile.n_per_block {
                    sb[(k0 * nb + n) * tile.k1 + k1] = b(n, k);
                }
            }
        }
        (sa, sb)
    }

    fn check_blockwise<F: MatrixFma>(fma: F, tile: TileConfig) {
        let a = |m: usize, k: usize| ((m * 3 + k) % 11) as f32 - 5.0;
        let b = |n: usize, k: usize| ((n + 2 * k) % 7) as f32 * 0.25;
        let (sa, sb) = stage(&tile, a, b);
        let mut acc = AccumulatorTile::new(&tile);
        let mut gemm = BlockwiseGemm::new(fma, &tile);
        gemm.run(&sa, &sb, &mut acc);
        gemm.run(&sa, &sb, &mut acc);
        for m in 0..tile.m_per_block {
            for n in 0..tile.n_per_block {
                let expected: f32 = (0..tile.k_per_block()).map(|k| 2.0 * a(m, k) * b(n, k)).sum();
                assert!((acc.get(m, n) - expected).abs() < 1e-3, "({m}, {n})");
            }
        }
    }

    #[test]
    fn test_blockwise_gemm_scalar() {
        check_blockwise(ScalarFma, TileConfig::preset("small").unwrap());
    }

    #[test]
    fn test_blockwise_gemm_fragment_with_scratch_padding() {
        check_blockwise(
            FragmentFma,
            TileConfig {
                scratch_extra_m: 1,
                scratch_extra_n: 3,
                ..TileConfig::default()
            },
        );
    }
}
