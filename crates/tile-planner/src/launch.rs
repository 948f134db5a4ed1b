// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Launch plans and the validity check run before every launch.
//!
//! A launch is valid only if the operand grid descriptors, the tile
//! configuration and the tile order agree exactly. Anything else is
//! reported here, before a single group runs: a launch either fails the
//! check or computes the right answer.

use crate::{LoopShape, PipelineKind, PlanError, TileConfig, TileOrder};
use scratch_memory::ScratchLayout;
use std::fmt;
use tensor_desc::TensorDescriptor;

/// Everything a launch needs besides the operand data.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub tile: TileConfig,
    /// Number of work-groups.
    pub grid_size: usize,
    /// Workers per group.
    pub block_size: usize,
    pub k_batch: usize,
    pub m_tiles: usize,
    pub n_tiles: usize,
    pub order_name: &'static str,
    pub loop_shape: LoopShape,
    pub c_shuffle: bool,
    pub scratch: ScratchLayout,
}

impl LaunchPlan {
    /// Plans a launch of `order.total_tiles()` groups, each reducing
    /// `k_per_batch` elements (already padded to the tile).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tile: &TileConfig,
        order: &dyn TileOrder,
        m_tiles: usize,
        n_tiles: usize,
        k_batch: usize,
        k_per_batch: usize,
        pipeline: PipelineKind,
        c_shuffle: bool,
    ) -> Self {
        let loop_shape = LoopShape::new(pipeline, k_per_batch, tile.k_per_block());
        let plan = Self {
            tile: tile.clone(),
            grid_size: order.total_tiles(),
            block_size: tile.block_size,
            k_batch,
            m_tiles,
            n_tiles,
            order_name: order.name(),
            loop_shape,
            c_shuffle,
            scratch: tile.scratch_layout(pipeline, c_shuffle),
        };
        tracing::debug!("launch plan: {}", plan.summary());
        plan
    }

    /// Scratch bytes each group needs.
    pub fn scratch_bytes(&self) -> usize {
        self.scratch.bytes()
    }

    /// Total barriers across the launch, excluding the epilogue.
    pub fn total_barriers(&self) -> usize {
        self.grid_size * self.loop_shape.barriers_per_group()
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} groups × {} workers ({}×{} tiles, k-batch {}, {} order), \
             {} B scratch, {}",
            self.grid_size,
            self.block_size,
            self.m_tiles,
            self.n_tiles,
            self.k_batch,
            self.order_name,
            self.scratch_bytes(),
            self.loop_shape,
        )
    }
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Checks that a launch over the given grid descriptors is correct.
///
/// - `a_grid`: `[KBatch, K0, M, K1]`
/// - `b_grid`: `[KBatch, K0, N, K1]`
/// - `c_grid`: `[M, N]`
///
/// The tile must divide every dimension it walks, the reduction split must
/// agree between A and B, and the tile order must serve exactly one group
/// per output tile and batch.
pub fn check_validity(
    a_grid: &TensorDescriptor,
    b_grid: &TensorDescriptor,
    c_grid: &TensorDescriptor,
    tile: &TileConfig,
    order: &dyn TileOrder,
) -> Result<(), PlanError> {
    tile.validate()?;

    let a = a_grid.lengths();
    let b = b_grid.lengths();
    let c = c_grid.lengths();
    if a.len() != 4 || b.len() != 4 || c.len() != 2 {
        return Err(unsupported(format!(
            "grid ranks A{a:?} B{b:?} C{c:?}, expected 4, 4 and 2"
        )));
    }
    let [k_batch, k0, m, k1] = [a[0], a[1], a[2], a[3]];
    let n = b[2];

    if b[0] != k_batch || b[1] != k0 || b[3] != k1 {
        return Err(unsupported(format!(
            "A and B disagree on the reduction split: {a:?} vs {b:?}"
        )));
    }
    if c[0] != m || c[1] != n {
        return Err(unsupported(format!("C is {c:?}, expected [{m}, {n}]")));
    }
    if k1 != tile.k1 {
        return Err(unsupported(format!("grid K1 {k1} differs from tile K1 {}", tile.k1)));
    }
    if m % tile.m_per_block != 0 || n % tile.n_per_block != 0 || k0 % tile.k0_per_block != 0 {
        return Err(unsupported(format!(
            "M={m} N={n} K0={k0} not divisible by tile {}×{}×{}",
            tile.m_per_block, tile.n_per_block, tile.k0_per_block
        )));
    }

    if !order.is_valid() {
        return Err(PlanError::InvalidTileConfig(format!(
            "{} order does not fit {}×{} tiles",
            order.name(),
            m / tile.m_per_block,
            n / tile.n_per_block
        )));
    }
    let expected = k_batch * (m / tile.m_per_block) * (n / tile.n_per_block);
    if order.total_tiles() != expected {
        return Err(PlanError::InvalidTileConfig(format!(
            "{} order serves {} groups, launch needs {expected}",
            order.name(),
            order.total_tiles()
        )));
    }
    Ok(())
}

/// `true` if [`check_validity`] accepts the launch. Used to select a
/// fallback configuration.
pub fn is_supported_argument(
    a_grid: &TensorDescriptor,
    b_grid: &TensorDescriptor,
    c_grid: &TensorDescriptor,
    tile: &TileConfig,
    order: &dyn TileOrder,
) -> bool {
    check_validity(a_grid, b_grid, c_grid, tile, order).is_ok()
}

fn unsupported(detail: String) -> PlanError {
    PlanError::UnsupportedArgument(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clustered, RowMajor, TileGrid};
    use tensor_desc::make_naive_descriptor_packed;

    fn grids(k_batch: usize, k0: usize, m: usize, n: usize, k1: usize) -> [TensorDescriptor; 3] {
        [
            make_naive_descriptor_packed(&[k_batch, k0, m, k1]).unwrap(),
            make_naive_descriptor_packed(&[k_batch, k0, n, k1]).unwrap(),
            make_naive_descriptor_packed(&[m, n]).unwrap(),
        ]
    }

    #[test]
    fn test_valid_launch() {
        let tile = TileConfig::preset("small").unwrap();
        let [a, b, c] = grids(2, 8, 32, 48, 4);
        let order = RowMajor::new(TileGrid::new(2, 2, 3)).unwrap();
        check_validity(&a, &b, &c, &tile, &order).unwrap();
        assert!(is_supported_argument(&a, &b, &c, &tile, &order));
    }

    #[test]
    fn test_indivisible_m() {
        let tile = TileConfig::preset("small").unwrap();
        let [a, b, c] = grids(1, 8, 30, 48, 4);
        let order = RowMajor::new(TileGrid::new(1, 2, 3)).unwrap();
        assert!(matches!(
            check_validity(&a, &b, &c, &tile, &order),
            Err(PlanError::UnsupportedArgument(_))
        ));
    }

    #[test]
    fn test_reduction_split_mismatch() {
        let tile = TileConfig::preset("small").unwrap();
        let a = make_naive_descriptor_packed(&[1, 8, 16, 4]).unwrap();
        let b = make_naive_descriptor_packed(&[1, 4, 16, 4]).unwrap();
        let c = make_naive_descriptor_packed(&[16, 16]).unwrap();
        let order = RowMajor::new(TileGrid::new(1, 1, 1)).unwrap();
        assert!(!is_supported_argument(&a, &b, &c, &tile, &order));
    }

    #[test]
    fn test_order_must_cover_grid() {
        let tile = TileConfig::preset("small").unwrap();
        let [a, b, c] = grids(1, 8, 32, 32, 4);
        let short = RowMajor::new(TileGrid::new(1, 1, 2)).unwrap();
        assert!(matches!(
            check_validity(&a, &b, &c, &tile, &short),
            Err(PlanError::InvalidTileConfig(_))
        ));
        let ragged = Clustered::new(TileGrid::new(1, 2, 2), 4, 1).unwrap();
        assert!(check_validity(&a, &b, &c, &tile, &ragged).is_err());
    }

    #[test]
    fn test_plan_summary() {
        let tile = TileConfig::default();
        let order = RowMajor::new(TileGrid::new(1, 2, 2)).unwrap();
        let plan = LaunchPlan::new(&tile, &order, 2, 2, 1, 256, PipelineKind::DoubleBuffer, false);
        assert_eq!(plan.grid_size, 4);
        assert_eq!(plan.loop_shape.num_tiles, 16);
        assert_eq!(plan.scratch_bytes(), 16 * 1024);
        assert_eq!(plan.total_barriers(), 4 * 16);
        assert!(plan.summary().contains("4 groups × 64 workers"));
    }
}
