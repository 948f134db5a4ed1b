// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-major tile order: split-K batch outermost, then M tiles, then N.

use super::{TileCoordinate, TileGrid, TileOrder};
use crate::PlanError;
use tensor_desc::{TensorAdaptor, Transform};

/// `group_id → (batch, m, n)` by unraveling over `[k_batch, m_tiles, n_tiles]`.
#[derive(Debug, Clone)]
pub struct RowMajor {
    grid: TileGrid,
    adaptor: TensorAdaptor,
}

impl RowMajor {
    pub fn new(grid: TileGrid) -> Result<Self, PlanError> {
        grid.check()?;
        let lengths = [grid.k_batch, grid.m_tiles, grid.n_tiles];
        let adaptor = TensorAdaptor::identity(&lengths).transform(
            vec![Transform::merge(&lengths)?],
            vec![vec![0, 1, 2]],
            vec![vec![0]],
        )?;
        Ok(Self { grid, adaptor })
    }
}

impl TileOrder for RowMajor {
    fn name(&self) -> &'static str {
        "row-major"
    }

    fn map(&self, group_id: usize) -> TileCoordinate {
        debug_assert!(group_id < self.total_tiles(), "group id {group_id} out of range");
        let bottom = self
            .adaptor
            .calculate_bottom_index(&[group_id])
            .unwrap_or_default();
        TileCoordinate::from_bottom(&bottom)
    }

    fn total_tiles(&self) -> usize {
        self.grid.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_order() {
        let order = RowMajor::new(TileGrid::new(2, 2, 3)).unwrap();
        assert_eq!(order.total_tiles(), 12);
        let t = order.map(0);
        assert_eq!((t.batch, t.m_tile, t.n_tile), (0, 0, 0));
        let t = order.map(5);
        assert_eq!((t.batch, t.m_tile, t.n_tile), (0, 1, 2));
        let t = order.map(7);
        assert_eq!((t.batch, t.m_tile, t.n_tile), (1, 0, 1));
    }
}
