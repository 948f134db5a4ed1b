// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Grouped raster: tiles are visited column-by-column inside bands of
//! `group_rows` M tiles. The last band may be shorter; it is walked with its
//! own height, so any tile grid is covered.
//!
//! ```text
//!  group_rows = 2, 5 × 3 tiles        ids
//!    band 0 ┌ 0  2  4 ┐
//!           └ 1  3  5 ┘
//!    band 1 ┌ 6  8 10 ┐
//!           └ 7  9 11 ┘
//!    band 2 [12 13 14]   ← remainder band of height 1
//! ```

use super::{TileCoordinate, TileGrid, TileOrder};
use crate::PlanError;

/// Column-major raster inside bands of `group_rows` tile rows.
#[derive(Debug, Clone)]
pub struct GroupedRaster {
    grid: TileGrid,
    group_rows: usize,
}

impl GroupedRaster {
    pub fn new(grid: TileGrid, group_rows: usize) -> Result<Self, PlanError> {
        grid.check()?;
        if group_rows == 0 {
            return Err(PlanError::InvalidTileConfig(
                "grouped raster needs at least one row per band".to_string(),
            ));
        }
        Ok(Self { grid, group_rows })
    }
}

impl TileOrder for GroupedRaster {
    fn name(&self) -> &'static str {
        "grouped-raster"
    }

    fn map(&self, group_id: usize) -> TileCoordinate {
        debug_assert!(group_id < self.total_tiles(), "group id {group_id} out of range");
        let (m0, n0, m01) = (self.grid.m_tiles, self.grid.n_tiles, self.group_rows);
        let per_batch = m0 * n0;
        let batch = group_id / per_batch;
        let id = group_id % per_batch;

        let idx_n0 = id % n0;
        let idx_m0 = id / n0;
        let band_rows = if idx_m0 < m0 - m0 % m01 { m01 } else { m0 % m01 };

        let idx_m00 = idx_m0 / m01;
        let idx_m01 = idx_m0 % m01;
        let local = idx_n0 + idx_m01 * n0;

        TileCoordinate {
            batch,
            m_tile: local % band_rows + idx_m00 * m01,
            n_tile: local / band_rows,
        }
    }

    fn total_tiles(&self) -> usize {
        self.grid.total()
    }
}
