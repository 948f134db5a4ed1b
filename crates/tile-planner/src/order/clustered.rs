// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Clustered raster: consecutive groups cover an `m01 × n01` rectangle of
//! tiles before moving to the next rectangle, so neighbouring groups share
//! A rows and B columns.
//!
//! ```text
//!  bottom: [k][m0][n0]
//!            │  Unmerge(M00, M01)   Unmerge(N00, N01)
//!  hidden: [k][m00][n00][m01][n01]
//!            │  Merge
//!  top:    [group id]
//! ```

use super::{TileCoordinate, TileGrid, TileOrder};
use crate::PlanError;
use tensor_desc::{TensorAdaptor, Transform};

/// Tiles grouped into `m01 × n01` clusters.
#[derive(Debug, Clone)]
pub struct Clustered {
    grid: TileGrid,
    m01: usize,
    n01: usize,
    /// `None` when the cluster does not divide the tile grid.
    adaptor: Option<TensorAdaptor>,
}

impl Clustered {
    /// Builds the order. A cluster that does not divide the tile grid yields
    /// an order whose [`TileOrder::is_valid`] is `false`; launch validation
    /// rejects it.
    pub fn new(grid: TileGrid, m01: usize, n01: usize) -> Result<Self, PlanError> {
        grid.check()?;
        if m01 == 0 || n01 == 0 {
            return Err(PlanError::InvalidTileConfig(format!(
                "cluster {m01}×{n01} must be non-empty"
            )));
        }
        let divides = grid.m_tiles % m01 == 0 && grid.n_tiles % n01 == 0;
        let adaptor = if divides {
            Some(Self::build_adaptor(grid, m01, n01)?)
        } else {
            tracing::debug!(
                "cluster {m01}×{n01} does not divide {}×{} tiles",
                grid.m_tiles,
                grid.n_tiles
            );
            None
        };
        Ok(Self {
            grid,
            m01,
            n01,
            adaptor,
        })
    }

    fn build_adaptor(grid: TileGrid, m01: usize, n01: usize) -> Result<TensorAdaptor, PlanError> {
        let (m00, n00) = (grid.m_tiles / m01, grid.n_tiles / n01);
        let adaptor = TensorAdaptor::identity(&[grid.k_batch, grid.m_tiles, grid.n_tiles])
            .transform(
                vec![
                    Transform::pass_through(grid.k_batch),
                    Transform::unmerge(&[m00, m01])?,
                    Transform::unmerge(&[n00, n01])?,
                ],
                vec![vec![0], vec![1], vec![2]],
                vec![vec![0], vec![1, 3], vec![2, 4]],
            )?
            .transform(
                vec![Transform::merge(&[grid.k_batch, m00, n00, m01, n01])?],
                vec![vec![0, 1, 2, 3, 4]],
                vec![vec![0]],
            )?;
        Ok(adaptor)
    }

    pub fn cluster(&self) -> (usize, usize) {
        (self.m01, self.n01)
    }
}

impl TileOrder for Clustered {
    fn name(&self) -> &'static str {
        "clustered"
    }

    fn map(&self, group_id: usize) -> TileCoordinate {
        debug_assert!(group_id < self.total_tiles(), "group id {group_id} out of range");
        match &self.adaptor {
            Some(adaptor) => {
                let bottom = adaptor.calculate_bottom_index(&[group_id]).unwrap_or_default();
                TileCoordinate::from_bottom(&bottom)
            }
            None => {
                let per_batch = self.grid.m_tiles * self.grid.n_tiles;
                let local = group_id % per_batch;
                TileCoordinate {
                    batch: group_id / per_batch,
                    m_tile: local / self.grid.n_tiles,
                    n_tile: local % self.grid.n_tiles,
                }
            }
        }
    }

    fn total_tiles(&self) -> usize {
        self.grid.total()
    }

    fn is_valid(&self) -> bool {
        self.adaptor.is_some()
    }
}
