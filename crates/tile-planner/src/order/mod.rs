// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`TileOrder`] trait and tile-id mappers.

pub mod clustered;
pub mod grouped_raster;
pub mod row_major;

use crate::PlanError;
use std::fmt;
use tensor_desc::Index;

/// The C tile (and reduction split) one work-group computes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct TileCoordinate {
    /// Split-K batch index.
    pub batch: usize,
    pub m_tile: usize,
    pub n_tile: usize,
}

impl TileCoordinate {
    /// Reads `(batch, m, n)` from a mapper adaptor's bottom index.
    pub(crate) fn from_bottom(idx: &[Index]) -> Self {
        let at = |i: usize| idx.get(i).copied().unwrap_or(0).max(0) as usize;
        Self {
            batch: at(0),
            m_tile: at(1),
            n_tile: at(2),
        }
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(k{}, m{}, n{})", self.batch, self.m_tile, self.n_tile)
    }
}

/// Number of tiles along each axis of a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TileGrid {
    pub k_batch: usize,
    pub m_tiles: usize,
    pub n_tiles: usize,
}

impl TileGrid {
    pub fn new(k_batch: usize, m_tiles: usize, n_tiles: usize) -> Self {
        Self {
            k_batch,
            m_tiles,
            n_tiles,
        }
    }

    /// Tiles needed to cover an `m × n` output with `mpb × npb` tiles.
    pub fn covering(k_batch: usize, m: usize, n: usize, mpb: usize, npb: usize) -> Self {
        Self::new(k_batch, m.div_ceil(mpb), n.div_ceil(npb))
    }

    pub fn total(&self) -> usize {
        self.k_batch * self.m_tiles * self.n_tiles
    }

    pub(crate) fn check(&self) -> Result<(), PlanError> {
        if self.total() == 0 {
            return Err(PlanError::InvalidTileConfig(format!(
                "empty tile grid {}×{}×{}",
                self.k_batch, self.m_tiles, self.n_tiles
            )));
        }
        Ok(())
    }
}

/// Maps a linear work-group id to the tile it computes.
///
/// `map` is a pure bijection between `[0, total_tiles())` and the tile
/// grid. Ids outside that range are a caller bug and only checked by debug
/// assertions.
///
/// ```
/// use tile_planner::{RowMajor, TileGrid, TileOrder};
///
/// let order = RowMajor::new(TileGrid::new(1, 2, 3)).unwrap();
/// let t = order.map(4);
/// assert_eq!((t.m_tile, t.n_tile), (1, 1));
/// ```
pub trait TileOrder: Send + Sync + fmt::Debug {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// The tile computed by `group_id`.
    fn map(&self, group_id: usize) -> TileCoordinate;

    /// Number of work-groups the order serves.
    fn total_tiles(&self) -> usize;

    /// `false` if the order's parameters do not fit its tile grid.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Serializable choice of tile order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TileOrderKind {
    RowMajor,
    Clustered { m01: usize, n01: usize },
    GroupedRaster { group_rows: usize },
}

impl Default for TileOrderKind {
    fn default() -> Self {
        TileOrderKind::GroupedRaster { group_rows: 4 }
    }
}

impl TileOrderKind {
    /// Builds the order for a tile grid.
    pub fn build(self, grid: TileGrid) -> Result<Box<dyn TileOrder>, PlanError> {
        Ok(match self {
            TileOrderKind::RowMajor => Box::new(row_major::RowMajor::new(grid)?),
            TileOrderKind::Clustered { m01, n01 } => {
                Box::new(clustered::Clustered::new(grid, m01, n01)?)
            }
            TileOrderKind::GroupedRaster { group_rows } => {
                Box::new(grouped_raster::GroupedRaster::new(grid, group_rows)?)
            }
        })
    }

    /// Parses `row-major`, `clustered:M01xN01` or `grouped-raster:ROWS`.
    pub fn parse(s: &str) -> Result<Self, PlanError> {
        let unknown = || PlanError::UnknownName {
            kind: "tile order",
            name: s.to_string(),
        };
        let (kind, args) = s.split_once(':').unwrap_or((s, ""));
        match kind {
            "row-major" => Ok(TileOrderKind::RowMajor),
            "clustered" => {
                let (m01, n01) = args.split_once('x').ok_or_else(unknown)?;
                Ok(TileOrderKind::Clustered {
                    m01: m01.parse().map_err(|_| unknown())?,
                    n01: n01.parse().map_err(|_| unknown())?,
                })
            }
            "grouped-raster" => Ok(TileOrderKind::GroupedRaster {
                group_rows: if args.is_empty() {
                    4
                } else {
                    args.parse().map_err(|_| unknown())?
                },
            }),
            _ => Err(unknown()),
        }
    }
}

impl fmt::Display for TileOrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileOrderKind::RowMajor => f.write_str("row-major"),
            TileOrderKind::Clustered { m01, n01 } => write!(f, "clustered:{m01}x{n01}"),
            TileOrderKind::GroupedRaster { group_rows } => write!(f, "grouped-raster:{group_rows}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn assert_bijection(order: &dyn TileOrder, grid: TileGrid) {
        assert_eq!(order.total_tiles(), grid.total());
        let mut seen = HashSet::new();
        for id in 0..order.total_tiles() {
            let t = order.map(id);
            assert!(t.batch < grid.k_batch && t.m_tile < grid.m_tiles && t.n_tile < grid.n_tiles);
            assert!(seen.insert(t), "{} maps {id} to {t} twice", order.name());
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for kind in [
            TileOrderKind::RowMajor,
            TileOrderKind::Clustered { m01: 2, n01: 4 },
            TileOrderKind::GroupedRaster { group_rows: 3 },
        ] {
            assert_eq!(TileOrderKind::parse(&kind.to_string()).unwrap(), kind);
        }
        assert!(TileOrderKind::parse("hilbert").is_err());
        assert!(TileOrderKind::parse("clustered:2").is_err());
    }

    #[test]
    fn test_serde_tagged() {
        let json = serde_json::to_string(&TileOrderKind::Clustered { m01: 2, n01: 2 }).unwrap();
        assert_eq!(json, r#"{"kind":"clustered","m01":2,"n01":2}"#);
    }

    #[test]
    fn test_empty_grid_rejected() {
        assert!(TileOrderKind::RowMajor.build(TileGrid::new(1, 0, 4)).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_orders_are_bijections(
            k_batch in 1usize..4,
            m01 in 1usize..4,
            n01 in 1usize..4,
            m_groups in 1usize..4,
            n_groups in 1usize..4,
            m_extra in 0usize..3,
        ) {
            let clustered_grid = TileGrid::new(k_batch, m01 * m_groups, n01 * n_groups);
            let ragged_grid = TileGrid::new(k_batch, m01 * m_groups + m_extra, n01 * n_groups);

            for (kind, grid) in [
                (TileOrderKind::RowMajor, ragged_grid),
                (TileOrderKind::Clustered { m01, n01 }, clustered_grid),
                (TileOrderKind::GroupedRaster { group_rows: m01 }, ragged_grid),
            ] {
                let order = kind.build(grid).unwrap();
                prop_assert!(order.is_valid());
                assert_bijection(order.as_ref(), grid);
            }
        }
    }
}
