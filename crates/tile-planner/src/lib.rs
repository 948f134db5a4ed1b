// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tile-planner
//!
//! Decides how a tiled reduction is launched: the tile shape, which tile
//! each work-group computes, which main loop it runs, and whether the
//! launch is valid at all.
//!
//! # Tile Orders
//!
//! | Order | Parameters | Constraint |
//! |---|---|---|
//! | [`RowMajor`] | none | none |
//! | [`Clustered`] | `m01 × n01` cluster | cluster divides the tile grid |
//! | [`GroupedRaster`] | `group_rows` | none; remainder band adapts |
//!
//! All orders implement [`TileOrder`], so the engine is generic over the
//! mapping and new orders can be added without touching it. Orders are
//! chosen by configuration through [`TileOrderKind`].
//!
//! # Validity
//!
//! [`check_validity`] is the single gate before a launch: a configuration
//! either fails it with a [`PlanError`] or produces the right result.
//!
//! # Example
//! ```
//! use tile_planner::{LoopShape, PipelineKind, TileConfig, TileGrid, TileOrderKind};
//!
//! let tile = TileConfig::preset("default").unwrap();
//! tile.validate().unwrap();
//!
//! let order = TileOrderKind::Clustered { m01: 2, n01: 2 }
//!     .build(TileGrid::new(1, 4, 4))
//!     .unwrap();
//! assert_eq!(order.total_tiles(), 16);
//!
//! let shape = LoopShape::new(PipelineKind::DoubleBuffer, 5 * 16 + 8, tile.k_per_block());
//! assert!(shape.has_main_loop && shape.has_double_tail);
//! ```

mod config;
mod error;
mod launch;
pub mod order;
mod pipeline;

pub use config::TileConfig;
pub use error::PlanError;
pub use launch::{check_validity, is_supported_argument, LaunchPlan};
pub use order::clustered::Clustered;
pub use order::grouped_raster::GroupedRaster;
pub use order::row_major::RowMajor;
pub use order::{TileCoordinate, TileGrid, TileOrder, TileOrderKind};
pub use pipeline::{LoopShape, PipelineKind};
