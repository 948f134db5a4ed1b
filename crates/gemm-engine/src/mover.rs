// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Cooperative tile movers between a global grid and scratch.
//!
//! A [`BlockwiseCopy`] moves one `[1, K0, X, K1]` slice of a
//! `[KBatch, K0, X, K1]` grid into a `[K0, X, K1]` scratch tile. The
//! group's workers form a thread cluster over the slice; each worker owns
//! a contiguous sub-slice and walks it with one coordinate:
//!
//! ```text
//!   slice  [1, 4, 16, 4]      cluster [1, 4, 16, 1]     per worker [1, 1, 1, 4]
//!
//!   read : grid ──(coordinate walk, padding → fill)──► staging registers
//!   write: staging registers ──(precomputed lanes)──► scratch tile
//! ```
//!
//! The walk visits the sub-slice in snake order (K0 outermost, the vector
//! dimension innermost), so every step between two elements is a unit move
//! along one dimension and is precomputed once.

use crate::EngineError;
use tensor_core::{DeviceBuffer, Element};
use tensor_desc::{
    coordinate_has_valid_offset, make_coordinate, make_coordinate_step, make_naive_descriptor,
    move_coordinate, reset_coordinate, CoordinateStep, Index, TensorCoordinate, TensorDescriptor,
};
use tile_planner::TileConfig;

/// The `[K0, X, K1]` scratch tile, with `extra` unused lanes after every X
/// row of each K0 slab.
pub fn scratch_tile_descriptor(
    k0: usize,
    x: usize,
    k1: usize,
    extra: usize,
) -> Result<TensorDescriptor, EngineError> {
    Ok(make_naive_descriptor(&[k0, x, k1], &[(x + extra) * k1, k1, 1])?)
}

/// Slice, thread cluster and vector access of one mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyShape {
    pub slice: [usize; 4],
    pub cluster: [usize; 4],
    /// 2 = X, 3 = K1.
    pub vector_dim: usize,
    pub vector_width: usize,
}

impl CopyShape {
    pub fn for_a(tile: &TileConfig) -> Self {
        Self {
            slice: tile.a_slice(),
            cluster: tile.a_cluster,
            vector_dim: tile.a_vector_dim,
            vector_width: tile.vector_width,
        }
    }

    pub fn for_b(tile: &TileConfig) -> Self {
        Self {
            slice: tile.b_slice(),
            cluster: tile.b_cluster,
            vector_dim: tile.b_vector_dim,
            vector_width: tile.vector_width,
        }
    }

    /// Sub-slice lengths owned by one worker.
    pub fn per_thread(&self) -> [usize; 4] {
        std::array::from_fn(|d| self.slice[d] / self.cluster[d].max(1))
    }

    pub fn workers(&self) -> usize {
        self.cluster.iter().product()
    }

    /// Cluster position of `worker`, last dimension fastest.
    fn cluster_index(&self, worker: usize) -> [usize; 4] {
        let mut rest = worker;
        let mut idx = [0; 4];
        for d in (0..4).rev() {
            idx[d] = rest % self.cluster[d];
            rest /= self.cluster[d];
        }
        idx
    }
}

/// Positions of a snake walk over `lengths`, outermost dimension first.
/// Consecutive positions differ by one along exactly one dimension.
fn snake_walk(lengths: [usize; 3]) -> Vec<[usize; 3]> {
    let [l0, l1, l2] = lengths;
    let mut out = Vec::with_capacity(l0 * l1 * l2);
    for i0 in 0..l0 {
        for j in 0..l1 {
            let i1 = if i0 % 2 == 0 { j } else { l1 - 1 - j };
            let row = i0 * l1 + j;
            for k in 0..l2 {
                let i2 = if row % 2 == 0 { k } else { l2 - 1 - k };
                out.push([i0, i1, i2]);
            }
        }
    }
    out
}

/// Moves one operand tile per pipeline step from a grid into scratch.
#[derive(Debug)]
pub struct BlockwiseCopy<'d> {
    desc: &'d TensorDescriptor,
    shape: CopyShape,
    per_thread: [usize; 4],
    /// Unit steps: `2·d` forward and `2·d + 1` backward along walk dim `d`.
    steps: Vec<CoordinateStep>,
    /// Step index taken after each walk position but the last.
    moves: Vec<usize>,
    /// From the last walk position back to the sub-slice origin.
    rewind: CoordinateStep,
    /// One slice along K0.
    window: CoordinateStep,
    /// Staging slot of each walk position.
    slots: Vec<usize>,
    cursors: Vec<TensorCoordinate>,
    /// `workers × per-thread elements`, grouped by worker.
    staging: Vec<f32>,
    /// Scratch lane of every staging slot.
    lanes: Vec<usize>,
    fill: f32,
}

impl<'d> BlockwiseCopy<'d> {
    /// Builds a mover over `desc`, writing tiles laid out by `tile_desc`.
    ///
    /// Reads of padded elements produce `fill`. The movers start at the
    /// grid origin; see [`BlockwiseCopy::set_origin`].
    pub fn new(
        desc: &'d TensorDescriptor,
        tile_desc: &TensorDescriptor,
        shape: CopyShape,
        fill: f32,
    ) -> Result<Self, EngineError> {
        if desc.num_dims() != 4 || tile_desc.num_dims() != 3 {
            return Err(EngineError::UnsupportedArgument(format!(
                "mover needs a 4-D grid and a 3-D tile, got {:?} and {:?}",
                desc.lengths(),
                tile_desc.lengths()
            )));
        }
        let pt = shape.per_thread();
        let vd = shape.vector_dim;
        let od = if vd == 3 { 2 } else { 3 };
        let walk_dims = [1, od, vd];

        let positions = snake_walk([pt[1], pt[od], pt[vd]]);
        let grid_pos = |p: &[usize; 3]| {
            let mut g = [0usize; 4];
            for (d, &v) in walk_dims.iter().zip(p) {
                g[*d] = v;
            }
            g
        };
        let slots: Vec<usize> = positions
            .iter()
            .map(|p| {
                let g = grid_pos(p);
                (g[1] * pt[2] + g[2]) * pt[3] + g[3]
            })
            .collect();

        let mut steps = Vec::with_capacity(6);
        for &d in &walk_dims {
            for dir in [1, -1] {
                let mut diff = [0 as Index; 4];
                diff[d] = dir;
                steps.push(make_coordinate_step(desc, &diff)?);
            }
        }
        let moves = positions
            .windows(2)
            .map(|w| {
                let d = (0..3).find(|&d| w[0][d] != w[1][d]).unwrap_or(0);
                2 * d + usize::from(w[1][d] < w[0][d])
            })
            .collect();

        let last = positions.last().map(grid_pos).unwrap_or([0; 4]);
        let rewind_diff: Vec<Index> = last.iter().map(|&v| -(v as Index)).collect();
        let rewind = make_coordinate_step(desc, &rewind_diff)?;
        let window = make_coordinate_step(desc, &[0, shape.slice[1] as Index, 0, 0])?;

        let workers = shape.workers();
        let per_worker = slots.len();
        let mut cursors = Vec::with_capacity(workers);
        let mut lanes = Vec::with_capacity(workers * per_worker);
        for w in 0..workers {
            let c = shape.cluster_index(w);
            let origin: [usize; 4] = std::array::from_fn(|d| c[d] * pt[d]);
            cursors.push(make_coordinate(desc, &origin)?);
            for k0 in 0..pt[1] {
                for x in 0..pt[2] {
                    for k1 in 0..pt[3] {
                        let at = [origin[1] + k0, origin[2] + x, origin[3] + k1];
                        lanes.push(tile_desc.offset(&at)?.offset as usize);
                    }
                }
            }
        }

        Ok(Self {
            desc,
            shape,
            per_thread: pt,
            steps,
            moves,
            rewind,
            window,
            slots,
            cursors,
            staging: vec![0.0; workers * per_worker],
            lanes,
            fill,
        })
    }

    pub fn shape(&self) -> &CopyShape {
        &self.shape
    }

    /// Places the slice origin at `origin` (`[batch, k0, x, k1]`).
    pub fn set_origin(&mut self, origin: [usize; 4]) -> Result<(), EngineError> {
        for (w, cursor) in self.cursors.iter_mut().enumerate() {
            let c = self.shape.cluster_index(w);
            let at: [usize; 4] = std::array::from_fn(|d| origin[d] + c[d] * self.per_thread[d]);
            reset_coordinate(self.desc, cursor, &at)?;
        }
        Ok(())
    }

    /// Loads every worker's sub-slice into its staging registers. Returns
    /// the number of global vector transactions issued.
    pub fn run_read<T: Element>(&mut self, src: &DeviceBuffer<T>) -> u64 {
        let per_worker = self.slots.len();
        for (w, cursor) in self.cursors.iter_mut().enumerate() {
            let regs = &mut self.staging[w * per_worker..(w + 1) * per_worker];
            for (i, &slot) in self.slots.iter().enumerate() {
                if i > 0 {
                    move_coordinate(self.desc, cursor, &self.steps[self.moves[i - 1]]);
                }
                regs[slot] = if coordinate_has_valid_offset(self.desc, cursor) {
                    src.load(cursor.offset() as usize).to_f32()
                } else {
                    self.fill
                };
            }
            move_coordinate(self.desc, cursor, &self.rewind);
        }
        (self.cursors.len() * per_worker / self.shape.vector_width.max(1)) as u64
    }

    /// Stores the staging registers into a scratch tile.
    pub fn run_write(&self, dst: &mut [f32]) {
        for (&lane, &v) in self.lanes.iter().zip(&self.staging) {
            dst[lane] = v;
        }
    }

    /// Moves every worker's source window by `step`.
    pub fn move_src_slice_window(&mut self, step: &CoordinateStep) {
        for cursor in &mut self.cursors {
            move_coordinate(self.desc, cursor, step);
        }
    }

    /// Moves the source window one slice along K0.
    pub fn move_to_next_tile(&mut self) {
        for cursor in &mut self.cursors {
            move_coordinate(self.desc, cursor, &self.window);
        }
    }
}
