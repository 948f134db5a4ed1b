// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The gridwise GEMM kernel.
//!
//! One work-group computes one C tile of one split-K batch. Its workers
//! run in lock-step phases separated by barriers; a phase is simulated by
//! running every worker's share of it in turn.
//!
//! # Double-buffer pipeline
//!
//! ```text
//!  prologue   read(0)  write(even)
//!  main loop  move  barrier  read  gemm(even)  write(odd)
//!             move  barrier  read  gemm(odd)   write(even)      × iterations
//!  tail       move  barrier  read  gemm(even)  write(odd)  barrier  gemm(odd)
//!         or  barrier  gemm(even)
//! ```
//!
//! The main-loop and tail variants are selected once per launch from the
//! [`LoopShape`] and compiled as separate specializations.

use crate::compute::{AccumulatorTile, BlockwiseGemm, MatrixFma};
use crate::epilogue::{Epilogue, EpilogueCursors};
use crate::metrics::{GroupStats, LaunchMetrics};
use crate::mover::{scratch_tile_descriptor, BlockwiseCopy, CopyShape};
use crate::EngineError;
use rayon::prelude::*;
use scratch_memory::{Region, ScratchGuard, ScratchPool, ScratchTracker, StageMut};
use std::time::Instant;
use tensor_core::{CElementwise, DeviceBuffer, Element};
use tensor_desc::TensorDescriptor;
use tile_planner::{LaunchPlan, LoopShape, PipelineKind, TileOrder};

/// The A and B grids of a launch and their buffers.
#[derive(Debug, Clone, Copy)]
pub struct GemmOperands<'a, T: Element> {
    /// `[KBatch, K0, M, K1]`.
    pub a_grid: &'a TensorDescriptor,
    /// `[KBatch, K0, N, K1]`.
    pub b_grid: &'a TensorDescriptor,
    pub a: &'a DeviceBuffer<T>,
    pub b: &'a DeviceBuffer<T>,
}

/// A planned GEMM launch bound to its operands.
#[derive(Debug)]
pub struct GridwiseGemm<'a, T: Element, F: MatrixFma, E: CElementwise> {
    plan: &'a LaunchPlan,
    order: &'a dyn TileOrder,
    operands: GemmOperands<'a, T>,
    a_tile: TensorDescriptor,
    b_tile: TensorDescriptor,
    epilogue: Epilogue<'a, T, E>,
    fma: F,
    validate_scratch: bool,
}

/// Per-thread state, reused by every group the thread runs.
struct GroupContext<'a, F: MatrixFma> {
    scratch: ScratchGuard,
    tracker: Option<ScratchTracker>,
    a_copy: BlockwiseCopy<'a>,
    b_copy: BlockwiseCopy<'a>,
    gemm: BlockwiseGemm<F>,
    acc: AccumulatorTile,
    cursors: EpilogueCursors,
}

impl<'a, T: Element, F: MatrixFma, E: CElementwise> GridwiseGemm<'a, T, F, E> {
    /// Binds a launch plan to its operands. The plan must already have
    /// passed the validity check for these grids.
    pub fn new(
        plan: &'a LaunchPlan,
        order: &'a dyn TileOrder,
        operands: GemmOperands<'a, T>,
        epilogue: Epilogue<'a, T, E>,
        fma: F,
    ) -> Result<Self, EngineError> {
        crate::epilogue::check_covers("A", operands.a_grid, operands.a)?;
        crate::epilogue::check_covers("B", operands.b_grid, operands.b)?;
        let t = &plan.tile;
        Ok(Self {
            plan,
            order,
            operands,
            a_tile: scratch_tile_descriptor(t.k0_per_block, t.m_per_block, t.k1, t.scratch_extra_m)?,
            b_tile: scratch_tile_descriptor(t.k0_per_block, t.n_per_block, t.k1, t.scratch_extra_n)?,
            epilogue,
            fma,
            validate_scratch: false,
        })
    }

    /// Records every scratch access and counts barrier-discipline
    /// violations.
    pub fn with_scratch_validation(mut self, enabled: bool) -> Self {
        self.validate_scratch = enabled;
        self
    }

    /// `gemm/<pipeline>/<backend>/<operator>`.
    pub fn kernel_name(&self) -> String {
        format!(
            "gemm/{}/{}/{}",
            self.plan.loop_shape.pipeline,
            F::NAME,
            self.epilogue.op().name()
        )
    }

    /// Runs every group on `threads`, each with an arena from `pool`.
    pub fn launch(
        &self,
        pool: &ScratchPool,
        threads: &rayon::ThreadPool,
    ) -> Result<LaunchMetrics, EngineError> {
        let start = Instant::now();
        let totals = threads.install(|| {
            (0..self.plan.grid_size)
                .into_par_iter()
                .map_init(
                    || self.group_context(pool),
                    |ctx, group_id| match ctx {
                        Ok(ctx) => self.run_group(ctx, group_id),
                        Err(e) => Err(EngineError::GroupSetup(e.to_string())),
                    },
                )
                .try_reduce(GroupStats::default, |x, y| Ok(x.merge(y)))
        })?;

        let mut metrics = LaunchMetrics::new(self.kernel_name(), self.plan.grid_size, self.plan.block_size)
            .with_scratch_bytes(self.plan.scratch_bytes());
        metrics.record_group(totals);
        metrics.finalise(start.elapsed());
        if totals.hazard_violations > 0 {
            tracing::warn!(
                "{}: {} scratch hazards across {} groups",
                metrics.kernel,
                totals.hazard_violations,
                self.plan.grid_size
            );
        }
        Ok(metrics)
    }

    fn group_context(&self, pool: &ScratchPool) -> Result<GroupContext<'a, F>, EngineError> {
        let tile = &self.plan.tile;
        Ok(GroupContext {
            scratch: pool.acquire(self.plan.scratch.total_lanes())?,
            tracker: self
                .validate_scratch
                .then(|| ScratchTracker::new(&self.plan.scratch)),
            a_copy: BlockwiseCopy::new(self.operands.a_grid, &self.a_tile, CopyShape::for_a(tile), 0.0)?,
            b_copy: BlockwiseCopy::new(self.operands.b_grid, &self.b_tile, CopyShape::for_b(tile), 0.0)?,
            gemm: BlockwiseGemm::new(self.fma, tile),
            acc: AccumulatorTile::new(tile),
            cursors: self.epilogue.cursors()?,
        })
    }

    fn run_group(&self, ctx: &mut GroupContext<'a, F>, group_id: usize) -> Result<GroupStats, EngineError> {
        let tile = &self.plan.tile;
        let coord = self.order.map(group_id);
        let m0 = coord.m_tile * tile.m_per_block;
        let n0 = coord.n_tile * tile.n_per_block;
        ctx.a_copy.set_origin([coord.batch, 0, m0, 0])?;
        ctx.b_copy.set_origin([coord.batch, 0, n0, 0])?;
        ctx.acc.clear();
        if let Some(tracker) = ctx.tracker.as_mut() {
            tracker.reset_epochs();
        }

        let mut stats = GroupStats::default();
        let shape = self.plan.loop_shape;
        {
            let (even, odd) = self.plan.scratch.split_stages(ctx.scratch.as_mut_slice())?;
            let mut pipe = Pipeline {
                a_copy: &mut ctx.a_copy,
                b_copy: &mut ctx.b_copy,
                gemm: &mut ctx.gemm,
                acc: &mut ctx.acc,
                tracker: ctx.tracker.as_mut(),
                stats: &mut stats,
                a: self.operands.a,
                b: self.operands.b,
            };
            match shape.pipeline {
                PipelineKind::DoubleBuffer => {
                    let odd = odd.ok_or_else(|| {
                        EngineError::UnsupportedArgument("double buffering needs two scratch stages".into())
                    })?;
                    let iterations = shape.main_loop_iterations;
                    match (shape.has_main_loop, shape.has_double_tail) {
                        (true, true) => pipe.run_double::<true, true>(even, odd, iterations),
                        (true, false) => pipe.run_double::<true, false>(even, odd, iterations),
                        (false, true) => pipe.run_double::<false, true>(even, odd, iterations),
                        (false, false) => pipe.run_double::<false, false>(even, odd, iterations),
                    }
                }
                PipelineKind::SingleBuffer => pipe.run_single(even, &shape),
                PipelineKind::Serial => pipe.run_serial(even, shape.num_tiles),
            }
        }

        self.write_c(ctx, [m0, n0], &mut stats)?;

        if let Some(tracker) = ctx.tracker.as_mut() {
            let violations = tracker.take_violations();
            for v in &violations {
                tracing::debug!("group {group_id}: {v}");
            }
            stats.hazard_violations += violations.len() as u64;
        }
        Ok(stats)
    }

    fn write_c(
        &self,
        ctx: &mut GroupContext<'a, F>,
        origin: [usize; 2],
        stats: &mut GroupStats,
    ) -> Result<(), EngineError> {
        let tile = &self.plan.tile;
        let elements = (tile.m_per_block * tile.n_per_block) as u64;
        if !self.plan.c_shuffle {
            let acc = &ctx.acc;
            self.epilogue
                .write_tile(&mut ctx.cursors, origin, |r, c| acc.get(r, c))?;
            stats.vector_writes += elements / tile.n_per_thread as u64;
            return Ok(());
        }

        let cols = tile.n_per_block;
        barrier(&mut ctx.tracker, stats);
        if let Some(tracker) = ctx.tracker.as_mut() {
            tracker.write(Region::C);
        }
        let staged = self.plan.scratch.c_region(ctx.scratch.as_mut_slice())?;
        for r in 0..tile.m_per_block {
            for c in 0..cols {
                staged[r * cols + c] = ctx.acc.get(r, c);
            }
        }
        stats.scratch_writes += 1;
        barrier(&mut ctx.tracker, stats);
        if let Some(tracker) = ctx.tracker.as_mut() {
            tracker.read(Region::C);
        }
        let staged = &*staged;
        self.epilogue
            .write_tile(&mut ctx.cursors, origin, |r, c| staged[r * cols + c])?;
        stats.vector_writes += elements / tile.c_vector_width as u64;
        Ok(())
    }
}

fn barrier(tracker: &mut Option<ScratchTracker>, stats: &mut GroupStats) {
    if let Some(tracker) = tracker.as_mut() {
        tracker.barrier();
    }
    stats.barriers += 1;
}

/// The main loop of one group: movers, compute stage and accumulators.
struct Pipeline<'p, 'a, T: Element, F: MatrixFma> {
    a_copy: &'p mut BlockwiseCopy<'a>,
    b_copy: &'p mut BlockwiseCopy<'a>,
    gemm: &'p mut BlockwiseGemm<F>,
    acc: &'p mut AccumulatorTile,
    tracker: Option<&'p mut ScratchTracker>,
    stats: &'p mut GroupStats,
    a: &'a DeviceBuffer<T>,
    b: &'a DeviceBuffer<T>,
}

impl<T: Element, F: MatrixFma> Pipeline<'_, '_, T, F> {
    /// Global → registers.
    fn read(&mut self) {
        self.stats.vector_reads += self.a_copy.run_read(self.a) + self.b_copy.run_read(self.b);
    }

    /// Registers → scratch stage `s`.
    fn write(&mut self, stage: &mut StageMut<'_>, s: usize) {
        if let Some(t) = self.tracker.as_deref_mut() {
            t.write(Region::A(s));
            t.write(Region::B(s));
        }
        self.a_copy.run_write(stage.a);
        self.b_copy.run_write(stage.b);
        self.stats.scratch_writes += 2;
    }

    /// Scratch stage `s` → accumulators.
    fn gemm(&mut self, stage: &StageMut<'_>, s: usize) {
        if let Some(t) = self.tracker.as_deref_mut() {
            t.read(Region::A(s));
            t.read(Region::B(s));
        }
        self.gemm.run(&*stage.a, &*stage.b, self.acc);
    }

    fn barrier(&mut self) {
        if let Some(t) = self.tracker.as_deref_mut() {
            t.barrier();
        }
        self.stats.barriers += 1;
    }

    fn advance(&mut self) {
        self.a_copy.move_to_next_tile();
        self.b_copy.move_to_next_tile();
    }

    fn run_double<const HAS_MAIN_LOOP: bool, const HAS_DOUBLE_TAIL: bool>(
        &mut self,
        mut even: StageMut<'_>,
        mut odd: StageMut<'_>,
        iterations: usize,
    ) {
        self.read();
        self.write(&mut even, 0);

        if HAS_MAIN_LOOP {
            for _ in 0..iterations {
                self.advance();
                self.barrier();
                self.read();
                self.gemm(&even, 0);
                self.write(&mut odd, 1);

                self.advance();
                self.barrier();
                self.read();
                self.gemm(&odd, 1);
                self.write(&mut even, 0);
            }
        }

        if HAS_DOUBLE_TAIL {
            self.advance();
            self.barrier();
            self.read();
            self.gemm(&even, 0);
            self.write(&mut odd, 1);
            self.barrier();
            self.gemm(&odd, 1);
        } else {
            self.barrier();
            self.gemm(&even, 0);
        }
    }

    /// One stage; the next tile waits in registers while the current one
    /// is multiplied.
    fn run_single(&mut self, mut stage: StageMut<'_>, shape: &LoopShape) {
        self.read();
        self.write(&mut stage, 0);
        if shape.has_main_loop {
            for _ in 0..shape.main_loop_iterations {
                self.advance();
                self.read();
                self.barrier();
                self.gemm(&stage, 0);
                self.barrier();
                self.write(&mut stage, 0);
            }
        }
        self.barrier();
        self.gemm(&stage, 0);
    }

    fn run_serial(&mut self, mut stage: StageMut<'_>, tiles: usize) {
        for i in 0..tiles {
            if i > 0 {
                self.advance();
            }
            self.read();
            self.write(&mut stage, 0);
            self.barrier();
            self.gemm(&stage, 0);
            self.barrier();
        }
    }
}
