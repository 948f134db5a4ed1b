// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The gridwise row softmax: `y = α·softmax(x) + β·y`.
//!
//! Each group owns `rows_per_group` rows. The rows are swept in tiles of
//! `k_per_tile` columns, three times:
//!
//! 1. max of every row,
//! 2. sum of `exp(x - max)`,
//! 3. the blended output.
//!
//! When a row fits in one tile the tile is loaded once and stays resident
//! for all three passes.
//!
//! Padded reads load NaN. Both reductions fold with
//! [`accumulate_nan_ignore`], so padding drops out of the max directly and
//! out of the sum because `exp(NaN - max)` is NaN again. Real NaN inputs
//! are discarded by the same rule.

use crate::metrics::{GroupStats, LaunchMetrics};
use crate::EngineError;
use problem_ir::SoftmaxProblem;
use rayon::prelude::*;
use scratch_memory::{Region, ScratchGuard, ScratchLayout, ScratchPool, ScratchTracker};
use std::time::Instant;
use tensor_core::ops::reduce::accumulate_nan_ignore;
use tensor_core::{DeviceBuffer, Element, ReduceOp};
use tensor_desc::{
    coordinate_has_valid_offset, make_coordinate, make_coordinate_step, make_naive_descriptor_packed,
    move_coordinate, reset_coordinate, CoordinateStep, Index, TensorCoordinate, TensorDescriptor,
    Transform,
};

/// Softmax kernel shape, the `[softmax]` table of the engine config.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SoftmaxConfig {
    /// Workers per group.
    pub block_size: usize,
    /// Rows owned by one group.
    pub rows_per_group: usize,
    /// Columns per tile.
    pub k_per_tile: usize,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            rows_per_group: 4,
            k_per_tile: 64,
        }
    }
}

impl SoftmaxConfig {
    /// Workers sharing one row.
    pub fn workers_per_row(&self) -> usize {
        self.block_size / self.rows_per_group.max(1)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.block_size == 0 || self.rows_per_group == 0 || self.k_per_tile == 0 {
            return Err(EngineError::ConfigError(
                "softmax block_size, rows_per_group and k_per_tile must be positive".into(),
            ));
        }
        if self.block_size % self.rows_per_group != 0 {
            return Err(EngineError::ConfigError(format!(
                "softmax block_size {} is not a multiple of rows_per_group {}",
                self.block_size, self.rows_per_group
            )));
        }
        let wpr = self.workers_per_row();
        if self.k_per_tile % wpr != 0 {
            return Err(EngineError::ConfigError(format!(
                "softmax k_per_tile {} is not a multiple of the {wpr} workers per row",
                self.k_per_tile
            )));
        }
        Ok(())
    }

    /// Scratch arena of one group: the tile, then one partial per worker.
    pub fn layout(&self) -> ScratchLayout {
        ScratchLayout::reduction(self.rows_per_group * self.k_per_tile, self.block_size)
    }
}

/// A softmax launch bound to its buffers.
#[derive(Debug)]
pub struct GridwiseSoftmax<'a, T: Element> {
    problem: SoftmaxProblem,
    config: SoftmaxConfig,
    /// `[rows, cols]`, right-padded to whole groups and tiles.
    desc: TensorDescriptor,
    lane_step: CoordinateStep,
    layout: ScratchLayout,
    num_tiles: usize,
    groups: usize,
    x: &'a DeviceBuffer<T>,
    y: &'a DeviceBuffer<T>,
    validate_scratch: bool,
}

struct SoftmaxContext {
    scratch: ScratchGuard,
    tracker: Option<ScratchTracker>,
    cursors: Vec<TensorCoordinate>,
    regs: Vec<f32>,
    row_max: Vec<f32>,
    row_sum: Vec<f32>,
}

impl<'a, T: Element> GridwiseSoftmax<'a, T> {
    pub fn new(
        problem: &SoftmaxProblem,
        config: &SoftmaxConfig,
        x: &'a DeviceBuffer<T>,
        y: &'a DeviceBuffer<T>,
    ) -> Result<Self, EngineError> {
        problem.validate()?;
        config.validate()?;
        if problem.dtype != T::DTYPE {
            return Err(EngineError::DTypeMismatch {
                expected: problem.dtype,
                actual: T::DTYPE,
            });
        }

        let (rows, cols) = (problem.rows, problem.cols);
        let rows_padded = rows.next_multiple_of(config.rows_per_group);
        let cols_padded = cols.next_multiple_of(config.k_per_tile);
        let desc = make_naive_descriptor_packed(&[rows, cols])?.transform(
            vec![
                Transform::right_pad(rows, rows_padded - rows),
                Transform::right_pad(cols, cols_padded - cols),
            ],
            vec![vec![0], vec![1]],
            vec![vec![0], vec![1]],
        )?;
        crate::epilogue::check_covers("X", &desc, x)?;
        crate::epilogue::check_covers("Y", &desc, y)?;
        let lane_step = make_coordinate_step(&desc, &[0, config.workers_per_row() as Index])?;

        Ok(Self {
            problem: problem.clone(),
            config: config.clone(),
            lane_step,
            layout: config.layout(),
            num_tiles: cols_padded / config.k_per_tile,
            groups: rows_padded / config.rows_per_group,
            desc,
            x,
            y,
            validate_scratch: false,
        })
    }

    pub fn with_scratch_validation(mut self, enabled: bool) -> Self {
        self.validate_scratch = enabled;
        self
    }

    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Whether each row is loaded once and reused by all three passes.
    pub fn sweep_once(&self) -> bool {
        self.num_tiles == 1
    }

    pub fn kernel_name(&self) -> &'static str {
        if self.sweep_once() {
            "softmax/sweep-once"
        } else {
            "softmax/multi-pass"
        }
    }

    pub fn scratch_bytes(&self) -> usize {
        self.layout.bytes()
    }

    pub fn launch(
        &self,
        pool: &ScratchPool,
        threads: &rayon::ThreadPool,
    ) -> Result<LaunchMetrics, EngineError> {
        let start = Instant::now();
        let totals = threads.install(|| {
            (0..self.groups)
                .into_par_iter()
                .map_init(
                    || self.context(pool),
                    |ctx, group_id| match ctx {
                        Ok(ctx) => self.run_group(ctx, group_id),
                        Err(e) => Err(EngineError::GroupSetup(e.to_string())),
                    },
                )
                .try_reduce(GroupStats::default, |x, y| Ok(x.merge(y)))
        })?;

        let mut metrics = LaunchMetrics::new(self.kernel_name(), self.groups, self.config.block_size)
            .with_scratch_bytes(self.scratch_bytes());
        metrics.record_group(totals);
        metrics.finalise(start.elapsed());
        if totals.hazard_violations > 0 {
            tracing::warn!(
                "{}: {} scratch hazards across {} groups",
                metrics.kernel,
                totals.hazard_violations,
                self.groups
            );
        }
        Ok(metrics)
    }

    fn context(&self, pool: &ScratchPool) -> Result<SoftmaxContext, EngineError> {
        let workers = self.config.block_size;
        Ok(SoftmaxContext {
            scratch: pool.acquire(self.layout.total_lanes())?,
            tracker: self.validate_scratch.then(|| ScratchTracker::new(&self.layout)),
            cursors: (0..workers)
                .map(|_| make_coordinate(&self.desc, &[0, 0]))
                .collect::<Result<_, _>>()?,
            regs: vec![0.0; workers],
            row_max: vec![0.0; self.config.rows_per_group],
            row_sum: vec![0.0; self.config.rows_per_group],
        })
    }

    fn run_group(&self, ctx: &mut SoftmaxContext, group_id: usize) -> Result<GroupStats, EngineError> {
        if let Some(tracker) = ctx.tracker.as_mut() {
            tracker.reset_epochs();
        }
        let mut stats = GroupStats::default();
        let (tile, partials) = self.layout.split_reduction(ctx.scratch.as_mut_slice())?;
        let mut pass = RowPass {
            kernel: self,
            row0: group_id * self.config.rows_per_group,
            tile,
            partials,
            tracker: ctx.tracker.as_mut(),
            cursors: &mut ctx.cursors,
            regs: &mut ctx.regs,
            stats: &mut stats,
        };

        let resident = self.sweep_once();
        if resident {
            pass.load_tile(0)?;
        }
        pass.reduce(ReduceOp::Max, resident, &mut ctx.row_max, |v, _| v)?;
        let row_max = &ctx.row_max;
        pass.reduce(ReduceOp::Add, resident, &mut ctx.row_sum, |v, r| (v - row_max[r]).exp())?;
        pass.write_output(resident, row_max, &ctx.row_sum)?;

        if let Some(tracker) = ctx.tracker.as_mut() {
            let violations = tracker.take_violations();
            for v in &violations {
                tracing::debug!("softmax group {group_id}: {v}");
            }
            stats.hazard_violations += violations.len() as u64;
        }
        Ok(stats)
    }
}

/// One group's sweep state.
struct RowPass<'p, 'a, T: Element> {
    kernel: &'p GridwiseSoftmax<'a, T>,
    row0: usize,
    tile: &'p mut [f32],
    partials: &'p mut [f32],
    tracker: Option<&'p mut ScratchTracker>,
    cursors: &'p mut [TensorCoordinate],
    regs: &'p mut [f32],
    stats: &'p mut GroupStats,
}

impl<T: Element> RowPass<'_, '_, T> {
    fn barrier(&mut self) {
        if let Some(t) = self.tracker.as_deref_mut() {
            t.barrier();
        }
        self.stats.barriers += 1;
    }

    fn track(&mut self, write: bool, region: Region) {
        if let Some(t) = self.tracker.as_deref_mut() {
            if write {
                t.write(region);
            } else {
                t.read(region);
            }
        }
    }

    /// Places worker `w` on its first element of tile `t`. Returns the
    /// tile-local row and the worker's lane within the row.
    fn place(&mut self, w: usize, t: usize) -> Result<(usize, usize), EngineError> {
        let cfg = &self.kernel.config;
        let wpr = cfg.workers_per_row();
        let (row, lane) = (w / wpr, w % wpr);
        reset_coordinate(
            &self.kernel.desc,
            &mut self.cursors[w],
            &[self.row0 + row, t * cfg.k_per_tile + lane],
        )?;
        Ok((row, lane))
    }

    fn load_tile(&mut self, t: usize) -> Result<(), EngineError> {
        let k = self.kernel;
        let kpt = k.config.k_per_tile;
        let wpr = k.config.workers_per_row();
        let per_worker = kpt / wpr;

        self.barrier();
        self.track(true, Region::Tile);
        for w in 0..k.config.block_size {
            let (row, lane) = self.place(w, t)?;
            let cursor = &mut self.cursors[w];
            for i in 0..per_worker {
                if i > 0 {
                    move_coordinate(&k.desc, cursor, &k.lane_step);
                }
                self.tile[row * kpt + lane + i * wpr] = if coordinate_has_valid_offset(&k.desc, cursor) {
                    k.x.load(cursor.offset() as usize).to_f32()
                } else {
                    f32::NAN
                };
            }
        }
        self.stats.vector_reads += (k.config.block_size * per_worker) as u64;
        self.stats.scratch_writes += 1;
        self.barrier();
        Ok(())
    }

    /// Reduces `f(x, row)` over every row of the group into `out`.
    fn reduce(
        &mut self,
        op: ReduceOp,
        resident: bool,
        out: &mut [f32],
        f: impl Fn(f32, usize) -> f32,
    ) -> Result<(), EngineError> {
        let cfg = &self.kernel.config;
        let (kpt, wpr) = (cfg.k_per_tile, cfg.workers_per_row());
        self.regs.fill(op.identity());
        for t in 0..self.kernel.num_tiles {
            if !resident {
                self.load_tile(t)?;
            }
            self.track(false, Region::Tile);
            for (w, reg) in self.regs.iter_mut().enumerate() {
                let (row, lane) = (w / wpr, w % wpr);
                for j in (lane..kpt).step_by(wpr) {
                    accumulate_nan_ignore(op, reg, f(self.tile[row * kpt + j], row));
                }
            }
        }

        self.barrier();
        self.track(true, Region::Partials);
        self.partials[..self.regs.len()].copy_from_slice(&*self.regs);
        self.stats.scratch_writes += 1;
        self.barrier();
        self.track(false, Region::Partials);
        for (row, acc) in out.iter_mut().enumerate() {
            *acc = op.identity();
            for &p in &self.partials[row * wpr..(row + 1) * wpr] {
                op.combine(acc, p);
            }
        }
        Ok(())
    }

    fn write_output(&mut self, resident: bool, row_max: &[f32], row_sum: &[f32]) -> Result<(), EngineError> {
        let k = self.kernel;
        let (alpha, beta) = (k.problem.alpha, k.problem.beta);
        let kpt = k.config.k_per_tile;
        let wpr = k.config.workers_per_row();
        let per_worker = kpt / wpr;

        for t in 0..k.num_tiles {
            if !resident {
                self.load_tile(t)?;
            }
            self.track(false, Region::Tile);
            let mut written = 0u64;
            for w in 0..k.config.block_size {
                let (row, lane) = self.place(w, t)?;
                let cursor = &mut self.cursors[w];
                for i in 0..per_worker {
                    if i > 0 {
                        move_coordinate(&k.desc, cursor, &k.lane_step);
                    }
                    if !coordinate_has_valid_offset(&k.desc, cursor) {
                        continue;
                    }
                    let offset = cursor.offset() as usize;
                    let x = self.tile[row * kpt + lane + i * wpr];
                    let mut y = alpha * (x - row_max[row]).exp() / row_sum[row];
                    if beta != 0.0 {
                        y += beta * k.y.load(offset).to_f32();
                    }
                    k.y.store(offset, T::from_f32(y));
                    written += 1;
                }
            }
            self.stats.vector_writes += written;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use scratch_memory::ScratchBudget;
    use tensor_core::ops::reference::{max_relative_error, softmax_rows};
    use tensor_core::{Shape, Tensor};

    fn threads() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn input(rows: usize, cols: usize) -> Vec<f32> {
        (0..rows * cols)
            .map(|i| ((i * 37 % 101) as f32 - 50.0) / 17.0)
            .collect()
    }

    fn run(problem: &SoftmaxProblem, config: &SoftmaxConfig, x: &[f32], y0: &[f32]) -> (Vec<f32>, LaunchMetrics) {
        let xb = DeviceBuffer::from_slice(x);
        let yb = DeviceBuffer::from_slice(y0);
        let kernel = GridwiseSoftmax::new(problem, config, &xb, &yb)
            .unwrap()
            .with_scratch_validation(true);
        let pool = ScratchPool::new(ScratchBudget::from_kb(64));
        let metrics = kernel.launch(&pool, &threads()).unwrap();
        (yb.to_vec(), metrics)
    }

    fn reference(problem: &SoftmaxProblem, x: &[f32], y0: &[f32]) -> Vec<f32> {
        let shape = Shape::matrix(problem.rows, problem.cols);
        let x = Tensor::from_vec(shape.clone(), x.to_vec()).unwrap();
        let prior = Tensor::from_vec(shape, y0.to_vec()).unwrap();
        softmax_rows(&x, problem.alpha, problem.beta, Some(&prior))
            .unwrap()
            .as_slice()
            .to_vec()
    }

    #[test]
    fn test_config_validation() {
        assert!(SoftmaxConfig::default().validate().is_ok());
        let bad = SoftmaxConfig {
            block_size: 64,
            rows_per_group: 3,
            k_per_tile: 64,
        };
        assert!(bad.validate().is_err());
        let bad = SoftmaxConfig {
            block_size: 64,
            rows_per_group: 4,
            k_per_tile: 24,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_multi_pass_with_padding() {
        // 7 rows pad to 8; 100 columns pad to 4 tiles of 32.
        let config = SoftmaxConfig {
            block_size: 16,
            rows_per_group: 4,
            k_per_tile: 32,
        };
        let problem = SoftmaxProblem::new(7, 100);
        let x = input(7, 100);
        let y0 = vec![0.0; 700];
        let (y, metrics) = run(&problem, &config, &x, &y0);
        assert_eq!(metrics.kernel, "softmax/multi-pass");
        assert_eq!(metrics.groups, 2);
        assert_eq!(metrics.totals.hazard_violations, 0);
        assert!(max_relative_error(&y, &reference(&problem, &x, &y0)) < 1e-5);
        for r in 0..7 {
            let sum: f32 = y[r * 100..(r + 1) * 100].iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "row {r} sums to {sum}");
        }
    }

    #[test]
    fn test_sweep_once_blends_prior() {
        let problem = SoftmaxProblem {
            alpha: 2.0,
            beta: 0.5,
            ..SoftmaxProblem::new(5, 40)
        };
        let x = input(5, 40);
        let y0: Vec<f32> = (0..200).map(|i| i as f32 / 100.0).collect();
        let (y, metrics) = run(&problem, &SoftmaxConfig::default(), &x, &y0);
        assert_eq!(metrics.kernel, "softmax/sweep-once");
        assert_eq!(metrics.totals.hazard_violations, 0);
        assert!(max_relative_error(&y, &reference(&problem, &x, &y0)) < 1e-5);
    }

    #[test]
    fn test_padding_is_untouched() {
        // Y is larger than the problem; the tail must keep its sentinel.
        let problem = SoftmaxProblem::new(3, 10);
        let xb = DeviceBuffer::from_slice(&input(3, 10));
        let yb = DeviceBuffer::from_slice(&[-7.0f32; 40]);
        let kernel = GridwiseSoftmax::new(&problem, &SoftmaxConfig::default(), &xb, &yb).unwrap();
        kernel
            .launch(&ScratchPool::new(ScratchBudget::from_kb(64)), &threads())
            .unwrap();
        let y = yb.to_vec();
        assert!(y[..30].iter().all(|&v| v > 0.0 && v < 1.0));
        assert!(y[30..].iter().all(|&v| v == -7.0));
    }

    #[test]
    fn test_nan_input_is_discarded() {
        let problem = SoftmaxProblem::new(1, 4);
        let x = [1.0, f32::NAN, 1.0, 1.0];
        let (y, _) = run(&problem, &SoftmaxConfig::default(), &x, &[0.0; 4]);
        assert!((y[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!(y[1].is_nan());
    }

    #[test]
    fn test_f16_and_dtype_mismatch() {
        let problem = SoftmaxProblem::new(2, 8);
        let x = DeviceBuffer::from_slice(&[f16::from_f32(0.5); 16]);
        let y = DeviceBuffer::<f16>::zeroed(16);
        assert!(matches!(
            GridwiseSoftmax::new(&problem, &SoftmaxConfig::default(), &x, &y),
            Err(EngineError::DTypeMismatch { .. })
        ));

        let problem = SoftmaxProblem {
            dtype: tensor_core::DType::F16,
            ..problem
        };
        let kernel = GridwiseSoftmax::new(&problem, &SoftmaxConfig::default(), &x, &y).unwrap();
        kernel
            .launch(&ScratchPool::new(ScratchBudget::from_kb(64)), &threads())
            .unwrap();
        assert!(y.to_f32_vec().iter().all(|&v| v == 0.125));
    }

    #[test]
    fn test_short_output_rejected() {
        let problem = SoftmaxProblem::new(4, 4);
        let x = DeviceBuffer::<f32>::zeroed(16);
        let y = DeviceBuffer::<f32>::zeroed(15);
        assert!(matches!(
            GridwiseSoftmax::new(&problem, &SoftmaxConfig::default(), &x, &y),
            Err(EngineError::BufferTooSmall { .. })
        ));
    }
}
