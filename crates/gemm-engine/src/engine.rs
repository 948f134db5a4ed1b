// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The kernel engine with a type-state–enforced pipeline.
//!
//! ```text
//! GemmEngine<Idle>
//!     │  .plan(entry)
//!     ▼
//! GemmEngine<Planned>
//!     │  .prepare()
//!     ▼
//! GemmEngine<Ready>
//!     │  .run_gemm() / .run_softmax()
//!     ▼
//!   LaunchMetrics
//! ```
//!
//! Each state transition consumes the old value and returns a new one, so
//! launching an unplanned problem is a compile error.

use crate::compute::{FragmentFma, MatrixFma, ScalarFma};
use crate::epilogue::{Epilogue, GridInput, GridOutput, WritePolicy};
use crate::gridwise::{GemmOperands, GridwiseGemm};
use crate::softmax::GridwiseSoftmax;
use crate::{Backend, EngineConfig, EngineError, LaunchMetrics};
use problem_ir::{
    lower_conv2d_fwd, lower_gemm, make_d_descriptor, EpilogueKind, GemmDescriptors, Problem,
    ProblemEntry, SoftmaxProblem,
};
use scratch_memory::{ScratchPool, ScratchStats};
use tensor_core::{
    AddAddFastGelu, AddBias, AddRelu, CElementwise, DType, DeviceBuffer, Element, FastGelu,
    PassThrough, Relu, Scale,
};
use tensor_desc::TensorDescriptor;
use tile_planner::{check_validity, LaunchPlan, TileConfig, TileGrid, TileOrder};

// ── Type-state markers ─────────────────────────────────────────

/// Engine is configured but has no problem.
#[derive(Debug)]
pub struct Idle;

/// A problem is lowered and its launch planned.
#[derive(Debug)]
pub struct Planned {
    kernel: KernelPlan,
}

/// Scratch pool and worker threads are up.
#[derive(Debug)]
pub struct Ready {
    kernel: KernelPlan,
    pool: ScratchPool,
    threads: rayon::ThreadPool,
}

/// Sealed trait for engine states.
pub trait EngineState: std::fmt::Debug {}
impl EngineState for Idle {}
impl EngineState for Planned {}
impl EngineState for Ready {}

// ── Plans ──────────────────────────────────────────────────────

/// A lowered GEMM or convolution and its launch plan.
#[derive(Debug)]
pub struct GemmLaunch {
    pub entry: ProblemEntry,
    pub descs: GemmDescriptors,
    pub plan: LaunchPlan,
    pub order: Box<dyn TileOrder>,
}

impl GemmLaunch {
    /// Split-K launches accumulate partial results into C.
    pub fn write_policy(&self) -> WritePolicy {
        if self.descs.k_batch > 1 {
            WritePolicy::AtomicAdd
        } else {
            WritePolicy::Set
        }
    }
}

/// What a planned engine launches.
#[derive(Debug)]
pub enum KernelPlan {
    Gemm(Box<GemmLaunch>),
    Softmax {
        name: String,
        problem: SoftmaxProblem,
    },
}

impl KernelPlan {
    pub fn name(&self) -> &str {
        match self {
            KernelPlan::Gemm(g) => &g.entry.name,
            KernelPlan::Softmax { name, .. } => name,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            KernelPlan::Gemm(g) => format!(
                "{}\n  {}\n  {}",
                g.entry.summary(),
                g.descs.summary(),
                g.plan.summary()
            ),
            KernelPlan::Softmax { name, problem } => format!("{name}: {}", problem.summary()),
        }
    }
}

/// A `D` operand of a fused epilogue: a buffer and its `[M, N]` strides.
#[derive(Debug, Clone, Copy)]
pub struct DTensor<'a, T: Element> {
    pub buf: &'a DeviceBuffer<T>,
    pub strides: [usize; 2],
}

impl<'a, T: Element> DTensor<'a, T> {
    /// A length-N bias broadcast along M.
    pub fn bias(buf: &'a DeviceBuffer<T>) -> Self {
        Self { buf, strides: [0, 1] }
    }

    /// A full row-major matrix with leading dimension `ld`.
    pub fn matrix(buf: &'a DeviceBuffer<T>, ld: usize) -> Self {
        Self { buf, strides: [ld, 1] }
    }
}

// ── Engine ─────────────────────────────────────────────────────

/// The kernel engine.
///
/// # Example
/// ```no_run
/// use gemm_engine::{EngineConfig, GemmEngine};
/// use problem_ir::{GemmProblem, Problem};
/// use tensor_core::DeviceBuffer;
///
/// # fn example() -> Result<(), gemm_engine::EngineError> {
/// let engine = GemmEngine::new(EngineConfig::default())?
///     .plan_problem("demo", Problem::Gemm(GemmProblem::new(256, 256, 256)))?
///     .prepare()?;
/// let a = DeviceBuffer::<f32>::zeroed(256 * 256);
/// let b = DeviceBuffer::<f32>::zeroed(256 * 256);
/// let c = DeviceBuffer::<f32>::zeroed(256 * 256);
/// let metrics = engine.run_gemm(&a, &b, &c, &[])?;
/// println!("{}", metrics.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GemmEngine<S: EngineState = Idle> {
    config: EngineConfig,
    tile: TileConfig,
    state: S,
}

impl<S: EngineState> GemmEngine<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tile(&self) -> &TileConfig {
        &self.tile
    }
}

// ── Idle → Planned ─────────────────────────────────────────────

impl GemmEngine<Idle> {
    /// Creates an engine after checking the configuration.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let tile = config.tile_config()?;
        tracing::info!(
            "engine created: {} backend, {} pipeline, {} order",
            config.backend,
            config.pipeline,
            config.tile_order
        );
        Ok(Self {
            config,
            tile,
            state: Idle,
        })
    }

    /// Plans a problem with the configuration's specialization, split-K
    /// factor and no epilogue.
    pub fn plan_problem(
        self,
        name: impl Into<String>,
        problem: Problem,
    ) -> Result<GemmEngine<Planned>, EngineError> {
        let entry = ProblemEntry {
            specialization: self.config.specialization,
            k_batch: self.config.k_batch,
            ..ProblemEntry::new(name, problem)
        };
        self.plan(&entry)
    }

    /// Lowers a problem and plans its launch.
    ///
    /// Steps:
    /// 1. Validate the problem.
    /// 2. Lower it to `[KBatch, K0, M, K1]` / `[KBatch, K0, N, K1]` / `[M, N]`
    ///    grids.
    /// 3. Build the tile order and check the launch against the grids.
    /// 4. Check the plan against the device and the scratch budget.
    pub fn plan(self, entry: &ProblemEntry) -> Result<GemmEngine<Planned>, EngineError> {
        entry.problem.validate()?;
        let budget = self.config.parse_budget()?;
        let device = device_info::device_props();

        let descs = match &entry.problem {
            Problem::Gemm(p) => lower_gemm(p, &self.tile, entry.specialization, entry.k_batch)?,
            Problem::Conv2dFwd(p) => {
                lower_conv2d_fwd(p, &self.tile, entry.specialization, entry.k_batch)?
            }
            Problem::Softmax(p) => {
                let softmax = &self.config.softmax;
                device.check_block_size(softmax.block_size)?;
                device.check_scratch(softmax.layout().bytes())?;
                check_budget(softmax.layout().bytes(), budget.as_bytes())?;
                tracing::info!("planned {}", p.summary());
                return Ok(self.into_planned(KernelPlan::Softmax {
                    name: entry.name.clone(),
                    problem: p.clone(),
                }));
            }
        };
        tracing::debug!("lowered {}: {}", entry.name, descs.summary());

        if descs.k_batch > 1 {
            check_split_k(entry)?;
        }

        let tile = &self.tile;
        let m_tiles = descs.m_padded / tile.m_per_block;
        let n_tiles = descs.n_padded / tile.n_per_block;
        let order = self
            .config
            .create_tile_order(TileGrid::new(descs.k_batch, m_tiles, n_tiles))?;
        check_validity(&descs.a, &descs.b, &descs.c, tile, order.as_ref())?;

        let plan = LaunchPlan::new(
            tile,
            order.as_ref(),
            m_tiles,
            n_tiles,
            descs.k_batch,
            descs.k_per_batch(),
            self.config.pipeline,
            self.config.c_shuffle,
        );
        device.check_block_size(plan.block_size)?;
        device.check_scratch(plan.scratch_bytes())?;
        check_budget(plan.scratch_bytes(), budget.as_bytes())?;
        tracing::info!("planned {}: {}", entry.name, plan.summary());

        Ok(self.into_planned(KernelPlan::Gemm(Box::new(GemmLaunch {
            entry: entry.clone(),
            descs,
            plan,
            order,
        }))))
    }

    fn into_planned(self, kernel: KernelPlan) -> GemmEngine<Planned> {
        GemmEngine {
            config: self.config,
            tile: self.tile,
            state: Planned { kernel },
        }
    }
}

fn check_budget(bytes: usize, budget: usize) -> Result<(), EngineError> {
    if bytes > budget {
        return Err(EngineError::UnsupportedArgument(format!(
            "plan needs {bytes} B of scratch per group, budget is {budget} B"
        )));
    }
    Ok(())
}

/// Partial products are summed in C with atomic adds, so the output must
/// be f32 and the epilogue linear in the accumulator.
fn check_split_k(entry: &ProblemEntry) -> Result<(), EngineError> {
    let dtype = entry.problem.dtype();
    if dtype != DType::F32 {
        return Err(EngineError::UnsupportedArgument(format!(
            "split-K accumulates with atomic adds and needs f32 output, problem is {dtype}"
        )));
    }
    if !matches!(entry.epilogue, EpilogueKind::PassThrough | EpilogueKind::Scale { .. }) {
        return Err(EngineError::UnsupportedArgument(format!(
            "epilogue {} cannot be applied to split-K partial results",
            entry.epilogue
        )));
    }
    Ok(())
}

// ── Planned → Ready ────────────────────────────────────────────

impl GemmEngine<Planned> {
    pub fn kernel(&self) -> &KernelPlan {
        &self.state.kernel
    }

    /// Creates the scratch pool and the worker threads.
    pub fn prepare(self) -> Result<GemmEngine<Ready>, EngineError> {
        let budget = self.config.parse_budget()?;
        let pool = ScratchPool::new(budget);
        let workers = self.config.resolve_threads();
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tgemm-worker-{i}"))
            .build()
            .map_err(|e| EngineError::ThreadPool(e.to_string()))?;
        tracing::info!("scratch pool: {budget} per group, {workers} worker threads");

        Ok(GemmEngine {
            config: self.config,
            tile: self.tile,
            state: Ready {
                kernel: self.state.kernel,
                pool,
                threads,
            },
        })
    }
}

// ── Ready: launches ────────────────────────────────────────────

impl GemmEngine<Ready> {
    pub fn kernel(&self) -> &KernelPlan {
        &self.state.kernel
    }

    pub fn scratch_stats(&self) -> ScratchStats {
        self.state.pool.stats()
    }

    /// Runs the planned GEMM or convolution with the entry's epilogue.
    ///
    /// `ds` supplies the epilogue's `D` inputs. For split-K plans the
    /// logical C elements are cleared before the partial products are
    /// added in.
    pub fn run_gemm<T: Element>(
        &self,
        a: &DeviceBuffer<T>,
        b: &DeviceBuffer<T>,
        c: &DeviceBuffer<T>,
        ds: &[DTensor<'_, T>],
    ) -> Result<LaunchMetrics, EngineError> {
        let launch = self.gemm_launch()?;
        match launch.entry.epilogue {
            EpilogueKind::PassThrough => self.run_gemm_with(PassThrough, a, b, c, ds),
            EpilogueKind::Scale { alpha } => self.run_gemm_with(Scale { alpha }, a, b, c, ds),
            EpilogueKind::Relu => self.run_gemm_with(Relu, a, b, c, ds),
            EpilogueKind::FastGelu => self.run_gemm_with(FastGelu, a, b, c, ds),
            EpilogueKind::AddBias => self.run_gemm_with(AddBias, a, b, c, ds),
            EpilogueKind::AddRelu => self.run_gemm_with(AddRelu, a, b, c, ds),
            EpilogueKind::AddAddFastGelu => self.run_gemm_with(AddAddFastGelu, a, b, c, ds),
        }
    }

    /// Runs the planned GEMM or convolution with an explicit operator.
    pub fn run_gemm_with<T: Element, E: CElementwise>(
        &self,
        op: E,
        a: &DeviceBuffer<T>,
        b: &DeviceBuffer<T>,
        c: &DeviceBuffer<T>,
        ds: &[DTensor<'_, T>],
    ) -> Result<LaunchMetrics, EngineError> {
        let launch = self.gemm_launch()?;
        let expected = launch.entry.problem.dtype();
        if T::DTYPE != expected {
            return Err(EngineError::DTypeMismatch {
                expected,
                actual: T::DTYPE,
            });
        }

        let descs = &launch.descs;
        let d_descs: Vec<TensorDescriptor> = ds
            .iter()
            .map(|d| make_d_descriptor(descs, d.strides))
            .collect::<Result<_, _>>()?;
        let inputs = ds
            .iter()
            .zip(&d_descs)
            .map(|(d, desc)| GridInput::new(desc, d.buf))
            .collect::<Result<Vec<_>, _>>()?;

        let policy = launch.write_policy();
        let output = GridOutput::new(&descs.c, c, policy)?;
        if policy == WritePolicy::AtomicAdd {
            clear_output(descs, c)?;
        }
        let epilogue = Epilogue::new(op, output, inputs, self.tile.m_per_block, self.tile.n_per_block)?;
        let operands = GemmOperands {
            a_grid: &descs.a,
            b_grid: &descs.b,
            a,
            b,
        };

        let metrics = match self.config.backend {
            Backend::Fragment if device_info::device_props().has_matrix_unit => {
                self.launch_gemm(launch, operands, epilogue, FragmentFma)?
            }
            Backend::Fragment => {
                tracing::warn!("no matrix unit on this device, falling back to the scalar backend");
                self.launch_gemm(launch, operands, epilogue, ScalarFma)?
            }
            Backend::Scalar => self.launch_gemm(launch, operands, epilogue, ScalarFma)?,
        };
        tracing::info!("{}: {}", launch.entry.name, metrics.summary());
        Ok(metrics)
    }

    fn launch_gemm<'a, T: Element, E: CElementwise, F: MatrixFma>(
        &'a self,
        launch: &'a GemmLaunch,
        operands: GemmOperands<'a, T>,
        epilogue: Epilogue<'a, T, E>,
        fma: F,
    ) -> Result<LaunchMetrics, EngineError> {
        let kernel = GridwiseGemm::new(&launch.plan, launch.order.as_ref(), operands, epilogue, fma)?
            .with_scratch_validation(self.config.validate_scratch);
        Ok(kernel
            .launch(&self.state.pool, &self.state.threads)?
            .with_flops(launch.entry.problem.flops()))
    }

    /// Runs the planned softmax, reading the prior output from `y` when
    /// β is non-zero.
    pub fn run_softmax<T: Element>(
        &self,
        x: &DeviceBuffer<T>,
        y: &DeviceBuffer<T>,
    ) -> Result<LaunchMetrics, EngineError> {
        let KernelPlan::Softmax { name, problem } = &self.state.kernel else {
            return Err(EngineError::UnsupportedArgument(format!(
                "'{}' is not a softmax problem",
                self.state.kernel.name()
            )));
        };
        let kernel = GridwiseSoftmax::new(problem, &self.config.softmax, x, y)?
            .with_scratch_validation(self.config.validate_scratch);
        let metrics = kernel
            .launch(&self.state.pool, &self.state.threads)?
            .with_flops(softmax_flops(problem));
        tracing::info!("{name}: {}", metrics.summary());
        Ok(metrics)
    }

    fn gemm_launch(&self) -> Result<&GemmLaunch, EngineError> {
        match &self.state.kernel {
            KernelPlan::Gemm(launch) => Ok(launch),
            KernelPlan::Softmax { name, .. } => Err(EngineError::UnsupportedArgument(format!(
                "'{name}' is a softmax problem"
            ))),
        }
    }
}

/// Zeroes the logical `[M, N]` elements of C.
fn clear_output<T: Element>(descs: &GemmDescriptors, c: &DeviceBuffer<T>) -> Result<(), EngineError> {
    for i in 0..descs.m {
        for j in 0..descs.n {
            let mapped = descs.c.offset(&[i, j])?;
            if mapped.valid {
                c.store(mapped.offset as usize, T::default());
            }
        }
    }
    Ok(())
}

/// max, subtract, exp, sum, divide and blend per element.
fn softmax_flops(problem: &SoftmaxProblem) -> u64 {
    6 * (problem.rows * problem.cols) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use problem_ir::{GemmProblem, GemmSpecialization};

    fn config() -> EngineConfig {
        EngineConfig {
            tile_preset: "small".into(),
            num_threads: Some(2),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_type_state_pipeline() {
        let engine = GemmEngine::new(config())
            .unwrap()
            .plan_problem("g", Problem::Gemm(GemmProblem::new(64, 64, 64)))
            .unwrap();
        assert_eq!(engine.kernel().name(), "g");
        assert!(engine.kernel().summary().contains("groups"));
        let ready = engine.prepare().unwrap();

        let a = DeviceBuffer::from_slice(&vec![1.0f32; 64 * 64]);
        let b = DeviceBuffer::from_slice(&vec![0.5f32; 64 * 64]);
        let c = DeviceBuffer::<f32>::zeroed(64 * 64);
        let metrics = ready.run_gemm(&a, &b, &c, &[]).unwrap();
        assert!(c.to_vec().iter().all(|&v| v == 32.0));
        assert_eq!(metrics.flops, 2 * 64 * 64 * 64);
        assert!(ready.scratch_stats().acquisitions >= 1);
    }

    #[test]
    fn test_dtype_mismatch() {
        let ready = GemmEngine::new(config())
            .unwrap()
            .plan_problem("g", Problem::Gemm(GemmProblem::new(32, 32, 32)))
            .unwrap()
            .prepare()
            .unwrap();
        let buf = DeviceBuffer::<half::f16>::zeroed(32 * 32);
        assert!(matches!(
            ready.run_gemm(&buf, &buf, &buf, &[]),
            Err(EngineError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_split_k_rejects_nonlinear_epilogue_and_f16() {
        let mut entry = ProblemEntry::new("g", Problem::Gemm(GemmProblem::new(64, 64, 256)));
        entry.k_batch = 4;
        entry.epilogue = EpilogueKind::Relu;
        let err = GemmEngine::new(config()).unwrap().plan(&entry).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedArgument(_)));

        entry.epilogue = EpilogueKind::PassThrough;
        entry.problem = Problem::Gemm(GemmProblem::new(64, 64, 256).with_dtype(DType::F16));
        let err = GemmEngine::new(config()).unwrap().plan(&entry).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedArgument(_)));
    }

    #[test]
    fn test_default_specialization_rejects_ragged_problem() {
        let mut entry = ProblemEntry::new("g", Problem::Gemm(GemmProblem::new(33, 64, 64)));
        assert!(GemmEngine::new(config()).unwrap().plan(&entry).is_err());
        entry.specialization = GemmSpecialization::MnkPadding;
        assert!(GemmEngine::new(config()).unwrap().plan(&entry).is_ok());
    }

    #[test]
    fn test_budget_too_small() {
        let cfg = EngineConfig {
            scratch_budget: "1K".into(),
            ..config()
        };
        let err = GemmEngine::new(cfg)
            .unwrap()
            .plan_problem("g", Problem::Gemm(GemmProblem::new(64, 64, 64)))
            .unwrap_err();
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn test_softmax_plan_cannot_run_gemm() {
        let ready = GemmEngine::new(config())
            .unwrap()
            .plan_problem("s", Problem::Softmax(SoftmaxProblem::new(4, 16)))
            .unwrap()
            .prepare()
            .unwrap();
        let x = DeviceBuffer::<f32>::zeroed(64);
        let y = DeviceBuffer::<f32>::zeroed(64);
        assert!(ready.run_gemm(&x, &x, &y, &[]).is_err());
        ready.run_softmax(&x, &y).unwrap();
        assert!(y.to_vec().iter().all(|&v| v == 1.0 / 16.0));
    }
}
