// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # gemm-engine
//!
//! Block-tiled GEMM, implicit-GEMM convolution and row softmax over the
//! simulated device.
//!
//! A launch is a grid of work-groups. Each group owns one output tile and
//! walks the reduction dimension in steps of `K0PerBlock × K1`:
//!
//! ```text
//!   global A/B ──BlockwiseCopy──▶ registers ──▶ scratch stage ──BlockwiseGemm──▶ accumulators
//!                                                                                   │
//!   global C ◀──────────────── Epilogue (fused op, Set / AtomicAdd) ◀── [C shuffle] ┘
//! ```
//!
//! The engine takes:
//! - A [`ProblemEntry`](problem_ir::ProblemEntry) from `problem-ir`, lowered
//!   to grid descriptors.
//! - A [`LaunchPlan`](tile_planner::LaunchPlan) and tile order from
//!   `tile-planner`.
//! - Per-group arenas from `scratch-memory`.
//!
//! # Type-State Pipeline
//! ```text
//! GemmEngine<Idle> → GemmEngine<Planned> → GemmEngine<Ready>
//! ```
//! Transitions are compile-time checked.
//!
//! # Parallel Execution
//! Work-groups are independent and run on a `rayon` pool with one reusable
//! group context per worker thread.

mod compute;
mod config;
mod engine;
mod epilogue;
mod error;
mod gridwise;
mod metrics;
mod mover;
mod softmax;

pub use compute::{AccumulatorTile, BlockwiseGemm, FragmentFma, MatrixFma, ScalarFma};
pub use config::{Backend, EngineConfig};
pub use engine::{
    DTensor, EngineState, GemmEngine, GemmLaunch, Idle, KernelPlan, Planned, Ready,
};
pub use epilogue::{Epilogue, EpilogueCursors, GridInput, GridOutput, WritePolicy, MAX_D};
pub use error::EngineError;
pub use gridwise::{GemmOperands, GridwiseGemm};
pub use metrics::{GroupStats, LaunchMetrics};
pub use mover::{scratch_tile_descriptor, BlockwiseCopy, CopyShape};
pub use softmax::{GridwiseSoftmax, SoftmaxConfig};
