// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # problem-ir
//!
//! A small intermediate representation for the dense problems the engine
//! launches, and their lowering to grid descriptors.
//!
//! - [`GemmProblem`]: `C = A·B` with per-operand [`Layout`] and leading
//!   strides.
//! - [`Conv2dFwdProblem`]: NHWC forward convolution, computed as an
//!   implicit GEMM.
//! - [`SoftmaxProblem`]: row softmax with α/β blending.
//! - [`lowering`]: builds the `[KBatch, K0, M, K1]` / `[KBatch, K0, N, K1]`
//!   / `[M, N]` descriptors for a tile, with optional M/N/K padding.
//! - [`ProblemManifest`]: a JSON list of named problems.
//!
//! # Example
//! ```
//! use problem_ir::{lower_gemm, GemmProblem, GemmSpecialization};
//! use tile_planner::TileConfig;
//!
//! let problem = GemmProblem::new(100, 60, 40);
//! let descs = lower_gemm(&problem, &TileConfig::default(), GemmSpecialization::MnkPadding, 1)
//!     .unwrap();
//! assert_eq!(descs.a.lengths(), vec![1, 12, 128, 4]);
//! assert_eq!(descs.c.lengths(), vec![128, 64]);
//! ```

mod epilogue;
mod error;
pub mod lowering;
mod manifest;
mod problem;

pub use epilogue::EpilogueKind;
pub use error::ProblemError;
pub use lowering::{
    conv_input_view, lower_conv2d_fwd, lower_gemm, make_d_descriptor, GemmDescriptors,
};
pub use manifest::{ProblemEntry, ProblemManifest};
pub use problem::{
    Conv2dFwdProblem, GemmProblem, GemmSpecialization, Layout, Problem, SoftmaxProblem,
};
