// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the GEMM engine.

use tensor_core::DType;

/// Errors that can occur while configuring, planning or launching a kernel.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The launch cannot be served by this configuration.
    #[error("unsupported argument: {0}")]
    UnsupportedArgument(String),

    /// An operand buffer does not cover its descriptor's element space.
    #[error("{operand} buffer holds {actual} elements, descriptor needs {required}")]
    BufferTooSmall {
        operand: &'static str,
        required: usize,
        actual: usize,
    },

    /// The element type of the supplied buffers differs from the problem's.
    #[error("problem is {expected}, buffers are {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// A worker could not set up its per-group state.
    #[error("work-group setup failed: {0}")]
    GroupSetup(String),

    /// The worker thread pool could not be built.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Descriptor construction or coordinate placement failed.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] tensor_desc::DescriptorError),

    /// The launch plan or its validity check failed.
    #[error("planner error: {0}")]
    Plan(#[from] tile_planner::PlanError),

    /// Scratch memory could not be acquired or partitioned.
    #[error("scratch error: {0}")]
    Scratch(#[from] scratch_memory::ScratchError),

    /// The configuration exceeds a device limit.
    #[error("device error: {0}")]
    Device(#[from] device_info::DeviceError),

    /// Problem validation or lowering failed.
    #[error("problem error: {0}")]
    Problem(#[from] problem_ir::ProblemError),

    /// Host tensor construction failed.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
