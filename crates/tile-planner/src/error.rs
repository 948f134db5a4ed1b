// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for launch planning.

/// Errors raised while planning a launch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The tile configuration or tile order is internally inconsistent.
    #[error("invalid tile configuration: {0}")]
    InvalidTileConfig(String),

    /// The problem cannot be served by this configuration. Callers may fall
    /// back to another one.
    #[error("unsupported argument: {0}")]
    UnsupportedArgument(String),

    /// Unknown preset or tile order name.
    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("descriptor error: {0}")]
    Descriptor(#[from] tensor_desc::DescriptorError),

    #[error("scratch error: {0}")]
    Scratch(#[from] scratch_memory::ScratchError),
}
