// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for problem definitions and lowering.

use tensor_core::TensorError;
use tensor_desc::DescriptorError;

/// Errors that can occur while loading, validating or lowering a problem.
#[derive(Debug, thiserror::Error)]
pub enum ProblemError {
    /// The manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A problem definition is inconsistent (zero extent, short stride, ...).
    #[error("invalid problem '{name}': {detail}")]
    InvalidProblem { name: String, detail: String },

    /// The problem cannot be lowered with the requested tile and
    /// specialization.
    #[error("unsupported problem: {0}")]
    Unsupported(String),

    /// Descriptor composition failed.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// A convolution geometry is invalid.
    #[error(transparent)]
    Geometry(#[from] TensorError),
}
