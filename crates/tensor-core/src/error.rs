// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for host tensors and reference kernels.

use crate::Shape;

/// Errors that can occur while building tensors or running reference kernels.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TensorError {
    /// The provided element count does not match the shape.
    #[error("buffer size mismatch: expected {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// A convolution geometry yields an empty or negative output.
    #[error("invalid convolution geometry: {0}")]
    InvalidGeometry(String),
}
