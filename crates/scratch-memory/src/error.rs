// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for scratch memory.

/// Errors raised while sizing, acquiring or partitioning scratch memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScratchError {
    /// The requested arena does not fit in the per-group scratch budget.
    #[error("scratch over budget: requested {requested_bytes} bytes, budget is {budget_bytes}")]
    OverBudget {
        requested_bytes: usize,
        budget_bytes: usize,
    },

    /// Attempted to acquire an empty arena.
    #[error("cannot acquire zero-sized scratch")]
    ZeroSized,

    /// A budget string could not be parsed.
    #[error("invalid scratch budget '{0}': expected a number followed by an optional suffix (B, K, M)")]
    InvalidBudget(String),

    /// A buffer is too small for the layout partitioned over it.
    #[error("buffer holds {actual} lanes but the layout needs {required}")]
    BufferTooSmall { required: usize, actual: usize },
}
