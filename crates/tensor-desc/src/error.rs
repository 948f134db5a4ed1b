// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for descriptor construction.

/// Errors raised while building transforms, adaptors or descriptors.
///
/// All of these are configuration errors: they surface when a descriptor is
/// composed, never while a coordinate is being moved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// A transform was constructed with inconsistent parameters.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// The transform list and the dimension groups have different lengths.
    #[error("{transforms} transforms but {lower} lower groups and {upper} upper groups")]
    GroupCountMismatch {
        transforms: usize,
        lower: usize,
        upper: usize,
    },

    /// A transform was given the wrong number of lower or upper dimensions.
    #[error("transform #{index} ({name}) expects {expected} {side} dimensions, got {got}")]
    ArityMismatch {
        index: usize,
        name: &'static str,
        side: &'static str,
        expected: usize,
        got: usize,
    },

    /// An existing visible dimension is not consumed exactly once.
    #[error("visible dimension {dim} is consumed {count} times, expected exactly once")]
    DimensionConsumption { dim: usize, count: usize },

    /// A new visible dimension is not defined exactly once.
    #[error("new visible dimension {dim} is defined {count} times, expected exactly once")]
    DimensionDefinition { dim: usize, count: usize },

    /// A transform's lower lengths disagree with the dimensions it consumes.
    #[error("transform #{index} ({name}) does not fit lower lengths {lower:?}: {detail}")]
    LengthMismatch {
        index: usize,
        name: &'static str,
        lower: Vec<usize>,
        detail: String,
    },

    /// A visible index lies outside the descriptor's lengths.
    #[error("index {index:?} out of range for lengths {lengths:?}")]
    IndexOutOfRange {
        index: Vec<usize>,
        lengths: Vec<usize>,
    },

    /// The number of indices does not match the number of visible dimensions.
    #[error("expected {expected} indices, got {got}")]
    RankMismatch { expected: usize, got: usize },

    /// A descriptor must resolve to exactly one bottom dimension.
    #[error("a tensor descriptor needs exactly one bottom dimension, got {0}")]
    NotADescriptor(usize),
}
