// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-desc
//!
//! Composable coordinate transforms that map logical multi-dimensional
//! indices to linear memory offsets.
//!
//! # Key Components
//!
//! - [`Transform`]: one mapping between an *upper* (logical) index space
//!   and a *lower* (more physical) one: PassThrough, Pad, Merge, Unmerge,
//!   Embed, Freeze.
//! - [`TensorAdaptor`]: an ordered chain of transforms over numbered
//!   *hidden* dimensions, from bottom dimensions up to the visible top.
//! - [`TensorDescriptor`]: an adaptor with a single bottom dimension (the
//!   element offset) plus the size of the element space.
//! - [`TensorCoordinate`] / [`CoordinateStep`]: a cached hidden-index
//!   vector and a precomputed move, so a moving window is advanced by
//!   propagating index *differences* instead of recomputing the chain.
//!
//! # Hidden Dimensions
//!
//! ```text
//!  top:     [gemm_k]            [gemm_m]                ← visible
//!              │ Merge(Y,X,C)      │ Merge(N,Ho,Wo)
//!  hidden:  [y][x][c]          [n][ho][wo]
//!              │ Embed(y,ho)  Embed(x,wo)
//!  hidden:  [n][hip][wip][c]
//!              │ Pad(hi)  Pad(wi)
//!  hidden:  [n][hi][wi][c]
//!              │ Embed(strides)
//!  bottom:  [offset]                                    ← memory
//! ```
//!
//! Every transform consumes hidden dimensions produced by the transforms
//! below it and defines new ones. Composition is checked when a descriptor
//! is built: a chain that does not consume each visible dimension exactly
//! once, or whose lengths disagree, is a [`DescriptorError`].
//!
//! # Example
//! ```
//! use tensor_desc::{make_naive_descriptor_packed, Transform};
//!
//! // A 6×10 row-major matrix, right-padded to 8×16 for 4×8 tiles.
//! let desc = make_naive_descriptor_packed(&[6, 10]).unwrap();
//! let padded = desc
//!     .transform(
//!         vec![Transform::right_pad(6, 2), Transform::right_pad(10, 6)],
//!         vec![vec![0], vec![1]],
//!         vec![vec![0], vec![1]],
//!     )
//!     .unwrap();
//! assert_eq!(padded.lengths(), vec![8, 16]);
//! assert!(padded.offset(&[5, 9]).unwrap().valid);
//! assert!(!padded.offset(&[6, 0]).unwrap().valid);
//! ```

mod adaptor;
mod coordinate;
mod descriptor;
mod error;
mod transform;

pub use adaptor::TensorAdaptor;
pub use coordinate::{
    coordinate_has_valid_offset, coordinate_has_valid_offset_assuming_visible_index_is_valid,
    make_coordinate, make_coordinate_step, move_coordinate, reset_coordinate, CoordinateStep,
    TensorCoordinate,
};
pub use descriptor::{
    make_naive_descriptor, make_naive_descriptor_aligned, make_naive_descriptor_packed,
    MappedOffset, TensorDescriptor,
};
pub use error::DescriptorError;
pub use transform::Transform;

/// Signed index type used for hidden indices and index differences.
///
/// Padding may map a logical index to a negative or past-the-end physical
/// index, so hidden indices are signed.
pub type Index = i64;
