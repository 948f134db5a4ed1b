// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Coordinates that move through a descriptor without recomputing it.
//!
//! A [`TensorCoordinate`] caches every hidden index of a descriptor. A
//! [`CoordinateStep`] is built once per direction of travel and records
//! which transforms a given visible difference actually reaches. Moving a
//! coordinate applies the visible difference and pushes index differences
//! down through the marked transforms only:
//!
//! ```text
//!   top diff  [0, +4]          ── step.top_diff
//!               │
//!   merge(N,Ho,Wo)  ✓ marked   ── step.do_transforms[i]
//!   merge(Y,X,C)    · skipped
//!               │
//!   offset += Δ
//! ```

use crate::{DescriptorError, Index, TensorDescriptor};

/// Hidden-index cache for one position in a [`TensorDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorCoordinate {
    hidden: Vec<Index>,
    diff: Vec<Index>,
    offset_id: usize,
}

impl TensorCoordinate {
    /// Element offset of the current position.
    #[inline]
    pub fn offset(&self) -> Index {
        self.hidden[self.offset_id]
    }

    /// All hidden indices, bottom first.
    pub fn hidden(&self) -> &[Index] {
        &self.hidden
    }

    /// Current visible index.
    pub fn top_index(&self, desc: &TensorDescriptor) -> Vec<Index> {
        desc.adaptor()
            .top_ids()
            .iter()
            .map(|&id| self.hidden[id])
            .collect()
    }
}

/// A precomputed visible difference and the transforms it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateStep {
    top_diff: Vec<Index>,
    do_transforms: Vec<bool>,
}

impl CoordinateStep {
    /// The visible difference this step applies.
    pub fn top_diff(&self) -> &[Index] {
        &self.top_diff
    }

    /// Number of transforms a move along this step evaluates.
    pub fn num_active_transforms(&self) -> usize {
        self.do_transforms.iter().filter(|&&d| d).count()
    }
}

/// Builds a coordinate at a visible index.
pub fn make_coordinate(
    desc: &TensorDescriptor,
    idx: &[usize],
) -> Result<TensorCoordinate, DescriptorError> {
    let adaptor = desc.adaptor();
    adaptor.check_top_index(idx)?;

    let mut hidden = vec![0 as Index; adaptor.num_hidden()];
    for (&id, &v) in adaptor.top_ids().iter().zip(idx) {
        hidden[id] = v as Index;
    }
    adaptor.propagate_down(&mut hidden);

    Ok(TensorCoordinate {
        diff: vec![0; hidden.len()],
        hidden,
        offset_id: adaptor.bottom_ids()[0],
    })
}

/// Re-seats an existing coordinate at a visible index, reusing its storage.
pub fn reset_coordinate(
    desc: &TensorDescriptor,
    coord: &mut TensorCoordinate,
    idx: &[usize],
) -> Result<(), DescriptorError> {
    let adaptor = desc.adaptor();
    adaptor.check_top_index(idx)?;
    if coord.hidden.len() != adaptor.num_hidden() {
        return Err(DescriptorError::RankMismatch {
            expected: adaptor.num_hidden(),
            got: coord.hidden.len(),
        });
    }
    coord.hidden.fill(0);
    for (&id, &v) in adaptor.top_ids().iter().zip(idx) {
        coord.hidden[id] = v as Index;
    }
    adaptor.propagate_down(&mut coord.hidden);
    Ok(())
}

/// Precomputes a move by `top_diff` in the visible index space.
///
/// Walks the chain from the top and marks every transform with at least one
/// upper dimension that the difference can reach.
pub fn make_coordinate_step(
    desc: &TensorDescriptor,
    top_diff: &[Index],
) -> Result<CoordinateStep, DescriptorError> {
    let adaptor = desc.adaptor();
    if top_diff.len() != adaptor.num_top() {
        return Err(DescriptorError::RankMismatch {
            expected: adaptor.num_top(),
            got: top_diff.len(),
        });
    }

    let mut touched = vec![false; adaptor.num_hidden()];
    for (&id, &d) in adaptor.top_ids().iter().zip(top_diff) {
        touched[id] = d != 0;
    }

    let n = adaptor.transforms().len();
    let mut do_transforms = vec![false; n];
    for i in (0..n).rev() {
        if adaptor.upper_ids(i).iter().any(|&id| touched[id]) {
            do_transforms[i] = true;
            for &id in adaptor.lower_ids(i) {
                touched[id] = true;
            }
        }
    }

    Ok(CoordinateStep {
        top_diff: top_diff.to_vec(),
        do_transforms,
    })
}

/// Advances `coord` by `step`. Does not allocate.
///
/// The caller keeps the resulting visible index inside the descriptor's
/// lengths; a move past the end leaves the coordinate at an index no fresh
/// coordinate could be built at.
#[inline]
pub fn move_coordinate(desc: &TensorDescriptor, coord: &mut TensorCoordinate, step: &CoordinateStep) {
    let adaptor = desc.adaptor();
    coord.diff.fill(0);
    for (&id, &d) in adaptor.top_ids().iter().zip(&step.top_diff) {
        coord.hidden[id] += d;
        coord.diff[id] = d;
    }
    for (i, t) in adaptor.transforms().iter().enumerate().rev() {
        if step.do_transforms[i] {
            t.update_lower(
                &mut coord.hidden,
                &mut coord.diff,
                adaptor.lower_ids(i),
                adaptor.upper_ids(i),
            );
        }
    }
}

/// `true` if the coordinate's visible index is within the descriptor's
/// lengths and it maps to a valid element.
pub fn coordinate_has_valid_offset(desc: &TensorDescriptor, coord: &TensorCoordinate) -> bool {
    let adaptor = desc.adaptor();
    let in_range = adaptor
        .top_ids()
        .iter()
        .zip(adaptor.top_lengths())
        .all(|(&id, len)| coord.hidden[id] >= 0 && coord.hidden[id] < len as Index);
    in_range && coordinate_has_valid_offset_assuming_visible_index_is_valid(desc, coord)
}

/// `true` if no padding transform reports its upper index out of range and
/// the offset lies inside the element space. Skips the visible range check.
#[inline]
pub fn coordinate_has_valid_offset_assuming_visible_index_is_valid(
    desc: &TensorDescriptor,
    coord: &TensorCoordinate,
) -> bool {
    let adaptor = desc.adaptor();
    let pads_ok = adaptor
        .transforms()
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_always_valid())
        .all(|(i, t)| t.is_valid_upper(&coord.hidden, adaptor.upper_ids(i)));
    let offset = coord.offset();
    pads_ok && offset >= 0 && offset < desc.element_space_size() as Index
}
