// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Transform chains over numbered hidden dimensions.

use crate::{DescriptorError, Index, Transform};

/// An ordered chain of [`Transform`]s from bottom dimensions to visible
/// (top) dimensions.
///
/// `transforms[0]` sits closest to the bottom. Each transform is bound to
/// the hidden ids of the dimensions it consumes (`lower_ids`) and defines
/// (`upper_ids`). Hidden ids are allocated in construction order, so the
/// ids a transform consumes are always smaller than the ones it defines.
#[derive(Debug, Clone)]
pub struct TensorAdaptor {
    transforms: Vec<Transform>,
    lower_ids: Vec<Vec<usize>>,
    upper_ids: Vec<Vec<usize>>,
    bottom_ids: Vec<usize>,
    top_ids: Vec<usize>,
    hidden_lengths: Vec<usize>,
}

impl TensorAdaptor {
    /// An adaptor with no transforms whose top equals its bottom.
    pub fn identity(lengths: &[usize]) -> Self {
        let ids: Vec<usize> = (0..lengths.len()).collect();
        Self {
            transforms: Vec::new(),
            lower_ids: Vec::new(),
            upper_ids: Vec::new(),
            bottom_ids: ids.clone(),
            top_ids: ids,
            hidden_lengths: lengths.to_vec(),
        }
    }

    /// Appends a stage of transforms on top of the current visible
    /// dimensions.
    ///
    /// `lower_dims[i]` lists the current visible dimensions consumed by
    /// `transforms[i]`; `upper_dims[i]` lists the new visible dimensions it
    /// defines. Every current visible dimension must be consumed exactly once
    /// and every new visible dimension defined exactly once.
    pub fn transform(
        &self,
        transforms: Vec<Transform>,
        lower_dims: Vec<Vec<usize>>,
        upper_dims: Vec<Vec<usize>>,
    ) -> Result<Self, DescriptorError> {
        if transforms.len() != lower_dims.len() || transforms.len() != upper_dims.len() {
            return Err(DescriptorError::GroupCountMismatch {
                transforms: transforms.len(),
                lower: lower_dims.len(),
                upper: upper_dims.len(),
            });
        }

        let old_top = self.top_ids.len();
        let new_top: usize = upper_dims.iter().map(Vec::len).sum();

        let mut consumed = vec![0usize; old_top];
        let mut defined = vec![0usize; new_top];
        for (i, t) in transforms.iter().enumerate() {
            if lower_dims[i].len() != t.num_lower() {
                return Err(DescriptorError::ArityMismatch {
                    index: i,
                    name: t.name(),
                    side: "lower",
                    expected: t.num_lower(),
                    got: lower_dims[i].len(),
                });
            }
            if upper_dims[i].len() != t.num_upper() {
                return Err(DescriptorError::ArityMismatch {
                    index: i,
                    name: t.name(),
                    side: "upper",
                    expected: t.num_upper(),
                    got: upper_dims[i].len(),
                });
            }
            for &d in &lower_dims[i] {
                match consumed.get_mut(d) {
                    Some(c) => *c += 1,
                    None => return Err(DescriptorError::DimensionConsumption { dim: d, count: 0 }),
                }
            }
            for &d in &upper_dims[i] {
                match defined.get_mut(d) {
                    Some(c) => *c += 1,
                    None => return Err(DescriptorError::DimensionDefinition { dim: d, count: 0 }),
                }
            }
        }
        if let Some((dim, &count)) = consumed.iter().enumerate().find(|&(_, &c)| c != 1) {
            return Err(DescriptorError::DimensionConsumption { dim, count });
        }
        if let Some((dim, &count)) = defined.iter().enumerate().find(|&(_, &c)| c != 1) {
            return Err(DescriptorError::DimensionDefinition { dim, count });
        }

        let old_lengths = self.top_lengths();
        for (i, t) in transforms.iter().enumerate() {
            let lower: Vec<usize> = lower_dims[i].iter().map(|&d| old_lengths[d]).collect();
            t.check_lower_lengths(&lower)
                .map_err(|detail| DescriptorError::LengthMismatch {
                    index: i,
                    name: t.name(),
                    lower,
                    detail,
                })?;
        }

        let mut next = self.clone();
        let base = self.hidden_lengths.len();
        next.hidden_lengths.resize(base + new_top, 0);
        for (i, t) in transforms.into_iter().enumerate() {
            for (&d, len) in upper_dims[i].iter().zip(t.upper_lengths()) {
                next.hidden_lengths[base + d] = len;
            }
            next.lower_ids
                .push(lower_dims[i].iter().map(|&d| self.top_ids[d]).collect());
            next.upper_ids
                .push(upper_dims[i].iter().map(|&d| base + d).collect());
            next.transforms.push(t);
        }
        next.top_ids = (base..base + new_top).collect();

        tracing::trace!(
            "adaptor stage: {} → {} visible dims, {} hidden",
            old_top,
            new_top,
            next.hidden_lengths.len()
        );
        Ok(next)
    }

    /// Number of visible dimensions.
    pub fn num_top(&self) -> usize {
        self.top_ids.len()
    }

    /// Number of bottom dimensions.
    pub fn num_bottom(&self) -> usize {
        self.bottom_ids.len()
    }

    /// Total number of hidden dimensions (bottom, intermediate and top).
    pub fn num_hidden(&self) -> usize {
        self.hidden_lengths.len()
    }

    /// Lengths of the visible dimensions.
    pub fn top_lengths(&self) -> Vec<usize> {
        self.top_ids.iter().map(|&id| self.hidden_lengths[id]).collect()
    }

    /// The transform chain, bottom first.
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub(crate) fn top_ids(&self) -> &[usize] {
        &self.top_ids
    }

    pub(crate) fn bottom_ids(&self) -> &[usize] {
        &self.bottom_ids
    }

    pub(crate) fn lower_ids(&self, i: usize) -> &[usize] {
        &self.lower_ids[i]
    }

    pub(crate) fn upper_ids(&self, i: usize) -> &[usize] {
        &self.upper_ids[i]
    }

    /// Fills every non-top hidden index from the top indices already stored
    /// in `hidden`.
    pub(crate) fn propagate_down(&self, hidden: &mut [Index]) {
        for i in (0..self.transforms.len()).rev() {
            self.transforms[i].calculate_lower(hidden, &self.lower_ids[i], &self.upper_ids[i]);
        }
    }

    /// Maps a visible index to the bottom index.
    pub fn calculate_bottom_index(&self, top: &[usize]) -> Result<Vec<Index>, DescriptorError> {
        self.check_top_index(top)?;
        let mut hidden = vec![0 as Index; self.num_hidden()];
        for (&id, &v) in self.top_ids.iter().zip(top) {
            hidden[id] = v as Index;
        }
        self.propagate_down(&mut hidden);
        Ok(self.bottom_ids.iter().map(|&id| hidden[id]).collect())
    }

    pub(crate) fn check_top_index(&self, top: &[usize]) -> Result<(), DescriptorError> {
        if top.len() != self.top_ids.len() {
            return Err(DescriptorError::RankMismatch {
                expected: self.top_ids.len(),
                got: top.len(),
            });
        }
        let lengths = self.top_lengths();
        if top.iter().zip(&lengths).any(|(&i, &len)| i >= len) {
            return Err(DescriptorError::IndexOutOfRange {
                index: top.to_vec(),
                lengths,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let a = TensorAdaptor::identity(&[3, 4]);
        assert_eq!(a.num_top(), 2);
        assert_eq!(a.calculate_bottom_index(&[2, 1]).unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_merge_then_unmerge_roundtrip() {
        // bottom (m, n) → block id, then block id → (m, n) again.
        let a = TensorAdaptor::identity(&[3, 5])
            .transform(vec![Transform::merge(&[3, 5]).unwrap()], vec![vec![0, 1]], vec![vec![0]])
            .unwrap();
        assert_eq!(a.top_lengths(), vec![15]);
        assert_eq!(a.calculate_bottom_index(&[13]).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_reorder_dims() {
        // Swap the two visible dimensions with pass-throughs.
        let a = TensorAdaptor::identity(&[2, 7])
            .transform(
                vec![Transform::pass_through(2), Transform::pass_through(7)],
                vec![vec![0], vec![1]],
                vec![vec![1], vec![0]],
            )
            .unwrap();
        assert_eq!(a.top_lengths(), vec![7, 2]);
        assert_eq!(a.calculate_bottom_index(&[6, 1]).unwrap(), vec![1, 6]);
    }

    #[test]
    fn test_dimension_consumed_twice() {
        let err = TensorAdaptor::identity(&[4, 4])
            .transform(
                vec![Transform::pass_through(4), Transform::pass_through(4)],
                vec![vec![0], vec![0]],
                vec![vec![0], vec![1]],
            )
            .unwrap_err();
        assert_eq!(err, DescriptorError::DimensionConsumption { dim: 0, count: 2 });
    }

    #[test]
    fn test_dimension_not_defined() {
        let err = TensorAdaptor::identity(&[4])
            .transform(vec![Transform::pass_through(4)], vec![vec![0]], vec![vec![1]])
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DimensionDefinition { dim: 1, .. }));
    }

    #[test]
    fn test_length_mismatch() {
        let err = TensorAdaptor::identity(&[6])
            .transform(vec![Transform::unmerge(&[4, 2]).unwrap()], vec![vec![0]], vec![vec![0, 1]])
            .unwrap_err();
        assert!(matches!(err, DescriptorError::LengthMismatch { .. }));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = TensorAdaptor::identity(&[2, 3])
            .transform(vec![Transform::merge(&[2, 3]).unwrap()], vec![vec![0]], vec![vec![0]])
            .unwrap_err();
        assert!(matches!(err, DescriptorError::ArityMismatch { side: "lower", .. }));
    }

    #[test]
    fn test_out_of_range_index() {
        let a = TensorAdaptor::identity(&[2, 3]);
        assert!(matches!(
            a.calculate_bottom_index(&[2, 0]),
            Err(DescriptorError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            a.calculate_bottom_index(&[0]),
            Err(DescriptorError::RankMismatch { expected: 2, got: 1 })
        ));
    }
}
