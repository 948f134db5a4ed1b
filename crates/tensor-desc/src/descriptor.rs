// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors: adaptors that resolve to a single element offset.

use crate::{
    coordinate::{coordinate_has_valid_offset, make_coordinate},
    DescriptorError, Index, TensorAdaptor, Transform,
};
use std::fmt;

/// The result of mapping a visible index through a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedOffset {
    /// Element offset. Meaningless when `valid` is `false`.
    pub offset: Index,
    /// `false` if the index falls into padding or outside the element space.
    pub valid: bool,
}

/// A [`TensorAdaptor`] with one bottom dimension (the element offset) and
/// the size of the element space it addresses.
///
/// Descriptors are immutable; [`TensorDescriptor::transform`] returns a new
/// descriptor with another stage appended.
#[derive(Debug, Clone)]
pub struct TensorDescriptor {
    adaptor: TensorAdaptor,
    element_space_size: usize,
}

impl TensorDescriptor {
    /// Wraps an adaptor whose single bottom dimension is an element offset
    /// into a space of `element_space_size` elements.
    pub fn new(adaptor: TensorAdaptor, element_space_size: usize) -> Result<Self, DescriptorError> {
        if adaptor.num_bottom() != 1 {
            return Err(DescriptorError::NotADescriptor(adaptor.num_bottom()));
        }
        Ok(Self {
            adaptor,
            element_space_size,
        })
    }

    /// Appends a stage of transforms. See [`TensorAdaptor::transform`].
    pub fn transform(
        &self,
        transforms: Vec<Transform>,
        lower_dims: Vec<Vec<usize>>,
        upper_dims: Vec<Vec<usize>>,
    ) -> Result<Self, DescriptorError> {
        Ok(Self {
            adaptor: self.adaptor.transform(transforms, lower_dims, upper_dims)?,
            element_space_size: self.element_space_size,
        })
    }

    /// Number of visible dimensions.
    pub fn num_dims(&self) -> usize {
        self.adaptor.num_top()
    }

    /// Lengths of the visible dimensions.
    pub fn lengths(&self) -> Vec<usize> {
        self.adaptor.top_lengths()
    }

    /// Length of one visible dimension.
    pub fn length(&self, dim: usize) -> usize {
        self.adaptor.top_lengths()[dim]
    }

    /// Number of logical elements (product of the visible lengths).
    pub fn element_size(&self) -> usize {
        self.lengths().iter().product()
    }

    /// Number of addressable elements in memory.
    pub fn element_space_size(&self) -> usize {
        self.element_space_size
    }

    /// The underlying transform chain.
    pub fn adaptor(&self) -> &TensorAdaptor {
        &self.adaptor
    }

    /// `true` if no transform in the chain can produce an invalid offset.
    pub fn is_always_valid(&self) -> bool {
        self.adaptor.transforms().iter().all(Transform::is_always_valid)
    }

    /// Maps a visible index to an element offset and its validity flag.
    pub fn offset(&self, idx: &[usize]) -> Result<MappedOffset, DescriptorError> {
        let coord = make_coordinate(self, idx)?;
        Ok(MappedOffset {
            offset: coord.offset(),
            valid: coordinate_has_valid_offset(self, &coord),
        })
    }

    /// One-line description of the visible lengths and the transform chain.
    pub fn summary(&self) -> String {
        let chain: Vec<String> = self
            .adaptor
            .transforms()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!(
            "{:?} over {} elements: {}",
            self.lengths(),
            self.element_space_size,
            chain.join(" → ")
        )
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// A strided view: `offset = Σ idx_i · strides_i`.
///
/// A zero stride broadcasts a dimension (every index reads the same
/// element), which is how bias vectors are presented as full matrices.
pub fn make_naive_descriptor(
    lengths: &[usize],
    strides: &[usize],
) -> Result<TensorDescriptor, DescriptorError> {
    if lengths.len() != strides.len() {
        return Err(DescriptorError::RankMismatch {
            expected: lengths.len(),
            got: strides.len(),
        });
    }
    let coefficients: Vec<Index> = strides.iter().map(|&s| s as Index).collect();
    let embed = Transform::embed(lengths, &coefficients)?;
    let space = 1 + lengths
        .iter()
        .zip(strides)
        .map(|(&l, &s)| (l - 1) * s)
        .sum::<usize>();
    let adaptor = TensorAdaptor::identity(&[space]).transform(
        vec![embed],
        vec![vec![0]],
        vec![(0..lengths.len()).collect()],
    )?;
    TensorDescriptor::new(adaptor, space)
}

/// A packed row-major view.
pub fn make_naive_descriptor_packed(lengths: &[usize]) -> Result<TensorDescriptor, DescriptorError> {
    let unmerge = Transform::unmerge(lengths)?;
    let space: usize = lengths.iter().product();
    let adaptor = TensorAdaptor::identity(&[space]).transform(
        vec![unmerge],
        vec![vec![0]],
        vec![(0..lengths.len()).collect()],
    )?;
    TensorDescriptor::new(adaptor, space)
}

/// A row-major view whose innermost rows start on `align`-element
/// boundaries: the second-to-last stride is `round_up(last_len, align)`.
pub fn make_naive_descriptor_aligned(
    lengths: &[usize],
    align: usize,
) -> Result<TensorDescriptor, DescriptorError> {
    if lengths.is_empty() || align == 0 {
        return Err(DescriptorError::InvalidTransform(format!(
            "aligned descriptor needs lengths and a non-zero alignment, got {lengths:?} / {align}"
        )));
    }
    let n = lengths.len();
    let mut strides = vec![1usize; n];
    if n >= 2 {
        strides[n - 2] = lengths[n - 1].div_ceil(align) * align;
        for i in (0..n - 2).rev() {
            strides[i] = strides[i + 1] * lengths[i + 1];
        }
    }
    make_naive_descriptor(lengths, &strides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_strided() {
        let d = make_naive_descriptor(&[3, 4], &[10, 2]).unwrap();
        assert_eq!(d.lengths(), vec![3, 4]);
        assert_eq!(d.element_space_size(), 1 + 2 * 10 + 3 * 2);
        assert_eq!(d.offset(&[2, 3]).unwrap().offset, 26);
        assert!(d.is_always_valid());
    }

    #[test]
    fn test_packed() {
        let d = make_naive_descriptor_packed(&[2, 3, 4]).unwrap();
        assert_eq!(d.element_space_size(), 24);
        assert_eq!(d.offset(&[1, 2, 3]).unwrap().offset, 23);
    }

    #[test]
    fn test_aligned() {
        let d = make_naive_descriptor_aligned(&[2, 3, 5], 4).unwrap();
        // Row pitch 8, plane pitch 24.
        assert_eq!(d.offset(&[1, 2, 4]).unwrap().offset, 24 + 16 + 4);
        assert_eq!(d.element_space_size(), 24 + 16 + 4 + 1);
    }

    #[test]
    fn test_broadcast_stride() {
        let bias = make_naive_descriptor(&[4, 3], &[0, 1]).unwrap();
        assert_eq!(bias.element_space_size(), 3);
        assert_eq!(bias.offset(&[0, 2]).unwrap(), bias.offset(&[3, 2]).unwrap());
    }

    #[test]
    fn test_transpose_view() {
        // Column-major 3×4 presented as (k, m) → (m, k) by swapping dims.
        let km = make_naive_descriptor_packed(&[4, 3]).unwrap();
        let mk = km
            .transform(
                vec![Transform::pass_through(4), Transform::pass_through(3)],
                vec![vec![0], vec![1]],
                vec![vec![1], vec![0]],
            )
            .unwrap();
        assert_eq!(mk.lengths(), vec![3, 4]);
        assert_eq!(mk.offset(&[2, 1]).unwrap().offset, 1 * 3 + 2);
    }

    #[test]
    fn test_padding_is_flagged() {
        let d = make_naive_descriptor_packed(&[5])
            .unwrap()
            .transform(vec![Transform::pad(5, 2, 1)], vec![vec![0]], vec![vec![0]])
            .unwrap();
        assert_eq!(d.lengths(), vec![8]);
        let flags: Vec<bool> = (0..8).map(|i| d.offset(&[i]).unwrap().valid).collect();
        assert_eq!(flags, vec![false, false, true, true, true, true, true, false]);
        assert_eq!(d.offset(&[2]).unwrap().offset, 0);
    }

    #[test]
    fn test_padded_tiling_covers_each_element_once() {
        for (n, t) in [(70usize, 16usize), (10, 4), (7, 7), (1, 8), (17, 5)] {
            let tiles = n.div_ceil(t);
            let d = make_naive_descriptor_packed(&[n])
                .unwrap()
                .transform(vec![Transform::right_pad(n, tiles * t - n)], vec![vec![0]], vec![vec![0]])
                .unwrap()
                .transform(vec![Transform::unmerge(&[tiles, t]).unwrap()], vec![vec![0]], vec![vec![0, 1]])
                .unwrap();
            assert_eq!(d.lengths(), vec![tiles, t]);

            let mut hits = vec![0usize; n];
            let mut invalid = 0;
            for tile in 0..tiles {
                for lane in 0..t {
                    let mapped = d.offset(&[tile, lane]).unwrap();
                    if mapped.valid {
                        hits[mapped.offset as usize] += 1;
                    } else {
                        invalid += 1;
                    }
                }
            }
            assert!(hits.iter().all(|&h| h == 1), "n={n} t={t}: {hits:?}");
            assert_eq!(invalid, tiles * t - n, "n={n} t={t}");
        }
    }

    #[test]
    fn test_unmerge_split_k() {
        // K = 24 split into (kbatch 2, k0 3, k1 4).
        let d = make_naive_descriptor_packed(&[24])
            .unwrap()
            .transform(vec![Transform::unmerge(&[2, 3, 4]).unwrap()], vec![vec![0]], vec![vec![0, 1, 2]])
            .unwrap();
        assert_eq!(d.offset(&[1, 2, 3]).unwrap().offset, 23);
        assert_eq!(d.offset(&[1, 0, 0]).unwrap().offset, 12);
    }

    #[test]
    fn test_freeze_removes_dim() {
        let d = make_naive_descriptor_packed(&[3, 4])
            .unwrap()
            .transform(
                vec![Transform::freeze(2), Transform::pass_through(4)],
                vec![vec![0], vec![1]],
                vec![vec![], vec![0]],
            )
            .unwrap();
        assert_eq!(d.lengths(), vec![4]);
        assert_eq!(d.offset(&[1]).unwrap().offset, 9);
    }

    #[test]
    fn test_rank_mismatch() {
        assert!(make_naive_descriptor(&[3, 4], &[1]).is_err());
    }

    #[test]
    fn test_summary() {
        let d = make_naive_descriptor_packed(&[2, 2]).unwrap();
        assert!(d.summary().contains("unmerge[2, 2]"));
    }
}
