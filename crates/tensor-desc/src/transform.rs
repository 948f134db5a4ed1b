// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single coordinate transforms.
//!
//! A transform maps `upper` indices (closer to the logical view) onto
//! `lower` indices (closer to memory). Each transform provides:
//!
//! - a forward map, `lower = f(upper)`, used to build a coordinate;
//! - an incremental map, `Δlower = g(Δupper)`, used to move one.
//!
//! | transform | lower | upper | forward map |
//! |---|---|---|---|
//! | PassThrough | 1 | 1 | `l = u` |
//! | Pad | 1 | 1 | `l = u - left` |
//! | Merge | n | 1 | `l = unravel(u)` |
//! | Unmerge | 1 | n | `l = ravel(u)` |
//! | Embed | 1 | n | `l = Σ u_i·c_i` |
//! | Freeze | 1 | 0 | `l = index` |
//!
//! Merge is the only non-linear transform; its incremental map recomputes
//! the lower indices from the already-updated upper index and reports the
//! difference.
//!
//! Transforms operate directly on the hidden-index vector of a coordinate
//! through the hidden ids they are bound to, so the move path never
//! allocates.

use crate::{DescriptorError, Index};
use std::fmt;

/// One coordinate mapping between an upper and a lower index space.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transform {
    /// Identity on one dimension.
    PassThrough { length: usize },
    /// Extends one dimension by `left` and `right` positions that map
    /// outside the lower range and are reported invalid.
    Pad {
        length: usize,
        left: usize,
        right: usize,
    },
    /// Flattens several lower dimensions into one upper dimension.
    Merge {
        lengths: Vec<usize>,
        #[serde(skip)]
        strides: Vec<Index>,
    },
    /// Splits one lower dimension into several upper dimensions.
    Unmerge {
        lengths: Vec<usize>,
        #[serde(skip)]
        strides: Vec<Index>,
    },
    /// Affine map of several upper dimensions onto one lower dimension.
    Embed {
        lengths: Vec<usize>,
        coefficients: Vec<Index>,
    },
    /// Pins one lower dimension to a fixed index, removing it from view.
    Freeze { index: usize },
}

impl Transform {
    /// Identity transform over `length` positions.
    pub fn pass_through(length: usize) -> Self {
        Transform::PassThrough { length }
    }

    /// Pads `length` with `left` positions before and `right` after.
    pub fn pad(length: usize, left: usize, right: usize) -> Self {
        Transform::Pad {
            length,
            left,
            right,
        }
    }

    /// Pads `length` with `left` positions before.
    pub fn left_pad(length: usize, left: usize) -> Self {
        Self::pad(length, left, 0)
    }

    /// Pads `length` with `right` positions after.
    pub fn right_pad(length: usize, right: usize) -> Self {
        Self::pad(length, 0, right)
    }

    /// Merges lower dimensions of the given lengths (outermost first).
    pub fn merge(lengths: &[usize]) -> Result<Self, DescriptorError> {
        check_lengths("merge", lengths)?;
        Ok(Transform::Merge {
            lengths: lengths.to_vec(),
            strides: packed_strides(lengths),
        })
    }

    /// Splits a lower dimension into upper dimensions of the given lengths
    /// (outermost first).
    pub fn unmerge(lengths: &[usize]) -> Result<Self, DescriptorError> {
        check_lengths("unmerge", lengths)?;
        Ok(Transform::Unmerge {
            lengths: lengths.to_vec(),
            strides: packed_strides(lengths),
        })
    }

    /// Embeds upper dimensions of the given lengths with per-dimension
    /// coefficients: `lower = Σ upper_i · coefficients_i`.
    pub fn embed(lengths: &[usize], coefficients: &[Index]) -> Result<Self, DescriptorError> {
        check_lengths("embed", lengths)?;
        if lengths.len() != coefficients.len() {
            return Err(DescriptorError::InvalidTransform(format!(
                "embed has {} lengths but {} coefficients",
                lengths.len(),
                coefficients.len()
            )));
        }
        Ok(Transform::Embed {
            lengths: lengths.to_vec(),
            coefficients: coefficients.to_vec(),
        })
    }

    /// Pins a lower dimension at `index`.
    pub fn freeze(index: usize) -> Self {
        Transform::Freeze { index }
    }

    /// Short name used in errors and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::PassThrough { .. } => "pass-through",
            Transform::Pad { .. } => "pad",
            Transform::Merge { .. } => "merge",
            Transform::Unmerge { .. } => "unmerge",
            Transform::Embed { .. } => "embed",
            Transform::Freeze { .. } => "freeze",
        }
    }

    /// Number of lower dimensions the transform consumes.
    pub fn num_lower(&self) -> usize {
        match self {
            Transform::Merge { lengths, .. } => lengths.len(),
            _ => 1,
        }
    }

    /// Number of upper dimensions the transform defines.
    pub fn num_upper(&self) -> usize {
        match self {
            Transform::Unmerge { lengths, .. } | Transform::Embed { lengths, .. } => lengths.len(),
            Transform::Freeze { .. } => 0,
            _ => 1,
        }
    }

    /// Lengths of the upper dimensions.
    pub fn upper_lengths(&self) -> Vec<usize> {
        match self {
            Transform::PassThrough { length } => vec![*length],
            Transform::Pad {
                length,
                left,
                right,
            } => vec![length + left + right],
            Transform::Merge { lengths, .. } => vec![lengths.iter().product()],
            Transform::Unmerge { lengths, .. } | Transform::Embed { lengths, .. } => lengths.clone(),
            Transform::Freeze { .. } => Vec::new(),
        }
    }

    /// Checks that the transform is consistent with the lengths of the
    /// lower dimensions it consumes.
    pub(crate) fn check_lower_lengths(&self, lower: &[usize]) -> Result<(), String> {
        debug_assert_eq!(lower.len(), self.num_lower());
        match self {
            Transform::PassThrough { length } | Transform::Pad { length, .. } => {
                if lower[0] != *length {
                    return Err(format!("expects length {length}"));
                }
            }
            Transform::Merge { lengths, .. } => {
                if lower != lengths.as_slice() {
                    return Err(format!("expects lengths {lengths:?}"));
                }
            }
            Transform::Unmerge { lengths, .. } => {
                let product: usize = lengths.iter().product();
                if lower[0] != product {
                    return Err(format!("upper lengths {lengths:?} multiply to {product}"));
                }
            }
            Transform::Embed {
                lengths,
                coefficients,
            } => {
                let (mut lo, mut hi): (Index, Index) = (0, 0);
                for (&len, &c) in lengths.iter().zip(coefficients) {
                    let reach = (len as Index - 1) * c;
                    if reach < 0 {
                        lo += reach;
                    } else {
                        hi += reach;
                    }
                }
                if lo < 0 || hi >= lower[0] as Index {
                    return Err(format!("reaches [{lo}, {hi}], outside [0, {})", lower[0]));
                }
            }
            Transform::Freeze { index } => {
                if *index >= lower[0] {
                    return Err(format!("frozen index {index} out of range"));
                }
            }
        }
        Ok(())
    }

    /// `false` if some in-range upper index maps to an invalid lower index.
    pub fn is_always_valid(&self) -> bool {
        match self {
            Transform::Pad { left, right, .. } => *left == 0 && *right == 0,
            _ => true,
        }
    }

    /// Whether the current upper index maps to a valid lower index.
    #[inline]
    pub(crate) fn is_valid_upper(&self, hidden: &[Index], up: &[usize]) -> bool {
        match self {
            Transform::Pad { length, left, .. } => {
                let u = hidden[up[0]];
                let left = *left as Index;
                u >= left && u < left + *length as Index
            }
            _ => true,
        }
    }

    /// Forward map: writes the lower indices from the upper ones.
    #[inline]
    pub(crate) fn calculate_lower(&self, hidden: &mut [Index], low: &[usize], up: &[usize]) {
        match self {
            Transform::PassThrough { .. } => hidden[low[0]] = hidden[up[0]],
            Transform::Pad { left, .. } => hidden[low[0]] = hidden[up[0]] - *left as Index,
            Transform::Merge { strides, .. } => {
                let mut rem = hidden[up[0]];
                let last = strides.len() - 1;
                for i in 0..last {
                    let q = rem / strides[i];
                    hidden[low[i]] = q;
                    rem -= q * strides[i];
                }
                hidden[low[last]] = rem;
            }
            Transform::Unmerge { strides, .. } => {
                hidden[low[0]] = up.iter().zip(strides).map(|(&u, &s)| hidden[u] * s).sum();
            }
            Transform::Embed { coefficients, .. } => {
                hidden[low[0]] = up.iter().zip(coefficients).map(|(&u, &c)| hidden[u] * c).sum();
            }
            Transform::Freeze { index } => hidden[low[0]] = *index as Index,
        }
    }

    /// Incremental map. On entry `hidden[up]` already holds the new upper
    /// indices and `diff[up]` the applied upper differences; on exit the
    /// lower indices are updated and `diff[low]` holds their differences.
    #[inline]
    pub(crate) fn update_lower(
        &self,
        hidden: &mut [Index],
        diff: &mut [Index],
        low: &[usize],
        up: &[usize],
    ) {
        match self {
            Transform::PassThrough { .. } | Transform::Pad { .. } => {
                let d = diff[up[0]];
                diff[low[0]] = d;
                hidden[low[0]] += d;
            }
            Transform::Merge { strides, .. } => {
                let mut rem = hidden[up[0]];
                let last = strides.len() - 1;
                for i in 0..=last {
                    let new = if i == last { rem } else { rem / strides[i] };
                    if i != last {
                        rem -= new * strides[i];
                    }
                    diff[low[i]] = new - hidden[low[i]];
                    hidden[low[i]] = new;
                }
            }
            Transform::Unmerge { strides, .. } => {
                let d: Index = up.iter().zip(strides).map(|(&u, &s)| diff[u] * s).sum();
                diff[low[0]] = d;
                hidden[low[0]] += d;
            }
            Transform::Embed { coefficients, .. } => {
                let d: Index = up.iter().zip(coefficients).map(|(&u, &c)| diff[u] * c).sum();
                diff[low[0]] = d;
                hidden[low[0]] += d;
            }
            Transform::Freeze { .. } => diff[low[0]] = 0,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::PassThrough { length } => write!(f, "pass-through({length})"),
            Transform::Pad {
                length,
                left,
                right,
            } => write!(f, "pad({length}, -{left}/+{right})"),
            Transform::Merge { lengths, .. } => write!(f, "merge{lengths:?}"),
            Transform::Unmerge { lengths, .. } => write!(f, "unmerge{lengths:?}"),
            Transform::Embed {
                lengths,
                coefficients,
            } => write!(f, "embed{lengths:?}·{coefficients:?}"),
            Transform::Freeze { index } => write!(f, "freeze({index})"),
        }
    }
}

fn check_lengths(kind: &str, lengths: &[usize]) -> Result<(), DescriptorError> {
    if lengths.is_empty() || lengths.contains(&0) {
        return Err(DescriptorError::InvalidTransform(format!(
            "{kind} needs non-empty, non-zero lengths, got {lengths:?}"
        )));
    }
    Ok(())
}

fn packed_strides(lengths: &[usize]) -> Vec<Index> {
    let mut strides = vec![1 as Index; lengths.len()];
    for i in (0..lengths.len() - 1).rev() {
        strides[i] = strides[i + 1] * lengths[i + 1] as Index;
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hidden layout for single-transform tests: lower ids first, then upper.
    fn apply(t: &Transform, upper: &[Index]) -> Vec<Index> {
        let nl = t.num_lower();
        let mut hidden = vec![0; nl + upper.len()];
        hidden[nl..].copy_from_slice(upper);
        let low: Vec<usize> = (0..nl).collect();
        let up: Vec<usize> = (nl..nl + upper.len()).collect();
        t.calculate_lower(&mut hidden, &low, &up);
        hidden[..nl].to_vec()
    }

    #[test]
    fn test_merge_unravels() {
        let t = Transform::merge(&[2, 3, 4]).unwrap();
        assert_eq!(t.upper_lengths(), vec![24]);
        assert_eq!(apply(&t, &[17]), vec![1, 1, 1]);
        assert_eq!(apply(&t, &[23]), vec![1, 2, 3]);
    }

    #[test]
    fn test_unmerge_ravels() {
        let t = Transform::unmerge(&[2, 3, 4]).unwrap();
        assert_eq!(apply(&t, &[1, 2, 3]), vec![23]);
        assert!(t.check_lower_lengths(&[24]).is_ok());
        assert!(t.check_lower_lengths(&[25]).is_err());
    }

    #[test]
    fn test_pad_shifts_and_flags() {
        let t = Transform::pad(5, 2, 1);
        assert_eq!(t.upper_lengths(), vec![8]);
        assert_eq!(apply(&t, &[0]), vec![-2]);
        assert_eq!(apply(&t, &[7]), vec![5]);
        assert!(!t.is_always_valid());
        assert!(t.is_valid_upper(&[2], &[0]));
        assert!(t.is_valid_upper(&[6], &[0]));
        assert!(!t.is_valid_upper(&[7], &[0]));
        assert!(!t.is_valid_upper(&[1], &[0]));
    }

    #[test]
    fn test_embed_range_check() {
        // Conv window: y in 0..3 with dilation 2, ho in 0..4 with stride 1 → 0..=7.
        let t = Transform::embed(&[3, 4], &[2, 1]).unwrap();
        assert!(t.check_lower_lengths(&[8]).is_ok());
        assert!(t.check_lower_lengths(&[7]).is_err());
        assert_eq!(apply(&t, &[2, 3]), vec![7]);
    }

    #[test]
    fn test_freeze() {
        let t = Transform::freeze(3);
        assert_eq!(t.num_upper(), 0);
        assert_eq!(apply(&t, &[]), vec![3]);
        assert!(t.check_lower_lengths(&[3]).is_err());
    }

    #[test]
    fn test_merge_update_matches_recompute() {
        let t = Transform::merge(&[3, 5]).unwrap();
        // hidden: [low0, low1, up]
        let mut hidden = vec![0, 0, 4];
        t.calculate_lower(&mut hidden, &[0, 1], &[2]);
        let mut diff = vec![0, 0, 7];
        hidden[2] += 7;
        t.update_lower(&mut hidden, &mut diff, &[0, 1], &[2]);
        assert_eq!(&hidden[..2], &[2, 1]);
        assert_eq!(&diff[..2], &[2, -3]);
    }

    #[test]
    fn test_invalid_constructors() {
        assert!(Transform::merge(&[]).is_err());
        assert!(Transform::unmerge(&[4, 0]).is_err());
        assert!(Transform::embed(&[2, 2], &[1]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Transform::pad(4, 1, 2).to_string(), "pad(4, -1/+2)");
        assert_eq!(Transform::merge(&[2, 3]).unwrap().to_string(), "merge[2, 3]");
    }
}
