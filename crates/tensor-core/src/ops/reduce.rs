// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reduction operators and NaN-aware accumulation.
//!
//! # NaN as a padding sentinel
//!
//! Reductions whose input tile is padded read padded lanes as quiet NaN.
//! [`ReduceOp::Max`] compares with `acc < v`, which is `false` for a NaN
//! `v`, so padded lanes never win a max. Sums that must skip them go through
//! [`accumulate_nan_ignore`]. This is the contract the softmax kernel relies
//! on; it is not an error path.

/// A binary, associative and commutative reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    Add,
    Mul,
    Max,
    Min,
    /// Maximum of absolute values.
    AMax,
}

impl ReduceOp {
    /// The value every accumulator starts from.
    pub fn identity(self) -> f32 {
        match self {
            ReduceOp::Add | ReduceOp::AMax => 0.0,
            ReduceOp::Mul => 1.0,
            ReduceOp::Max => f32::MIN,
            ReduceOp::Min => f32::MAX,
        }
    }

    /// Folds `v` into `acc`.
    #[inline(always)]
    pub fn combine(self, acc: &mut f32, v: f32) {
        match self {
            ReduceOp::Add => *acc += v,
            ReduceOp::Mul => *acc *= v,
            ReduceOp::Max => {
                if *acc < v {
                    *acc = v;
                }
            }
            ReduceOp::Min => {
                if *acc > v {
                    *acc = v;
                }
            }
            ReduceOp::AMax => {
                let a = v.abs();
                if *acc < a {
                    *acc = a;
                }
            }
        }
    }

    /// Whether partial results of this operator may be merged in global
    /// memory with atomic addition.
    pub fn supports_atomic_add(self) -> bool {
        matches!(self, ReduceOp::Add)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReduceOp::Add => "add",
            ReduceOp::Mul => "mul",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
            ReduceOp::AMax => "amax",
        }
    }
}

/// Folds `v` into `acc` unless `v` is NaN.
#[inline(always)]
pub fn accumulate_nan_ignore(op: ReduceOp, acc: &mut f32, v: f32) {
    if !v.is_nan() {
        op.combine(acc, v);
    }
}

/// Folds `v` into `acc`; a NaN `v` poisons the accumulator.
#[inline(always)]
pub fn accumulate_nan_propagate(op: ReduceOp, acc: &mut f32, v: f32) {
    if v.is_nan() {
        *acc = v;
    } else {
        op.combine(acc, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(op: ReduceOp, values: &[f32]) -> f32 {
        let mut acc = op.identity();
        for &v in values {
            op.combine(&mut acc, v);
        }
        acc
    }

    #[test]
    fn test_identities() {
        assert_eq!(fold(ReduceOp::Add, &[]), 0.0);
        assert_eq!(fold(ReduceOp::Mul, &[]), 1.0);
        assert_eq!(fold(ReduceOp::Max, &[]), f32::MIN);
        assert_eq!(fold(ReduceOp::Min, &[]), f32::MAX);
    }

    #[test]
    fn test_fold_values() {
        let v = [3.0, -7.0, 2.0];
        assert_eq!(fold(ReduceOp::Add, &v), -2.0);
        assert_eq!(fold(ReduceOp::Mul, &v), -42.0);
        assert_eq!(fold(ReduceOp::Max, &v), 3.0);
        assert_eq!(fold(ReduceOp::Min, &v), -7.0);
        assert_eq!(fold(ReduceOp::AMax, &v), 7.0);
    }

    #[test]
    fn test_max_skips_nan_by_comparison() {
        assert_eq!(fold(ReduceOp::Max, &[f32::NAN, 1.0, f32::NAN, -2.0]), 1.0);
    }

    #[test]
    fn test_nan_ignore_sum() {
        let mut acc = ReduceOp::Add.identity();
        for v in [1.0, f32::NAN, 2.0] {
            accumulate_nan_ignore(ReduceOp::Add, &mut acc, v);
        }
        assert_eq!(acc, 3.0);
    }

    #[test]
    fn test_nan_propagate_sum() {
        let mut acc = ReduceOp::Add.identity();
        for v in [1.0, f32::NAN, 2.0] {
            accumulate_nan_propagate(ReduceOp::Add, &mut acc, v);
        }
        assert!(acc.is_nan());
    }

    #[test]
    fn test_atomic_support() {
        assert!(ReduceOp::Add.supports_atomic_add());
        assert!(!ReduceOp::Max.supports_atomic_add());
    }
}
