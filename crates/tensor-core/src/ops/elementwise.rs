// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused epilogue operators.
//!
//! An epilogue operator is a pure function of the accumulator value and a
//! fixed number of auxiliary "D" inputs read at the same output coordinate:
//!
//! ```text
//!   y = op(acc, d[0], .., d[NUM_D - 1])
//! ```
//!
//! Operators hold only immutable parameters, never allocate, and contain no
//! data-dependent control flow beyond a select, so every lane of a
//! lock-step wave executes the same instruction stream.

/// Coefficient `sqrt(2/π)`.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// Cubic coefficient in the tanh approximation of GELU.
const GELU_COEFF: f32 = 0.044_715;

/// The call contract of a fused output operator.
pub trait CElementwise: Send + Sync + std::fmt::Debug {
    /// Number of auxiliary inputs the operator consumes per element.
    const NUM_D: usize;

    /// Short identifier used in logs and launch summaries.
    fn name(&self) -> &'static str;

    /// Computes one output element. `ds.len()` is always `NUM_D`.
    fn apply(&self, y: &mut f32, acc: f32, ds: &[f32]);
}

/// `y = acc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl CElementwise for PassThrough {
    const NUM_D: usize = 0;

    fn name(&self) -> &'static str {
        "pass-through"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, _ds: &[f32]) {
        *y = acc;
    }
}

/// `y = alpha * acc`.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub alpha: f32,
}

impl CElementwise for Scale {
    const NUM_D: usize = 0;

    fn name(&self) -> &'static str {
        "scale"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, _ds: &[f32]) {
        *y = self.alpha * acc;
    }
}

/// `y = max(acc, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl CElementwise for Relu {
    const NUM_D: usize = 0;

    fn name(&self) -> &'static str {
        "relu"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, _ds: &[f32]) {
        *y = if acc > 0.0 { acc } else { 0.0 };
    }
}

/// GELU with the tanh approximation, evaluated through a single `exp`:
///
/// `0.5·x·(1 + tanh(u)) = x / (1 + exp(-2u))`, `u = sqrt(2/π)·(x + 0.044715·x³)`
#[derive(Debug, Clone, Copy, Default)]
pub struct FastGelu;

impl FastGelu {
    #[inline(always)]
    pub fn eval(x: f32) -> f32 {
        let u = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
        x / (1.0 + (-2.0 * u).exp())
    }
}

impl CElementwise for FastGelu {
    const NUM_D: usize = 0;

    fn name(&self) -> &'static str {
        "fast-gelu"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, _ds: &[f32]) {
        *y = Self::eval(acc);
    }
}

/// `y = acc + d0`. With a zero-stride D descriptor this is a broadcast bias.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddBias;

impl CElementwise for AddBias {
    const NUM_D: usize = 1;

    fn name(&self) -> &'static str {
        "add-bias"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, ds: &[f32]) {
        *y = acc + ds[0];
    }
}

/// `y = max(acc + d0, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRelu;

impl CElementwise for AddRelu {
    const NUM_D: usize = 1;

    fn name(&self) -> &'static str {
        "add-relu"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, ds: &[f32]) {
        let v = acc + ds[0];
        *y = if v > 0.0 { v } else { 0.0 };
    }
}

/// `y = gelu(acc + d0 + d1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddAddFastGelu;

impl CElementwise for AddAddFastGelu {
    const NUM_D: usize = 2;

    fn name(&self) -> &'static str {
        "add-add-fast-gelu"
    }

    #[inline(always)]
    fn apply(&self, y: &mut f32, acc: f32, ds: &[f32]) {
        *y = FastGelu::eval(acc + ds[0] + ds[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<Op: CElementwise>(op: &Op, acc: f32, ds: &[f32]) -> f32 {
        assert_eq!(ds.len(), Op::NUM_D);
        let mut y = f32::NAN;
        op.apply(&mut y, acc, ds);
        y
    }

    #[test]
    fn test_pass_through_and_scale() {
        assert_eq!(run(&PassThrough, 2.5, &[]), 2.5);
        assert_eq!(run(&Scale { alpha: -2.0 }, 2.5, &[]), -5.0);
    }

    #[test]
    fn test_relu() {
        assert_eq!(run(&Relu, -1.0, &[]), 0.0);
        assert_eq!(run(&Relu, 3.0, &[]), 3.0);
    }

    #[test]
    fn test_fast_gelu_matches_tanh_form() {
        for &x in &[-3.0f32, -1.0, -0.25, 0.0, 0.5, 1.0, 3.0] {
            let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
            let tanh_form = 0.5 * x * (1.0 + inner.tanh());
            assert!((FastGelu::eval(x) - tanh_form).abs() < 1e-5, "x = {x}");
        }
    }

    #[test]
    fn test_fast_gelu_known_values() {
        assert!((FastGelu::eval(1.0) - 0.8412).abs() < 1e-3);
        assert!((FastGelu::eval(-1.0) + 0.1588).abs() < 1e-3);
    }

    #[test]
    fn test_bias_ops() {
        assert_eq!(run(&AddBias, 1.0, &[0.5]), 1.5);
        assert_eq!(run(&AddRelu, 1.0, &[-4.0]), 0.0);
        let y = run(&AddAddFastGelu, 0.25, &[0.5, 0.25]);
        assert!((y - FastGelu::eval(1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_arity() {
        assert_eq!(PassThrough::NUM_D, 0);
        assert_eq!(AddBias::NUM_D, 1);
        assert_eq!(AddAddFastGelu::NUM_D, 2);
    }
}
