// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Naive host kernels that define the expected result of every tiled kernel.
//!
//! These are deliberately the plainest possible loops, accumulating in `f32`
//! exactly like the tiled kernels do. They are used by tests, benches and
//! the CLI's `--verify` flag.

use crate::{Element, Shape, Tensor, TensorError};

/// Performs `C[M, N] = A[M, K] · B[K, N]` with `f32` accumulation.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the operands are not 2-D or the
/// inner dimensions differ.
pub fn matmul<T: Element>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<f32>, TensorError> {
    let (ad, bd) = (a.shape().dims(), b.shape().dims());
    if ad.len() != 2 || bd.len() != 2 || ad[1] != bd[0] {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    let (m, k, n) = (ad[0], ad[1], bd[1]);
    let a = a.as_slice();
    let b = b.as_slice();
    Ok(matmul_with(m, n, k, |i, p| a[i * k + p].to_f32(), |p, j| b[p * n + j].to_f32()))
}

/// Layout-agnostic reference GEMM: operands are supplied as accessors
/// `a(m, k)` and `b(k, n)`.
pub fn matmul_with(
    m: usize,
    n: usize,
    k: usize,
    a: impl Fn(usize, usize) -> f32,
    b: impl Fn(usize, usize) -> f32,
) -> Tensor<f32> {
    let mut c = Tensor::zeros(Shape::matrix(m, n));
    let out = c.as_mut_slice();
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += a(i, p) * b(p, j);
            }
            out[i * n + j] = acc;
        }
    }
    c
}

/// Geometry of a 2-D forward convolution in NHWC / KYXC / NHWK layout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conv2dGeometry {
    /// Batch.
    pub n: usize,
    /// Input channels.
    pub c: usize,
    /// Input height.
    pub hi: usize,
    /// Input width.
    pub wi: usize,
    /// Output channels (filters).
    pub k: usize,
    /// Filter height.
    pub y: usize,
    /// Filter width.
    pub x: usize,
    /// `[stride_h, stride_w]`.
    #[serde(default = "one_pair")]
    pub stride: [usize; 2],
    /// `[dilation_h, dilation_w]`.
    #[serde(default = "one_pair")]
    pub dilation: [usize; 2],
    /// `[pad_top, pad_left]`.
    #[serde(default)]
    pub left_pad: [usize; 2],
    /// `[pad_bottom, pad_right]`.
    #[serde(default)]
    pub right_pad: [usize; 2],
}

fn one_pair() -> [usize; 2] {
    [1, 1]
}

impl Conv2dGeometry {
    /// Output height.
    pub fn ho(&self) -> usize {
        out_len(self.hi, self.y, self.stride[0], self.dilation[0], self.left_pad[0], self.right_pad[0])
    }

    /// Output width.
    pub fn wo(&self) -> usize {
        out_len(self.wi, self.x, self.stride[1], self.dilation[1], self.left_pad[1], self.right_pad[1])
    }

    /// Checks that every extent is non-zero and the output is non-empty.
    pub fn validate(&self) -> Result<(), TensorError> {
        let extents = [self.n, self.c, self.hi, self.wi, self.k, self.y, self.x];
        if extents.contains(&0) {
            return Err(TensorError::InvalidGeometry(format!("zero extent in {self:?}")));
        }
        if self.stride.contains(&0) || self.dilation.contains(&0) {
            return Err(TensorError::InvalidGeometry(
                "stride and dilation must be positive".into(),
            ));
        }
        for axis in 0..2 {
            let (input, filter) = if axis == 0 { (self.hi, self.y) } else { (self.wi, self.x) };
            let padded = input + self.left_pad[axis] + self.right_pad[axis];
            let span = self.dilation[axis] * (filter - 1) + 1;
            if span > padded {
                return Err(TensorError::InvalidGeometry(format!(
                    "filter span {span} exceeds padded input {padded} on axis {axis}"
                )));
            }
        }
        Ok(())
    }

    pub fn input_shape(&self) -> Shape {
        Shape::nhwc(self.n, self.hi, self.wi, self.c)
    }

    pub fn weight_shape(&self) -> Shape {
        Shape::nhwc(self.k, self.y, self.x, self.c)
    }

    pub fn output_shape(&self) -> Shape {
        Shape::nhwc(self.n, self.ho(), self.wo(), self.k)
    }
}

fn out_len(input: usize, filter: usize, stride: usize, dilation: usize, lp: usize, rp: usize) -> usize {
    let padded = input + lp + rp;
    let span = dilation * (filter.max(1) - 1) + 1;
    if span > padded || stride == 0 {
        0
    } else {
        (padded - span) / stride + 1
    }
}

/// Direct NHWC forward convolution.
pub fn conv2d_nhwc<T: Element>(
    input: &Tensor<T>,
    weight: &Tensor<T>,
    g: &Conv2dGeometry,
) -> Result<Tensor<f32>, TensorError> {
    g.validate()?;
    if input.shape() != &g.input_shape() || weight.shape() != &g.weight_shape() {
        return Err(TensorError::ShapeMismatch {
            op: "conv2d_nhwc",
            lhs: input.shape().clone(),
            rhs: weight.shape().clone(),
        });
    }
    let (ho, wo) = (g.ho(), g.wo());
    let mut out = Tensor::zeros(g.output_shape());
    let dst = out.as_mut_slice();
    for n in 0..g.n {
        for oh in 0..ho {
            for ow in 0..wo {
                for k in 0..g.k {
                    let mut acc = 0.0f32;
                    for fy in 0..g.y {
                        let ih = (oh * g.stride[0] + fy * g.dilation[0]) as isize - g.left_pad[0] as isize;
                        if ih < 0 || ih >= g.hi as isize {
                            continue;
                        }
                        for fx in 0..g.x {
                            let iw = (ow * g.stride[1] + fx * g.dilation[1]) as isize
                                - g.left_pad[1] as isize;
                            if iw < 0 || iw >= g.wi as isize {
                                continue;
                            }
                            for c in 0..g.c {
                                let xv = input.get(&[n, ih as usize, iw as usize, c]).to_f32();
                                let wv = weight.get(&[k, fy, fx, c]).to_f32();
                                acc += xv * wv;
                            }
                        }
                    }
                    dst[((n * ho + oh) * wo + ow) * g.k + k] = acc;
                }
            }
        }
    }
    Ok(out)
}

/// Row softmax over the last dimension of a 2-D tensor, blended with a prior
/// output: `y = alpha · softmax(x) + beta · prior`.
pub fn softmax_rows<T: Element>(
    x: &Tensor<T>,
    alpha: f32,
    beta: f32,
    prior: Option<&Tensor<f32>>,
) -> Result<Tensor<f32>, TensorError> {
    let dims = x.shape().dims();
    if dims.len() != 2 {
        return Err(TensorError::ShapeMismatch {
            op: "softmax_rows",
            lhs: x.shape().clone(),
            rhs: Shape::matrix(0, 0),
        });
    }
    if let Some(p) = prior {
        if p.shape() != x.shape() {
            return Err(TensorError::ShapeMismatch {
                op: "softmax_rows (prior)",
                lhs: x.shape().clone(),
                rhs: p.shape().clone(),
            });
        }
    }
    let (rows, cols) = (dims[0], dims[1]);
    let src = x.to_f32_vec();
    let mut out = Tensor::zeros(x.shape().clone());
    let dst = out.as_mut_slice();
    for r in 0..rows {
        let row = &src[r * cols..(r + 1) * cols];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let sum: f32 = row.iter().map(|&v| (v - max).exp()).sum();
        for (j, &v) in row.iter().enumerate() {
            let p = prior.map_or(0.0, |p| p.as_slice()[r * cols + j]);
            dst[r * cols + j] = alpha * (v - max).exp() / sum + beta * p;
        }
    }
    Ok(out)
}

/// Largest `|actual - expected| / max(|expected|, 1)` over two buffers.
///
/// The denominator floor keeps near-zero reference values from turning
/// rounding noise into huge relative errors.
pub fn max_relative_error(actual: &[f32], expected: &[f32]) -> f32 {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| (a - e).abs() / e.abs().max(1.0))
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_2x2() {
        let a = Tensor::<f32>::from_vec(Shape::matrix(2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::from_vec(Shape::matrix(2, 2), vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = Tensor::<f32>::zeros(Shape::matrix(2, 3));
        let b = Tensor::<f32>::zeros(Shape::matrix(2, 3));
        assert!(matmul(&a, &b).is_err());
    }

    #[test]
    fn test_conv_output_extent() {
        let g = Conv2dGeometry {
            n: 1,
            c: 1,
            hi: 7,
            wi: 7,
            k: 1,
            y: 3,
            x: 3,
            stride: [2, 2],
            dilation: [1, 1],
            left_pad: [1, 1],
            right_pad: [1, 1],
        };
        assert_eq!(g.ho(), 4);
        assert_eq!(g.wo(), 4);
    }

    #[test]
    fn test_conv_1x1_is_matmul() {
        let g = Conv2dGeometry {
            n: 1,
            c: 2,
            hi: 1,
            wi: 2,
            k: 1,
            y: 1,
            x: 1,
            stride: [1, 1],
            dilation: [1, 1],
            left_pad: [0, 0],
            right_pad: [0, 0],
        };
        let input = Tensor::<f32>::from_vec(g.input_shape(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let weight = Tensor::<f32>::from_vec(g.weight_shape(), vec![10.0, 1.0]).unwrap();
        let out = conv2d_nhwc(&input, &weight, &g).unwrap();
        assert_eq!(out.as_slice(), &[12.0, 34.0]);
    }

    #[test]
    fn test_conv_rejects_oversized_filter() {
        let g = Conv2dGeometry {
            n: 1,
            c: 1,
            hi: 2,
            wi: 2,
            k: 1,
            y: 3,
            x: 3,
            stride: [1, 1],
            dilation: [1, 1],
            left_pad: [0, 0],
            right_pad: [0, 0],
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_softmax_rows_sum_to_alpha() {
        let x = Tensor::<f32>::from_fn(Shape::matrix(3, 5), |i| (i as f32 * 0.37).sin());
        let y = softmax_rows(&x, 2.0, 0.0, None).unwrap();
        for r in 0..3 {
            let s: f32 = y.as_slice()[r * 5..(r + 1) * 5].iter().sum();
            assert!((s - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_max_relative_error() {
        assert_eq!(max_relative_error(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!((max_relative_error(&[0.5], &[0.0]) - 0.5).abs() < 1e-7);
    }
}
