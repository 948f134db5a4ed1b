// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Problem definitions: what to compute, independent of how it is tiled.

use crate::ProblemError;
use std::fmt;
use tensor_core::{Conv2dGeometry, DType};

/// Memory order of a 2-D operand.
///
/// For A (`M × K`), row-major is `MK` and column-major is `KM`. For B
/// (`K × N`), row-major is `KN` and column-major is `NK`. C is always
/// row-major.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::RowMajor => "row-major",
            Layout::ColumnMajor => "column-major",
        }
    }

    /// Parses `row-major` / `column-major`, or the short forms `row` / `col`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "row-major" | "row" => Some(Layout::RowMajor),
            "column-major" | "col" | "column" => Some(Layout::ColumnMajor),
            _ => None,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a GEMM treats dimensions that are not multiples of the tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GemmSpecialization {
    /// M, N and K must divide the tile; anything else fails the validity
    /// check.
    #[default]
    Default,
    /// M, N and K are right-padded to tile multiples. Padded reads return
    /// zero and padded writes are dropped.
    MnkPadding,
}

impl GemmSpecialization {
    pub fn as_str(self) -> &'static str {
        match self {
            GemmSpecialization::Default => "default",
            GemmSpecialization::MnkPadding => "mnk-padding",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Some(GemmSpecialization::Default),
            "mnk-padding" | "padding" => Some(GemmSpecialization::MnkPadding),
            _ => None,
        }
    }
}

impl fmt::Display for GemmSpecialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_dtype() -> DType {
    DType::F32
}

/// `C[M, N] = A[M, K] · B[K, N]` with arbitrary leading strides.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GemmProblem {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    #[serde(default)]
    pub a_layout: Layout,
    #[serde(default)]
    pub b_layout: Layout,
    /// Leading stride of A; packed when absent.
    #[serde(default)]
    pub stride_a: Option<usize>,
    #[serde(default)]
    pub stride_b: Option<usize>,
    #[serde(default)]
    pub stride_c: Option<usize>,
    /// Operand type of A and B. Accumulation is always `f32`.
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

impl GemmProblem {
    /// A packed, row-major `f32` problem.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            a_layout: Layout::RowMajor,
            b_layout: Layout::RowMajor,
            stride_a: None,
            stride_b: None,
            stride_c: None,
            dtype: DType::F32,
        }
    }

    pub fn with_layouts(mut self, a: Layout, b: Layout) -> Self {
        self.a_layout = a;
        self.b_layout = b;
        self
    }

    pub fn with_strides(mut self, a: usize, b: usize, c: usize) -> Self {
        self.stride_a = Some(a);
        self.stride_b = Some(b);
        self.stride_c = Some(c);
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Leading stride of A.
    pub fn lda(&self) -> usize {
        self.stride_a.unwrap_or(match self.a_layout {
            Layout::RowMajor => self.k,
            Layout::ColumnMajor => self.m,
        })
    }

    /// Leading stride of B.
    pub fn ldb(&self) -> usize {
        self.stride_b.unwrap_or(match self.b_layout {
            Layout::RowMajor => self.n,
            Layout::ColumnMajor => self.k,
        })
    }

    /// Leading stride of C.
    pub fn ldc(&self) -> usize {
        self.stride_c.unwrap_or(self.n)
    }

    /// `[stride along M, stride along K]` of A.
    pub fn a_strides(&self) -> [usize; 2] {
        match self.a_layout {
            Layout::RowMajor => [self.lda(), 1],
            Layout::ColumnMajor => [1, self.lda()],
        }
    }

    /// `[stride along K, stride along N]` of B.
    pub fn b_strides(&self) -> [usize; 2] {
        match self.b_layout {
            Layout::RowMajor => [self.ldb(), 1],
            Layout::ColumnMajor => [1, self.ldb()],
        }
    }

    /// Element offset of `A[m, k]`.
    pub fn a_index(&self, m: usize, k: usize) -> usize {
        let [sm, sk] = self.a_strides();
        m * sm + k * sk
    }

    /// Element offset of `B[k, n]`.
    pub fn b_index(&self, k: usize, n: usize) -> usize {
        let [sk, sn] = self.b_strides();
        k * sk + n * sn
    }

    /// Element offset of `C[m, n]`.
    pub fn c_index(&self, m: usize, n: usize) -> usize {
        m * self.ldc() + n
    }

    /// Elements the A buffer must hold.
    pub fn a_elements(&self) -> usize {
        self.a_index(self.m - 1, self.k - 1) + 1
    }

    pub fn b_elements(&self) -> usize {
        self.b_index(self.k - 1, self.n - 1) + 1
    }

    pub fn c_elements(&self) -> usize {
        self.c_index(self.m - 1, self.n - 1) + 1
    }

    /// Multiply-adds counted as two operations.
    pub fn flops(&self) -> u64 {
        2 * self.m as u64 * self.n as u64 * self.k as u64
    }

    /// Checks extents and strides.
    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.m == 0 || self.n == 0 || self.k == 0 {
            return Err(invalid("gemm", format!("zero extent {}×{}×{}", self.m, self.n, self.k)));
        }
        let min_a = match self.a_layout {
            Layout::RowMajor => self.k,
            Layout::ColumnMajor => self.m,
        };
        let min_b = match self.b_layout {
            Layout::RowMajor => self.n,
            Layout::ColumnMajor => self.k,
        };
        for (operand, stride, min) in [
            ("A", self.lda(), min_a),
            ("B", self.ldb(), min_b),
            ("C", self.ldc(), self.n),
        ] {
            if stride < min {
                return Err(invalid(
                    "gemm",
                    format!("leading stride of {operand} is {stride}, needs at least {min}"),
                ));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "gemm {}×{}×{} {} (A {}, B {}, lda {}, ldb {}, ldc {})",
            self.m,
            self.n,
            self.k,
            self.dtype,
            self.a_layout,
            self.b_layout,
            self.lda(),
            self.ldb(),
            self.ldc()
        )
    }
}

/// Forward 2-D convolution, NHWC × KYXC → NHWK, computed as an implicit
/// GEMM with `M = N·Ho·Wo`, `N = K` and `K = Y·X·C`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Conv2dFwdProblem {
    #[serde(flatten)]
    pub geometry: Conv2dGeometry,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

impl Conv2dFwdProblem {
    pub fn new(geometry: Conv2dGeometry) -> Self {
        Self {
            geometry,
            dtype: DType::F32,
        }
    }

    pub fn gemm_m(&self) -> usize {
        let g = &self.geometry;
        g.n * g.ho() * g.wo()
    }

    pub fn gemm_n(&self) -> usize {
        self.geometry.k
    }

    pub fn gemm_k(&self) -> usize {
        let g = &self.geometry;
        g.y * g.x * g.c
    }

    pub fn flops(&self) -> u64 {
        2 * self.gemm_m() as u64 * self.gemm_n() as u64 * self.gemm_k() as u64
    }

    pub fn validate(&self) -> Result<(), ProblemError> {
        self.geometry.validate()?;
        Ok(())
    }

    pub fn summary(&self) -> String {
        let g = &self.geometry;
        format!(
            "conv2d-fwd N{} C{} {}×{} → K{} {}×{}, filter {}×{}, stride {:?}, dilation {:?}, pad {:?}/{:?} {} (gemm {}×{}×{})",
            g.n,
            g.c,
            g.hi,
            g.wi,
            g.k,
            g.ho(),
            g.wo(),
            g.y,
            g.x,
            g.stride,
            g.dilation,
            g.left_pad,
            g.right_pad,
            self.dtype,
            self.gemm_m(),
            self.gemm_n(),
            self.gemm_k()
        )
    }
}

fn one() -> f32 {
    1.0
}

/// Row softmax blended with a prior output: `y = α·softmax(x) + β·y`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoftmaxProblem {
    pub rows: usize,
    pub cols: usize,
    #[serde(default = "one")]
    pub alpha: f32,
    #[serde(default)]
    pub beta: f32,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

impl SoftmaxProblem {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            alpha: 1.0,
            beta: 0.0,
            dtype: DType::F32,
        }
    }

    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(invalid(
                "softmax",
                format!("zero extent {}×{}", self.rows, self.cols),
            ));
        }
        if !self.alpha.is_finite() || !self.beta.is_finite() {
            return Err(invalid("softmax", "alpha and beta must be finite".into()));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "softmax {}×{} {} (α {}, β {})",
            self.rows, self.cols, self.dtype, self.alpha, self.beta
        )
    }
}

/// Any problem the engine can launch.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Problem {
    Gemm(GemmProblem),
    Conv2dFwd(Conv2dFwdProblem),
    Softmax(SoftmaxProblem),
}

impl Problem {
    pub fn op_name(&self) -> &'static str {
        match self {
            Problem::Gemm(_) => "gemm",
            Problem::Conv2dFwd(_) => "conv2d-fwd",
            Problem::Softmax(_) => "softmax",
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Problem::Gemm(p) => p.dtype,
            Problem::Conv2dFwd(p) => p.dtype,
            Problem::Softmax(p) => p.dtype,
        }
    }

    /// Floating-point operations; softmax counts as zero.
    pub fn flops(&self) -> u64 {
        match self {
            Problem::Gemm(p) => p.flops(),
            Problem::Conv2dFwd(p) => p.flops(),
            Problem::Softmax(_) => 0,
        }
    }

    pub fn validate(&self) -> Result<(), ProblemError> {
        match self {
            Problem::Gemm(p) => p.validate(),
            Problem::Conv2dFwd(p) => p.validate(),
            Problem::Softmax(p) => p.validate(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Problem::Gemm(p) => p.summary(),
            Problem::Conv2dFwd(p) => p.summary(),
            Problem::Softmax(p) => p.summary(),
        }
    }
}

fn invalid(name: &str, detail: String) -> ProblemError {
    ProblemError::InvalidProblem {
        name: name.to_string(),
        detail,
    }
}
