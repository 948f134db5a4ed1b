// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scalar operators used inside kernels, and the reference kernels used to
//! check them.
//!
//! - [`elementwise`]: fused epilogue operators applied once per output
//!   element, entirely in registers.
//! - [`reduce`]: reduction operators with their identities and the
//!   NaN-aware accumulation rules.
//! - [`reference`]: naive host implementations (GEMM, NHWC convolution,
//!   row softmax) that define the expected results.

pub mod elementwise;
pub mod reduce;
pub mod reference;
