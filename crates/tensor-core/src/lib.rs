// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Element types and memory carriers shared by every layer of the tiled
//! compute engine.
//!
//! This crate provides:
//! - [`DType`] and the [`Element`] trait: the operand types a kernel can be
//!   instantiated with (`f32`, `half::f16`, `half::bf16`).
//! - [`Tensor`]: an owned, typed host tensor in row-major order.
//! - [`DeviceBuffer`]: the "global memory" of a launch, a flat buffer of
//!   atomically updatable cells shared by every work-group.
//! - [`ops`]: the fused epilogue operators, the reduction operators and the
//!   naive reference kernels the tiled kernels are verified against.
//!
//! # Memory Model
//!
//! ```text
//!   Tensor<T>  ──DeviceBuffer::from_slice──►  DeviceBuffer<T>
//!   (host, &mut)                              (global, &, atomic cells)
//!                                                  │
//!                              Set: store()  ◄─────┤
//!                        AtomicAdd: atomic_add() ◄─┘
//! ```
//!
//! Kernels never hold `&mut` to global memory: many work-groups write
//! disjoint (Set) or overlapping (AtomicAdd) elements of the same buffer
//! concurrently, so every cell is an `AtomicU32` holding the element's bits.

mod device_buffer;
mod dtype;
mod error;
pub mod ops;
mod shape;
mod tensor;

pub use device_buffer::DeviceBuffer;
pub use dtype::{DType, Element};
pub use error::TensorError;
pub use ops::elementwise::{
    AddAddFastGelu, AddBias, AddRelu, CElementwise, FastGelu, PassThrough, Relu, Scale,
};
pub use ops::reduce::ReduceOp;
pub use ops::reference::Conv2dGeometry;
pub use shape::Shape;
pub use tensor::Tensor;
