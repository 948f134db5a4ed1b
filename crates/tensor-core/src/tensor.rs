// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Owned host tensors.

use crate::{Element, Shape, TensorError};

/// An owned, typed, packed row-major tensor on the host.
///
/// Host tensors carry operands into a launch and hold reference results.
/// Kernels read them as plain slices; anything a kernel writes goes through
/// a [`crate::DeviceBuffer`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Element> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Element> Tensor<T> {
    /// Creates a tensor filled with `T::default()` (zero for every float type).
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t: Tensor<f32> = Tensor::zeros(Shape::matrix(2, 3));
    /// assert_eq!(t.as_slice().len(), 6);
    /// ```
    pub fn zeros(shape: Shape) -> Self {
        let data = vec![T::default(); shape.num_elements()];
        Self { shape, data }
    }

    /// Wraps an existing buffer.
    ///
    /// Returns an error if `data.len()` does not equal the shape's element count.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self, TensorError> {
        let expected = shape.num_elements();
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Builds a tensor by evaluating `f` at every packed offset.
    pub fn from_fn(shape: Shape, f: impl FnMut(usize) -> T) -> Self {
        let data = (0..shape.num_elements()).map(f).collect();
        Self { shape, data }
    }

    /// Builds a tensor by narrowing `f32` values into `T`.
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.iter().map(|&v| T::from_f32(v)).collect())
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the elements mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Reads the element at a multi-index.
    pub fn get(&self, idx: &[usize]) -> T {
        self.data[self.shape.flat_index(idx)]
    }

    /// Widens every element to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.data.iter().map(|v| v.to_f32()).collect()
    }

    /// Returns the memory footprint of the elements in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * T::DTYPE.size_bytes()
    }

    /// Consumes the tensor and returns its buffer.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}
