// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Global memory shared by all work-groups of a launch.
//!
//! A [`DeviceBuffer`] stores one `AtomicU32` per element. Plain stores and
//! loads are relaxed: ordering between a launch and the host is established
//! by the thread pool's join, and ordering between work-groups is never
//! required. Atomic accumulation is a compare-and-swap loop on the bit
//! pattern, so contributions from different groups are individually atomic
//! and commute.

use crate::{Element, Tensor, TensorError};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

/// A flat, atomically updatable element buffer.
///
/// # Example
/// ```
/// use tensor_core::DeviceBuffer;
///
/// let c = DeviceBuffer::<f32>::zeroed(4);
/// c.atomic_add(1, 2.0);
/// c.atomic_add(1, 3.0);
/// assert_eq!(c.load(1), 5.0);
/// ```
pub struct DeviceBuffer<T: Element> {
    cells: Vec<AtomicU32>,
    _element: PhantomData<T>,
}

impl<T: Element> DeviceBuffer<T> {
    /// Allocates `len` zero-initialised elements.
    pub fn zeroed(len: usize) -> Self {
        let zero = T::default().to_bits();
        Self {
            cells: (0..len).map(|_| AtomicU32::new(zero)).collect(),
            _element: PhantomData,
        }
    }

    /// Copies a host slice into a new buffer.
    pub fn from_slice(values: &[T]) -> Self {
        Self {
            cells: values.iter().map(|v| AtomicU32::new(v.to_bits())).collect(),
            _element: PhantomData,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Reads one element.
    #[inline]
    pub fn load(&self, index: usize) -> T {
        T::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    /// Overwrites one element (the Set write policy).
    #[inline]
    pub fn store(&self, index: usize, value: T) {
        self.cells[index].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Atomically adds `value` to one element (the AtomicAdd write policy).
    ///
    /// The addition is carried out in `f32` and narrowed back to `T`.
    #[inline]
    pub fn atomic_add(&self, index: usize, value: f32) {
        // The closure never returns `None`, so the update always succeeds.
        let _ = self.cells[index].fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            let sum = T::from_bits(bits).to_f32() + value;
            Some(T::from_f32(sum).to_bits())
        });
    }

    /// Overwrites every element with `value`.
    pub fn fill(&self, value: T) {
        let bits = value.to_bits();
        for cell in &self.cells {
            cell.store(bits, Ordering::Relaxed);
        }
    }

    /// Copies the buffer back to the host.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.load(i)).collect()
    }

    /// Copies the buffer back to the host, widened to `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.load(i).to_f32()).collect()
    }

    /// Copies the buffer into a host tensor of the given shape.
    pub fn to_tensor(&self, shape: crate::Shape) -> Result<Tensor<T>, TensorError> {
        Tensor::from_vec(shape, self.to_vec())
    }
}

impl<T: Element> From<&Tensor<T>> for DeviceBuffer<T> {
    fn from(t: &Tensor<T>) -> Self {
        Self::from_slice(t.as_slice())
    }
}

impl<T: Element> std::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("dtype", &T::DTYPE)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use std::sync::Arc;

    #[test]
    fn test_zeroed() {
        let b = DeviceBuffer::<f16>::zeroed(8);
        assert_eq!(b.len(), 8);
        assert!(b.to_f32_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_store_is_overwrite() {
        let b = DeviceBuffer::<f32>::zeroed(2);
        b.store(0, 7.0);
        b.store(0, 3.0);
        assert_eq!(b.load(0), 3.0);
    }

    #[test]
    fn test_concurrent_atomic_add() {
        let b = Arc::new(DeviceBuffer::<f32>::zeroed(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        b.atomic_add(0, 1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.load(0), 8000.0);
    }

    #[test]
    fn test_fill_and_roundtrip() {
        let host = Tensor::<f32>::from_fn(crate::Shape::matrix(2, 2), |i| i as f32);
        let dev = DeviceBuffer::from(&host);
        assert_eq!(dev.to_vec(), host.as_slice());
        dev.fill(-1.0);
        assert_eq!(dev.to_vec(), vec![-1.0; 4]);
    }

    #[test]
    fn test_debug_format() {
        let b = DeviceBuffer::<f32>::zeroed(3);
        let debug = format!("{b:?}");
        assert!(debug.contains("DeviceBuffer"));
        assert!(debug.contains("F32"));
    }
}
