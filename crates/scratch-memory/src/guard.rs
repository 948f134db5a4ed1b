// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII guard that returns a scratch arena to its pool on drop.

use crate::pool::PoolInner;
use crate::LANE_BYTES;
use std::sync::Arc;

/// One work-group's scratch arena.
///
/// The arena is zeroed when acquired and returned to the
/// [`ScratchPool`](crate::ScratchPool) when the guard is dropped. A worker
/// thread typically holds one guard for every group it runs.
pub struct ScratchGuard {
    /// Wrapped in `Option` so `drop()` can take it.
    data: Option<Vec<f32>>,
    pool: Arc<PoolInner>,
    lanes: usize,
}

impl ScratchGuard {
    pub(crate) fn new(data: Vec<f32>, pool: Arc<PoolInner>, lanes: usize) -> Self {
        Self {
            data: Some(data),
            pool,
            lanes,
        }
    }

    /// The arena, `lanes()` long.
    pub fn as_slice(&self) -> &[f32] {
        match &self.data {
            Some(d) => &d[..self.lanes],
            None => &[],
        }
    }

    /// The arena, `lanes()` long.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        match &mut self.data {
            Some(d) => &mut d[..self.lanes],
            None => &mut [],
        }
    }

    /// Number of `f32` lanes in the arena.
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Size of the arena in bytes.
    pub fn size_bytes(&self) -> usize {
        self.lanes * LANE_BYTES
    }

    /// Zeroes the arena. Used between groups that share one guard.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0.0);
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(arena) = self.data.take() {
            self.pool.return_arena(arena, self.lanes);
        }
    }
}

impl std::fmt::Debug for ScratchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchGuard")
            .field("lanes", &self.lanes)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}
