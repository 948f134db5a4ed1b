// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scratch arena pool with a per-arena budget.
//!
//! The [`ScratchPool`] models the on-chip memory of a compute unit: every
//! work-group gets its own arena, and no arena may exceed the
//! [`ScratchBudget`]. Returned arenas are kept on a free list and handed out
//! again, zeroed, so a launch allocates at most one arena per worker thread.
//!
//! # Thread Safety
//! `ScratchPool` is `Send + Sync`; worker threads share it through `&` and
//! each holds its own [`ScratchGuard`].

use crate::{ScratchBudget, ScratchError, ScratchGuard, ScratchStats, LANE_BYTES};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// State shared between the pool and its guards.
pub struct PoolInner {
    budget: ScratchBudget,
    live_bytes: AtomicUsize,
    free_arenas: Mutex<Vec<Vec<f32>>>,
    stats: Mutex<ScratchStats>,
}

impl PoolInner {
    /// Called by `ScratchGuard::drop`.
    pub(crate) fn return_arena(&self, arena: Vec<f32>, lanes: usize) {
        self.live_bytes.fetch_sub(lanes * LANE_BYTES, Ordering::Release);
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_release();
        }
        if let Ok(mut free) = self.free_arenas.lock() {
            free.push(arena);
        }
    }
}

/// Hands out zeroed per-group scratch arenas.
///
/// # Example
/// ```
/// use scratch_memory::{ScratchBudget, ScratchPool};
///
/// let pool = ScratchPool::new(ScratchBudget::from_kb(16));
/// let guard = pool.acquire(1024).unwrap();
/// assert_eq!(guard.size_bytes(), 4096);
/// assert!(pool.acquire(8192).is_err()); // 32 KB > 16 KB
/// drop(guard);
/// assert_eq!(pool.live_bytes(), 0);
/// ```
pub struct ScratchPool {
    inner: Arc<PoolInner>,
}

impl ScratchPool {
    /// Creates a pool whose arenas are limited to `budget`.
    pub fn new(budget: ScratchBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                live_bytes: AtomicUsize::new(0),
                free_arenas: Mutex::new(Vec::new()),
                stats: Mutex::new(ScratchStats::default()),
            }),
        }
    }

    /// Acquires a zeroed arena of `lanes` `f32` lanes.
    ///
    /// Returns `Err(OverBudget)` if the arena is larger than the budget.
    /// A recycled arena with enough capacity is reused when available.
    pub fn acquire(&self, lanes: usize) -> Result<ScratchGuard, ScratchError> {
        if lanes == 0 {
            return Err(ScratchError::ZeroSized);
        }
        let bytes = lanes * LANE_BYTES;
        let budget = self.inner.budget.as_bytes();
        if bytes > budget {
            if let Ok(mut stats) = self.inner.stats.lock() {
                stats.record_rejected();
            }
            return Err(ScratchError::OverBudget {
                requested_bytes: bytes,
                budget_bytes: budget,
            });
        }

        let recycled = self.inner.free_arenas.lock().ok().and_then(|mut free| {
            let pos = free.iter().position(|a| a.len() >= lanes)?;
            Some(free.swap_remove(pos))
        });
        let reused = recycled.is_some();
        let arena = match recycled {
            Some(mut a) => {
                a[..lanes].fill(0.0);
                a
            }
            None => vec![0.0f32; lanes],
        };

        let live = self.inner.live_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_acquire(bytes, reused);
            stats.update_peak(live);
        }

        Ok(ScratchGuard::new(arena, Arc::clone(&self.inner), lanes))
    }

    /// The per-arena budget.
    pub fn budget(&self) -> ScratchBudget {
        self.inner.budget
    }

    /// Bytes currently held by live guards.
    pub fn live_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::Acquire)
    }

    /// Number of arenas waiting on the free list.
    pub fn free_arenas(&self) -> usize {
        self.inner.free_arenas.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Snapshot of pool statistics.
    pub fn stats(&self) -> ScratchStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drops every recycled arena.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free_arenas.lock() {
            tracing::debug!("releasing {} recycled scratch arenas", free.len());
            free.clear();
        }
    }
}

impl std::fmt::Debug for ScratchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchPool")
            .field("budget", &self.inner.budget)
            .field("live_bytes", &self.live_bytes())
            .field("free_arenas", &self.free_arenas())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_drop() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(64));
        let guard = pool.acquire(256).unwrap();
        assert_eq!(guard.lanes(), 256);
        assert_eq!(pool.live_bytes(), 1024);
        drop(guard);
        assert_eq!(pool.live_bytes(), 0);
        assert_eq!(pool.free_arenas(), 1);
    }

    #[test]
    fn test_over_budget() {
        let pool = ScratchPool::new(ScratchBudget::from_bytes(1024));
        assert!(pool.acquire(256).is_ok());
        let err = pool.acquire(257).unwrap_err();
        assert_eq!(
            err,
            ScratchError::OverBudget {
                requested_bytes: 1028,
                budget_bytes: 1024
            }
        );
        assert_eq!(pool.stats().rejected, 1);
    }

    #[test]
    fn test_budget_is_per_arena() {
        // Many groups may hold arenas at once; each one fits on its own.
        let pool = ScratchPool::new(ScratchBudget::from_bytes(1024));
        let guards: Vec<_> = (0..8).map(|_| pool.acquire(256).unwrap()).collect();
        assert_eq!(pool.live_bytes(), 8 * 1024);
        drop(guards);
        assert_eq!(pool.stats().peak_live_bytes, 8 * 1024);
    }

    #[test]
    fn test_zero_sized() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(1));
        assert_eq!(pool.acquire(0).unwrap_err(), ScratchError::ZeroSized);
    }

    #[test]
    fn test_recycled_arena_is_zeroed() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(4));
        let mut g = pool.acquire(512).unwrap();
        g.as_mut_slice().fill(7.0);
        drop(g);

        let g = pool.acquire(128).unwrap();
        assert_eq!(g.as_slice().len(), 128);
        assert!(g.as_slice().iter().all(|&v| v == 0.0));

        let stats = pool.stats();
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.fresh, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_small_arena_not_reused_for_large_request() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(4));
        drop(pool.acquire(16).unwrap());
        let _g = pool.acquire(64).unwrap();
        assert_eq!(pool.stats().reuses, 0);
        assert_eq!(pool.free_arenas(), 1);
    }

    #[test]
    fn test_shrink() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(4));
        drop(pool.acquire(16).unwrap());
        pool.shrink();
        assert_eq!(pool.free_arenas(), 0);
    }

    #[test]
    fn test_guard_clear() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(4));
        let mut g = pool.acquire(8).unwrap();
        g.as_mut_slice()[3] = 2.0;
        g.clear();
        assert!(g.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_debug_format() {
        let pool = ScratchPool::new(ScratchBudget::from_kb(64));
        let debug = format!("{pool:?}");
        assert!(debug.contains("ScratchPool"));
        assert!(debug.contains("budget"));
    }
}
