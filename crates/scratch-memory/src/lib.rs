// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scratch-memory
//!
//! On-chip scratch memory for one work-group, simulated on the host.
//!
//! # Key Components
//!
//! - [`ScratchBudget`]: the per-group scratch ceiling with human-readable
//!   parsing (`"64K"`, `"32KB"`, etc.).
//! - [`ScratchPool`]: hands out zeroed `f32` arenas no larger than the
//!   budget and recycles them when released.
//! - [`ScratchGuard`]: an RAII wrapper around one arena. Dropping the guard
//!   returns the arena to the pool.
//! - [`ScratchLayout`]: the partition of an arena into named regions: A/B
//!   tiles per pipeline stage and a C-staging region that reuses the stage
//!   memory after the main loop.
//! - [`ScratchTracker`]: records the barrier epoch of every region access
//!   and reports accesses that would race without a barrier in between.
//! - [`ScratchStats`]: cumulative pool metrics.
//!
//! # Double-Buffer Layout
//!
//! ```text
//!  lanes:  0                a      a+b          2a+b      2(a+b)
//!          ├── A(0) ────────┼─ B(0) ─┼── A(1) ─────┼─ B(1) ─┤
//!          ├── C (after the main loop) ──────┤
//! ```
//!
//! Stage memory is handed out as disjoint `&mut` slices obtained with
//! `split_at_mut`, so the borrow checker rules out a stage being written
//! while it is read within one phase. The tracker catches the remaining
//! cross-phase ordering errors: a read of a region in the same barrier epoch
//! it was written, or a write to a region in the same epoch it was read.
//!
//! # Example
//! ```
//! use scratch_memory::{Region, ScratchBudget, ScratchLayout, ScratchPool};
//!
//! let layout = ScratchLayout::gemm(256, 256, 1024, 2, 4);
//! assert_eq!(layout.bytes(), 4096);
//!
//! let pool = ScratchPool::new(ScratchBudget::from_kb(64));
//! let mut guard = pool.acquire(layout.total_lanes()).unwrap();
//! let (even, odd) = layout.split_stages(guard.as_mut_slice()).unwrap();
//! even.a[0] = 1.0;
//! assert!(odd.is_some());
//! assert_eq!(layout.region(Region::B(1)), Some(768..1024));
//! ```

mod budget;
mod error;
mod guard;
mod layout;
pub mod pool;
mod stats;
mod tracker;

pub use budget::ScratchBudget;
pub use error::ScratchError;
pub use guard::ScratchGuard;
pub use layout::{Region, ScratchLayout, StageMut};
pub use pool::ScratchPool;
pub use stats::ScratchStats;
pub use tracker::{Hazard, HazardViolation, ScratchTracker};

/// Size of one scratch lane in bytes. Scratch holds `f32` lanes.
pub const LANE_BYTES: usize = 4;
