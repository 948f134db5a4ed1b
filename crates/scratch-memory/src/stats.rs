// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scratch pool statistics.

/// Cumulative statistics about scratch arena usage.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ScratchStats {
    /// Total number of acquire requests.
    pub acquisitions: u64,
    /// Acquisitions served by a recycled arena.
    pub reuses: u64,
    /// Acquisitions that needed a fresh arena.
    pub fresh: u64,
    /// Requests rejected for exceeding the budget.
    pub rejected: u64,
    /// Arenas returned to the pool.
    pub releases: u64,
    /// Largest single arena handed out, in bytes.
    pub largest_arena_bytes: usize,
    /// Peak bytes held by live guards at once.
    pub peak_live_bytes: usize,
}

impl ScratchStats {
    /// Fraction of acquisitions served from recycled arenas, in `[0.0, 1.0]`.
    pub fn reuse_ratio(&self) -> f64 {
        let served = self.reuses + self.fresh;
        if served == 0 {
            return 0.0;
        }
        self.reuses as f64 / served as f64
    }

    pub(crate) fn record_acquire(&mut self, bytes: usize, reused: bool) {
        self.acquisitions += 1;
        if reused {
            self.reuses += 1;
        } else {
            self.fresh += 1;
        }
        self.largest_arena_bytes = self.largest_arena_bytes.max(bytes);
    }

    pub(crate) fn record_rejected(&mut self) {
        self.acquisitions += 1;
        self.rejected += 1;
    }

    pub(crate) fn record_release(&mut self) {
        self.releases += 1;
    }

    pub(crate) fn update_peak(&mut self, live_bytes: usize) {
        self.peak_live_bytes = self.peak_live_bytes.max(live_bytes);
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Scratch: {} acquisitions ({} reused, {} fresh, {:.0}% reuse), \
             {} rejected, largest arena {} B, peak live {:.1} KB",
            self.acquisitions,
            self.reuses,
            self.fresh,
            self.reuse_ratio() * 100.0,
            self.rejected,
            self.largest_arena_bytes,
            self.peak_live_bytes as f64 / 1024.0,
        )
    }
}
