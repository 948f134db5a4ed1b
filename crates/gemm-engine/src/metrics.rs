// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Launch metrics.
//!
//! Every work-group counts its barriers, global vector transactions and
//! scratch hazards in a [`GroupStats`]. The launch folds them into one
//! [`LaunchMetrics`] together with the wall-clock time.

use std::time::Duration;

/// Counters of one work-group, or the sum over many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GroupStats {
    /// Barriers executed, including the epilogue's.
    pub barriers: u64,
    /// Global vector loads issued by the movers.
    pub vector_reads: u64,
    /// Global vector stores (or atomic adds) issued by the epilogue.
    pub vector_writes: u64,
    /// Tile writes into scratch.
    pub scratch_writes: u64,
    /// Barrier-discipline violations seen by the scratch tracker.
    pub hazard_violations: u64,
}

impl GroupStats {
    /// Field-wise sum.
    pub fn merge(self, other: Self) -> Self {
        Self {
            barriers: self.barriers + other.barriers,
            vector_reads: self.vector_reads + other.vector_reads,
            vector_writes: self.vector_writes + other.vector_writes,
            scratch_writes: self.scratch_writes + other.scratch_writes,
            hazard_violations: self.hazard_violations + other.hazard_violations,
        }
    }
}

/// Aggregate metrics for one kernel launch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LaunchMetrics {
    /// Kernel name, e.g. `gemm/double-buffer/fragment`.
    pub kernel: String,
    /// Number of work-groups.
    pub groups: usize,
    /// Workers per group.
    pub block_size: usize,
    /// Scratch arena size of one group in bytes.
    pub scratch_bytes_per_group: usize,
    /// Floating-point operations of the problem.
    pub flops: u64,
    /// Counters summed over all groups.
    pub totals: GroupStats,
    /// Wall-clock time of the launch.
    pub duration: Duration,
}

impl LaunchMetrics {
    /// Creates an empty metrics container.
    pub fn new(kernel: impl Into<String>, groups: usize, block_size: usize) -> Self {
        Self {
            kernel: kernel.into(),
            groups,
            block_size,
            scratch_bytes_per_group: 0,
            flops: 0,
            totals: GroupStats::default(),
            duration: Duration::ZERO,
        }
    }

    pub fn with_scratch_bytes(mut self, bytes: usize) -> Self {
        self.scratch_bytes_per_group = bytes;
        self
    }

    pub fn with_flops(mut self, flops: u64) -> Self {
        self.flops = flops;
        self
    }

    /// Adds one group's counters.
    pub fn record_group(&mut self, stats: GroupStats) {
        self.totals = self.totals.merge(stats);
    }

    /// Finalises metrics with the total wall-clock time.
    pub fn finalise(&mut self, total: Duration) {
        self.duration = total;
    }

    /// Barriers per work-group.
    pub fn barriers_per_group(&self) -> f64 {
        if self.groups == 0 {
            return 0.0;
        }
        self.totals.barriers as f64 / self.groups as f64
    }

    /// Returns GFLOP/s throughput.
    pub fn gflops(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 || self.flops == 0 {
            return 0.0;
        }
        self.flops as f64 / secs / 1e9
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "{}: {:.3}ms, {} groups × {} workers, {:.1} barriers/group, \
             {} vector loads, {} vector stores, {} KB scratch/group, \
             {} hazards, {:.2} GFLOP/s",
            self.kernel,
            self.duration.as_secs_f64() * 1000.0,
            self.groups,
            self.block_size,
            self.barriers_per_group(),
            self.totals.vector_reads,
            self.totals.vector_writes,
            self.scratch_bytes_per_group / 1024,
            self.totals.hazard_violations,
            self.gflops(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = LaunchMetrics::new("gemm", 0, 64);
        assert_eq!(m.gflops(), 0.0);
        assert_eq!(m.barriers_per_group(), 0.0);
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = LaunchMetrics::new("gemm", 2, 64).with_flops(2_000_000_000);
        m.record_group(GroupStats {
            barriers: 5,
            vector_reads: 10,
            ..Default::default()
        });
        m.record_group(GroupStats {
            barriers: 7,
            vector_writes: 3,
            ..Default::default()
        });
        m.finalise(Duration::from_secs(1));
        assert_eq!(m.totals.barriers, 12);
        assert_eq!(m.totals.vector_reads, 10);
        assert_eq!(m.totals.vector_writes, 3);
        assert_eq!(m.barriers_per_group(), 6.0);
        assert!((m.gflops() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_contains_kernel() {
        let m = LaunchMetrics::new("softmax", 4, 64).with_scratch_bytes(2048);
        let s = m.summary();
        assert!(s.contains("softmax"));
        assert!(s.contains("2 KB scratch/group"));
    }

    #[test]
    fn test_serialize() {
        let m = LaunchMetrics::new("gemm", 1, 16);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"kernel\":\"gemm\""));
    }
}
