// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Barrier-discipline checking for scratch accesses.
//!
//! Workers of a group run in lock-step phases separated by barriers. Each
//! barrier opens a new *epoch*. Within one epoch a region may be written by
//! many workers or read by many workers, but not both: a read of lanes that
//! were written in the same epoch, or a write to lanes that were read in the
//! same epoch, would race on real hardware.
//!
//! Regions that share lanes (the C staging region and the pipeline stages)
//! are checked against each other.

use crate::{Region, ScratchLayout};
use std::fmt;

/// Kind of barrier violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterRead,
}

/// One access that happened without the barrier it needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HazardViolation {
    pub hazard: Hazard,
    /// Region being accessed.
    pub region: Region,
    /// Region whose earlier access in the same epoch conflicts.
    pub conflicting: Region,
    pub epoch: u64,
}

impl fmt::Display for HazardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.hazard {
            Hazard::ReadAfterWrite => "read of",
            Hazard::WriteAfterRead => "write to",
        };
        write!(
            f,
            "{what} {} conflicts with {} in epoch {} (missing barrier)",
            self.region, self.conflicting, self.epoch
        )
    }
}

/// Records the epoch of the last read and write of every region.
#[derive(Debug, Clone)]
pub struct ScratchTracker {
    regions: Vec<Region>,
    /// For each region, the indices of the regions sharing lanes with it.
    aliases: Vec<Vec<usize>>,
    last_read: Vec<Option<u64>>,
    last_write: Vec<Option<u64>>,
    epoch: u64,
    barriers: u64,
    violations: Vec<HazardViolation>,
}

impl ScratchTracker {
    /// A tracker over the regions of `layout`.
    pub fn new(layout: &ScratchLayout) -> Self {
        let entries: Vec<_> = layout.regions().collect();
        let aliases = entries
            .iter()
            .map(|(_, x)| {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, y))| x.start < y.end && y.start < x.end)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        let n = entries.len();
        Self {
            regions: entries.into_iter().map(|(r, _)| r).collect(),
            aliases,
            last_read: vec![None; n],
            last_write: vec![None; n],
            epoch: 0,
            barriers: 0,
            violations: Vec::new(),
        }
    }

    /// A group barrier: later accesses see every earlier one.
    pub fn barrier(&mut self) {
        self.epoch += 1;
        self.barriers += 1;
    }

    /// Records a read of `region`.
    pub fn read(&mut self, region: Region) {
        let Some(i) = self.index_of(region) else {
            return;
        };
        for &j in &self.aliases[i] {
            if self.last_write[j] == Some(self.epoch) {
                self.violations.push(HazardViolation {
                    hazard: Hazard::ReadAfterWrite,
                    region,
                    conflicting: self.regions[j],
                    epoch: self.epoch,
                });
            }
        }
        self.last_read[i] = Some(self.epoch);
    }

    /// Records a write to `region`.
    pub fn write(&mut self, region: Region) {
        let Some(i) = self.index_of(region) else {
            return;
        };
        for &j in &self.aliases[i] {
            if self.last_read[j] == Some(self.epoch) {
                self.violations.push(HazardViolation {
                    hazard: Hazard::WriteAfterRead,
                    region,
                    conflicting: self.regions[j],
                    epoch: self.epoch,
                });
            }
        }
        self.last_write[i] = Some(self.epoch);
    }

    /// Forgets all accesses, keeping the counters. Called between groups
    /// that reuse one arena.
    pub fn reset_epochs(&mut self) {
        self.last_read.fill(None);
        self.last_write.fill(None);
        self.epoch += 1;
    }

    /// Number of barriers recorded.
    pub fn barriers(&self) -> u64 {
        self.barriers
    }

    /// Every violation recorded so far.
    pub fn violations(&self) -> &[HazardViolation] {
        &self.violations
    }

    /// Takes the recorded violations, leaving the list empty.
    pub fn take_violations(&mut self) -> Vec<HazardViolation> {
        std::mem::take(&mut self.violations)
    }

    fn index_of(&self, region: Region) -> Option<usize> {
        let found = self.regions.iter().position(|&r| r == region);
        debug_assert!(found.is_some(), "region {region} is not in the layout");
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_buffer() -> ScratchTracker {
        ScratchTracker::new(&ScratchLayout::gemm(64, 64, 256, 2, 4))
    }

    #[test]
    fn test_pipelined_sequence_is_clean() {
        let mut t = double_buffer();
        // Prologue.
        t.write(Region::A(0));
        t.write(Region::B(0));
        // One main-loop iteration.
        for (cur, next) in [(0, 1), (1, 0)] {
            t.barrier();
            t.read(Region::A(cur));
            t.read(Region::B(cur));
            t.write(Region::A(next));
            t.write(Region::B(next));
        }
        // Tail, then the shuffled epilogue.
        t.barrier();
        t.read(Region::A(0));
        t.read(Region::B(0));
        t.barrier();
        t.write(Region::C);
        t.barrier();
        t.read(Region::C);

        assert!(t.violations().is_empty(), "{:?}", t.violations());
        assert_eq!(t.barriers(), 5);
    }

    #[test]
    fn test_read_without_barrier() {
        let mut t = double_buffer();
        t.write(Region::A(0));
        t.read(Region::A(0));
        assert_eq!(t.violations().len(), 1);
        assert_eq!(t.violations()[0].hazard, Hazard::ReadAfterWrite);
    }

    #[test]
    fn test_overwrite_of_stage_being_read() {
        let mut t = double_buffer();
        t.write(Region::A(1));
        t.barrier();
        t.read(Region::A(1));
        t.write(Region::A(1));
        let v = t.take_violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].hazard, Hazard::WriteAfterRead);
        assert!(t.violations().is_empty());
    }

    #[test]
    fn test_c_staging_aliases_stages() {
        let mut t = double_buffer();
        t.read(Region::B(1));
        t.write(Region::C);
        let v = t.violations();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].conflicting, Region::B(1));
        assert!(v[0].to_string().contains("missing barrier"));
    }

    #[test]
    fn test_disjoint_stages_do_not_conflict() {
        let mut t = double_buffer();
        t.read(Region::A(0));
        t.write(Region::A(1));
        t.write(Region::B(1));
        assert!(t.violations().is_empty());
    }

    #[test]
    fn test_reset_between_groups() {
        let mut t = double_buffer();
        t.write(Region::A(0));
        t.reset_epochs();
        t.read(Region::A(0));
        assert!(t.violations().is_empty());
    }
}
