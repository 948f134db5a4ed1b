// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Partition of a scratch arena into named regions.

use crate::{ScratchError, LANE_BYTES};
use std::fmt;
use std::ops::Range;

/// A named region of a scratch arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// A tile of pipeline stage `n`.
    A(usize),
    /// B tile of pipeline stage `n`.
    B(usize),
    /// C staging for the shuffled epilogue. Overlaps the stages.
    C,
    /// Input tile of a row reduction.
    Tile,
    /// Per-worker partial results of a row reduction.
    Partials,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::A(s) => write!(f, "A{s}"),
            Region::B(s) => write!(f, "B{s}"),
            Region::C => f.write_str("C"),
            Region::Tile => f.write_str("tile"),
            Region::Partials => f.write_str("partials"),
        }
    }
}

/// The A and B tiles of one pipeline stage.
#[derive(Debug)]
pub struct StageMut<'a> {
    pub a: &'a mut [f32],
    pub b: &'a mut [f32],
}

/// Lane ranges of every region in one arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    regions: Vec<(Region, Range<usize>)>,
    a_lanes: usize,
    b_lanes: usize,
    b_offset: usize,
    stage_stride: usize,
    stages: usize,
    total_lanes: usize,
}

impl ScratchLayout {
    /// Layout of a pipelined GEMM: `stages` copies of an A tile and a B tile
    /// back to back, and a C staging region over the start of the arena.
    ///
    /// Tiles start on `align`-lane boundaries. The arena holds
    /// `max(stages · (a + b), c)` lanes.
    pub fn gemm(a_lanes: usize, b_lanes: usize, c_lanes: usize, stages: usize, align: usize) -> Self {
        debug_assert!(matches!(stages, 1 | 2), "pipelines use one or two stages");
        let align = align.max(1);
        let a_pad = a_lanes.next_multiple_of(align);
        let b_pad = b_lanes.next_multiple_of(align);
        let stride = a_pad + b_pad;

        let mut regions = Vec::with_capacity(2 * stages + 1);
        for s in 0..stages {
            let base = s * stride;
            regions.push((Region::A(s), base..base + a_lanes));
            regions.push((Region::B(s), base + a_pad..base + a_pad + b_lanes));
        }
        if c_lanes > 0 {
            regions.push((Region::C, 0..c_lanes));
        }

        Self {
            regions,
            a_lanes,
            b_lanes,
            b_offset: a_pad,
            stage_stride: stride,
            stages,
            total_lanes: (stages * stride).max(c_lanes),
        }
    }

    /// Layout of a row reduction: the input tile, then the partials.
    pub fn reduction(tile_lanes: usize, partial_lanes: usize) -> Self {
        Self {
            regions: vec![
                (Region::Tile, 0..tile_lanes),
                (Region::Partials, tile_lanes..tile_lanes + partial_lanes),
            ],
            a_lanes: 0,
            b_lanes: 0,
            b_offset: 0,
            stage_stride: 0,
            stages: 0,
            total_lanes: tile_lanes + partial_lanes,
        }
    }

    /// Lane range of a region, if the layout has it.
    pub fn region(&self, r: Region) -> Option<Range<usize>> {
        self.regions
            .iter()
            .find(|(name, _)| *name == r)
            .map(|(_, range)| range.clone())
    }

    /// All regions in layout order.
    pub fn regions(&self) -> impl Iterator<Item = (Region, Range<usize>)> + '_ {
        self.regions.iter().cloned()
    }

    /// `true` if two regions share at least one lane.
    pub fn overlaps(&self, r1: Region, r2: Region) -> bool {
        match (self.region(r1), self.region(r2)) {
            (Some(x), Some(y)) => x.start < y.end && y.start < x.end,
            _ => false,
        }
    }

    /// Number of pipeline stages.
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Lanes the arena needs.
    pub fn total_lanes(&self) -> usize {
        self.total_lanes
    }

    /// Bytes the arena needs.
    pub fn bytes(&self) -> usize {
        self.total_lanes * LANE_BYTES
    }

    /// Splits an arena into the A/B tiles of stage 0 and, for a two-stage
    /// layout, stage 1. The stages are disjoint borrows of `buf`.
    pub fn split_stages<'a>(
        &self,
        buf: &'a mut [f32],
    ) -> Result<(StageMut<'a>, Option<StageMut<'a>>), ScratchError> {
        let required = self.stages * self.stage_stride;
        if self.stages == 0 || buf.len() < required {
            return Err(ScratchError::BufferTooSmall {
                required: required.max(1),
                actual: buf.len(),
            });
        }
        let (first, rest) = buf.split_at_mut(self.stage_stride);
        let even = self.split_stage(first);
        let odd = if self.stages == 2 {
            Some(self.split_stage(&mut rest[..self.stage_stride]))
        } else {
            None
        };
        Ok((even, odd))
    }

    fn split_stage<'a>(&self, stage: &'a mut [f32]) -> StageMut<'a> {
        let (a, b) = stage.split_at_mut(self.b_offset);
        StageMut {
            a: &mut a[..self.a_lanes],
            b: &mut b[..self.b_lanes],
        }
    }

    /// The C staging region of an arena.
    pub fn c_region<'a>(&self, buf: &'a mut [f32]) -> Result<&'a mut [f32], ScratchError> {
        let range = self.region(Region::C).unwrap_or(0..0);
        if buf.len() < range.end {
            return Err(ScratchError::BufferTooSmall {
                required: range.end,
                actual: buf.len(),
            });
        }
        Ok(&mut buf[range])
    }

    /// The tile and partials regions of a reduction arena.
    pub fn split_reduction<'a>(
        &self,
        buf: &'a mut [f32],
    ) -> Result<(&'a mut [f32], &'a mut [f32]), ScratchError> {
        let tile = self.region(Region::Tile).unwrap_or(0..0);
        let partials = self.region(Region::Partials).unwrap_or(0..0);
        if buf.len() < partials.end.max(tile.end) {
            return Err(ScratchError::BufferTooSmall {
                required: partials.end.max(tile.end),
                actual: buf.len(),
            });
        }
        let (t, p) = buf.split_at_mut(tile.end);
        Ok((t, &mut p[..partials.len()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_buffer_regions() {
        let l = ScratchLayout::gemm(100, 60, 0, 2, 4);
        assert_eq!(l.region(Region::A(0)), Some(0..100));
        assert_eq!(l.region(Region::B(0)), Some(100..160));
        assert_eq!(l.region(Region::A(1)), Some(160..260));
        assert_eq!(l.region(Region::B(1)), Some(260..320));
        assert_eq!(l.total_lanes(), 320);
        assert_eq!(l.region(Region::C), None);
    }

    #[test]
    fn test_alignment_pads_tiles() {
        let l = ScratchLayout::gemm(6, 6, 0, 2, 4);
        assert_eq!(l.region(Region::B(0)), Some(8..14));
        assert_eq!(l.region(Region::A(1)), Some(16..22));
        assert_eq!(l.total_lanes(), 32);
    }

    #[test]
    fn test_c_staging_overlaps_stages() {
        let l = ScratchLayout::gemm(64, 64, 512, 2, 4);
        assert_eq!(l.total_lanes(), 512);
        assert_eq!(l.bytes(), 2048);
        assert!(l.overlaps(Region::C, Region::A(0)));
        assert!(l.overlaps(Region::C, Region::B(1)));
        assert!(!l.overlaps(Region::A(0), Region::B(0)));
        assert!(!l.overlaps(Region::A(0), Region::A(1)));
    }

    #[test]
    fn test_split_stages_are_disjoint() {
        let l = ScratchLayout::gemm(6, 5, 0, 2, 4);
        let mut buf = vec![0.0f32; l.total_lanes()];
        {
            let (even, odd) = l.split_stages(&mut buf).unwrap();
            let odd = odd.unwrap();
            assert_eq!((even.a.len(), even.b.len()), (6, 5));
            even.a.fill(1.0);
            even.b.fill(2.0);
            odd.a.fill(3.0);
            odd.b.fill(4.0);
        }
        for (r, v) in [(Region::A(0), 1.0), (Region::B(0), 2.0), (Region::A(1), 3.0), (Region::B(1), 4.0)] {
            let range = l.region(r).unwrap();
            assert!(buf[range].iter().all(|&x| x == v), "{r}");
        }
        // Alignment gaps are untouched.
        assert_eq!(buf[6], 0.0);
        assert_eq!(buf[13], 0.0);
    }

    #[test]
    fn test_single_stage() {
        let l = ScratchLayout::gemm(8, 8, 0, 1, 4);
        let mut buf = vec![0.0f32; l.total_lanes()];
        let (_, odd) = l.split_stages(&mut buf).unwrap();
        assert!(odd.is_none());
    }

    #[test]
    fn test_buffer_too_small() {
        let l = ScratchLayout::gemm(8, 8, 0, 2, 4);
        let mut buf = vec![0.0f32; 16];
        assert!(matches!(
            l.split_stages(&mut buf),
            Err(ScratchError::BufferTooSmall { required: 32, actual: 16 })
        ));
    }

    #[test]
    fn test_reduction_layout() {
        let l = ScratchLayout::reduction(64, 8);
        let mut buf = vec![0.0f32; l.total_lanes()];
        let (tile, partials) = l.split_reduction(&mut buf).unwrap();
        assert_eq!((tile.len(), partials.len()), (64, 8));
        assert!(!l.overlaps(Region::Tile, Region::Partials));
        assert!(ScratchLayout::reduction(4, 4).split_stages(&mut [0.0; 8]).is_err());
    }
}
