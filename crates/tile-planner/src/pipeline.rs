// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Main-loop shapes of the pipelined reduction.
//!
//! With `n = ceil(R / r)` reduction tiles, the double-buffered loop is
//!
//! ```text
//! prologue:     read(0); write(even)
//! main loop:    repeat (n - 1) / 2 times:
//!                 move; barrier; read; gemm(even); write(odd)
//!                 move; barrier; read; gemm(odd);  write(even)
//! double tail:  move; barrier; read; gemm(even); write(odd); barrier; gemm(odd)
//! single tail:  barrier; gemm(even)
//! ```
//!
//! and the flags that select one of the four specializations are
//! `has_main_loop = (n + 1) / 2 > 1` and `has_double_tail = n % 2 == 0`.

use std::fmt;

/// Which main loop a launch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Two scratch stages; loads of tile `i + 1` overlap compute on tile `i`.
    #[default]
    DoubleBuffer,
    /// One scratch stage; the next tile is prefetched into registers.
    SingleBuffer,
    /// No overlap: load, barrier, compute, barrier for every tile.
    Serial,
}

impl PipelineKind {
    /// Number of A/B scratch stages.
    pub fn num_stages(self) -> usize {
        match self {
            PipelineKind::DoubleBuffer => 2,
            PipelineKind::SingleBuffer | PipelineKind::Serial => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::DoubleBuffer => "double-buffer",
            PipelineKind::SingleBuffer => "single-buffer",
            PipelineKind::Serial => "serial",
        }
    }

    /// Parses the kebab-case name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "double-buffer" => Some(PipelineKind::DoubleBuffer),
            "single-buffer" => Some(PipelineKind::SingleBuffer),
            "serial" => Some(PipelineKind::Serial),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loop-shape flags and trip counts for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LoopShape {
    pub pipeline: PipelineKind,
    /// Reduction tiles per group, `ceil(R / r)`.
    pub num_tiles: usize,
    pub has_main_loop: bool,
    pub has_double_tail: bool,
    /// Iterations of the main loop. Each double-buffer iteration consumes
    /// two tiles; each single-buffer iteration consumes one.
    pub main_loop_iterations: usize,
}

impl LoopShape {
    /// Loop shape for a reduction of `reduction_len` elements walked
    /// `per_tile` at a time.
    pub fn new(pipeline: PipelineKind, reduction_len: usize, per_tile: usize) -> Self {
        let n = reduction_len.div_ceil(per_tile.max(1));
        match pipeline {
            PipelineKind::DoubleBuffer => Self {
                pipeline,
                num_tiles: n,
                has_main_loop: (n + 1) / 2 > 1,
                has_double_tail: n % 2 == 0,
                main_loop_iterations: n.saturating_sub(1) / 2,
            },
            PipelineKind::SingleBuffer => Self {
                pipeline,
                num_tiles: n,
                has_main_loop: n > 1,
                has_double_tail: false,
                main_loop_iterations: n.saturating_sub(1),
            },
            PipelineKind::Serial => Self {
                pipeline,
                num_tiles: n,
                has_main_loop: n > 0,
                has_double_tail: false,
                main_loop_iterations: n,
            },
        }
    }

    /// Barriers one group executes before its epilogue.
    pub fn barriers_per_group(&self) -> usize {
        match self.pipeline {
            PipelineKind::DoubleBuffer => {
                let tail = if self.has_double_tail { 2 } else { 1 };
                2 * self.main_loop_iterations + tail
            }
            PipelineKind::SingleBuffer => 2 * self.main_loop_iterations + 1,
            PipelineKind::Serial => 2 * self.num_tiles,
        }
    }
}

impl fmt::Display for LoopShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} over {} tiles (main loop: {}, double tail: {}, iterations: {})",
            self.pipeline,
            self.num_tiles,
            self.has_main_loop,
            self.has_double_tail,
            self.main_loop_iterations
        )
    }
}
