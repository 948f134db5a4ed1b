// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tile configuration: block tile, per-worker tile, and the thread cluster
//! used by the cooperative movers.

use crate::{PipelineKind, PlanError};
use scratch_memory::ScratchLayout;

/// Shape parameters of one kernel configuration.
///
/// A work-group computes an `m_per_block × n_per_block` tile of C, walking
/// the reduction dimension `k0_per_block · k1` elements at a time. Its
/// `block_size` workers are laid out twice:
///
/// - as a thread cluster over the `[1, K0, M, K1]` copy slice of each
///   operand (`a_cluster`, `b_cluster`), for the movers;
/// - as an `(m_per_block / m_per_thread) × (n_per_block / n_per_thread)`
///   grid, for the compute unit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileConfig {
    pub block_size: usize,
    pub m_per_block: usize,
    pub n_per_block: usize,
    pub k0_per_block: usize,
    /// Innermost reduction length, contiguous in scratch.
    pub k1: usize,
    pub m_per_thread: usize,
    pub n_per_thread: usize,
    /// Thread cluster lengths over `[KBatch, K0, M, K1]` for the A mover.
    pub a_cluster: [usize; 4],
    /// Thread cluster lengths over `[KBatch, K0, N, K1]` for the B mover.
    pub b_cluster: [usize; 4],
    /// Slice dimension the A mover vectorizes along (2 = M, 3 = K1).
    #[serde(default = "default_vector_dim")]
    pub a_vector_dim: usize,
    /// Slice dimension the B mover vectorizes along (2 = N, 3 = K1).
    #[serde(default = "default_vector_dim")]
    pub b_vector_dim: usize,
    /// Elements per global transaction for the movers.
    pub vector_width: usize,
    /// Elements per global transaction for the shuffled epilogue.
    #[serde(default = "default_c_vector_width")]
    pub c_vector_width: usize,
    /// Extra lanes appended to each M row of the A scratch tile.
    #[serde(default)]
    pub scratch_extra_m: usize,
    /// Extra lanes appended to each N row of the B scratch tile.
    #[serde(default)]
    pub scratch_extra_n: usize,
}

fn default_vector_dim() -> usize {
    3
}

fn default_c_vector_width() -> usize {
    4
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            m_per_block: 64,
            n_per_block: 64,
            k0_per_block: 4,
            k1: 4,
            m_per_thread: 8,
            n_per_thread: 8,
            a_cluster: [1, 4, 16, 1],
            b_cluster: [1, 4, 16, 1],
            a_vector_dim: 3,
            b_vector_dim: 3,
            vector_width: 4,
            c_vector_width: 4,
            scratch_extra_m: 0,
            scratch_extra_n: 0,
        }
    }
}

impl TileConfig {
    /// Names accepted by [`TileConfig::preset`].
    pub const PRESETS: [&'static str; 3] = ["default", "small", "large"];

    /// A named configuration.
    ///
    /// | preset | workers | block tile | K per tile |
    /// |---|---|---|---|
    /// | `small` | 16 | 16×16 | 8 |
    /// | `default` | 64 | 64×64 | 16 |
    /// | `large` | 256 | 128×128 | 16 |
    pub fn preset(name: &str) -> Result<Self, PlanError> {
        match name {
            "default" => Ok(Self::default()),
            "small" => Ok(Self {
                block_size: 16,
                m_per_block: 16,
                n_per_block: 16,
                k0_per_block: 2,
                k1: 4,
                m_per_thread: 4,
                n_per_thread: 4,
                a_cluster: [1, 2, 8, 1],
                b_cluster: [1, 2, 8, 1],
                ..Self::default()
            }),
            "large" => Ok(Self {
                block_size: 256,
                m_per_block: 128,
                n_per_block: 128,
                a_cluster: [1, 4, 64, 1],
                b_cluster: [1, 4, 64, 1],
                ..Self::default()
            }),
            other => Err(PlanError::UnknownName {
                kind: "tile preset",
                name: other.to_string(),
            }),
        }
    }

    /// Reduction elements consumed per pipeline step (`r`).
    pub fn k_per_block(&self) -> usize {
        self.k0_per_block * self.k1
    }

    pub fn summary(&self) -> String {
        format!(
            "{} workers, {}×{}×{} block tile, {}×{} per thread, vector width {}",
            self.block_size,
            self.m_per_block,
            self.n_per_block,
            self.k_per_block(),
            self.m_per_thread,
            self.n_per_thread,
            self.vector_width,
        )
    }

    /// Copy slice of the A mover: `[1, K0, M, K1]`.
    pub fn a_slice(&self) -> [usize; 4] {
        [1, self.k0_per_block, self.m_per_block, self.k1]
    }

    /// Copy slice of the B mover: `[1, K0, N, K1]`.
    pub fn b_slice(&self) -> [usize; 4] {
        [1, self.k0_per_block, self.n_per_block, self.k1]
    }

    /// Workers along M and N in the compute grid.
    pub fn compute_grid(&self) -> (usize, usize) {
        (
            self.m_per_block / self.m_per_thread.max(1),
            self.n_per_block / self.n_per_thread.max(1),
        )
    }

    /// Lanes of one A scratch tile, including the M padding.
    pub fn a_tile_lanes(&self) -> usize {
        self.k0_per_block * (self.m_per_block + self.scratch_extra_m) * self.k1
    }

    /// Lanes of one B scratch tile, including the N padding.
    pub fn b_tile_lanes(&self) -> usize {
        self.k0_per_block * (self.n_per_block + self.scratch_extra_n) * self.k1
    }

    /// Lanes of the C staging tile.
    pub fn c_tile_lanes(&self) -> usize {
        self.m_per_block * self.n_per_block
    }

    /// Scratch layout of a group running `pipeline`.
    pub fn scratch_layout(&self, pipeline: PipelineKind, c_shuffle: bool) -> ScratchLayout {
        let c = if c_shuffle { self.c_tile_lanes() } else { 0 };
        ScratchLayout::gemm(
            self.a_tile_lanes(),
            self.b_tile_lanes(),
            c,
            pipeline.num_stages(),
            self.vector_width,
        )
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), PlanError> {
        let fields = [
            ("block_size", self.block_size),
            ("m_per_block", self.m_per_block),
            ("n_per_block", self.n_per_block),
            ("k0_per_block", self.k0_per_block),
            ("k1", self.k1),
            ("m_per_thread", self.m_per_thread),
            ("n_per_thread", self.n_per_thread),
            ("vector_width", self.vector_width),
            ("c_vector_width", self.c_vector_width),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(invalid(format!("{name} must be non-zero")));
        }

        if self.m_per_block % self.m_per_thread != 0 || self.n_per_block % self.n_per_thread != 0 {
            return Err(invalid(format!(
                "per-thread tile {}×{} does not divide block tile {}×{}",
                self.m_per_thread, self.n_per_thread, self.m_per_block, self.n_per_block
            )));
        }
        let (gm, gn) = self.compute_grid();
        if gm * gn != self.block_size {
            return Err(invalid(format!(
                "compute grid {gm}×{gn} does not match block size {}",
                self.block_size
            )));
        }

        for (operand, cluster, slice, vector_dim) in [
            ("A", self.a_cluster, self.a_slice(), self.a_vector_dim),
            ("B", self.b_cluster, self.b_slice(), self.b_vector_dim),
        ] {
            self.validate_cluster(operand, cluster, slice, vector_dim)?;
        }

        if self.n_per_block % self.c_vector_width != 0 {
            return Err(invalid(format!(
                "c_vector_width {} does not divide n_per_block {}",
                self.c_vector_width, self.n_per_block
            )));
        }
        Ok(())
    }

    fn validate_cluster(
        &self,
        operand: &str,
        cluster: [usize; 4],
        slice: [usize; 4],
        vector_dim: usize,
    ) -> Result<(), PlanError> {
        if cluster[0] != 1 {
            return Err(invalid(format!("{operand} cluster must be 1 along KBatch")));
        }
        if cluster.contains(&0) || cluster.iter().product::<usize>() != self.block_size {
            return Err(invalid(format!(
                "{operand} cluster {cluster:?} does not cover block size {}",
                self.block_size
            )));
        }
        if slice.iter().zip(&cluster).any(|(&s, &c)| s % c != 0) {
            return Err(invalid(format!(
                "{operand} cluster {cluster:?} does not divide slice {slice:?}"
            )));
        }
        if !matches!(vector_dim, 2 | 3) {
            return Err(invalid(format!(
                "{operand} vector dimension must be 2 or 3, got {vector_dim}"
            )));
        }
        let per_thread = slice[vector_dim] / cluster[vector_dim];
        if per_thread % self.vector_width != 0 {
            return Err(invalid(format!(
                "{operand} vector width {} does not divide per-thread length {per_thread}",
                self.vector_width
            )));
        }
        Ok(())
    }
}

fn invalid(detail: String) -> PlanError {
    PlanError::InvalidTileConfig(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for name in TileConfig::PRESETS {
            let t = TileConfig::preset(name).unwrap();
            t.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(
            TileConfig::preset("huge"),
            Err(PlanError::UnknownName { .. })
        ));
    }

    #[test]
    fn test_k_per_block() {
        assert_eq!(TileConfig::default().k_per_block(), 16);
        assert_eq!(TileConfig::preset("small").unwrap().k_per_block(), 8);
    }

    #[test]
    fn test_cluster_must_cover_block() {
        let t = TileConfig {
            a_cluster: [1, 4, 8, 1],
            ..TileConfig::default()
        };
        assert!(matches!(t.validate(), Err(PlanError::InvalidTileConfig(_))));
    }

    #[test]
    fn test_compute_grid_must_match_block() {
        let t = TileConfig {
            m_per_thread: 4,
            ..TileConfig::default()
        };
        let err = t.validate().unwrap_err().to_string();
        assert!(err.contains("compute grid"), "{err}");
    }

    #[test]
    fn test_vector_width_must_divide() {
        let t = TileConfig {
            vector_width: 8,
            ..TileConfig::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_vectorize_along_m() {
        // Per-thread M length is 64 / 16 = 4.
        let t = TileConfig {
            a_vector_dim: 2,
            ..TileConfig::default()
        };
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_scratch_layout_sizes() {
        let t = TileConfig::default();
        let double = t.scratch_layout(PipelineKind::DoubleBuffer, false);
        assert_eq!(double.total_lanes(), 2 * (1024 + 1024));
        let single = t.scratch_layout(PipelineKind::SingleBuffer, true);
        assert_eq!(single.total_lanes(), 4096);
        assert_eq!(single.bytes(), 16 * 1024);
    }

    #[test]
    fn test_extra_padding_grows_tiles() {
        let t = TileConfig {
            scratch_extra_m: 4,
            ..TileConfig::default()
        };
        assert_eq!(t.a_tile_lanes(), 4 * 68 * 4);
        assert_eq!(t.b_tile_lanes(), 4 * 64 * 4);
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{
            "block_size": 16, "m_per_block": 16, "n_per_block": 16,
            "k0_per_block": 2, "k1": 4, "m_per_thread": 4, "n_per_thread": 4,
            "a_cluster": [1, 2, 8, 1], "b_cluster": [1, 2, 8, 1], "vector_width": 4
        }"#;
        let t: TileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(t, TileConfig::preset("small").unwrap());
    }
}
