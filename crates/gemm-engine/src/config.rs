// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Engine configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! tile_preset = "default"
//! tile_order = "grouped-raster:4"
//! backend = "fragment"
//! pipeline = "double-buffer"
//! c_shuffle = true
//! specialization = "mnk-padding"
//! k_batch = 1
//! num_threads = 4
//! scratch_budget = "64K"
//! validate_scratch = false
//! ```
//!
//! An explicit `[tile]` table replaces the preset.

use crate::softmax::SoftmaxConfig;
use crate::EngineError;
use problem_ir::GemmSpecialization;
use scratch_memory::ScratchBudget;
use std::fmt;
use std::path::Path;
use tile_planner::{PipelineKind, TileConfig, TileGrid, TileOrder, TileOrderKind};

/// Which matrix multiply-accumulate unit the compute stage uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// One multiply-add per element, in program order.
    Scalar,
    /// 4×4 fused multiply-add fragments.
    #[default]
    Fragment,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Fragment => "fragment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scalar" => Some(Backend::Scalar),
            "fragment" | "fma" => Some(Backend::Fragment),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the GEMM engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Tile preset name: `"small"`, `"default"` or `"large"`. Ignored when
    /// `tile` is set.
    #[serde(default = "default_preset")]
    pub tile_preset: String,
    /// Tile order: `"row-major"`, `"clustered:M01xN01"` or
    /// `"grouped-raster:ROWS"`.
    #[serde(default = "default_tile_order")]
    pub tile_order: String,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub pipeline: PipelineKind,
    /// Stage C through scratch before the global writes.
    #[serde(default)]
    pub c_shuffle: bool,
    /// Specialization for problems planned without a manifest entry.
    #[serde(default)]
    pub specialization: GemmSpecialization,
    /// Split-K factor for problems planned without a manifest entry.
    #[serde(default = "default_k_batch")]
    pub k_batch: usize,
    /// Number of worker threads (defaults to the device's compute units).
    pub num_threads: Option<usize>,
    /// Per-group scratch budget (human-readable, e.g. `"64K"`).
    #[serde(default = "default_budget")]
    pub scratch_budget: String,
    /// Record every scratch access and report barrier-discipline
    /// violations in the launch metrics.
    #[serde(default)]
    pub validate_scratch: bool,
    /// Explicit tile configuration.
    #[serde(default)]
    pub tile: Option<TileConfig>,
    #[serde(default)]
    pub softmax: SoftmaxConfig,
}

fn default_preset() -> String {
    "default".to_string()
}

fn default_tile_order() -> String {
    TileOrderKind::default().to_string()
}

fn default_k_batch() -> usize {
    1
}

fn default_budget() -> String {
    "64K".to_string()
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str)
            .map_err(|e| EngineError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, EngineError> {
        toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Parses the scratch budget string into a [`ScratchBudget`].
    pub fn parse_budget(&self) -> Result<ScratchBudget, EngineError> {
        ScratchBudget::parse(&self.scratch_budget)
            .map_err(|e| EngineError::ConfigError(format!("invalid scratch budget: {e}")))
    }

    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(|| device_info::device_props().compute_units)
            .max(1)
    }

    /// The tile configuration: the explicit `tile` table, or the preset.
    pub fn tile_config(&self) -> Result<TileConfig, EngineError> {
        let tile = match &self.tile {
            Some(tile) => tile.clone(),
            None => TileConfig::preset(&self.tile_preset)
                .map_err(|e| EngineError::ConfigError(e.to_string()))?,
        };
        tile.validate()?;
        Ok(tile)
    }

    /// Parses the tile order name.
    pub fn tile_order_kind(&self) -> Result<TileOrderKind, EngineError> {
        TileOrderKind::parse(&self.tile_order).map_err(|e| {
            EngineError::ConfigError(format!(
                "{e}; expected 'row-major', 'clustered:M01xN01' or 'grouped-raster:ROWS'"
            ))
        })
    }

    /// Creates the tile order for a launch grid.
    pub fn create_tile_order(&self, grid: TileGrid) -> Result<Box<dyn TileOrder>, EngineError> {
        Ok(self.tile_order_kind()?.build(grid)?)
    }

    /// Checks every field that can be checked without a problem.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.tile_config()?;
        self.tile_order_kind()?;
        self.parse_budget()?;
        self.softmax.validate()?;
        if self.k_batch == 0 {
            return Err(EngineError::ConfigError("k_batch must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_preset: default_preset(),
            tile_order: default_tile_order(),
            backend: Backend::default(),
            pipeline: PipelineKind::default(),
            c_shuffle: false,
            specialization: GemmSpecialization::Default,
            k_batch: 1,
            num_threads: None,
            scratch_budget: default_budget(),
            validate_scratch: false,
            tile: None,
            softmax: SoftmaxConfig::default(),
        }
    }
}
