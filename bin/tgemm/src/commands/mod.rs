// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod inspect;
pub mod run;
pub mod status;
pub mod sweep;
mod workload;

use anyhow::Context;
use gemm_engine::EngineConfig;
use problem_ir::{GemmProblem, Problem, ProblemEntry, ProblemManifest};
use std::path::{Path, PathBuf};
use tensor_core::DType;
use tracing_subscriber::EnvFilter;

/// Installs the `fmt` subscriber. `RUST_LOG` wins over the `-v` count.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .init();
}

/// Loads the engine configuration, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Resolves the problems a command works on: the manifest (optionally one
/// named entry of it) or a single inline GEMM, which takes its
/// specialization and split-K factor from the configuration.
pub fn select_problems(
    config: &EngineConfig,
    manifest: Option<PathBuf>,
    problem: Option<String>,
    gemm: Option<String>,
    dtype: &str,
) -> anyhow::Result<Vec<ProblemEntry>> {
    if let Some(dims) = gemm {
        let (m, n, k) = parse_gemm_dims(&dims)?;
        let dtype = DType::parse(dtype)
            .ok_or_else(|| anyhow::anyhow!("unknown dtype '{dtype}'; expected f32, f16 or bf16"))?;
        let problem = GemmProblem::new(m, n, k).with_dtype(dtype);
        let entry = ProblemEntry {
            specialization: config.specialization,
            k_batch: config.k_batch,
            ..ProblemEntry::new(format!("gemm-{m}x{n}x{k}"), Problem::Gemm(problem))
        };
        return Ok(vec![entry]);
    }

    let path = manifest.ok_or_else(|| anyhow::anyhow!("either --manifest or --gemm is required"))?;
    let manifest = ProblemManifest::from_file(&path)
        .with_context(|| format!("failed to load manifest '{}'", path.display()))?;
    manifest.validate()?;

    tracing::debug!(
        "manifest '{}': {} problems, {:.3} GFLOP",
        manifest.name,
        manifest.problems.len(),
        manifest.total_flops() as f64 / 1e9
    );
    match problem {
        Some(name) => {
            let entry = manifest.get(&name).ok_or_else(|| {
                anyhow::anyhow!("manifest '{}' has no problem named '{name}'", manifest.name)
            })?;
            Ok(vec![entry.clone()])
        }
        None => Ok(manifest.problems),
    }
}

/// Parses `MxNxK`.
fn parse_gemm_dims(s: &str) -> anyhow::Result<(usize, usize, usize)> {
    let dims: Vec<usize> = s
        .split(['x', 'X'])
        .map(|d| d.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow::anyhow!("invalid GEMM size '{s}': {e}"))?;
    match dims[..] {
        [m, n, k] => Ok((m, n, k)),
        _ => anyhow::bail!("invalid GEMM size '{s}': expected MxNxK"),
    }
}

/// Creates a visual usage bar (0.0-1.0 scale).
fn usage_bar(ratio: f64) -> String {
    let filled = (ratio * 20.0).round().clamp(0.0, 20.0) as usize;
    let symbol = if ratio >= 0.9 {
        "#"
    } else if ratio >= 0.7 {
        "="
    } else {
        "-"
    };
    format!("[{}{}]", symbol.repeat(filled), ".".repeat(20 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gemm_dims() {
        assert_eq!(parse_gemm_dims("64x32x16").unwrap(), (64, 32, 16));
        assert_eq!(parse_gemm_dims("8X8X8").unwrap(), (8, 8, 8));
        assert!(parse_gemm_dims("64x32").is_err());
        assert!(parse_gemm_dims("64xax16").is_err());
    }

    #[test]
    fn test_inline_gemm_selection() {
        let config = EngineConfig {
            k_batch: 2,
            ..EngineConfig::default()
        };
        let entries = select_problems(&config, None, None, Some("16x8x4".into()), "f16").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "gemm-16x8x4");
        assert_eq!(entries[0].problem.dtype(), DType::F16);
        assert_eq!(entries[0].k_batch, 2);
        assert!(select_problems(&config, None, None, Some("16x8x4".into()), "f64").is_err());
        assert!(select_problems(&config, None, None, None, "f32").is_err());
    }

    #[test]
    fn test_usage_bar() {
        assert_eq!(usage_bar(0.0), format!("[{}]", ".".repeat(20)));
        assert_eq!(usage_bar(1.0), format!("[{}]", "#".repeat(20)));
        assert!(usage_bar(0.5).starts_with("[----------."));
    }
}
