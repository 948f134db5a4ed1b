// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tgemm inspect` command: display lowering and launch plans.
//!
//! Loads a problem manifest and prints, per problem, the lowered grid
//! descriptors and the launch plan under the configured tile, followed by
//! a per-preset feasibility table.

use gemm_engine::{EngineConfig, GemmEngine, KernelPlan};
use problem_ir::{ProblemEntry, ProblemManifest};
use std::path::PathBuf;
use tile_planner::TileConfig;

pub fn execute(config: EngineConfig, manifest: PathBuf) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               tgemm · Problem Inspector              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let manifest = ProblemManifest::from_file(&manifest).map_err(|e| {
        anyhow::anyhow!("failed to load manifest from '{}': {e}", manifest.display())
    })?;
    manifest.validate()?;

    // ── Summary ────────────────────────────────────────────────
    println!("  Manifest: {}", manifest.name);
    println!("  Problems: {}", manifest.problems.len());
    println!("  Total:    {:.3} GFLOP", manifest.total_flops() as f64 / 1e9);
    println!();

    println!(
        "  {:<20} {:<11} {:<5} {:>10} {:>8} {:<16}",
        "Name", "Op", "Type", "MFLOP", "K-batch", "Epilogue",
    );
    println!("  {}", "-".repeat(76));
    for entry in &manifest.problems {
        println!(
            "  {:<20} {:<11} {:<5} {:>10.2} {:>8} {:<16}",
            truncate(&entry.name, 20),
            entry.problem.op_name(),
            entry.problem.dtype().as_str(),
            entry.problem.flops() as f64 / 1e6,
            entry.k_batch,
            entry.epilogue.to_string(),
        );
    }
    println!();

    // ── Per-Problem Plans ──────────────────────────────────────
    for entry in &manifest.problems {
        println!("  {}", entry.summary());
        match GemmEngine::new(config.clone())?.plan(entry) {
            Ok(planned) => match planned.kernel() {
                KernelPlan::Gemm(launch) => {
                    println!("   Lowered:  {}", launch.descs.summary());
                    println!("   Plan:     {}", launch.plan.summary());
                    println!("   Barriers: {} (excluding epilogue)", launch.plan.total_barriers());
                    println!("   Writes:   {:?}", launch.write_policy());
                }
                KernelPlan::Softmax { .. } => {
                    let softmax = &config.softmax;
                    println!(
                        "   Plan:     {} workers/row, {} rows/group, {} columns per tile",
                        softmax.workers_per_row(),
                        softmax.rows_per_group,
                        softmax.k_per_tile,
                    );
                }
            },
            Err(e) => println!("   NOT PLANNABLE: {e}"),
        }
        println!("   Presets:  {}", preset_feasibility(&config, entry));
        println!();
    }

    Ok(())
}

/// One `preset: groups / scratch` cell per tile preset; `-` marks presets
/// that cannot run the problem.
fn preset_feasibility(config: &EngineConfig, entry: &ProblemEntry) -> String {
    TileConfig::PRESETS
        .iter()
        .map(|&preset| {
            let candidate = EngineConfig {
                tile_preset: preset.to_string(),
                tile: None,
                ..config.clone()
            };
            let planned = GemmEngine::new(candidate).and_then(|e| e.plan(entry));
            match planned.as_ref().map(|p| p.kernel()) {
                Ok(KernelPlan::Gemm(launch)) => format!(
                    "{preset}: {} groups / {} B",
                    launch.plan.grid_size,
                    launch.plan.scratch_bytes(),
                ),
                Ok(KernelPlan::Softmax { .. }) => format!("{preset}: ok"),
                Err(_) => format!("{preset}: -"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncates a string to `max` characters, appending "..." if needed.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use problem_ir::{GemmProblem, GemmSpecialization, Problem};

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("fc", 20), "fc");
        assert_eq!(truncate("encoder.layer.0.attention", 10), "encoder...");
    }

    #[test]
    fn test_preset_feasibility() {
        let entry = ProblemEntry::new("fc", Problem::Gemm(GemmProblem::new(16, 16, 8)));
        let cells = preset_feasibility(&EngineConfig::default(), &entry);
        assert!(cells.contains("small: 1 groups"));
        assert!(cells.contains("default: -"));

        let padded = ProblemEntry {
            specialization: GemmSpecialization::MnkPadding,
            ..entry
        };
        let cells = preset_feasibility(&EngineConfig::default(), &padded);
        assert!(cells.contains("default: 1 groups"));
    }
}
