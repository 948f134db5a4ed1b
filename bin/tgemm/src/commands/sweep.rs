// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tgemm sweep` command: time pipelines, backends and tile presets.
//!
//! Every combination is planned and launched on the same operands; the
//! fastest of `repeats` timed launches is reported next to the barrier and
//! traffic counters, which do not vary between runs.

use super::workload::Workload;
use gemm_engine::{Backend, EngineConfig, GemmEngine, LaunchMetrics};
use half::{bf16, f16};
use problem_ir::{Problem, ProblemEntry};
use tensor_core::{DType, Element};
use tile_planner::PipelineKind;

pub fn execute(
    config: EngineConfig,
    entries: Vec<ProblemEntry>,
    pipelines: &str,
    backends: &str,
    presets: &str,
    repeats: usize,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                 tgemm · Pipeline Sweep               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let pipelines: Vec<PipelineKind> = split_list(pipelines)
        .map(|s| PipelineKind::parse(s).ok_or_else(|| anyhow::anyhow!("unknown pipeline '{s}'")))
        .collect::<Result<_, _>>()?;
    let backends: Vec<Backend> = split_list(backends)
        .map(|s| Backend::parse(s).ok_or_else(|| anyhow::anyhow!("unknown backend '{s}'")))
        .collect::<Result<_, _>>()?;
    let presets: Vec<&str> = split_list(presets).collect();
    let repeats = repeats.max(1);

    println!("  Pipelines: {pipelines:?}");
    println!("  Backends:  {backends:?}");
    println!("  Presets:   {presets:?}");
    println!("  Repeats:   {repeats}");
    println!();

    for entry in &entries {
        if matches!(entry.problem, Problem::Softmax(_)) {
            println!("  {}: softmax has no pipeline or backend choice, skipped.", entry.name);
            println!();
            continue;
        }
        println!("  {}", entry.summary());
        println!();
        let axes = Axes {
            pipelines: &pipelines,
            backends: &backends,
            presets: &presets,
            repeats,
        };
        match entry.problem.dtype() {
            DType::F32 => sweep_entry::<f32>(&config, entry, &axes),
            DType::F16 => sweep_entry::<f16>(&config, entry, &axes),
            DType::BF16 => sweep_entry::<bf16>(&config, entry, &axes),
        }
    }

    Ok(())
}

/// The swept combinations.
struct Axes<'a> {
    pipelines: &'a [PipelineKind],
    backends: &'a [Backend],
    presets: &'a [&'a str],
    repeats: usize,
}

fn sweep_entry<T: Element>(config: &EngineConfig, entry: &ProblemEntry, axes: &Axes<'_>) {
    // ── Results Table ──────────────────────────────────────
    println!(
        "  {:<8} {:<14} {:<9} {:>7} {:>10} {:>10} {:>10}",
        "Preset", "Pipeline", "Backend", "Groups", "Barr/grp", "Best ms", "GFLOP/s",
    );
    println!("  {}", "-".repeat(74));

    let workload = Workload::<T>::new(entry, 0);
    let mut results: Vec<SweepResult> = Vec::new();
    for &preset in axes.presets {
        for &pipeline in axes.pipelines {
            for &backend in axes.backends {
                let combo = EngineConfig {
                    tile_preset: preset.to_string(),
                    tile: None,
                    pipeline,
                    backend,
                    ..config.clone()
                };
                match run_single(combo, entry, &workload, axes.repeats) {
                    Ok(m) => {
                        println!(
                            "  {:<8} {:<14} {:<9} {:>7} {:>10.1} {:>10.3} {:>10.2}",
                            preset,
                            pipeline.as_str(),
                            backend.as_str(),
                            m.groups,
                            m.barriers_per_group(),
                            m.duration.as_secs_f64() * 1000.0,
                            m.gflops(),
                        );
                        results.push(SweepResult {
                            label: format!("{preset}/{pipeline}/{backend}"),
                            metrics: m,
                        });
                    }
                    Err(e) => {
                        println!(
                            "  {:<8} {:<14} {:<9}     FAILED: {e}",
                            preset,
                            pipeline.as_str(),
                            backend.as_str(),
                        );
                    }
                }
            }
        }
    }
    println!();

    // ── Summary ────────────────────────────────────────────
    let fastest = results.iter().min_by_key(|r| r.metrics.duration);
    let fewest_barriers = results.iter().min_by_key(|r| r.metrics.totals.barriers);
    match (fastest, fewest_barriers) {
        (Some(f), Some(b)) => {
            println!("  Summary:");
            println!(
                "   Fastest:          {} ({:.3} ms)",
                f.label,
                f.metrics.duration.as_secs_f64() * 1000.0,
            );
            println!(
                "   Fewest barriers:  {} ({} in total)",
                b.label, b.metrics.totals.barriers,
            );
        }
        _ => println!("  No successful runs."),
    }
    println!();
}

struct SweepResult {
    label: String,
    metrics: LaunchMetrics,
}

/// Plans one combination and keeps the fastest of `repeats` launches.
fn run_single<T: Element>(
    config: EngineConfig,
    entry: &ProblemEntry,
    workload: &Workload<T>,
    repeats: usize,
) -> anyhow::Result<LaunchMetrics> {
    let engine = GemmEngine::new(config)?.plan(entry)?.prepare()?;

    // Warm up: populates the scratch pool's free list.
    workload.launch(&engine, false)?;

    let mut best: Option<LaunchMetrics> = None;
    for _ in 0..repeats {
        let m = workload.launch(&engine, false)?.metrics;
        let faster = best
            .as_ref()
            .map_or(true, |b| m.duration < b.duration);
        if faster {
            best = Some(m);
        }
    }
    best.ok_or_else(|| anyhow::anyhow!("no timed launch"))
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list() {
        let items: Vec<&str> = split_list(" serial, ,double-buffer ").collect();
        assert_eq!(items, ["serial", "double-buffer"]);
    }

    #[test]
    fn test_run_single_reports_best_launch() {
        let entry = ProblemEntry::new(
            "fc",
            Problem::Gemm(problem_ir::GemmProblem::new(32, 32, 32)),
        );
        let config = EngineConfig {
            tile_preset: "small".into(),
            num_threads: Some(2),
            ..EngineConfig::default()
        };
        let workload = Workload::<f32>::new(&entry, 1);
        let m = run_single(config, &entry, &workload, 2).unwrap();
        assert_eq!(m.groups, 4);
        assert_eq!(m.totals.hazard_violations, 0);
    }
}
