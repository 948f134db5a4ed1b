// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tgemm run` command: plan, launch and optionally verify each problem.

use super::workload;
use gemm_engine::{EngineConfig, GemmEngine};
use problem_ir::ProblemEntry;

pub fn execute(
    config: EngineConfig,
    entries: Vec<ProblemEntry>,
    verify: bool,
    seed: u64,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                  tgemm · Run Problems                ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let tile = config.tile_config()?;
    println!("  Tile:      {}", tile.summary());
    println!(
        "  Engine:    {} backend, {} pipeline, {} order{}",
        config.backend,
        config.pipeline,
        config.tile_order,
        if config.c_shuffle { ", C shuffle" } else { "" },
    );
    println!("  Threads:   {}", config.resolve_threads());
    println!();

    let mut failures = 0usize;
    for (i, entry) in entries.iter().enumerate() {
        // ── Plan ───────────────────────────────────────────────
        println!("  [{}/{}] {}", i + 1, entries.len(), entry.summary());
        let engine = GemmEngine::new(config.clone())?.plan(entry)?.prepare()?;
        for line in engine.kernel().summary().lines().skip(1) {
            println!("   {}", line.trim());
        }

        // ── Launch ─────────────────────────────────────────────
        let outcome = workload::launch_once(&engine, entry, seed.wrapping_add(i as u64), verify)?;
        let m = &outcome.metrics;
        println!("   Kernel:    {}", m.kernel);
        println!(
            "   Time:      {:.3} ms ({:.2} GFLOP/s)",
            m.duration.as_secs_f64() * 1000.0,
            m.gflops(),
        );
        println!(
            "   Traffic:   {} vector loads, {} vector stores, {:.1} barriers/group",
            m.totals.vector_reads,
            m.totals.vector_writes,
            m.barriers_per_group(),
        );
        println!("   Scratch:   {}", engine.scratch_stats().summary());
        if m.totals.hazard_violations > 0 {
            println!("   WARNING: {} scratch hazards recorded", m.totals.hazard_violations);
        }

        let dtype = entry.problem.dtype();
        match (outcome.max_error, outcome.passed(dtype)) {
            (Some(err), Some(true)) => println!("   Verify:    ok (max rel. error {err:.2e})"),
            (Some(err), _) => {
                failures += 1;
                println!(
                    "   Verify:    FAILED (max rel. error {err:.2e} > {:.1e})",
                    workload::tolerance(dtype),
                );
            }
            _ => {}
        }
        println!();
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} problems failed verification", entries.len());
    }
    Ok(())
}
