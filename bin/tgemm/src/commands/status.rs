// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `tgemm status` command: display device properties and scratch usage.
//!
//! The device is probed once per process; on hosts where the CPU model or
//! FMA support cannot be read the defaults are shown.

use super::usage_bar;
use gemm_engine::EngineConfig;
use tile_planner::{PipelineKind, TileConfig};

pub fn execute(config: EngineConfig) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                 tgemm · Device Status                ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let device = device_info::device_props();

    // ── Device ─────────────────────────────────────────────────
    println!("  Device");
    println!("   Name:           {}", device.name);
    println!("   Compute units:  {}", device.compute_units);
    println!("   Wave size:      {}", device.wave_size);
    println!("   Max group size: {} workers", device.max_workers_per_group);
    println!("   Scratch/group:  {} KB", device.scratch_bytes_per_group / 1024);
    println!(
        "   Matrix unit:    {}",
        if device.has_matrix_unit {
            "yes (fragment backend available)"
        } else {
            "no (fragment backend falls back to scalar)"
        },
    );
    println!();

    // ── Engine ─────────────────────────────────────────────────
    let budget = config.parse_budget()?;
    println!("  Engine");
    println!("   Threads:        {}", config.resolve_threads());
    println!("   Scratch budget: {budget}");
    println!("   Tile order:     {}", config.tile_order);
    println!("   Backend:        {}", config.backend);
    println!();

    // ── Scratch per Preset ─────────────────────────────────────
    let limit = budget.as_bytes().min(device.scratch_bytes_per_group);
    println!("  Scratch per group (limit {} B)", limit);
    println!(
        "   {:<8} {:<14} {:<9} {:>9}  {}",
        "Preset", "Pipeline", "C shuffle", "Bytes", "Usage",
    );
    println!("   {}", "-".repeat(66));
    for preset in TileConfig::PRESETS {
        let tile = TileConfig::preset(preset)?;
        for pipeline in [PipelineKind::DoubleBuffer, PipelineKind::SingleBuffer, PipelineKind::Serial] {
            for c_shuffle in [false, true] {
                let bytes = tile.scratch_layout(pipeline, c_shuffle).bytes();
                let ratio = bytes as f64 / limit as f64;
                println!(
                    "   {:<8} {:<14} {:<9} {:>9}  {}{}",
                    preset,
                    pipeline.as_str(),
                    if c_shuffle { "yes" } else { "no" },
                    bytes,
                    usage_bar(ratio),
                    if bytes > limit { "  OVER LIMIT" } else { "" },
                );
            }
        }
    }
    let softmax_bytes = config.softmax.layout().bytes();
    println!(
        "   {:<8} {:<14} {:<9} {:>9}  {}",
        "softmax",
        "-",
        "-",
        softmax_bytes,
        usage_bar(softmax_bytes as f64 / limit as f64),
    );
    println!();

    // ── Configuration ──────────────────────────────────────────
    println!("  Effective configuration");
    for line in config.to_toml()?.lines() {
        println!("   {line}");
    }
    println!();
    println!("{}", device.summary());

    Ok(())
}
