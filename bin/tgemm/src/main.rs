// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tgemm
//!
//! Command-line interface for the block-tiled GEMM engine.
//!
//! ## Usage
//! ```bash
//! # Run every problem of a manifest and check it against the reference
//! tgemm run --manifest ./demos/problems.json --verify
//!
//! # Run a single GEMM with a TOML engine configuration
//! tgemm --config ./demos/engine.toml run --gemm 512x512x256
//!
//! # Compare pipelines, backends and tile presets
//! tgemm sweep --gemm 256x256x256 --presets small,default
//!
//! # Show lowering and launch plans
//! tgemm inspect --manifest ./demos/problems.json
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tgemm",
    about = "Block-tiled, software-pipelined GEMM and softmax on a simulated device",
    version,
    author
)]
struct Cli {
    /// Path to a TOML engine configuration file.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run problems on random operands.
    Run {
        /// Path to a JSON problem manifest.
        #[arg(short, long)]
        manifest: Option<std::path::PathBuf>,

        /// Run only the named manifest problem.
        #[arg(short, long)]
        problem: Option<String>,

        /// Run a single row-major GEMM instead, given as `MxNxK`.
        #[arg(short, long, conflicts_with = "manifest")]
        gemm: Option<String>,

        /// Element type of an inline GEMM: f32, f16 or bf16.
        #[arg(long, default_value = "f32")]
        dtype: String,

        /// Compare every result with the host reference kernels.
        #[arg(long)]
        verify: bool,

        /// Seed for the random operands.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Time every pipeline × backend × tile preset combination.
    Sweep {
        /// Path to a JSON problem manifest.
        #[arg(short, long)]
        manifest: Option<std::path::PathBuf>,

        /// Sweep a single row-major GEMM instead, given as `MxNxK`.
        #[arg(short, long, conflicts_with = "manifest")]
        gemm: Option<String>,

        /// Pipelines to sweep (comma-separated).
        #[arg(long, default_value = "double-buffer,single-buffer,serial")]
        pipelines: String,

        /// Compute backends to sweep (comma-separated).
        #[arg(long, default_value = "fragment,scalar")]
        backends: String,

        /// Tile presets to sweep (comma-separated).
        #[arg(long, default_value = "small,default")]
        presets: String,

        /// Timed launches per combination; the fastest is reported.
        #[arg(long, default_value_t = 3)]
        repeats: usize,
    },

    /// Show the lowered descriptors and launch plan of each problem.
    Inspect {
        /// Path to a JSON problem manifest.
        #[arg(short, long)]
        manifest: std::path::PathBuf,
    },

    /// Display device properties and per-preset scratch usage.
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            manifest,
            problem,
            gemm,
            dtype,
            verify,
            seed,
        } => {
            let entries = commands::select_problems(&config, manifest, problem, gemm, &dtype)?;
            commands::run::execute(config, entries, verify, seed)
        }
        Commands::Sweep {
            manifest,
            gemm,
            pipelines,
            backends,
            presets,
            repeats,
        } => {
            let entries = commands::select_problems(&config, manifest, None, gemm, "f32")?;
            commands::sweep::execute(config, entries, &pipelines, &backends, &presets, repeats)
        }
        Commands::Inspect { manifest } => commands::inspect::execute(config, manifest),
        Commands::Status => commands::status::execute(config),
    }
}
