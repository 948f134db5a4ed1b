// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host CPU probing.
//!
//! Reads the processor name from `/proc/cpuinfo` and the online core count
//! from `/sys/devices/system/cpu/online`. Both degrade to defaults when the
//! files are missing (containers, non-Linux hosts).

use crate::DeviceError;
use std::path::Path;

const CPUINFO: &str = "/proc/cpuinfo";
const CPU_ONLINE: &str = "/sys/devices/system/cpu/online";

/// Reads a system file, trimmed.
pub(crate) fn read_system_file(path: &Path) -> Result<String, DeviceError> {
    if !path.exists() {
        return Err(DeviceError::NotAvailable {
            path: path.display().to_string(),
        });
    }
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| DeviceError::ReadError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Processor name from `/proc/cpuinfo`, if the host exposes one.
pub(crate) fn cpu_model() -> Option<String> {
    match read_system_file(Path::new(CPUINFO)) {
        Ok(content) => parse_cpu_model(&content),
        Err(e) => {
            tracing::debug!("no cpu model: {e}");
            None
        }
    }
}

/// Extracts the processor name from `/proc/cpuinfo` content.
///
/// x86 hosts report `model name`; ARM boards report `Model` (board name) or
/// `Hardware`.
pub fn parse_cpu_model(content: &str) -> Option<String> {
    ["model name", "Model", "Hardware"].iter().find_map(|key| {
        content.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            let v = v.trim();
            (k.trim() == *key && !v.is_empty()).then(|| v.to_string())
        })
    })
}

/// Number of online cores, falling back to `available_parallelism` and
/// finally to one.
pub(crate) fn online_cores() -> usize {
    if let Ok(content) = read_system_file(Path::new(CPU_ONLINE)) {
        if let Some(count) = parse_cpu_range(&content) {
            return count;
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parses a CPU range list like `"0-3"` → 4 or `"0,2-3"` → 3.
pub fn parse_cpu_range(s: &str) -> Option<usize> {
    let mut total = 0usize;
    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start.trim().parse().ok()?;
            let end: usize = end.trim().parse().ok()?;
            total += end.checked_sub(start)? + 1;
        } else {
            let _: usize = part.parse().ok()?;
            total += 1;
        }
    }
    (total > 0).then_some(total)
}

/// Whether the host has a fused multiply-add unit the fragment backend can
/// lean on.
pub(crate) fn has_fma() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("fma")
    }
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}
