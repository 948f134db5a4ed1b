// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device properties and the process-wide cache.

use crate::{host, DeviceError};
use std::sync::OnceLock;

/// Properties of the simulated tile processor.
///
/// Work-groups run on host threads, so `compute_units` is the host's online
/// core count. The remaining limits are those of the processor being
/// simulated.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeviceProps {
    pub name: String,
    pub compute_units: usize,
    /// Workers that execute one instruction together.
    pub wave_size: usize,
    pub max_workers_per_group: usize,
    pub scratch_bytes_per_group: usize,
    /// `true` if the fragment (matrix-unit) backend has hardware FMA behind it.
    pub has_matrix_unit: bool,
}

impl DeviceProps {
    pub const DEFAULT_NAME: &'static str = "generic-host";
    pub const WAVE_SIZE: usize = 64;
    pub const MAX_WORKERS_PER_GROUP: usize = 1024;
    pub const SCRATCH_BYTES_PER_GROUP: usize = 64 * 1024;

    /// Probes the host. Never fails: missing information falls back to
    /// defaults.
    pub fn probe() -> Self {
        let props = Self {
            name: host::cpu_model().unwrap_or_else(|| Self::DEFAULT_NAME.to_string()),
            compute_units: host::online_cores(),
            wave_size: Self::WAVE_SIZE,
            max_workers_per_group: Self::MAX_WORKERS_PER_GROUP,
            scratch_bytes_per_group: Self::SCRATCH_BYTES_PER_GROUP,
            has_matrix_unit: host::has_fma(),
        };
        tracing::debug!("device: {}", props.summary());
        props
    }

    /// Checks a launch's group size against the device.
    pub fn check_block_size(&self, workers: usize) -> Result<(), DeviceError> {
        if workers > self.max_workers_per_group {
            return Err(DeviceError::ExceedsLimit {
                what: "group size",
                requested: workers,
                limit: self.max_workers_per_group,
            });
        }
        Ok(())
    }

    /// Checks a launch's per-group scratch against the device.
    pub fn check_scratch(&self, bytes: usize) -> Result<(), DeviceError> {
        if bytes > self.scratch_bytes_per_group {
            return Err(DeviceError::ExceedsLimit {
                what: "scratch bytes",
                requested: bytes,
                limit: self.scratch_bytes_per_group,
            });
        }
        Ok(())
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} compute units, wave {}, ≤{} workers/group, {} KB scratch/group, matrix unit: {}",
            self.name,
            self.compute_units,
            self.wave_size,
            self.max_workers_per_group,
            self.scratch_bytes_per_group / 1024,
            if self.has_matrix_unit { "yes" } else { "no" },
        )
    }
}

/// The device properties, probed once per process.
pub fn device_props() -> &'static DeviceProps {
    static PROPS: OnceLock<DeviceProps> = OnceLock::new();
    PROPS.get_or_init(DeviceProps::probe)
}

/// The device name.
pub fn device_name() -> &'static str {
    &device_props().name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> DeviceProps {
        DeviceProps {
            name: "test".to_string(),
            compute_units: 4,
            wave_size: 64,
            max_workers_per_group: 256,
            scratch_bytes_per_group: 32 * 1024,
            has_matrix_unit: false,
        }
    }

    #[test]
    fn test_cached_props_are_shared() {
        let a = device_props();
        let b = device_props();
        assert!(std::ptr::eq(a, b));
        assert!(a.compute_units >= 1);
        assert!(!device_name().is_empty());
    }

    #[test]
    fn test_limits() {
        let p = props();
        assert!(p.check_block_size(256).is_ok());
        assert!(matches!(
            p.check_block_size(512),
            Err(DeviceError::ExceedsLimit { what: "group size", .. })
        ));
        assert!(p.check_scratch(32 * 1024).is_ok());
        assert!(p.check_scratch(32 * 1024 + 4).is_err());
    }

    #[test]
    fn test_summary() {
        let s = props().summary();
        assert!(s.contains("4 compute units"));
        assert!(s.contains("32 KB scratch/group"));
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&props()).unwrap();
        assert!(json.contains(r#""wave_size":64"#));
    }
}
