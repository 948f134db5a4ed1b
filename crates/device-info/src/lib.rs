// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-info
//!
//! Read-only properties of the simulated tile processor, probed once per
//! process and shared by every launch.
//!
//! # Probed Properties
//! - **Name**: the host processor name from `/proc/cpuinfo`.
//! - **Compute units**: online host cores; groups are scheduled on them.
//! - **Matrix unit**: whether the host has fused multiply-add.
//!
//! The group limits (wave size, workers per group, scratch per group) are
//! fixed properties of the simulated processor.
//!
//! # Graceful Degradation
//! Missing system files fall back to defaults (`"generic-host"`,
//! `available_parallelism`), so probing never fails.
//!
//! # Example
//! ```
//! use device_info::device_props;
//!
//! let props = device_props();
//! assert!(props.compute_units >= 1);
//! assert!(props.check_scratch(16 * 1024).is_ok());
//! println!("{}", props.summary());
//! ```

mod error;
mod host;
mod props;

pub use error::DeviceError;
pub use host::{parse_cpu_model, parse_cpu_range};
pub use props::{device_name, device_props, DeviceProps};
