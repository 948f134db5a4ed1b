// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device queries.

/// Errors raised while probing the host or checking a launch against the
/// device limits.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Failed to read a procfs or sysfs file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    /// The expected system file does not exist.
    #[error("system file not found: {path}")]
    NotAvailable { path: String },

    /// A launch asks for more than the device provides.
    #[error("{what} of {requested} exceeds the device limit of {limit}")]
    ExceedsLimit {
        what: &'static str,
        requested: usize,
        limit: usize,
    },
}
