// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-group scratch budget and parsing.

use crate::{ScratchError, LANE_BYTES};
use std::fmt;

/// The most scratch memory one work-group may use.
///
/// # Parsing
/// - `"64K"` or `"64KB"` → 64 × 1024 bytes
/// - `"1M"` or `"1MB"` → 1024² bytes
/// - `"4096"` or `"4096B"` → raw byte count
///
/// # Examples
/// ```
/// use scratch_memory::ScratchBudget;
///
/// let b = ScratchBudget::parse("64K").unwrap();
/// assert_eq!(b.as_bytes(), 65536);
/// assert_eq!(b.as_lanes(), 16384);
/// assert_eq!(b.to_string(), "64 KB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScratchBudget {
    bytes: usize,
}

impl ScratchBudget {
    /// Creates a budget from a byte count.
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    /// Creates a budget from kilobytes.
    pub fn from_kb(kb: usize) -> Self {
        Self { bytes: kb * 1024 }
    }

    /// Returns the budget in bytes.
    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the number of `f32` lanes the budget holds.
    pub fn as_lanes(&self) -> usize {
        self.bytes / LANE_BYTES
    }

    /// Parses a human-readable budget string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, ScratchError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ScratchError::InvalidBudget(s.to_string()));
        }

        let upper = s.to_uppercase();
        let (num, multiplier) = if upper.ends_with("MB") {
            (&s[..s.len() - 2], 1024 * 1024)
        } else if upper.ends_with('M') {
            (&s[..s.len() - 1], 1024 * 1024)
        } else if upper.ends_with("KB") {
            (&s[..s.len() - 2], 1024)
        } else if upper.ends_with('K') {
            (&s[..s.len() - 1], 1024)
        } else if upper.ends_with('B') {
            (&s[..s.len() - 1], 1)
        } else {
            (s, 1)
        };

        let value: usize = num
            .trim()
            .parse()
            .map_err(|_| ScratchError::InvalidBudget(s.to_string()))?;
        let bytes = value
            .checked_mul(multiplier)
            .filter(|&b| b > 0)
            .ok_or_else(|| ScratchError::InvalidBudget(s.to_string()))?;

        Ok(Self { bytes })
    }
}

impl fmt::Display for ScratchBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= 1024 * 1024 && self.bytes % (1024 * 1024) == 0 {
            write!(f, "{} MB", self.bytes / (1024 * 1024))
        } else if self.bytes >= 1024 && self.bytes % 1024 == 0 {
            write!(f, "{} KB", self.bytes / 1024)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kilobytes() {
        assert_eq!(ScratchBudget::parse("64K").unwrap().as_bytes(), 65536);
        assert_eq!(ScratchBudget::parse("64kb").unwrap().as_bytes(), 65536);
    }

    #[test]
    fn test_parse_megabytes_and_raw() {
        assert_eq!(ScratchBudget::parse("1M").unwrap().as_bytes(), 1 << 20);
        assert_eq!(ScratchBudget::parse("4096").unwrap().as_bytes(), 4096);
        assert_eq!(ScratchBudget::parse(" 512B ").unwrap().as_bytes(), 512);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ScratchBudget::parse("").is_err());
        assert!(ScratchBudget::parse("lots").is_err());
        assert!(ScratchBudget::parse("0K").is_err());
    }

    #[test]
    fn test_lanes() {
        assert_eq!(ScratchBudget::from_kb(32).as_lanes(), 8192);
    }

    #[test]
    fn test_display() {
        assert_eq!(ScratchBudget::from_kb(64).to_string(), "64 KB");
        assert_eq!(ScratchBudget::from_kb(1024).to_string(), "1 MB");
        assert_eq!(ScratchBudget::from_bytes(100).to_string(), "100 B");
    }

    #[test]
    fn test_serde_roundtrip() {
        let b = ScratchBudget::from_kb(48);
        let json = serde_json::to_string(&b).unwrap();
        let back: ScratchBudget = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
