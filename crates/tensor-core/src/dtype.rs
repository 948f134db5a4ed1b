// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported operand data types and the [`Element`] trait.

use half::{bf16, f16};

/// Enumerates the numeric types a kernel operand can hold.
///
/// The planner uses `DType` for byte accounting; the engine uses it to
/// reject write policies that need atomic floating-point addition on a
/// type that cannot provide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
}

impl DType {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
        }
    }

    /// Parses a label produced by [`DType::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "f32" | "float" => Some(DType::F32),
            "f16" | "half" => Some(DType::F16),
            "bf16" => Some(DType::BF16),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar type that can be stored in a [`crate::DeviceBuffer`] and
/// widened to `f32` for accumulation.
///
/// Every element fits in 32 bits, which is what lets a device buffer keep
/// one `AtomicU32` per element regardless of the operand type.
pub trait Element: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// The runtime tag for this type.
    const DTYPE: DType;

    /// Widens to the accumulator type.
    fn to_f32(self) -> f32;

    /// Narrows from the accumulator type (round-to-nearest-even).
    fn from_f32(v: f32) -> Self;

    /// Raw bit pattern, zero-extended to 32 bits.
    fn to_bits(self) -> u32;

    /// Inverse of [`Element::to_bits`].
    fn from_bits(bits: u32) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline(always)]
    fn to_bits(self) -> u32 {
        f32::to_bits(self)
    }

    #[inline(always)]
    fn from_bits(bits: u32) -> Self {
        f32::from_bits(bits)
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    #[inline(always)]
    fn to_bits(self) -> u32 {
        u32::from(f16::to_bits(self))
    }

    #[inline(always)]
    fn from_bits(bits: u32) -> Self {
        f16::from_bits(bits as u16)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(v: f32) -> Self {
        bf16::from_f32(v)
    }

    #[inline(always)]
    fn to_bits(self) -> u32 {
        u32::from(bf16::to_bits(self))
    }

    #[inline(always)]
    fn from_bits(bits: u32) -> Self {
        bf16::from_bits(bits as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bytes() {
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::F16.size_bytes(), 2);
        assert_eq!(DType::BF16.size_bytes(), 2);
    }

    #[test]
    fn test_parse() {
        assert_eq!(DType::parse("F16"), Some(DType::F16));
        assert_eq!(DType::parse(" bf16 "), Some(DType::BF16));
        assert_eq!(DType::parse("i8"), None);
    }

    #[test]
    fn test_bits_roundtrip() {
        let h = f16::from_f32(1.5);
        assert_eq!(<f16 as Element>::from_bits(Element::to_bits(h)), h);
        let b = bf16::from_f32(-2.25);
        assert_eq!(<bf16 as Element>::from_bits(Element::to_bits(b)), b);
        assert_eq!(<f32 as Element>::from_bits(Element::to_bits(3.0f32)), 3.0);
    }

    #[test]
    fn test_half_bits_fit_in_low_word() {
        let h = f16::from_f32(-0.0);
        assert_eq!(Element::to_bits(h) >> 16, 0);
    }

    #[test]
    fn test_dtype_tags() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f16 as Element>::DTYPE, DType::F16);
        assert_eq!(<bf16 as Element>::DTYPE, DType::BF16);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DType::BF16).unwrap();
        assert_eq!(json, "\"bf16\"");
    }
}
