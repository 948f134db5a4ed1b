// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Names of the fused epilogue operators a problem can request.

use std::fmt;

/// The elementwise operator applied to every accumulator before it is
/// written.
///
/// This is only a name plus parameters; the engine instantiates the
/// matching `CElementwise` operator at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EpilogueKind {
    #[default]
    PassThrough,
    Scale {
        alpha: f32,
    },
    Relu,
    FastGelu,
    /// `acc + d0`, with `d0` typically a bias broadcast along M.
    AddBias,
    /// `relu(acc + d0)`.
    AddRelu,
    /// `fast_gelu(acc + d0 + d1)`.
    AddAddFastGelu,
}

impl EpilogueKind {
    /// Number of extra `D` inputs the operator reads per element.
    pub fn num_d(self) -> usize {
        match self {
            EpilogueKind::AddBias | EpilogueKind::AddRelu => 1,
            EpilogueKind::AddAddFastGelu => 2,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EpilogueKind::PassThrough => "pass-through",
            EpilogueKind::Scale { .. } => "scale",
            EpilogueKind::Relu => "relu",
            EpilogueKind::FastGelu => "fast-gelu",
            EpilogueKind::AddBias => "add-bias",
            EpilogueKind::AddRelu => "add-relu",
            EpilogueKind::AddAddFastGelu => "add-add-fast-gelu",
        }
    }

    /// Parses a name, with `scale:<alpha>` for [`EpilogueKind::Scale`].
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(alpha) = s.strip_prefix("scale:") {
            return alpha.parse().ok().map(|alpha| EpilogueKind::Scale { alpha });
        }
        match s {
            "pass-through" | "none" => Some(EpilogueKind::PassThrough),
            "relu" => Some(EpilogueKind::Relu),
            "fast-gelu" | "gelu" => Some(EpilogueKind::FastGelu),
            "add-bias" | "bias" => Some(EpilogueKind::AddBias),
            "add-relu" => Some(EpilogueKind::AddRelu),
            "add-add-fast-gelu" => Some(EpilogueKind::AddAddFastGelu),
            _ => None,
        }
    }
}

impl fmt::Display for EpilogueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpilogueKind::Scale { alpha } => write!(f, "scale({alpha})"),
            other => f.write_str(other.as_str()),
        }
    }
}
