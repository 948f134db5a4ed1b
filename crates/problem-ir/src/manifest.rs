// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON problem manifests.
//!
//! A manifest lists named problems together with the launch options that
//! belong to the problem rather than to the engine (specialization, split-K
//! factor, fused epilogue).
//!
//! # Format
//! ```json
//! {
//!   "name": "resnet-block",
//!   "problems": [
//!     { "name": "fc", "op": "gemm", "m": 128, "n": 128, "k": 256,
//!       "epilogue": { "kind": "add-relu" } },
//!     { "name": "conv1", "op": "conv2d-fwd",
//!       "n": 1, "c": 64, "hi": 28, "wi": 28, "k": 64, "y": 3, "x": 3,
//!       "left_pad": [1, 1], "right_pad": [1, 1],
//!       "specialization": "mnk-padding" },
//!     { "name": "attn-probs", "op": "softmax", "rows": 64, "cols": 100 }
//!   ]
//! }
//! ```

use crate::{EpilogueKind, GemmSpecialization, Problem, ProblemError};
use std::collections::HashSet;
use std::path::Path;

fn one() -> usize {
    1
}

/// A named problem and its launch options.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProblemEntry {
    pub name: String,
    #[serde(flatten)]
    pub problem: Problem,
    #[serde(default)]
    pub specialization: GemmSpecialization,
    /// Split-K factor; results are combined with atomic adds when > 1.
    #[serde(default = "one")]
    pub k_batch: usize,
    #[serde(default)]
    pub epilogue: EpilogueKind,
}

impl ProblemEntry {
    pub fn new(name: impl Into<String>, problem: Problem) -> Self {
        Self {
            name: name.into(),
            problem,
            specialization: GemmSpecialization::Default,
            k_batch: 1,
            epilogue: EpilogueKind::PassThrough,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} [{}, k-batch {}, epilogue {}]",
            self.name,
            self.problem.summary(),
            self.specialization,
            self.k_batch,
            self.epilogue
        )
    }
}

/// Top-level manifest.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProblemManifest {
    pub name: String,
    pub problems: Vec<ProblemEntry>,
}

impl ProblemManifest {
    /// Loads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ProblemError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ProblemError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    pub fn to_json(&self) -> Result<String, ProblemError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every problem and the per-entry launch options.
    ///
    /// Checks:
    /// - At least one problem is listed.
    /// - Names are unique.
    /// - Every problem validates.
    /// - `k_batch` is positive, and split-K is only requested for GEMM-shaped
    ///   problems with an epilogue that commutes with summation.
    pub fn validate(&self) -> Result<(), ProblemError> {
        if self.problems.is_empty() {
            return Err(ProblemError::InvalidProblem {
                name: self.name.clone(),
                detail: "manifest lists no problems".into(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.problems {
            let invalid = |detail: String| ProblemError::InvalidProblem {
                name: entry.name.clone(),
                detail,
            };
            if !seen.insert(entry.name.as_str()) {
                return Err(invalid("duplicate problem name".into()));
            }
            entry.problem.validate()?;
            if entry.k_batch == 0 {
                return Err(invalid("k_batch must be at least 1".into()));
            }
            if entry.k_batch > 1 {
                if matches!(entry.problem, Problem::Softmax(_)) {
                    return Err(invalid("softmax cannot be split along K".into()));
                }
                if !matches!(entry.epilogue, EpilogueKind::PassThrough | EpilogueKind::Scale { .. }) {
                    return Err(invalid(format!(
                        "epilogue {} does not distribute over split-K partial sums",
                        entry.epilogue
                    )));
                }
            }
        }
        Ok(())
    }

    /// Looks up a problem by name.
    pub fn get(&self, name: &str) -> Option<&ProblemEntry> {
        self.problems.iter().find(|e| e.name == name)
    }

    /// Sum of the floating-point operations of every problem.
    pub fn total_flops(&self) -> u64 {
        self.problems.iter().map(|e| e.problem.flops()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GemmProblem;
    use tensor_core::DType;

    fn sample_manifest_json() -> &'static str {
        r#"{
            "name": "mixed",
            "problems": [
                { "name": "fc", "op": "gemm", "m": 128, "n": 128, "k": 256,
                  "dtype": "f16", "epilogue": { "kind": "add-relu" } },
                { "name": "fc-split", "op": "gemm", "m": 64, "n": 64, "k": 256,
                  "k_batch": 4 },
                { "name": "conv1", "op": "conv2d-fwd",
                  "n": 1, "c": 8, "hi": 10, "wi": 10, "k": 16, "y": 3, "x": 3,
                  "left_pad": [1, 1], "right_pad": [1, 1],
                  "specialization": "mnk-padding" },
                { "name": "probs", "op": "softmax", "rows": 16, "cols": 50, "beta": 0.5 }
            ]
        }"#
    }

    #[test]
    fn test_parse_manifest() {
        let m = ProblemManifest::from_json(sample_manifest_json()).unwrap();
        assert_eq!(m.name, "mixed");
        assert_eq!(m.problems.len(), 4);

        let fc = m.get("fc").unwrap();
        assert_eq!(fc.epilogue, EpilogueKind::AddRelu);
        assert_eq!(fc.problem.dtype(), DType::F16);
        assert_eq!(fc.k_batch, 1);

        assert_eq!(m.get("fc-split").unwrap().k_batch, 4);
        let conv = m.get("conv1").unwrap();
        assert_eq!(conv.specialization, GemmSpecialization::MnkPadding);
        assert_eq!(conv.problem.op_name(), "conv2d-fwd");

        let Problem::Softmax(s) = &m.get("probs").unwrap().problem else {
            panic!("expected softmax");
        };
        assert_eq!((s.alpha, s.beta), (1.0, 0.5));
    }

    #[test]
    fn test_validate_ok() {
        let m = ProblemManifest::from_json(sample_manifest_json()).unwrap();
        m.validate().unwrap();
        assert!(m.total_flops() > 2 * 128 * 128 * 256);
    }

    #[test]
    fn test_validate_empty() {
        let m = ProblemManifest::from_json(r#"{ "name": "empty", "problems": [] }"#).unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = r#"{ "name": "dup", "problems": [
            { "name": "a", "op": "gemm", "m": 8, "n": 8, "k": 8 },
            { "name": "a", "op": "gemm", "m": 16, "n": 8, "k": 8 }
        ] }"#;
        let m = ProblemManifest::from_json(json).unwrap();
        let err = m.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"), "{err}");
    }

    #[test]
    fn test_split_k_needs_linear_epilogue() {
        let mut entry = ProblemEntry::new("g", Problem::Gemm(GemmProblem::new(64, 64, 256)));
        entry.k_batch = 2;
        entry.epilogue = EpilogueKind::Relu;
        let m = ProblemManifest {
            name: "split".into(),
            problems: vec![entry],
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_unknown_op_is_parse_error() {
        let json = r#"{ "name": "x", "problems": [{ "name": "p", "op": "fft", "n": 8 }] }"#;
        assert!(matches!(
            ProblemManifest::from_json(json),
            Err(ProblemError::ManifestParseError(_))
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let m = ProblemManifest::from_json(sample_manifest_json()).unwrap();
        let back = ProblemManifest::from_json(&m.to_json().unwrap()).unwrap();
        assert_eq!(back, m);
    }
}
