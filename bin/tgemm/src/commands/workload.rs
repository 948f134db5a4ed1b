// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Random operands for a planned problem, the launch, and the reference
//! check shared by `run` and `sweep`.

use gemm_engine::{DTensor, GemmEngine, LaunchMetrics, Ready};
use half::{bf16, f16};
use problem_ir::{EpilogueKind, Problem, ProblemEntry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tensor_core::ops::reference::{conv2d_nhwc, matmul_with, max_relative_error, softmax_rows};
use tensor_core::{
    AddAddFastGelu, AddBias, AddRelu, CElementwise, DType, DeviceBuffer, Element, FastGelu,
    PassThrough, Relu, Scale, Shape, Tensor,
};

/// The operands of one problem, kept so a launch can be repeated.
pub struct Workload<T: Element> {
    entry: ProblemEntry,
    inputs: [DeviceBuffer<T>; 2],
    ds: Vec<DeviceBuffer<T>>,
    output: DeviceBuffer<T>,
    /// Output contents before the first launch (softmax reads it when β ≠ 0).
    prior: Vec<f32>,
}

/// Result of one launch.
pub struct Outcome {
    pub metrics: LaunchMetrics,
    /// Largest relative error against the reference, if verified.
    pub max_error: Option<f32>,
}

impl Outcome {
    /// Whether the verified error is within the element type's tolerance.
    pub fn passed(&self, dtype: DType) -> Option<bool> {
        self.max_error.map(|e| e <= tolerance(dtype))
    }
}

/// Acceptable relative error per element type; accumulation is always `f32`.
pub fn tolerance(dtype: DType) -> f32 {
    match dtype {
        DType::F32 => 1e-4,
        DType::F16 => 2e-3,
        DType::BF16 => 1.6e-2,
    }
}

/// Generates operands for `entry` and launches it once.
pub fn launch_once(
    engine: &GemmEngine<Ready>,
    entry: &ProblemEntry,
    seed: u64,
    verify: bool,
) -> anyhow::Result<Outcome> {
    match entry.problem.dtype() {
        DType::F32 => Workload::<f32>::new(entry, seed).launch(engine, verify),
        DType::F16 => Workload::<f16>::new(entry, seed).launch(engine, verify),
        DType::BF16 => Workload::<bf16>::new(entry, seed).launch(engine, verify),
    }
}

impl<T: Element> Workload<T> {
    pub fn new(entry: &ProblemEntry, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (m, n) = output_dims(&entry.problem);
        let (a_len, b_len, c_len) = match &entry.problem {
            Problem::Gemm(p) => (p.a_elements(), p.b_elements(), p.c_elements()),
            Problem::Conv2dFwd(p) => (
                p.geometry.input_shape().num_elements(),
                p.geometry.weight_shape().num_elements(),
                m * n,
            ),
            Problem::Softmax(p) => (p.rows * p.cols, 0, p.rows * p.cols),
        };
        let ds = match entry.epilogue.num_d() {
            0 => Vec::new(),
            1 => vec![random(&mut rng, n)],
            count => (0..count).map(|_| random(&mut rng, m * n)).collect(),
        };
        let output = match &entry.problem {
            Problem::Softmax(p) if p.beta != 0.0 => random(&mut rng, c_len),
            _ => DeviceBuffer::zeroed(c_len),
        };
        Self {
            entry: entry.clone(),
            inputs: [random(&mut rng, a_len), random(&mut rng, b_len)],
            prior: output.to_f32_vec(),
            ds,
            output,
        }
    }

    /// Launches the planned kernel and optionally checks the result.
    pub fn launch(&self, engine: &GemmEngine<Ready>, verify: bool) -> anyhow::Result<Outcome> {
        let [x, w] = &self.inputs;
        let metrics = match &self.entry.problem {
            Problem::Softmax(_) => engine.run_softmax(x, &self.output)?,
            _ => {
                let n = output_dims(&self.entry.problem).1;
                let ds: Vec<DTensor<'_, T>> = self
                    .ds
                    .iter()
                    .map(|d| if self.ds.len() == 1 { DTensor::bias(d) } else { DTensor::matrix(d, n) })
                    .collect();
                engine.run_gemm(x, w, &self.output, &ds)?
            }
        };
        let max_error = if verify { Some(self.check()?) } else { None };
        Ok(Outcome { metrics, max_error })
    }

    fn check(&self) -> anyhow::Result<f32> {
        let [x, w] = &self.inputs;
        let out = self.output.to_f32_vec();
        let (actual, expected) = match &self.entry.problem {
            Problem::Gemm(p) => {
                let (a, b) = (x.to_f32_vec(), w.to_f32_vec());
                let acc = matmul_with(p.m, p.n, p.k, |i, k| a[p.a_index(i, k)], |k, j| b[p.b_index(k, j)]);
                let actual: Vec<f32> = (0..p.m)
                    .flat_map(|i| (0..p.n).map(move |j| (i, j)))
                    .map(|(i, j)| out[p.c_index(i, j)])
                    .collect();
                (actual, self.fused(acc.as_slice(), p.n))
            }
            Problem::Conv2dFwd(p) => {
                let g = &p.geometry;
                let input = Tensor::from_vec(g.input_shape(), x.to_vec())?;
                let weight = Tensor::from_vec(g.weight_shape(), w.to_vec())?;
                let acc = conv2d_nhwc(&input, &weight, g)?;
                (out, self.fused(acc.as_slice(), p.gemm_n()))
            }
            Problem::Softmax(p) => {
                let shape = Shape::matrix(p.rows, p.cols);
                let prior = Tensor::from_vec(shape.clone(), self.prior.clone())?;
                let input = Tensor::from_vec(shape, x.to_vec())?;
                let expected = softmax_rows(&input, p.alpha, p.beta, Some(&prior))?;
                (out, expected.into_vec())
            }
        };
        Ok(max_relative_error(&actual, &expected))
    }

    /// Applies the entry's epilogue to a dense `[M, N]` accumulator.
    fn fused(&self, acc: &[f32], n: usize) -> Vec<f32> {
        let ds: Vec<Vec<f32>> = self.ds.iter().map(|d| d.to_f32_vec()).collect();
        let broadcast = ds.len() == 1;
        acc.iter()
            .enumerate()
            .map(|(idx, &v)| {
                let at = if broadcast { idx % n } else { idx };
                let d: Vec<f32> = ds.iter().map(|d| d[at]).collect();
                apply_epilogue(self.entry.epilogue, v, &d)
            })
            .collect()
    }
}

fn apply_epilogue(kind: EpilogueKind, acc: f32, ds: &[f32]) -> f32 {
    fn with<E: CElementwise>(op: E, acc: f32, ds: &[f32]) -> f32 {
        let mut y = 0.0;
        op.apply(&mut y, acc, ds);
        y
    }
    match kind {
        EpilogueKind::PassThrough => with(PassThrough, acc, ds),
        EpilogueKind::Scale { alpha } => with(Scale { alpha }, acc, ds),
        EpilogueKind::Relu => with(Relu, acc, ds),
        EpilogueKind::FastGelu => with(FastGelu, acc, ds),
        EpilogueKind::AddBias => with(AddBias, acc, ds),
        EpilogueKind::AddRelu => with(AddRelu, acc, ds),
        EpilogueKind::AddAddFastGelu => with(AddAddFastGelu, acc, ds),
    }
}

/// Logical `[M, N]` of the output.
fn output_dims(problem: &Problem) -> (usize, usize) {
    match problem {
        Problem::Gemm(p) => (p.m, p.n),
        Problem::Conv2dFwd(p) => (p.gemm_m(), p.gemm_n()),
        Problem::Softmax(p) => (p.rows, p.cols),
    }
}

fn random<T: Element>(rng: &mut StdRng, len: usize) -> DeviceBuffer<T> {
    let values: Vec<T> = (0..len)
        .map(|_| T::from_f32(rng.random_range(-1.0..1.0f32)))
        .collect();
    DeviceBuffer::from_slice(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemm_engine::EngineConfig;
    use problem_ir::{GemmProblem, SoftmaxProblem};

    fn ready(entry: &ProblemEntry) -> GemmEngine<Ready> {
        let config = EngineConfig {
            tile_preset: "small".into(),
            num_threads: Some(2),
            ..EngineConfig::default()
        };
        GemmEngine::new(config)
            .and_then(|e| e.plan(entry))
            .and_then(|e| e.prepare())
            .unwrap()
    }

    #[test]
    fn test_gemm_with_bias_verifies() {
        let entry = ProblemEntry {
            epilogue: EpilogueKind::AddRelu,
            ..ProblemEntry::new("fc", Problem::Gemm(GemmProblem::new(32, 32, 16)))
        };
        let outcome = launch_once(&ready(&entry), &entry, 7, true).unwrap();
        assert_eq!(outcome.passed(DType::F32), Some(true));
    }

    #[test]
    fn test_softmax_with_prior_verifies() {
        let problem = SoftmaxProblem {
            beta: 0.5,
            ..SoftmaxProblem::new(8, 40)
        };
        let entry = ProblemEntry::new("probs", Problem::Softmax(problem));
        let outcome = launch_once(&ready(&entry), &entry, 3, true).unwrap();
        assert_eq!(outcome.passed(DType::F32), Some(true));
    }

    #[test]
    fn test_unverified_outcome() {
        let entry = ProblemEntry::new("fc", Problem::Gemm(GemmProblem::new(16, 16, 8)));
        let outcome = launch_once(&ready(&entry), &entry, 0, false).unwrap();
        assert_eq!(outcome.max_error, None);
        assert_eq!(outcome.passed(DType::F32), None);
        assert_eq!(outcome.metrics.flops, 2 * 16 * 16 * 8);
    }
}
