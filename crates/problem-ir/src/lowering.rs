// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lowering of problems to the grid descriptors a GEMM launch walks.
//!
//! Every GEMM-shaped problem becomes three descriptors:
//!
//! ```text
//!  A  [M, K]  ──Pad(M), Pad(K)──►  [Mp, Kp]  ──Unmerge(K)──►  [KBatch, K0, M, K1]
//!  B  [N, K]  ──Pad(N), Pad(K)──►  [Np, Kp]  ──Unmerge(K)──►  [KBatch, K0, N, K1]
//!  C  [M, N]  ──Pad(M), Pad(N)──►  [Mp, Np]
//! ```
//!
//! With [`GemmSpecialization::Default`] no padding is applied and the
//! launch's validity check rejects extents that do not divide the tile.
//! A convolution reaches the same shape through its input view
//! (Pad + Embed + Merge over the NHWC image).

use crate::{Conv2dFwdProblem, GemmProblem, GemmSpecialization, ProblemError};
use tensor_desc::{
    make_naive_descriptor, make_naive_descriptor_packed, Index, TensorDescriptor, Transform,
};
use tile_planner::TileConfig;

/// Grid descriptors of one GEMM launch.
#[derive(Debug, Clone)]
pub struct GemmDescriptors {
    /// `[KBatch, K0, M, K1]`.
    pub a: TensorDescriptor,
    /// `[KBatch, K0, N, K1]`.
    pub b: TensorDescriptor,
    /// `[M, N]`.
    pub c: TensorDescriptor,
    /// Logical extents before padding.
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub m_padded: usize,
    pub n_padded: usize,
    pub k_padded: usize,
    pub k_batch: usize,
}

impl GemmDescriptors {
    /// `K0` of the A and B grids.
    pub fn k0(&self) -> usize {
        self.a.length(1)
    }

    /// Padded reduction length each split-K batch walks.
    pub fn k_per_batch(&self) -> usize {
        self.k_padded / self.k_batch
    }

    pub fn summary(&self) -> String {
        format!(
            "A {:?}, B {:?}, C {:?} (logical {}×{}×{}, k-batch {})",
            self.a.lengths(),
            self.b.lengths(),
            self.c.lengths(),
            self.m,
            self.n,
            self.k,
            self.k_batch
        )
    }
}

/// Lowers a GEMM for the given tile.
pub fn lower_gemm(
    problem: &GemmProblem,
    tile: &TileConfig,
    specialization: GemmSpecialization,
    k_batch: usize,
) -> Result<GemmDescriptors, ProblemError> {
    problem.validate()?;
    let [sam, sak] = problem.a_strides();
    let [sbk, sbn] = problem.b_strides();
    let a_mk = make_naive_descriptor(&[problem.m, problem.k], &[sam, sak])?;
    let b_nk = make_naive_descriptor(&[problem.n, problem.k], &[sbn, sbk])?;
    let c_mn = make_naive_descriptor(&[problem.m, problem.n], &[problem.ldc(), 1])?;
    lower_operands(a_mk, b_nk, c_mn, tile, specialization, k_batch)
}

/// Lowers a forward convolution to an implicit GEMM for the given tile.
pub fn lower_conv2d_fwd(
    problem: &Conv2dFwdProblem,
    tile: &TileConfig,
    specialization: GemmSpecialization,
    k_batch: usize,
) -> Result<GemmDescriptors, ProblemError> {
    problem.validate()?;
    let a_mk = conv_input_view(problem)?;
    let b_nk = make_naive_descriptor_packed(&[problem.gemm_n(), problem.gemm_k()])?;
    let c_mn = make_naive_descriptor_packed(&[problem.gemm_m(), problem.gemm_n()])?;
    lower_operands(a_mk, b_nk, c_mn, tile, specialization, k_batch)
}

/// The NHWC input image seen as the `[N·Ho·Wo, Y·X·C]` A matrix.
pub fn conv_input_view(problem: &Conv2dFwdProblem) -> Result<TensorDescriptor, ProblemError> {
    let g = &problem.geometry;
    let (ho, wo) = (g.ho(), g.wo());
    let hip = g.hi + g.left_pad[0] + g.right_pad[0];
    let wip = g.wi + g.left_pad[1] + g.right_pad[1];
    let desc = make_naive_descriptor_packed(&[g.n, g.hi, g.wi, g.c])?
        .transform(
            vec![
                Transform::pass_through(g.n),
                Transform::pad(g.hi, g.left_pad[0], g.right_pad[0]),
                Transform::pad(g.wi, g.left_pad[1], g.right_pad[1]),
                Transform::pass_through(g.c),
            ],
            vec![vec![0], vec![1], vec![2], vec![3]],
            vec![vec![0], vec![1], vec![2], vec![3]],
        )?;
    debug_assert_eq!(desc.lengths(), vec![g.n, hip, wip, g.c]);
    let desc = desc
        .transform(
            vec![
                Transform::pass_through(g.n),
                Transform::embed(&[g.y, ho], &[g.dilation[0] as Index, g.stride[0] as Index])?,
                Transform::embed(&[g.x, wo], &[g.dilation[1] as Index, g.stride[1] as Index])?,
                Transform::pass_through(g.c),
            ],
            vec![vec![0], vec![1], vec![2], vec![3]],
            vec![vec![0], vec![1, 2], vec![3, 4], vec![5]],
        )?
        .transform(
            vec![
                Transform::merge(&[g.n, ho, wo])?,
                Transform::merge(&[g.y, g.x, g.c])?,
            ],
            vec![vec![0, 2, 4], vec![1, 3, 5]],
            vec![vec![0], vec![1]],
        )?;
    Ok(desc)
}

/// A `D` input of the epilogue, `[M, N]` with the given strides, padded
/// like C. A zero stride broadcasts (e.g. `[0, 1]` for a bias along N).
pub fn make_d_descriptor(
    descs: &GemmDescriptors,
    strides: [usize; 2],
) -> Result<TensorDescriptor, ProblemError> {
    let d = make_naive_descriptor(&[descs.m, descs.n], &strides)?;
    Ok(pad_2d(d, descs.m_padded, descs.n_padded)?)
}

fn lower_operands(
    a_mk: TensorDescriptor,
    b_nk: TensorDescriptor,
    c_mn: TensorDescriptor,
    tile: &TileConfig,
    specialization: GemmSpecialization,
    k_batch: usize,
) -> Result<GemmDescriptors, ProblemError> {
    let (m, k) = (a_mk.length(0), a_mk.length(1));
    let n = b_nk.length(0);
    if k_batch == 0 {
        return Err(ProblemError::Unsupported("k_batch must be at least 1".into()));
    }

    let (m_padded, n_padded, k_padded) = match specialization {
        GemmSpecialization::Default => {
            let split = k_batch * tile.k1;
            if k % split != 0 {
                return Err(ProblemError::Unsupported(format!(
                    "K={k} does not split into {k_batch} batches of K1={} without padding",
                    tile.k1
                )));
            }
            (m, n, k)
        }
        GemmSpecialization::MnkPadding => (
            m.next_multiple_of(tile.m_per_block),
            n.next_multiple_of(tile.n_per_block),
            k.next_multiple_of(k_batch * tile.k_per_block()),
        ),
    };

    let a = split_k(pad_2d(a_mk, m_padded, k_padded)?, k_batch, tile.k1)?;
    let b = split_k(pad_2d(b_nk, n_padded, k_padded)?, k_batch, tile.k1)?;
    let c = pad_2d(c_mn, m_padded, n_padded)?;

    let descs = GemmDescriptors {
        a,
        b,
        c,
        m,
        n,
        k,
        m_padded,
        n_padded,
        k_padded,
        k_batch,
    };
    tracing::debug!("lowered ({specialization}): {}", descs.summary());
    Ok(descs)
}

/// Right-pads both dimensions of a 2-D descriptor. A no-op when nothing
/// needs padding, so unpadded descriptors stay always-valid.
fn pad_2d(
    desc: TensorDescriptor,
    rows: usize,
    cols: usize,
) -> Result<TensorDescriptor, tensor_desc::DescriptorError> {
    let (r, c) = (desc.length(0), desc.length(1));
    if r == rows && c == cols {
        return Ok(desc);
    }
    desc.transform(
        vec![Transform::right_pad(r, rows - r), Transform::right_pad(c, cols - c)],
        vec![vec![0], vec![1]],
        vec![vec![0], vec![1]],
    )
}

/// `[X, K]` → `[KBatch, K0, X, K1]`.
fn split_k(
    desc: TensorDescriptor,
    k_batch: usize,
    k1: usize,
) -> Result<TensorDescriptor, tensor_desc::DescriptorError> {
    let (x, k) = (desc.length(0), desc.length(1));
    let k0 = k / (k_batch * k1);
    desc.transform(
        vec![Transform::pass_through(x), Transform::unmerge(&[k_batch, k0, k1])?],
        vec![vec![0], vec![1]],
        vec![vec![2], vec![0, 1, 3]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layout;
    use tensor_core::Conv2dGeometry;
    use tile_planner::{check_validity, RowMajor, TileGrid};

    fn tile() -> TileConfig {
        TileConfig::default()
    }

    fn at(desc: &TensorDescriptor, idx: &[usize]) -> (Index, bool) {
        let o = desc.offset(idx).unwrap();
        (o.offset, o.valid)
    }

    #[test]
    fn test_row_major_grids() {
        let p = GemmProblem::new(128, 96, 256);
        let d = lower_gemm(&p, &tile(), GemmSpecialization::Default, 1).unwrap();
        assert_eq!(d.a.lengths(), vec![1, 64, 128, 4]);
        assert_eq!(d.b.lengths(), vec![1, 64, 96, 4]);
        assert_eq!(d.c.lengths(), vec![128, 96]);
        assert!(d.a.is_always_valid());
        // A[m = 5, k = 4·10 + 3]
        assert_eq!(at(&d.a, &[0, 10, 5, 3]), (5 * 256 + 43, true));
        // B is KN: B[k = 43, n = 7]
        assert_eq!(at(&d.b, &[0, 10, 7, 3]), (43 * 96 + 7, true));
        assert_eq!(d.k_per_batch(), 256);
    }

    #[test]
    fn test_column_major_and_strides() {
        let p = GemmProblem::new(64, 64, 32)
            .with_layouts(Layout::ColumnMajor, Layout::ColumnMajor)
            .with_strides(80, 40, 72);
        let d = lower_gemm(&p, &tile(), GemmSpecialization::Default, 1).unwrap();
        assert_eq!(at(&d.a, &[0, 2, 5, 1]).0, p.a_index(5, 9) as Index);
        assert_eq!(at(&d.b, &[0, 2, 7, 1]).0, p.b_index(9, 7) as Index);
        assert_eq!(at(&d.c, &[3, 4]).0, 3 * 72 + 4);
    }

    #[test]
    fn test_split_k_grids() {
        let p = GemmProblem::new(64, 64, 256);
        let d = lower_gemm(&p, &tile(), GemmSpecialization::Default, 4).unwrap();
        assert_eq!(d.a.lengths(), vec![4, 16, 64, 4]);
        assert_eq!(d.k_per_batch(), 64);
        // batch 2, k0 3, k1 1 → k = 2·64 + 3·4 + 1
        assert_eq!(at(&d.a, &[2, 3, 9, 1]).0, 9 * 256 + 141);
    }

    #[test]
    fn test_padding_flags_out_of_range() {
        let p = GemmProblem::new(70, 50, 100);
        let d = lower_gemm(&p, &tile(), GemmSpecialization::MnkPadding, 1).unwrap();
        assert_eq!((d.m_padded, d.n_padded, d.k_padded), (128, 64, 112));
        assert_eq!(d.k0(), 28);
        assert!(!d.a.is_always_valid());
        assert_eq!(at(&d.a, &[0, 24, 69, 3]), (69 * 100 + 99, true));
        assert!(!at(&d.a, &[0, 25, 69, 0]).1, "k = 100 is padding");
        assert!(!at(&d.a, &[0, 0, 70, 0]).1, "m = 70 is padding");
        assert!(!at(&d.c, &[10, 50]).1);
        assert!(at(&d.c, &[69, 49]).1);
    }

    #[test]
    fn test_default_rejects_ragged_k1() {
        let p = GemmProblem::new(64, 64, 30);
        assert!(matches!(
            lower_gemm(&p, &tile(), GemmSpecialization::Default, 1),
            Err(ProblemError::Unsupported(_))
        ));
    }

    #[test]
    fn test_default_ragged_m_fails_validity() {
        let p = GemmProblem::new(70, 64, 64);
        let t = tile();
        let d = lower_gemm(&p, &t, GemmSpecialization::Default, 1).unwrap();
        let order = RowMajor::new(TileGrid::covering(1, 70, 64, 64, 64)).unwrap();
        assert!(check_validity(&d.a, &d.b, &d.c, &t, &order).is_err());

        let padded = lower_gemm(&p, &t, GemmSpecialization::MnkPadding, 1).unwrap();
        check_validity(&padded.a, &padded.b, &padded.c, &t, &order).unwrap();
    }

    #[test]
    fn test_bias_descriptor_broadcasts() {
        let p = GemmProblem::new(70, 50, 100);
        let d = lower_gemm(&p, &tile(), GemmSpecialization::MnkPadding, 1).unwrap();
        let bias = make_d_descriptor(&d, [0, 1]).unwrap();
        assert_eq!(bias.lengths(), vec![128, 64]);
        assert_eq!(at(&bias, &[0, 7]), (7, true));
        assert_eq!(at(&bias, &[42, 7]), (7, true));
        assert!(!at(&bias, &[42, 60]).1);
    }

    #[test]
    fn test_conv_lowering_matches_direct_indexing() {
        let g = Conv2dGeometry {
            n: 2,
            c: 3,
            hi: 6,
            wi: 5,
            k: 4,
            y: 3,
            x: 2,
            stride: [2, 1],
            dilation: [1, 2],
            left_pad: [1, 1],
            right_pad: [1, 0],
        };
        let problem = Conv2dFwdProblem::new(g.clone());
        let t = TileConfig::preset("small").unwrap();
        let d = lower_conv2d_fwd(&problem, &t, GemmSpecialization::MnkPadding, 1).unwrap();
        let (ho, wo) = (g.ho(), g.wo());
        assert_eq!(d.m, g.n * ho * wo);
        assert_eq!(d.k, g.y * g.x * g.c);

        for gm in 0..d.m_padded {
            for gk in 0..d.k_padded {
                let idx = [0, gk / t.k1, gm, gk % t.k1];
                let (offset, valid) = at(&d.a, &idx);
                if gm >= d.m || gk >= d.k {
                    assert!(!valid, "m={gm} k={gk} is padding");
                    continue;
                }
                let (n, oh, ow) = (gm / (ho * wo), (gm / wo) % ho, gm % wo);
                let (fy, fx, c) = (gk / (g.x * g.c), (gk / g.c) % g.x, gk % g.c);
                let ih = (oh * g.stride[0] + fy * g.dilation[0]) as Index - g.left_pad[0] as Index;
                let iw = (ow * g.stride[1] + fx * g.dilation[1]) as Index - g.left_pad[1] as Index;
                let inside = (0..g.hi as Index).contains(&ih) && (0..g.wi as Index).contains(&iw);
                assert_eq!(valid, inside, "m={gm} k={gk}");
                if inside {
                    let expected = ((n as Index * g.hi as Index + ih) * g.wi as Index + iw)
                        * g.c as Index
                        + c as Index;
                    assert_eq!(offset, expected, "m={gm} k={gk}");
                }
            }
        }
        // Weights are KYXC: B[gk, kout] at kout·YXC + gk.
        assert_eq!(at(&d.b, &[0, 1, 3, 2]).0, (3 * d.k + 6) as Index);
    }
}
