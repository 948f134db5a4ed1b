// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The output stage: fused elementwise operators and global writes.
//!
//! Every C element passes through a [`CElementwise`] operator together with
//! the matching elements of the `D` inputs, then reaches global memory
//! through the launch's [`WritePolicy`]. Elements that fall into padding
//! are never written.

use crate::EngineError;
use tensor_core::{CElementwise, DType, DeviceBuffer, Element};
use tensor_desc::{
    coordinate_has_valid_offset, make_coordinate, make_coordinate_step, move_coordinate,
    reset_coordinate, CoordinateStep, TensorCoordinate, TensorDescriptor,
};

/// Most `D` inputs an operator may consume.
pub const MAX_D: usize = 4;

/// How a computed element reaches global memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Overwrite. Relaunching produces the same output.
    #[default]
    Set,
    /// Add into the existing value. Split-K partial sums combine this way.
    AtomicAdd,
}

impl WritePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            WritePolicy::Set => "set",
            WritePolicy::AtomicAdd => "atomic-add",
        }
    }
}

/// The `[M, N]` grid a launch writes.
#[derive(Debug)]
pub struct GridOutput<'a, T: Element> {
    desc: &'a TensorDescriptor,
    buf: &'a DeviceBuffer<T>,
    policy: WritePolicy,
}

impl<'a, T: Element> GridOutput<'a, T> {
    /// Checks that the buffer covers the descriptor and that the policy
    /// suits the element type.
    pub fn new(
        desc: &'a TensorDescriptor,
        buf: &'a DeviceBuffer<T>,
        policy: WritePolicy,
    ) -> Result<Self, EngineError> {
        check_covers("C", desc, buf)?;
        if policy == WritePolicy::AtomicAdd && T::DTYPE != DType::F32 {
            return Err(EngineError::UnsupportedArgument(format!(
                "atomic-add output requires f32, got {}",
                T::DTYPE
            )));
        }
        Ok(Self { desc, buf, policy })
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    #[inline]
    fn commit(&self, offset: usize, value: f32) {
        match self.policy {
            WritePolicy::Set => self.buf.store(offset, T::from_f32(value)),
            WritePolicy::AtomicAdd => self.buf.atomic_add(offset, value),
        }
    }
}

/// A `D` input of the epilogue, indexed like C.
#[derive(Debug)]
pub struct GridInput<'a, T: Element> {
    desc: &'a TensorDescriptor,
    buf: &'a DeviceBuffer<T>,
}

impl<'a, T: Element> GridInput<'a, T> {
    pub fn new(desc: &'a TensorDescriptor, buf: &'a DeviceBuffer<T>) -> Result<Self, EngineError> {
        check_covers("D", desc, buf)?;
        Ok(Self { desc, buf })
    }
}

pub(crate) fn check_covers<T: Element>(
    operand: &'static str,
    desc: &TensorDescriptor,
    buf: &DeviceBuffer<T>,
) -> Result<(), EngineError> {
    if buf.len() < desc.element_space_size() {
        return Err(EngineError::BufferTooSmall {
            operand,
            required: desc.element_space_size(),
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Unit steps of a snake walk over a 2-D tile.
#[derive(Debug, Clone)]
struct TileWalk {
    right: CoordinateStep,
    left: CoordinateStep,
    down: CoordinateStep,
}

impl TileWalk {
    fn new(desc: &TensorDescriptor) -> Result<Self, EngineError> {
        Ok(Self {
            right: make_coordinate_step(desc, &[0, 1])?,
            left: make_coordinate_step(desc, &[0, -1])?,
            down: make_coordinate_step(desc, &[1, 0])?,
        })
    }
}

/// Per-thread coordinates of an [`Epilogue`], reused across tiles.
#[derive(Debug)]
pub struct EpilogueCursors {
    c: TensorCoordinate,
    ds: Vec<TensorCoordinate>,
}

/// Writes C tiles through a fused operator.
#[derive(Debug)]
pub struct Epilogue<'a, T: Element, E: CElementwise> {
    op: E,
    output: GridOutput<'a, T>,
    inputs: Vec<GridInput<'a, T>>,
    c_walk: TileWalk,
    d_walks: Vec<TileWalk>,
    rows: usize,
    cols: usize,
}

impl<'a, T: Element, E: CElementwise> Epilogue<'a, T, E> {
    /// Epilogue writing `rows × cols` tiles. `inputs` must supply exactly
    /// the operator's `D` arity.
    pub fn new(
        op: E,
        output: GridOutput<'a, T>,
        inputs: Vec<GridInput<'a, T>>,
        rows: usize,
        cols: usize,
    ) -> Result<Self, EngineError> {
        if inputs.len() != E::NUM_D || E::NUM_D > MAX_D {
            return Err(EngineError::UnsupportedArgument(format!(
                "{} takes {} D inputs, got {}",
                op.name(),
                E::NUM_D,
                inputs.len()
            )));
        }
        let c_lengths = output.desc.lengths();
        if let Some(d) = inputs.iter().find(|d| d.desc.lengths() != c_lengths) {
            return Err(EngineError::UnsupportedArgument(format!(
                "D input {:?} is not shaped like C {c_lengths:?}",
                d.desc.lengths()
            )));
        }
        let c_walk = TileWalk::new(output.desc)?;
        let d_walks = inputs
            .iter()
            .map(|d| TileWalk::new(d.desc))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            op,
            output,
            inputs,
            c_walk,
            d_walks,
            rows,
            cols,
        })
    }

    pub fn op(&self) -> &E {
        &self.op
    }

    pub fn policy(&self) -> WritePolicy {
        self.output.policy()
    }

    /// Fresh cursors at the grid origin.
    pub fn cursors(&self) -> Result<EpilogueCursors, EngineError> {
        Ok(EpilogueCursors {
            c: make_coordinate(self.output.desc, &[0, 0])?,
            ds: self
                .inputs
                .iter()
                .map(|d| make_coordinate(d.desc, &[0, 0]))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Writes the tile at `origin`; `value(row, col)` yields the
    /// accumulator of tile-local element `(row, col)`. Returns the number
    /// of elements written.
    pub fn write_tile(
        &self,
        cursors: &mut EpilogueCursors,
        origin: [usize; 2],
        value: impl Fn(usize, usize) -> f32,
    ) -> Result<usize, EngineError> {
        reset_coordinate(self.output.desc, &mut cursors.c, &origin)?;
        for (d, cursor) in self.inputs.iter().zip(&mut cursors.ds) {
            reset_coordinate(d.desc, cursor, &origin)?;
        }

        let mut ds = [0.0f32; MAX_D];
        let mut written = 0;
        for row in 0..self.rows {
            let forward = row % 2 == 0;
            if row > 0 {
                self.step(cursors, |w| &w.down);
            }
            for i in 0..self.cols {
                let col = if forward { i } else { self.cols - 1 - i };
                if i > 0 {
                    self.step(cursors, |w| if forward { &w.right } else { &w.left });
                }
                if !coordinate_has_valid_offset(self.output.desc, &cursors.c) {
                    continue;
                }
                for ((d, cursor), slot) in self.inputs.iter().zip(&cursors.ds).zip(&mut ds) {
                    *slot = if coordinate_has_valid_offset(d.desc, cursor) {
                        d.buf.load(cursor.offset() as usize).to_f32()
                    } else {
                        0.0
                    };
                }
                let mut y = 0.0;
                self.op.apply(&mut y, value(row, col), &ds[..E::NUM_D]);
                self.output.commit(cursors.c.offset() as usize, y);
                written += 1;
            }
        }
        Ok(written)
    }

    fn step(&self, cursors: &mut EpilogueCursors, pick: impl Fn(&TileWalk) -> &CoordinateStep) {
        move_coordinate(self.output.desc, &mut cursors.c, pick(&self.c_walk));
        for ((d, walk), cursor) in self.inputs.iter().zip(&self.d_walks).zip(&mut cursors.ds) {
            move_coordinate(d.desc, cursor, pick(walk));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{AddRelu, PassThrough, Scale};
    use tensor_desc::{make_naive_descriptor, make_naive_descriptor_packed, Transform};

    /// A 3×5 C padded to 4×8.
    fn padded_c() -> TensorDescriptor {
        make_naive_descriptor_packed(&[3, 5])
            .unwrap()
            .transform(
                vec![Transform::right_pad(3, 1), Transform::right_pad(5, 3)],
                vec![vec![0], vec![1]],
                vec![vec![0], vec![1]],
            )
            .unwrap()
    }

    #[test]
    fn test_padding_is_never_written() {
        let desc = padded_c();
        let c = DeviceBuffer::<f32>::zeroed(15);
        let out = GridOutput::new(&desc, &c, WritePolicy::Set).unwrap();
        let epi = Epilogue::new(PassThrough, out, vec![], 4, 8).unwrap();
        let mut cursors = epi.cursors().unwrap();
        let written = epi
            .write_tile(&mut cursors, [0, 0], |r, col| (r * 10 + col) as f32)
            .unwrap();
        assert_eq!(written, 15);
        let expected: Vec<f32> = (0..3)
            .flat_map(|r| (0..5).map(move |col| (r * 10 + col) as f32))
            .collect();
        assert_eq!(c.to_vec(), expected);
    }

    #[test]
    fn test_set_is_idempotent_atomic_add_accumulates() {
        let desc = make_naive_descriptor_packed(&[2, 4]).unwrap();
        let set_buf = DeviceBuffer::<f32>::zeroed(8);
        let add_buf = DeviceBuffer::<f32>::zeroed(8);
        let set = Epilogue::new(
            Scale { alpha: 2.0 },
            GridOutput::new(&desc, &set_buf, WritePolicy::Set).unwrap(),
            vec![],
            2,
            4,
        )
        .unwrap();
        let add = Epilogue::new(
            Scale { alpha: 2.0 },
            GridOutput::new(&desc, &add_buf, WritePolicy::AtomicAdd).unwrap(),
            vec![],
            2,
            4,
        )
        .unwrap();
        let (mut sc, mut ac) = (set.cursors().unwrap(), add.cursors().unwrap());
        for _ in 0..2 {
            set.write_tile(&mut sc, [0, 0], |r, col| (r + col) as f32).unwrap();
            add.write_tile(&mut ac, [0, 0], |r, col| (r + col) as f32).unwrap();
        }
        assert_eq!(set_buf.to_vec()[5], 4.0);
        assert_eq!(add_buf.to_vec()[5], 8.0);
    }

    #[test]
    fn test_bias_broadcast_with_relu() {
        let desc = make_naive_descriptor_packed(&[2, 3]).unwrap();
        let bias_desc = make_naive_descriptor(&[2, 3], &[0, 1]).unwrap();
        let c = DeviceBuffer::<f32>::zeroed(6);
        let bias = DeviceBuffer::from_slice(&[1.0f32, -10.0, 0.5]);
        let epi = Epilogue::new(
            AddRelu,
            GridOutput::new(&desc, &c, WritePolicy::Set).unwrap(),
            vec![GridInput::new(&bias_desc, &bias).unwrap()],
            2,
            3,
        )
        .unwrap();
        let mut cursors = epi.cursors().unwrap();
        epi.write_tile(&mut cursors, [0, 0], |r, _| r as f32).unwrap();
        assert_eq!(c.to_vec(), vec![1.0, 0.0, 0.5, 2.0, 0.0, 1.5]);
    }

    #[test]
    fn test_arity_is_checked() {
        let desc = make_naive_descriptor_packed(&[2, 2]).unwrap();
        let c = DeviceBuffer::<f32>::zeroed(4);
        let out = GridOutput::new(&desc, &c, WritePolicy::Set).unwrap();
        assert!(matches!(
            Epilogue::new(AddRelu, out, vec![], 2, 2),
            Err(EngineError::UnsupportedArgument(_))
        ));
    }

    #[test]
    fn test_atomic_add_requires_f32() {
        let desc = make_naive_descriptor_packed(&[2, 2]).unwrap();
        let c = DeviceBuffer::<half::f16>::zeroed(4);
        assert!(GridOutput::new(&desc, &c, WritePolicy::AtomicAdd).is_err());
        assert!(GridOutput::new(&desc, &c, WritePolicy::Set).is_ok());
    }

    #[test]
    fn test_short_buffer_rejected() {
        let desc = make_naive_descriptor_packed(&[4, 4]).unwrap();
        let c = DeviceBuffer::<f32>::zeroed(15);
        assert!(matches!(
            GridOutput::new(&desc, &c, WritePolicy::Set),
            Err(EngineError::BufferTooSmall { required: 16, actual: 15, .. })
        ));
    }
}
