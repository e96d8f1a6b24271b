//! Communication predicates built on step resolution.
//!
//! A face computed at `step` is consumed by a neighbor at `step + 1`. The
//! predicates align that hand-off with wavefront geometry: a face is only
//! worth forwarding if the *same* (octant, z-block) quantity continues into
//! the neighbor at the next step, moving in the queried direction. Both
//! predicates are pure functions of configuration and topology; the caller
//! owns the actual transport.

use crate::grid::ProcGrid;
use crate::octant::{Axis, Dir};
use crate::schedule::scheduler::StepScheduler;
use itertools::iproduct;

/// Whether a planned operation is an outbound send or an inbound receive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommKind {
    Send,
    Recv,
}

/// One face exchange required to prepare `step + 1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommOp {
    pub kind: CommKind,
    pub axis: Axis,
    pub dir: Dir,
    pub octant_in_block: i32,
}

fn axis_incs(axis: Axis, dir: Dir) -> (i32, i32) {
    match axis {
        Axis::X => (dir.sign(), 0),
        Axis::Y => (0, dir.sign()),
    }
}

impl StepScheduler {
    /// Whether this process must send a face computed at `step` to its
    /// `(axis, dir)` neighbor for use at `step + 1`.
    pub fn must_send(
        &self,
        step: i32,
        axis: Axis,
        dir: Dir,
        octant_in_block: i32,
        grid: &ProcGrid,
    ) -> bool {
        let (proc_x, proc_y) = (grid.proc_x(), grid.proc_y());
        let (inc_x, inc_y) = axis_incs(axis, dir);

        let source = self.step_info(step, octant_in_block, proc_x, proc_y);
        let target = self.step_info(step + 1, octant_in_block, proc_x + inc_x, proc_y + inc_y);

        match (source, target) {
            (Some(s), Some(t)) => {
                s.octant == t.octant && s.block_z == t.block_z && t.octant.dir_along(axis) == dir
            }
            _ => false,
        }
    }

    /// Whether this process must receive a face computed at `step` by its
    /// opposite `(axis, dir)` neighbor, for its own use at `step + 1`.
    pub fn must_recv(
        &self,
        step: i32,
        axis: Axis,
        dir: Dir,
        octant_in_block: i32,
        grid: &ProcGrid,
    ) -> bool {
        let (proc_x, proc_y) = (grid.proc_x(), grid.proc_y());
        let (inc_x, inc_y) = axis_incs(axis, dir);

        let source = self.step_info(step, octant_in_block, proc_x - inc_x, proc_y - inc_y);
        let target = self.step_info(step + 1, octant_in_block, proc_x, proc_y);

        match (source, target) {
            (Some(s), Some(t)) => {
                s.octant == t.octant && s.block_z == t.block_z && t.octant.dir_along(axis) == dir
            }
            _ => false,
        }
    }

    /// Enumerates every send and receive this process must perform after
    /// computing `step`, over both axes, both directions, and all
    /// octant-in-block slots.
    pub fn face_exchanges<'a>(
        &'a self,
        step: i32,
        grid: &'a ProcGrid,
    ) -> impl Iterator<Item = CommOp> + 'a {
        iproduct!(
            [CommKind::Send, CommKind::Recv],
            Axis::ALL,
            [Dir::Up, Dir::Dn],
            0..self.noctant_per_block()
        )
        .filter_map(move |(kind, axis, dir, octant_in_block)| {
            let required = match kind {
                CommKind::Send => self.must_send(step, axis, dir, octant_in_block, grid),
                CommKind::Recv => self.must_recv(step, axis, dir, octant_in_block, grid),
            };
            required.then_some(CommOp {
                kind,
                axis,
                dir,
                octant_in_block,
            })
        })
    }
}
