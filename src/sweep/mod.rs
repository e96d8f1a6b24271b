//! The sweep driver: owns the face buffers, drives steps in increasing
//! order, and performs exactly the sends and receives the scheduling
//! predicates authorize.
//!
//! The physical kernel is a collaborator behind [`SweepKernel`]; this module
//! decides *when* it runs and *with which buffers*, never what it computes.

use crate::comm::{CommTag, Communicator, Wait};
use crate::grid::ProcGrid;
use crate::schedule::comm_plan::{CommKind, CommOp};
use crate::schedule::faces::{FaceBuffers, FaceDims};
use crate::schedule::scheduler::{StepInfo, StepScheduler};
use crate::sweep_error::SweepError;
use bytemuck::Pod;

/// External sweep kernel: updates the angular flux for one block, reading
/// and writing the selected face sections for its octant-in-block slot.
pub trait SweepKernel<P> {
    fn sweep_block(
        &mut self,
        step: i32,
        info: &StepInfo,
        octant_in_block: i32,
        facexy: &mut [P],
        facexz: &mut [P],
        faceyz: &mut [P],
    ) -> Result<(), SweepError>;
}

/// Construction-time sweeper configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SweepConfig {
    /// Number of z-blocks the local z-extent is divided into.
    pub nblock_z: i32,
    /// Number of sequential octant blocks (1, 2, 4, or 8).
    pub octant_block_count: i32,
    /// Per-octant face extents.
    pub face_dims: FaceDims,
    /// Whether face communication overlaps compute (enables the
    /// triple-buffer rotation).
    pub comm_async: bool,
}

/// Drives a KBA sweep on one process.
pub struct Sweeper<P, C: Communicator> {
    scheduler: StepScheduler,
    grid: ProcGrid,
    faces: FaceBuffers<P>,
    comm: C,
    pending_send: Vec<C::SendHandle>,
    pending_recv: Vec<(CommOp, C::RecvHandle)>,
}

impl<P: Pod, C: Communicator> Sweeper<P, C> {
    /// Builds a sweeper; fatal configuration errors surface here and leave
    /// nothing half-constructed.
    pub fn new(config: &SweepConfig, grid: ProcGrid, comm: C) -> Result<Self, SweepError> {
        let scheduler = StepScheduler::new(config.nblock_z, config.octant_block_count, &grid)?;
        let faces = FaceBuffers::new(
            config.face_dims,
            scheduler.noctant_per_block() as usize,
            config.comm_async,
        );
        Ok(Sweeper {
            scheduler,
            grid,
            faces,
            comm,
            pending_send: Vec::new(),
            pending_recv: Vec::new(),
        })
    }

    #[inline]
    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn grid(&self) -> &ProcGrid {
        &self.grid
    }

    #[inline]
    pub fn faces(&self) -> &FaceBuffers<P> {
        &self.faces
    }

    fn peer_rank(&self, op: &CommOp) -> Result<usize, SweepError> {
        // Sends target the downstream neighbor, receives name the upstream
        // one; the predicates only fire when that neighbor is in-grid.
        let dir = match op.kind {
            CommKind::Send => op.dir,
            CommKind::Recv => op.dir.opposite(),
        };
        let (x, y) = self.grid.neighbor(op.axis, dir);
        self.grid
            .rank_at(x, y)
            .ok_or(SweepError::ProcOutsideGrid {
                proc_x: x,
                proc_y: y,
                nproc_x: self.grid.nproc_x(),
                nproc_y: self.grid.nproc_y(),
            })
    }

    /// Posts the sends for faces computed at `step`, used at `step + 1`.
    fn send_faces_start(&mut self, step: i32) -> Result<(), SweepError> {
        let ops: Vec<CommOp> = self
            .scheduler
            .face_exchanges(step, &self.grid)
            .filter(|op| op.kind == CommKind::Send)
            .collect();
        for op in ops {
            let peer = self.peer_rank(&op)?;
            let tag = CommTag::face(op.axis, op.dir, op.octant_in_block, step + 1);
            let payload =
                self.faces
                    .exchange_section(op.axis, step, op.octant_in_block as usize);
            log::trace!(
                "step {step}: send {:?} {:?} oib {} -> rank {peer}",
                op.axis,
                op.dir,
                op.octant_in_block
            );
            let handle = self.comm.isend(peer, tag, bytemuck::cast_slice(payload));
            self.pending_send.push(handle);
        }
        Ok(())
    }

    /// Completes the sends posted for `step`.
    fn send_faces_end(&mut self, _step: i32) {
        for handle in self.pending_send.drain(..) {
            let _ = handle.wait();
        }
    }

    /// Posts the receives for faces this process consumes at `step + 1`.
    fn recv_faces_start(&mut self, step: i32) -> Result<(), SweepError> {
        let ops: Vec<CommOp> = self
            .scheduler
            .face_exchanges(step, &self.grid)
            .filter(|op| op.kind == CommKind::Recv)
            .collect();
        for op in ops {
            let peer = self.peer_rank(&op)?;
            let tag = CommTag::face(op.axis, op.dir, op.octant_in_block, step + 1);
            let nbytes =
                self.faces.dims().exchange_cells(op.axis) * std::mem::size_of::<P>();
            let mut scratch = vec![0u8; nbytes];
            log::trace!(
                "step {step}: recv {:?} {:?} oib {} <- rank {peer}",
                op.axis,
                op.dir,
                op.octant_in_block
            );
            let handle = self.comm.irecv(peer, tag, &mut scratch);
            self.pending_recv.push((op, handle));
        }
        Ok(())
    }

    /// Completes the receives posted at `step`, landing each payload in the
    /// face slot selected for `step + 1`.
    fn recv_faces_end(&mut self, step: i32) -> Result<(), SweepError> {
        for (op, handle) in self.pending_recv.drain(..) {
            let Some(bytes) = handle.wait() else {
                continue;
            };
            let section =
                self.faces
                    .exchange_section_mut(op.axis, step + 1, op.octant_in_block as usize);
            // Cast the destination, not the source: the received byte vector
            // carries no alignment guarantee for P.
            let dst: &mut [u8] = bytemuck::cast_slice_mut(section);
            if bytes.len() != dst.len() {
                return Err(SweepError::FaceSizeMismatch {
                    expected: dst.len(),
                    got: bytes.len(),
                });
            }
            dst.copy_from_slice(&bytes);
        }
        Ok(())
    }

    /// Runs the kernel for every octant-in-block slot active at `step`.
    fn compute_step<K: SweepKernel<P>>(
        &mut self,
        step: i32,
        kernel: &mut K,
    ) -> Result<(), SweepError> {
        let scheduler = &self.scheduler;
        let (proc_x, proc_y) = (self.grid.proc_x(), self.grid.proc_y());
        let dims = self.faces.dims();
        let (facexy, facexz, faceyz) = self.faces.step_faces_mut(step);
        for oib in 0..scheduler.noctant_per_block() {
            let Some(info) = scheduler.step_info(step, oib, proc_x, proc_y) else {
                continue;
            };
            let sect = |cells: usize| cells * oib as usize..cells * (oib as usize + 1);
            kernel.sweep_block(
                step,
                &info,
                oib,
                &mut facexy[sect(dims.cells_xy)],
                &mut facexz[sect(dims.cells_xz)],
                &mut faceyz[sect(dims.cells_yz)],
            )?;
        }
        Ok(())
    }

    /// Performs one full sweep: all steps in increasing order, with the
    /// communication each step's predicates authorize.
    ///
    /// Receives posted while computing `step` complete before `step + 1`
    /// consumes them; sends for `step` are issued only after its faces are
    /// produced. The face rotation bounds pipelining to one step of
    /// lookahead per orientation.
    pub fn sweep<K: SweepKernel<P>>(&mut self, kernel: &mut K) -> Result<(), SweepError> {
        let nstep = self.scheduler.nstep();
        log::debug!(
            "sweeping {nstep} steps on rank {} of {}",
            self.grid.rank(),
            self.grid.nproc()
        );
        for step in 0..nstep {
            if step > 0 {
                self.recv_faces_end(step - 1)?;
                self.send_faces_end(step - 1);
            }
            self.compute_step(step, kernel)?;
            self.send_faces_start(step)?;
            self.recv_faces_start(step)?;
        }
        // The last step never authorizes traffic into step nstep, but drain
        // defensively so no handle outlives the sweep.
        self.recv_faces_end(nstep - 1)?;
        self.send_faces_end(nstep - 1);
        Ok(())
    }
}
