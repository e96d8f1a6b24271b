//! # kba-sweep
//!
//! kba-sweep computes and drives the communication schedule for a wavefront
//! (KBA, Koch–Baker–Alcouffe) sweep over a 3-D grid that is decomposed
//! across a 2-D process grid, blocked along z, and swept over eight angular
//! octants.
//!
//! The crate answers, for every global sweep step, three questions:
//! which (octant, z-block) work item is active on a given process, whether
//! that process must send or receive a boundary face before advancing, and
//! which of the rotating face buffers the work touches.
//!
//! ## Structure
//! - [`schedule`]: the step scheduler, the send/receive predicates built on
//!   it, and face-buffer selection. All pure computation, reentrant, safe to
//!   query from any number of threads.
//! - [`sweep`]: a driver that owns the face buffers and performs exactly the
//!   communication the predicates authorize, invoking an external kernel
//!   behind the [`sweep::SweepKernel`] seam.
//! - [`comm`]: a pluggable transport façade (serial, intra-process threads,
//!   MPI behind the `mpi-support` feature) with explicit traffic accounting.
//! - [`grid`], [`octant`]: the process-grid view and octant geometry the
//!   scheduler reasons over.
//!
//! ## Determinism
//! Step resolution is a pure function of immutable configuration and the
//! query tuple; repeated queries always agree, and the schedule audit
//! (`StepScheduler::validate_schedule`) verifies that every (octant,
//! z-block) pair is named by exactly one step.

pub mod comm;
pub mod grid;
pub mod octant;
pub mod schedule;
pub mod sweep;
pub mod sweep_error;

/// A convenient prelude importing the most-used traits and types.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, TallyComm, ThreadComm, Wait};
    pub use crate::grid::ProcGrid;
    pub use crate::octant::{Axis, Dir, NOCTANT, OCTANT_TRAVERSAL, Octant};
    pub use crate::schedule::{
        CommKind, CommOp, FaceBuffers, FaceDims, FaceRotation, StepInfo, StepScheduler,
    };
    pub use crate::sweep::{SweepConfig, SweepKernel, Sweeper};
    pub use crate::sweep_error::SweepError;
}
