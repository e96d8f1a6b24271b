//! SweepError: unified error type for kba-sweep public APIs.
//!
//! Configuration errors are fatal in the sense of the scheduling contract:
//! a constructor returns `Err` and no partially built value escapes.
//! Inactive step tuples and no-op communication decisions are ordinary
//! results, not errors.

use thiserror::Error;

/// Unified error type for sweep scheduling and face communication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// The z-extent blocking factor must be positive.
    #[error("z blocking factor must be positive, got {0}")]
    InvalidZBlocking(i32),
    /// Octant blocking factor outside the supported set.
    #[error("octant blocking factor must be one of 1, 2, 4, 8, got {0}")]
    InvalidOctantBlocking(i32),
    /// Process-grid extents must both be positive.
    #[error("process grid extents must be positive, got {nproc_x}x{nproc_y}")]
    InvalidGridExtent { nproc_x: i32, nproc_y: i32 },
    /// A process coordinate fell outside the grid it was constructed for.
    #[error("process ({proc_x},{proc_y}) lies outside the {nproc_x}x{nproc_y} grid")]
    ProcOutsideGrid {
        proc_x: i32,
        proc_y: i32,
        nproc_x: i32,
        nproc_y: i32,
    },
    /// Schedule audit: the same (octant, z-block) was named by two steps.
    #[error("schedule collision: octant {octant} block {block_z} revisited at step {step}")]
    ScheduleCollision { octant: u8, block_z: i32, step: i32 },
    /// Schedule audit: an (octant, z-block) pair was never scheduled.
    #[error("schedule gap: octant {octant} block {block_z} never scheduled")]
    ScheduleGap { octant: u8, block_z: i32 },
    /// A received face payload did not match the expected byte length.
    #[error("face payload of {got} bytes where {expected} expected")]
    FaceSizeMismatch { expected: usize, got: usize },
    /// Failure reported by the external sweep kernel.
    #[error("sweep kernel failure: {0}")]
    Kernel(String),
}
