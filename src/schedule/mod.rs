//! KBA step scheduling: step counts, per-step work resolution, the
//! communication predicates built on them, and face-buffer selection.

pub mod comm_plan;
pub mod faces;
pub mod scheduler;

pub use comm_plan::{CommKind, CommOp};
pub use faces::{FaceBuffers, FaceDims, FaceRotation};
pub use scheduler::{StepInfo, StepScheduler};
