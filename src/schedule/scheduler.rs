//! The KBA step scheduler: who works on what, at every global sweep step.
//!
//! A sweep pipelines wavefronts across a 2-D process grid while blocking the
//! local z-extent and, optionally, folding several octants into one traversal
//! block. Given a step number, an octant-in-block slot, and process
//! coordinates, [`StepScheduler::step_info`] resolves the active
//! (octant, z-block) work item, or reports that the tuple names no work.
//!
//! Resolution is a pure function of immutable configuration and the query
//! arguments: no shared state, safe to call concurrently from any number of
//! worker threads.

use crate::grid::ProcGrid;
use crate::octant::{NOCTANT, OCTANT_TRAVERSAL, Octant};
use crate::sweep_error::SweepError;
use itertools::iproduct;

/// Work item resolved for one (step, octant-in-block, process) tuple.
///
/// Absence of work is expressed as `None` from [`StepScheduler::step_info`],
/// not as a sentinel state of this type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StepInfo {
    /// The octant being swept.
    pub octant: Octant,
    /// The z-block being processed, `0..nblock_z`.
    pub block_z: i32,
}

/// Extra pipeline latency contributed by one process-grid axis.
#[derive(Copy, Clone)]
enum Lat {
    None,
    X,
    Y,
}

/// Which folding level elides a traversal window entirely.
#[derive(Copy, Clone)]
enum Fold {
    X,
    Y,
    Z,
}

/// One window of the octant traversal after the initial one.
///
/// The scheduler walks these in order, accumulating a running step base;
/// the last window whose start (base + gate latency for this process) is at
/// or before the queried step wins. Keeping the latency accounting in a
/// table makes the per-axis fill/drain terms auditable on their own.
struct GroupWindow {
    /// Latency added to the running step base ahead of this window, on top
    /// of the `nblock` contributed by every window.
    lead_in: Lat,
    /// Whether the x gate coordinate is the mirrored one.
    gate_mirror_x: bool,
    /// Whether the y gate coordinate is the mirrored one.
    gate_mirror_y: bool,
    /// Folding level at which this window disappears from the traversal.
    elide_when: Fold,
    /// Latency between this window's step base and its wavefront origin.
    wave_lag: Lat,
}

/// Traversal windows for slots 1..8 (slot 0 starts at step base 0 and is
/// always present). Ordering mirrors [`OCTANT_TRAVERSAL`].
const GROUP_WINDOWS: [GroupWindow; NOCTANT - 1] = [
    GroupWindow { lead_in: Lat::None, gate_mirror_x: false, gate_mirror_y: false, elide_when: Fold::Z, wave_lag: Lat::None },
    GroupWindow { lead_in: Lat::None, gate_mirror_x: false, gate_mirror_y: false, elide_when: Fold::Y, wave_lag: Lat::Y },
    GroupWindow { lead_in: Lat::Y, gate_mirror_x: false, gate_mirror_y: true, elide_when: Fold::Y, wave_lag: Lat::None },
    GroupWindow { lead_in: Lat::None, gate_mirror_x: false, gate_mirror_y: true, elide_when: Fold::X, wave_lag: Lat::X },
    GroupWindow { lead_in: Lat::X, gate_mirror_x: true, gate_mirror_y: true, elide_when: Fold::X, wave_lag: Lat::None },
    GroupWindow { lead_in: Lat::None, gate_mirror_x: true, gate_mirror_y: true, elide_when: Fold::X, wave_lag: Lat::Y },
    GroupWindow { lead_in: Lat::Y, gate_mirror_x: true, gate_mirror_y: false, elide_when: Fold::X, wave_lag: Lat::None },
];

/// Immutable KBA schedule configuration for one process grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StepScheduler {
    nblock_z: i32,
    nproc_x: i32,
    nproc_y: i32,
    octant_block_count: i32,
    noctant_per_block: i32,
}

impl StepScheduler {
    /// Constructs a scheduler for `nblock_z` z-blocks and
    /// `octant_block_count` sequential octant blocks on `grid`.
    ///
    /// `octant_block_count` must be 1, 2, 4, or 8; the octants of one block
    /// (`8 / octant_block_count` of them) are processed simultaneously with
    /// mirrored geometry.
    ///
    /// # Errors
    /// `InvalidZBlocking` or `InvalidOctantBlocking` on bad factors; no
    /// partially initialized scheduler is ever returned.
    pub fn new(
        nblock_z: i32,
        octant_block_count: i32,
        grid: &ProcGrid,
    ) -> Result<Self, SweepError> {
        if nblock_z <= 0 {
            return Err(SweepError::InvalidZBlocking(nblock_z));
        }
        if !matches!(octant_block_count, 1 | 2 | 4 | 8) {
            return Err(SweepError::InvalidOctantBlocking(octant_block_count));
        }
        let scheduler = StepScheduler {
            nblock_z,
            nproc_x: grid.nproc_x(),
            nproc_y: grid.nproc_y(),
            octant_block_count,
            noctant_per_block: NOCTANT as i32 / octant_block_count,
        };
        log::debug!(
            "step scheduler: {} z-blocks, {} octant blocks, {}x{} grid, {} steps",
            nblock_z,
            octant_block_count,
            scheduler.nproc_x,
            scheduler.nproc_y,
            scheduler.nstep()
        );
        Ok(scheduler)
    }

    /// Number of z-blocks.
    #[inline]
    pub const fn nblock_z(&self) -> i32 {
        self.nblock_z
    }

    /// Number of block steps a single octant needs in isolation.
    #[inline]
    pub const fn nblock(&self) -> i32 {
        self.nblock_z
    }

    /// Number of sequential octant blocks.
    #[inline]
    pub const fn octant_block_count(&self) -> i32 {
        self.octant_block_count
    }

    /// Octants processed simultaneously within one octant block.
    #[inline]
    pub const fn noctant_per_block(&self) -> i32 {
        self.noctant_per_block
    }

    /// Total number of global sweep steps.
    ///
    /// Each octant block contributes `nblock` steps; the remaining terms are
    /// the pipeline fill/drain latency each grid axis still contributes once
    /// its octant component has not been folded away.
    pub fn nstep(&self) -> i32 {
        let nblock = self.nblock();
        let lat_x = self.nproc_x - 1;
        let lat_y = self.nproc_y - 1;
        match self.octant_block_count {
            8 => 8 * nblock + 2 * lat_x + 3 * lat_y,
            4 => 4 * nblock + lat_x + 2 * lat_y,
            2 => 2 * nblock + lat_x + lat_y,
            1 => nblock + lat_x + lat_y,
            // Validated at construction; anything else is a logic defect.
            other => unreachable!("octant block count {other} escaped validation"),
        }
    }

    #[inline]
    fn latency(&self, lat: Lat) -> i32 {
        match lat {
            Lat::None => 0,
            Lat::X => self.nproc_x - 1,
            Lat::Y => self.nproc_y - 1,
        }
    }

    /// Resolves the work item for `(step, octant_in_block, proc_x, proc_y)`.
    ///
    /// Returns `None` when the tuple names no work: the step is outside
    /// `0..nstep()`, the process lies outside the grid, or the wavefront has
    /// not reached (or has already left) this process.
    ///
    /// # Panics
    /// Panics if `octant_in_block` is outside `0..noctant_per_block()`; that
    /// is a caller defect, not a schedulable query.
    pub fn step_info(
        &self,
        step: i32,
        octant_in_block: i32,
        proc_x: i32,
        proc_y: i32,
    ) -> Option<StepInfo> {
        assert!(
            (0..self.noctant_per_block).contains(&octant_in_block),
            "octant_in_block {octant_in_block} outside 0..{}",
            self.noctant_per_block
        );

        let nblock = self.nblock();
        let (nproc_x, nproc_y) = (self.nproc_x, self.nproc_y);

        let folded_x = self.noctant_per_block >= 2;
        let folded_y = self.noctant_per_block >= 4;
        let folded_z = self.noctant_per_block >= 8;

        // Members of a block other than the first see mirrored geometry,
        // one axis per set bit of their slot index.
        let folded_proc_x = if folded_x && octant_in_block & (1 << 0) != 0 {
            nproc_x - 1 - proc_x
        } else {
            proc_x
        };
        let folded_proc_y = if folded_y && octant_in_block & (1 << 1) != 0 {
            nproc_y - 1 - proc_y
        } else {
            proc_y
        };

        // Search the traversal for the window containing `step`, reasoning
        // about the first member of each octant block only. Slot 0 always
        // matches; later windows overwrite it when their start, offset by
        // this process's position along the wavefront, has been reached.
        let mut slot = 0usize;
        let mut wave = step;
        let mut step_base = 0;
        for (k, w) in GROUP_WINDOWS.iter().enumerate() {
            step_base += nblock + self.latency(w.lead_in);
            let elided = match w.elide_when {
                Fold::X => folded_x,
                Fold::Y => folded_y,
                Fold::Z => folded_z,
            };
            if elided {
                continue;
            }
            let gate_x = if w.gate_mirror_x {
                nproc_x - 1 - folded_proc_x
            } else {
                folded_proc_x
            };
            let gate_y = if w.gate_mirror_y {
                nproc_y - 1 - folded_proc_y
            } else {
                folded_proc_y
            };
            if step >= step_base + gate_x + gate_y {
                slot = k + 1;
                wave = step - (step_base + self.latency(w.wave_lag));
            }
        }

        let lead_octant = Octant::new(OCTANT_TRAVERSAL[slot]);
        let octant_index = lead_octant.index() as i32 + octant_in_block;

        // Convert the wavefront number to a block index via the equation of
        // the wavefront plane, measured from the octant's starting corner.
        let dir_x = lead_octant.dir_x().sign();
        let dir_y = lead_octant.dir_y().sign();
        let dir_z = lead_octant.dir_z().sign();
        let start_x = if dir_x == 1 { 0 } else { nproc_x - 1 };
        let start_y = if dir_y == 1 { 0 } else { nproc_y - 1 };
        let start_z = if dir_z == 1 { 0 } else { nblock - 1 };

        let folded_block = (wave
            - (start_x + folded_proc_x * dir_x)
            - (start_y + folded_proc_y * dir_y)
            - start_z)
            / dir_z;

        let block = if folded_z && octant_in_block & (1 << 2) != 0 {
            nblock - 1 - folded_block
        } else {
            folded_block
        };

        let active = (0..nblock).contains(&block)
            && (0..self.nstep()).contains(&step)
            && (0..nproc_x).contains(&proc_x)
            && (0..nproc_y).contains(&proc_y);

        active.then(|| StepInfo {
            octant: Octant::new(octant_index as u8),
            block_z: block,
        })
    }

    /// Audits completeness and uniqueness of the schedule for one process:
    /// every (octant, z-block) pair must be named by exactly one step.
    ///
    /// The underlying formula is documented to assume no two octants share a
    /// (process, step, block); a violation is surfaced here as an error,
    /// never masked.
    pub fn validate_schedule(&self, proc_x: i32, proc_y: i32) -> Result<(), SweepError> {
        let nblock = self.nblock() as usize;
        let mut seen = vec![false; NOCTANT * nblock];
        for (step, oib) in iproduct!(0..self.nstep(), 0..self.noctant_per_block) {
            if let Some(info) = self.step_info(step, oib, proc_x, proc_y) {
                let idx = info.octant.index() as usize * nblock + info.block_z as usize;
                if seen[idx] {
                    return Err(SweepError::ScheduleCollision {
                        octant: info.octant.index(),
                        block_z: info.block_z,
                        step,
                    });
                }
                seen[idx] = true;
            }
        }
        if let Some(idx) = seen.iter().position(|&s| !s) {
            return Err(SweepError::ScheduleGap {
                octant: (idx / nblock) as u8,
                block_z: (idx % nblock) as i32,
            });
        }
        Ok(())
    }

    /// Audits [`validate_schedule`](Self::validate_schedule) for every
    /// process of the grid in parallel.
    #[cfg(feature = "rayon")]
    pub fn validate_schedule_grid(&self) -> Result<(), SweepError> {
        use rayon::prelude::*;
        (0..self.nproc_x * self.nproc_y)
            .into_par_iter()
            .try_for_each(|rank| {
                self.validate_schedule(rank % self.nproc_x, rank / self.nproc_x)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octant::Dir;

    fn grid(nx: i32, ny: i32) -> ProcGrid {
        ProcGrid::new(nx, ny, 0, 0).unwrap()
    }

    #[test]
    fn rejects_bad_blocking_factors() {
        let g = grid(1, 1);
        assert_eq!(
            StepScheduler::new(0, 8, &g),
            Err(SweepError::InvalidZBlocking(0))
        );
        assert_eq!(
            StepScheduler::new(2, 3, &g),
            Err(SweepError::InvalidOctantBlocking(3))
        );
        assert!(StepScheduler::new(2, 8, &g).is_ok());
    }

    #[test]
    fn single_process_full_serialization_step_count() {
        let g = grid(1, 1);
        for nblock_z in [1, 2, 5] {
            let s = StepScheduler::new(nblock_z, 8, &g).unwrap();
            assert_eq!(s.nstep(), 8 * nblock_z);
        }
    }

    #[test]
    fn step_count_matrix() {
        // 3 z-blocks on a 2x1 grid.
        let g = grid(2, 1);
        let counts: Vec<i32> = [8, 4, 2, 1]
            .iter()
            .map(|&b| StepScheduler::new(3, b, &g).unwrap().nstep())
            .collect();
        assert_eq!(counts, vec![26, 13, 7, 4]);

        // 2 z-blocks on a 3x2 grid.
        let g = grid(3, 2);
        let counts: Vec<i32> = [8, 4, 2, 1]
            .iter()
            .map(|&b| StepScheduler::new(2, b, &g).unwrap().nstep())
            .collect();
        assert_eq!(
            counts,
            vec![16 + 4 + 3, 8 + 2 + 2, 4 + 2 + 1, 2 + 2 + 1]
        );
    }

    #[test]
    fn unfolded_single_proc_visits_octants_in_traversal_order() {
        let g = grid(1, 1);
        let s = StepScheduler::new(1, 8, &g).unwrap();
        for step in 0..8 {
            let info = s.step_info(step, 0, 0, 0).unwrap();
            assert_eq!(info.octant.index(), OCTANT_TRAVERSAL[step as usize]);
            assert_eq!(info.block_z, 0);
        }
    }

    #[test]
    fn fully_folded_single_proc_mirrors_z() {
        let g = grid(1, 1);
        let s = StepScheduler::new(2, 1, &g).unwrap();
        assert_eq!(s.nstep(), 2);
        for oib in 0..8 {
            for step in 0..2 {
                let info = s.step_info(step, oib, 0, 0).unwrap();
                assert_eq!(info.octant.index() as i32, oib);
                let expect = if oib & (1 << 2) != 0 { 1 - step } else { step };
                assert_eq!(info.block_z, expect, "oib {oib} step {step}");
            }
        }
    }

    #[test]
    fn mirrored_member_enters_pipeline_late() {
        // 2x1 grid, pairwise folding: the mirrored member of a block starts
        // from the far end of x, so at step 0 it has no work on process 0.
        let g = grid(2, 1);
        let s = StepScheduler::new(1, 4, &g).unwrap();
        assert!(s.step_info(0, 1, 0, 0).is_none());
        let info = s.step_info(1, 1, 0, 0).unwrap();
        assert_eq!(info.octant.index(), 1);
        assert_eq!(info.block_z, 0);
    }

    #[test]
    fn out_of_range_queries_are_inactive() {
        let g = grid(2, 2);
        let s = StepScheduler::new(3, 8, &g).unwrap();
        assert!(s.step_info(-1, 0, 0, 0).is_none());
        assert!(s.step_info(s.nstep(), 0, 0, 0).is_none());
        assert!(s.step_info(0, 0, 2, 0).is_none());
        assert!(s.step_info(0, 0, 0, -1).is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let g = grid(3, 2);
        let s = StepScheduler::new(2, 4, &g).unwrap();
        for step in 0..s.nstep() {
            for oib in 0..s.noctant_per_block() {
                for (px, py) in iproduct!(0..3, 0..2) {
                    assert_eq!(
                        s.step_info(step, oib, px, py),
                        s.step_info(step, oib, px, py)
                    );
                }
            }
        }
    }

    #[test]
    fn schedule_complete_and_unique_across_configs() {
        for (nblock_z, nx, ny, blocks) in iproduct!([1, 3], [1, 2, 3], [1, 2], [1, 2, 4, 8]) {
            let g = grid(nx, ny);
            let s = StepScheduler::new(nblock_z, blocks, &g).unwrap();
            for (px, py) in iproduct!(0..nx, 0..ny) {
                s.validate_schedule(px, py).unwrap_or_else(|e| {
                    panic!("B={nblock_z} grid {nx}x{ny} blocks={blocks} proc ({px},{py}): {e}")
                });
            }
        }
    }

    #[test]
    fn wavefront_reaches_starting_corner_first() {
        // 3x1 grid, no folding: for each octant, the process at the octant's
        // starting x corner must become active no later than any other.
        let g = grid(3, 1);
        let s = StepScheduler::new(2, 8, &g).unwrap();
        for octant in 0..8u8 {
            let first_step = |px: i32| {
                (0..s.nstep())
                    .find(|&step| {
                        s.step_info(step, 0, px, 0)
                            .is_some_and(|i| i.octant.index() == octant)
                    })
                    .unwrap()
            };
            let corner = match Octant::new(octant).dir_x() {
                Dir::Up => 0,
                Dir::Dn => 2,
            };
            for px in 0..3 {
                assert!(
                    first_step(corner) <= first_step(px),
                    "octant {octant}: corner {corner} after process {px}"
                );
            }
        }
    }
}
