//! Process-grid view: this process's place in the 2-D (x, y) decomposition.
//!
//! The sweep scheduler only needs the grid extents and this process's
//! coordinates, both fixed for the scheduler's lifetime, so the environment
//! abstraction reduces to a small `Copy` value. Rank linearization is
//! x-major: `rank = proc_x + nproc_x * proc_y`.

use crate::octant::{Axis, Dir};
use crate::sweep_error::SweepError;

/// Coordinates and extents of the 2-D process grid, from the viewpoint of
/// one process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcGrid {
    nproc_x: i32,
    nproc_y: i32,
    proc_x: i32,
    proc_y: i32,
}

impl ProcGrid {
    /// Builds a grid view from extents and this process's coordinates.
    ///
    /// # Errors
    /// `InvalidGridExtent` if an extent is non-positive, `ProcOutsideGrid`
    /// if the coordinates do not lie inside the grid.
    pub fn new(nproc_x: i32, nproc_y: i32, proc_x: i32, proc_y: i32) -> Result<Self, SweepError> {
        if nproc_x <= 0 || nproc_y <= 0 {
            return Err(SweepError::InvalidGridExtent { nproc_x, nproc_y });
        }
        if !(0..nproc_x).contains(&proc_x) || !(0..nproc_y).contains(&proc_y) {
            return Err(SweepError::ProcOutsideGrid {
                proc_x,
                proc_y,
                nproc_x,
                nproc_y,
            });
        }
        Ok(ProcGrid {
            nproc_x,
            nproc_y,
            proc_x,
            proc_y,
        })
    }

    /// Builds the view for a linear rank in an `nproc_x` × `nproc_y` grid.
    pub fn from_rank(nproc_x: i32, nproc_y: i32, rank: usize) -> Result<Self, SweepError> {
        if nproc_x <= 0 || nproc_y <= 0 {
            return Err(SweepError::InvalidGridExtent { nproc_x, nproc_y });
        }
        let rank = rank as i32;
        Self::new(nproc_x, nproc_y, rank % nproc_x, rank / nproc_x)
    }

    #[inline]
    pub const fn nproc_x(&self) -> i32 {
        self.nproc_x
    }

    #[inline]
    pub const fn nproc_y(&self) -> i32 {
        self.nproc_y
    }

    /// Total process count in the grid.
    #[inline]
    pub const fn nproc(&self) -> i32 {
        self.nproc_x * self.nproc_y
    }

    #[inline]
    pub const fn proc_x(&self) -> i32 {
        self.proc_x
    }

    #[inline]
    pub const fn proc_y(&self) -> i32 {
        self.proc_y
    }

    /// Linear rank of this process.
    #[inline]
    pub const fn rank(&self) -> usize {
        (self.proc_x + self.nproc_x * self.proc_y) as usize
    }

    /// Whether `(x, y)` lies inside the grid.
    #[inline]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.nproc_x && y >= 0 && y < self.nproc_y
    }

    /// Linear rank of the process at `(x, y)`, if inside the grid.
    #[inline]
    pub fn rank_at(&self, x: i32, y: i32) -> Option<usize> {
        self.contains(x, y)
            .then(|| (x + self.nproc_x * y) as usize)
    }

    /// Coordinates one step away along `axis` in `dir`, unclamped.
    ///
    /// The neighbor may fall outside the grid; the step scheduler's activity
    /// predicate treats such queries as inactive rather than erroring.
    #[inline]
    pub fn neighbor(&self, axis: Axis, dir: Dir) -> (i32, i32) {
        match axis {
            Axis::X => (self.proc_x + dir.sign(), self.proc_y),
            Axis::Y => (self.proc_x, self.proc_y + dir.sign()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_validates_extents_and_coords() {
        assert!(ProcGrid::new(0, 1, 0, 0).is_err());
        assert!(ProcGrid::new(2, 2, 2, 0).is_err());
        assert!(ProcGrid::new(2, 2, -1, 0).is_err());
        assert!(ProcGrid::new(2, 2, 1, 1).is_ok());
    }

    #[test]
    fn rank_roundtrip() {
        for rank in 0..6usize {
            let g = ProcGrid::from_rank(3, 2, rank).unwrap();
            assert_eq!(g.rank(), rank);
            assert_eq!(g.rank_at(g.proc_x(), g.proc_y()), Some(rank));
        }
        assert!(ProcGrid::from_rank(3, 2, 6).is_err());
    }

    #[test]
    fn neighbor_may_leave_grid() {
        let g = ProcGrid::new(2, 1, 1, 0).unwrap();
        assert_eq!(g.neighbor(Axis::X, Dir::Up), (2, 0));
        assert_eq!(g.neighbor(Axis::X, Dir::Dn), (0, 0));
        assert_eq!(g.neighbor(Axis::Y, Dir::Up), (1, 1));
        assert_eq!(g.rank_at(2, 0), None);
    }

    #[test]
    fn json_roundtrip() {
        let g = ProcGrid::new(3, 2, 2, 1).unwrap();
        let s = serde_json::to_string(&g).unwrap();
        let back: ProcGrid = serde_json::from_str(&s).unwrap();
        assert_eq!(back, g);
    }
}
