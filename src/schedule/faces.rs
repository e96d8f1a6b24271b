//! Face-buffer selection and storage.
//!
//! The xz and yz face arrays form a circular buffer of length three. Three
//! slots are needed because at any step there may be a send, a receive, and
//! a block-sweep compute in flight for the same orientation. The xy face has
//! no step-to-step pipeline dependency within one sweep direction and keeps
//! a single slot.

use crate::octant::Axis;
use bytemuck::Pod;

/// Number of rotating slots per pipelined face orientation.
pub const NFACE_SLOT: usize = 3;

/// Maps a step number to the buffer slot for each face orientation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FaceRotation {
    comm_async: bool,
}

impl FaceRotation {
    /// `comm_async` selects rotating slots; otherwise every step uses slot 0.
    #[inline]
    pub const fn new(comm_async: bool) -> Self {
        FaceRotation { comm_async }
    }

    #[inline]
    pub const fn comm_async(&self) -> bool {
        self.comm_async
    }

    /// Slot for the xy face; never rotates.
    #[inline]
    pub fn xy(&self, step: i32) -> usize {
        debug_assert!(step >= 0);
        0
    }

    /// Slot for the xz face at `step`.
    #[inline]
    pub fn xz(&self, step: i32) -> usize {
        debug_assert!(step >= 0);
        if self.comm_async {
            ((step + NFACE_SLOT as i32) % NFACE_SLOT as i32) as usize
        } else {
            0
        }
    }

    /// Slot for the yz face at `step`.
    #[inline]
    pub fn yz(&self, step: i32) -> usize {
        self.xz(step)
    }
}

/// Per-octant element counts of the three face orientations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FaceDims {
    pub cells_xy: usize,
    pub cells_xz: usize,
    pub cells_yz: usize,
}

impl FaceDims {
    /// Face dims for a block of `nx` × `ny` × `nz` cells.
    pub const fn for_block(nx: usize, ny: usize, nz: usize) -> Self {
        FaceDims {
            cells_xy: nx * ny,
            cells_xz: nx * nz,
            cells_yz: ny * nz,
        }
    }

    /// Elements carried by one exchange across `axis`: x-neighbors trade yz
    /// faces, y-neighbors trade xz faces.
    #[inline]
    pub const fn exchange_cells(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.cells_yz,
            Axis::Y => self.cells_xz,
        }
    }
}

/// Face storage for one sweeper: one xy slot plus three xz and three yz
/// slots, each holding all octant-in-block sections contiguously.
///
/// Owned by the sweeper; the scheduling side only ever computes indices
/// into this set.
#[derive(Debug)]
pub struct FaceBuffers<P> {
    dims: FaceDims,
    noctant_per_block: usize,
    rotation: FaceRotation,
    facexy: Vec<P>,
    facexz: [Vec<P>; NFACE_SLOT],
    faceyz: [Vec<P>; NFACE_SLOT],
}

impl<P: Pod> FaceBuffers<P> {
    /// Allocates zeroed faces. With synchronous communication only slot 0 of
    /// each pipelined orientation is backed; the rotation never selects the
    /// others.
    pub fn new(dims: FaceDims, noctant_per_block: usize, comm_async: bool) -> Self {
        let alloc = |cells: usize, slot: usize| -> Vec<P> {
            if slot == 0 || comm_async {
                vec![P::zeroed(); cells * noctant_per_block]
            } else {
                Vec::new()
            }
        };
        FaceBuffers {
            dims,
            noctant_per_block,
            rotation: FaceRotation::new(comm_async),
            facexy: alloc(dims.cells_xy, 0),
            facexz: std::array::from_fn(|slot| alloc(dims.cells_xz, slot)),
            faceyz: std::array::from_fn(|slot| alloc(dims.cells_yz, slot)),
        }
    }

    #[inline]
    pub const fn dims(&self) -> FaceDims {
        self.dims
    }

    #[inline]
    pub const fn rotation(&self) -> FaceRotation {
        self.rotation
    }

    #[inline]
    pub const fn noctant_per_block(&self) -> usize {
        self.noctant_per_block
    }

    fn octant_range(cells: usize, octant_in_block: usize) -> std::ops::Range<usize> {
        cells * octant_in_block..cells * (octant_in_block + 1)
    }

    /// The three face slices selected for `step`, whole slots.
    pub fn step_faces_mut(&mut self, step: i32) -> (&mut [P], &mut [P], &mut [P]) {
        let xz = self.rotation.xz(step);
        let yz = self.rotation.yz(step);
        (
            self.facexy.as_mut_slice(),
            self.facexz[xz].as_mut_slice(),
            self.faceyz[yz].as_mut_slice(),
        )
    }

    /// Section of the face crossed by an `axis` exchange, for one
    /// octant-in-block, at the slot selected for `step`.
    pub fn exchange_section(&self, axis: Axis, step: i32, octant_in_block: usize) -> &[P] {
        let cells = self.dims.exchange_cells(axis);
        let range = Self::octant_range(cells, octant_in_block);
        match axis {
            Axis::X => &self.faceyz[self.rotation.yz(step)][range],
            Axis::Y => &self.facexz[self.rotation.xz(step)][range],
        }
    }

    /// Mutable variant of [`exchange_section`](Self::exchange_section).
    pub fn exchange_section_mut(
        &mut self,
        axis: Axis,
        step: i32,
        octant_in_block: usize,
    ) -> &mut [P] {
        let cells = self.dims.exchange_cells(axis);
        let range = Self::octant_range(cells, octant_in_block);
        match axis {
            Axis::X => &mut self.faceyz[self.rotation.yz(step)][range],
            Axis::Y => &mut self.facexz[self.rotation.xz(step)][range],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xy_is_pinned_to_slot_zero() {
        let r = FaceRotation::new(true);
        for step in 0..10 {
            assert_eq!(r.xy(step), 0);
        }
    }

    #[test]
    fn pipelined_faces_rotate_mod_three_iff_async() {
        let r = FaceRotation::new(true);
        let slots: Vec<usize> = (0..7).map(|s| r.xz(s)).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(r.yz(4), r.xz(4));

        let r = FaceRotation::new(false);
        assert!((0..7).all(|s| r.xz(s) == 0 && r.yz(s) == 0));
    }

    #[test]
    fn sync_buffers_back_only_slot_zero() {
        let dims = FaceDims::for_block(2, 3, 4);
        let mut faces = FaceBuffers::<f64>::new(dims, 2, false);
        let (xy, xz, yz) = faces.step_faces_mut(5);
        assert_eq!(xy.len(), dims.cells_xy * 2);
        assert_eq!(xz.len(), dims.cells_xz * 2);
        assert_eq!(yz.len(), dims.cells_yz * 2);
    }

    #[test]
    fn exchange_sections_are_disjoint_per_octant() {
        let dims = FaceDims::for_block(2, 2, 2);
        let mut faces = FaceBuffers::<f32>::new(dims, 2, true);
        faces.exchange_section_mut(Axis::X, 0, 0).fill(1.0);
        faces.exchange_section_mut(Axis::X, 0, 1).fill(2.0);
        assert!(faces.exchange_section(Axis::X, 0, 0).iter().all(|&v| v == 1.0));
        assert!(faces.exchange_section(Axis::X, 0, 1).iter().all(|&v| v == 2.0));
        // A different slot is untouched.
        assert!(faces.exchange_section(Axis::X, 1, 0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn exchange_cells_pair_axis_to_orientation() {
        let dims = FaceDims::for_block(3, 4, 5);
        assert_eq!(dims.exchange_cells(Axis::X), 20); // yz
        assert_eq!(dims.exchange_cells(Axis::Y), 15); // xz
    }
}
