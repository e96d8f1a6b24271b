//! `Octant`: a strong, zero-cost handle for angular sweep directions.
//!
//! A sweep visits the 3-D domain from each of the eight corners; an octant
//! names one corner by its sign triple (±x, ±y, ±z). The index encodes the
//! signs bitwise: bit 0 is x, bit 1 is y, bit 2 is z, and a set bit means the
//! sweep descends along that axis.
//!
//! This module also fixes the traversal permutation the step scheduler walks.
//! The order is chosen to pack wavefronts so that pipeline fill/drain latency
//! is paid at most once per process-grid axis.

use std::fmt;

/// Number of angular octants.
pub const NOCTANT: usize = 8;

/// Traversal order of the octants, chosen to minimize KBA startup latency.
///
/// Entry `k` is the octant processed by the `k`-th traversal slot when no
/// folding is in effect; folded schedules take consecutive runs of this
/// table as one block.
pub const OCTANT_TRAVERSAL: [u8; NOCTANT] = [0, 4, 2, 6, 3, 7, 1, 5];

/// Sweep direction along a single axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Dir {
    /// Ascending coordinate order.
    Up,
    /// Descending coordinate order.
    Dn,
}

impl Dir {
    /// Signed unit increment for this direction.
    #[inline]
    pub const fn sign(self) -> i32 {
        match self {
            Dir::Up => 1,
            Dir::Dn => -1,
        }
    }

    /// The reverse direction.
    #[inline]
    pub const fn opposite(self) -> Dir {
        match self {
            Dir::Up => Dir::Dn,
            Dir::Dn => Dir::Up,
        }
    }
}

/// The two process-grid axes a face exchange can cross.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Both axes, in the order exchanges are enumerated.
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];
}

/// One of the eight angular sweep octants.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct Octant(u8);

impl Octant {
    /// Creates an octant from its index.
    ///
    /// # Panics
    /// Panics if `index >= 8`; an out-of-range octant is a logic defect in
    /// the caller, never expected input.
    #[inline]
    pub fn new(index: u8) -> Self {
        assert!((index as usize) < NOCTANT, "octant index out of range: {index}");
        Octant(index)
    }

    /// Raw index, `0..8`.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Direction of this octant along x.
    #[inline]
    pub const fn dir_x(self) -> Dir {
        if self.0 & (1 << 0) != 0 { Dir::Dn } else { Dir::Up }
    }

    /// Direction of this octant along y.
    #[inline]
    pub const fn dir_y(self) -> Dir {
        if self.0 & (1 << 1) != 0 { Dir::Dn } else { Dir::Up }
    }

    /// Direction of this octant along z.
    #[inline]
    pub const fn dir_z(self) -> Dir {
        if self.0 & (1 << 2) != 0 { Dir::Dn } else { Dir::Up }
    }

    /// Direction along one of the two process-grid axes.
    #[inline]
    pub const fn dir_along(self, axis: Axis) -> Dir {
        match axis {
            Axis::X => self.dir_x(),
            Axis::Y => self.dir_y(),
        }
    }
}

impl fmt::Debug for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Octant").field(&self.0).finish()
    }
}

impl fmt::Display for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_out_of_range_panics() {
        assert!(std::panic::catch_unwind(|| Octant::new(8)).is_err());
    }

    #[test]
    fn sign_bits_decode_directions() {
        let o = Octant::new(0);
        assert_eq!((o.dir_x(), o.dir_y(), o.dir_z()), (Dir::Up, Dir::Up, Dir::Up));
        let o = Octant::new(5); // bits 0 and 2
        assert_eq!((o.dir_x(), o.dir_y(), o.dir_z()), (Dir::Dn, Dir::Up, Dir::Dn));
        let o = Octant::new(7);
        assert_eq!((o.dir_x(), o.dir_y(), o.dir_z()), (Dir::Dn, Dir::Dn, Dir::Dn));
    }

    #[test]
    fn dir_along_matches_axis_accessors() {
        for i in 0..NOCTANT as u8 {
            let o = Octant::new(i);
            assert_eq!(o.dir_along(Axis::X), o.dir_x());
            assert_eq!(o.dir_along(Axis::Y), o.dir_y());
        }
    }

    #[test]
    fn traversal_is_a_permutation() {
        let mut seen = [false; NOCTANT];
        for &o in &OCTANT_TRAVERSAL {
            assert!(!seen[o as usize]);
            seen[o as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn traversal_packs_mirror_pairs() {
        // Consecutive pairs differ only in their z sign, consecutive
        // quadruples only in z and y; this is what makes folding sound.
        for k in (0..NOCTANT).step_by(2) {
            assert_eq!(OCTANT_TRAVERSAL[k] ^ OCTANT_TRAVERSAL[k + 1], 1 << 2);
        }
    }

    #[test]
    fn opposite_roundtrip() {
        assert_eq!(Dir::Up.opposite(), Dir::Dn);
        assert_eq!(Dir::Dn.opposite().sign(), 1);
    }
}

#[cfg(test)]
mod serde_tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let o = Octant::new(6);
        let s = serde_json::to_string(&o).unwrap();
        let back: Octant = serde_json::from_str(&s).unwrap();
        assert_eq!(back, o);
    }
}
