//! The mutable per-photon state the engine advances, and the bitmasks that
//! control what gets persisted about it.

use crate::float::Float;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// A 3-vector. Plain `[Float; 3]` would do, but a named type reads better at
/// every call site that does vector arithmetic on positions/directions.
pub type Vec3 = [Float; 3];

/// Euclidean norm of a 3-vector.
#[must_use]
pub fn norm(v: Vec3) -> Float {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Rescales `v` to unit length in place.
pub fn normalize(v: &mut Vec3) {
    let n = norm(*v);
    v[0] /= n;
    v[1] /= n;
    v[2] /= n;
}

/// The four ways a walker can leave the sample (`# 3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitClass {
    /// Exited through the bottom after at least one scattering event.
    Transmitted,
    /// Exited through the bottom with zero scattering events.
    Ballistic,
    /// Exited through the top after at least one scattering event.
    Reflected,
    /// Exited through the top with zero scattering events.
    BackReflected,
}

impl ExitClass {
    /// All four variants, in the order `# 6`'s output file groups them
    /// (`photon-counters` array order).
    pub const ALL: [Self; 4] = [
        Self::Transmitted,
        Self::Ballistic,
        Self::Reflected,
        Self::BackReflected,
    ];

    /// The dataset-name fragment used in the output file (`# 6`).
    #[must_use]
    pub const fn dataset_name(self) -> &'static str {
        match self {
            Self::Transmitted => "transmitted",
            Self::Ballistic => "ballistic",
            Self::Reflected => "reflected",
            Self::BackReflected => "back-reflected",
        }
    }
}

bitflags! {
    /// Selects which of the four exit classes should persist a given kind
    /// of data (exit points, walk times, or exit directions). Three
    /// independent instances of this mask exist per `# 3`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SaveFlags: u8 {
        /// Save data for transmitted walkers.
        const TRANSMITTED = 0b0001;
        /// Save data for ballistic walkers.
        const BALLISTIC = 0b0010;
        /// Save data for reflected walkers.
        const REFLECTED = 0b0100;
        /// Save data for back-reflected walkers.
        const BACK_REFLECTED = 0b1000;
        /// Save data for every exit class.
        const ALL = Self::TRANSMITTED.bits()
            | Self::BALLISTIC.bits()
            | Self::REFLECTED.bits()
            | Self::BACK_REFLECTED.bits();
    }
}

impl SaveFlags {
    /// Whether the given exit class should be saved under this mask.
    #[must_use]
    pub const fn includes(self, class: ExitClass) -> bool {
        let bit = match class {
            ExitClass::Transmitted => Self::TRANSMITTED,
            ExitClass::Ballistic => Self::BALLISTIC,
            ExitClass::Reflected => Self::REFLECTED,
            ExitClass::BackReflected => Self::BACK_REFLECTED,
        };
        self.contains(bit)
    }
}

bitflags! {
    /// Selects which components of an exit direction vector get stored.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DirectionAxes: u8 {
        /// Store the x component.
        const X = 0b001;
        /// Store the y component.
        const Y = 0b010;
        /// Store the z component.
        const Z = 0b100;
    }
}

impl DirectionAxes {
    /// Copies the selected components of `k` into a buffer in x, y, z order,
    /// returning how many were written.
    pub fn extract(self, k: Vec3, out: &mut Vec<Float>) {
        if self.contains(Self::X) {
            out.push(k[0]);
        }
        if self.contains(Self::Y) {
            out.push(k[1]);
        }
        if self.contains(Self::Z) {
            out.push(k[2]);
        }
    }
}

/// Mutable per-photon state advanced by the walker engine (`# 3`).
#[derive(Clone, Copy, Debug)]
pub struct Walker {
    /// Current position.
    pub r0: Vec3,
    /// Proposed next position (meaningless once committed into `r0`).
    pub r1: Vec3,
    /// Current direction, unit length.
    pub k0: Vec3,
    /// Proposed next direction, unit length.
    pub k1: Vec3,
    /// Accumulated elapsed time since the configured time origin.
    pub walk_time: Float,
}

impl Walker {
    /// Swaps `r0` and `r1` (used when a proposed move is committed).
    pub fn swap_r(&mut self) {
        std::mem::swap(&mut self.r0, &mut self.r1);
    }

    /// Swaps `k0` and `k1`.
    pub fn swap_k(&mut self) {
        std::mem::swap(&mut self.k0, &mut self.k1);
    }

    /// Whether `k0` and `k1` are both unit vectors within `tolerance`
    /// (`# 8` invariant 1).
    #[must_use]
    pub fn directions_are_normalized(&self, tolerance: Float) -> bool {
        (norm(self.k0) - 1.0).abs() < tolerance && (norm(self.k1) - 1.0).abs() < tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = [3.0, 4.0, 0.0];
        normalize(&mut v);
        assert!((norm(v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn save_flags_includes_matches_bits() {
        let flags = SaveFlags::TRANSMITTED | SaveFlags::REFLECTED;
        assert!(flags.includes(ExitClass::Transmitted));
        assert!(!flags.includes(ExitClass::Ballistic));
        assert!(flags.includes(ExitClass::Reflected));
        assert!(!flags.includes(ExitClass::BackReflected));
    }

    #[test]
    fn direction_axes_extract_in_xyz_order() {
        let axes = DirectionAxes::X | DirectionAxes::Z;
        let mut out = Vec::new();
        axes.extract([1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, vec![1.0, 3.0]);
    }

    #[test]
    fn swap_exchanges_state() {
        let mut w = Walker {
            r0: [0.0, 0.0, 0.0],
            r1: [1.0, 1.0, 1.0],
            k0: [0.0, 0.0, 1.0],
            k1: [0.0, 1.0, 0.0],
            walk_time: 0.0,
        };
        w.swap_r();
        w.swap_k();
        assert_eq!(w.r0, [1.0, 1.0, 1.0]);
        assert_eq!(w.k0, [0.0, 1.0, 0.0]);
    }
}
