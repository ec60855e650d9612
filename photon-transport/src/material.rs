//! Immutable optical properties of a layer (or half-space).

use crate::float::Float;
use serde::{Deserialize, Serialize};

/// The speed of light in vacuum, in the same length/time units the rest of
/// the engine uses (micrometres / picoseconds in the reference
/// implementation's typical unit choice; this crate is unit-agnostic and
/// simply carries whatever units the caller's `ls`/positions are in).
pub const SPEED_OF_LIGHT: Float = 299_792.458;

/// Scattering mean free path, anisotropy, and refractive index of a slab (or
/// a bounding half-space).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    ls: Float,
    g: Float,
    n: Float,
}

impl Material {
    /// Constructs a scattering material.
    ///
    /// # Panics
    ///
    /// Panics if `ls <= 0`, `n <= 0`, or `g` is outside `[-1, 1]` — these are
    /// construction-time programmer errors (malformed input would be caught
    /// earlier, during XML validation), not runtime conditions to recover
    /// from.
    #[must_use]
    pub fn new(ls: Float, g: Float, n: Float) -> Self {
        assert!(ls > 0.0, "mean free path must be positive (or +inf)");
        assert!((-1.0..=1.0).contains(&g), "anisotropy must be in [-1, 1]");
        assert!(n > 0.0, "refractive index must be positive");
        Self { ls, g, n }
    }

    /// Constructs a non-scattering material (`ls = +inf`).
    #[must_use]
    pub fn non_scattering(n: Float) -> Self {
        Self {
            ls: Float::INFINITY,
            g: 0.0,
            n,
        }
    }

    /// Mean free path between scattering events. May be `+inf`.
    #[must_use]
    pub const fn ls(&self) -> Float {
        self.ls
    }

    /// Scattering coefficient, `1/ls`. Zero for a non-scattering material.
    #[must_use]
    pub fn mus(&self) -> Float {
        1.0 / self.ls
    }

    /// Mean cosine of the scattering angle.
    #[must_use]
    pub const fn g(&self) -> Float {
        self.g
    }

    /// Refractive index.
    #[must_use]
    pub const fn n(&self) -> Float {
        self.n
    }

    /// Propagation speed, `c/n`.
    #[must_use]
    pub fn v(&self) -> Float {
        SPEED_OF_LIGHT / self.n
    }

    /// Whether this material scatters at all.
    #[must_use]
    pub fn is_scattering(&self) -> bool {
        self.ls.is_finite()
    }
}

/// A few well-known materials the XML input may reference by name without
/// declaring them explicitly (`# 6`).
#[must_use]
pub fn well_known(name: &str) -> Option<Material> {
    match name {
        "Air" | "Vacuum" => Some(Material::non_scattering(1.0)),
        "GlassSlide" => Some(Material::non_scattering(1.5)),
        "NorlandOpticalAdhesive65" => Some(Material::non_scattering(1.524)),
        _ => None,
    }
}
