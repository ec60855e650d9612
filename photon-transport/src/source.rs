//! Composes position, angle, and time samplers into a walker initializer.

use crate::distributions::Distribution;
use crate::float::Float;
use crate::rng::Rng;
use crate::walker::Walker;
use serde::{Deserialize, Serialize};

/// Composes three position samplers (x, y, z), a cos-theta sampler, an
/// azimuth sampler, and a walk-time sampler into a walker initializer
/// (`# 4.D`).
///
/// A `Source`/`PencilBeamSource`/`GaussianBeamSource`/`IsotropicPointSource`
/// class hierarchy reached through virtual `spinPosition`/`spinDirection`/
/// `spinTime` calls and an implicit parent-propagated RNG is flattened here
/// into explicit distribution fields and free constructor functions; there
/// is nothing left to override.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Source {
    rx: Distribution,
    ry: Distribution,
    rz: Distribution,
    cos_theta: Distribution,
    psi: Distribution,
    walk_time: Distribution,
}

impl Source {
    /// Builds a source from six explicit distributions, mirroring the XML
    /// input's `source` element attributes one-for-one (`# 6`).
    #[must_use]
    pub const fn new(
        rx: Distribution,
        ry: Distribution,
        rz: Distribution,
        cos_theta: Distribution,
        psi: Distribution,
        walk_time: Distribution,
    ) -> Self {
        Self {
            rx,
            ry,
            rz,
            cos_theta,
            psi,
            walk_time,
        }
    }

    /// A beam launched from the origin straight down the z axis with zero
    /// emission delay.
    #[must_use]
    pub fn pencil_beam() -> Self {
        Self::new(
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
            Distribution::Delta(1.0),
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
        )
    }

    /// A cylindrically symmetric Gaussian spot in the `z = 0` plane,
    /// launched straight down.
    #[must_use]
    pub fn gaussian_beam(fwhm: Float) -> Self {
        Self::new(
            Distribution::Normal { mu: 0.0, fwhm },
            Distribution::Normal { mu: 0.0, fwhm },
            Distribution::Delta(0.0),
            Distribution::Delta(1.0),
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
        )
    }

    /// An isotropic point source at depth `z0`.
    #[must_use]
    pub fn isotropic_point(z0: Float) -> Self {
        Self::new(
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
            Distribution::Delta(z0),
            Distribution::Uniform { a: -1.0, b: 1.0 },
            Distribution::IsotropicAzimuth,
            Distribution::Delta(0.0),
        )
    }

    /// The z coordinate the source launches from, before any per-walker
    /// jitter is drawn. Used by the engine to compute the time-origin
    /// offset once per run (`# 4.E`).
    #[must_use]
    pub fn z0(&self) -> Float {
        match self.rz {
            Distribution::Delta(z) => z,
            _ => 0.0,
        }
    }

    /// Draws a fresh walker: position, then direction, then walk time — in
    /// that order, since a Gaussian beam's direction sampling logic reads the
    /// position distributions before deciding whether to override the
    /// direction it would otherwise draw.
    pub fn spin(&self, rng: &mut Rng) -> Walker {
        let r0 = [
            self.rx.sample(rng),
            self.ry.sample(rng),
            self.rz.sample(rng),
        ];

        let cos_theta = self.cos_theta.sample(rng);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let psi = self.psi.sample(rng);
        let k0 = [
            sin_theta * psi.cos(),
            sin_theta * psi.sin(),
            cos_theta,
        ];

        let walk_time = self.walk_time.sample(rng);

        Walker {
            r0,
            r1: r0,
            k0,
            k1: k0,
            walk_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::norm;

    #[test]
    fn pencil_beam_is_deterministic() {
        let source = Source::pencil_beam();
        let mut rng = Rng::seeded(1);
        let w = source.spin(&mut rng);
        assert_eq!(w.r0, [0.0, 0.0, 0.0]);
        assert_eq!(w.k0, [0.0, 0.0, 1.0]);
        assert_eq!(w.walk_time, 0.0);
    }

    #[test]
    fn every_source_produces_unit_direction() {
        let mut rng = Rng::seeded(2);
        for source in [
            Source::pencil_beam(),
            Source::gaussian_beam(0.5),
            Source::isotropic_point(-1.0),
        ] {
            for _ in 0..100 {
                let w = source.spin(&mut rng);
                assert!((norm(w.k0) - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn gaussian_beam_launches_from_z_zero_downward() {
        let source = Source::gaussian_beam(1.0);
        let mut rng = Rng::seeded(3);
        for _ in 0..100 {
            let w = source.spin(&mut rng);
            assert_eq!(w.r0[2], 0.0);
            assert_eq!(w.k0, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn isotropic_point_fixes_depth_and_varies_direction() {
        let source = Source::isotropic_point(2.5);
        let mut rng = Rng::seeded(4);
        let mut saw_negative_kz = false;
        let mut saw_positive_kz = false;
        for _ in 0..200 {
            let w = source.spin(&mut rng);
            assert_eq!(w.r0, [0.0, 0.0, 2.5]);
            if w.k0[2] < 0.0 {
                saw_negative_kz = true;
            }
            if w.k0[2] > 0.0 {
                saw_positive_kz = true;
            }
        }
        assert!(saw_negative_kz && saw_positive_kz);
    }
}
