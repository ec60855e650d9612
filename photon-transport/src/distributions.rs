//! Scalar samplers drawn from a [`Rng`].
//!
//! A class hierarchy of distributions (`AbstractDistribution` and
//! subclasses) reached through virtual calls and parent-propagated RNG
//! pointers is collapsed here into a single tagged-variant enum: every
//! variant is known at compile time, `sample` monomorphizes to a flat
//! `match`, and there is nothing to mock in tests.

use crate::float::{Float, TWO_PI};
use crate::rng::Rng;
use serde::{Deserialize, Serialize};

/// A scalar sampler. Each variant draws directly from an injected [`Rng`];
/// there is no implicit parent/child RNG sharing, the component that owns a
/// `Distribution` is simply expected to pass its own stream to every call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Always returns the same value.
    Delta(Float),
    /// Uniform in `[a, b)`.
    Uniform {
        /// Lower bound, inclusive.
        a: Float,
        /// Upper bound, exclusive.
        b: Float,
    },
    /// Gaussian parameterized by full-width-half-maximum rather than sigma,
    /// since that is how the source XML expresses beam widths.
    Normal {
        /// Mean.
        mu: Float,
        /// Full width at half maximum.
        fwhm: Float,
    },
    /// Uniform azimuth in `[0, 2*pi)`.
    IsotropicAzimuth,
    /// `cos(theta)` drawn from the Henyey-Greenstein phase function with
    /// anisotropy `g`.
    CosThetaHg(Float),
}

/// `FWHM = sigma * 2*sqrt(2*ln(2))`; this is the inverse conversion factor.
const FWHM_TO_SIGMA: Float = 0.424_660_900_144_009_52; // 1 / (2*sqrt(2*ln2))

/// Below this magnitude of `g`, Henyey-Greenstein degenerates numerically
/// (the closed-form inverse has `0/0`); sampling falls back to isotropic.
const HG_ISOTROPIC_EPS: Float = 1e-6;

impl Distribution {
    /// Draws one sample from `rng`.
    pub fn sample(&self, rng: &mut Rng) -> Float {
        match *self {
            Self::Delta(c) => c,
            Self::Uniform { a, b } => rng.uniform(a, b),
            Self::Normal { mu, fwhm } => rng.normal(mu, fwhm * FWHM_TO_SIGMA),
            Self::IsotropicAzimuth => rng.uniform(0.0, TWO_PI),
            Self::CosThetaHg(g) => Self::sample_hg(g, rng),
        }
    }

    fn sample_hg(g: Float, rng: &mut Rng) -> Float {
        if g.abs() < HG_ISOTROPIC_EPS {
            return rng.uniform(-1.0, 1.0);
        }
        let xi = rng.uniform01();
        let term = (1.0 - g * g) / (1.0 - g + 2.0 * g * xi);
        (1.0 + g * g - term * term) / (2.0 * g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_constant() {
        let d = Distribution::Delta(4.2);
        let mut rng = Rng::seeded(1);
        for _ in 0..10 {
            assert_eq!(d.sample(&mut rng), 4.2);
        }
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let d = Distribution::Uniform { a: -2.0, b: 5.0 };
        let mut rng = Rng::seeded(2);
        for _ in 0..10_000 {
            let x = d.sample(&mut rng);
            assert!((-2.0..5.0).contains(&x));
        }
    }

    #[test]
    fn isotropic_azimuth_covers_full_circle() {
        let d = Distribution::IsotropicAzimuth;
        let mut rng = Rng::seeded(3);
        let mut min = TWO_PI;
        let mut max = 0.0;
        for _ in 0..50_000 {
            let x = d.sample(&mut rng);
            assert!((0.0..TWO_PI).contains(&x));
            min = min.min(x);
            max = max.max(x);
        }
        assert!(min < 0.01);
        assert!(max > TWO_PI - 0.01);
    }

    #[test]
    fn hg_near_zero_g_matches_isotropic_cos_theta() {
        let d = Distribution::CosThetaHg(0.0);
        let mut rng = Rng::seeded(4);
        let n = 100_000;
        let mean: Float = (0..n).map(|_| d.sample(&mut rng)).sum::<Float>() / n as Float;
        assert!(mean.abs() < 0.02);
    }

    #[test]
    fn hg_forward_anisotropy_biases_mean_cos_theta_positive() {
        let d = Distribution::CosThetaHg(0.9);
        let mut rng = Rng::seeded(5);
        let n = 100_000;
        let mean: Float = (0..n).map(|_| d.sample(&mut rng)).sum::<Float>() / n as Float;
        // HG's first moment is exactly g.
        assert!((mean - 0.9).abs() < 0.02);
    }

    #[test]
    fn hg_samples_stay_in_unit_range() {
        let d = Distribution::CosThetaHg(0.7);
        let mut rng = Rng::seeded(6);
        for _ in 0..50_000 {
            let c = d.sample(&mut rng);
            assert!((-1.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn normal_fwhm_conversion() {
        let d = Distribution::Normal { mu: 0.0, fwhm: 2.0 };
        let mut rng = Rng::seeded(7);
        let n = 200_000;
        let samples: Vec<Float> = (0..n).map(|_| d.sample(&mut rng)).collect();
        let mean: Float = samples.iter().sum::<Float>() / n as Float;
        let var: Float =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<Float>() / n as Float;
        let expected_sigma = 2.0 * FWHM_TO_SIGMA;
        assert!((var.sqrt() - expected_sigma).abs() / expected_sigma < 0.03);
    }
}
