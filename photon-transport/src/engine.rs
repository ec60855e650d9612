//! The per-photon state machine: propagate, scatter, intersect boundaries,
//! reflect/refract, classify on exit (`# 4.E`). The single hardest and most
//! failure-sensitive component in this crate.

use crate::distributions::Distribution;
use crate::error::{Error, Result};
use crate::float::{Float, COSZERO, NEAR_AXIS, TWO_PI};
use crate::material::Material;
use crate::rng::Rng;
use crate::sample::Sample;
use crate::source::Source;
use crate::walker::{normalize, ExitClass, Walker};

/// A walker that has exited the sample, together with the classification
/// assigned on exit.
#[derive(Clone, Copy, Debug)]
pub struct Outcome {
    /// Final walker state at the moment of exit.
    pub walker: Walker,
    /// How it exited.
    pub class: ExitClass,
}

/// Advances walkers through a fixed [`Sample`].
///
/// Precomputes nothing the [`Sample`] doesn't already cache; the layer
/// lookups done at every boundary crossing are O(1) index operations into
/// `Sample`'s own boundary table, so there is no separate
/// `upperZBoundaries`/`materials`/`mus`-style per-layer cache to build and
/// invalidate here.
pub struct Engine<'a> {
    sample: &'a Sample,
    fresnel_enabled: bool,
    time_origin_z: Float,
}

/// Per-layer bounds, in the convention `(lower, upper)` with `-inf`/`+inf`
/// for the two half-spaces.
fn layer_bounds(sample: &Sample, layer: usize) -> (Float, Float) {
    let n_layers = sample.n_layers();
    let lower = if layer == 0 {
        Float::NEG_INFINITY
    } else {
        sample.upper_boundary(layer - 1)
    };
    let upper = if layer > n_layers {
        Float::INFINITY
    } else {
        sample.upper_boundary(layer)
    };
    (lower, upper)
}

impl<'a> Engine<'a> {
    /// Builds an engine over `sample`. `time_origin_z` is the depth at which
    /// `walk_time == 0` is defined (`# 4.E`); `fresnel_enabled` toggles
    /// whether interface crossings are governed by Fresnel reflectance or
    /// always refract.
    #[must_use]
    pub const fn new(sample: &'a Sample, fresnel_enabled: bool, time_origin_z: Float) -> Self {
        Self {
            sample,
            fresnel_enabled,
            time_origin_z,
        }
    }

    /// The signed straight-line-at-normal-incidence transit time between
    /// `source_z0` and `time_origin_z`, used to align `walk_time = 0` with
    /// the configured origin depth (`# 4.E`).
    ///
    /// If `source_z0` is `-inf` (a source in the upper half-space launching
    /// downward), the integration's left endpoint is clamped to the first
    /// finite boundary.
    #[must_use]
    pub fn time_origin_offset(&self, source_z0: Float) -> Float {
        let left_point_raw = source_z0.min(self.time_origin_z);
        let right_point = source_z0.max(self.time_origin_z);
        let left_point = if left_point_raw.is_infinite() {
            self.sample.upper_boundary(0).min(self.time_origin_z)
        } else {
            left_point_raw
        };

        let left_layer = self.sample.layer_at(left_point).min(self.sample.layer_at(right_point));
        let right_layer = self.sample.layer_at(left_point).max(self.sample.layer_at(right_point));

        let mut offset = if left_layer != right_layer {
            let mut acc = 0.0;
            acc += (self.sample.upper_boundary(left_layer).min(right_point) - left_point)
                / self.sample.material(left_layer).v();
            for i in (left_layer + 1)..right_layer {
                let (lo, hi) = layer_bounds(self.sample, i);
                acc += (hi - lo) / self.sample.material(i).v();
            }
            let (lower_of_right, _) = layer_bounds(self.sample, right_layer);
            acc += (right_point - lower_of_right) / self.sample.material(right_layer).v();
            acc
        } else {
            (right_point - left_point).abs() / self.sample.material(left_layer).v()
        };

        // sign chosen so a walker arriving at time_origin_z has walk_time = 0
        let sign = if self.time_origin_z >= source_z0 {
            1.0
        } else {
            -1.0
        };
        offset *= -sign;
        if !offset.is_finite() {
            offset = 0.0;
        }
        offset
    }

    /// Draws and fully advances one walker from `source` using `rng`,
    /// returning its exit outcome.
    ///
    /// `seed`/`walker_index` are carried only for error context: they are
    /// attached to any [`Error::NumericalAnomaly`] raised, per the recovery
    /// policy in `# 7`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NumericalAnomaly`] if a non-finite position or
    /// direction component is produced. The documented cause is a
    /// misconfigured sample that traps a walker in a non-scattering layer
    /// under total internal reflection with no z-component of motion
    /// (`# 4.E`, "Termination") — the engine does not attempt to detect that
    /// configuration ahead of time, it surfaces the resulting anomaly.
    pub fn launch(
        &self,
        source: &Source,
        rng: &mut Rng,
        seed: u32,
        walker_index: u64,
    ) -> Result<Outcome> {
        let mut walker = source.spin(rng);
        if walker.r0[2].is_infinite() {
            let clamped = self.sample.upper_boundary(0).min(self.time_origin_z);
            walker.r0[2] = clamped;
            walker.r1[2] = clamped;
        }
        walker.walk_time += self.time_origin_offset(source.z0());

        let n_layers = self.sample.n_layers();
        let mut interactions = vec![0u32; n_layers + 2];

        let mut current_layer = self.sample.layer_at(walker.r0[2]);
        let mut current_material = self.sample.material(current_layer);
        let (mut curr_lower, mut curr_upper) = layer_bounds(self.sample, current_layer);
        let mut total_length_in_layer: Float = 0.0;

        // the walker propagates with its originally-sampled direction first
        walker.swap_k();
        let mut scatter_pending = false;

        let hg = Distribution::CosThetaHg(current_material.g());
        let mut current_hg = hg;

        loop {
            let length = if current_material.is_scattering() {
                let l = rng.exponential(current_material.ls());
                if scatter_pending {
                    interactions[current_layer] += 1;
                    self.resample_direction(&current_hg, &mut walker, rng)?;
                }
                l
            } else {
                Float::INFINITY
            };

            let committed = if length.is_finite() {
                let r1 = [
                    walker.r0[0] + length * walker.k1[0],
                    walker.r0[1] + length * walker.k1[1],
                    walker.r0[2] + length * walker.k1[2],
                ];
                if !r1.iter().all(|c| c.is_finite()) {
                    return Err(anomaly(seed, walker_index, "non-finite proposed position"));
                }
                if r1[2] > curr_lower && r1[2] < curr_upper {
                    walker.r1 = r1;
                    true
                } else {
                    false
                }
            } else {
                false
            };

            if committed {
                walker.swap_r();
                walker.swap_k();
                total_length_in_layer += length;
                scatter_pending = true;
                continue;
            }

            // boundary crossing: find which edge of the current layer is hit
            let next_layer = if walker.k1[2] >= 0.0 {
                current_layer + 1
            } else {
                current_layer.checked_sub(1).ok_or_else(|| {
                    anomaly(seed, walker_index, "layer index underflow at top boundary")
                })?
            };
            let boundary = if next_layer <= current_layer {
                curr_lower
            } else {
                curr_upper
            };
            if walker.k1[2] == 0.0 {
                return Err(anomaly(
                    seed,
                    walker_index,
                    "walker direction parallel to layer boundaries in a non-scattering layer",
                ));
            }
            let t = (boundary - walker.r0[2]) / walker.k1[2];
            if !t.is_finite() || t < 0.0 {
                return Err(anomaly(seed, walker_index, "non-finite or negative boundary distance"));
            }
            let crossing_point = [
                walker.r0[0] + t * walker.k1[0],
                walker.r0[1] + t * walker.k1[1],
                walker.r0[2] + t * walker.k1[2],
            ];
            if !crossing_point.iter().all(|c| c.is_finite()) {
                return Err(anomaly(seed, walker_index, "non-finite interface crossing point"));
            }
            walker.r0 = crossing_point;
            total_length_in_layer += t;
            scatter_pending = false;

            let n0 = current_material.n();
            let n1 = self.sample.material(next_layer).n();

            let crossed = if float_cmp::approx_eq!(Float, n0, n1, ulps = 4) {
                true
            } else {
                let sin_theta0 = (1.0 - walker.k1[2] * walker.k1[2]).max(0.0).sqrt();
                let sin_theta1 = n0 * sin_theta0 / n1;

                if sin_theta1 > 1.0 {
                    // total internal reflection
                    walker.k1[2] = -walker.k1[2];
                    false
                } else {
                    let cos_theta1 = (1.0 - sin_theta1 * sin_theta1).max(0.0).sqrt();
                    let reflect = if self.fresnel_enabled {
                        let r = fresnel_reflectance(walker.k1[2], sin_theta0, cos_theta1, sin_theta1, n0, n1);
                        rng.uniform01() <= r
                    } else {
                        false
                    };

                    if reflect {
                        walker.k1[2] = -walker.k1[2];
                        false
                    } else {
                        if walker.k1[2].abs() <= COSZERO {
                            walker.k1[0] *= n0 / n1;
                            walker.k1[1] *= n0 / n1;
                        }
                        walker.k1[2] = walker.k1[2].signum() * cos_theta1;
                        true
                    }
                }
            };

            if crossed {
                walker.walk_time += total_length_in_layer / current_material.v();
                total_length_in_layer = 0.0;
                current_layer = next_layer;
                current_material = self.sample.material(current_layer);
                current_hg = Distribution::CosThetaHg(current_material.g());
                let (lo, hi) = layer_bounds(self.sample, current_layer);
                curr_lower = lo;
                curr_upper = hi;

                if current_layer == n_layers + 1 {
                    let class = if interactions[1..=n_layers].iter().any(|&c| c > 0) {
                        ExitClass::Transmitted
                    } else {
                        ExitClass::Ballistic
                    };
                    return Ok(Outcome { walker, class });
                }
                if current_layer == 0 {
                    let class = if interactions[1..=n_layers].iter().any(|&c| c > 0) {
                        ExitClass::Reflected
                    } else {
                        ExitClass::BackReflected
                    };
                    return Ok(Outcome { walker, class });
                }
            }
        }
    }

    /// Resamples the scattering direction `k1` from `k0` through the given
    /// Henyey-Greenstein sampler, renormalizing afterwards.
    fn resample_direction(&self, hg: &Distribution, walker: &mut Walker, rng: &mut Rng) -> Result<()> {
        let cos_theta = hg.sample(rng);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let psi = rng.uniform(0.0, TWO_PI);
        let (sin_psi, cos_psi) = (psi.sin(), psi.cos());

        let k0 = walker.k0;
        let mut k1 = if k0[2].abs() > NEAR_AXIS {
            [
                sin_theta * cos_psi,
                sin_theta * sin_psi,
                cos_theta * k0[2].signum(),
            ]
        } else {
            let t = (1.0 - k0[2] * k0[2]).max(0.0).sqrt();
            [
                sin_theta * (k0[0] * k0[2] * cos_psi - k0[1] * sin_psi) / t + cos_theta * k0[0],
                sin_theta * (k0[1] * k0[2] * cos_psi + k0[0] * sin_psi) / t + cos_theta * k0[1],
                -sin_theta * cos_psi * t + cos_theta * k0[2],
            ]
        };

        if !k1.iter().all(|c| c.is_finite()) {
            return Err(Error::NumericalAnomaly {
                seed: rng.seed(),
                walker_index: 0,
                detail: "non-finite scattering direction".to_string(),
            });
        }
        normalize(&mut k1);
        walker.k1 = k1;
        Ok(())
    }
}

fn anomaly(seed: u32, walker_index: u64, detail: &str) -> Error {
    Error::NumericalAnomaly {
        seed,
        walker_index,
        detail: detail.to_string(),
    }
}

/// Fresnel reflectance for unpolarized light at an interface, given
/// `cos_theta0 = |k1.z|` (incoming angle against the interface normal),
/// `sin_theta0`, `cos_theta1`, `sin_theta1` (outgoing/refracted angle), and
/// the two refractive indices. Computed from sums/differences of sines and
/// cosines rather than the angles themselves, to avoid extra
/// trigonometric evaluations (`# 4.E` step 5).
fn fresnel_reflectance(
    k1z: Float,
    sin_theta0: Float,
    cos_theta1: Float,
    sin_theta1: Float,
    n0: Float,
    n1: Float,
) -> Float {
    let cos_theta0 = k1z.abs();
    if cos_theta0 > COSZERO {
        let r = (n1 - n0) / (n1 + n0);
        return r * r;
    }

    let cos_sum = cos_theta0 * cos_theta1 - sin_theta0 * sin_theta1;
    let cos_diff = cos_theta0 * cos_theta1 + sin_theta0 * sin_theta1;
    let sin_sum = sin_theta0 * cos_theta1 + cos_theta0 * sin_theta1;
    let sin_diff = sin_theta0 * cos_theta1 - cos_theta0 * sin_theta1;

    0.5 * sin_diff * sin_diff * (cos_diff * cos_diff + cos_sum * cos_sum)
        / (sin_sum * sin_sum * cos_diff * cos_diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use crate::walker::norm;

    fn index_matched_nonscattering_sample() -> Sample {
        Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(Material::non_scattering(1.0), 1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn ballistic_through_index_matched_stack() {
        let sample = index_matched_nonscattering_sample();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::pencil_beam();
        let mut rng = Rng::seeded(1);
        let outcome = engine.launch(&source, &mut rng, 1, 0).unwrap();
        assert_eq!(outcome.class, ExitClass::Ballistic);
    }

    #[test]
    fn backreflected_when_launched_upward_from_below() {
        let sample = index_matched_nonscattering_sample();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::new(
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
            Distribution::Delta(2.0), // below the sample's only layer
            Distribution::Delta(-1.0), // k.z = -1, launched upward
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
        );
        let mut rng = Rng::seeded(2);
        let outcome = engine.launch(&source, &mut rng, 2, 0).unwrap();
        assert_eq!(outcome.class, ExitClass::BackReflected);
    }

    #[test]
    fn half_infinite_source_launches_without_anomaly() {
        // A source in the upper half-space launching downward (z0 = -inf)
        // must clamp to the first finite boundary rather than leaving the
        // walker's z coordinate at -inf, which would otherwise make every
        // subsequent position non-finite and force an immediate anomaly.
        let sample = index_matched_nonscattering_sample();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::new(
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
            Distribution::Delta(Float::NEG_INFINITY),
            Distribution::Delta(1.0), // k.z = 1, launched downward
            Distribution::Delta(0.0),
            Distribution::Delta(0.0),
        );
        let mut rng = Rng::seeded(5);
        let outcome = engine.launch(&source, &mut rng, 5, 0).unwrap();
        assert_eq!(outcome.class, ExitClass::Ballistic);
        assert!(outcome.walker.walk_time.is_finite());
    }

    #[test]
    fn direction_stays_unit_length_throughout_scattering_stack() {
        let sample = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(Material::new(0.05, 0.8, 1.4), 1.0)
            .build()
            .unwrap();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::pencil_beam();
        let mut rng = Rng::seeded(3);
        for i in 0..200 {
            let outcome = engine.launch(&source, &mut rng, 3, i).unwrap();
            assert!((norm(outcome.walker.k0) - 1.0).abs() < 1e-6);
            assert!((norm(outcome.walker.k1) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn walk_time_is_non_negative_and_finite() {
        let sample = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(Material::new(0.1, 0.0, 1.4), 0.5)
            .layer(Material::new(0.3, -0.3, 1.3), 0.5)
            .build()
            .unwrap();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::pencil_beam();
        let mut rng = Rng::seeded(4);
        for i in 0..200 {
            let outcome = engine.launch(&source, &mut rng, 4, i).unwrap();
            assert!(outcome.walker.walk_time.is_finite());
            assert!(outcome.walker.walk_time >= -1e-9);
        }
    }

    #[test]
    fn total_internal_reflection_always_reflects() {
        // high-index to low-index interface beyond the critical angle
        let r = fresnel_tir_check(1.5, 1.0, 0.9);
        assert!(r);
    }

    fn fresnel_tir_check(n0: Float, n1: Float, cos_theta0: Float) -> bool {
        let sin_theta0 = (1.0 - cos_theta0 * cos_theta0).sqrt();
        let sin_theta1 = n0 * sin_theta0 / n1;
        sin_theta1 > 1.0
    }

    #[test]
    fn near_normal_fresnel_matches_simplified_formula() {
        let n0 = 1.0;
        let n1 = 1.4;
        let k1z: Float = 1.0 - 1e-13; // within COSZERO
        let sin_theta0 = (1.0 - k1z * k1z).max(0.0).sqrt();
        let sin_theta1 = n0 * sin_theta0 / n1;
        let cos_theta1 = (1.0 - sin_theta1 * sin_theta1).max(0.0).sqrt();
        let r = fresnel_reflectance(k1z, sin_theta0, cos_theta1, sin_theta1, n0, n1);
        let expected = ((n1 - n0) / (n1 + n0)).powi(2);
        float_cmp::assert_approx_eq!(Float, r, expected, epsilon = 1e-10);
    }

    #[test]
    fn many_walkers_reach_deterministic_counters_for_fixed_seed() {
        let sample = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(Material::new(0.1, 0.8, 1.4), 1.0)
            .build()
            .unwrap();
        let engine = Engine::new(&sample, true, 0.0);
        let source = Source::pencil_beam();

        let run = |seed: u32| {
            let mut rng = Rng::seeded(seed);
            (0..500)
                .map(|i| engine.launch(&source, &mut rng, seed, i).unwrap().class)
                .collect::<Vec<_>>()
        };

        assert_eq!(run(7), run(7));
    }
}
