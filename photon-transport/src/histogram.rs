//! One- or two-dimensional binning over exit walkers, with domain-specific
//! normalization (`# 4.G`).

use crate::error::{Error, Result};
use crate::float::{Float, PI};
use crate::walker::Walker;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// What a histogram axis bins over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataDomain {
    /// Exit polar angle, `acos(k0.z)` in degrees.
    ExitAngle,
    /// Radial distance from the origin in the exit plane, `sqrt(x^2 + y^2)`.
    RadialPosition,
    /// Walk time.
    WalkTime,
}

/// One axis of a histogram: domain, bin edges, and derived bin count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Axis {
    domain: DataDomain,
    min: Float,
    max: Float,
    bin_size: Float,
    /// Includes one trailing overflow bin.
    n_bins: usize,
}

impl Axis {
    fn new(domain: DataDomain, min: Float, max: Float, bin_size: Float) -> Result<Self> {
        if !(bin_size.is_finite() && bin_size > 0.0) {
            return Err(Error::ConfigInvalid(
                "histogram bin size must be finite and positive".to_string(),
            ));
        }
        if !(max > min) {
            return Err(Error::ConfigInvalid(
                "histogram max must exceed min".to_string(),
            ));
        }
        let n_bins = ((max - min) / bin_size).ceil() as usize + 1; // +1 for overflow
        Ok(Self {
            domain,
            min,
            max,
            bin_size,
            n_bins,
        })
    }

    fn first_bin_center(&self) -> Float {
        self.min + self.bin_size * 0.5
    }

    fn coordinate(&self, w: &Walker) -> Float {
        match self.domain {
            // k1, not k0: the engine swaps k0/k1 in lockstep on every
            // committed step but not on the final boundary crossing that
            // ends the walk, so k1 holds the direction the walker actually
            // exited along.
            DataDomain::ExitAngle => w.k1[2].clamp(-1.0, 1.0).acos() * (180.0 / PI),
            DataDomain::RadialPosition => (w.r0[0] * w.r0[0] + w.r0[1] * w.r0[1]).sqrt(),
            DataDomain::WalkTime => w.walk_time,
        }
    }

    fn index(&self, w: &Walker) -> usize {
        let raw = ((self.coordinate(w) - self.min) / self.bin_size).floor();
        let clamped = raw.max(0.0) as usize;
        clamped.min(self.n_bins - 1)
    }
}

/// A 1D or 2D histogram over exit walkers (`# 4.G`).
///
/// Uses [`ndarray::Array2`] rather than a `calloc`'d flat `u_int64_t*`/
/// `MCfloat*` buffer pair, and an `Option<Axis>` rather than a `DATA_NONE`
/// second-domain sentinel — the type system expresses
/// "1D or 2D" directly instead of through a runtime tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Histogram {
    name: String,
    axis0: Axis,
    axis1: Option<Axis>,
    counts: Array2<u64>,
    /// One accumulator array per registered moment exponent. Only ever
    /// populated for 1D walk-time histograms (`# 4.G`, "spatial moments").
    moment_exponents: Vec<Float>,
    moments: Vec<Array2<Float>>,
    total_photons: u64,
}

impl Histogram {
    /// Starts building a 1D histogram.
    #[must_use]
    pub fn builder_1d(name: impl Into<String>, domain: DataDomain, min: Float, max: Float, bin_size: Float) -> Result<Self> {
        let axis0 = Axis::new(domain, min, max, bin_size)?;
        let counts = Array2::zeros((axis0.n_bins, 1));
        Ok(Self {
            name: name.into(),
            axis0,
            axis1: None,
            counts,
            moment_exponents: Vec::new(),
            moments: Vec::new(),
            total_photons: 0,
        })
    }

    /// Starts building a 2D histogram.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if either axis is malformed.
    pub fn builder_2d(
        name: impl Into<String>,
        domain0: DataDomain,
        min0: Float,
        max0: Float,
        bin_size0: Float,
        domain1: DataDomain,
        min1: Float,
        max1: Float,
        bin_size1: Float,
    ) -> Result<Self> {
        let axis0 = Axis::new(domain0, min0, max0, bin_size0)?;
        let axis1 = Axis::new(domain1, min1, max1, bin_size1)?;
        let counts = Array2::zeros((axis0.n_bins, axis1.n_bins));
        Ok(Self {
            name: name.into(),
            axis0,
            axis1: Some(axis1),
            counts,
            moment_exponents: Vec::new(),
            moments: Vec::new(),
            total_photons: 0,
        })
    }

    /// Whether this histogram bins over a single domain.
    #[must_use]
    pub fn is_1d(&self) -> bool {
        self.axis1.is_none()
    }

    /// Registers a spatial moment exponent `p`: `<|rho|^p>` will be
    /// accumulated per bin and emitted alongside the counts (`# 4.G`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if this histogram is not 1D over
    /// [`DataDomain::WalkTime`] — spatial moments are only meaningful
    /// time-resolved.
    pub fn add_moment_exponent(&mut self, exponent: Float) -> Result<()> {
        if !self.is_1d() || self.axis0.domain != DataDomain::WalkTime {
            return Err(Error::ConfigInvalid(
                "spatial moments require a 1D walk-time histogram".to_string(),
            ));
        }
        self.moment_exponents.push(exponent);
        self.moments.push(Array2::zeros((self.axis0.n_bins, 1)));
        Ok(())
    }

    /// Bins one batch of exit walkers, filtered by `pick` (the caller's
    /// `SaveFlags`/exit-class predicate).
    pub fn accumulate<'a>(&mut self, walkers: impl IntoIterator<Item = &'a Walker>) {
        for w in walkers {
            let i = self.axis0.index(w);
            let j = self.axis1.map_or(0, |axis| axis.index(w));
            self.counts[[i, j]] += 1;

            if !self.moment_exponents.is_empty() {
                let module = (w.r0[0] * w.r0[0] + w.r0[1] * w.r0[1]).sqrt();
                for (exp, acc) in self.moment_exponents.iter().zip(self.moments.iter_mut()) {
                    acc[[i, 0]] += module.powf(*exp);
                }
            }
        }
    }

    /// Merges another histogram's counts and moments into this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if `other`'s binning doesn't match.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.counts.dim() != other.counts.dim() {
            return Err(Error::ConfigInvalid(
                "cannot merge histograms with different binning".to_string(),
            ));
        }
        self.counts += &other.counts;
        for (mine, theirs) in self.moments.iter_mut().zip(other.moments.iter()) {
            *mine += theirs;
        }
        self.total_photons += other.total_photons;
        Ok(())
    }

    /// Sets the total photon count used to normalize walk-time histograms.
    pub fn set_total_photons(&mut self, total: u64) {
        self.total_photons = total;
    }

    /// Raw (unnormalized) counts.
    #[must_use]
    pub const fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Name this histogram will be stored under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bin-center coordinate on axis 0.
    #[must_use]
    pub fn bin_center_0(&self, i: usize) -> Float {
        self.axis0.first_bin_center() + i as Float * self.axis0.bin_size
    }

    /// Bin-center coordinate on axis 1, if present.
    #[must_use]
    pub fn bin_center_1(&self, j: usize) -> Option<Float> {
        self.axis1.map(|a| a.first_bin_center() + j as Float * a.bin_size)
    }

    /// Normalized counts, dividing each bin by the per-domain normalization
    /// factor:
    ///
    /// - [`DataDomain::ExitAngle`]: divided by the solid angle subtended by
    ///   the bin's annulus on the unit sphere, `4*pi*sin(theta_c)*sin(dtheta/2)`.
    /// - [`DataDomain::RadialPosition`]: divided by the bin's projected
    ///   annulus area, `2*pi*r_c*dr^2`.
    /// - [`DataDomain::WalkTime`]: divided by `total_photons` only.
    ///
    /// Both factors additionally scale by `total_photons` where it is set
    /// (zero is treated as "unset": no additional division).
    #[must_use]
    pub fn normalized(&self) -> Array2<Float> {
        let scale = if self.total_photons == 0 {
            1.0
        } else {
            self.total_photons as Float
        };
        let mut out = Array2::zeros(self.counts.dim());
        for i in 0..self.axis0.n_bins {
            let factor = match self.axis0.domain {
                DataDomain::ExitAngle => {
                    let deg_per_rad = 180.0 / PI;
                    let theta_c = ((i as Float + 0.5) * self.axis0.bin_size / deg_per_rad).sin();
                    let half_bin = (self.axis0.bin_size / 2.0 / deg_per_rad).sin();
                    scale * 4.0 * PI * theta_c * half_bin
                }
                DataDomain::RadialPosition => {
                    let dr = self.axis0.bin_size;
                    scale * 2.0 * PI * (i as Float + 0.5) * dr * dr
                }
                DataDomain::WalkTime => scale,
            };
            for j in 0..self.counts.dim().1 {
                out[[i, j]] = self.counts[[i, j]] as Float / factor;
            }
        }
        out
    }

    /// The moment accumulators normalized by per-bin counts
    /// (`moments[i] / histo[i]`), one array per registered exponent, in
    /// registration order.
    #[must_use]
    pub fn normalized_moments(&self) -> Vec<Array2<Float>> {
        self.moments
            .iter()
            .map(|acc| {
                let mut out = Array2::zeros(acc.dim());
                for i in 0..self.axis0.n_bins {
                    let count = self.counts[[i, 0]] as Float;
                    out[[i, 0]] = if count > 0.0 { acc[[i, 0]] / count } else { 0.0 };
                }
                out
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walker_at_time(t: Float) -> Walker {
        Walker {
            r0: [0.0, 0.0, 0.0],
            r1: [0.0, 0.0, 0.0],
            k0: [0.0, 0.0, 1.0],
            k1: [0.0, 0.0, 1.0],
            walk_time: t,
        }
    }

    #[test]
    fn overflow_bin_clamps_out_of_range_values() {
        let mut h = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        h.accumulate([&walker_at_time(1000.0)]);
        let last = h.counts().dim().0 - 1;
        assert_eq!(h.counts()[[last, 0]], 1);
    }

    #[test]
    fn counts_land_in_expected_bin() {
        let mut h = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        h.accumulate([&walker_at_time(3.5)]);
        assert_eq!(h.counts()[[3, 0]], 1);
    }

    #[test]
    fn merge_sums_counts() {
        let mut a = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        let mut b = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        a.accumulate([&walker_at_time(1.0)]);
        b.accumulate([&walker_at_time(1.0)]);
        a.merge(&b).unwrap();
        assert_eq!(a.counts()[[1, 0]], 2);
    }

    #[test]
    fn merge_rejects_mismatched_binning() {
        let mut a = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        let b = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 20.0, 1.0).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn moment_exponents_require_time_domain() {
        let mut h = Histogram::builder_1d("a", DataDomain::ExitAngle, 0.0, 90.0, 1.0).unwrap();
        assert!(h.add_moment_exponent(2.0).is_err());
    }

    #[test]
    fn moment_tracks_mean_square_radius() {
        let mut h = Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 1.0).unwrap();
        h.add_moment_exponent(2.0).unwrap();
        let mut w = walker_at_time(1.0);
        w.r0 = [3.0, 4.0, 0.0]; // radius 5
        h.accumulate([&w]);
        let moments = h.normalized_moments();
        assert!((moments[0][[1, 0]] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_bin_size() {
        assert!(Histogram::builder_1d("t", DataDomain::WalkTime, 0.0, 10.0, 0.0).is_err());
    }
}
