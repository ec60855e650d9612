//! The `histogram` subcommand: bin a previously written output file's saved
//! per-walker data and print the normalized result.
//!
//! Flag arguments choose a domain, bin range, and bin size per axis, a
//! letter code selects which exit classes to combine, and the printed table
//! is the bin-center / normalized-value pairs. Rather than read counters
//! straight out of the output file's raw arrays, this subcommand rebuilds a
//! synthetic [`Walker`] per saved sample so it can reuse
//! [`Histogram::accumulate`] instead of duplicating its binning logic.

use crate::{helpers, GlobalConfiguration, Subcommand};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum, ValueHint};
use photon_transport::float::Float;
use photon_transport::histogram::{DataDomain, Histogram};
use photon_transport::sink::{OutputSink, RunRecord, StoreFile};
use photon_transport::walker::{DirectionAxes, ExitClass, Walker};
use prettytable::{cell, row};
use std::path::PathBuf;
use std::process::ExitCode;

/// `clap`-facing mirror of [`DataDomain`]; kept separate so the engine's
/// domain enum doesn't need to derive `clap::ValueEnum`.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Domain {
    ExitAngle,
    RadialPosition,
    WalkTime,
}

impl From<Domain> for DataDomain {
    fn from(d: Domain) -> Self {
        match d {
            Domain::ExitAngle => Self::ExitAngle,
            Domain::RadialPosition => Self::RadialPosition,
            Domain::WalkTime => Self::WalkTime,
        }
    }
}

#[derive(Args, Debug)]
pub struct Opts {
    /// Output file written by `run`.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// The file is LZ4-framed.
    #[arg(long)]
    compressed: bool,

    /// Exit classes (`t`/`b`/`r`/`k`) to combine into this histogram.
    #[arg(long, default_value = "tbrk")]
    classes: String,

    /// First axis's domain.
    #[arg(long, value_enum)]
    domain0: Domain,
    /// First axis's lower bin edge.
    #[arg(long)]
    min0: f64,
    /// First axis's upper bin edge.
    #[arg(long)]
    max0: f64,
    /// First axis's bin size.
    #[arg(long)]
    bin0: f64,

    /// Optional second axis's domain, for a 2D histogram.
    #[arg(long, value_enum)]
    domain1: Option<Domain>,
    /// Second axis's lower bin edge.
    #[arg(long, requires = "domain1")]
    min1: Option<f64>,
    /// Second axis's upper bin edge.
    #[arg(long, requires = "domain1")]
    max1: Option<f64>,
    /// Second axis's bin size.
    #[arg(long, requires = "domain1")]
    bin1: Option<f64>,

    /// Spatial moment exponents to report alongside a 1D walk-time
    /// histogram's counts (`<|rho|^p>` per bin).
    #[arg(long)]
    moment: Vec<f64>,

    /// Print only every M-th row of axis 0.
    #[arg(short = 'm', default_value_t = 1)]
    every_mth: usize,

    /// Print only every N-th column of axis 1, for a 2D histogram.
    #[arg(short = 'n', default_value_t = 1)]
    every_nth: usize,
}

/// Rebuilds the walkers a `run` invocation saved for `class`, as far as the
/// fields `need_position`/`need_direction`/`need_time` actually require.
fn synthetic_walkers(
    record: &RunRecord,
    class: ExitClass,
    need_position: bool,
    need_direction: bool,
    need_time: bool,
) -> Result<Vec<Walker>> {
    let name = class.dataset_name();

    let points = record.exit_points.get(name);
    let times = record.walk_times.get(name);
    let kvecs = record.exit_k_vectors.get(name);

    if need_position && points.is_none() {
        bail!("no exit points were saved for class '{name}'");
    }
    if need_time && times.is_none() {
        bail!("no walk times were saved for class '{name}'");
    }
    if need_direction && (kvecs.is_none() || !record.k_axes.contains(DirectionAxes::Z)) {
        bail!("no z-direction component was saved for class '{name}'");
    }

    let n = points
        .map(|p| p.len() / 2)
        .or_else(|| times.map(Vec::len))
        .or_else(|| {
            kvecs.map(|k| {
                let stride = record.k_axes.bits().count_ones().max(1) as usize;
                k.len() / stride
            })
        })
        .unwrap_or(0);

    let stride = record.k_axes.bits().count_ones().max(1) as usize;
    let mut walkers = Vec::with_capacity(n);
    for i in 0..n {
        let r0 = points.map_or([0.0, 0.0, 0.0], |p| [p[2 * i], p[2 * i + 1], 0.0]);
        let walk_time = times.map_or(0.0, |t| t[i]);
        let k0 = kvecs.map_or([0.0, 0.0, 1.0], |k| expand_k(record.k_axes, k, i * stride));
        walkers.push(Walker {
            r0,
            r1: r0,
            k0,
            k1: k0,
            walk_time,
        });
    }
    Ok(walkers)
}

fn expand_k(axes: DirectionAxes, raw: &[Float], offset: usize) -> [Float; 3] {
    let mut out = [0.0, 0.0, 0.0];
    let mut cursor = offset;
    if axes.contains(DirectionAxes::X) {
        out[0] = raw[cursor];
        cursor += 1;
    }
    if axes.contains(DirectionAxes::Y) {
        out[1] = raw[cursor];
        cursor += 1;
    }
    if axes.contains(DirectionAxes::Z) {
        out[2] = raw[cursor];
    }
    out
}

impl Subcommand for Opts {
    fn run(&self, _cfg: &GlobalConfiguration) -> Result<ExitCode> {
        let record = StoreFile::new(&self.input, self.compressed)
            .load()
            .with_context(|| format!("loading '{}'", self.input.display()))?;

        let classes = helpers::parse_walker_flags(&self.classes)?;
        let domain0: DataDomain = self.domain0.into();
        let domain1: Option<DataDomain> = self.domain1.map(Into::into);

        let need_position = domain0 == DataDomain::RadialPosition
            || domain1 == Some(DataDomain::RadialPosition);
        let need_direction =
            domain0 == DataDomain::ExitAngle || domain1 == Some(DataDomain::ExitAngle);
        let need_time = domain0 == DataDomain::WalkTime || domain1 == Some(DataDomain::WalkTime);

        let mut walkers = Vec::new();
        for class in ExitClass::ALL {
            if !classes.includes(class) {
                continue;
            }
            walkers.extend(synthetic_walkers(
                &record,
                class,
                need_position,
                need_direction,
                need_time,
            )?);
        }

        let mut histogram = match (domain1, self.min1, self.max1, self.bin1) {
            (Some(d1), Some(min1), Some(max1), Some(bin1)) => Histogram::builder_2d(
                "histogram",
                domain0,
                self.min0 as Float,
                self.max0 as Float,
                self.bin0 as Float,
                d1,
                min1 as Float,
                max1 as Float,
                bin1 as Float,
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?,
            (Some(_), _, _, _) => bail!("--domain1 requires --min1, --max1, and --bin1"),
            (None, _, _, _) => Histogram::builder_1d(
                "histogram",
                domain0,
                self.min0 as Float,
                self.max0 as Float,
                self.bin0 as Float,
            )
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        };

        for exponent in &self.moment {
            histogram
                .add_moment_exponent(*exponent as Float)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }

        histogram.accumulate(walkers.iter());
        // Normalization is per photon launched in the whole run, not per
        // photon landing in this histogram's class selection (`# 4.G`).
        let total_photons: u64 = record.exit_counts.values().sum();
        histogram.set_total_photons(total_photons);

        let normalized = histogram.normalized();
        let moments = histogram.normalized_moments();

        let every_mth = self.every_mth.max(1);
        let every_nth = self.every_nth.max(1);

        let mut table = helpers::create_table();
        if histogram.is_1d() {
            let mut titles = row!["bin center", "value"];
            for i in 0..self.moment.len() {
                titles.add_cell(cell!(format!("moment[{i}]")));
            }
            table.set_titles(titles);
            for i in (0..normalized.dim().0).step_by(every_mth) {
                let mut r = row![
                    format!("{:.6}", histogram.bin_center_0(i)),
                    format!("{:.6}", normalized[[i, 0]])
                ];
                for m in &moments {
                    r.add_cell(cell!(format!("{:.6}", m[[i, 0]])));
                }
                table.add_row(r);
            }
        } else {
            table.set_titles(row!["bin center 0", "bin center 1", "value"]);
            for i in (0..normalized.dim().0).step_by(every_mth) {
                for j in (0..normalized.dim().1).step_by(every_nth) {
                    table.add_row(row![
                        format!("{:.6}", histogram.bin_center_0(i)),
                        format!("{:.6}", histogram.bin_center_1(j).unwrap_or(0.0)),
                        format!("{:.6}", normalized[[i, j]])
                    ]);
                }
            }
        }
        table.printstd();

        Ok(ExitCode::SUCCESS)
    }
}
