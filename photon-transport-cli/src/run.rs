//! The `run` subcommand: configure a simulation from an XML description and
//! drive it to completion.
//!
//! This is the minimal front end needed to make the workspace end-to-end
//! runnable: something has to consume an XML description and produce an
//! output file before the `histogram` subcommand has anything to read.

use crate::{helpers, xmlconfig, GlobalConfiguration, Subcommand};
use anyhow::{bail, Context, Result};
use clap::{Args, ValueHint};
use photon_transport::driver::{self, Driver, WorkerStart};
use photon_transport::float::Float;
use photon_transport::rng::RngState;
use photon_transport::sink::{OutputSink, RunRecord, StoreFile};
use photon_transport::walker::ExitClass;
use prettytable::row;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct Opts {
    /// XML input description.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// File the run's results are written to.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Total number of walkers to simulate.
    #[arg(short = 'N', long, default_value_t = 100_000)]
    walkers: u64,

    /// Number of worker threads; defaults to the available parallelism.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Base RNG seed. Worker `i` is seeded `seed + i`, unless `--resume` is
    /// given.
    #[arg(long, default_value_t = 1)]
    seed: u32,

    /// Resume from a previous output file's saved RNG states instead of
    /// seeding fresh streams. The file must carry exactly as many saved
    /// states as `--workers` requests.
    #[arg(long, value_hint = ValueHint::FilePath)]
    resume: Option<PathBuf>,

    /// LZ4-frame the output file.
    #[arg(long)]
    compressed: bool,

    /// Disable Fresnel reflectance at interfaces: crossings always refract
    /// (or totally internally reflect, the one case Fresnel doesn't govern).
    #[arg(long)]
    no_fresnel: bool,

    /// Depth at which `walk_time = 0` is defined.
    #[arg(long, default_value_t = 0.0)]
    time_origin_z: f64,

    /// Exit classes (`t`/`b`/`r`/`k`) to save exit points for.
    #[arg(long, default_value = "tbrk")]
    save_points: String,

    /// Exit classes to save walk times for.
    #[arg(long, default_value = "tbrk")]
    save_times: String,

    /// Exit classes to save exit directions for.
    #[arg(long, default_value = "tbrk")]
    save_k: String,

    /// Direction components (`x`/`y`/`z`) to save, for classes `--save-k`
    /// selects.
    #[arg(long, default_value = "xyz")]
    k_axes: String,
}

impl Subcommand for Opts {
    fn run(&self, _cfg: &GlobalConfiguration) -> Result<ExitCode> {
        let xml = std::fs::read_to_string(&self.input)
            .with_context(|| format!("reading '{}'", self.input.display()))?;
        let config =
            xmlconfig::parse(&xml).with_context(|| format!("parsing '{}'", self.input.display()))?;

        let workers = self.workers.unwrap_or_else(helpers::default_workers).max(1);

        let starts: Vec<WorkerStart> = if let Some(resume_path) = &self.resume {
            let prior = StoreFile::new(resume_path, self.compressed)
                .load()
                .with_context(|| format!("loading '{}'", resume_path.display()))?;
            let mut states: Vec<RngState> = prior.rng_states.into_values().collect();
            states.sort_by_key(RngState::seed);
            if states.len() != workers {
                bail!(
                    "resume file has {} saved RNG states, but {workers} workers were requested",
                    states.len()
                );
            }
            states.into_iter().map(WorkerStart::Resume).collect()
        } else {
            (0..workers as u32)
                .map(|i| WorkerStart::Seed(self.seed + i))
                .collect()
        };

        let driver = Driver::new(
            &config.sample,
            &config.source,
            !self.no_fresnel,
            self.time_origin_z as Float,
        );
        let results = driver.run(&starts, self.walkers);

        for result in &results {
            for anomaly in &result.anomalies {
                tracing::warn!(%anomaly, "walker dropped");
            }
        }

        let save_points = helpers::parse_walker_flags(&self.save_points)?;
        let save_times = helpers::parse_walker_flags(&self.save_times)?;
        let save_k = helpers::parse_walker_flags(&self.save_k)?;
        let k_axes = helpers::parse_direction_axes(&self.k_axes)?;

        let mut record = RunRecord::new();
        record.xml_description = Some(xml);
        record.k_axes = k_axes;
        record.exit_counts = driver::exit_counts(&results);

        for class in ExitClass::ALL {
            let matching: Vec<_> = results
                .iter()
                .flat_map(|r| r.walkers.iter())
                .filter(|(_, c)| *c == class)
                .map(|(w, _)| w)
                .collect();
            let name = class.dataset_name().to_string();

            if save_points.includes(class) {
                let mut points = Vec::with_capacity(matching.len() * 2);
                for w in &matching {
                    points.push(w.r0[0]);
                    points.push(w.r0[1]);
                }
                record.exit_points.insert(name.clone(), points);
            }
            if save_times.includes(class) {
                record
                    .walk_times
                    .insert(name.clone(), matching.iter().map(|w| w.walk_time).collect());
            }
            if save_k.includes(class) {
                let mut ks = Vec::new();
                for w in &matching {
                    // k1, not k0: the engine swaps k0/k1 in lockstep on every
                    // committed (non-exiting) step but does not swap on the
                    // final boundary crossing, so k1 carries the direction
                    // the walker was actually moving in when it left the
                    // sample — a walker can only leave while moving away
                    // from the interface it crosses.
                    k_axes.extract(w.k1, &mut ks);
                }
                record.exit_k_vectors.insert(name, ks);
            }
        }

        for result in &results {
            if let Some(state) = &result.final_state {
                record.rng_states.insert(state.seed(), state.clone());
            }
        }

        let mut sink = StoreFile::new(&self.output, self.compressed);
        sink.store(&record)
            .with_context(|| format!("writing '{}'", self.output.display()))?;

        let mut table = helpers::create_table();
        table.set_titles(row!["exit class", "count"]);
        for class in ExitClass::ALL {
            let count = record
                .exit_counts
                .get(class.dataset_name())
                .copied()
                .unwrap_or(0);
            table.add_row(row![class.dataset_name(), count]);
        }
        table.printstd();

        Ok(ExitCode::SUCCESS)
    }
}
