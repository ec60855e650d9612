//! Partitions a run across a fixed worker count and drives them to
//! completion (`# 4.F`).
//!
//! Progress reporting and cooperative termination are exposed as plain
//! values rather than wired to OS signals: callers poll [`Progress::snapshot`]
//! and call [`Progress::request_termination`] directly. Underneath, both are
//! an atomic counter per worker and an atomic termination flag checked once
//! per walker, which is what a signal handler would flip in a host program
//! that wants that behavior.
//!
//! `std::thread::scope` is used rather than a work-stealing pool: exactly
//! `w` OS threads are wanted, each owning a deterministic, disjoint share of
//! the walker count and its own RNG stream, joined at the end of the run. A
//! work-stealing scheduler would make that partition ambient rather than
//! explicit, so `rayon` is not used here; see `DESIGN.md`.

use crate::engine::Engine;
use crate::float::Float;
use crate::histogram::Histogram;
use crate::rng::{Rng, RngState};
use crate::sample::Sample;
use crate::source::Source;
use crate::walker::{ExitClass, Walker};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One worker's starting point: either a fresh seed or a previously saved
/// state to resume from (`# 4.F`).
#[derive(Clone, Debug)]
pub enum WorkerStart {
    /// Seed a fresh MT19937 stream.
    Seed(u32),
    /// Resume a stream from a saved state.
    Resume(RngState),
}

/// The outcome of one worker's share of the run.
#[derive(Debug, Default)]
pub struct WorkerResult {
    /// Exit outcomes for every walker this worker completed before
    /// finishing or being asked to terminate.
    pub walkers: Vec<(Walker, ExitClass)>,
    /// The worker's RNG state at the point it stopped, for later resumption.
    pub final_state: Option<RngState>,
    /// Walkers this worker dropped because they produced a numerical
    /// anomaly (`# 4.E`); carried here rather than propagated as a run
    /// failure, per the recovery policy in `# 7`.
    pub anomalies: Vec<crate::error::Error>,
}

/// Live progress counters, one per worker, safe to read from any thread
/// while the run is in flight.
pub struct Progress {
    completed: Vec<AtomicU64>,
    terminate: AtomicBool,
}

impl Progress {
    fn new(n_workers: usize) -> Self {
        Self {
            completed: (0..n_workers).map(|_| AtomicU64::new(0)).collect(),
            terminate: AtomicBool::new(false),
        }
    }

    /// Walkers completed so far by each worker, in worker order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u64> {
        self.completed.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Requests cooperative termination: every worker checks this once per
    /// walker and stops early, returning what it has completed so far.
    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }
}

/// Drives a fixed [`Sample`]/[`Source`] pair across `w` worker threads
/// (`# 4.F`).
pub struct Driver<'a> {
    sample: &'a Sample,
    source: &'a Source,
    fresnel_enabled: bool,
    time_origin_z: Float,
}

impl<'a> Driver<'a> {
    /// Builds a driver over a fixed sample and source.
    #[must_use]
    pub const fn new(sample: &'a Sample, source: &'a Source, fresnel_enabled: bool, time_origin_z: Float) -> Self {
        Self {
            sample,
            source,
            fresnel_enabled,
            time_origin_z,
        }
    }

    /// Splits `total_walkers` as evenly as possible across `starts.len()`
    /// workers (remainder distributed to the first workers), spawns one OS
    /// thread per worker via [`std::thread::scope`], and joins all of them
    /// before returning.
    ///
    /// Returns one [`WorkerResult`] per worker, in the same order as
    /// `starts`, plus a [`Progress`] handle that was live for the duration
    /// of the run (useful to callers that want a final snapshot, or that
    /// spawned this call itself from another thread and held onto the
    /// handle to request early termination).
    pub fn run(&self, starts: &[WorkerStart], total_walkers: u64) -> Vec<WorkerResult> {
        let n_workers = starts.len();
        let progress = Progress::new(n_workers);
        let per_worker = total_walkers / n_workers as u64;
        let remainder = total_walkers % n_workers as u64;

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_workers);
            for (i, start) in starts.iter().enumerate() {
                let share = per_worker + u64::from((i as u64) < remainder);
                let progress = &progress;
                let this = &*self;
                handles.push(scope.spawn(move || this.run_worker(i, start, share, progress)));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    /// Runs this driver's share of walkers on the calling thread, used as
    /// the body each spawned worker thread executes.
    fn run_worker(
        &self,
        worker_index: usize,
        start: &WorkerStart,
        share: u64,
        progress: &Progress,
    ) -> WorkerResult {
        let mut rng = match start.clone() {
            WorkerStart::Seed(seed) => Rng::seeded(seed),
            WorkerStart::Resume(state) => match Rng::from_state(state) {
                Ok(rng) => rng,
                Err(e) => {
                    return WorkerResult {
                        anomalies: vec![e],
                        ..Default::default()
                    }
                }
            },
        };
        let seed = rng.seed();
        let engine = Engine::new(self.sample, self.fresnel_enabled, self.time_origin_z);

        let mut result = WorkerResult::default();
        for walker_index in 0..share {
            if progress.should_terminate() {
                break;
            }
            match engine.launch(self.source, &mut rng, seed, walker_index) {
                Ok(outcome) => result.walkers.push((outcome.walker, outcome.class)),
                Err(e) => result.anomalies.push(e),
            }
            progress.completed[worker_index].fetch_add(1, Ordering::Relaxed);
        }
        result.final_state = Some(rng.state());
        result
    }
}

/// Bins every worker's surviving walkers into `histogram`, restricted to
/// `classes`. A convenience composing [`Driver::run`]'s output with
/// [`Histogram::accumulate`]; the driver itself stays histogram-agnostic so
/// callers can bin the same run's output into several histograms at once.
pub fn bin_results(results: &[WorkerResult], classes: &[ExitClass], histogram: &mut Histogram) {
    for result in results {
        let matching = result
            .walkers
            .iter()
            .filter(|(_, class)| classes.contains(class))
            .map(|(w, _)| w);
        histogram.accumulate(matching);
    }
}

/// Total walkers, by exit class, across every worker's results.
#[must_use]
pub fn exit_counts(results: &[WorkerResult]) -> std::collections::HashMap<String, u64> {
    let mut counts = std::collections::HashMap::new();
    for class in ExitClass::ALL {
        let n: u64 = results
            .iter()
            .flat_map(|r| r.walkers.iter())
            .filter(|(_, c)| *c == class)
            .count() as u64;
        counts.insert(class.dataset_name().to_string(), n);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;

    fn setup() -> (Sample, Source) {
        let sample = Sample::builder(Material::non_scattering(1.0), Material::non_scattering(1.0))
            .layer(Material::new(0.1, 0.8, 1.4), 1.0)
            .build()
            .unwrap();
        (sample, Source::pencil_beam())
    }

    #[test]
    fn splits_walkers_evenly_with_remainder_to_first_workers() {
        let (sample, source) = setup();
        let driver = Driver::new(&sample, &source, true, 0.0);
        let starts = vec![WorkerStart::Seed(1), WorkerStart::Seed(2), WorkerStart::Seed(3)];
        let results = driver.run(&starts, 10);
        let shares: Vec<usize> = results.iter().map(|r| r.walkers.len() + r.anomalies.len()).collect();
        assert_eq!(shares.iter().sum::<usize>(), 10);
        assert!(shares[0] >= shares[2]);
    }

    #[test]
    fn same_seeds_produce_same_exit_counts() {
        let (sample, source) = setup();
        let driver = Driver::new(&sample, &source, true, 0.0);
        let starts = vec![WorkerStart::Seed(42), WorkerStart::Seed(43)];

        let r1 = exit_counts(&driver.run(&starts, 200));
        let r2 = exit_counts(&driver.run(&starts, 200));
        assert_eq!(r1, r2);
    }

    #[test]
    fn worker_final_state_can_resume_stream() {
        let (sample, source) = setup();
        let driver = Driver::new(&sample, &source, true, 0.0);
        let starts = vec![WorkerStart::Seed(7)];
        let results = driver.run(&starts, 50);
        let state = results[0].final_state.clone().unwrap();

        let resumed_starts = vec![WorkerStart::Resume(state)];
        let resumed = driver.run(&resumed_starts, 10);
        assert_eq!(resumed[0].walkers.len() + resumed[0].anomalies.len(), 10);
    }

    #[test]
    fn bin_results_only_includes_requested_classes() {
        let (sample, source) = setup();
        let driver = Driver::new(&sample, &source, true, 0.0);
        let starts = vec![WorkerStart::Seed(9)];
        let results = driver.run(&starts, 300);

        let mut histogram =
            Histogram::builder_1d("t", crate::histogram::DataDomain::WalkTime, 0.0, 100.0, 1.0).unwrap();
        bin_results(&results, &[ExitClass::Transmitted], &mut histogram);
        let binned: u64 = histogram.counts().iter().sum();
        let transmitted = results
            .iter()
            .flat_map(|r| r.walkers.iter())
            .filter(|(_, c)| *c == ExitClass::Transmitted)
            .count() as u64;
        assert_eq!(binned, transmitted);
    }
}
