//! Output adapter interface (`# 4.H`) and a concrete file-backed
//! implementation.
//!
//! The on-disk format is unconstrained beyond naming the datasets a
//! conforming adapter must expose; it is deliberately the shallowest
//! component here. Rather than fabricate an HDF5 binding this crate doesn't
//! otherwise need, the concrete adapter follows [`crate::rng::RngState`]'s
//! own precedent: `bincode` framed in an optional `lz4_flex` envelope, the
//! same pairing `pineappl::grid::Grid::read`/`Grid::write` use.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::histogram::Histogram;
use crate::rng::RngState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

/// Everything one simulation run accumulates and that a conforming output
/// adapter must be able to persist and reload (`# 4.H`, `# 6` "Output
/// file"):
///
/// - the final RNG state of every worker, keyed by its starting seed, so a
///   run can be resumed or extended deterministically (`RNGStates/seed<N>`);
/// - one or more named histograms, a post-processing convenience beyond
///   what `# 6` itself mandates;
/// - the total count of walkers launched, per exit class
///   (`photon-counters`);
/// - per-walker exit points, walk times, and exit direction vectors, each
///   keyed by [`crate::walker::ExitClass::dataset_name`], present only for
///   the classes a run's `SaveFlags` selected (`exit-points/`,
///   `walk-times/`, `exit-k-vectors/`);
/// - the XML description the run was configured from, verbatim
///   (`XMLDescription`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    /// Final RNG state per worker, keyed by starting seed (`# 6`,
    /// `RNGStates/seed<N>`).
    pub rng_states: HashMap<u32, RngState>,
    /// Named histograms produced by this run.
    pub histograms: Vec<Histogram>,
    /// Walkers launched per exit class, independent of histogram binning.
    pub exit_counts: HashMap<String, u64>,
    /// Exit positions, two floats (x, y) per walker, keyed by
    /// [`crate::walker::ExitClass::dataset_name`]. Only present for classes
    /// a run's exit-point `SaveFlags` selected.
    pub exit_points: HashMap<String, Vec<Float>>,
    /// Accumulated walk times, one float per walker, keyed the same way.
    pub walk_times: HashMap<String, Vec<Float>>,
    /// Exit direction vectors, 1-3 floats per walker depending on
    /// `k_axes`, keyed the same way.
    pub exit_k_vectors: HashMap<String, Vec<Float>>,
    /// Which components of `k` the vectors in `exit_k_vectors` carry, and
    /// in what order (`# 3`, "direction-axis mask"). One mask applies to
    /// the whole run, not per exit class.
    pub k_axes: crate::walker::DirectionAxes,
    /// The XML input this run was configured from, if the caller chose to
    /// persist it (`# 6`, `XMLDescription`).
    pub xml_description: Option<String>,
}

impl RunRecord {
    /// An empty record ready to be filled in as a run progresses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng_states: HashMap::new(),
            histograms: Vec::new(),
            exit_counts: HashMap::new(),
            exit_points: HashMap::new(),
            walk_times: HashMap::new(),
            exit_k_vectors: HashMap::new(),
            k_axes: crate::walker::DirectionAxes::empty(),
            xml_description: None,
        }
    }
}

impl Default for RunRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can persist and reload a [`RunRecord`] (`# 4.H`).
///
/// This is intentionally a thin seam: the concrete wire format is out of
/// scope for this crate, so the trait exists to let callers (and tests) swap
/// in an in-memory or alternate-format implementation without the engine,
/// driver, or histogram modules depending on any one format.
pub trait OutputSink {
    /// Persists `record`, replacing any prior contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if the underlying storage cannot be
    /// written.
    fn store(&mut self, record: &RunRecord) -> Result<()>;

    /// Loads a previously stored record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if the underlying storage cannot be
    /// read, or [`Error::ParseError`] if its contents are malformed.
    fn load(&self) -> Result<RunRecord>;
}

/// A [`RunRecord`] persisted to a single file, `bincode`-encoded and
/// optionally `lz4_flex`-framed.
pub struct StoreFile {
    path: std::path::PathBuf,
    compressed: bool,
}

impl StoreFile {
    /// A store backed by `path`. When `compressed` is set, [`Self::store`]
    /// wraps the `bincode` stream in an LZ4 frame; [`Self::load`] always
    /// tries the LZ4 frame header first and falls back to a raw `bincode`
    /// stream, so compressed and uncompressed files interoperate
    /// transparently (mirroring `Grid::read`'s own fallback).
    #[must_use]
    pub fn new(path: impl AsRef<Path>, compressed: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            compressed,
        }
    }

    fn io_err(&self, source: std::io::Error) -> Error {
        Error::IoFailure {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl OutputSink for StoreFile {
    fn store(&mut self, record: &RunRecord) -> Result<()> {
        let file = std::fs::File::create(&self.path).map_err(|e| self.io_err(e))?;
        if self.compressed {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(file);
            bincode::serialize_into(&mut encoder, record)
                .map_err(|e| Error::Other(e.into()))?;
            encoder.finish().map_err(|e| {
                self.io_err(std::io::Error::new(std::io::ErrorKind::Other, e))
            })?;
        } else {
            bincode::serialize_into(file, record).map_err(|e| Error::Other(e.into()))?;
        }
        Ok(())
    }

    fn load(&self) -> Result<RunRecord> {
        use std::io::{Seek, SeekFrom};

        let mut file = std::fs::File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut magic = [0u8; 4];
        let n = file.read(&mut magic).map_err(|e| self.io_err(e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_err(e))?;

        const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];
        if n == 4 && magic == LZ4_FRAME_MAGIC {
            let decoder = lz4_flex::frame::FrameDecoder::new(file);
            bincode::deserialize_from(decoder)
                .map_err(|e| Error::ParseError(format!("malformed run record: {e}")))
        } else {
            bincode::deserialize_from(file)
                .map_err(|e| Error::ParseError(format!("malformed run record: {e}")))
        }
    }
}
