//! Monte Carlo photon transport through multilayered, scattering,
//! refracting media.
//!
//! This crate is the engine: a seedable RNG stream ([`rng`]), the scalar
//! samplers built on top of it ([`distributions`]), the layered sample
//! model ([`material`], [`sample`]), the source that composes samplers
//! into an initial walker ([`source`]), the per-photon state machine
//! ([`walker`], [`engine`]) that advances it to an exit classification, the
//! thread-per-worker driver that partitions a run across seeds
//! ([`driver`]), the histogram/aggregation subsystem ([`histogram`]), and
//! the output adapter interface a caller persists results through
//! ([`sink`]).
//!
//! Everything here is format- and I/O-agnostic: no module reads a file or
//! parses a configuration language. That is the CLI crate's job.

pub mod distributions;
pub mod driver;
pub mod engine;
pub mod error;
pub mod float;
pub mod histogram;
pub mod material;
pub mod rng;
pub mod sample;
pub mod sink;
pub mod source;
pub mod walker;
