#![allow(clippy::missing_errors_doc)]

//! Command surface for the photon-transport engine.
//!
//! A simulation driver that consumes an XML description and produces a
//! result file, and a standalone histogram tool that reads a result file
//! back, are folded into one binary with two subcommands here, rather than
//! shipped as two separate programs.

mod helpers;
mod histogram_cmd;
mod run;
mod xmlconfig;

use anyhow::Result;
use clap::Parser;
use enum_dispatch::enum_dispatch;
use std::process::ExitCode;

/// Options shared by every subcommand.
#[derive(Parser, Debug)]
pub struct GlobalConfiguration {
    /// Only print warnings and errors, suppressing informational tracing
    /// output.
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[enum_dispatch]
pub trait Subcommand {
    /// Runs this subcommand, returning the process exit code (`# 6`:
    /// "Exit code 0 on success, non-zero on argument or I/O error").
    fn run(&self, cfg: &GlobalConfiguration) -> Result<ExitCode>;
}

#[enum_dispatch(Subcommand)]
#[derive(Parser, Debug)]
pub enum SubcommandEnum {
    Run(run::Opts),
    Histogram(histogram_cmd::Opts),
}

#[derive(Parser, Debug)]
#[command(
    arg_required_else_help = true,
    author,
    about = "Monte Carlo photon transport through layered scattering media",
    disable_help_subcommand = true,
    name = "photon-transport",
    version
)]
pub struct Opts {
    #[command(flatten)]
    pub configuration: GlobalConfiguration,
    #[command(subcommand)]
    pub subcommand: SubcommandEnum,
}
