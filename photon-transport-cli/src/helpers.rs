//! Small pieces shared by more than one subcommand: table formatting and the
//! letter-code parsers used for flag arguments.

use anyhow::{anyhow, Result};
use photon_transport::walker::{DirectionAxes, SaveFlags};
use prettytable::format::{FormatBuilder, LinePosition, LineSeparator};
use prettytable::Table;

/// A table with a plain, single-space-separated layout, rather than
/// `prettytable`'s boxed default.
#[must_use]
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.set_format(
        FormatBuilder::new()
            .column_separator(' ')
            .separator(LinePosition::Title, LineSeparator::new('-', '+', ' ', ' '))
            .build(),
    );
    table
}

/// Parses a string of exit-class letters (`t`/`b`/`r`/`k`, case-insensitive)
/// into the corresponding [`SaveFlags`].
///
/// # Errors
///
/// Returns an error if `s` is empty or contains a character other than
/// `t`, `b`, `r`, `k`.
pub fn parse_walker_flags(s: &str) -> Result<SaveFlags> {
    if s.is_empty() {
        return Err(anyhow!("walker type string must not be empty"));
    }
    let mut flags = SaveFlags::empty();
    for c in s.chars() {
        flags |= match c.to_ascii_lowercase() {
            't' => SaveFlags::TRANSMITTED,
            'b' => SaveFlags::BALLISTIC,
            'r' => SaveFlags::REFLECTED,
            'k' => SaveFlags::BACK_REFLECTED,
            other => return Err(anyhow!("unknown walker type letter '{other}'")),
        };
    }
    Ok(flags)
}

/// Parses a string of axis letters (`x`/`y`/`z`, case-insensitive) into the
/// corresponding [`DirectionAxes`] mask.
///
/// # Errors
///
/// Returns an error if `s` contains a character other than `x`, `y`, `z`.
pub fn parse_direction_axes(s: &str) -> Result<DirectionAxes> {
    let mut axes = DirectionAxes::empty();
    for c in s.chars() {
        axes |= match c.to_ascii_lowercase() {
            'x' => DirectionAxes::X,
            'y' => DirectionAxes::Y,
            'z' => DirectionAxes::Z,
            other => return Err(anyhow!("unknown direction axis letter '{other}'")),
        };
    }
    Ok(axes)
}

/// The number of worker threads to use when the caller didn't request a
/// specific count: the available parallelism, or 1 if that can't be
/// determined.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_walker_letters() {
        let flags = parse_walker_flags("tbrk").unwrap();
        assert_eq!(flags, SaveFlags::ALL);
    }

    #[test]
    fn rejects_unknown_walker_letter() {
        assert!(parse_walker_flags("q").is_err());
    }

    #[test]
    fn rejects_empty_walker_flags() {
        assert!(parse_walker_flags("").is_err());
    }

    #[test]
    fn parses_direction_axes() {
        let axes = parse_direction_axes("xz").unwrap();
        assert_eq!(axes, DirectionAxes::X | DirectionAxes::Z);
    }
}
