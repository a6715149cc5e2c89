//! Configuration-error taxonomy.
//!
//! Everything here is a setup mistake caught before or at the start of a
//! run; nothing is retried. Programmer errors (mismatched scratch lengths,
//! uneven reduction calls) are asserts, not variants.

use glam::Vec3;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("spreading width must be positive and finite, got {0}")]
    NonPositiveSpreadingWidth(f32),

    #[error("truncation range must be positive and finite, got {0} sigma")]
    NonPositiveTruncation(f32),

    #[error("coordinate scale is zero or non-finite on at least one axis: {0}")]
    DegenerateScale(Vec3),

    #[error("density data has {got} values, extents {nx}x{ny}x{nz} require {expected}")]
    DataLengthMismatch {
        nx: usize,
        ny: usize,
        nz: usize,
        expected: usize,
        got: usize,
    },

    #[error(
        "particle {particle} at lattice position {position} spreads outside \
         the {extents:?} map; enlarge the map or shrink the kernel support"
    )]
    OutOfRangeContribution {
        particle: usize,
        position: Vec3,
        extents: (usize, usize, usize),
    },
}
