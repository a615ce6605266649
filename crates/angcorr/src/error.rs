// There are 2 obvious ways to organize errors across this package:
// 1. do all error definitions within the internal crate and make
//    everything public
// 2. define separate error types within the public and internal crate and
//    have the public crate wrap the internal crate.
//
// We went with option #2. The internal crate is no_std and only ever fails
// on "programming errors" (mismatched statepack shapes and the like), so it
// returns `&'static str` and we wrap those in `ErrorKind::Internal`.

use crate::sphere_index::SphereCell;
use std::path::PathBuf;

/// The error type returned by every fallible operation in this crate.
///
/// None of these errors are retried internally. Each variant carries enough
/// context (the offending cell, parameter or bin) to diagnose the problem
/// without rerunning.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying error classification
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Inconsistent or invalid coverage found while building a mask
    #[error("malformed mask{}: {what}", fmt_cell(.cell))]
    MalformedMask {
        cell: Option<SphereCell>,
        what: String,
    },
    /// A resolution level outside of the configured bounds
    #[error("level {level} lies outside of the configured range [{min}, {max}]")]
    InvalidLevel { level: i32, min: u8, max: u8 },
    /// An ordinal that doesn't exist at the specified level
    #[error("ordinal {ordinal} doesn't identify a cell at level {level}")]
    InvalidCell { level: u8, ordinal: u64 },
    /// A problematic angular range or binning parameter
    #[error("invalid range for {parameter}: {what}")]
    InvalidRange {
        parameter: &'static str,
        what: String,
    },
    /// The random-to-data ratio must be at least 1
    #[error("the random-to-data ratio must be at least 1 (got {actual})")]
    InvalidRandomRatio { actual: i64 },
    /// No catalog points survived masking
    #[error("none of the {n_read} catalog points survived masking")]
    EmptyCatalog { n_read: usize },
    /// A bad angular position or point weight
    #[error("invalid coordinate: {what}")]
    InvalidCoordinate { what: String },
    /// A bad engine configuration value
    #[error("invalid configuration value for {parameter}: {what}")]
    InvalidConfig {
        parameter: &'static str,
        what: String,
    },
    /// Failure while reading or writing a collaborator file
    #[error("i/o error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failure while parsing a collaborator file
    #[error("{}:{line}: {what}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        what: String,
    },
    /// An angular bin that no estimator produced a result for
    #[error("angular bin {index} ([{theta_lo}, {theta_hi}) degrees) was never evaluated")]
    UnevaluatedBin {
        index: usize,
        theta_lo: f64,
        theta_hi: f64,
    },
    /// Wraps the stringly errors produced by `angcorr_nostd_internal`
    #[error("internal error: {0}")]
    Internal(&'static str),
}

fn fmt_cell(cell: &Option<SphereCell>) -> String {
    match cell {
        Some(cell) => format!(" at cell {cell}"),
        None => String::new(),
    }
}

// define constructor methods for Error
impl Error {
    /// Returns the classification of this error
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// produce an error describing an inconsistency in the mask description
    pub(crate) fn malformed_mask(cell: Option<SphereCell>, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::MalformedMask {
                cell,
                what: what.into(),
            },
        }
    }

    /// produce an error indicating that a level lies outside of the bounds
    /// configured for a [`SphereIndex`](crate::SphereIndex)
    pub(crate) fn invalid_level(level: i32, min: u8, max: u8) -> Self {
        Error {
            kind: ErrorKind::InvalidLevel { level, min, max },
        }
    }

    pub(crate) fn invalid_cell(level: u8, ordinal: u64) -> Self {
        Error {
            kind: ErrorKind::InvalidCell { level, ordinal },
        }
    }

    pub(crate) fn invalid_range(parameter: &'static str, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::InvalidRange {
                parameter,
                what: what.into(),
            },
        }
    }

    pub(crate) fn invalid_random_ratio(actual: i64) -> Self {
        Error {
            kind: ErrorKind::InvalidRandomRatio { actual },
        }
    }

    pub(crate) fn empty_catalog(n_read: usize) -> Self {
        Error {
            kind: ErrorKind::EmptyCatalog { n_read },
        }
    }

    pub(crate) fn invalid_coordinate(what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::InvalidCoordinate { what: what.into() },
        }
    }

    pub(crate) fn invalid_config(parameter: &'static str, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::InvalidConfig {
                parameter,
                what: what.into(),
            },
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io {
                path: path.into(),
                source,
            },
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, what: impl Into<String>) -> Self {
        Error {
            kind: ErrorKind::Parse {
                path: path.into(),
                line,
                what: what.into(),
            },
        }
    }

    pub(crate) fn unevaluated_bin(index: usize, theta_lo: f64, theta_hi: f64) -> Self {
        Error {
            kind: ErrorKind::UnevaluatedBin {
                index,
                theta_lo,
                theta_hi,
            },
        }
    }

    /// wraps an internal error string
    pub(crate) fn internal(message: &'static str) -> Self {
        Error {
            kind: ErrorKind::Internal(message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let cell = SphereCell::new(3, 17).unwrap();
        let err = Error::malformed_mask(Some(cell), "coverage 1.5 exceeds 1");
        let msg = err.to_string();
        assert!(msg.contains("level 3"), "{msg}");
        assert!(msg.contains("17"), "{msg}");
        assert!(msg.contains("1.5"), "{msg}");

        let err = Error::invalid_level(31, 0, 30);
        assert!(matches!(err.kind(), ErrorKind::InvalidLevel { level: 31, .. }));

        let err = Error::invalid_random_ratio(0);
        assert_eq!(
            err.to_string(),
            "the random-to-data ratio must be at least 1 (got 0)"
        );
    }
}
