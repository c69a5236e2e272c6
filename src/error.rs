//! Error types for diffing and patching.

use thiserror::Error;

/// Errors produced while building trees, diffing, or patching.
#[derive(Debug, Error)]
pub enum DiffError {
    /// An input carried a value that cannot be represented in the
    /// seven-variant value algebra.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A patch delta addressed an object key that does not exist.
    #[error("missing key {key:?} in object")]
    MissingKey {
        /// The key that was not found
        key: String,
    },

    /// A patch delta addressed an array index out of range.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange {
        /// The offending index
        index: i64,
        /// The array length at the time of the failure
        len: usize,
    },

    /// A patch delta's path element kind does not apply to the container
    /// it addressed (e.g. an integer index into an object).
    #[error("address {addr:?} does not apply to {target} value")]
    WrongContainer {
        /// Printed form of the offending path element
        addr: String,
        /// Kind of the value that was addressed
        target: &'static str,
    },

    /// A move delta was missing its source path.
    #[error("move delta at {addr:?} has no source path")]
    MissingSourcePath {
        /// Printed form of the delta's path element
        addr: String,
    },
}

/// Result alias used throughout the crate.
pub type DiffResult<T> = Result<T, DiffError>;
