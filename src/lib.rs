//! treedelta - Structural diff and patch for JSON-like document trees
//!
//! Computes a hierarchical edit script between two in-memory documents
//! made of generic values (objects, arrays, and scalar leaves), and
//! applies such scripts back onto a document. The approach follows the
//! algorithm for diffing XML documents outlined in "Detecting Changes
//! in XML Documents" by Grégory Cobéna and Amélie Marian: every
//! subtree gets a content fingerprint, identical subtrees match
//! directly, matches propagate through the ancestry, and the unmatched
//! remainder folds into inserts, deletes, and updates. Fingerprinting
//! keeps the pipeline near-linear in document size, at the price of
//! never promising a provably minimal script.
//!
//! ## Modules
//! - `value`: the seven-variant generic value algebra
//! - `addr`: path elements and path rendering
//! - `delta`: the edit script model and its wire format
//! - `diff`: the diff pipeline and its options
//! - `patch`: applying edit scripts to documents
//! - `stats`: per-run diff statistics
//! - `hash`: pluggable subtree fingerprinting
//! - `cancel`: cooperative cancellation
//! - `error`: error types
//!
//! ## Usage
//!
//! ```
//! use treedelta::{diff, patch, Value};
//!
//! # fn main() -> treedelta::DiffResult<()> {
//! let a = Value::try_from(serde_json::json!({"title": "one", "tags": [1, 2]}))?;
//! let b = Value::try_from(serde_json::json!({"title": "two", "tags": [1, 2]}))?;
//!
//! // an edit script turning a into b
//! let deltas = diff(&a, &b)?;
//!
//! // applying it to a copy of a reproduces b
//! let mut patched = a.clone();
//! patch(&deltas, &mut patched)?;
//! assert_eq!(patched, b);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Core modules
// =============================================================================

/// Path elements addressing children within containers
pub mod addr;

/// Cooperative cancellation tokens
pub mod cancel;

/// The hierarchical edit script model
pub mod delta;

/// The diff pipeline: options, differ, entry points
pub mod diff;

/// Error types
pub mod error;

/// Pluggable subtree fingerprinting
pub mod hash;

/// Applying edit scripts to documents
pub mod patch;

/// Diff statistics
pub mod stats;

/// Generic document values
pub mod value;

/// Prelude for common imports
pub mod prelude;

// internal pipeline stages
mod extract;
mod matcher;
mod node;
mod optimize;
mod registry;
mod tree;

// =============================================================================
// Re-exports
// =============================================================================

pub use addr::Addr;
pub use cancel::CancelToken;
pub use delta::{Delta, Deltas, Op};
pub use diff::{diff, stat, stat_diff, DiffOptions, Differ};
pub use error::{DiffError, DiffResult};
pub use hash::{fnv_factory, HashFactory};
pub use patch::patch;
pub use stats::Stats;
pub use value::{Kind, Value};

#[cfg(feature = "crypto-hash")]
pub use hash::blake3_factory;
