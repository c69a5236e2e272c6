//! Common imports for working with diffs.
//!
//! ```
//! use treedelta::prelude::*;
//! ```

pub use crate::addr::Addr;
pub use crate::cancel::CancelToken;
pub use crate::delta::{Delta, Deltas, Op};
pub use crate::diff::{diff, stat, stat_diff, DiffOptions, Differ};
pub use crate::error::{DiffError, DiffResult};
pub use crate::patch::patch;
pub use crate::stats::Stats;
pub use crate::value::{Kind, Value};
