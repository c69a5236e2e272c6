//! Statistical metadata about a diff.

use serde::{Deserialize, Serialize};

/// Per-run counters describing both input trees and the edit script.
///
/// Node counts and weights are tallied by the tree builder; operation
/// counters are filled during the final delta sort.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Count of nodes in the left (old) tree
    #[serde(rename = "leftNodes")]
    pub left: u64,
    /// Count of nodes in the right (new) tree
    #[serde(rename = "rightNodes")]
    pub right: u64,

    /// Sum of all node weights in the left tree
    #[serde(rename = "leftWeight")]
    pub left_weight: u64,
    /// Sum of all node weights in the right tree
    #[serde(rename = "rightWeight")]
    pub right_weight: u64,

    /// Number of insert deltas
    #[serde(default, skip_serializing_if = "is_zero")]
    pub inserts: u64,
    /// Number of update deltas
    #[serde(default, skip_serializing_if = "is_zero")]
    pub updates: u64,
    /// Number of delete deltas
    #[serde(default, skip_serializing_if = "is_zero")]
    pub deletes: u64,
    /// Number of move deltas
    #[serde(default, skip_serializing_if = "is_zero")]
    pub moves: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Stats {
    /// Net node shift between the two trees (right minus left).
    pub fn node_change(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    /// Ratio of left weight to right weight. Returns 0.0 when the right
    /// tree has no weight at all.
    pub fn pct_weight_change(&self) -> f64 {
        if self.right_weight == 0 {
            return 0.0;
        }
        self.left_weight as f64 / self.right_weight as f64
    }
}
