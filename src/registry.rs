//! Fingerprint-to-node registry over the old tree.
//!
//! The old-tree build streams every node in here; the matcher reads it
//! back bucket by bucket. Fingerprint collisions are expected and kept
//! as candidate lists for the best-candidate pass to disambiguate.
//! Write-only during build, read-only afterwards.

use rustc_hash::FxHashMap;

use crate::node::NodeId;

#[derive(Debug, Default)]
pub(crate) struct HashRegistry {
    buckets: FxHashMap<u64, Vec<NodeId>>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node under its fingerprint.
    pub fn insert(&mut self, hash: u64, id: NodeId) {
        self.buckets.entry(hash).or_default().push(id);
    }

    /// All old-tree nodes sharing a fingerprint.
    pub fn candidates(&self, hash: u64) -> &[NodeId] {
        self.buckets.get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct fingerprints seen.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}
