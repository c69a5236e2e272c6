//! Content fingerprinting for subtrees.
//!
//! Every node gets a 64-bit fingerprint: leaves hash their canonical
//! textual form, compounds hash a kind tag followed by their children's
//! fingerprints (object children in key order, array children in index
//! order). Equal fingerprints are treated as candidate structural
//! equality and disambiguated downstream.
//!
//! The hash function is pluggable via [`HashFactory`]; the default is
//! 64-bit FNV for fast, cheap, non-cryptographic hashing. The
//! `crypto-hash` feature adds a blake3-backed factory for callers whose
//! value space is large enough to care about collisions.

use std::borrow::Cow;
use std::hash::Hasher;
use std::sync::Arc;

use fnv::FnvHasher;

use crate::value::{Kind, Value};

// =============================================================================
// HashFactory
// =============================================================================

/// Produces a fresh hasher per node. Shared across the two parallel tree
/// builds, so factories must be `Send + Sync`.
pub type HashFactory = Arc<dyn Fn() -> Box<dyn Hasher> + Send + Sync>;

/// The default factory: 64-bit FNV.
pub fn fnv_factory() -> HashFactory {
    Arc::new(|| Box::new(FnvHasher::default()))
}

/// A blake3-backed factory for collision-sensitive callers.
///
/// The first eight bytes of the blake3 output are taken as a
/// little-endian u64, so fingerprints stay the same width as the
/// default.
#[cfg(feature = "crypto-hash")]
pub fn blake3_factory() -> HashFactory {
    Arc::new(|| Box::new(Blake3Hasher::default()))
}

/// Deterministic hasher over blake3, exposed through `std::hash::Hasher`.
#[cfg(feature = "crypto-hash")]
#[derive(Default)]
pub struct Blake3Hasher {
    inner: blake3::Hasher,
}

#[cfg(feature = "crypto-hash")]
impl Hasher for Blake3Hasher {
    fn write(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    fn finish(&self) -> u64 {
        let hash = self.inner.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}

// =============================================================================
// Canonical leaf text
// =============================================================================

/// The canonical textual form of a leaf value. Returns `None` for
/// compounds, whose fingerprints derive from their children instead.
///
/// Floats print as the shortest decimal that round-trips; integers in
/// decimal; booleans as `true`/`false`; null as `null`; strings as
/// their raw bytes.
pub(crate) fn leaf_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => Some(Cow::Borrowed("null")),
        Value::Bool(true) => Some(Cow::Borrowed("true")),
        Value::Bool(false) => Some(Cow::Borrowed("false")),
        Value::Int(i) => Some(Cow::Owned(i.to_string())),
        Value::Float(f) => Some(Cow::Owned(f.to_string())),
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Fingerprint a leaf's textual form.
pub(crate) fn hash_leaf(factory: &HashFactory, text: &str) -> u64 {
    let mut hasher = factory();
    hasher.write(text.as_bytes());
    hasher.finish()
}

/// Fingerprint a compound from its children's fingerprints, in the
/// order the caller supplies them.
pub(crate) fn hash_compound(
    factory: &HashFactory,
    kind: Kind,
    child_hashes: impl IntoIterator<Item = u64>,
) -> u64 {
    let mut hasher = factory();
    hasher.write(&[kind.tag()]);
    for child in child_hashes {
        hasher.write(&child.to_le_bytes());
    }
    hasher.finish()
}
