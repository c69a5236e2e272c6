//! Path elements addressing a child within its parent container.
//!
//! An [`Addr`] is a single step of a path: a string key for object
//! children, a numeric index for array children, or the root sentinel.
//! Full paths are slices of addrs; [`path_string`] renders them in the
//! `/a/b/0` form used by move sources.

use std::cmp::Ordering;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Addr
// =============================================================================

/// One path element identifying a child within its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addr {
    /// The root of a document. Compares equal only to itself.
    Root,
    /// An object key.
    Key(String),
    /// An array index.
    Index(i64),
}

impl Addr {
    /// Build a key addr from anything string-like.
    pub fn key(key: impl Into<String>) -> Self {
        Addr::Key(key.into())
    }

    /// Build an index addr.
    pub fn index(index: i64) -> Self {
        Addr::Index(index)
    }

    /// Whether this is the root sentinel.
    pub fn is_root(&self) -> bool {
        matches!(self, Addr::Root)
    }

    /// The index, if this addr is one.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Addr::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// The key, if this addr is one.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Addr::Key(k) => Some(k),
            _ => None,
        }
    }

    // Variant rank, used only to keep the ordering total when two
    // different variants share a printed form (e.g. Key("/") vs Root).
    fn rank(&self) -> u8 {
        match self {
            Addr::Root => 0,
            Addr::Key(_) => 1,
            Addr::Index(_) => 2,
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Root => f.write_str("/"),
            Addr::Key(k) => f.write_str(k),
            Addr::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Total ordering: two indices compare numerically, anything else by
/// printed form. Root is equal only to itself.
impl Ord for Addr {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Addr::Root, Addr::Root) => Ordering::Equal,
            (Addr::Index(a), Addr::Index(b)) => a.cmp(b),
            _ => self
                .to_string()
                .cmp(&other.to_string())
                .then_with(|| self.rank().cmp(&other.rank())),
        }
    }
}

impl PartialOrd for Addr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Addr {
    fn from(key: &str) -> Self {
        Addr::Key(key.to_owned())
    }
}

impl From<String> for Addr {
    fn from(key: String) -> Self {
        Addr::Key(key)
    }
}

impl From<i64> for Addr {
    fn from(index: i64) -> Self {
        Addr::Index(index)
    }
}

impl From<usize> for Addr {
    fn from(index: usize) -> Self {
        Addr::Index(index as i64)
    }
}

// =============================================================================
// Paths
// =============================================================================

/// Render a full path as `/a/b/0`. An empty path renders as `/`.
pub fn path_string(path: &[Addr]) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    let mut out = String::new();
    for addr in path {
        out.push('/');
        out.push_str(&addr.to_string());
    }
    out
}

/// Parse a `/a/b/0` path back into addrs. Segments that parse as
/// integers become indices, everything else becomes a key.
pub fn parse_path(path: &str) -> Vec<Addr> {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .map(|seg| match seg.parse::<i64>() {
            Ok(i) => Addr::Index(i),
            Err(_) => Addr::Key(seg.to_owned()),
        })
        .collect()
}

// =============================================================================
// Wire encoding: string | integer | null
// =============================================================================

impl Serialize for Addr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Addr::Root => serializer.serialize_none(),
            Addr::Key(k) => serializer.serialize_str(k),
            Addr::Index(i) => serializer.serialize_i64(*i),
        }
    }
}

struct AddrVisitor;

impl<'de> Visitor<'de> for AddrVisitor {
    type Value = Addr;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, an integer, or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Addr, E> {
        Ok(Addr::Key(v.to_owned()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Addr, E> {
        Ok(Addr::Index(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Addr, E> {
        i64::try_from(v)
            .map(Addr::Index)
            .map_err(|_| E::custom("index does not fit in i64"))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Addr, E> {
        Ok(Addr::Root)
    }

    fn visit_none<E: de::Error>(self) -> Result<Addr, E> {
        Ok(Addr::Root)
    }
}

impl<'de> Deserialize<'de> for Addr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AddrVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(Addr::Root.to_string(), "/");
        assert_eq!(Addr::key("title").to_string(), "title");
        assert_eq!(Addr::index(12).to_string(), "12");
    }

    #[test]
    fn test_indices_compare_numerically() {
        assert!(Addr::index(2) < Addr::index(10));
        let mut addrs = vec![Addr::index(10), Addr::index(2), Addr::index(1)];
        addrs.sort();
        assert_eq!(addrs, vec![Addr::index(1), Addr::index(2), Addr::index(10)]);
    }

    #[test]
    fn test_mixed_addrs_compare_by_printed_form() {
        // "10" < "2" lexicographically once a key is involved
        assert!(Addr::key("10") < Addr::key("2"));
        assert!(Addr::index(10) < Addr::key("2"));
        assert!(Addr::key("A") < Addr::key("a"));
    }

    #[test]
    fn test_root_equal_only_to_itself() {
        assert_eq!(Addr::Root, Addr::Root);
        assert_ne!(Addr::Root, Addr::key("/"));
        assert_ne!(Addr::Root.cmp(&Addr::key("/")), Ordering::Equal);
    }

    #[test]
    fn test_key_and_index_are_distinct() {
        assert_ne!(Addr::key("0"), Addr::index(0));
    }

    #[test]
    fn test_path_round_trip() {
        let path = vec![Addr::key("a"), Addr::index(3), Addr::key("b")];
        let printed = path_string(&path);
        assert_eq!(printed, "/a/3/b");
        assert_eq!(parse_path(&printed), path);
        assert_eq!(path_string(&[]), "/");
    }

    #[test]
    fn test_wire_encoding() {
        let json = serde_json::to_string(&[
            Addr::key("a"),
            Addr::index(4),
            Addr::Root,
        ])
        .unwrap();
        assert_eq!(json, r#"["a",4,null]"#);

        let back: Vec<Addr> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Addr::key("a"), Addr::index(4), Addr::Root]);
    }
}
