//! The hierarchical edit script.
//!
//! A [`Delta`] describes one edit against the destination document: an
//! insert, delete, update, or move at a single path element, or a
//! context frame whose only job is to carry child deltas describing
//! edits deeper inside an unchanged container.
//!
//! # Wire format
//!
//! Deltas serialize as compact heterogeneous tuples:
//!
//! ```text
//! ["+", "name", "test_ds"]              insert
//! ["-", 2, false]                       delete
//! ["~", "title", "new", "old"]          update (new value, then source)
//! [" ", "meta", null, [ ...children ]]  context carrying child deltas
//! [" ", "kind", "md:0"]                 context leaf (unchanged value)
//! [">", 4, "d", "/2"]                   move (value, then source path)
//! ```
//!
//! Addresses encode as a string (object key), an integer (array index),
//! or null (the document root).

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::addr::{parse_path, path_string, Addr};
use crate::value::Value;

// =============================================================================
// Op
// =============================================================================

/// The operation a delta performs.
///
/// The variant order doubles as the tie-break order when sibling deltas
/// share an address: deletes sort before the context that replaces
/// them, inserts and updates after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    /// Remove the child at the delta's address
    Delete,
    /// No change at this address; carries children or an unchanged value
    Context,
    /// Add a child at the delta's address
    Insert,
    /// Replace a leaf value in place
    Update,
    /// Relocate a subtree (experimental)
    Move,
}

impl Op {
    /// The single-character wire symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Delete => "-",
            Op::Context => " ",
            Op::Insert => "+",
            Op::Update => "~",
            Op::Move => ">",
        }
    }

    /// Parse a wire symbol back into an operation.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-" => Some(Op::Delete),
            " " => Some(Op::Context),
            "+" => Some(Op::Insert),
            "~" => Some(Op::Update),
            ">" => Some(Op::Move),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Delta
// =============================================================================

/// One node of the hierarchical edit script.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// What this delta does
    pub op: Op,
    /// The path element it applies to, within its parent delta's container
    pub addr: Addr,
    /// The value payload (absent on context frames that carry children)
    pub value: Option<Value>,
    /// The replaced value, present on updates
    pub source_value: Option<Value>,
    /// Where a moved subtree came from, present on moves
    pub source_path: Option<Vec<Addr>>,
    /// Child deltas, used by context frames
    pub deltas: Vec<Delta>,
}

/// A sibling list of deltas, the top level of an edit script.
pub type Deltas = Vec<Delta>;

impl Delta {
    /// An insert of `value` at `addr`.
    pub fn insert(addr: impl Into<Addr>, value: Value) -> Self {
        Self::leaf(Op::Insert, addr, Some(value))
    }

    /// A delete of `value` at `addr`.
    pub fn delete(addr: impl Into<Addr>, value: Value) -> Self {
        Self::leaf(Op::Delete, addr, Some(value))
    }

    /// An in-place update at `addr` from `source` to `value`.
    pub fn update(addr: impl Into<Addr>, value: Value, source: Value) -> Self {
        Delta {
            source_value: Some(source),
            ..Self::leaf(Op::Update, addr, Some(value))
        }
    }

    /// A context frame for an unchanged value at `addr`.
    pub fn context(addr: impl Into<Addr>, value: Value) -> Self {
        Self::leaf(Op::Context, addr, Some(value))
    }

    /// A context frame at `addr` carrying child deltas.
    pub fn context_with(addr: impl Into<Addr>, deltas: Deltas) -> Self {
        Delta {
            deltas,
            ..Self::leaf(Op::Context, addr, None)
        }
    }

    /// A move of `value` to `addr` from `source_path`.
    pub fn moved(addr: impl Into<Addr>, value: Value, source_path: Vec<Addr>) -> Self {
        Delta {
            source_path: Some(source_path),
            ..Self::leaf(Op::Move, addr, Some(value))
        }
    }

    fn leaf(op: Op, addr: impl Into<Addr>, value: Option<Value>) -> Self {
        Delta {
            op,
            addr: addr.into(),
            value,
            source_value: None,
            source_path: None,
            deltas: Vec::new(),
        }
    }

    /// Sort this delta's children and every level below by address,
    /// breaking ties with the operation order. The sort is stable, so
    /// equal (address, operation) pairs keep their emission order.
    pub fn sort_children(&mut self) {
        sort_deltas(&mut self.deltas);
    }
}

/// Sort a sibling list (and all nested lists) into canonical order.
pub fn sort_deltas(deltas: &mut [Delta]) {
    deltas.sort_by(|a, b| a.addr.cmp(&b.addr).then_with(|| a.op.cmp(&b.op)));
    for delta in deltas {
        sort_deltas(&mut delta.deltas);
    }
}

// =============================================================================
// Wire encoding
// =============================================================================

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !self.deltas.is_empty() {
            let mut seq = serializer.serialize_seq(Some(4))?;
            seq.serialize_element(self.op.symbol())?;
            seq.serialize_element(&self.addr)?;
            seq.serialize_element(&self.value)?;
            seq.serialize_element(&self.deltas)?;
            return seq.end();
        }
        match self.op {
            Op::Update => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.op.symbol())?;
                seq.serialize_element(&self.addr)?;
                seq.serialize_element(&self.value)?;
                seq.serialize_element(&self.source_value)?;
                seq.end()
            }
            Op::Move => {
                let source = self.source_path.as_deref().unwrap_or_default();
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element(self.op.symbol())?;
                seq.serialize_element(&self.addr)?;
                seq.serialize_element(&self.value)?;
                seq.serialize_element(&path_string(source))?;
                seq.end()
            }
            _ => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(self.op.symbol())?;
                seq.serialize_element(&self.addr)?;
                seq.serialize_element(&self.value)?;
                seq.end()
            }
        }
    }
}

struct DeltaVisitor;

impl<'de> Visitor<'de> for DeltaVisitor {
    type Value = Delta;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a delta tuple [op, address, value, ...]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Delta, A::Error> {
        let symbol: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let op = Op::from_symbol(&symbol)
            .ok_or_else(|| de::Error::custom(format!("unknown operation {symbol:?}")))?;
        let addr: Addr = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let value: Option<Value> = seq.next_element()?.unwrap_or_default();

        let mut delta = Delta {
            op,
            addr,
            value,
            source_value: None,
            source_path: None,
            deltas: Vec::new(),
        };

        match op {
            Op::Update => {
                delta.source_value = seq.next_element()?.unwrap_or_default();
            }
            Op::Move => {
                if let Some(path) = seq.next_element::<Option<String>>()?.flatten() {
                    delta.source_path = Some(parse_path(&path));
                }
            }
            _ => {
                if let Some(children) = seq.next_element::<Deltas>()? {
                    delta.deltas = children;
                }
            }
        }

        Ok(delta)
    }
}

impl<'de> Deserialize<'de> for Delta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(DeltaVisitor)
    }
}
