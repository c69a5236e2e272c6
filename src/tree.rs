//! Tree construction.
//!
//! Builds a hashed node tree mirroring a generic value. The two input
//! documents build in parallel on scoped threads; the old-tree build
//! streams every finished node into the fingerprint registry, the
//! new-tree build only tallies node counts and weights. Within one
//! tree, construction is sequential and deterministic: pre-order,
//! object keys ascending.

use std::collections::BTreeMap;
use std::panic;

use rustc_hash::FxHashMap;

use crate::addr::Addr;
use crate::cancel::CancelToken;
use crate::delta::Op;
use crate::error::DiffResult;
use crate::hash::{hash_compound, hash_leaf, leaf_text, HashFactory};
use crate::node::{Arena, Children, Node, NodeId};
use crate::registry::HashRegistry;
use crate::stats::Stats;
use crate::value::Value;

/// Both trees plus the old-tree fingerprint registry, ready to match.
pub(crate) struct Trees<'v> {
    pub arena: Arena<'v>,
    pub t1: NodeId,
    pub t2: NodeId,
    pub registry: HashRegistry,
}

/// Build a node tree for `value`, announcing every completed node to
/// `sink`. Children are announced before their parent; subscribers must
/// not rely on arrival order.
pub(crate) fn build_tree<'v>(
    arena: &mut Arena<'v>,
    value: &'v Value,
    addr: Addr,
    parent: Option<NodeId>,
    factory: &HashFactory,
    cancel: &CancelToken,
    sink: &mut dyn FnMut(&Arena<'v>, NodeId),
) -> DiffResult<NodeId> {
    cancel.check()?;

    let id = match value {
        Value::Array(items) => {
            let id = arena.alloc(Node {
                kind: value.kind(),
                addr,
                parent,
                value,
                hash: 0,
                weight: 0,
                descendants: 0,
                matched: None,
                change: Op::Context,
                moved_from: None,
                children: Children::Leaf,
            });

            let mut order = Vec::with_capacity(items.len());
            let mut index = FxHashMap::default();
            let mut hashes = Vec::with_capacity(items.len());
            let mut weight = 1u64;
            let mut descendants = 0u64;
            for (i, item) in items.iter().enumerate() {
                let child = build_tree(
                    arena,
                    item,
                    Addr::Index(i as i64),
                    Some(id),
                    factory,
                    cancel,
                    sink,
                )?;
                let child_node = arena.node(child);
                hashes.push(child_node.hash);
                weight += child_node.weight;
                descendants += child_node.descendants + 1;
                index.insert(i as i64, i);
                order.push(child);
            }

            let node = arena.node_mut(id);
            node.hash = hash_compound(factory, node.kind, hashes);
            node.weight = weight;
            node.descendants = descendants;
            node.children = Children::Array { order, index };
            id
        }
        Value::Object(fields) => {
            let id = arena.alloc(Node {
                kind: value.kind(),
                addr,
                parent,
                value,
                hash: 0,
                weight: 0,
                descendants: 0,
                matched: None,
                change: Op::Context,
                moved_from: None,
                children: Children::Leaf,
            });

            // key order is the hash order
            let mut children = BTreeMap::new();
            let mut hashes = Vec::with_capacity(fields.len());
            let mut weight = 1u64;
            let mut descendants = 0u64;
            for (key, item) in fields {
                let child = build_tree(
                    arena,
                    item,
                    Addr::Key(key.clone()),
                    Some(id),
                    factory,
                    cancel,
                    sink,
                )?;
                let child_node = arena.node(child);
                hashes.push(child_node.hash);
                weight += child_node.weight;
                descendants += child_node.descendants + 1;
                children.insert(key.clone(), child);
            }

            let node = arena.node_mut(id);
            node.hash = hash_compound(factory, node.kind, hashes);
            node.weight = weight;
            node.descendants = descendants;
            node.children = Children::Object(children);
            id
        }
        _ => {
            let text = leaf_text(value).unwrap_or_default();
            let hash = hash_leaf(factory, &text);
            let weight = (text.len() as u64).max(1);
            arena.alloc(Node {
                kind: value.kind(),
                addr,
                parent,
                value,
                hash,
                weight,
                descendants: 0,
                matched: None,
                change: Op::Context,
                moved_from: None,
                children: Children::Leaf,
            })
        }
    };

    sink(arena, id);
    Ok(id)
}

/// Build both trees concurrently, registering every old-tree node in
/// the fingerprint registry and tallying per-side counts into `stats`.
pub(crate) fn prep_trees<'v>(
    a: &'v Value,
    b: &'v Value,
    factory: &HashFactory,
    cancel: &CancelToken,
    stats: Option<&mut Stats>,
) -> DiffResult<Trees<'v>> {
    let mut arena = Arena::new();
    let mut registry = HashRegistry::new();
    let mut left_count = 0u64;
    let mut left_weight = 0u64;

    let right_factory = factory.clone();
    let right_cancel = cancel.clone();

    let (t1, right) = std::thread::scope(|scope| {
        let right_build = scope.spawn(move || -> DiffResult<(Arena<'v>, NodeId, u64, u64)> {
            let mut arena = Arena::new();
            let mut count = 0u64;
            let mut weight = 0u64;
            let root = build_tree(
                &mut arena,
                b,
                Addr::Root,
                None,
                &right_factory,
                &right_cancel,
                &mut |arena, id| {
                    count += 1;
                    weight += arena.node(id).weight;
                },
            )?;
            Ok((arena, root, count, weight))
        });

        let t1 = build_tree(
            &mut arena,
            a,
            Addr::Root,
            None,
            factory,
            cancel,
            &mut |arena, id| {
                registry.insert(arena.node(id).hash, id);
                left_count += 1;
                left_weight += arena.node(id).weight;
            },
        );

        let right = match right_build.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };
        (t1, right)
    });

    let t1 = t1?;
    let (right_arena, right_root, right_count, right_weight) = right?;

    let offset = arena.absorb(right_arena);
    let t2 = NodeId(right_root.0 + offset);

    if let Some(stats) = stats {
        stats.left = left_count;
        stats.left_weight = left_weight;
        stats.right = right_count;
        stats.right_weight = right_weight;
    }

    Ok(Trees { arena, t1, t2, registry })
}
