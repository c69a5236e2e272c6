//! Peephole optimization over the match graph.
//!
//! After exact matching, plenty of compounds remain unmatched even
//! though most of their children found partners. Two postfix passes
//! (one per tree) lift matches upward: an unmatched compound adopts the
//! parent of its heaviest matched child. Two prefix passes then push
//! matches downward: children of a matched compound pair are paired by
//! key (objects) or by position (equal-length arrays).
//!
//! The whole pass is run a few times in a row so that matches diffuse
//! through chains of collisions; see the driver in `diff`.

use crate::cancel::CancelToken;
use crate::error::DiffResult;
use crate::matcher::match_nodes;
use crate::node::{walk, walk_postfix, Arena, NodeId};
use crate::value::Kind;

/// One full optimization round over both trees.
pub(crate) fn optimize(
    arena: &mut Arena<'_>,
    t1: NodeId,
    t2: NodeId,
    cancel: &CancelToken,
) -> DiffResult<()> {
    walk_postfix(arena, t1, &mut |arena, id| {
        cancel.check()?;
        propagate_match_to_parent(arena, id);
        Ok(())
    })?;
    walk_postfix(arena, t2, &mut |arena, id| {
        cancel.check()?;
        propagate_match_to_parent(arena, id);
        Ok(())
    })?;
    walk(arena, t1, &mut |arena, id| {
        cancel.check()?;
        propagate_match_to_children(arena, id);
        Ok(true)
    })?;
    walk(arena, t2, &mut |arena, id| {
        cancel.check()?;
        propagate_match_to_children(arena, id);
        Ok(true)
    })?;
    Ok(())
}

/// Give an unmatched compound the unmatched parent of one of its
/// matched children. Among eligible parents, keep the one whose subtree
/// outweighs the matched child; earlier children win ties.
fn propagate_match_to_parent(arena: &mut Arena<'_>, id: NodeId) {
    let node = arena.node(id);
    if !node.kind.is_compound() || node.matched.is_some() {
        return;
    }
    let kind = node.kind;

    let mut best: Option<NodeId> = None;
    for child in arena.children(id) {
        let Some(m) = arena.node(child).matched else {
            continue;
        };
        let Some(parent) = arena.node(m).parent else {
            continue;
        };
        let parent_node = arena.node(parent);
        if parent_node.matched.is_some() || parent_node.kind != kind {
            continue;
        }
        match best {
            None => best = Some(parent),
            Some(_) if parent_node.weight > arena.node(m).weight => best = Some(parent),
            Some(_) => {}
        }
    }

    if let Some(best) = best {
        match_nodes(arena, best, id);
    }
}

/// Pair the children of a matched compound pair of the same kind:
/// object children by shared key, array children pairwise when the
/// lengths agree. Assignments are symmetric.
fn propagate_match_to_children(arena: &mut Arena<'_>, id: NodeId) {
    let node = arena.node(id);
    let Some(partner) = node.matched else {
        return;
    };
    if !node.kind.is_compound() {
        return;
    }
    let kind = node.kind;
    if arena.node(partner).kind != kind {
        return;
    }

    match kind {
        Kind::Object => {
            for child in arena.children(id) {
                let addr = arena.node(child).addr.clone();
                if let Some(other) = arena.child(partner, &addr) {
                    arena.node_mut(child).matched = Some(other);
                    arena.node_mut(other).matched = Some(child);
                }
            }
        }
        Kind::Array => {
            let ours = arena.children(id);
            let theirs = arena.children(partner);
            if ours.len() != theirs.len() {
                return;
            }
            for (a, b) in ours.iter().zip(theirs.iter()) {
                arena.node_mut(*a).matched = Some(*b);
                arena.node_mut(*b).matched = Some(*a);
            }
        }
        _ => {}
    }
}
