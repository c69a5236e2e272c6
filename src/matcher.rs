//! Subtree matching between the two trees.
//!
//! Matching runs in three steps. First an exact pass walks the new tree
//! breadth-first and pairs any node whose fingerprint has exactly one
//! old-tree candidate. A fresh match then tries to pull its two parents
//! together, one step up, when they agree on address and kind. When a
//! fingerprint has several candidates, a distance-bounded climb picks
//! the candidate whose ancestry lines up with the new node's ancestry.
//!
//! The work queue is a single consumer draining a deque; children are
//! only enqueued when their parent found no candidate at all.

use std::collections::VecDeque;

use smallvec::SmallVec;

use crate::cancel::CancelToken;
use crate::error::DiffResult;
use crate::node::{Arena, NodeId};
use crate::registry::HashRegistry;

/// Exact-match pass over the new tree, rooted at `t2`.
pub(crate) fn queue_match(
    arena: &mut Arena<'_>,
    registry: &HashRegistry,
    t2: NodeId,
    cancel: &CancelToken,
) -> DiffResult<()> {
    let t2_weight = arena.node(t2).weight as f64;
    let mut queue = VecDeque::with_capacity(64);
    queue.push_back(t2);

    while let Some(n2) = queue.pop_front() {
        cancel.check()?;
        let candidates = registry.candidates(arena.node(n2).hash);
        match candidates.len() {
            0 => {
                // no candidate here; the children may still match
                queue.extend(arena.children(n2));
            }
            1 => {
                let n1 = candidates[0];
                match_nodes(arena, n1, n2);
            }
            _ => {
                let candidates: SmallVec<[NodeId; 8]> = candidates.iter().copied().collect();
                best_candidate(arena, &candidates, n2, t2_weight);
            }
        }
    }
    Ok(())
}

/// Pair two nodes, then try to pair their parents as well. The climb is
/// a single step: parents pair only when their addresses agree, the
/// address is not the root sentinel, their kinds agree, and neither is
/// already matched. Further ancestors are left to the optimizer.
pub(crate) fn match_nodes(arena: &mut Arena<'_>, n1: NodeId, n2: NodeId) {
    arena.node_mut(n1).matched = Some(n2);
    arena.node_mut(n2).matched = Some(n1);

    let (Some(p1), Some(p2)) = (arena.node(n1).parent, arena.node(n2).parent) else {
        return;
    };
    let parent1 = arena.node(p1);
    let parent2 = arena.node(p2);
    if parent1.addr == parent2.addr
        && !parent1.addr.is_root()
        && parent1.kind == parent2.kind
        && parent1.matched.is_none()
        && parent2.matched.is_none()
    {
        arena.node_mut(p1).matched = Some(p2);
        arena.node_mut(p2).matched = Some(p1);
    }
}

/// Disambiguate a multi-candidate fingerprint by climbing both sides.
///
/// Starting from `n2`'s parent, each candidate is replaced by its own
/// parent every round; the first candidate ancestor whose address lines
/// up with the current new-tree ancestor wins. The climb is bounded by
/// a distance budget proportional to the subtree's share of the whole
/// tree, so a small subtree cannot force matches far up the ancestry.
pub(crate) fn best_candidate(
    arena: &mut Arena<'_>,
    candidates: &[NodeId],
    n2: NodeId,
    t2_weight: f64,
) {
    let Some(mut cursor) = arena.node(n2).parent else {
        return;
    };
    let n2_weight = arena.node(n2).weight as f64;
    let max_dist = 1.0 + n2_weight / t2_weight;
    let mut dist = 1.0 + (arena.node(cursor).weight as f64 - n2_weight) / t2_weight;

    // scratch copy; candidate slots climb to their parents each round
    let mut climbing: SmallVec<[Option<NodeId>; 8]> =
        candidates.iter().map(|&c| Some(c)).collect();

    while dist < max_dist {
        for slot in climbing.iter_mut() {
            let Some(candidate) = *slot else { continue };
            let candidate_parent = arena.node(candidate).parent;
            if let Some(cp) = candidate_parent {
                if arena.node(cp).addr == arena.node(cursor).addr
                    && arena.node(cp).kind == arena.node(cursor).kind
                {
                    match_nodes(arena, cp, cursor);
                    return;
                }
            }
            *slot = candidate_parent;
        }

        let Some(next) = arena.node(cursor).parent else {
            break;
        };
        dist = 1.0 + (arena.node(next).weight as f64 - arena.node(cursor).weight as f64) / t2_weight;
        cursor = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::Addr;
    use crate::hash::fnv_factory;
    use crate::tree::prep_trees;
    use crate::tree::Trees;
    use crate::value::Value;
    use serde_json::json;

    fn value(v: serde_json::Value) -> Value {
        Value::try_from(v).unwrap()
    }

    fn matched<'v>(trees: &Trees<'v>, path: &[Addr]) -> Option<NodeId> {
        let id = trees.arena.node_at_path(trees.t2, path).unwrap();
        trees.arena.node(id).matched
    }

    fn prep<'v>(a: &'v Value, b: &'v Value) -> Trees<'v> {
        let mut trees =
            prep_trees(a, b, &fnv_factory(), &CancelToken::new(), None).unwrap();
        queue_match(
            &mut trees.arena,
            &trees.registry,
            trees.t2,
            &CancelToken::new(),
        )
        .unwrap();
        trees
    }

    #[test]
    fn test_identical_roots_match_exactly() {
        let a = value(json!({"x": [1, 2, 3]}));
        let b = value(json!({"x": [1, 2, 3]}));
        let trees = prep(&a, &b);
        assert_eq!(trees.arena.node(trees.t2).matched, Some(trees.t1));
        assert_eq!(trees.arena.node(trees.t1).matched, Some(trees.t2));
    }

    #[test]
    fn test_unchanged_subtree_matches_and_pulls_parent() {
        let a = value(json!({"baz": {"a": {"d": "apples"}}, "n": 1}));
        let b = value(json!({"baz": {"a": {"d": "apples"}, "e": 30}, "n": 2}));
        let trees = prep(&a, &b);

        // {"d": "apples"} matches exactly, and the single-step climb
        // pairs the two "baz" objects through the matching "a" children
        let inner = matched(&trees, &[Addr::key("baz"), Addr::key("a")]);
        assert!(inner.is_some());
        let baz = matched(&trees, &[Addr::key("baz")]);
        assert!(baz.is_some());
    }

    #[test]
    fn test_matches_are_symmetric() {
        let a = value(json!([[1], [2], [3]]));
        let b = value(json!([[1], [3]]));
        let trees = prep(&a, &b);

        for path in [vec![Addr::index(0)], vec![Addr::index(1)]] {
            if let Some(m) = matched(&trees, &path) {
                let n2 = trees.arena.node_at_path(trees.t2, &path).unwrap();
                assert_eq!(trees.arena.node(m).matched, Some(n2));
            }
        }
    }

    #[test]
    fn test_collision_candidates_climb_to_align() {
        // the array appears twice in the old tree, so its fingerprint
        // has two candidates; the climb aligns their parents with the
        // new-tree ancestry and pairs the roots
        let a = value(json!({"one": [1, 2, 3, 4, 5], "two": [1, 2, 3, 4, 5]}));
        let b = value(json!({"two": [1, 2, 3, 4, 5], "z": true}));
        let trees = prep(&a, &b);

        assert_eq!(trees.arena.node(trees.t2).matched, Some(trees.t1));
        assert_eq!(trees.arena.node(trees.t1).matched, Some(trees.t2));
    }

    #[test]
    fn test_light_subtree_cannot_force_a_match() {
        // [1] is duplicated in the old tree but weighs far less than
        // half its parent, so the distance budget forbids climbing
        let a = value(json!({"left": [[1], [9]], "right": [[1], [8]]}));
        let b = value(json!({"left": [[1], [9]], "right": [[1], [7]]}));
        let trees = prep(&a, &b);

        assert!(matched(&trees, &[Addr::key("right")]).is_none());
    }
}
