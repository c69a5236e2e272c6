//! Delta extraction: folding the old tree into the new tree.
//!
//! Once matching settles, the old tree is destructively folded into the
//! new tree in three stages. Stage one transplants every unmatched
//! old-tree subtree into the new tree as a delete, renumbering array
//! siblings downward so later comparisons see post-deletion indices.
//! Stage two marks unmatched new-tree subtrees as inserts (renumbering
//! the matched old-side array upward) and differing matched leaves as
//! updates. Stage three folds the combined tree into a hierarchical
//! delta script: containers with changes below become context frames,
//! untouched siblings stay leaf contexts, and subtrees with no changes
//! at all vanish from the output.
//!
//! Sibling deltas sort by address, deletes before contexts before
//! inserts and updates, so the script applies cleanly in order.

use std::panic;

use smallvec::smallvec;

use crate::addr::Addr;
use crate::cancel::CancelToken;
use crate::delta::{sort_deltas, Delta, Deltas, Op};
use crate::error::DiffResult;
use crate::node::{walk_sorted, Arena, NodeId, NodePath};
use crate::stats::Stats;
use crate::value::Kind;

/// Behavior switches for extraction, mirrored from the diff options.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExtractOptions {
    /// Emit in-place updates instead of delete+insert pairs
    pub calc_changes: bool,
    /// Detect cross-parent moves and same-parent reorders
    pub move_deltas: bool,
}

/// Fold the old tree into the new tree and emit the edit script.
pub(crate) fn calc_deltas<'v>(
    arena: &mut Arena<'v>,
    t1: NodeId,
    t2: NodeId,
    opts: &ExtractOptions,
    cancel: &CancelToken,
    mut stats: Option<&mut Stats>,
) -> DiffResult<Deltas> {
    sever_unsound_matches(arena, t1, t2, opts);

    // wholesale replacement: the roots never paired up, or paired as
    // leaves that do not agree. One delete and one insert at the root
    // cover the whole document.
    if !roots_agree(arena, t1, t2) {
        let mut script = vec![
            Delta::delete(Addr::Root, arena.node(t1).value.clone()),
            Delta::insert(Addr::Root, arena.node(t2).value.clone()),
        ];
        finish(&mut script, &mut stats);
        return Ok(script);
    }

    absorb_deletes(arena, t1, t2, cancel)?;
    mark_inserts_and_updates(arena, t2, opts, cancel)?;
    if opts.move_deltas {
        mark_reorder_moves(arena, t2, cancel)?;
    }

    let (mut script, has_changes) = child_deltas(arena, opts, t2);
    if !has_changes {
        return Ok(Vec::new());
    }
    finish(&mut script, &mut stats);
    Ok(script)
}

fn finish(script: &mut Deltas, stats: &mut Option<&mut Stats>) {
    sort_deltas(script);
    if let Some(stats) = stats.as_deref_mut() {
        count_ops(script, stats);
    }
}

fn count_ops(deltas: &Deltas, stats: &mut Stats) {
    for delta in deltas {
        match delta.op {
            Op::Insert => stats.inserts += 1,
            Op::Delete => stats.deletes += 1,
            Op::Update => stats.updates += 1,
            Op::Move => stats.moves += 1,
            Op::Context => {}
        }
        count_ops(&delta.deltas, stats);
    }
}

// =============================================================================
// Match hygiene
// =============================================================================

/// Drop match edges the folding stages cannot express faithfully.
/// Severed pairs degrade to an ordinary delete+insert, which always
/// patches correctly.
///
/// Four cases qualify:
/// - pairs of different kinds with a compound involved, which would
///   make extraction silently swallow real differences (leaf pairs of
///   different kinds stay: the update comparison handles them);
/// - pairs stored under different object keys, since a key rename has
///   no delta of its own;
/// - pairs whose parents are matched, but not to each other, so the
///   subtree content would survive on both sides untouched (kept when
///   move detection is on, which claims these pairs);
/// - pairs shadowed by an unmatched ancestor on either side, whose
///   counterpart would otherwise survive the wholesale delete or
///   insert of that ancestor.
fn sever_unsound_matches(
    arena: &mut Arena<'_>,
    t1: NodeId,
    t2: NodeId,
    opts: &ExtractOptions,
) {
    for i in 0..arena.len() {
        let id = NodeId(i as u32);
        let Some(m) = arena.node(id).matched else {
            continue;
        };
        let node = arena.node(id);
        let other = arena.node(m);

        let kind_conflict = node.kind != other.kind
            && (node.kind.is_compound() || other.kind.is_compound());
        let renamed_key = matches!(
            (&node.addr, &other.addr),
            (Addr::Key(a), Addr::Key(b)) if a != b
        );
        let estranged_parents = !opts.move_deltas
            && match (node.parent, other.parent) {
                (Some(px), Some(py)) => {
                    let px_match = arena.node(px).matched;
                    let py_match = arena.node(py).matched;
                    px_match.is_some()
                        && py_match.is_some()
                        && (px_match != Some(py) || py_match != Some(px))
                }
                _ => false,
            };
        if kind_conflict || renamed_key || estranged_parents {
            arena.node_mut(id).matched = None;
        }
    }

    // severing a shadowed edge can expose new unmatched subtrees on the
    // other side, so alternate until neither tree changes
    loop {
        let mut changed = sever_shadowed(arena, t1);
        changed |= sever_shadowed(arena, t2);
        if !changed {
            break;
        }
    }
}

fn sever_shadowed(arena: &mut Arena<'_>, root: NodeId) -> bool {
    fn go(arena: &mut Arena<'_>, id: NodeId, shadowed: bool, changed: &mut bool) {
        if shadowed {
            if let Some(m) = arena.node(id).matched {
                arena.node_mut(id).matched = None;
                if arena.node(m).matched == Some(id) {
                    arena.node_mut(m).matched = None;
                }
                *changed = true;
            }
        }
        let shadowed = shadowed || arena.node(id).matched.is_none();
        for child in arena.children(id) {
            go(arena, child, shadowed, changed);
        }
    }

    let mut changed = false;
    let shadowed = arena.node(root).matched.is_none();
    for child in arena.children(root) {
        go(arena, child, shadowed, &mut changed);
    }
    changed
}

fn roots_agree(arena: &Arena<'_>, t1: NodeId, t2: NodeId) -> bool {
    if arena.node(t1).matched != Some(t2) || arena.node(t2).matched != Some(t1) {
        return false;
    }
    let n1 = arena.node(t1);
    let n2 = arena.node(t2);
    if n2.kind.is_compound() {
        return true;
    }
    n1.kind == n2.kind && n1.value == n2.value
}

// =============================================================================
// Stage 1: absorb deletions
// =============================================================================

fn absorb_deletes<'v>(
    arena: &mut Arena<'v>,
    t1: NodeId,
    t2: NodeId,
    cancel: &CancelToken,
) -> DiffResult<()> {
    walk_sorted(arena, t1, &mut |arena, path, id| {
        cancel.check()?;
        if arena.node(id).matched.is_some() {
            return Ok(true);
        }

        arena.node_mut(id).change = Op::Delete;
        arena.drop_children(id);

        // an unmatched root is covered by the wholesale-replacement
        // check before this stage; nothing to transplant
        if path.is_empty() {
            return Ok(false);
        }

        // re-attach under the corresponding new-tree container
        if let Some(target) = arena.node_at_path(t2, &path[..path.len() - 1]) {
            arena.add_child(target, id);
        }

        // renumber surviving old-tree siblings downward so later
        // comparisons see post-deletion indices
        if let Some(parent) = arena.node(id).parent {
            if arena.node(parent).kind == Kind::Array {
                if let Some(idx) = arena.node(id).addr.as_index() {
                    renumber_siblings(arena, parent, idx, -1);
                }
            }
        }

        // descendant deletes are subsumed by this one
        Ok(false)
    })
}

/// Rename children at positions past `idx` to position plus `shift`,
/// then refresh the positional index.
fn renumber_siblings(arena: &mut Arena<'_>, parent: NodeId, idx: i64, shift: i64) {
    for (pos, child) in arena.children(parent).into_iter().enumerate() {
        if pos as i64 > idx {
            arena.node_mut(child).addr = Addr::Index(pos as i64 + shift);
        }
    }
    arena.rebuild_array_index(parent);
}

// =============================================================================
// Stage 2: inserts, updates, cross-parent moves
// =============================================================================

fn mark_inserts_and_updates<'v>(
    arena: &mut Arena<'v>,
    t2: NodeId,
    opts: &ExtractOptions,
    cancel: &CancelToken,
) -> DiffResult<()> {
    walk_sorted(arena, t2, &mut |arena, _path, id| {
        cancel.check()?;
        // transplanted deletes carry circular matches; skip them
        if arena.node(id).change == Op::Delete {
            return Ok(false);
        }

        let Some(m) = arena.node(id).matched else {
            arena.node_mut(id).change = Op::Insert;
            renumber_matched_parent(arena, id);
            arena.drop_children(id);
            // children are subsumed by this insert
            return Ok(false);
        };

        if opts.move_deltas {
            let here = parent_path(arena, id);
            let there = parent_path(arena, m);
            if here != there {
                let source = arena.path(m);
                let node = arena.node_mut(id);
                node.change = Op::Move;
                node.moved_from = Some(source);
                renumber_matched_parent(arena, id);
                // break the parent pairing to prevent a later
                // reconnection through these subtrees
                if let Some(mp) = arena.node(m).parent {
                    arena.node_mut(mp).matched = None;
                }
                if let Some(np) = arena.node(id).parent {
                    arena.node_mut(np).matched = None;
                }
                return Ok(false);
            }
        }

        if !arena.node(id).kind.is_compound() {
            let node = arena.node(id);
            let other = arena.node(m);
            if node.kind != other.kind || node.value != other.value {
                arena.node_mut(id).change = Op::Update;
            }
        }
        Ok(true)
    })
}

fn parent_path(arena: &Arena<'_>, id: NodeId) -> NodePath {
    arena
        .node(id)
        .parent
        .map(|p| arena.path(p))
        .unwrap_or_default()
}

/// After an insert at `id`, shift the matched old-side array's children
/// upward so later comparisons see post-insertion indices.
fn renumber_matched_parent(arena: &mut Arena<'_>, id: NodeId) {
    let Some(parent) = arena.node(id).parent else {
        return;
    };
    if arena.node(parent).kind != Kind::Array {
        return;
    }
    let Some(pm) = arena.node(parent).matched else {
        return;
    };
    if arena.node(pm).kind != Kind::Array {
        return;
    }
    let Some(idx) = arena.node(id).addr.as_index() else {
        return;
    };
    renumber_siblings(arena, pm, idx, 1);
}

// =============================================================================
// Same-parent reorders
// =============================================================================

/// Page size for the common-subsequence windows. Reorder detection is
/// shingled so very long arrays stay tractable, at the cost of missing
/// sequences that straddle a page boundary.
const REORDER_PAGE: usize = 50;

/// For every matched array pair, find matched children that fell out of
/// the order-preserving common subsequence and classify them as moves
/// within their parent.
fn mark_reorder_moves<'v>(
    arena: &mut Arena<'v>,
    t2: NodeId,
    cancel: &CancelToken,
) -> DiffResult<()> {
    let mut pairs = Vec::new();
    walk_sorted(arena, t2, &mut |arena, _path, id| {
        cancel.check()?;
        if arena.node(id).change != Op::Context {
            return Ok(false);
        }
        if arena.node(id).kind == Kind::Array {
            if let Some(m) = arena.node(id).matched {
                if arena.node(m).kind == Kind::Array {
                    pairs.push((m, id));
                }
            }
        }
        Ok(true)
    })?;

    for (old_parent, new_parent) in pairs {
        let old: Vec<NodeId> = arena
            .children(old_parent)
            .into_iter()
            .filter(|c| arena.node(*c).matched.is_some())
            .collect();
        let new: Vec<NodeId> = arena
            .children(new_parent)
            .into_iter()
            .filter(|c| arena.node(*c).matched.is_some())
            .collect();

        for (src, dst) in reorder_pairs_shingled(arena, &old, &new) {
            if arena.node(src).addr == arena.node(dst).addr {
                continue;
            }
            let source_addr = arena.node(src).addr.clone();
            let node = arena.node_mut(dst);
            // a reorder supersedes any update mark at the landing spot
            if matches!(node.change, Op::Context | Op::Update) {
                node.change = Op::Move;
                node.moved_from = Some(smallvec![source_addr]);
            }
        }
    }
    Ok(())
}

/// Chunk both child lists into pages and diff the pages concurrently.
fn reorder_pairs_shingled(
    arena: &Arena<'_>,
    old: &[NodeId],
    new: &[NodeId],
) -> Vec<(NodeId, NodeId)> {
    let longest = old.len().max(new.len());
    if longest <= REORDER_PAGE {
        return reorder_pairs(arena, old, new);
    }

    let pages = longest.div_ceil(REORDER_PAGE);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..pages)
            .map(|page| {
                let start = page * REORDER_PAGE;
                let old_page = &old[start.min(old.len())..(start + REORDER_PAGE).min(old.len())];
                let new_page = &new[start.min(new.len())..(start + REORDER_PAGE).min(new.len())];
                scope.spawn(move || reorder_pairs(arena, old_page, new_page))
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(pairs) => pairs,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// Longest order-preserving common subsequence over child fingerprints;
/// children outside it on both sides pair up positionally as moves.
fn reorder_pairs(arena: &Arena<'_>, old: &[NodeId], new: &[NodeId]) -> Vec<(NodeId, NodeId)> {
    let m = old.len();
    let n = new.len();
    if m == 0 || n == 0 {
        return Vec::new();
    }

    let mut table = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            if arena.node(old[i - 1]).hash == arena.node(new[j - 1]).hash {
                table[i][j] = table[i - 1][j - 1] + 1;
            } else {
                table[i][j] = table[i][j - 1].max(table[i - 1][j]);
            }
        }
    }

    // full-length common subsequence means nothing reordered
    if table[m][n] == m || table[m][n] == n {
        return Vec::new();
    }

    let mut kept_old = vec![false; m];
    let mut kept_new = vec![false; n];
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if arena.node(old[i - 1]).hash == arena.node(new[j - 1]).hash {
            kept_old[i - 1] = true;
            kept_new[j - 1] = true;
            i -= 1;
            j -= 1;
        } else if table[i][j - 1] > table[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }

    let moved_old = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !kept_old[*i])
        .map(|(_, id)| *id);
    let moved_new = new
        .iter()
        .enumerate()
        .filter(|(j, _)| !kept_new[*j])
        .map(|(_, id)| *id);
    moved_old.zip(moved_new).collect()
}

// =============================================================================
// Stage 3: fold into deltas
// =============================================================================

/// Fold the children of a combined-tree node into deltas. The flag
/// reports whether anything below this level actually changed; callers
/// elide subtrees that report false.
fn child_deltas<'v>(arena: &Arena<'v>, opts: &ExtractOptions, id: NodeId) -> (Deltas, bool) {
    let mut out = Vec::new();
    let mut has_changes = false;

    for child in arena.children(id) {
        let mut delta = to_delta(arena, child);

        if delta.op == Op::Context {
            if arena.node(child).kind.is_compound() {
                let (nested, nested_changes) = child_deltas(arena, opts, child);
                if nested_changes {
                    delta.value = None;
                    delta.deltas = nested;
                    has_changes = true;
                }
            }
        } else {
            has_changes = true;
        }

        // without in-place updates, expand to a delete+insert pair
        if delta.op == Op::Update && !opts.calc_changes {
            out.push(Delta {
                op: Op::Delete,
                addr: delta.addr.clone(),
                value: delta.source_value.take(),
                source_value: None,
                source_path: None,
                deltas: Vec::new(),
            });
            delta.op = Op::Insert;
        }

        out.push(delta);
    }

    (out, has_changes)
}

fn to_delta<'v>(arena: &Arena<'v>, id: NodeId) -> Delta {
    let node = arena.node(id);
    let mut delta = Delta {
        op: node.change,
        addr: node.addr.clone(),
        value: Some(node.value.clone()),
        source_value: None,
        source_path: None,
        deltas: Vec::new(),
    };
    match node.change {
        Op::Update => {
            delta.source_value = node.matched.map(|m| arena.node(m).value.clone());
        }
        Op::Move => {
            delta.source_path = node
                .moved_from
                .clone()
                .map(|p| p.into_vec())
                .or_else(|| node.matched.map(|m| arena.path(m).into_vec()));
        }
        _ => {}
    }
    delta
}
