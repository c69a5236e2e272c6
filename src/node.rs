//! Arena-backed node trees.
//!
//! Both input documents become trees of [`Node`]s living in a single
//! [`Arena`], indexed by stable [`NodeId`]s. Parent edges, child edges,
//! and cross-tree match edges are all ids, which keeps the graph free
//! of ownership cycles and makes re-parenting a node (the delta
//! extractor transplants unmatched old-tree nodes into the new tree)
//! a constant-time pointer swap.
//!
//! Object nodes key their children by address in a sorted map; array
//! nodes keep an ordered child list plus an address-to-position index.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::addr::Addr;
use crate::delta::Op;
use crate::error::DiffResult;
use crate::value::{Kind, Value};

/// A stable handle to a node in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) u32);

/// A path from a tree root down to a node, root sentinel excluded.
pub(crate) type NodePath = SmallVec<[Addr; 8]>;

// =============================================================================
// Node
// =============================================================================

/// Child storage, shaped by the node's kind.
#[derive(Debug, Clone)]
pub(crate) enum Children {
    /// Leaves carry no children
    Leaf,
    /// Object children keyed by address
    Object(BTreeMap<String, NodeId>),
    /// Array children in order, with an address-to-position index
    Array {
        order: Vec<NodeId>,
        index: FxHashMap<i64, usize>,
    },
}

impl Children {
    fn cleared(&self) -> Children {
        match self {
            Children::Leaf => Children::Leaf,
            Children::Object(_) => Children::Object(BTreeMap::new()),
            Children::Array { .. } => Children::Array {
                order: Vec::new(),
                index: FxHashMap::default(),
            },
        }
    }
}

/// One value in a tree under diff.
#[derive(Debug, Clone)]
pub(crate) struct Node<'v> {
    /// Kind tag, mirroring the value algebra
    pub kind: Kind,
    /// This node's address within its parent
    pub addr: Addr,
    /// The containing compound, absent on roots
    pub parent: Option<NodeId>,
    /// The full subtree payload this node was built from
    pub value: &'v Value,
    /// Subtree fingerprint
    pub hash: u64,
    /// Subtree weight (leaf text length, compounds 1 + children)
    pub weight: u64,
    /// Cached descendant count
    pub descendants: u64,
    /// Counterpart in the opposite tree, once matched
    pub matched: Option<NodeId>,
    /// Change classification assigned during delta extraction
    pub change: Op,
    /// Source path recorded when this node is classified as a move
    pub moved_from: Option<NodePath>,
    /// Owned children
    pub children: Children,
}

// =============================================================================
// Arena
// =============================================================================

/// Flat storage for every node of both trees.
#[derive(Debug, Default)]
pub(crate) struct Arena<'v> {
    nodes: Vec<Node<'v>>,
}

impl<'v> Arena<'v> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn alloc(&mut self, node: Node<'v>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<'v> {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<'v> {
        &mut self.nodes[id.0 as usize]
    }

    /// Append every node of `other`, rebasing its internal ids. Returns
    /// the offset to add to `other`'s ids to address them here. Used to
    /// merge the two parallel builds into one arena before matching.
    pub fn absorb(&mut self, other: Arena<'v>) -> u32 {
        let offset = self.nodes.len() as u32;
        for mut node in other.nodes {
            if let Some(parent) = node.parent.as_mut() {
                parent.0 += offset;
            }
            match &mut node.children {
                Children::Leaf => {}
                Children::Object(map) => {
                    for id in map.values_mut() {
                        id.0 += offset;
                    }
                }
                Children::Array { order, .. } => {
                    for id in order.iter_mut() {
                        id.0 += offset;
                    }
                }
            }
            self.nodes.push(node);
        }
        offset
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Child access
    // ─────────────────────────────────────────────────────────────────────────

    /// Direct children: object children in key order, array children in
    /// stored order.
    pub fn children(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        match &self.node(id).children {
            Children::Leaf => SmallVec::new(),
            Children::Object(map) => map.values().copied().collect(),
            Children::Array { order, .. } => order.iter().copied().collect(),
        }
    }

    /// Direct children sorted by their current address.
    pub fn children_sorted(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut kids = self.children(id);
        kids.sort_by(|a, b| self.node(*a).addr.cmp(&self.node(*b).addr));
        kids
    }

    /// Look up a child by address.
    pub fn child(&self, id: NodeId, addr: &Addr) -> Option<NodeId> {
        match (&self.node(id).children, addr) {
            (Children::Object(map), Addr::Key(key)) => map.get(key).copied(),
            (Children::Array { order, index }, Addr::Index(i)) => {
                let pos = *index.get(i)?;
                order.get(pos).copied()
            }
            _ => None,
        }
    }

    /// Attach `child` under `parent` at the child's current address.
    /// Array positions are appended; the positional index is left
    /// untouched for transplanted children.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let gained = self.node(child).descendants + 1;
        let child_addr = self.node(child).addr.clone();
        let node = self.node_mut(parent);
        node.descendants += gained;
        match &mut node.children {
            Children::Leaf => {}
            Children::Object(map) => {
                map.insert(child_addr.to_string(), child);
            }
            Children::Array { order, .. } => {
                order.push(child);
            }
        }
    }

    /// Release all child references. The value payload keeps carrying
    /// the full subtree.
    pub fn drop_children(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.children = node.children.cleared();
    }

    /// Recompute an array's address-to-position index from its current
    /// children. Duplicate addresses keep the last position seen.
    pub fn rebuild_array_index(&mut self, id: NodeId) {
        let order = match &self.node(id).children {
            Children::Array { order, .. } => order.clone(),
            _ => return,
        };
        let mut rebuilt = FxHashMap::default();
        for (pos, child) in order.iter().enumerate() {
            if let Addr::Index(i) = self.node(*child).addr {
                rebuilt.insert(i, pos);
            }
        }
        if let Children::Array { index, .. } = &mut self.node_mut(id).children {
            *index = rebuilt;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Paths
    // ─────────────────────────────────────────────────────────────────────────

    /// The address path from the root down to `id`, root excluded.
    pub fn path(&self, id: NodeId) -> NodePath {
        let mut path = NodePath::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = self.node(current);
            if node.addr.is_root() {
                break;
            }
            path.push(node.addr.clone());
            cursor = node.parent;
        }
        path.reverse();
        path
    }

    /// Resolve a path from `root`, hop by hop.
    pub fn node_at_path(&self, root: NodeId, path: &[Addr]) -> Option<NodeId> {
        let mut cursor = root;
        for addr in path {
            cursor = self.child(cursor, addr)?;
        }
        Some(cursor)
    }
}

// =============================================================================
// Walks
// =============================================================================

/// Top-down walk. The callback decides whether to descend.
pub(crate) fn walk<'v, F>(arena: &mut Arena<'v>, id: NodeId, f: &mut F) -> DiffResult<()>
where
    F: FnMut(&mut Arena<'v>, NodeId) -> DiffResult<bool>,
{
    if f(arena, id)? {
        for child in arena.children(id) {
            walk(arena, child, f)?;
        }
    }
    Ok(())
}

/// Bottom-up walk.
pub(crate) fn walk_postfix<'v, F>(arena: &mut Arena<'v>, id: NodeId, f: &mut F) -> DiffResult<()>
where
    F: FnMut(&mut Arena<'v>, NodeId) -> DiffResult<()>,
{
    for child in arena.children(id) {
        walk_postfix(arena, child, f)?;
    }
    f(arena, id)
}

/// Top-down walk visiting children in address order, tracking the path
/// from the root. The visit order of a sibling group is fixed when
/// their parent is visited; addresses renumbered by the callback are
/// still read fresh at each visit.
pub(crate) fn walk_sorted<'v, F>(arena: &mut Arena<'v>, id: NodeId, f: &mut F) -> DiffResult<()>
where
    F: FnMut(&mut Arena<'v>, &[Addr], NodeId) -> DiffResult<bool>,
{
    let mut path = NodePath::new();
    walk_sorted_inner(arena, id, &mut path, f)
}

fn walk_sorted_inner<'v, F>(
    arena: &mut Arena<'v>,
    id: NodeId,
    path: &mut NodePath,
    f: &mut F,
) -> DiffResult<()>
where
    F: FnMut(&mut Arena<'v>, &[Addr], NodeId) -> DiffResult<bool>,
{
    let pushed = !arena.node(id).addr.is_root();
    if pushed {
        path.push(arena.node(id).addr.clone());
    }
    let descend = f(arena, path, id)?;
    if descend {
        for child in arena.children_sorted(id) {
            walk_sorted_inner(arena, child, path, f)?;
        }
    }
    if pushed {
        path.pop();
    }
    Ok(())
}
