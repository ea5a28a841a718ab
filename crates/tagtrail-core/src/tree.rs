//! Lineage tree of explored tags.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]; parents are
//! back-references by index, so there is no ownership cycle. The whole arena
//! sits behind one reader/writer lock: a pair of children is linked inside a
//! single write section, so readers see either no children or both.

use parking_lot::RwLock;

use crate::aggregator::{TagSet, tag_key};
use crate::error::{ExploreError, ExploreResult};

/// Index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The root always occupies the first slot.
    pub const ROOT: Self = Self(0);
}

/// Snapshot of a node in the lineage tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: NodeId,
    pub tag: String,
    /// Occurrences of `tag` in the round that selected it.
    pub round_frequency: usize,
    /// Tag occurrences counted in that round.
    pub round_total: usize,
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// `(best, second)`; always inserted as a pair.
    pub children: Option<(NodeId, NodeId)>,
}

impl TreeNode {
    fn root(tag: &str) -> Self {
        Self {
            id: NodeId::ROOT,
            tag: tag.to_string(),
            round_frequency: 0,
            round_total: 0,
            depth: 0,
            parent: None,
            children: None,
        }
    }

    /// Left child: the best tag of the round.
    #[must_use]
    pub fn left(&self) -> Option<NodeId> {
        self.children.map(|(left, _)| left)
    }

    /// Right child: the second-best tag of the round.
    #[must_use]
    pub fn right(&self) -> Option<NodeId> {
        self.children.map(|(_, right)| right)
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Case-insensitive tag comparison.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        tag_key(&self.tag) == tag_key(tag)
    }
}

/// A child to attach under a parent.
#[derive(Debug, Clone, Copy)]
pub struct ChildSpec<'a> {
    pub tag: &'a str,
    pub frequency: usize,
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<TreeNode>,
    epoch: u64,
}

impl Arena {
    fn new(root_tag: &str, epoch: u64) -> Self {
        Self {
            nodes: vec![TreeNode::root(root_tag)],
            epoch,
        }
    }

    /// Depth-first pre-order (node, left, right) from the root.
    fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some((left, right)) = self.nodes[id.0].children {
                stack.push(right);
                stack.push(left);
            }
        }
        order
    }

    fn find(&self, tag: &str, mut accept: impl FnMut(&TreeNode) -> bool) -> Option<NodeId> {
        let key = tag_key(tag);
        self.preorder().into_iter().find(|id| {
            let node = &self.nodes[id.0];
            tag_key(&node.tag) == key && accept(node)
        })
    }

    fn link_pair(
        &mut self,
        parent: NodeId,
        best: ChildSpec<'_>,
        second: ChildSpec<'_>,
        round_total: usize,
    ) -> (TreeNode, TreeNode) {
        let depth = self.nodes[parent.0].depth + 1;
        let make = |id: NodeId, spec: ChildSpec<'_>| TreeNode {
            id,
            tag: spec.tag.to_string(),
            round_frequency: spec.frequency,
            round_total,
            depth,
            parent: Some(parent),
            children: None,
        };

        let best_id = NodeId(self.nodes.len());
        let second_id = NodeId(self.nodes.len() + 1);
        let best_node = make(best_id, best);
        let second_node = make(second_id, second);

        self.nodes.push(best_node.clone());
        self.nodes.push(second_node.clone());
        self.nodes[parent.0].children = Some((best_id, second_id));
        (best_node, second_node)
    }
}

/// Shared, append-only lineage tree.
#[derive(Debug)]
pub struct ExplorationTree {
    arena: RwLock<Arena>,
}

impl ExplorationTree {
    /// Create a tree whose root carries `root_tag`.
    #[must_use]
    pub fn new(root_tag: &str) -> Self {
        Self {
            arena: RwLock::new(Arena::new(root_tag, 0)),
        }
    }

    /// Current epoch. Bumped by every [`reset`](Self::reset).
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.arena.read().epoch
    }

    /// Copy of the root node.
    #[must_use]
    pub fn root(&self) -> TreeNode {
        self.arena.read().nodes[NodeId::ROOT.0].clone()
    }

    /// Copy of the node with `id`, if it exists.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<TreeNode> {
        self.arena.read().nodes.get(id.0).cloned()
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.read().nodes.len()
    }

    /// Always false: the root exists for the tree's whole life.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.read().nodes.is_empty()
    }

    /// First node (depth-first, pre-order) whose tag matches case-insensitively.
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<TreeNode> {
        let arena = self.arena.read();
        arena
            .find(tag, |_| true)
            .map(|id| arena.nodes[id.0].clone())
    }

    /// Attach a best/second pair under the first leaf carrying `parent_tag`.
    ///
    /// Returns `(best, second)`.
    ///
    /// # Errors
    /// [`ExploreError::ParentNotFound`] if no node carries `parent_tag`;
    /// [`ExploreError::ParentExpanded`] if every such node already has children.
    pub fn insert(
        &self,
        parent_tag: &str,
        best_tag: &str,
        best_frequency: usize,
        second_tag: &str,
        second_frequency: usize,
        round_total: usize,
    ) -> ExploreResult<(TreeNode, TreeNode)> {
        let mut arena = self.arena.write();
        let Some(parent) = arena.find(parent_tag, TreeNode::is_leaf) else {
            let err = if arena.find(parent_tag, |_| true).is_some() {
                ExploreError::ParentExpanded {
                    tag: parent_tag.to_string(),
                }
            } else {
                ExploreError::ParentNotFound {
                    tag: parent_tag.to_string(),
                }
            };
            return Err(err);
        };

        Ok(arena.link_pair(
            parent,
            ChildSpec {
                tag: best_tag,
                frequency: best_frequency,
            },
            ChildSpec {
                tag: second_tag,
                frequency: second_frequency,
            },
            round_total,
        ))
    }

    /// Attach a pair under the node `parent`, provided the tree is still at `epoch`.
    ///
    /// # Errors
    /// [`ExploreError::StaleEpoch`] after a reset, [`ExploreError::ParentNotFound`]
    /// for an unknown id, [`ExploreError::ParentExpanded`] if `parent` already
    /// has children.
    pub fn insert_at(
        &self,
        epoch: u64,
        parent: NodeId,
        best: ChildSpec<'_>,
        second: ChildSpec<'_>,
        round_total: usize,
    ) -> ExploreResult<(TreeNode, TreeNode)> {
        let mut arena = self.arena.write();
        if arena.epoch != epoch {
            return Err(ExploreError::StaleEpoch {
                expected: epoch,
                actual: arena.epoch,
            });
        }
        let Some(node) = arena.nodes.get(parent.0) else {
            return Err(ExploreError::ParentNotFound {
                tag: format!("node {}", parent.0),
            });
        };
        if !node.is_leaf() {
            return Err(ExploreError::ParentExpanded {
                tag: node.tag.clone(),
            });
        }
        Ok(arena.link_pair(parent, best, second, round_total))
    }

    /// Drop every node, start over from a new root and bump the epoch.
    ///
    /// Returns the new epoch.
    pub fn reset(&self, root_tag: &str) -> u64 {
        let mut arena = self.arena.write();
        let epoch = arena.epoch + 1;
        *arena = Arena::new(root_tag, epoch);
        epoch
    }

    /// Every tag currently in the tree.
    #[must_use]
    pub fn visited_tags(&self) -> TagSet {
        self.arena
            .read()
            .nodes
            .iter()
            .map(|node| node.tag.as_str())
            .collect()
    }

    /// Consistent copy for read-only traversal.
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        let arena = self.arena.read();
        TreeSnapshot {
            nodes: arena.nodes.clone(),
            epoch: arena.epoch,
        }
    }
}

/// Point-in-time copy of the tree.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    nodes: Vec<TreeNode>,
    epoch: u64,
}

impl TreeSnapshot {
    #[must_use]
    pub fn root(&self) -> &TreeNode {
        &self.nodes[NodeId::ROOT.0]
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    /// Tag of `node`'s parent, if it has one.
    #[must_use]
    pub fn parent_tag(&self, node: &TreeNode) -> Option<&str> {
        node.parent
            .and_then(|id| self.get(id))
            .map(|parent| parent.tag.as_str())
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Largest depth present.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|node| node.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn spec(tag: &str, frequency: usize) -> ChildSpec<'_> {
        ChildSpec { tag, frequency }
    }

    #[test]
    fn test_new_tree_has_root_only() {
        let tree = ExplorationTree::new("#food");
        let root = tree.root();
        assert_eq!(root.tag, "#food");
        assert_eq!(root.depth, 0);
        assert!(root.parent.is_none());
        assert!(root.is_leaf());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.epoch(), 0);
    }

    #[test]
    fn test_insert_creates_pair_at_next_depth() {
        let tree = ExplorationTree::new("root");
        let (best, second) = tree.insert("root", "#x", 3, "#y", 1, 4).unwrap();

        assert_eq!(best.depth, 1);
        assert_eq!(second.depth, 1);
        assert_eq!(best.round_frequency, 3);
        assert_eq!(second.round_frequency, 1);
        assert_eq!(best.round_total, 4);
        assert_eq!(best.parent, Some(NodeId::ROOT));

        let found = tree.lookup("#x").unwrap();
        assert_eq!(found, best);
        assert_eq!(tree.root().children, Some((best.id, second.id)));
    }

    #[test]
    fn test_insert_unknown_parent_fails() {
        let tree = ExplorationTree::new("root");
        let err = tree.insert("#missing", "#a", 1, "#b", 1, 2).unwrap_err();
        assert_eq!(
            err,
            ExploreError::ParentNotFound {
                tag: "#missing".into()
            }
        );
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_insert_never_overwrites_children() {
        let tree = ExplorationTree::new("root");
        tree.insert("root", "#a", 2, "#b", 1, 3).unwrap();
        let err = tree.insert("ROOT", "#c", 2, "#d", 1, 3).unwrap_err();
        assert!(matches!(err, ExploreError::ParentExpanded { .. }));
        assert!(tree.lookup("#c").is_none());
    }

    #[test]
    fn test_insert_by_tag_picks_first_unexpanded_duplicate() {
        let tree = ExplorationTree::new("#a");
        tree.insert("#a", "#b", 2, "#a", 1, 3).unwrap();
        // The root "#a" is expanded, so the duplicate leaf "#a" receives the pair.
        let (best, _) = tree.insert("#A", "#c", 5, "#d", 1, 6).unwrap();
        assert_eq!(best.depth, 2);
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_depth_first() {
        let tree = ExplorationTree::new("root");
        tree.insert("root", "#Left", 2, "#right", 1, 3).unwrap();
        tree.insert("#left", "#deep", 1, "#other", 1, 2).unwrap();
        tree.insert("#right", "#DEEP", 1, "#more", 1, 2).unwrap();

        let found = tree.lookup("#deep").unwrap();
        assert_eq!(found.tag, "#deep");
        assert_eq!(found.depth, 2);
        assert_eq!(tree.lookup("#LEFT").unwrap().tag, "#Left");
    }

    #[test]
    fn test_insert_at_rejects_stale_epoch() {
        let tree = ExplorationTree::new("#food");
        let epoch = tree.epoch();
        let new_epoch = tree.reset("#food");
        assert_eq!(new_epoch, epoch + 1);

        let err = tree
            .insert_at(epoch, NodeId::ROOT, spec("#a", 1), spec("#b", 1), 2)
            .unwrap_err();
        assert_eq!(
            err,
            ExploreError::StaleEpoch {
                expected: 0,
                actual: 1
            }
        );
        tree.insert_at(new_epoch, NodeId::ROOT, spec("#a", 1), spec("#b", 1), 2)
            .unwrap();
    }

    #[test]
    fn test_insert_at_rejects_expanded_and_unknown_parent() {
        let tree = ExplorationTree::new("#food");
        tree.insert_at(0, NodeId::ROOT, spec("#a", 1), spec("#b", 1), 2)
            .unwrap();
        assert!(matches!(
            tree.insert_at(0, NodeId::ROOT, spec("#c", 1), spec("#d", 1), 2),
            Err(ExploreError::ParentExpanded { .. })
        ));
        assert!(matches!(
            tree.insert_at(0, NodeId(99), spec("#c", 1), spec("#d", 1), 2),
            Err(ExploreError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_reset_discards_nodes() {
        let tree = ExplorationTree::new("#food");
        tree.insert("#food", "#a", 1, "#b", 1, 2).unwrap();
        tree.reset("#drink");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().tag, "#drink");
        assert!(tree.lookup("#a").is_none());
    }

    #[test]
    fn test_visited_tags_cover_whole_tree() {
        let tree = ExplorationTree::new("#food");
        tree.insert("#food", "#Pizza", 3, "#pasta", 2, 5).unwrap();
        let visited = tree.visited_tags();
        assert!(visited.contains("#FOOD"));
        assert!(visited.contains("#pizza"));
        assert!(visited.contains("#pasta"));
        assert_eq!(visited.len(), 3);
    }

    #[test]
    fn test_concurrent_inserts_keep_pairs_whole() {
        let tree = Arc::new(ExplorationTree::new("#root"));
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let tree = Arc::clone(&tree);
                std::thread::spawn(move || {
                    let epoch = tree.epoch();
                    let mut parent = NodeId::ROOT;
                    for round in 0..50 {
                        let left = format!("#w{i}l{round}");
                        let right = format!("#w{i}r{round}");
                        match tree.insert_at(epoch, parent, spec(&left, 2), spec(&right, 1), 3)
                        {
                            Ok((best, _)) => parent = best.id,
                            Err(ExploreError::ParentExpanded { .. }) => {
                                parent = tree
                                    .snapshot()
                                    .iter()
                                    .find(|n| n.is_leaf())
                                    .map_or(NodeId::ROOT, |n| n.id);
                            }
                            Err(err) => panic!("unexpected error {err}"),
                        }
                    }
                })
            })
            .collect();
        let reader = {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                for pass in 0..200 {
                    let snapshot = tree.snapshot();
                    for node in snapshot.iter() {
                        if let Some((left, right)) = node.children {
                            assert!(snapshot.get(left).is_some());
                            assert!(snapshot.get(right).is_some());
                        }
                    }

                    // A child visible by tag must already be linked from its parent.
                    let round = pass % 50;
                    for i in 0..8 {
                        for tag in [format!("#w{i}l{round}"), format!("#w{i}r{round}")] {
                            let Some(node) = tree.lookup(&tag) else {
                                continue;
                            };
                            let parent = tree.get(node.parent.unwrap()).unwrap();
                            let (left, right) = parent.children.unwrap();
                            assert!(node.id == left || node.id == right);
                            assert_eq!(node.depth, parent.depth + 1);
                        }
                    }
                }
            })
        };
        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_depth_invariants(&tree.snapshot());
    }

    fn assert_depth_invariants(snapshot: &TreeSnapshot) {
        for node in snapshot.iter() {
            match node.parent {
                None => assert_eq!(node.depth, 0),
                Some(parent) => {
                    let parent = snapshot.get(parent).unwrap();
                    assert_eq!(node.depth, parent.depth + 1);
                    let (left, right) = parent.children.unwrap();
                    assert!(left == node.id || right == node.id);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn prop_inserts_preserve_depth_and_pairing(parents in proptest::collection::vec(any::<prop::sample::Index>(), 0..60)) {
            let tree = ExplorationTree::new("#root");
            for (round, pick) in parents.into_iter().enumerate() {
                let snapshot = tree.snapshot();
                let leaves: Vec<_> = snapshot.iter().filter(|n| n.is_leaf()).map(|n| n.id).collect();
                let parent = leaves[pick.index(leaves.len())];
                let best = format!("#b{round}");
                let second = format!("#s{round}");
                tree.insert_at(0, parent, spec(&best, 2), spec(&second, 1), 3).unwrap();
            }
            let snapshot = tree.snapshot();
            assert_depth_invariants(&snapshot);
            let children = snapshot.iter().filter(|n| n.children.is_some()).count();
            prop_assert_eq!(snapshot.len(), 1 + 2 * children);
        }
    }
}
