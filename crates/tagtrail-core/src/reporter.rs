//! Breadth-first lineage report.

use std::io::{self, Write};

use crate::queue::BoundedQueue;
use crate::tree::{ExplorationTree, TreeNode, TreeSnapshot};

/// Parent column for the root line.
pub const INITIAL_SEARCH: &str = "(initial search)";

const fn noun(count: usize) -> &'static str {
    if count == 1 { "tweet" } else { "tweets" }
}

fn line(snapshot: &TreeSnapshot, node: &TreeNode) -> String {
    let parent = snapshot.parent_tag(node).unwrap_or(INITIAL_SEARCH);
    format!(
        "{}.) {} {} had {} of the {} {} that had {}",
        node.depth,
        node.round_frequency,
        noun(node.round_frequency),
        node.tag,
        node.round_total,
        noun(node.round_total),
        parent
    )
}

/// Render one line per node, root first, then each level left to right.
#[must_use]
pub fn render(tree: &ExplorationTree) -> Vec<String> {
    render_snapshot(&tree.snapshot())
}

/// [`render`] over an existing snapshot.
#[must_use]
pub fn render_snapshot(snapshot: &TreeSnapshot) -> Vec<String> {
    let mut lines = Vec::with_capacity(snapshot.len());
    let mut frontier = BoundedQueue::new();
    frontier.push(snapshot.root().clone());

    while let Ok(node) = frontier.pop() {
        lines.push(line(snapshot, &node));
        if let Some((left, right)) = node.children {
            frontier.extend(
                [left, right]
                    .into_iter()
                    .filter_map(|id| snapshot.get(id).cloned()),
            );
        }
    }
    lines
}

/// Write the report to `sink`, one line each.
///
/// # Errors
/// Propagates I/O errors from `sink`.
pub fn write_report(tree: &ExplorationTree, sink: &mut impl Write) -> io::Result<()> {
    for line in render(tree) {
        writeln!(sink, "{line}")?;
    }
    Ok(())
}
