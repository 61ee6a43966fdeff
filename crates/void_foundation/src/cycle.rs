//! Recursive-load detection
//!
//! A content assignment is rejected when the candidate package is already
//! loaded somewhere up the node's hosting chain, or when anything nested in
//! the candidate (at any depth) leads back to such a package.

use std::collections::BTreeSet;

use crate::content::{ContentPath, ContentRef, ContentStore};
use crate::error::{FoundationError, Result};
use crate::host::{self, HostScene, NodeId};
use crate::registry::Registry;

/// Pure predicate guarding every content assignment
pub struct CycleGuard;

impl CycleGuard {
    /// Check whether `node` may host `candidate`
    ///
    /// An empty reference is always accepted. Mutates nothing.
    pub fn can_assign(
        registry: &Registry,
        host: &dyn HostScene,
        store: &dyn ContentStore,
        node: NodeId,
        candidate: &ContentRef,
        max_depth: usize,
    ) -> Result<()> {
        if !registry.contains(node) {
            return Err(FoundationError::UnknownNode(node));
        }
        if !candidate.is_valid() {
            return Ok(());
        }
        let path = candidate.path();

        let mut loaded_above = BTreeSet::new();
        if let Some(root) = host.root_content() {
            if &root == path {
                return Err(cycle(path, format!("'{}' is the root world's own content", path)));
            }
            loaded_above.insert(root);
        }
        for (ancestor, ancestor_path) in Self::ancestor_paths(registry, host, node, max_depth) {
            if &ancestor_path == path {
                return Err(cycle(
                    path,
                    format!("'{}' is already loaded by ancestor node {}", path, ancestor),
                ));
            }
            loaded_above.insert(ancestor_path);
        }

        let mut stack = vec![path.clone()];
        let mut visited = BTreeSet::new();
        visited.insert(path.clone());
        walk_nested(store, path, &loaded_above, &mut stack, &mut visited, max_depth)
    }

    /// Content paths of the node's ancestors, nearest first
    pub fn ancestor_paths(
        registry: &Registry,
        host: &dyn HostScene,
        node: NodeId,
        max_depth: usize,
    ) -> Vec<(NodeId, ContentPath)> {
        host::ancestors(host, node, max_depth)
            .into_iter()
            .filter_map(|ancestor| {
                let path = registry.node(ancestor)?.content_path()?.clone();
                Some((ancestor, path))
            })
            .collect()
    }
}

fn cycle(path: &ContentPath, reason: String) -> FoundationError {
    FoundationError::CycleDetected {
        path: path.clone(),
        reason,
    }
}

fn chain(stack: &[ContentPath], last: &ContentPath) -> String {
    let mut parts: Vec<&str> = stack.iter().map(ContentPath::as_str).collect();
    parts.push(last.as_str());
    parts.join(" -> ")
}

// Depth-first through nested content; `stack` is the current nesting path
fn walk_nested(
    store: &dyn ContentStore,
    path: &ContentPath,
    loaded_above: &BTreeSet<ContentPath>,
    stack: &mut Vec<ContentPath>,
    visited: &mut BTreeSet<ContentPath>,
    max_depth: usize,
) -> Result<()> {
    if stack.len() > max_depth {
        return Err(cycle(
            &stack[0],
            format!("content nests deeper than {} levels", max_depth),
        ));
    }

    for nested in store.nested_content(path) {
        if nested.is_empty() {
            continue;
        }
        if loaded_above.contains(&nested) {
            return Err(cycle(
                &stack[0],
                format!("{} is already loaded above this node", chain(stack, &nested)),
            ));
        }
        if stack.contains(&nested) {
            return Err(cycle(
                &stack[0],
                format!("{} loads itself", chain(stack, &nested)),
            ));
        }
        if visited.insert(nested.clone()) {
            stack.push(nested.clone());
            walk_nested(store, &nested, loaded_above, stack, visited, max_depth)?;
            stack.pop();
        }
    }
    Ok(())
}
