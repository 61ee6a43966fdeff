//! Host Scene and Transaction Log collaborators
//!
//! The host scene owns and renders everything; the composition core only
//! asks it structural questions and tells it when to attach or detach
//! content. Nodes never hold parent pointers: the hierarchy is recovered by
//! asking the host which node owns the container a node lives in.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::{Bounds, Placement};
use crate::content::{ContentHandle, ContentPath, ContentRef, WritableHandle};
use crate::identity::StableId;

/// Host-side handle of a node placeholder
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host-side handle of attached content (a streamed instance or an edit world)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub u64);

/// Capability of a node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Hosts nested content
    #[default]
    ContentHost,
    /// Lives inside streamed content and forwards placement changes to the
    /// node that owns that content
    TransformProxy,
}

/// Everything the core needs to know about a node at registration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDesc {
    pub stable_id: StableId,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub content: Option<ContentRef>,
    #[serde(default)]
    pub placement: Placement,
}

impl NodeDesc {
    /// Content-hosting node
    pub fn host(stable_id: StableId, content: Option<ContentRef>) -> Self {
        Self {
            stable_id,
            kind: NodeKind::ContentHost,
            content,
            placement: Placement::IDENTITY,
        }
    }

    /// Transform proxy node
    pub fn proxy(stable_id: StableId) -> Self {
        Self {
            stable_id,
            kind: NodeKind::TransformProxy,
            content: None,
            placement: Placement::IDENTITY,
        }
    }

    /// Set the placement
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Content to attach under a node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment {
    /// Read-only streamed instance
    Streamed(ContentHandle),
    /// Writable edit world
    Editable(WritableHandle),
}

/// The scene graph composition nodes live inside
pub trait HostScene {
    /// Node owning the container that directly holds `node`, or `None` for a
    /// node placed in the root world
    fn ancestor_of(&self, node: NodeId) -> Option<NodeId>;

    /// Path of the root world's own content, if it has one
    fn root_content(&self) -> Option<ContentPath> {
        None
    }

    /// Materialize content as a new container owned by `owner`
    fn attach(&mut self, owner: NodeId, attachment: Attachment) -> Option<ContainerId>;

    /// Remove containers (and everything inside them) in one bulk operation
    fn detach(&mut self, containers: &[ContainerId]);

    /// Visit the nodes placed directly inside a container
    fn for_each_child_node(&self, container: ContainerId, f: &mut dyn FnMut(NodeId, &NodeDesc));

    /// Exact bounds of a live container
    fn container_bounds(&self, container: ContainerId) -> Option<Bounds>;

    /// Move a live container to follow its owner
    fn place_container(&mut self, _container: ContainerId, _placement: &Placement) {}
}

/// Hosting chain of `node`, nearest ancestor first
///
/// Stops after `max_depth` ancestors so a host that reports a looping chain
/// cannot hang the walk.
pub fn ancestors(host: &dyn HostScene, node: NodeId, max_depth: usize) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut current = node;
    while let Some(ancestor) = host.ancestor_of(current) {
        if chain.len() >= max_depth {
            log::error!("Hosting chain of node {} exceeds {} levels", node, max_depth);
            break;
        }
        chain.push(ancestor);
        current = ancestor;
    }
    chain
}

/// The editor undo/transaction system
pub trait TransactionLog {
    /// True while an undoable operation is being recorded
    fn is_operation_in_progress(&self) -> bool;

    /// Drop the undo history; called when an operation cannot be undone
    fn reset(&mut self, _reason: &str) {}
}

/// Transaction log for worlds without undo
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTransactions;

impl TransactionLog for NoTransactions {
    fn is_operation_in_progress(&self) -> bool {
        false
    }
}
