//! Notifications raised while the composition changes
//!
//! Events are queued on the subsystem and handed out by
//! [`Foundation::drain_events`](crate::Foundation::drain_events), so dependent
//! systems (bounds, visibility, outliners) can refresh after a tick.

use crate::content::ContentPath;
use crate::host::NodeId;
use crate::identity::CompositeId;

/// Composition event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FoundationEvent {
    /// A streamed instance was created for the node
    Loaded { node: NodeId, composite_id: CompositeId },
    /// A streamed instance was destroyed
    Unloaded { node: NodeId, composite_id: CompositeId },
    /// The node's content could not be loaded; it stays unloaded
    LoadFailed { node: NodeId, path: ContentPath, reason: String },
    /// An edit session was opened
    EditStarted { node: NodeId, path: ContentPath },
    /// An edit session was closed by a commit
    EditCommitted { path: ContentPath, changes_applied: bool },
    /// An edit session was closed without saving
    EditDiscarded { path: ContentPath },
    /// An edit session opened somewhere below the node
    ChildEditStarted { node: NodeId },
    /// An edit session below the node closed
    ChildEditCommitted { node: NodeId, changed: bool },
    /// The node's bounds may have changed
    BoundsChanged { node: NodeId },
    /// A node whose identity was deferred resolved to an id `existing`
    /// already owns; it was dropped from the registry
    IdentityRejected { node: NodeId, existing: NodeId },
}

impl FoundationEvent {
    /// Node the event concerns, if it names one
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Loaded { node, .. }
            | Self::Unloaded { node, .. }
            | Self::LoadFailed { node, .. }
            | Self::EditStarted { node, .. }
            | Self::ChildEditStarted { node }
            | Self::ChildEditCommitted { node, .. }
            | Self::BoundsChanged { node }
            | Self::IdentityRejected { node, .. } => Some(*node),
            Self::EditCommitted { .. } | Self::EditDiscarded { .. } => None,
        }
    }
}
