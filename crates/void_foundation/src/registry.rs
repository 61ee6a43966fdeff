//! Registry of composed nodes, streamed instances and edit sessions
//!
//! The registry is the sole owner of [`StreamedInstance`] and [`EditSession`]
//! values. Nodes are only ever referred to by [`NodeId`], instances by the
//! owning node's [`CompositeId`], and sessions by content path, so destroying
//! any of them is always done here.

use std::collections::{BTreeMap, BTreeSet};

use crate::bounds::Placement;
use crate::content::{ContentHandle, ContentPath, ContentRef, ContentStore, WritableHandle};
use crate::error::{FoundationError, Result};
use crate::host::{ContainerId, HostScene, NodeDesc, NodeId, NodeKind};
use crate::identity::{CompositeId, IdentityResolution, IdentityResolver, StableId};

/// Streaming state of a node, derived from the registry on demand
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditState {
    Unloaded,
    Loaded,
    Editing,
}

/// A registered node
#[derive(Clone, Debug)]
pub struct NodeRecord {
    id: NodeId,
    pub stable_id: StableId,
    kind: NodeKind,
    content: Option<ContentRef>,
    pub placement: Placement,
    composite_id: Option<CompositeId>,
}

impl NodeRecord {
    fn new(id: NodeId, desc: NodeDesc) -> Self {
        Self {
            id,
            stable_id: desc.stable_id,
            kind: desc.kind,
            content: desc.content,
            placement: desc.placement,
            composite_id: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn content(&self) -> Option<&ContentRef> {
        self.content.as_ref()
    }

    /// Path of the node's content, if it has a non-empty one
    pub fn content_path(&self) -> Option<&ContentPath> {
        self.content
            .as_ref()
            .filter(|content| content.is_valid())
            .map(ContentRef::path)
    }

    /// `None` while identity resolution is deferred
    pub fn composite_id(&self) -> Option<&CompositeId> {
        self.composite_id.as_ref()
    }

    pub(crate) fn set_content(&mut self, content: Option<ContentRef>) {
        self.content = content;
    }
}

/// Live, read-only materialization of a node's content
#[derive(Clone, Debug)]
pub struct StreamedInstance {
    pub owner: NodeId,
    pub content: ContentPath,
    pub handle: ContentHandle,
    pub container: ContainerId,
}

/// Exclusive writable checkout of one content package
#[derive(Clone, Debug)]
pub struct EditSession {
    pub content_path: ContentPath,
    pub owner: NodeId,
    pub owner_id: CompositeId,
    pub world: WritableHandle,
    pub container: ContainerId,
}

impl EditSession {
    /// Unsaved changes, queried from the store each time
    pub fn is_dirty(&self, store: &dyn ContentStore) -> bool {
        store.is_dirty(self.world)
    }

    /// Whether a save has already written some of this session's packages
    pub fn has_committed_changes(&self, store: &dyn ContentStore) -> bool {
        store.saved_since_open(self.world)
    }
}

/// Requests waiting for the next scheduling pass
#[derive(Clone, Debug, Default)]
pub struct PendingOps {
    to_load_or_update: BTreeMap<NodeId, bool>,
    to_unload: BTreeSet<CompositeId>,
}

impl PendingOps {
    /// Queue a load, merging `force` into an existing entry
    pub fn queue_load(&mut self, node: NodeId, force: bool) {
        let entry = self.to_load_or_update.entry(node).or_insert(false);
        *entry |= force;
    }

    /// Drop a queued load; returns true if one was queued
    pub fn cancel_load(&mut self, node: NodeId) -> bool {
        self.to_load_or_update.remove(&node).is_some()
    }

    pub fn queue_unload(&mut self, id: CompositeId) {
        self.to_unload.insert(id);
    }

    pub fn cancel_unload(&mut self, id: &CompositeId) -> bool {
        self.to_unload.remove(id)
    }

    /// `Some(force)` if a load is queued for `node`
    pub fn load_request(&self, node: NodeId) -> Option<bool> {
        self.to_load_or_update.get(&node).copied()
    }

    pub fn is_unload_queued(&self, id: &CompositeId) -> bool {
        self.to_unload.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.to_load_or_update.is_empty() && self.to_unload.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_load_or_update.len() + self.to_unload.len()
    }

    pub(crate) fn take(&mut self) -> (BTreeSet<CompositeId>, BTreeMap<NodeId, bool>) {
        (
            std::mem::take(&mut self.to_unload),
            std::mem::take(&mut self.to_load_or_update),
        )
    }

    pub(crate) fn clear(&mut self) {
        self.to_load_or_update.clear();
        self.to_unload.clear();
    }
}

/// Outcome of retrying deferred identities
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeferredResolution {
    /// Nodes that now have a composite id
    pub resolved: Vec<NodeId>,
    /// Dropped nodes, paired with the node already owning their identity
    pub rejected: Vec<(NodeId, NodeId)>,
}

/// Lookup tables for one composition subsystem
#[derive(Default)]
pub struct Registry {
    nodes: BTreeMap<NodeId, NodeRecord>,
    by_composite: BTreeMap<CompositeId, NodeId>,
    instances: BTreeMap<CompositeId, StreamedInstance>,
    sessions: BTreeMap<ContentPath, EditSession>,
    /// Nodes whose identity waits on an ancestor, with the ancestor
    deferred: BTreeMap<NodeId, NodeId>,
    child_edits: BTreeMap<NodeId, u32>,
    pending: PendingOps,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Nodes

    pub fn node(&self, node: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&node)
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_composite(&self, id: &CompositeId) -> Option<NodeId> {
        self.by_composite.get(id).copied()
    }

    /// Ancestor a deferred node is waiting on
    pub fn deferred_on(&self, node: NodeId) -> Option<NodeId> {
        self.deferred.get(&node).copied()
    }

    /// Registered nodes whose content path equals `path`
    pub fn nodes_with_content(&self, path: &ContentPath) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|record| record.content_path() == Some(path))
            .map(NodeRecord::id)
            .collect()
    }

    /// Register a node and resolve its composite identity
    ///
    /// Returns `Ok(None)` when identity resolution is deferred on an ancestor
    /// that has not registered yet. Registering an already registered node
    /// returns its current identity.
    pub fn register(
        &mut self,
        host: &dyn HostScene,
        node: NodeId,
        desc: NodeDesc,
        max_depth: usize,
    ) -> Result<Option<CompositeId>> {
        if let Some(existing) = self.nodes.get(&node) {
            log::debug!("Node {} is already registered", node);
            return Ok(existing.composite_id.clone());
        }
        if !desc.stable_id.is_valid() {
            return Err(FoundationError::InvalidStableId(node));
        }

        self.nodes.insert(node, NodeRecord::new(node, desc));
        match IdentityResolver::compute_composite_id(self, host, node, max_depth) {
            Some(IdentityResolution::Resolved(id)) => {
                if let Some(existing) = self.by_composite.get(&id).copied() {
                    self.nodes.remove(&node);
                    log::error!(
                        "Node {} resolves to composite id {} already owned by node {}",
                        node,
                        id,
                        existing
                    );
                    return Err(FoundationError::DuplicateIdentity { node, existing });
                }
                self.assign_identity(node, id.clone());
                log::debug!("Registered node {} as {}", node, id);
                Ok(Some(id))
            }
            Some(IdentityResolution::Deferred { waiting_on }) => {
                log::debug!("Identity of node {} deferred until {} registers", node, waiting_on);
                self.deferred.insert(node, waiting_on);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Retry deferred identities
    ///
    /// Nodes whose identity turns out to be taken are dropped from the
    /// registry and reported in [`DeferredResolution::rejected`].
    pub fn resolve_deferred(&mut self, host: &dyn HostScene, max_depth: usize) -> DeferredResolution {
        let mut resolution = DeferredResolution::default();
        // Resolving one node can unblock nodes below it
        loop {
            let waiting: Vec<NodeId> = self.deferred.keys().copied().collect();
            let mut progressed = false;
            for node in waiting {
                match IdentityResolver::compute_composite_id(self, host, node, max_depth) {
                    Some(IdentityResolution::Resolved(id)) => {
                        self.deferred.remove(&node);
                        if let Some(existing) = self.by_composite.get(&id).copied() {
                            log::error!(
                                "Deferred node {} collides with node {} on {}; dropping it",
                                node,
                                existing,
                                id
                            );
                            self.nodes.remove(&node);
                            resolution.rejected.push((node, existing));
                            continue;
                        }
                        self.assign_identity(node, id);
                        resolution.resolved.push(node);
                        progressed = true;
                    }
                    Some(IdentityResolution::Deferred { waiting_on }) => {
                        self.deferred.insert(node, waiting_on);
                    }
                    None => {
                        self.deferred.remove(&node);
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        resolution
    }

    fn assign_identity(&mut self, node: NodeId, id: CompositeId) {
        self.by_composite.insert(id.clone(), node);
        if let Some(record) = self.nodes.get_mut(&node) {
            record.composite_id = Some(id);
        }
    }

    /// Forget a node; the caller settles its sessions and instance first
    pub(crate) fn remove_node(&mut self, node: NodeId) -> Option<NodeRecord> {
        let record = self.nodes.remove(&node)?;
        self.deferred.remove(&node);
        self.child_edits.remove(&node);
        self.pending.cancel_load(node);
        if let Some(id) = &record.composite_id {
            self.by_composite.remove(id);
            self.pending.cancel_unload(id);
            debug_assert!(
                !self.instances.contains_key(id),
                "node {} removed while its instance is live",
                node
            );
        }
        Some(record)
    }

    // Instances

    pub fn instance(&self, id: &CompositeId) -> Option<&StreamedInstance> {
        self.instances.get(id)
    }

    /// Instance owned by a node
    pub fn instance_of(&self, node: NodeId) -> Option<&StreamedInstance> {
        self.nodes
            .get(&node)
            .and_then(|record| record.composite_id.as_ref())
            .and_then(|id| self.instances.get(id))
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn insert_instance(&mut self, id: CompositeId, instance: StreamedInstance) {
        debug_assert!(
            !self.sessions.values().any(|s| s.owner == instance.owner),
            "node {} loaded while editing",
            instance.owner
        );
        let previous = self.instances.insert(id, instance);
        debug_assert!(previous.is_none(), "streamed instance replaced without unloading");
    }

    pub(crate) fn remove_instance(&mut self, id: &CompositeId) -> Option<StreamedInstance> {
        self.instances.remove(id)
    }

    // Sessions

    pub fn session(&self, path: &ContentPath) -> Option<&EditSession> {
        self.sessions.get(path)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &EditSession> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session opened by `node`
    pub fn session_of(&self, node: NodeId) -> Option<&EditSession> {
        let path = self.nodes.get(&node)?.content_path()?;
        self.sessions.get(path).filter(|session| session.owner == node)
    }

    pub(crate) fn insert_session(&mut self, session: EditSession) {
        debug_assert!(
            !self.instances.contains_key(&session.owner_id),
            "edit session opened over a live instance"
        );
        let previous = self.sessions.insert(session.content_path.clone(), session);
        debug_assert!(previous.is_none(), "two edit sessions for one content path");
    }

    pub(crate) fn remove_session(&mut self, path: &ContentPath) -> Option<EditSession> {
        self.sessions.remove(path)
    }

    // Derived state

    pub fn edit_state(&self, node: NodeId) -> EditState {
        if self.session_of(node).is_some() {
            EditState::Editing
        } else if self.instance_of(node).is_some() {
            EditState::Loaded
        } else {
            EditState::Unloaded
        }
    }

    pub fn is_loaded(&self, node: NodeId) -> bool {
        self.instance_of(node).is_some()
    }

    /// Container holding the node's live content, streamed or editable
    pub fn container_of(&self, node: NodeId) -> Option<ContainerId> {
        self.instance_of(node)
            .map(|instance| instance.container)
            .or_else(|| self.session_of(node).map(|session| session.container))
    }

    // Child edits

    pub fn child_edit_count(&self, node: NodeId) -> u32 {
        self.child_edits.get(&node).copied().unwrap_or(0)
    }

    pub(crate) fn add_child_edit(&mut self, node: NodeId) {
        *self.child_edits.entry(node).or_insert(0) += 1;
    }

    pub(crate) fn remove_child_edit(&mut self, node: NodeId) {
        if let Some(count) = self.child_edits.get_mut(&node) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.child_edits.remove(&node);
            }
        }
    }

    // Pending work

    pub fn pending(&self) -> &PendingOps {
        &self.pending
    }

    pub(crate) fn pending_mut(&mut self) -> &mut PendingOps {
        &mut self.pending
    }

    /// Drop everything; used on host-world teardown
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_composite.clear();
        self.instances.clear();
        self.sessions.clear();
        self.deferred.clear();
        self.child_edits.clear();
        self.pending.clear();
    }
}
