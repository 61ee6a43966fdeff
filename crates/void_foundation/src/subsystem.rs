//! The composition subsystem
//!
//! [`Foundation`] owns one [`Registry`] plus the scheduler, the session
//! manager and the three collaborators. Nothing is global: every world gets
//! its own value.

use crate::bounds::{Bounds, BoundsAggregator, Placement};
use crate::config::FoundationConfig;
use crate::content::{ContentPath, ContentRef, ContentStore};
use crate::cycle::CycleGuard;
use crate::edit::{self, CheckOut, EditSessionManager};
use crate::error::{FoundationError, Result};
use crate::event::FoundationEvent;
use crate::host::{self, HostScene, NodeDesc, NodeId, NodeKind, TransactionLog};
use crate::identity::CompositeId;
use crate::registry::{EditState, Registry};
use crate::streaming::{self, Context, StreamingScheduler, TickStats, View};

/// Composition and streaming core for one world
pub struct Foundation<H, S, T> {
    config: FoundationConfig,
    registry: Registry,
    scheduler: StreamingScheduler,
    edits: EditSessionManager,
    host: H,
    store: S,
    txlog: T,
    events: Vec<FoundationEvent>,
}

/// Split borrows of a [`Foundation`]
struct Parts<'a, T> {
    ctx: Context<'a>,
    scheduler: &'a mut StreamingScheduler,
    edits: &'a mut EditSessionManager,
    txlog: &'a mut T,
}

impl<H, S, T> Foundation<H, S, T>
where
    H: HostScene,
    S: ContentStore,
    T: TransactionLog,
{
    /// Create a subsystem for one world
    pub fn new(config: FoundationConfig, host: H, store: S, txlog: T) -> Self {
        log::info!("Foundation subsystem created for {} world", config.world_kind);
        Self {
            config,
            registry: Registry::new(),
            scheduler: StreamingScheduler::new(),
            edits: EditSessionManager::new(),
            host,
            store,
            txlog,
            events: Vec::new(),
        }
    }

    fn parts(&mut self) -> Parts<'_, T> {
        Parts {
            ctx: Context {
                registry: &mut self.registry,
                host: &mut self.host,
                store: &mut self.store,
                config: &self.config,
                events: &mut self.events,
            },
            scheduler: &mut self.scheduler,
            edits: &mut self.edits,
            txlog: &mut self.txlog,
        }
    }

    fn view(&self) -> View<'_> {
        View {
            registry: &self.registry,
            host: &self.host,
            store: &self.store,
            config: &self.config,
        }
    }

    // Node lifecycle

    /// Register a node placed by the host
    ///
    /// Returns the node's composite id, or `None` while it waits on an
    /// unregistered ancestor. Nodes waiting on this one are resolved too.
    pub fn register_node(&mut self, node: NodeId, desc: NodeDesc) -> Result<Option<CompositeId>> {
        let queue_loads = self.config.load_on_register;
        let Parts { mut ctx, scheduler, .. } = self.parts();
        streaming::register(&mut ctx, scheduler, node, desc, queue_loads)
    }

    /// Remove a node the host destroyed
    ///
    /// Settles any edit session below or on the node, unloads its content
    /// immediately and forgets it. Unknown nodes are ignored.
    pub fn unregister_node(&mut self, node: NodeId) {
        if !self.registry.contains(node) {
            return;
        }
        let Parts {
            mut ctx, scheduler, edits, ..
        } = self.parts();
        if edits.pending_edit() == Some(node) {
            edits.clear();
        }
        scheduler.release_node(&mut ctx, node);
        scheduler.flush(&mut *ctx.host);
        log::debug!("Unregistered node {}", node);
    }

    /// Assign or clear a node's content
    ///
    /// Guarded by [`can_assign`](Self::can_assign). The change takes effect
    /// on the next tick.
    pub fn set_content_ref(&mut self, node: NodeId, content: Option<ContentRef>) -> Result<()> {
        let record = self.registry.node(node).ok_or(FoundationError::UnknownNode(node))?;
        if record.kind() != NodeKind::ContentHost {
            return Err(FoundationError::NotContentHost(node));
        }
        if record.content() == content.as_ref() {
            return Ok(());
        }
        if let Some(session) = self.registry.session_of(node) {
            return Err(FoundationError::AlreadyEditing(session.content_path.clone()));
        }
        if let Some(candidate) = &content {
            self.can_assign(node, candidate)?;
        }

        let loads = content.as_ref().is_some_and(ContentRef::is_valid);
        if let Some(record) = self.registry.node_mut(node) {
            record.set_content(content);
        }
        if loads {
            self.scheduler.request_load_or_update(&mut self.registry, node, true);
        } else {
            self.scheduler.request_unload(&mut self.registry, node);
        }
        self.events.push(FoundationEvent::BoundsChanged { node });
        Ok(())
    }

    /// Check whether `node` may host `candidate` without a recursive load
    pub fn can_assign(&self, node: NodeId, candidate: &ContentRef) -> Result<()> {
        CycleGuard::can_assign(
            &self.registry,
            &self.host,
            &self.store,
            node,
            candidate,
            self.config.max_hierarchy_depth,
        )
    }

    /// Move a node
    ///
    /// Transform proxies forward the move to the node owning the content
    /// they live in.
    pub fn set_placement(&mut self, node: NodeId, placement: Placement) -> Result<()> {
        let record = self.registry.node(node).ok_or(FoundationError::UnknownNode(node))?;
        if record.kind() == NodeKind::TransformProxy {
            let owner = self
                .host
                .ancestor_of(node)
                .ok_or(FoundationError::NotContentHost(node))?;
            return self.set_placement(owner, placement);
        }

        if let Some(record) = self.registry.node_mut(node) {
            record.placement = placement;
        }
        if let Some(container) = self.registry.container_of(node) {
            self.host.place_container(container, &placement);
        }
        let Parts { mut ctx, .. } = self.parts();
        ctx.bounds_changed(node);
        Ok(())
    }

    // Streaming

    /// Queue a load, or a reload when `force` is set
    pub fn request_load_or_update(&mut self, node: NodeId, force: bool) -> bool {
        self.scheduler.request_load_or_update(&mut self.registry, node, force)
    }

    /// Queue an unload; cancels a queued load of the same node
    pub fn request_unload(&mut self, node: NodeId) {
        self.scheduler.request_unload(&mut self.registry, node);
    }

    /// Apply queued streaming work
    ///
    /// Skipped entirely while the transaction log is recording.
    pub fn tick(&mut self) -> TickStats {
        if self.txlog.is_operation_in_progress() {
            log::debug!("Transaction in progress, skipping streaming update");
            return TickStats {
                skipped: true,
                ..Default::default()
            };
        }
        self.update()
    }

    fn update(&mut self) -> TickStats {
        let Parts {
            mut ctx,
            scheduler,
            edits,
            txlog,
        } = self.parts();
        let stats = scheduler.update(&mut ctx);

        if let Some(node) = edits.take_ready_pending(&ctx.view()) {
            log::info!("Applying deferred edit of node {}", node);
            if let Err(err) = edits.check_out(&mut ctx, scheduler, txlog, node) {
                log::warn!("Deferred edit of node {} failed: {}", node, err);
            }
        }
        stats
    }

    /// Tick until no streaming work is left, ignoring the transaction gate
    ///
    /// Returns false if work remained after `max_blocking_ticks` updates.
    pub fn block_on_loading(&mut self) -> bool {
        for _ in 0..self.config.max_blocking_ticks {
            if self.registry.pending().is_empty() && self.edits.pending_edit().is_none() {
                return true;
            }
            self.update();
        }
        let settled = self.registry.pending().is_empty();
        if !settled {
            log::warn!(
                "Streaming did not settle after {} updates ({} requests left)",
                self.config.max_blocking_ticks,
                self.registry.pending().len()
            );
        }
        settled
    }

    /// Load a node and everything nested in it before returning
    pub fn block_load(&mut self, node: NodeId) -> bool {
        self.request_load_or_update(node, false);
        self.block_on_loading();
        self.registry.is_loaded(node)
    }

    /// Unload a node before returning
    pub fn block_unload(&mut self, node: NodeId) {
        self.request_unload(node);
        self.block_on_loading();
    }

    // Editing

    /// Check whether `node`'s content could be checked out right now
    pub fn can_check_out(&self, node: NodeId) -> Result<()> {
        EditSessionManager::can_check_out(&self.view(), node)
    }

    /// Open an edit session for `node`'s content
    pub fn check_out(&mut self, node: NodeId) -> Result<CheckOut> {
        let Parts {
            mut ctx,
            scheduler,
            edits,
            txlog,
        } = self.parts();
        edits.check_out(&mut ctx, scheduler, txlog, node)
    }

    /// Close the session for `path`; returns whether changes were saved
    pub fn commit(&mut self, path: &ContentPath, discard: bool) -> Result<bool> {
        let Parts {
            mut ctx,
            scheduler,
            edits,
            ..
        } = self.parts();
        edits.commit(&mut ctx, scheduler, path, discard)
    }

    /// Close the session for `path` without saving
    pub fn discard(&mut self, path: &ContentPath) -> Result<()> {
        self.commit(path, true).map(|_| ())
    }

    /// Commit the session opened by `node`
    pub fn commit_node(&mut self, node: NodeId) -> Result<bool> {
        let path = self
            .registry
            .node(node)
            .ok_or(FoundationError::UnknownNode(node))?
            .content_path()
            .cloned()
            .unwrap_or_else(ContentPath::empty);
        self.commit(&path, false)
    }

    /// Whether the session for `path` has unsaved changes
    pub fn is_dirty(&self, path: &ContentPath) -> bool {
        self.registry
            .session(path)
            .is_some_and(|session| session.is_dirty(&self.store))
    }

    // Queries

    /// Bounds of a node, exact if loaded and from saved metadata otherwise
    pub fn get_bounds(&self, node: NodeId) -> Option<Bounds> {
        BoundsAggregator::get_bounds(&self.registry, &self.host, &self.store, node)
    }

    /// Visit ancestors nearest first until `f` returns false
    pub fn for_each_ancestor(&self, node: NodeId, mut f: impl FnMut(NodeId) -> bool) {
        for ancestor in host::ancestors(&self.host, node, self.config.max_hierarchy_depth) {
            if !f(ancestor) {
                break;
            }
        }
    }

    /// Visit registered nodes inside `node`'s live content
    ///
    /// With `recursive`, nodes inside their content are visited too,
    /// depth-first. Stops when `f` returns false.
    pub fn for_each_descendant(&self, node: NodeId, recursive: bool, mut f: impl FnMut(NodeId) -> bool) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(container) = self.registry.container_of(current) else {
                continue;
            };
            let mut children = Vec::new();
            self.host
                .for_each_child_node(container, &mut |child, _| children.push(child));
            children.retain(|child| self.registry.contains(*child));

            for child in &children {
                if !f(*child) {
                    return;
                }
            }
            if recursive {
                stack.extend(children.into_iter().rev());
            }
        }
    }

    /// Whether an edit session below `node` holds unsaved changes
    pub fn has_dirty_descendants(&self, node: NodeId) -> bool {
        edit::has_dirty_descendants(&self.view(), node)
    }

    /// Whether an edit session is open somewhere below `node`
    pub fn has_child_edit(&self, node: NodeId) -> bool {
        self.registry.child_edit_count(node) > 0
    }

    pub fn edit_state(&self, node: NodeId) -> EditState {
        self.registry.edit_state(node)
    }

    pub fn composite_id(&self, node: NodeId) -> Option<&CompositeId> {
        self.registry.node(node)?.composite_id()
    }

    pub fn node_by_composite(&self, id: &CompositeId) -> Option<NodeId> {
        self.registry.node_by_composite(id)
    }

    // Housekeeping

    /// Take every event raised since the last call
    pub fn drain_events(&mut self) -> Vec<FoundationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Discard every session, unload everything and reset the registry
    pub fn teardown(&mut self) {
        let Parts {
            mut ctx,
            scheduler,
            edits,
            ..
        } = self.parts();
        edits.clear();

        let mut sessions: Vec<(usize, ContentPath)> = ctx
            .registry
            .sessions()
            .map(|session| (ctx.ancestors(session.owner).len(), session.content_path.clone()))
            .collect();
        sessions.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in sessions {
            edit::close_session(&mut ctx, scheduler, &path, false);
        }

        let roots: Vec<NodeId> = ctx
            .registry
            .nodes()
            .map(|record| record.id())
            .filter(|node| ctx.host.ancestor_of(*node).is_none())
            .collect();
        for node in roots {
            if let Some(id) = ctx.registry.node(node).and_then(|r| r.composite_id().cloned()) {
                scheduler.unload_now(&mut ctx, &id);
            }
        }
        scheduler.flush(&mut *ctx.host);

        let dropped = ctx.registry.node_count();
        ctx.registry.clear();
        log::info!("Foundation torn down ({} nodes dropped)", dropped);
    }

    pub fn config(&self) -> &FoundationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn scheduler(&self) -> &StreamingScheduler {
        &self.scheduler
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn txlog(&self) -> &T {
        &self.txlog
    }

    pub fn txlog_mut(&mut self) -> &mut T {
        &mut self.txlog
    }
}
