//! Streaming scheduler
//!
//! Load and unload requests are collected into the registry's pending queue
//! and applied in one place, [`StreamingScheduler::update`]. Within a pass all
//! unloads run first, then forced reloads unload their stale instance, then
//! every removal is handed to the host in a single bulk detach before any new
//! instance is attached. Content discovered inside a freshly attached
//! instance is queued and loaded by further passes of the same update.

use std::time::Instant;

use crate::config::FoundationConfig;
use crate::content::{ContentPath, ContentStore, Resolution};
use crate::cycle::CycleGuard;
use crate::edit;
use crate::error::Result;
use crate::event::FoundationEvent;
use crate::host::{self, Attachment, ContainerId, HostScene, NodeDesc, NodeId, NodeKind};
use crate::identity::CompositeId;
use crate::registry::{EditState, Registry, StreamedInstance};

/// Mutable view of the subsystem handed to scheduling and editing code
pub(crate) struct Context<'a> {
    pub registry: &'a mut Registry,
    pub host: &'a mut dyn HostScene,
    pub store: &'a mut dyn ContentStore,
    pub config: &'a FoundationConfig,
    pub events: &'a mut Vec<FoundationEvent>,
}

/// Read-only view of the subsystem
pub(crate) struct View<'a> {
    pub registry: &'a Registry,
    pub host: &'a dyn HostScene,
    pub store: &'a dyn ContentStore,
    pub config: &'a FoundationConfig,
}

impl View<'_> {
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        host::ancestors(self.host, node, self.config.max_hierarchy_depth)
    }
}

impl Context<'_> {
    pub fn view(&self) -> View<'_> {
        View {
            registry: &*self.registry,
            host: &*self.host,
            store: &*self.store,
            config: self.config,
        }
    }

    /// Emit `BoundsChanged` for the node and every ancestor
    pub fn bounds_changed(&mut self, node: NodeId) {
        self.events.push(FoundationEvent::BoundsChanged { node });
        for ancestor in host::ancestors(&*self.host, node, self.config.max_hierarchy_depth) {
            self.events.push(FoundationEvent::BoundsChanged { node: ancestor });
        }
    }

    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        host::ancestors(&*self.host, node, self.config.max_hierarchy_depth)
    }

    /// Registered nodes placed directly inside a container
    pub fn registered_children(&self, container: ContainerId) -> Vec<NodeId> {
        let mut children = Vec::new();
        self.host.for_each_child_node(container, &mut |child, _| children.push(child));
        children.retain(|child| self.registry.contains(*child));
        children
    }
}

/// Counters for one update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub passes: u32,
    pub loaded: u32,
    pub unloaded: u32,
    pub failed: u32,
    /// Loads still waiting on the content store
    pub waiting: u32,
    /// Requests held back while unsaved edits live inside the node
    pub held: u32,
    pub skipped: bool,
}

impl TickStats {
    pub fn did_work(&self) -> bool {
        self.loaded + self.unloaded + self.failed > 0
    }
}

enum LoadStep {
    Loaded,
    Waiting,
    Failed,
    Skipped,
}

/// Collects streaming requests and applies them in batches
#[derive(Default)]
pub struct StreamingScheduler {
    removals: Vec<ContainerId>,
    last: TickStats,
}

impl StreamingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stats of the most recent update
    pub fn last_stats(&self) -> TickStats {
        self.last
    }

    /// Queue a load or refresh of a node's content
    ///
    /// Returns true if anything was queued. Nodes without valid content,
    /// without a resolved identity, or currently being edited are ignored. An
    /// already loaded node is only queued when `force` is set.
    pub fn request_load_or_update(&mut self, registry: &mut Registry, node: NodeId, force: bool) -> bool {
        let Some(record) = registry.node(node) else {
            return false;
        };
        if record.kind() != NodeKind::ContentHost || record.content_path().is_none() {
            return false;
        }
        let Some(id) = record.composite_id().cloned() else {
            return false;
        };

        match registry.edit_state(node) {
            EditState::Editing => {
                log::debug!("Ignoring load of node {} while it is being edited", node);
                return false;
            }
            EditState::Loaded if !force && registry.pending().load_request(node) != Some(true) => {
                if !registry.pending().is_unload_queued(&id) {
                    return false;
                }
            }
            _ => {}
        }

        let pending = registry.pending_mut();
        pending.cancel_unload(&id);
        pending.queue_load(node, force);
        true
    }

    /// Queue an unload, cancelling any load queued for the same node
    pub fn request_unload(&mut self, registry: &mut Registry, node: NodeId) {
        let Some(id) = registry.node(node).and_then(|record| record.composite_id().cloned()) else {
            return;
        };
        let loaded = registry.instance(&id).is_some();
        let pending = registry.pending_mut();
        pending.cancel_load(node);
        if loaded {
            pending.queue_unload(id);
        }
    }

    /// Apply queued requests
    ///
    /// Runs passes until the queue drains or the per-tick pass limit is hit.
    /// Loads still waiting on the content store are requeued for the next
    /// update.
    pub(crate) fn update(&mut self, ctx: &mut Context<'_>) -> TickStats {
        let start = Instant::now();
        let mut stats = TickStats::default();
        let mut waiting = Vec::new();
        let mut held_unloads = Vec::new();
        let mut held_loads = Vec::new();

        while stats.passes < ctx.config.max_passes_per_tick && !ctx.registry.pending().is_empty() {
            stats.passes += 1;
            let (unloads, loads) = ctx.registry.pending_mut().take();

            for id in unloads {
                if holds_unsaved_edits(ctx, &id) {
                    held_unloads.push(id);
                } else if self.unload_now(ctx, &id) {
                    stats.unloaded += 1;
                }
            }

            for (&node, _) in loads.iter().filter(|(_, force)| **force) {
                let Some(id) = ctx.registry.node(node).and_then(|r| r.composite_id().cloned()) else {
                    continue;
                };
                if holds_unsaved_edits(ctx, &id) {
                    held_loads.push(node);
                } else if self.unload_now(ctx, &id) {
                    stats.unloaded += 1;
                }
            }

            self.flush(ctx.host);

            for node in loads.into_keys() {
                if held_loads.contains(&node) {
                    continue;
                }
                match self.load_node(ctx, node) {
                    LoadStep::Loaded => stats.loaded += 1,
                    LoadStep::Waiting => waiting.push(node),
                    LoadStep::Failed => stats.failed += 1,
                    LoadStep::Skipped => {}
                }
            }
        }

        self.flush(ctx.host);

        waiting.retain(|node| ctx.registry.contains(*node));
        stats.waiting = waiting.len() as u32;
        for node in waiting {
            ctx.registry.pending_mut().queue_load(node, false);
        }

        held_unloads.retain(|id| ctx.registry.node_by_composite(id).is_some());
        held_loads.retain(|node| ctx.registry.contains(*node));
        stats.held = (held_unloads.len() + held_loads.len()) as u32;
        if stats.held > 0 {
            log::debug!("Holding {} requests until nested edits are saved", stats.held);
        }
        for id in held_unloads {
            ctx.registry.pending_mut().queue_unload(id);
        }
        for node in held_loads {
            ctx.registry.pending_mut().queue_load(node, true);
        }

        if ctx.config.log_tick_summary && stats.did_work() {
            log::info!(
                "Loaded {} nodes, unloaded {} ({} failed, {} waiting) in {:.2} ms",
                stats.loaded,
                stats.unloaded,
                stats.failed,
                stats.waiting,
                start.elapsed().as_secs_f64() * 1000.0
            );
        }

        self.last = stats;
        stats
    }

    /// Hand every accumulated removal to the host in one call
    pub(crate) fn flush(&mut self, host: &mut dyn HostScene) {
        if self.removals.is_empty() {
            return;
        }
        log::debug!("Detaching {} containers", self.removals.len());
        host.detach(&self.removals);
        self.removals.clear();
    }

    /// Queue a container for the next bulk detach
    pub(crate) fn remove_container(&mut self, container: ContainerId) {
        self.removals.push(container);
    }

    /// Destroy an instance now, children first
    ///
    /// Returns false if no instance exists for `id`.
    pub(crate) fn unload_now(&mut self, ctx: &mut Context<'_>, id: &CompositeId) -> bool {
        let Some(container) = ctx.registry.instance(id).map(|instance| instance.container) else {
            return false;
        };

        self.release_children(ctx, container);

        let Some(instance) = ctx.registry.remove_instance(id) else {
            return false;
        };
        self.remove_container(instance.container);
        log::debug!("Unloaded '{}' from node {}", instance.content, instance.owner);
        ctx.events.push(FoundationEvent::Unloaded {
            node: instance.owner,
            composite_id: id.clone(),
        });
        ctx.bounds_changed(instance.owner);
        true
    }

    /// Settle and unregister every node living inside a container
    ///
    /// Their content is unloaded depth-first, so containers reach the removal
    /// batch children before parents.
    pub(crate) fn release_children(&mut self, ctx: &mut Context<'_>, container: ContainerId) {
        for child in ctx.registered_children(container) {
            self.release_node(ctx, child);
        }
    }

    /// Settle a node's session, unload its content and forget it
    pub(crate) fn release_node(&mut self, ctx: &mut Context<'_>, node: NodeId) {
        if let Some(path) = ctx.registry.session_of(node).map(|s| s.content_path.clone()) {
            edit::settle_session(ctx, self, &path);
        }
        if let Some(id) = ctx.registry.node(node).and_then(|r| r.composite_id().cloned()) {
            self.unload_now(ctx, &id);
        }
        ctx.registry.remove_node(node);
    }

    fn load_node(&mut self, ctx: &mut Context<'_>, node: NodeId) -> LoadStep {
        let Some(record) = ctx.registry.node(node) else {
            return LoadStep::Skipped;
        };
        let Some(path) = record.content_path().cloned() else {
            return LoadStep::Skipped;
        };
        let Some(id) = record.composite_id().cloned() else {
            return LoadStep::Skipped;
        };
        let placement = record.placement;
        if ctx.registry.edit_state(node) != EditState::Unloaded {
            return LoadStep::Skipped;
        }

        if ctx.host.root_content().as_ref() == Some(&path) {
            let reason = format!("'{}' is the root world's own content", path);
            return self.fail(ctx, node, path, reason);
        }
        if let Some((ancestor, _)) =
            CycleGuard::ancestor_paths(&*ctx.registry, &*ctx.host, node, ctx.config.max_hierarchy_depth)
                .into_iter()
                .find(|(_, ancestor_path)| *ancestor_path == path)
        {
            let reason = format!("'{}' is already loaded by ancestor node {}", path, ancestor);
            return self.fail(ctx, node, path, reason);
        }

        let handle = match ctx.store.resolve(&path) {
            Resolution::Ready(handle) => handle,
            Resolution::Pending => {
                log::debug!("Content '{}' for node {} is still loading", path, node);
                return LoadStep::Waiting;
            }
            Resolution::Missing => {
                return self.fail(ctx, node, path.clone(), format!("'{}' could not be resolved", path));
            }
        };

        let Some(container) = ctx.host.attach(node, Attachment::Streamed(handle)) else {
            return self.fail(ctx, node, path, "host refused to attach the content".into());
        };
        ctx.host.place_container(container, &placement);
        ctx.registry.insert_instance(
            id.clone(),
            StreamedInstance {
                owner: node,
                content: path.clone(),
                handle,
                container,
            },
        );
        log::debug!("Loaded '{}' into node {} ({})", path, node, id);
        ctx.events.push(FoundationEvent::Loaded { node, composite_id: id });
        ctx.bounds_changed(node);

        self.discover(ctx, container);
        LoadStep::Loaded
    }

    fn fail(&mut self, ctx: &mut Context<'_>, node: NodeId, path: ContentPath, reason: String) -> LoadStep {
        log::warn!("Failed to load node {}: {}", node, reason);
        ctx.events.push(FoundationEvent::LoadFailed { node, path, reason });
        LoadStep::Failed
    }

    /// Register the nodes inside a freshly attached container and queue
    /// their content
    pub(crate) fn discover(&mut self, ctx: &mut Context<'_>, container: ContainerId) {
        let mut found: Vec<(NodeId, NodeDesc)> = Vec::new();
        ctx.host
            .for_each_child_node(container, &mut |child, desc| found.push((child, desc.clone())));

        for (child, desc) in found {
            if ctx.registry.contains(child) {
                continue;
            }
            if let Err(err) = register(ctx, self, child, desc, true) {
                log::warn!("Skipping nested node {}: {}", child, err);
            }
        }
    }
}

// A live instance with a dirty edit session somewhere inside it
fn holds_unsaved_edits(ctx: &Context<'_>, id: &CompositeId) -> bool {
    ctx.registry.instance(id).is_some()
        && ctx
            .registry
            .node_by_composite(id)
            .is_some_and(|node| edit::has_dirty_descendants(&ctx.view(), node))
}

/// Register a node, retry deferred identities and optionally queue the
/// content of every node that became ready
pub(crate) fn register(
    ctx: &mut Context<'_>,
    scheduler: &mut StreamingScheduler,
    node: NodeId,
    desc: NodeDesc,
    queue_loads: bool,
) -> Result<Option<CompositeId>> {
    let depth = ctx.config.max_hierarchy_depth;
    let id = ctx.registry.register(&*ctx.host, node, desc, depth)?;
    if id.is_none() {
        return Ok(None);
    }

    let mut ready = vec![node];
    let deferred = ctx.registry.resolve_deferred(&*ctx.host, depth);
    for (rejected, existing) in deferred.rejected {
        ctx.events.push(FoundationEvent::IdentityRejected { node: rejected, existing });
    }
    ready.extend(deferred.resolved);
    if queue_loads {
        for ready_node in ready {
            scheduler.request_load_or_update(&mut *ctx.registry, ready_node, false);
        }
    }
    Ok(id)
}
