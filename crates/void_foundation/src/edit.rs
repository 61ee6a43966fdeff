//! Edit sessions
//!
//! Checking out a node's content swaps its streamed instance for a writable
//! world. Sessions are keyed by content path, so at most one checkout of a
//! package exists at a time; committing reloads every node that shows the
//! package so sibling instances pick up the saved changes.
//!
//! Sessions can nest: a node inside an edit world may check out its own
//! content. A clean session may sit above or below another session, but no
//! session may open or close while a related one holds unsaved changes.

use std::collections::BTreeSet;

use crate::content::{ContentPath, SaveOutcome};
use crate::error::{FoundationError, Result};
use crate::event::FoundationEvent;
use crate::host::{Attachment, NodeId, NodeKind, TransactionLog};
use crate::registry::EditSession;
use crate::streaming::{Context, StreamingScheduler, View};

/// Result of a checkout request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOut {
    /// The session is open
    Opened,
    /// Other streaming work is still queued; the checkout is applied after
    /// the next tick that leaves the queue empty
    Deferred,
}

/// Grants exclusive, hierarchy-aware edit access to content
#[derive(Default)]
pub struct EditSessionManager {
    pending_edit: Option<NodeId>,
}

impl EditSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node whose checkout waits for streaming to settle
    pub fn pending_edit(&self) -> Option<NodeId> {
        self.pending_edit
    }

    /// Check every precondition for opening a session on `node`
    pub(crate) fn can_check_out(ctx: &View<'_>, node: NodeId) -> Result<()> {
        if !ctx.config.world_kind.allows_editing() {
            return Err(FoundationError::EditingUnavailable(ctx.config.world_kind));
        }
        let record = ctx
            .registry
            .node(node)
            .ok_or(FoundationError::UnknownNode(node))?;
        if record.kind() != NodeKind::ContentHost {
            return Err(FoundationError::NotContentHost(node));
        }
        let Some(path) = record.content_path() else {
            return Err(FoundationError::ContentUnresolvable(ContentPath::empty()));
        };
        if record.composite_id().is_none() {
            let waiting_on = ctx.registry.deferred_on(node).unwrap_or(node);
            return Err(FoundationError::IdentityDeferred { node, waiting_on });
        }
        if ctx.host.root_content().as_ref() == Some(path) {
            return Err(FoundationError::CycleDetected {
                path: path.clone(),
                reason: "content is the root world's own content".into(),
            });
        }
        if !ctx.store.exists(path) {
            return Err(FoundationError::ContentUnresolvable(path.clone()));
        }
        if ctx.registry.session(path).is_some() {
            return Err(FoundationError::AlreadyEditing(path.clone()));
        }

        let ancestors = ctx.ancestors(node);
        for ancestor in &ancestors {
            if let Some(session) = ctx.registry.session_of(*ancestor) {
                if session.is_dirty(ctx.store) {
                    return Err(FoundationError::AncestorOrDescendantDirty {
                        path: path.clone(),
                        reason: format!(
                            "ancestor node {} is editing '{}' with unsaved changes",
                            ancestor, session.content_path
                        ),
                    });
                }
            }
        }

        // Any other session living under this content
        for session in ctx.registry.sessions() {
            let nested_here = ctx.ancestors(session.owner).into_iter().any(|above| {
                ctx.registry
                    .node(above)
                    .and_then(|r| r.content_path())
                    == Some(path)
            });
            if nested_here && session.is_dirty(ctx.store) {
                return Err(FoundationError::AncestorOrDescendantDirty {
                    path: path.clone(),
                    reason: format!("nested edit of '{}' has unsaved changes", session.content_path),
                });
            }
        }

        Ok(())
    }

    /// Open an edit session for the node's content
    ///
    /// The node's streamed instance is unloaded synchronously and replaced by
    /// the writable world. Opening a session drops the undo history.
    pub(crate) fn check_out(
        &mut self,
        ctx: &mut Context<'_>,
        scheduler: &mut StreamingScheduler,
        txlog: &mut dyn TransactionLog,
        node: NodeId,
    ) -> Result<CheckOut> {
        Self::can_check_out(&ctx.view(), node)?;

        if streaming_busy(&ctx.view(), node) {
            return match self.pending_edit {
                Some(pending) if pending != node => Err(FoundationError::EditAlreadyPending(pending)),
                _ => {
                    log::info!("Deferring edit of node {} until streaming settles", node);
                    self.pending_edit = Some(node);
                    Ok(CheckOut::Deferred)
                }
            };
        }
        if self.pending_edit == Some(node) {
            self.pending_edit = None;
        }

        let Some(record) = ctx.registry.node(node) else {
            return Err(FoundationError::UnknownNode(node));
        };
        let (Some(path), Some(owner_id)) = (record.content_path().cloned(), record.composite_id().cloned())
        else {
            return Err(FoundationError::UnknownNode(node));
        };
        let placement = record.placement;

        ctx.registry.pending_mut().cancel_load(node);
        ctx.registry.pending_mut().cancel_unload(&owner_id);
        if scheduler.unload_now(ctx, &owner_id) {
            scheduler.flush(&mut *ctx.host);
        }

        let Some(world) = ctx.store.open_for_edit(&path) else {
            scheduler.request_load_or_update(&mut *ctx.registry, node, false);
            return Err(FoundationError::ContentUnresolvable(path));
        };
        let Some(container) = ctx.host.attach(node, Attachment::Editable(world)) else {
            ctx.store.close_edit(world);
            scheduler.request_load_or_update(&mut *ctx.registry, node, false);
            return Err(FoundationError::ContentUnresolvable(path));
        };
        ctx.host.place_container(container, &placement);

        ctx.registry.insert_session(EditSession {
            content_path: path.clone(),
            owner: node,
            owner_id,
            world,
            container,
        });
        for ancestor in ctx.ancestors(node) {
            ctx.registry.add_child_edit(ancestor);
            ctx.events.push(FoundationEvent::ChildEditStarted { node: ancestor });
        }
        ctx.events.push(FoundationEvent::EditStarted {
            node,
            path: path.clone(),
        });
        ctx.bounds_changed(node);

        txlog.reset(&format!("Editing '{}'; previous operations cannot be undone", path));
        scheduler.discover(ctx, container);

        log::info!("Opened edit session for '{}' on node {}", path, node);
        Ok(CheckOut::Opened)
    }

    /// Close the session for `path`, saving unless `discard` is set
    ///
    /// Returns whether changes were saved, by this commit or by an earlier
    /// save during the session; every node showing the content then reloads.
    /// A declined or failed save, or another instance of the content holding
    /// unsaved nested edits, leaves the session open and everything untouched.
    pub(crate) fn commit(
        &mut self,
        ctx: &mut Context<'_>,
        scheduler: &mut StreamingScheduler,
        path: &ContentPath,
        discard: bool,
    ) -> Result<bool> {
        let Some(session) = ctx.registry.session(path).cloned() else {
            return Err(FoundationError::NotCurrentlyEditing(path.clone()));
        };

        let nested = nested_sessions(&ctx.view(), session.owner);
        if let Some(dirty) = nested.iter().find(|(_, nested_path)| {
            ctx.registry
                .session(nested_path)
                .is_some_and(|s| s.is_dirty(&*ctx.store))
        }) {
            return Err(FoundationError::AncestorOrDescendantDirty {
                path: path.clone(),
                reason: format!("nested edit of '{}' has unsaved changes", dirty.1),
            });
        }

        let dirty = session.is_dirty(&*ctx.store);
        let saved_earlier = session.has_committed_changes(&*ctx.store);

        // Every instance reloads after a save; none of them may lose nested edits
        if saved_earlier || (dirty && !discard) {
            let view = ctx.view();
            if let Some(sibling) = ctx
                .registry
                .nodes_with_content(path)
                .into_iter()
                .filter(|node| *node != session.owner)
                .find(|node| has_dirty_descendants(&view, *node))
            {
                return Err(FoundationError::AncestorOrDescendantDirty {
                    path: path.clone(),
                    reason: format!("node {} shows this content and has unsaved nested edits", sibling),
                });
            }
        }

        let mut changes_applied = saved_earlier;
        if !discard && dirty {
            match save_scoped(ctx, &session) {
                SaveOutcome::Saved => changes_applied = true,
                SaveOutcome::Declined => {
                    return Err(FoundationError::SaveDeclinedOrFailed {
                        path: path.clone(),
                        reason: "save was declined".into(),
                    })
                }
                SaveOutcome::Failed(reason) => {
                    return Err(FoundationError::SaveDeclinedOrFailed {
                        path: path.clone(),
                        reason,
                    })
                }
            }
        }

        // Clean nested sessions go first, deepest first
        for (_, nested_path) in nested {
            close_session(ctx, scheduler, &nested_path, false);
        }
        close_session(ctx, scheduler, path, changes_applied);
        scheduler.flush(&mut *ctx.host);

        let to_update = if changes_applied {
            ctx.registry.nodes_with_content(path)
        } else {
            vec![session.owner]
        };
        for node in to_update {
            scheduler.request_load_or_update(&mut *ctx.registry, node, true);
        }

        if discard {
            log::info!("Discarded edit session for '{}'", path);
            ctx.events.push(FoundationEvent::EditDiscarded { path: path.clone() });
        } else {
            log::info!(
                "Committed edit session for '{}' (changes applied: {})",
                path,
                changes_applied
            );
            ctx.events.push(FoundationEvent::EditCommitted {
                path: path.clone(),
                changes_applied,
            });
        }
        Ok(changes_applied)
    }

    /// Checkout deferred by [`check_out`](Self::check_out), once streaming
    /// has settled
    pub(crate) fn take_ready_pending(&mut self, ctx: &View<'_>) -> Option<NodeId> {
        let node = self.pending_edit?;
        if !ctx.registry.contains(node) {
            self.pending_edit = None;
            return None;
        }
        if streaming_busy(ctx, node) {
            return None;
        }
        self.pending_edit.take()
    }

    pub(crate) fn clear(&mut self) {
        self.pending_edit = None;
    }
}

// Queued streaming work other than the node's own requests
fn streaming_busy(ctx: &View<'_>, node: NodeId) -> bool {
    let pending = ctx.registry.pending();
    let mut own = usize::from(pending.load_request(node).is_some());
    if let Some(id) = ctx.registry.node(node).and_then(|record| record.composite_id()) {
        own += usize::from(pending.is_unload_queued(id));
    }
    pending.len() > own
}

/// Sessions opened below `owner`, deepest first
fn nested_sessions(ctx: &View<'_>, owner: NodeId) -> Vec<(usize, ContentPath)> {
    let mut nested: Vec<(usize, ContentPath)> = ctx
        .registry
        .sessions()
        .filter(|session| session.owner != owner)
        .filter_map(|session| {
            let ancestors = ctx.ancestors(session.owner);
            ancestors
                .contains(&owner)
                .then(|| (ancestors.len(), session.content_path.clone()))
        })
        .collect();
    nested.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    nested
}

/// Whether any session below `node` holds unsaved changes
pub(crate) fn has_dirty_descendants(ctx: &View<'_>, node: NodeId) -> bool {
    nested_sessions(ctx, node).iter().any(|(_, path)| {
        ctx.registry
            .session(path)
            .is_some_and(|session| session.is_dirty(ctx.store))
    })
}

/// Save a session's dirty packages, leaving out packages other sessions own
fn save_scoped(ctx: &mut Context<'_>, session: &EditSession) -> SaveOutcome {
    let mut foreign: BTreeSet<ContentPath> = BTreeSet::new();
    for other in ctx.registry.sessions() {
        if other.content_path == session.content_path {
            continue;
        }
        foreign.insert(other.content_path.clone());
        foreign.extend(ctx.store.dirty_packages(other.world));
    }
    let in_scope: BTreeSet<ContentPath> = ctx
        .store
        .dirty_packages(session.world)
        .into_iter()
        .filter(|package| !foreign.contains(package))
        .collect();

    log::debug!(
        "Saving {} packages for '{}' ({} excluded)",
        in_scope.len(),
        session.content_path,
        foreign.len()
    );
    ctx.store
        .save(&[session.world], &|package: &ContentPath| in_scope.contains(package))
}

/// Tear down a session: release what lives in its world, detach it and
/// return the checkout to the store
pub(crate) fn close_session(
    ctx: &mut Context<'_>,
    scheduler: &mut StreamingScheduler,
    path: &ContentPath,
    changed: bool,
) {
    let Some(container) = ctx.registry.session(path).map(|session| session.container) else {
        return;
    };
    scheduler.release_children(ctx, container);

    let Some(session) = ctx.registry.remove_session(path) else {
        return;
    };
    scheduler.remove_container(session.container);
    ctx.store.close_edit(session.world);

    for ancestor in ctx.ancestors(session.owner) {
        ctx.registry.remove_child_edit(ancestor);
        ctx.events.push(FoundationEvent::ChildEditCommitted {
            node: ancestor,
            changed,
        });
    }
    ctx.bounds_changed(session.owner);
    log::debug!("Closed edit session for '{}'", path);
}

/// Close a session whose owner is going away
///
/// Unsaved changes are saved if possible and dropped otherwise.
pub(crate) fn settle_session(ctx: &mut Context<'_>, scheduler: &mut StreamingScheduler, path: &ContentPath) {
    let Some(session) = ctx.registry.session(path).cloned() else {
        return;
    };

    for (_, nested_path) in nested_sessions(&ctx.view(), session.owner) {
        settle_session(ctx, scheduler, &nested_path);
    }

    let mut changed = session.has_committed_changes(&*ctx.store);
    if session.is_dirty(&*ctx.store) {
        match save_scoped(ctx, &session) {
            SaveOutcome::Saved => changed = true,
            SaveOutcome::Declined => {
                log::warn!("Save of '{}' declined, discarding its changes", path)
            }
            SaveOutcome::Failed(reason) => {
                log::warn!("Save of '{}' failed ({}), discarding its changes", path, reason)
            }
        }
    }

    close_session(ctx, scheduler, path, changed);
    if changed {
        ctx.events.push(FoundationEvent::EditCommitted {
            path: path.clone(),
            changes_applied: true,
        });
    } else {
        ctx.events.push(FoundationEvent::EditDiscarded { path: path.clone() });
    }
}
