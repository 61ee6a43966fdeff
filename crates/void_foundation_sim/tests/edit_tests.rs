//! Edit session tests for void_foundation

mod common;

use common::{build_with, loaded, path};
use void_foundation::prelude::*;
use void_foundation::SaveOutcome;
use void_foundation_sim::{SavePolicy, SimCall, SimWorld};

fn close_edits(world: &SimWorld) -> Vec<ContentPath> {
    world
        .calls
        .snapshot()
        .into_iter()
        .filter_map(|call| match call {
            SimCall::CloseEdit { path } => Some(path),
            _ => None,
        })
        .collect()
}

/// Opening a session replaces the streamed instance with a writable world
#[test]
fn test_check_out_swaps_in_edit_world() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();
    world.calls.clear();
    world.foundation.drain_events();

    assert_eq!(world.foundation.check_out(east).unwrap(), CheckOut::Opened);

    assert_eq!(world.foundation.edit_state(east), EditState::Editing);
    assert_eq!(world.foundation.edit_state(west), EditState::Loaded);
    let container = world.foundation.host().container_of(east).unwrap();
    assert!(world.foundation.host().is_editable(container));
    assert_eq!(
        world.foundation.registry().session(&path("/Game/House")).unwrap().owner,
        east
    );

    let calls = world.calls.snapshot();
    let detach = calls
        .iter()
        .position(|call| matches!(call, SimCall::Detach { .. }))
        .unwrap();
    let open = calls
        .iter()
        .position(|call| matches!(call, SimCall::OpenForEdit { .. }))
        .unwrap();
    assert!(detach < open);
    assert_eq!(
        world
            .calls
            .count(|call| matches!(call, SimCall::TransactionReset { .. })),
        1
    );

    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditStarted {
        node: east,
        path: path("/Game/House")
    }));

    // Content nested in the edit world streams like any other
    assert!(world.foundation.block_on_loading());
    let kitchen = world.find(&["HouseEast", "Kitchen"]).unwrap();
    assert_eq!(world.foundation.edit_state(kitchen), EditState::Loaded);
}

/// A package can only be checked out once
#[test]
fn test_second_check_out_rejected() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();

    world.foundation.check_out(east).unwrap();

    let expected = FoundationError::AlreadyEditing(path("/Game/House"));
    assert_eq!(world.foundation.check_out(west), Err(expected.clone()));
    assert_eq!(world.foundation.check_out(east), Err(expected.clone()));
    assert_eq!(world.foundation.can_check_out(west), Err(expected));
}

/// Saved changes reload every node showing the package
#[test]
fn test_commit_reloads_all_instances() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    assert!(world.foundation.store_mut().touch(&house));
    assert!(world.foundation.is_dirty(&house));
    world.calls.clear();
    world.foundation.drain_events();

    assert_eq!(world.foundation.commit(&house, false), Ok(true));

    let pending = world.foundation.registry().pending();
    assert_eq!(pending.load_request(east), Some(true));
    assert_eq!(pending.load_request(west), Some(true));
    assert_eq!(
        world.calls.snapshot().first(),
        Some(&SimCall::Save {
            packages: vec![house.clone()]
        })
    );
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditCommitted {
        path: house.clone(),
        changes_applied: true
    }));

    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.edit_state(east), EditState::Loaded);
    assert_eq!(world.foundation.edit_state(west), EditState::Loaded);
    let container = world.foundation.host().container_of(east).unwrap();
    assert!(!world.foundation.host().is_editable(container));
}

/// Changes saved before the commit still reload every node showing the
/// package
#[test]
fn test_commit_after_earlier_save_reloads_all_instances() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&house);

    let edit_world = world.foundation.registry().session(&house).unwrap().world;
    assert_eq!(
        world.foundation.store_mut().save(&[edit_world], &|_| true),
        SaveOutcome::Saved
    );
    assert!(!world.foundation.is_dirty(&house));
    world.calls.clear();
    world.foundation.drain_events();

    assert_eq!(world.foundation.commit(&house, false), Ok(true));

    assert_eq!(world.calls.count(SimCall::is_save_attempt), 0);
    let pending = world.foundation.registry().pending();
    assert_eq!(pending.load_request(east), Some(true));
    assert_eq!(pending.load_request(west), Some(true));
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditCommitted {
        path: house,
        changes_applied: true
    }));
}

/// A clean commit only restores the node that opened the session
#[test]
fn test_clean_commit_reloads_owner_only() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());

    assert_eq!(world.foundation.commit_node(east), Ok(false));
    let pending = world.foundation.registry().pending();
    assert_eq!(pending.load_request(east), Some(true));
    assert_eq!(pending.load_request(west), None);
    assert_eq!(world.calls.count(SimCall::is_save_attempt), 0);
}

/// Discarding never reaches the save flow
#[test]
fn test_discard_drops_changes() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&house);
    world.foundation.drain_events();

    world.foundation.discard(&house).unwrap();

    assert_eq!(world.calls.count(SimCall::is_save_attempt), 0);
    assert_eq!(world.foundation.store().dirty_count(), 0);
    assert_eq!(world.foundation.registry().session_count(), 0);
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditDiscarded { path: house }));

    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.edit_state(east), EditState::Loaded);
}

/// A declined or failed save leaves the session exactly as it was
#[test]
fn test_failed_save_keeps_session() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&house);
    world.calls.clear();

    world.foundation.store_mut().set_save_policy(SavePolicy::Decline);
    let err = world.foundation.commit(&house, false).unwrap_err();
    assert!(matches!(err, FoundationError::SaveDeclinedOrFailed { .. }));

    world
        .foundation
        .store_mut()
        .set_save_policy(SavePolicy::Fail("disk full".into()));
    let err = world.foundation.commit(&house, false).unwrap_err();
    assert!(err.reason().contains("disk full"));

    assert_eq!(world.foundation.edit_state(east), EditState::Editing);
    assert!(world.foundation.is_dirty(&house));
    assert!(world.calls.detaches().is_empty());
    assert_eq!(close_edits(&world), Vec::<ContentPath>::new());

    world.foundation.store_mut().set_save_policy(SavePolicy::Accept);
    assert_eq!(world.foundation.commit(&house, false), Ok(true));
}

#[test]
fn test_commit_without_session() {
    let mut world = loaded(common::ESTATE);
    let shed = path("/Game/Shed");
    assert_eq!(
        world.foundation.commit(&shed, false),
        Err(FoundationError::NotCurrentlyEditing(shed.clone()))
    );
    assert_eq!(
        world.foundation.discard(&shed),
        Err(FoundationError::NotCurrentlyEditing(shed))
    );
}

/// Packages dirtied by another session's content are left for that session
#[test]
fn test_save_scoped_to_session() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let shed = world.root("Shed").unwrap();
    let house_path = path("/Game/House");
    let shed_path = path("/Game/Shed");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.check_out(shed).unwrap(), CheckOut::Opened);
    assert!(world.foundation.block_on_loading());

    let store = world.foundation.store_mut();
    store.touch(&house_path);
    store.touch_package(&house_path, shed_path.clone());
    store.touch(&shed_path);
    world.calls.clear();

    assert_eq!(world.foundation.commit(&house_path, false), Ok(true));

    assert_eq!(
        world.calls.snapshot().first(),
        Some(&SimCall::Save {
            packages: vec![house_path]
        })
    );
    assert!(world.foundation.is_dirty(&shed_path));
    assert_eq!(world.foundation.store().dirty_count(), 1);
    assert_eq!(world.foundation.edit_state(shed), EditState::Editing);
}

/// A checkout requested during streaming waits for the queue to drain
#[test]
fn test_check_out_deferred_while_streaming() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();
    let annex = world.spawn("Annex", Some("/Game/Shed")).unwrap();

    assert_eq!(world.foundation.check_out(east), Ok(CheckOut::Deferred));
    assert_eq!(world.foundation.edit_state(east), EditState::Loaded);
    assert_eq!(
        world.foundation.check_out(west),
        Err(FoundationError::EditAlreadyPending(east))
    );
    assert_eq!(world.foundation.check_out(east), Ok(CheckOut::Deferred));

    world.foundation.tick();

    assert_eq!(world.foundation.edit_state(annex), EditState::Loaded);
    assert_eq!(world.foundation.edit_state(east), EditState::Editing);
}

/// Sessions can open inside an edit world and are tracked on the ancestors
#[test]
fn test_nested_session_inside_edit_world() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west_kitchen = world.find(&["HouseWest", "Kitchen"]).unwrap();
    let house = path("/Game/House");
    let kitchen_path = path("/Game/Kitchen");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    let kitchen = world.find(&["HouseEast", "Kitchen"]).unwrap();
    world.foundation.drain_events();

    assert_eq!(world.foundation.check_out(kitchen).unwrap(), CheckOut::Opened);
    assert!(world.foundation.has_child_edit(east));
    assert!(!world.foundation.has_dirty_descendants(east));
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::ChildEditStarted { node: east }));

    world.foundation.store_mut().touch(&kitchen_path);
    assert!(world.foundation.has_dirty_descendants(east));
    assert!(matches!(
        world.foundation.commit(&house, false),
        Err(FoundationError::AncestorOrDescendantDirty { .. })
    ));

    assert_eq!(world.foundation.commit(&kitchen_path, false), Ok(true));
    assert!(!world.foundation.has_child_edit(east));
    assert_eq!(
        world.foundation.registry().pending().load_request(west_kitchen),
        Some(true)
    );
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::ChildEditCommitted {
        node: east,
        changed: true
    }));

    assert_eq!(world.foundation.commit(&house, false), Ok(false));
    assert_eq!(world.foundation.registry().session_count(), 0);
}

/// Unsaved edits nested in another instance of the package block the
/// commit, and reloads of that instance wait until they are saved
#[test]
fn test_sibling_nested_edits_survive_commit() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west = world.root("HouseWest").unwrap();
    let west_kitchen = world.find(&["HouseWest", "Kitchen"]).unwrap();
    let house = path("/Game/House");
    let kitchen_path = path("/Game/Kitchen");

    assert_eq!(world.foundation.check_out(west_kitchen).unwrap(), CheckOut::Opened);
    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.check_out(east).unwrap(), CheckOut::Opened);
    assert!(world.foundation.block_on_loading());

    world.foundation.store_mut().touch(&kitchen_path);
    world.foundation.store_mut().touch(&house);
    world.calls.clear();

    assert!(matches!(
        world.foundation.commit(&house, false),
        Err(FoundationError::AncestorOrDescendantDirty { .. })
    ));
    assert_eq!(world.calls.count(SimCall::is_save_attempt), 0);
    assert_eq!(world.foundation.edit_state(east), EditState::Editing);
    assert!(world.foundation.is_dirty(&house));
    assert!(world.foundation.is_dirty(&kitchen_path));

    // A forced reload of the sibling is held, never settling the nested session
    world.foundation.store_mut().set_save_policy(SavePolicy::Decline);
    assert!(world.foundation.request_load_or_update(west, true));
    let stats = world.foundation.tick();

    assert_eq!(stats.held, 1);
    assert_eq!(stats.unloaded, 0);
    assert_eq!(world.foundation.edit_state(west), EditState::Loaded);
    assert_eq!(world.foundation.edit_state(west_kitchen), EditState::Editing);
    assert!(world.foundation.is_dirty(&kitchen_path));
    assert_eq!(world.calls.count(SimCall::is_save_attempt), 0);
    assert!(close_edits(&world).is_empty());
    assert_eq!(
        world.foundation.registry().pending().load_request(west),
        Some(true)
    );

    world.foundation.store_mut().set_save_policy(SavePolicy::Accept);
    assert_eq!(world.foundation.commit(&kitchen_path, false), Ok(true));
    let stats = world.foundation.tick();
    assert_eq!(stats.held, 0);
    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.edit_state(west), EditState::Loaded);

    assert_eq!(world.foundation.commit(&house, false), Ok(true));
    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.registry().session_count(), 0);
}

/// Unsaved changes above a node block checking it out
#[test]
fn test_dirty_ancestor_blocks_check_out() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&path("/Game/House"));

    let kitchen = world.find(&["HouseEast", "Kitchen"]).unwrap();
    assert!(matches!(
        world.foundation.check_out(kitchen),
        Err(FoundationError::AncestorOrDescendantDirty { .. })
    ));
    assert_eq!(world.foundation.registry().session_count(), 1);
}

/// Unsaved changes in content nested under a package block checking the
/// package out
#[test]
fn test_dirty_nested_session_blocks_check_out() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let west_kitchen = world.find(&["HouseWest", "Kitchen"]).unwrap();
    let kitchen_path = path("/Game/Kitchen");

    world.foundation.check_out(west_kitchen).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&kitchen_path);

    assert!(matches!(
        world.foundation.can_check_out(east),
        Err(FoundationError::AncestorOrDescendantDirty { .. })
    ));
    assert!(world.foundation.check_out(east).is_err());

    world.foundation.discard(&kitchen_path).unwrap();
    assert!(world.foundation.can_check_out(east).is_ok());
}

/// Clean nested sessions are closed before the session above them
#[test]
fn test_clean_nested_sessions_close_first() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    let kitchen = world.find(&["HouseEast", "Kitchen"]).unwrap();
    world.foundation.check_out(kitchen).unwrap();
    world.calls.clear();

    assert_eq!(world.foundation.commit(&path("/Game/House"), false), Ok(false));

    assert_eq!(close_edits(&world), vec![path("/Game/Kitchen"), path("/Game/House")]);
    assert!(!world.foundation.has_child_edit(east));
    assert_eq!(world.foundation.registry().session_count(), 0);
}

/// Destroying a node mid-edit saves its changes when it can
#[test]
fn test_unregister_settles_session() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    assert!(world.foundation.block_on_loading());
    world.foundation.store_mut().touch(&house);
    world.calls.clear();
    world.foundation.drain_events();

    world.foundation.unregister_node(east);

    assert_eq!(
        world.calls.snapshot().first(),
        Some(&SimCall::Save {
            packages: vec![house.clone()]
        })
    );
    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditCommitted {
        path: house.clone(),
        changes_applied: true
    }));
    assert_eq!(world.foundation.registry().session_count(), 0);
    assert!(world.library.read().world_for(&house).is_none());

    world.foundation.unregister_node(east);
    assert_eq!(world.calls.count(SimCall::is_save_attempt), 1);
}

/// When the save is refused the changes are dropped
#[test]
fn test_unregister_discards_when_save_declined() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let house = path("/Game/House");

    world.foundation.check_out(east).unwrap();
    world.foundation.store_mut().touch(&house);
    world.foundation.store_mut().set_save_policy(SavePolicy::Decline);
    world.foundation.drain_events();

    world.foundation.unregister_node(east);

    let events = world.foundation.drain_events();
    assert!(events.contains(&FoundationEvent::EditDiscarded { path: house.clone() }));
    assert_eq!(world.foundation.registry().session_count(), 0);
    assert_eq!(world.foundation.store().dirty_count(), 0);
    assert!(close_edits(&world).contains(&house));
}

/// Checkout preconditions that do not involve other sessions
#[test]
fn test_check_out_preconditions() {
    let mut world = loaded(common::ESTATE);
    let east = world.root("HouseEast").unwrap();
    let gizmo = world.find(&["HouseEast", "Gizmo"]).unwrap();

    assert_eq!(
        world.foundation.check_out(gizmo),
        Err(FoundationError::NotContentHost(gizmo))
    );
    assert_eq!(
        world.foundation.check_out(NodeId(9_999)),
        Err(FoundationError::UnknownNode(NodeId(9_999)))
    );

    let mirror = world.spawn("Mirror", Some("/Game/Estate")).unwrap();
    assert!(matches!(
        world.foundation.check_out(mirror),
        Err(FoundationError::CycleDetected { .. })
    ));
    assert!(world.foundation.block_on_loading());
    assert_eq!(world.foundation.edit_state(mirror), EditState::Unloaded);

    assert_eq!(world.foundation.check_out(east), Ok(CheckOut::Opened));
    assert_eq!(
        world
            .foundation
            .set_content_ref(east, Some(ContentRef::from("/Game/Shed"))),
        Err(FoundationError::AlreadyEditing(path("/Game/House")))
    );
}

/// Game worlds never open sessions
#[test]
fn test_game_world_cannot_edit() {
    let mut world = build_with(common::ESTATE, FoundationConfig::game());
    assert!(world.foundation.block_on_loading());
    let east = world.root("HouseEast").unwrap();

    assert_eq!(
        world.foundation.check_out(east),
        Err(FoundationError::EditingUnavailable(WorldKind::Game))
    );
    assert_eq!(world.foundation.edit_state(east), EditState::Loaded);
}
