//! Foundation simulator
//!
//! Loads a fixture, settles streaming and prints the composition tree.
//!
//! Run with: cargo run -p void_foundation_sim -- <fixture.toml> [config.toml]

use std::process::ExitCode;

use void_foundation::{EditState, FoundationConfig, NodeId};
use void_foundation_sim::{Fixture, SimFoundation};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(fixture_path) = args.next() else {
        eprintln!("usage: foundation-sim <fixture.toml> [config.toml]");
        return ExitCode::from(2);
    };

    let config = match args.next() {
        Some(path) => match FoundationConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => FoundationConfig::default(),
    };

    let mut world = match Fixture::load(&fixture_path).and_then(|fixture| fixture.build(config)) {
        Ok(world) => world,
        Err(e) => {
            log::error!("Failed to build fixture {}: {}", fixture_path, e);
            return ExitCode::FAILURE;
        }
    };

    if !world.foundation.block_on_loading() {
        log::warn!("Streaming did not settle");
    }
    for event in world.foundation.drain_events() {
        log::debug!("{:?}", event);
    }

    for (_, root) in &world.roots {
        print_node(&world.foundation, *root, 0);
    }
    ExitCode::SUCCESS
}

fn print_node(foundation: &SimFoundation, node: NodeId, depth: usize) {
    let name = foundation.host().name_of(node).unwrap_or("?");
    let state = match foundation.edit_state(node) {
        EditState::Unloaded => "unloaded",
        EditState::Loaded => "loaded",
        EditState::Editing => "editing",
    };
    let content = foundation
        .registry()
        .node(node)
        .and_then(|record| record.content_path())
        .map(|path| path.to_string())
        .unwrap_or_else(|| "-".into());
    let id = foundation
        .composite_id(node)
        .map(|id| id.to_string())
        .unwrap_or_else(|| "deferred".into());
    let bounds = foundation
        .get_bounds(node)
        .map(|b| format!("[{:.1} {:.1} {:.1}]..[{:.1} {:.1} {:.1}]", b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z))
        .unwrap_or_else(|| "no bounds".into());

    println!(
        "{:indent$}{} {} ({}) {} {}",
        "",
        name,
        content,
        state,
        id,
        bounds,
        indent = depth * 2
    );

    foundation.for_each_descendant(node, false, |child| {
        print_node(foundation, child, depth + 1);
        true
    });
}
