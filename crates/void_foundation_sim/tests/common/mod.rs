//! Shared fixtures for the integration tests

#![allow(dead_code)]

use void_foundation::{ContentPath, FoundationConfig, FoundationEvent, NodeId};
use void_foundation_sim::{Fixture, SimWorld};

/// Two houses sharing one package, each with a nested kitchen and pantry,
/// plus an unrelated shed
pub const ESTATE: &str = r#"
root_content = "/Game/Estate"

[[package]]
path = "/Game/Estate"

[[package]]
path = "/Game/House"
bounds = { min = [0.0, 0.0, 0.0], max = [12.0, 6.0, 10.0] }

[[package.node]]
name = "Kitchen"
content = "/Game/Kitchen"
translation = [2.0, 0.0, 1.0]

[[package.node]]
name = "Gizmo"
kind = "transform_proxy"

[[package]]
path = "/Game/Kitchen"
bounds = { min = [0.0, 0.0, 0.0], max = [4.0, 3.0, 4.0] }

[[package.node]]
name = "Pantry"
content = "/Game/Pantry"
translation = [3.0, 0.0, 0.0]

[[package]]
path = "/Game/Pantry"
bounds = { min = [0.0, 0.0, 0.0], max = [1.0, 2.0, 1.0] }

[[package]]
path = "/Game/Shed"
bounds = { min = [-1.0, 0.0, -1.0], max = [1.0, 2.5, 1.0] }

[[root]]
name = "HouseEast"
content = "/Game/House"
translation = [40.0, 0.0, 0.0]

[[root]]
name = "HouseWest"
content = "/Game/House"
translation = [-40.0, 0.0, 0.0]

[[root]]
name = "Shed"
content = "/Game/Shed"
translation = [0.0, 0.0, 25.0]
"#;

/// Three levels: Top -> Mid -> Leaf
pub const NESTED: &str = r#"
[[package]]
path = "/Game/L1"

[[package.node]]
name = "Mid"
content = "/Game/L2"

[[package]]
path = "/Game/L2"

[[package.node]]
name = "Leaf"
content = "/Game/L3"

[[package]]
path = "/Game/L3"

[[root]]
name = "Top"
content = "/Game/L1"
"#;

pub fn build(source: &str) -> SimWorld {
    build_with(source, FoundationConfig::default())
}

pub fn build_with(source: &str, config: FoundationConfig) -> SimWorld {
    Fixture::from_toml_str(source)
        .expect("fixture parses")
        .build(config)
        .expect("fixture builds")
}

/// Build and settle streaming
pub fn loaded(source: &str) -> SimWorld {
    let mut world = build(source);
    assert!(world.foundation.block_on_loading());
    world
}

pub fn path(p: &str) -> ContentPath {
    ContentPath::new(p)
}

pub fn unloaded_nodes(events: &[FoundationEvent]) -> Vec<NodeId> {
    events
        .iter()
        .filter_map(|event| match event {
            FoundationEvent::Unloaded { node, .. } => Some(*node),
            _ => None,
        })
        .collect()
}
