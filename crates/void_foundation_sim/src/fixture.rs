//! TOML fixtures
//!
//! ```toml
//! root_content = "/Game/Main"        # optional
//!
//! [[package]]
//! path = "/Game/House"
//! bounds = { min = [0.0, 0.0, 0.0], max = [10.0, 4.0, 10.0] }
//!
//! [[package.node]]
//! name = "Kitchen"
//! content = "/Game/Kitchen"
//! translation = [2.0, 0.0, 0.0]
//! yaw = 90.0
//!
//! [[root]]
//! name = "House"
//! content = "/Game/House"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glam::{Quat, Vec3};
use serde::Deserialize;
use thiserror::Error;
use void_foundation::{
    Bounds, ContentPath, ContentRef, Foundation, FoundationConfig, FoundationError, NodeId, NodeKind,
    Placement,
};

use crate::calls::CallLog;
use crate::library::{ContentLibrary, NodeTemplate, Package, SharedLibrary};
use crate::scene::SimScene;
use crate::store::SimContentStore;
use crate::transactions::SimTransactionLog;

/// Foundation wired to the simulated collaborators
pub type SimFoundation = Foundation<SimScene, SimContentStore, SimTransactionLog>;

/// Fixture errors
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Foundation error: {0}")]
    Foundation(#[from] FoundationError),
}

/// A node as written in a fixture
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub translation: [f32; 3],
    /// Rotation about +Y, in degrees
    #[serde(default)]
    pub yaw: f32,
}

impl NodeSpec {
    fn placement(&self) -> Placement {
        Placement::new(
            Vec3::from_array(self.translation),
            Quat::from_rotation_y(self.yaw.to_radians()),
        )
    }
}

/// A package as written in a fixture
#[derive(Debug, Clone, Deserialize)]
pub struct PackageSpec {
    pub path: String,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Saved metadata; defaults to `bounds`
    #[serde(default)]
    pub saved_bounds: Option<Bounds>,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeSpec>,
}

/// A whole fixture document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub root_content: Option<String>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
    #[serde(default, rename = "root")]
    pub roots: Vec<NodeSpec>,
}

/// A built fixture
pub struct SimWorld {
    pub foundation: SimFoundation,
    pub library: SharedLibrary,
    pub calls: CallLog,
    pub roots: Vec<(String, NodeId)>,
}

impl Fixture {
    pub fn from_toml_str(source: &str) -> Result<Self, FixtureError> {
        let fixture: Self = toml::from_str(source)?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject duplicate package paths and duplicate node names in one scope
    pub fn validate(&self) -> Result<(), FixtureError> {
        let mut paths = BTreeSet::new();
        for package in &self.packages {
            let path = ContentPath::new(&package.path);
            if path.is_empty() {
                return Err(FixtureError::Validation("package with an empty path".into()));
            }
            if !paths.insert(path) {
                return Err(FixtureError::Validation(format!(
                    "package '{}' is defined twice",
                    package.path
                )));
            }
            unique_names(&package.path, &package.nodes)?;
        }
        unique_names("<root>", &self.roots)
    }

    /// Content library described by the fixture
    pub fn library(&self) -> ContentLibrary {
        let mut library = ContentLibrary::new();
        for spec in &self.packages {
            let path = ContentPath::new(&spec.path);
            let mut package = Package::new(path.clone());
            package.actor_bounds = spec.bounds;
            package.saved_bounds = spec.saved_bounds.or(spec.bounds);
            package.nodes = spec
                .nodes
                .iter()
                .map(|node| {
                    let mut template = NodeTemplate::new(&path, &node.name)
                        .with_kind(node.kind)
                        .with_placement(node.placement());
                    template.content = node.content.as_deref().map(ContentRef::from);
                    template
                })
                .collect();
            library.insert(package);
        }
        library
    }

    /// Build the simulated world and register its root nodes
    pub fn build(&self, config: FoundationConfig) -> Result<SimWorld, FixtureError> {
        let library = self.library().shared();
        let calls = CallLog::new();

        let mut scene = SimScene::new(library.clone(), calls.clone());
        if let Some(root) = &self.root_content {
            scene = scene.with_root_content(root.as_str());
        }
        let store = SimContentStore::new(library.clone(), calls.clone());
        let txlog = SimTransactionLog::new(calls.clone());

        let mut foundation = Foundation::new(config, scene, store, txlog);
        let mut roots = Vec::with_capacity(self.roots.len());
        for spec in &self.roots {
            let (node, desc) =
                foundation
                    .host_mut()
                    .spawn_root(&spec.name, spec.content.as_deref(), spec.placement());
            foundation.register_node(node, desc)?;
            roots.push((spec.name.clone(), node));
        }

        log::info!(
            "Built fixture with {} packages and {} root nodes",
            self.packages.len(),
            roots.len()
        );
        Ok(SimWorld {
            foundation,
            library,
            calls,
            roots,
        })
    }
}

fn unique_names(scope: &str, nodes: &[NodeSpec]) -> Result<(), FixtureError> {
    let mut names = BTreeSet::new();
    for node in nodes {
        if !names.insert(node.name.as_str()) {
            return Err(FixtureError::Validation(format!(
                "node '{}' appears twice in '{}'",
                node.name, scope
            )));
        }
    }
    Ok(())
}

impl SimWorld {
    /// Root node by name
    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .find(|(root_name, _)| root_name == name)
            .map(|(_, node)| *node)
    }

    /// Node reached by following names from a root through live content
    pub fn find(&self, names: &[&str]) -> Option<NodeId> {
        let (first, rest) = names.split_first()?;
        let mut node = self.root(first)?;
        for name in rest {
            node = self.foundation.host().child_named(node, name)?;
        }
        Some(node)
    }

    /// Place another node in the root world and register it
    pub fn spawn(&mut self, name: &str, content: Option<&str>) -> Result<NodeId, FixtureError> {
        let (node, desc) = self
            .foundation
            .host_mut()
            .spawn_root(name, content, Placement::IDENTITY);
        self.foundation.register_node(node, desc)?;
        self.roots.push((name.to_string(), node));
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixture() {
        let fixture = Fixture::from_toml_str(
            r#"
            [[package]]
            path = "/Game/House"
            bounds = { min = [0.0, 0.0, 0.0], max = [4.0, 2.0, 4.0] }

            [[package.node]]
            name = "Kitchen"
            content = "/Game/Kitchen"
            translation = [1.0, 0.0, 0.0]

            [[package]]
            path = "/Game/Kitchen"

            [[root]]
            name = "House"
            content = "/Game/House"
            "#,
        )
        .unwrap();

        assert_eq!(fixture.packages.len(), 2);
        assert_eq!(fixture.packages[0].nodes.len(), 1);
        assert_eq!(fixture.roots[0].kind, NodeKind::ContentHost);

        let library = fixture.library();
        let house = library.get(&ContentPath::new("/Game/House")).unwrap();
        assert_eq!(house.saved_bounds, house.actor_bounds);
        assert_eq!(house.nodes[0].placement.translation, Vec3::X);
    }

    #[test]
    fn test_duplicate_package_rejected() {
        let err = Fixture::from_toml_str(
            r#"
            [[package]]
            path = "/Game/A"

            [[package]]
            path = "/Game/A"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::Validation(_)));
    }

    #[test]
    fn test_duplicate_node_name_rejected() {
        let err = Fixture::from_toml_str(
            r#"
            [[root]]
            name = "A"

            [[root]]
            name = "A"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::Validation(_)));
    }
}
