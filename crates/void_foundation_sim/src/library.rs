//! In-memory content packages
//!
//! The library is the backing data shared by [`SimScene`](crate::SimScene)
//! and [`SimContentStore`](crate::SimContentStore): package contents, the
//! handles issued for them and the writable worlds currently open.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use void_foundation::{
    Bounds, ContentHandle, ContentPath, ContentRef, NodeKind, Placement, StableId, WritableHandle,
};

/// Library shared between collaborators
pub type SharedLibrary = Arc<RwLock<ContentLibrary>>;

/// A node stored inside a package
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTemplate {
    pub name: String,
    pub stable_id: StableId,
    pub kind: NodeKind,
    pub content: Option<ContentRef>,
    pub placement: Placement,
}

impl NodeTemplate {
    /// Template whose stable id is derived from where it is stored, so every
    /// load of the package yields the same id
    pub fn new(package: &ContentPath, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            stable_id: stable_id_for(package.as_str(), &name),
            name,
            kind: NodeKind::ContentHost,
            content: None,
            placement: Placement::IDENTITY,
        }
    }

    pub fn with_content(mut self, content: impl Into<ContentPath>) -> Self {
        self.content = Some(ContentRef::new(content));
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Deterministic stable id for a named node inside a scope
pub fn stable_id_for(scope: &str, name: &str) -> StableId {
    let high = fnv1a(scope.as_bytes(), 0xcbf29ce484222325);
    let low = fnv1a(name.as_bytes(), high);
    StableId::from_u128(((high as u128) << 64) | low as u128)
}

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// A content package
#[derive(Clone, Debug)]
pub struct Package {
    pub path: ContentPath,
    pub nodes: Vec<NodeTemplate>,
    /// Local bounds of the package's own actors
    pub actor_bounds: Option<Bounds>,
    /// Bounds metadata written at the last save
    pub saved_bounds: Option<Bounds>,
}

impl Package {
    pub fn new(path: impl Into<ContentPath>) -> Self {
        Self {
            path: path.into(),
            nodes: Vec::new(),
            actor_bounds: None,
            saved_bounds: None,
        }
    }

    /// Set live bounds and the saved snapshot together
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.actor_bounds = Some(bounds);
        self.saved_bounds = Some(bounds);
        self
    }

    /// Add a node stored in this package
    pub fn with_node(mut self, name: &str, build: impl FnOnce(NodeTemplate) -> NodeTemplate) -> Self {
        let template = build(NodeTemplate::new(&self.path, name));
        self.nodes.push(template);
        self
    }
}

/// Every package known to the simulation
#[derive(Default)]
pub struct ContentLibrary {
    packages: BTreeMap<ContentPath, Package>,
    handles: Vec<ContentPath>,
    worlds: BTreeMap<WritableHandle, ContentPath>,
    next_world: u64,
}

impl ContentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedLibrary {
        Arc::new(RwLock::new(self))
    }

    pub fn insert(&mut self, package: Package) {
        self.packages.insert(package.path.clone(), package);
    }

    pub fn get(&self, path: &ContentPath) -> Option<&Package> {
        self.packages.get(path)
    }

    pub fn get_mut(&mut self, path: &ContentPath) -> Option<&mut Package> {
        self.packages.get_mut(path)
    }

    pub fn contains(&self, path: &ContentPath) -> bool {
        self.packages.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &ContentPath> {
        self.packages.keys()
    }

    /// Content referenced by nodes stored in a package
    pub fn nested_content(&self, path: &ContentPath) -> Vec<ContentPath> {
        self.packages
            .get(path)
            .map(|package| {
                package
                    .nodes
                    .iter()
                    .filter_map(|node| node.content.as_ref())
                    .filter(|content| content.is_valid())
                    .map(|content| content.path().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read-only handle for a package, issued once per path
    pub fn handle_for(&mut self, path: &ContentPath) -> Option<ContentHandle> {
        if !self.contains(path) {
            return None;
        }
        let index = match self.handles.iter().position(|known| known == path) {
            Some(index) => index,
            None => {
                self.handles.push(path.clone());
                self.handles.len() - 1
            }
        };
        Some(ContentHandle(index as u64))
    }

    pub fn path_of_handle(&self, handle: ContentHandle) -> Option<&ContentPath> {
        self.handles.get(handle.0 as usize)
    }

    pub fn open_world(&mut self, path: &ContentPath) -> Option<WritableHandle> {
        if !self.contains(path) {
            return None;
        }
        self.next_world += 1;
        let world = WritableHandle(self.next_world);
        self.worlds.insert(world, path.clone());
        Some(world)
    }

    pub fn close_world(&mut self, world: WritableHandle) -> Option<ContentPath> {
        self.worlds.remove(&world)
    }

    pub fn world_path(&self, world: WritableHandle) -> Option<&ContentPath> {
        self.worlds.get(&world)
    }

    /// Open world editing `path`
    pub fn world_for(&self, path: &ContentPath) -> Option<WritableHandle> {
        self.worlds
            .iter()
            .find(|(_, world_path)| *world_path == path)
            .map(|(world, _)| *world)
    }

    /// Record the current actor bounds as the package's saved metadata
    pub fn mark_saved(&mut self, path: &ContentPath) {
        if let Some(package) = self.packages.get_mut(path) {
            package.saved_bounds = package.actor_bounds;
        }
    }
}
