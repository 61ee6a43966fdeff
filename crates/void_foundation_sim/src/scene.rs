//! In-memory host scene
//!
//! Containers are instantiated from library packages: attaching content
//! creates one scene node per node template, parented to the new container.
//! Detaching a container removes it with every node and container below it.

use std::collections::BTreeMap;

use void_foundation::{
    Attachment, Bounds, ContainerId, ContentPath, ContentRef, HostScene, NodeDesc, NodeId, Placement,
};

use crate::calls::{CallLog, SimCall};
use crate::library::{stable_id_for, SharedLibrary};

#[derive(Clone, Debug)]
struct SceneNode {
    name: String,
    desc: NodeDesc,
    parent: Option<ContainerId>,
}

#[derive(Clone, Debug)]
struct SceneContainer {
    owner: NodeId,
    content: ContentPath,
    editable: bool,
    placement: Placement,
    children: Vec<NodeId>,
}

/// Host scene backed by a [`ContentLibrary`](crate::ContentLibrary)
pub struct SimScene {
    library: SharedLibrary,
    calls: CallLog,
    root_content: Option<ContentPath>,
    nodes: BTreeMap<NodeId, SceneNode>,
    containers: BTreeMap<ContainerId, SceneContainer>,
    next_node: u64,
    next_container: u64,
}

impl SimScene {
    pub fn new(library: SharedLibrary, calls: CallLog) -> Self {
        Self {
            library,
            calls,
            root_content: None,
            nodes: BTreeMap::new(),
            containers: BTreeMap::new(),
            next_node: 0,
            next_container: 0,
        }
    }

    /// Set the root world's own content
    pub fn with_root_content(mut self, path: impl Into<ContentPath>) -> Self {
        self.root_content = Some(path.into());
        self
    }

    /// Place a node in the root world; returns what to register
    pub fn spawn_root(&mut self, name: &str, content: Option<&str>, placement: Placement) -> (NodeId, NodeDesc) {
        let desc = NodeDesc::host(stable_id_for("<root>", name), content.map(ContentRef::from))
            .with_placement(placement);
        let id = self.insert_node(name, desc.clone(), None);
        (id, desc)
    }

    /// Remove a root-world node (and anything it still holds)
    pub fn despawn(&mut self, node: NodeId) {
        let owned: Vec<ContainerId> = self
            .containers
            .iter()
            .filter(|(_, container)| container.owner == node)
            .map(|(id, _)| *id)
            .collect();
        for container in owned {
            self.remove_container(container);
        }
        self.nodes.remove(&node);
    }

    fn insert_node(&mut self, name: &str, desc: NodeDesc, parent: Option<ContainerId>) -> NodeId {
        self.next_node += 1;
        let id = NodeId(self.next_node);
        self.nodes.insert(
            id,
            SceneNode {
                name: name.to_string(),
                desc,
                parent,
            },
        );
        id
    }

    fn remove_container(&mut self, container: ContainerId) {
        let Some(removed) = self.containers.remove(&container) else {
            return;
        };
        for child in removed.children {
            self.despawn(child);
        }
    }

    /// Live container owned by a node
    pub fn container_of(&self, node: NodeId) -> Option<ContainerId> {
        self.containers
            .iter()
            .find(|(_, container)| container.owner == node)
            .map(|(id, _)| *id)
    }

    pub fn is_editable(&self, container: ContainerId) -> bool {
        self.containers
            .get(&container)
            .is_some_and(|container| container.editable)
    }

    pub fn container_content(&self, container: ContainerId) -> Option<&ContentPath> {
        self.containers.get(&container).map(|container| &container.content)
    }

    pub fn container_placement(&self, container: ContainerId) -> Option<Placement> {
        self.containers.get(&container).map(|container| container.placement)
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn name_of(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|node| node.name.as_str())
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Node named `name` inside `owner`'s live content
    pub fn child_named(&self, owner: NodeId, name: &str) -> Option<NodeId> {
        let container = self.containers.get(&self.container_of(owner)?)?;
        container
            .children
            .iter()
            .copied()
            .find(|child| self.name_of(*child) == Some(name))
    }

    /// Nodes inside `owner`'s live content
    pub fn children_of(&self, owner: NodeId) -> Vec<NodeId> {
        self.container_of(owner)
            .and_then(|container| self.containers.get(&container))
            .map(|container| container.children.clone())
            .unwrap_or_default()
    }

    /// Root-world nodes in creation order
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }
}

impl HostScene for SimScene {
    fn ancestor_of(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(&node)?.parent?;
        self.containers.get(&parent).map(|container| container.owner)
    }

    fn root_content(&self) -> Option<ContentPath> {
        self.root_content.clone()
    }

    fn attach(&mut self, owner: NodeId, attachment: Attachment) -> Option<ContainerId> {
        if !self.nodes.contains_key(&owner) {
            return None;
        }
        let (content, editable) = {
            let library = self.library.read();
            match attachment {
                Attachment::Streamed(handle) => (library.path_of_handle(handle)?.clone(), false),
                Attachment::Editable(world) => (library.world_path(world)?.clone(), true),
            }
        };
        let templates = self.library.read().get(&content)?.nodes.clone();

        self.next_container += 1;
        let container = ContainerId(self.next_container);
        let children = templates
            .into_iter()
            .map(|template| {
                let desc = NodeDesc {
                    stable_id: template.stable_id,
                    kind: template.kind,
                    content: template.content,
                    placement: template.placement,
                };
                self.insert_node(&template.name, desc, Some(container))
            })
            .collect();
        self.containers.insert(
            container,
            SceneContainer {
                owner,
                content: content.clone(),
                editable,
                placement: Placement::IDENTITY,
                children,
            },
        );

        self.calls.push(SimCall::Attach {
            owner,
            container,
            content,
            editable,
        });
        Some(container)
    }

    fn detach(&mut self, containers: &[ContainerId]) {
        self.calls.push(SimCall::Detach {
            containers: containers.to_vec(),
        });
        for container in containers {
            self.remove_container(*container);
        }
    }

    fn for_each_child_node(&self, container: ContainerId, f: &mut dyn FnMut(NodeId, &NodeDesc)) {
        let Some(container) = self.containers.get(&container) else {
            return;
        };
        for child in &container.children {
            if let Some(node) = self.nodes.get(child) {
                f(*child, &node.desc);
            }
        }
    }

    fn container_bounds(&self, container: ContainerId) -> Option<Bounds> {
        let live = self.containers.get(&container)?;
        let mut local = self
            .library
            .read()
            .get(&live.content)
            .and_then(|package| package.actor_bounds);

        for child in &live.children {
            let nested = self
                .container_of(*child)
                .and_then(|nested| self.container_bounds(nested));
            local = match (local, nested) {
                (Some(a), Some(b)) => Some(a.union(&b)),
                (a, b) => a.or(b),
            };
        }

        local.map(|bounds| bounds.transformed(&live.placement))
    }

    fn place_container(&mut self, container: ContainerId, placement: &Placement) {
        if let Some(live) = self.containers.get_mut(&container) {
            live.placement = *placement;
        }
    }
}
