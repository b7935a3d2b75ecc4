use datablock_types::{EntityId, IdKind, LibraryId, unique_name};
use serde::{Deserialize, Serialize};

use crate::value::PropertyBag;

/// Tree type of the compositing tree embedded in scenes.
pub const COMPOSITOR_TREE_TYPE: &str = "CompositorNodeTree";

/// How a linked entity entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTag {
    /// Explicitly requested from its library.
    Direct,
    /// Pulled in because a linked entity references or owns it.
    Indirect,
}

/// A uniquely named, referenceable unit of data.
///
/// `users` counts live references (from properties, collection elements and
/// node custom data) plus runtime pins; it is recomputed on load and never
/// persisted. Scene membership is ownership and does not count as a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: IdKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_tag: Option<LinkTag>,
    #[serde(skip)]
    pub users: u32,
    #[serde(skip)]
    pub pins: u32,
    #[serde(default)]
    pub properties: PropertyBag,
    pub data: EntityData,
}

impl Entity {
    /// A fresh local entity with empty payload for `kind`.
    #[must_use]
    pub fn new(kind: IdKind, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            name: name.into(),
            library: None,
            link_tag: None,
            users: 0,
            pins: 0,
            properties: PropertyBag::new(),
            data: EntityData::empty(kind),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.library.is_some()
    }

    /// A local, unreferenced copy under a new id and name.
    ///
    /// Properties and payload are deep-copied; references inside them still
    /// point at the original targets.
    #[must_use]
    pub fn detached_copy(&self, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            kind: self.kind,
            name: name.into(),
            library: None,
            link_tag: None,
            users: 0,
            pins: 0,
            properties: self.properties.clone(),
            data: self.data.clone(),
        }
    }

    /// The node tree of a node-tree entity or the embedded tree of a scene.
    pub fn node_tree(&self) -> Option<&NodeTree> {
        match &self.data {
            EntityData::NodeTree(tree) => Some(tree),
            EntityData::Scene(scene) => scene.node_tree.as_ref(),
            _ => None,
        }
    }

    pub fn node_tree_mut(&mut self) -> Option<&mut NodeTree> {
        match &mut self.data {
            EntityData::NodeTree(tree) => Some(tree),
            EntityData::Scene(scene) => scene.node_tree.as_mut(),
            _ => None,
        }
    }

    pub fn scene(&self) -> Option<&SceneData> {
        match &self.data {
            EntityData::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    pub fn scene_mut(&mut self) -> Option<&mut SceneData> {
        match &mut self.data {
            EntityData::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    /// Objects owned through scene membership; empty for non-scenes.
    pub fn owned_objects(&self) -> &[EntityId] {
        self.scene().map(|s| s.objects.as_slice()).unwrap_or(&[])
    }

    /// Every counted outgoing reference, one entry per reference.
    pub fn references(&self) -> Vec<EntityId> {
        let mut out = Vec::new();
        self.properties.collect_references(&mut out);
        if let Some(tree) = self.node_tree() {
            tree.collect_references(&mut out);
        }
        out
    }

    /// Rewrites every counted reference. Membership is left untouched.
    pub fn remap_references(&mut self, f: &mut dyn FnMut(EntityId) -> EntityId) {
        self.properties.remap_references(f);
        if let Some(tree) = self.node_tree_mut() {
            tree.remap_references(f);
        }
    }

    /// Rewrites scene membership.
    pub fn remap_owned(&mut self, f: &mut dyn FnMut(EntityId) -> EntityId) {
        if let Some(scene) = self.scene_mut() {
            for id in &mut scene.objects {
                *id = f(*id);
            }
        }
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityData {
    Object,
    Scene(SceneData),
    NodeTree(NodeTree),
    Action(ActionData),
    Material,
}

impl EntityData {
    /// The default payload for a freshly created entity of `kind`.
    pub fn empty(kind: IdKind) -> Self {
        match kind {
            IdKind::Object => Self::Object,
            IdKind::Scene => Self::Scene(SceneData::default()),
            IdKind::NodeTree => Self::NodeTree(NodeTree::new("NodeTree")),
            IdKind::Action => Self::Action(ActionData::default()),
            IdKind::Material => Self::Material,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    /// Scene collection membership.
    #[serde(default)]
    pub objects: Vec<EntityId>,
    #[serde(default)]
    pub use_nodes: bool,
    /// Embedded compositing tree, owned by the scene.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_tree: Option<NodeTree>,
}

/// Restricts which kinds of entity an action may animate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_root: Option<IdKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTree {
    pub tree_type: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl NodeTree {
    #[must_use]
    pub fn new(tree_type: impl Into<String>) -> Self {
        Self {
            tree_type: tree_type.into(),
            nodes: Vec::new(),
        }
    }

    /// The tree a scene gets when it starts using nodes.
    #[must_use]
    pub fn compositor_default() -> Self {
        let mut tree = Self::new(COMPOSITOR_TREE_TYPE);
        tree.nodes.push(Node::new("Render Layers", "CompositorNodeRLayers"));
        tree.nodes.push(Node::new("Composite", "CompositorNodeComposite"));
        tree
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    /// Adds a node, disambiguating its name within the tree.
    pub fn add_node(&mut self, node_type: &str, name: &str, max_len: usize) -> String {
        let name = unique_name(name, max_len, |n| self.node(n).is_some());
        self.nodes.push(Node::new(name.clone(), node_type));
        name
    }

    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        let index = self.nodes.iter().position(|n| n.name == name)?;
        Some(self.nodes.remove(index))
    }

    pub fn collect_references(&self, out: &mut Vec<EntityId>) {
        for node in &self.nodes {
            node.properties.collect_references(out);
        }
    }

    pub fn remap_references(&mut self, f: &mut dyn FnMut(EntityId) -> EntityId) {
        for node in &mut self.nodes {
            node.properties.remap_references(f);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub node_type: String,
    #[serde(default)]
    pub properties: PropertyBag,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            properties: PropertyBag::new(),
        }
    }
}
