//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in an index arena owned by [`SceneGraph`]. Node 0 is the scene
//! root; everything reachable from it is drawn. Nodes spawned without a parent
//! form detached subtrees (e.g. a loaded model used as a repository of pieces)
//! that can be cloned and attached later.

use std::{collections::HashMap, sync::Arc};

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, SquareMatrix, Transform, Vector3};
use log::warn;

use crate::{
    audio::PositionalAudio,
    data_structures::{
        geometry::{Geometry, LineSegments},
        instance::Instance,
        light::Light,
        material::Material,
        skin::{ModelSkin, Skin},
    },
    pick::{Aabb, Hit, Ray},
    resources::animation::AnimationClip,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// One drawable piece of a mesh: shared geometry plus its own material.
#[derive(Clone, Debug)]
pub struct Primitive {
    pub geometry: Arc<Geometry>,
    pub material: Material,
}

impl Primitive {
    pub fn new(geometry: Geometry, material: Material) -> Self {
        Self {
            geometry: Arc::new(geometry),
            material,
        }
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    /// A transform-only node other nodes orbit around.
    Pivot,
    Mesh(Vec<Primitive>),
    Lines(LineSegments),
    Light(Light),
    Audio(PositionalAudio),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub transform: Instance,
    pub visible: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Skeleton deforming this node's skinned primitives.
    pub skin: Option<Skin>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            transform: Instance::default(),
            visible: true,
            cast_shadow: false,
            receive_shadow: false,
            skin: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn pivot(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Pivot)
    }

    pub fn mesh(name: impl Into<String>, geometry: Geometry, material: Material) -> Self {
        Self::new(name, NodeKind::Mesh(vec![Primitive::new(geometry, material)]))
    }

    pub fn lines(name: impl Into<String>, lines: LineSegments) -> Self {
        Self::new(name, NodeKind::Lines(lines))
    }

    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::new(name, NodeKind::Light(light))
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.transform.position = Vector3::new(x, y, z);
        self
    }

    pub fn with_transform(mut self, transform: Instance) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_skin(mut self, skin: Skin) -> Self {
        self.skin = Some(skin);
        self
    }

    pub fn with_shadows(mut self, cast: bool, receive: bool) -> Self {
        self.cast_shadow = cast;
        self.receive_shadow = receive;
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn light_ref(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn light_mut(&mut self) -> Option<&mut Light> {
        match &mut self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn audio_mut(&mut self) -> Option<&mut PositionalAudio> {
        match &mut self.kind {
            NodeKind::Audio(audio) => Some(audio),
            _ => None,
        }
    }

    pub fn primitives_mut(&mut self) -> Option<&mut Vec<Primitive>> {
        match &mut self.kind {
            NodeKind::Mesh(primitives) => Some(primitives),
            _ => None,
        }
    }
}

/// A node hierarchy as decoded from a model file, not yet part of any scene.
#[derive(Clone, Debug, Default)]
pub struct ModelScene {
    pub name: String,
    pub nodes: Vec<ModelNode>,
    /// Indices into `nodes` without a parent.
    pub roots: Vec<usize>,
    pub clips: Vec<AnimationClip>,
    pub skins: Vec<ModelSkin>,
}

#[derive(Clone, Debug, Default)]
pub struct ModelNode {
    pub name: String,
    pub transform: Instance,
    pub primitives: Vec<Primitive>,
    pub children: Vec<usize>,
    /// Index into [`ModelScene::skins`].
    pub skin: Option<usize>,
}

/// Result of [`SceneGraph::instantiate`]: the detached group holding the
/// model plus the scene node created for every model node, by model index.
#[derive(Clone, Debug)]
pub struct Instantiated {
    pub root: NodeId,
    pub nodes: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct SceneGraph {
    nodes: Vec<Option<Node>>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::group("Scene"))],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().map(|n| (NodeId(i), n)))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Inserts a node without a parent.
    pub fn spawn(&mut self, mut node: Node) -> NodeId {
        node.parent = None;
        node.children.clear();
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    /// Inserts a node under `parent`. A missing parent leaves it detached.
    pub fn add(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.spawn(node);
        self.attach(parent, id);
        id
    }

    /// Moves `child` (and its subtree) under `parent`.
    ///
    /// Refuses to move the root, to attach to missing nodes or to create a cycle.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> bool {
        if child == NodeId::ROOT || !self.contains(parent) || !self.contains(child) {
            warn!("cannot attach {:?} to {:?}", child, parent);
            return false;
        }
        if self.is_ancestor(child, parent) {
            warn!("attaching {:?} to {:?} would create a cycle", child, parent);
            return false;
        }
        self.detach(child);
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
        true
    }

    /// Unlinks a node from its parent, keeping it and its subtree alive.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.get_mut(parent) {
            node.children.retain(|c| *c != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
    }

    /// Removes a node and its whole subtree. Returns how many nodes were freed.
    pub fn remove(&mut self, id: NodeId) -> usize {
        if id == NodeId::ROOT || !self.contains(id) {
            return 0;
        }
        self.detach(id);
        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    /// Whether `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Whether the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_ancestor(NodeId::ROOT, id)
    }

    /// Depth-first search for a name, starting at (and including) `from`.
    pub fn find_by_name(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = self.get(id)?;
            if node.name == name {
                return Some(id);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.find_by_name(NodeId::ROOT, name)
    }

    /// Deep copy of a subtree as a new detached subtree. Geometry is shared.
    ///
    /// Skins whose joints lie inside the subtree are rebound to the copied joints.
    pub fn clone_subtree(&mut self, id: NodeId) -> Option<NodeId> {
        let mut copies = HashMap::new();
        let copy = self.clone_nodes(id, &mut copies)?;
        for new in copies.values() {
            let Some(skin) = self.get_mut(*new).and_then(|n| n.skin.as_mut()) else {
                continue;
            };
            for joint in skin.joints.iter_mut() {
                if let Some(copied) = copies.get(joint) {
                    *joint = *copied;
                }
            }
        }
        Some(copy)
    }

    fn clone_nodes(&mut self, id: NodeId, copies: &mut HashMap<NodeId, NodeId>) -> Option<NodeId> {
        let node = self.get(id)?.clone();
        let children = node.children.clone();
        let copy = self.spawn(node);
        copies.insert(id, copy);
        for child in children {
            if let Some(child_copy) = self.clone_nodes(child, copies) {
                self.attach(copy, child_copy);
            }
        }
        Some(copy)
    }

    pub fn world_matrix(&self, id: NodeId) -> Matrix4<f32> {
        let mut matrix = Matrix4::identity();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.get(c)) {
            matrix = node.transform.to_matrix() * matrix;
            current = node.parent;
        }
        matrix
    }

    pub fn world_position(&self, id: NodeId) -> Point3<f32> {
        self.world_matrix(id).transform_point(Point3::origin())
    }

    /// Local +Z of the node expressed in world space.
    pub fn world_direction(&self, id: NodeId) -> Vector3<f32> {
        let direction = self.world_matrix(id).transform_vector(Vector3::unit_z());
        if direction.magnitude2() > f32::EPSILON {
            direction.normalize()
        } else {
            Vector3::unit_z()
        }
    }

    /// World space bounds of every mesh and line set in the subtree.
    pub fn world_bounding_box(&self, id: NodeId) -> Aabb {
        let mut bounds = Aabb::empty();
        let mut stack = vec![(id, self.parent_matrix(id))];
        while let Some((next, parent_world)) = stack.pop() {
            let Some(node) = self.get(next) else {
                continue;
            };
            let world = parent_world * node.transform.to_matrix();
            match &node.kind {
                NodeKind::Mesh(primitives) => {
                    for primitive in primitives {
                        bounds = bounds.union(&primitive.geometry.bounding_box().transform(&world));
                    }
                }
                NodeKind::Lines(lines) => {
                    bounds = bounds.union(&lines.bounding_box().transform(&world));
                }
                _ => (),
            }
            stack.extend(node.children.iter().map(|c| (*c, world)));
        }
        bounds
    }

    fn parent_matrix(&self, id: NodeId) -> Matrix4<f32> {
        self.parent(id)
            .map_or_else(Matrix4::identity, |p| self.world_matrix(p))
    }

    /// Visible nodes reachable from the root with their world matrices, parents first.
    pub fn visible_nodes(&self) -> Vec<(NodeId, Matrix4<f32>)> {
        let mut out = Vec::new();
        let mut stack = vec![(NodeId::ROOT, Matrix4::identity())];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.to_matrix();
            out.push((id, world));
            stack.extend(node.children.iter().rev().map(|c| (*c, world)));
        }
        out
    }

    /// Intersects the ray with every visible mesh under `roots`, nearest hit first.
    pub fn raycast(&self, ray: &Ray, roots: &[NodeId]) -> Vec<Hit> {
        let mut hits = Vec::new();
        let mut stack: Vec<(NodeId, Matrix4<f32>)> = roots
            .iter()
            .map(|r| (*r, self.parent_matrix(*r)))
            .collect();
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = parent_world * node.transform.to_matrix();
            if let NodeKind::Mesh(primitives) = &node.kind {
                let nearest = primitives
                    .iter()
                    .filter_map(|p| intersect_geometry(ray, &p.geometry, &world))
                    .min_by(|a, b| a.total_cmp(b));
                if let Some(distance) = nearest {
                    hits.push(Hit {
                        node: id,
                        distance,
                        point: ray.point_at(distance),
                    });
                }
            }
            stack.extend(node.children.iter().map(|c| (*c, world)));
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Copies a decoded model into the arena as a detached group.
    pub fn instantiate(&mut self, model: &ModelScene) -> Instantiated {
        let root = self.spawn(Node::group(model.name.clone()));
        let nodes: Vec<NodeId> = model
            .nodes
            .iter()
            .map(|m| {
                let kind = if m.primitives.is_empty() {
                    NodeKind::Group
                } else {
                    NodeKind::Mesh(m.primitives.clone())
                };
                self.spawn(Node::new(m.name.clone(), kind).with_transform(m.transform))
            })
            .collect();
        for (index, model_node) in model.nodes.iter().enumerate() {
            for child in &model_node.children {
                if let Some(child) = nodes.get(*child) {
                    self.attach(nodes[index], *child);
                }
            }
            let skin = model_node.skin.and_then(|skin| model.skins.get(skin));
            if let (Some(skin), Some(node)) = (skin, self.get_mut(nodes[index])) {
                node.skin = Some(Skin::new(
                    skin.joints.iter().filter_map(|joint| nodes.get(*joint).copied()).collect(),
                    skin.inverse_bind_matrices.clone(),
                ));
            }
        }
        for index in &model.roots {
            if let Some(node) = nodes.get(*index) {
                self.attach(root, *node);
            }
        }
        Instantiated { root, nodes }
    }
}

fn intersect_geometry(ray: &Ray, geometry: &Geometry, world: &Matrix4<f32>) -> Option<f32> {
    geometry
        .bounding_box()
        .transform(world)
        .intersect_ray(ray)?;
    geometry
        .triangles()
        .filter_map(|[a, b, c]| {
            ray.intersect_triangle(
                world.transform_point(a),
                world.transform_point(b),
                world.transform_point(c),
            )
        })
        .min_by(|a, b| a.total_cmp(b))
}
