use crate::rendering::native::NodeHandle;
use crate::scene::expression::Expression;
use crate::scene::path::ScenePath;
use crate::scene::virtual_path::VirtualPath;
use crate::translator::attributes::NameToAttribute;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::{DashMap, DashSet};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

mod assignments;
mod attributes;

/// The only render layer there is.
pub const DEFAULT_RENDER_LAYER: &str = "defaultRenderLayer";
pub const SHADER_TARGET: &str = "shader";
pub const SURFACE_TARGET: &str = "surface";
pub const DISPLACEMENT_TARGET: &str = "displacement";
pub const ATTRIBUTE_TARGET: &str = "attribute";
const MATERIALS_ROOT: &str = "/materials";

/// (render layer, target)
pub type AssignmentKey = (String, String);

/// Children of one parent, keeping the order they have been registered in.
#[derive(Debug, Default, Clone)]
pub struct ChildSet {
    order: Vec<ScenePath>,
    members: HashSet<ScenePath>,
}

impl ChildSet {
    /// Returns false if `path` was already a member.
    pub fn insert(&mut self, path: ScenePath) -> bool {
        if !self.members.insert(path.clone()) {
            return false;
        }

        self.order.push(path);
        true
    }

    pub fn contains(&self, path: &ScenePath) -> bool {
        self.members.contains(path)
    }

    pub fn get(&self, index: usize) -> Option<&ScenePath> {
        self.order.get(index)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenePath> {
        self.order.iter()
    }
}

/// Everything learned about a scene while expanding it: which objects get rendered below which
/// path, the native nodes created for them and how shaders and attributes are assigned.
/// All tables can be read and extended concurrently, nothing is ever removed.
pub struct RendererIndex {
    hierarchy: DashMap<ScenePath, ChildSet>,
    processed: DashSet<ScenePath>,
    num_nodes: DashMap<ScenePath, usize>,
    render_nodes: DashMap<ScenePath, Option<NodeHandle>>,
    assignments: DashMap<AssignmentKey, BTreeMap<Expression, ScenePath>>,
    materials: DashMap<ScenePath, HashMap<String, ScenePath>>,
    attributes: DashMap<ScenePath, NameToAttribute>,
    merged_attributes: DashMap<VirtualPath, Arc<NameToAttribute>>,
    prefixes: DashMap<String, String>,
    assignment_done: AtomicBool,
    override_lookups: AtomicUsize,
}

impl RendererIndex {
    pub fn new() -> Self {
        Self {
            hierarchy: DashMap::with_capacity(100),
            processed: DashSet::with_capacity(100),
            num_nodes: DashMap::new(),
            render_nodes: DashMap::with_capacity(100),
            assignments: DashMap::new(),
            materials: DashMap::new(),
            attributes: DashMap::new(),
            merged_attributes: DashMap::with_capacity(100),
            prefixes: DashMap::new(),
            assignment_done: AtomicBool::new(false),
            override_lookups: AtomicUsize::new(0),
        }
    }

    /// Registers `child` to be rendered below `parent`. Inserting the same edge again has no effect.
    pub fn insert_prim(&self, parent: &ScenePath, child: &ScenePath) {
        self.processed.insert(child.clone());
        self.hierarchy
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
    }

    pub fn is_processed(&self, path: &ScenePath) -> bool {
        self.processed.contains(path)
    }

    pub fn is_children_known(&self, path: &ScenePath) -> bool {
        self.hierarchy.contains_key(path)
    }

    /// True if one of the children already registered below `root` is an ancestor of `path`.
    pub fn is_parent_known(&self, root: &ScenePath, path: &ScenePath) -> bool {
        let Some(children) = self.hierarchy.get(root) else {
            return false;
        };

        children
            .iter()
            .any(|child| child != root && child != path && path.has_prefix(child))
    }

    /// Number of objects registered below `path`. Computed once, unknown paths yield 0.
    pub fn num_nodes(&self, path: &ScenePath) -> usize {
        if let Some(count) = self.num_nodes.get(path) {
            return *count;
        }

        let count = match self.hierarchy.get(path) {
            Some(children) => children.len(),
            None => return 0,
        };

        *self.num_nodes.entry(path.clone()).or_insert(count)
    }

    pub fn insert_num_nodes(&self, path: &ScenePath, count: usize) {
        self.num_nodes.insert(path.clone(), count);
    }

    pub fn nth_child(&self, parent: &ScenePath, index: usize) -> Option<ScenePath> {
        self.hierarchy.get(parent)?.get(index).cloned()
    }

    pub fn children(&self, parent: &ScenePath) -> Vec<ScenePath> {
        self.hierarchy
            .get(parent)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Exclusive access to the native node slot of `path`, creating an empty slot if needed.
    /// The flag tells if the slot has been created by this call.
    /// Never acquire another slot while holding the returned guard.
    pub fn render_node_entry(&self, path: &ScenePath) -> (RefMut<'_, ScenePath, Option<NodeHandle>>, bool) {
        match self.render_nodes.entry(path.clone()) {
            Entry::Occupied(entry) => (entry.into_ref(), false),
            Entry::Vacant(entry) => (entry.insert(None), true),
        }
    }

    /// Shared access to the native node slot of `path`, if it exists.
    pub fn render_node_data(&self, path: &ScenePath) -> Option<Ref<'_, ScenePath, Option<NodeHandle>>> {
        self.render_nodes.get(path)
    }

    /// Reserves the slot of `path`. Only the caller that receives `true` may create the node.
    pub fn reserve_render_node(&self, path: &ScenePath) -> bool {
        let (_, created) = self.render_node_entry(path);
        created
    }

    /// Stores `node` unless the slot already holds one. A resolved slot never changes again.
    pub fn publish_render_node(&self, path: &ScenePath, node: NodeHandle) -> bool {
        let (mut entry, _) = self.render_node_entry(path);
        if entry.is_some() {
            return false;
        }

        *entry = Some(node);
        true
    }

    pub fn render_node(&self, path: &ScenePath) -> Option<NodeHandle> {
        *self.render_node_data(path)?
    }

    /// The virtual path registered for an instance prefix, empty if none has been.
    pub fn prefix_path(&self, prefix: &str) -> String {
        self.prefixes
            .get(prefix)
            .map(|path| path.clone())
            .unwrap_or_default()
    }

    /// First registration wins. Returns whether `path` has been stored.
    pub fn set_prefix_path(&self, prefix: &str, path: &str) -> bool {
        match self.prefixes.entry(prefix.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(path.to_string());
                true
            }
        }
    }

    /// Materials live either directly below the root or in `/materials`.
    pub fn has_global_materials(&self) -> bool {
        self.hierarchy.contains_key("/") || self.hierarchy.contains_key(MATERIALS_ROOT)
    }

    pub fn is_assignment_done(&self) -> bool {
        self.assignment_done.load(Ordering::Acquire)
    }

    pub fn mark_assignment_done(&self) {
        self.assignment_done.store(true, Ordering::Release);
    }

    /// How often a merged attribute set had to be computed instead of being served from the cache.
    pub fn override_lookups(&self) -> usize {
        self.override_lookups.load(Ordering::Relaxed)
    }
}

impl Default for RendererIndex {
    fn default() -> Self {
        Self::new()
    }
}
