use crate::rendering::native::{Declaration, DeclarationScope, NativeRenderer, NodeHandle, ParamType, ParamValue};
use crate::translator::PROCEDURAL_NODE_TYPE;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use itertools::Itertools;
use log::{error, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeLink {
    pub input: String,
    pub source: NodeHandle,
    pub output: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NativeNode {
    pub handle: NodeHandle,
    pub node_type: String,
    pub name: String,
    pub params: HashMap<String, ParamValue>,
    pub declarations: HashMap<String, Declaration>,
    pub links: Vec<NodeLink>,
}

impl NativeNode {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
}

type NodeSchema = HashMap<String, ParamType>;

/// A renderer that only records the node graph. It backs the command line tool and the tests.
pub struct NodeGraph {
    schema: HashMap<String, NodeSchema>,
    nodes: DashMap<NodeHandle, NativeNode>,
    names: DashMap<String, NodeHandle>,
    next_handle: AtomicU64,
}

fn schema_of(params: &[(&str, ParamType)]) -> NodeSchema {
    params
        .iter()
        .map(|(name, param_type)| (name.to_string(), *param_type))
        .collect()
}

impl NodeGraph {
    pub fn new() -> Self {
        use ParamType::*;

        let shape = [
            ("matrix", Array),
            ("visibility", Byte),
            ("sidedness", Byte),
            ("shader", Array),
            ("disp_map", Array),
            ("motion_start", Float),
            ("motion_end", Float),
            ("opaque", Bool),
            ("receive_shadows", Bool),
            ("self_shadows", Bool),
        ];

        let mut schema = HashMap::new();
        schema.insert(
            "polymesh".to_string(),
            schema_of(
                &[
                    ("nsides", Array),
                    ("vidxs", Array),
                    ("vlist", Array),
                    ("nlist", Array),
                    ("nidxs", Array),
                    ("uvlist", Array),
                    ("uvidxs", Array),
                    ("smoothing", Bool),
                    ("subdiv_iterations", Byte),
                    ("subdiv_type", Int),
                ]
                .into_iter()
                .chain(shape)
                .collect_vec(),
            ),
        );
        schema.insert(
            "curves".to_string(),
            schema_of(
                &[
                    ("num_points", Array),
                    ("points", Array),
                    ("radius", Array),
                    ("basis", Int),
                    ("mode", Int),
                ]
                .into_iter()
                .chain(shape)
                .collect_vec(),
            ),
        );
        schema.insert(
            "points".to_string(),
            schema_of(
                &[("points", Array), ("radius", Array), ("mode", Int)]
                    .into_iter()
                    .chain(shape)
                    .collect_vec(),
            ),
        );
        schema.insert(
            "ginstance".to_string(),
            schema_of(
                &[("node", Node), ("inherit_xform", Bool)]
                    .into_iter()
                    .chain(shape)
                    .collect_vec(),
            ),
        );
        schema.insert(
            PROCEDURAL_NODE_TYPE.to_string(),
            schema_of(&[
                ("filePaths", String),
                ("objectPath", String),
                ("sessionLayer", String),
                ("variantsLayer", String),
                ("stateLayer", String),
                ("visibilityLayer", String),
                ("purposeLayer", String),
                ("matrix", Array),
                ("min", Vector),
                ("max", Vector),
                ("visibility", Byte),
                ("motion_start", Float),
                ("motion_end", Float),
            ]),
        );
        schema.insert(
            "standard_surface".to_string(),
            schema_of(&[
                ("base", Float),
                ("base_color", Rgb),
                ("specular", Float),
                ("specular_color", Rgb),
                ("specular_roughness", Float),
                ("emission", Float),
                ("emission_color", Rgb),
                ("opacity", Rgb),
                ("normal", Vector),
            ]),
        );
        schema.insert(
            "image".to_string(),
            schema_of(&[
                ("filename", String),
                ("color_space", String),
                ("multiply", Rgb),
                ("offset", Rgb),
                ("uvcoords", Vector2),
            ]),
        );
        schema.insert("flat".to_string(), schema_of(&[("color", Rgb)]));
        schema.insert(
            "lambert".to_string(),
            schema_of(&[("Kd", Float), ("Kd_color", Rgb), ("opacity", Rgb)]),
        );
        schema.insert(
            "noise".to_string(),
            schema_of(&[
                ("octaves", Int),
                ("freq", Float),
                ("amplitude", Float),
                ("scale", Vector),
                ("offset", Vector),
                ("matrix", Matrix),
            ]),
        );

        Self {
            schema,
            nodes: DashMap::with_capacity(100),
            names: DashMap::with_capacity(100),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn register_node_type(&mut self, node_type: &str, params: &[(&str, ParamType)]) {
        self.schema.insert(node_type.to_string(), schema_of(params));
    }

    pub fn node(&self, handle: NodeHandle) -> Option<NativeNode> {
        self.nodes.get(&handle).map(|node| node.clone())
    }

    pub fn node_by_name(&self, name: &str) -> Option<NativeNode> {
        let handle = *self.names.get(name)?;
        self.node(handle)
    }

    /// All nodes of one type, ordered by creation.
    pub fn nodes_of_type(&self, node_type: &str) -> Vec<NativeNode> {
        self.nodes
            .iter()
            .filter(|node| node.node_type == node_type)
            .map(|node| node.clone())
            .sorted_by_key(|node| node.handle)
            .collect_vec()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node count per type, e.g. for a summary.
    pub fn type_histogram(&self) -> Vec<(String, usize)> {
        self.nodes
            .iter()
            .map(|node| node.node_type.clone())
            .counts()
            .into_iter()
            .sorted()
            .collect_vec()
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRenderer for NodeGraph {
    fn create_node(&self, node_type: &str, name: &str) -> Option<NodeHandle> {
        if !self.schema.contains_key(node_type) {
            error!("Unknown node type {node_type} for {name}");
            return None;
        }

        // The name stays locked until the node exists, a name never points at nothing.
        let Entry::Vacant(vacant) = self.names.entry(name.to_string()) else {
            error!("A node called {name} already exists");
            return None;
        };

        let handle = NodeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.nodes.insert(
            handle,
            NativeNode {
                handle,
                node_type: node_type.to_string(),
                name: name.to_string(),
                params: HashMap::new(),
                declarations: HashMap::new(),
                links: Vec::new(),
            },
        );
        vacant.insert(handle);

        Some(handle)
    }

    fn lookup_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.names.get(name).map(|handle| *handle)
    }

    fn node_name(&self, node: NodeHandle) -> Option<String> {
        self.nodes.get(&node).map(|node| node.name.clone())
    }

    fn node_type(&self, node: NodeHandle) -> Option<String> {
        self.nodes.get(&node).map(|node| node.node_type.clone())
    }

    fn parameter_type(&self, node: NodeHandle, name: &str) -> Option<ParamType> {
        let node = self.nodes.get(&node)?;
        if let Some(param_type) = self
            .schema
            .get(&node.node_type)
            .and_then(|schema| schema.get(name))
        {
            return Some(*param_type);
        }

        if let Some(declaration) = node.declarations.get(name) {
            return Some(match declaration.scope {
                DeclarationScope::Constant if !declaration.array => declaration.param_type,
                _ => ParamType::Array,
            });
        }

        // Indexed parameters come with their index list
        let indexed = name
            .strip_suffix("idxs")
            .and_then(|base| node.declarations.get(base))
            .is_some_and(|declaration| declaration.scope == DeclarationScope::Indexed);
        indexed.then_some(ParamType::Array)
    }

    fn declare(&self, node: NodeHandle, name: &str, declaration: Declaration) -> bool {
        let is_builtin = self.parameter_type(node, name).is_some();
        let Some(mut node) = self.nodes.get_mut(&node) else {
            return false;
        };

        if is_builtin {
            warn!("{}: parameter {name} already exists", node.name);
            return false;
        }

        node.declarations.insert(name.to_string(), declaration);
        true
    }

    fn set(&self, node: NodeHandle, name: &str, value: ParamValue) {
        if self.parameter_type(node, name).is_none() {
            warn!("Setting undeclared parameter {name} on {node:?}");
        }

        if let Some(mut node) = self.nodes.get_mut(&node) {
            node.params.insert(name.to_string(), value);
        }
    }

    fn get(&self, node: NodeHandle, name: &str) -> Option<ParamValue> {
        self.nodes.get(&node)?.params.get(name).cloned()
    }

    fn link(&self, source: NodeHandle, output: Option<&str>, target: NodeHandle, input: &str) -> bool {
        if !self.nodes.contains_key(&source) {
            return false;
        }

        match self.nodes.get_mut(&target) {
            Some(mut node) => {
                // An input has one source, linking it again replaces the previous link.
                node.links.retain(|link| link.input != input);
                node.links.push(NodeLink {
                    input: input.to_string(),
                    source,
                    output: output.map(str::to_string),
                });
                true
            }
            None => false,
        }
    }
}
