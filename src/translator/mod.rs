use crate::procedural::index::RendererIndex;
use crate::rendering::native::{ArrayData, NativeRenderer, NodeHandle, ParamArray, ParamValue};
use crate::scene::path::ScenePath;
use crate::scene::provider::{PrimKind, Purpose, SceneProvider};
use crate::scene::value::Attribute;
use crate::translator::attributes::{RendererAttribute, create_renderer_attribute};
use crate::util::mean_time;
use glam::Vec3;
use log::{debug, trace};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod attributes;
mod geometry;
mod procedural_nodes;
mod shading;

pub use procedural_nodes::set_frames;

/// Node type of the placeholders that expand into the objects below a path.
pub const PROCEDURAL_NODE_TYPE: &str = "stagebridge";

/// The override documents a procedural composes on top of its scene source, strongest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OverrideLayers([String; 5]);

impl OverrideLayers {
    /// Parameter names of the slots on the procedural node, in the order they are composed.
    pub const PARAMETERS: [&'static str; 5] = [
        "sessionLayer",
        "variantsLayer",
        "stateLayer",
        "visibilityLayer",
        "purposeLayer",
    ];

    pub fn new(session: &str, variants: &str, state: &str, visibility: &str, purpose: &str) -> Self {
        Self([session, variants, state, visibility, purpose].map(str::to_string))
    }

    /// Reads every slot through `read`, missing slots stay empty.
    pub fn from_parameters<F: Fn(&str) -> Option<String>>(read: F) -> Self {
        Self(Self::PARAMETERS.map(|name| read(name).unwrap_or_default()))
    }

    /// (parameter name, document) for every slot, empty ones included.
    pub fn slots(&self) -> impl Iterator<Item = (&'static str, &str)> {
        Self::PARAMETERS
            .iter()
            .copied()
            .zip(self.0.iter().map(String::as_str))
    }

    /// The documents that are actually set, strongest first.
    pub fn to_vec(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|layer| !layer.is_empty())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(String::is_empty)
    }
}

/// What a procedural node hands down to everything it outputs.
#[derive(Debug, Clone, Default)]
pub struct ProceduralContext {
    pub file_paths: String,
    pub prefix: String,
    pub overrides: OverrideLayers,
    pub motion_start: Option<f32>,
    pub motion_end: Option<f32>,
}

/// Turns scene objects into native nodes.
pub struct Translator {
    stage: Arc<dyn SceneProvider>,
    renderer: Arc<dyn NativeRenderer>,
    unique_counter: AtomicUsize,
}

impl Translator {
    pub fn new(stage: Arc<dyn SceneProvider>, renderer: Arc<dyn NativeRenderer>) -> Self {
        Self {
            stage,
            renderer,
            unique_counter: AtomicUsize::new(0),
        }
    }

    pub fn stage(&self) -> &dyn SceneProvider {
        self.stage.as_ref()
    }

    pub fn renderer(&self) -> &dyn NativeRenderer {
        self.renderer.as_ref()
    }

    /// Objects that get a native node of their own, or expand into more objects.
    pub fn is_supported(&self, path: &ScenePath) -> bool {
        match self.stage.kind(path) {
            Some(PrimKind::Mesh | PrimKind::Curves | PrimKind::PointInstancer) => true,
            Some(_) => self.stage.is_instance(path),
            None => false,
        }
    }

    /// Objects that are output right away and wired up in a second pass.
    pub fn is_immediate(&self, path: &ScenePath) -> bool {
        self.stage.kind(path) == Some(PrimKind::Shader)
    }

    pub fn create_renderer_attribute(&self, attribute: &Attribute) -> Option<RendererAttribute> {
        create_renderer_attribute(attribute.base_name(), attribute, None)
    }

    /// "0", "1", "2"... unique for the lifetime of the translator, from any thread.
    fn unique_string(&self) -> String {
        self.unique_counter.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Outputs the node that holds the actual data of `path`: geometry or a shader. Geometry is
    /// invisible by itself, it's drawn by the instances pointing to it.
    pub fn output_reference(
        &self,
        path: &ScenePath,
        times: &[f32],
        context: &ProceduralContext,
        index: &RendererIndex,
    ) -> Option<NodeHandle> {
        let name = format!("{}:{}", self.stage.identifier(), path);

        let node = match self.stage.kind(path)? {
            PrimKind::Mesh => self.output_mesh(path, times, &name, context)?,
            PrimKind::Curves => self.output_curves(path, times, &name, context)?,
            // Overrides and displacement are for geometry only
            PrimKind::Shader => return self.output_shader(path, times, &name),
            _ => return None,
        };

        let (attributes, _) = self.assigned_attributes(path, context, index);
        self.output_attributes(node, path, &attributes, context, index, true);

        Some(node)
    }

    /// Outputs an instance of the already created `reference`. Hidden objects get a placeholder
    /// instead, the renderer expects a node for every id.
    pub fn render(
        &self,
        path: &ScenePath,
        times: &[f32],
        reference: NodeHandle,
        context: &ProceduralContext,
        index: &RendererIndex,
    ) -> Option<NodeHandle> {
        let name = format!("{}:{}", context.prefix, path);

        let (attributes, visibility) = self.assigned_attributes(path, context, index);

        let hidden_in_scene = self.stage.is_invisible(path, mean_time(times));
        let can_render = !matches!(self.stage.purpose(path), Purpose::Proxy | Purpose::Guide);

        if visibility.is_empty() || hidden_in_scene || !can_render {
            debug!("Skipping {path} because it's not visible");
            return self.output_empty_node(&name);
        }

        let renderer = self.renderer();
        let node = renderer.create_node("ginstance", &name)?;
        renderer.set(node, "node", ParamValue::Node(reference));
        renderer.set(node, "visibility", ParamValue::Byte(visibility.bits()));

        self.output_attributes(node, path, &attributes, context, index, false);

        trace!("Output instance {name}");
        Some(node)
    }

    /// A tiny point only volume rays can see.
    pub fn output_empty_node(&self, name: &str) -> Option<NodeHandle> {
        let renderer = self.renderer();
        let node = renderer.create_node("points", name)?;
        renderer.set(
            node,
            "visibility",
            ParamValue::Byte(attributes::RayMask::VOLUME.bits()),
        );
        renderer.set(node, "sidedness", ParamValue::Byte(0));
        renderer.set(
            node,
            "points",
            ParamValue::Array(ParamArray::new(ArrayData::Vector(vec![Vec3::ZERO]))),
        );
        renderer.set(
            node,
            "radius",
            ParamValue::Array(ParamArray::new(ArrayData::Float(vec![1e-9]))),
        );
        Some(node)
    }

    fn set_motion_range(&self, node: NodeHandle, context: &ProceduralContext) {
        if let Some(start) = context.motion_start {
            self.renderer.set(node, "motion_start", ParamValue::Float(start));
        }

        if let Some(end) = context.motion_end {
            self.renderer.set(node, "motion_end", ParamValue::Float(end));
        }
    }
}
