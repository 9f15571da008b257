use crate::procedural::engine::RendererEngine;
use crate::procedural::registry::{SessionError, SessionRegistry, StageOpener};
use crate::rendering::native::{ArrayData, NativeRenderer, NodeHandle, ParamValue};
use crate::scene::path::ScenePath;
use crate::translator::{OverrideLayers, PROCEDURAL_NODE_TYPE, ProceduralContext, set_frames};
use log::{debug, warn};
use std::sync::Arc;

const DEFAULT_FRAME: f32 = 1.0;

/// One procedural node of the host, ready to hand out the nodes it expands into.
pub struct ProceduralInstance {
    engine: Arc<RendererEngine>,
    object_path: ScenePath,
    times: Vec<f32>,
    context: ProceduralContext,
}

impl ProceduralInstance {
    /// Reads the parameters of `node` and finds (or opens) the scene it refers to.
    pub fn init(
        node: NodeHandle,
        renderer: Arc<dyn NativeRenderer>,
        registry: &SessionRegistry,
        opener: &dyn StageOpener,
    ) -> Result<Self, SessionError> {
        let node_name = renderer.node_name(node).unwrap_or_default();
        if renderer.node_type(node).as_deref() != Some(PROCEDURAL_NODE_TYPE) {
            return Err(SessionError::InvalidProcedural {
                node: node_name,
                reason: format!("expected a {PROCEDURAL_NODE_TYPE} node"),
            });
        }

        let string = |name: &str| {
            renderer
                .get(node, name)
                .and_then(|value| value.as_str().map(str::to_string))
        };

        let file_paths = string("filePaths").unwrap_or_default();
        let overrides = OverrideLayers::from_parameters(&string);

        let engine = registry.get_or_create(&file_paths, &overrides.to_vec(), opener, renderer.clone())?;

        let object_path = match string("objectPath") {
            Some(path) if !path.is_empty() => ScenePath::new(path),
            _ => {
                warn!("{node_name}: the object path is empty, use / to expand the whole scene");
                ScenePath::new("")
            }
        };

        // Only the placeholders we output carry a prefix, the root procedural is named after its node.
        let prefix = string("prefix").unwrap_or_else(|| node_name.clone());

        let mut times = match renderer.get(node, "frame") {
            Some(ParamValue::Float(frame)) => vec![frame],
            Some(ParamValue::Array(array)) => match array.data {
                ArrayData::Float(frames) => frames,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        if times.is_empty() {
            times.push(DEFAULT_FRAME);
        }

        let float = |name: &str| renderer.get(node, name).and_then(|value| value.as_float());

        debug!("{node_name}: expanding {object_path} at {times:?}");
        Ok(Self {
            engine,
            object_path,
            times,
            context: ProceduralContext {
                file_paths,
                prefix,
                overrides,
                motion_start: float("motion_start"),
                motion_end: float("motion_end"),
            },
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.engine.num_nodes(&self.object_path, &self.times)
    }

    pub fn get_node(&self, id: usize) -> Option<NodeHandle> {
        self.engine
            .render(&self.object_path, id, &self.times, &self.context)
    }

    pub fn engine(&self) -> &Arc<RendererEngine> {
        &self.engine
    }

    pub fn object_path(&self) -> &ScenePath {
        &self.object_path
    }

    pub fn times(&self) -> &[f32] {
        &self.times
    }

    pub fn context(&self) -> &ProceduralContext {
        &self.context
    }
}

/// Creates a procedural node the way the host's scene description would, e.g. for the root of an
/// expansion.
pub fn create_procedural_node(
    renderer: &dyn NativeRenderer,
    name: &str,
    file_paths: &str,
    object_path: &str,
    overrides: &OverrideLayers,
    times: &[f32],
) -> Option<NodeHandle> {
    let node = renderer.create_node(PROCEDURAL_NODE_TYPE, name)?;
    renderer.set(node, "filePaths", ParamValue::String(file_paths.to_string()));
    renderer.set(node, "objectPath", ParamValue::String(object_path.to_string()));
    for (parameter, layer) in overrides.slots().filter(|(_, layer)| !layer.is_empty()) {
        renderer.set(node, parameter, ParamValue::String(layer.to_string()));
    }

    if !times.is_empty() {
        set_frames(renderer, node, times);
    }

    Some(node)
}

/// Called when the host unloads the plugin.
pub fn cleanup_plugin(registry: &SessionRegistry) {
    registry.clear();
}
