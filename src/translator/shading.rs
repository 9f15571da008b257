use crate::procedural::index::{DEFAULT_RENDER_LAYER, DISPLACEMENT_TARGET, RendererIndex, SHADER_TARGET};
use crate::rendering::native::{ArrayData, NodeHandle, ParamArray, ParamValue};
use crate::scene::path::ScenePath;
use crate::scene::provider::PrimKind;
use crate::scene::virtual_path::VirtualPath;
use crate::translator::attributes::{NameToAttribute, RayMask, create_renderer_attribute};
use crate::translator::{ProceduralContext, Translator};
use crate::util::mean_time;
use log::{debug, trace};
use std::sync::Arc;

const SHADER_TARGET_ATTRIBUTE: &str = "info:target";
const SHADER_TYPE_ATTRIBUTE: &str = "info:type";
const RENDERER_TARGET: &str = "arnold";
const INPUT_NAMESPACE: &str = "inputs:";

impl Translator {
    /// Outputs a shader meant for this renderer, without its connections.
    pub(super) fn output_shader(&self, path: &ScenePath, times: &[f32], name: &str) -> Option<NodeHandle> {
        let average = mean_time(times);
        let token = |name: &str| {
            self.stage()
                .attribute(path, name)
                .and_then(|attribute| attribute.value_at(average)?.as_str().map(str::to_string))
        };

        if token(SHADER_TARGET_ATTRIBUTE).as_deref() != Some(RENDERER_TARGET) {
            trace!("{path} is not a shader for us");
            return None;
        }

        let shader_type = token(SHADER_TYPE_ATTRIBUTE)?;
        let renderer = self.renderer();
        let node = renderer.create_node(&shader_type, name)?;

        if renderer.parameter_type(node, "matrix").is_some() {
            let xform = self.prim_transform(path, times);
            if !xform.is_empty() {
                renderer.set(
                    node,
                    "matrix",
                    ParamValue::Array(ParamArray::keyed(xform.len(), ArrayData::Matrix(xform))),
                );
            }
        }

        for attribute in self.stage().attributes(path) {
            // "name" would rename the node
            if attribute.is_namespaced() || attribute.name == "name" {
                continue;
            }

            if let Some(parameter) = create_renderer_attribute(&attribute.name, &attribute, Some(average)) {
                parameter.evaluate(renderer, node);
            }
        }

        Some(node)
    }

    /// Links the connected inputs of the shader at `path` to the nodes already created for their
    /// sources. Sources without a node are left unconnected.
    pub fn establish_connections(&self, path: &ScenePath, node: NodeHandle, index: &RendererIndex) {
        if self.stage().kind(path) != Some(PrimKind::Shader) {
            return;
        }

        let renderer = self.renderer();
        for attribute in self.stage().attributes(path) {
            let (Some(input), Some(connection)) = (attribute.name.strip_prefix(INPUT_NAMESPACE), &attribute.connection)
            else {
                continue;
            };

            // Namespaces of the input are components of the native parameter
            let input = input.replace(':', ".");

            let Some(source) = index.render_node(&connection.source) else {
                debug!("{path}.{input}: no node for {}", connection.source);
                continue;
            };

            let output = connection.output_name();
            let linked = if output.is_empty() || output == "out" {
                renderer.link(source, None, node, &input)
            } else {
                renderer.link(source, Some(output), node, &input)
            };

            if !linked {
                debug!("Can't link {} to {path}.{input}", connection.source);
            }
        }
    }

    /// The merged overrides that apply to `path` as seen through the instance prefix of `context`,
    /// and the rays the object stays visible to.
    pub(super) fn assigned_attributes(
        &self,
        path: &ScenePath,
        context: &ProceduralContext,
        index: &RendererIndex,
    ) -> (Arc<NameToAttribute>, RayMask) {
        let name = VirtualPath::join(&index.prefix_path(&context.prefix), path);
        let attributes = index.object_attributes(&name, DEFAULT_RENDER_LAYER);

        let visibility = attributes
            .values()
            .filter(|attribute| attribute.is_visibility())
            .fold(RayMask::ALL, |visibility, attribute| visibility & attribute.visibility_flag());

        (attributes, visibility)
    }

    /// References get the overrides and the displacement, instances get the surface shader.
    pub(super) fn output_attributes(
        &self,
        node: NodeHandle,
        path: &ScenePath,
        attributes: &NameToAttribute,
        context: &ProceduralContext,
        index: &RendererIndex,
        for_reference: bool,
    ) {
        if for_reference {
            for attribute in attributes.values() {
                attribute.evaluate(self.renderer(), node);
            }
        }

        let name = VirtualPath::join(&index.prefix_path(&context.prefix), path);
        let target = if for_reference {
            DISPLACEMENT_TARGET
        } else {
            SHADER_TARGET
        };
        self.output_shading_attribute(node, &name, index, DEFAULT_RENDER_LAYER, target);
    }

    /// Binds the node assigned to `name` for `target`. Nodes the scene doesn't provide are looked up
    /// by name, they may have been created by the host.
    pub fn output_shading_attribute(
        &self,
        node: NodeHandle,
        name: &VirtualPath,
        index: &RendererIndex,
        layer: &str,
        target: &str,
    ) {
        let Some(shader_path) = index.resolve_assignment(layer, target, name.as_str()) else {
            return;
        };

        let is_displacement = target == DISPLACEMENT_TARGET;
        let renderer = self.renderer();

        // The slot is released before asking the renderer.
        let (shader, created) = {
            let (entry, created) = index.render_node_entry(&shader_path);
            (*entry, created)
        };

        let shader = match shader {
            None if created => {
                let found = renderer.lookup_by_name(shader_path.as_str()).or_else(|| {
                    // Displacement nodes of some hosts carry a property suffix
                    is_displacement
                        .then(|| renderer.lookup_by_name(shader_path.append_property("message").as_str()))
                        .flatten()
                });

                if let Some(found) = found {
                    index.publish_render_node(&shader_path, found);
                }
                index.render_node(&shader_path)
            }
            shader => shader,
        };

        if let Some(shader) = shader {
            let parameter = if is_displacement { "disp_map" } else { target };
            renderer.set(node, parameter, ParamValue::single_node(shader));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::stage::DocumentStage;
    use crate::rendering::native::memory::NodeGraph;
    use crate::rendering::native::{Declaration, NativeRenderer, ParamType};
    use crate::scene::expression::AssignmentLayers;

    /// A host that already owns some nodes. Its lookups read the index like a renderer calling back
    /// into the procedural would.
    struct HostGraph {
        graph: NodeGraph,
        index: Arc<RendererIndex>,
    }

    impl NativeRenderer for HostGraph {
        fn create_node(&self, node_type: &str, name: &str) -> Option<NodeHandle> {
            self.graph.create_node(node_type, name)
        }

        fn lookup_by_name(&self, name: &str) -> Option<NodeHandle> {
            let (path, _) = ScenePath::split_property(name);
            let _ = self.index.render_node(&path);
            self.graph.lookup_by_name(name)
        }

        fn node_name(&self, node: NodeHandle) -> Option<String> {
            self.graph.node_name(node)
        }

        fn node_type(&self, node: NodeHandle) -> Option<String> {
            self.graph.node_type(node)
        }

        fn parameter_type(&self, node: NodeHandle, name: &str) -> Option<ParamType> {
            self.graph.parameter_type(node, name)
        }

        fn declare(&self, node: NodeHandle, name: &str, declaration: Declaration) -> bool {
            self.graph.declare(node, name, declaration)
        }

        fn set(&self, node: NodeHandle, name: &str, value: ParamValue) {
            self.graph.set(node, name, value)
        }

        fn get(&self, node: NodeHandle, name: &str) -> Option<ParamValue> {
            self.graph.get(node, name)
        }

        fn link(&self, source: NodeHandle, output: Option<&str>, target: NodeHandle, input: &str) -> bool {
            self.graph.link(source, output, target, input)
        }
    }

    fn assign(index: &RendererIndex, target: &str, shader: &str) {
        let mut layers = AssignmentLayers::new();
        layers
            .entry(DEFAULT_RENDER_LAYER.to_string())
            .or_default()
            .insert(target.to_string(), ScenePath::new(shader));
        index.insert_expression(&ScenePath::new("/assign"), &ScenePath::root(), "/geo/cube", &layers);
    }

    #[test]
    pub fn host_nodes_are_looked_up_by_name() {
        let index = Arc::new(RendererIndex::new());
        let host = Arc::new(HostGraph {
            graph: NodeGraph::new(),
            index: index.clone(),
        });
        let surface = host.create_node("standard_surface", "/host/surface").unwrap();
        let bumps = host.create_node("image", "/host/bumps.message").unwrap();
        let mesh = host.create_node("polymesh", "mesh").unwrap();

        assign(&index, SHADER_TARGET, "/host/surface");
        assign(&index, DISPLACEMENT_TARGET, "/host/bumps");

        let stage = Arc::new(DocumentStage::from_layer_text("<Layer/>").unwrap());
        let translator = Translator::new(stage, host.clone());
        let name = VirtualPath::from_path(&ScenePath::new("/geo/cube"));

        translator.output_shading_attribute(mesh, &name, &index, DEFAULT_RENDER_LAYER, SHADER_TARGET);
        translator.output_shading_attribute(mesh, &name, &index, DEFAULT_RENDER_LAYER, DISPLACEMENT_TARGET);

        assert_eq!(
            host.get(mesh, "shader"),
            Some(ParamValue::single_node(surface))
        );
        assert_eq!(
            host.get(mesh, "disp_map"),
            Some(ParamValue::single_node(bumps))
        );
        assert_eq!(index.render_node(&ScenePath::new("/host/surface")), Some(surface));
        assert_eq!(index.render_node(&ScenePath::new("/host/bumps")), Some(bumps));
    }

    #[test]
    pub fn unknown_shaders_bind_nothing() {
        let index = Arc::new(RendererIndex::new());
        let graph = Arc::new(NodeGraph::new());
        let mesh = graph.create_node("polymesh", "mesh").unwrap();
        assign(&index, SHADER_TARGET, "/nowhere");

        let stage = Arc::new(DocumentStage::from_layer_text("<Layer/>").unwrap());
        let translator = Translator::new(stage, graph.clone());
        let name = VirtualPath::from_path(&ScenePath::new("/geo/cube"));
        translator.output_shading_attribute(mesh, &name, &index, DEFAULT_RENDER_LAYER, SHADER_TARGET);

        assert_eq!(graph.get(mesh, "shader"), None);
        assert_eq!(index.render_node(&ScenePath::new("/nowhere")), None);

        // The node shows up later in the procedural itself.
        let shader = graph.create_node("standard_surface", "late").unwrap();
        assert!(index.publish_render_node(&ScenePath::new("/nowhere"), shader));
        translator.output_shading_attribute(mesh, &name, &index, DEFAULT_RENDER_LAYER, SHADER_TARGET);
        assert_eq!(graph.get(mesh, "shader"), Some(ParamValue::single_node(shader)));
    }
}
