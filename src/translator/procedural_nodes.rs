use crate::procedural::index::RendererIndex;
use crate::rendering::native::{ArrayData, Declaration, NativeRenderer, NodeHandle, ParamArray, ParamType, ParamValue};
use crate::scene::path::ScenePath;
use crate::scene::provider::BoundingBox;
use crate::scene::virtual_path::VirtualPath;
use crate::translator::{PROCEDURAL_NODE_TYPE, ProceduralContext, Translator};
use crate::util::mean_time;
use glam::{Mat4, Quat, Vec3};
use log::{trace, warn};

const PROTOTYPES_RELATIONSHIP: &str = "prototypes";

/// `frame` of a procedural node: a single float, or an array for motion blur.
pub fn set_frames(renderer: &dyn NativeRenderer, node: NodeHandle, times: &[f32]) {
    match times {
        [time] => renderer.declare_and_set(
            node,
            "frame",
            Declaration::constant(ParamType::Float),
            ParamValue::Float(*time),
        ),
        _ => renderer.declare_and_set(
            node,
            "frame",
            Declaration::constant_array(ParamType::Float),
            ParamValue::Array(ParamArray::new(ArrayData::Float(times.to_vec()))),
        ),
    }
}

/// A procedural node that expands `object_path` later on.
struct Placeholder<'a> {
    name: String,
    object_path: &'a ScenePath,
    prefix: &'a str,
    xform: Vec<Mat4>,
    bounds: Option<BoundingBox>,
}

impl Translator {
    /// World matrices of `path` for every time. Empty if the object isn't transformable.
    pub(super) fn prim_transform(&self, path: &ScenePath, times: &[f32]) -> Vec<Mat4> {
        times
            .iter()
            .map(|time| self.stage().local_to_world(path, *time))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    }

    /// Bounds of `path` combined over all times.
    fn combined_bounds(&self, path: &ScenePath, times: &[f32]) -> Option<BoundingBox> {
        times
            .iter()
            .filter_map(|time| self.stage().bound(path, *time))
            .reduce(|combined, bound| combined.union(&bound))
    }

    fn output_placeholder(
        &self,
        placeholder: Placeholder,
        times: &[f32],
        context: &ProceduralContext,
    ) -> Option<NodeHandle> {
        let renderer = self.renderer();
        let node = renderer.create_node(PROCEDURAL_NODE_TYPE, &placeholder.name)?;

        set_frames(renderer, node, times);

        if !placeholder.xform.is_empty() {
            renderer.set(
                node,
                "matrix",
                ParamValue::Array(ParamArray::keyed(
                    placeholder.xform.len(),
                    ArrayData::Matrix(placeholder.xform),
                )),
            );
        }

        self.set_motion_range(node, context);

        if let Some(bounds) = placeholder.bounds {
            renderer.set(node, "min", ParamValue::Vector(bounds.min));
            renderer.set(node, "max", ParamValue::Vector(bounds.max));
        }

        renderer.set(node, "filePaths", ParamValue::String(context.file_paths.clone()));
        renderer.set(
            node,
            "objectPath",
            ParamValue::String(placeholder.object_path.to_string()),
        );

        // The expansion has to find the same session again
        for (parameter, layer) in context.overrides.slots() {
            if !layer.is_empty() {
                renderer.set(node, parameter, ParamValue::String(layer.to_string()));
            }
        }

        renderer.declare_and_set(
            node,
            "prefix",
            Declaration::constant(ParamType::String),
            ParamValue::String(placeholder.prefix.to_string()),
        );

        trace!("Output placeholder {} for {}", placeholder.name, placeholder.object_path);
        Some(node)
    }

    /// Outputs a procedural that expands everything below `path`. Instances continue inside their
    /// prototype, under a new prefix that remembers which instance led there.
    pub fn output_bbox(
        &self,
        path: &ScenePath,
        times: &[f32],
        context: &ProceduralContext,
        index: &RendererIndex,
    ) -> Option<NodeHandle> {
        let name = format!("{}:{}:proc", context.prefix, path);
        let xform = self.prim_transform(path, times);
        let bounds = self.combined_bounds(path, times);

        let (object_path, prefix) = match self.stage().prototype(path) {
            Some(prototype) => {
                let prefix = format!("{}_{}", context.prefix, self.unique_string());
                let virtual_path = VirtualPath::join(&index.prefix_path(&context.prefix), path);
                index.set_prefix_path(&prefix, virtual_path.as_str());
                (prototype, prefix)
            }
            None => (path.clone(), context.prefix.clone()),
        };

        self.output_placeholder(
            Placeholder {
                name,
                object_path: &object_path,
                prefix: &prefix,
                xform,
                bounds,
            },
            times,
            context,
        )
    }

    /// Outputs a procedural for the point `id` of the point instancer at `path`, expanding the
    /// prototype the point refers to.
    pub fn output_bbox_from_point(
        &self,
        path: &ScenePath,
        id: usize,
        times: &[f32],
        context: &ProceduralContext,
        index: &RendererIndex,
    ) -> Option<NodeHandle> {
        let stage = self.stage();
        let average = mean_time(times);

        let proto_indices = stage.attribute(path, "protoIndices")?;
        let proto_index = proto_indices
            .value_at(average)?
            .as_int_array()?
            .get(id)
            .and_then(|index| usize::try_from(*index).ok())?;

        let Some(prototype) = stage
            .relationships(path)
            .into_iter()
            .find(|relationship| relationship.name == PROTOTYPES_RELATIONSHIP)
            .and_then(|relationship| relationship.targets.get(proto_index).cloned())
        else {
            warn!("{path}: point {id} refers to the missing prototype {proto_index}");
            return None;
        };

        let name = format!("{}:{}:proc_{id}", context.prefix, prototype);

        let scales = stage.attribute(path, "scales");
        let orientations = stage.attribute(path, "orientations");
        let positions = stage.attribute(path, "positions");
        let xform = times
            .iter()
            .map(|time| {
                let scale = scales
                    .as_ref()
                    .and_then(|scales| scales.value_at(*time)?.as_float3_array()?.get(id).copied())
                    .unwrap_or(Vec3::ONE);
                let rotation = orientations
                    .as_ref()
                    .and_then(|orientations| orientations.value_at(*time)?.as_quat_array()?.get(id).copied())
                    .unwrap_or(Quat::IDENTITY);
                let translation = positions
                    .as_ref()
                    .and_then(|positions| positions.value_at(*time)?.as_float3_array()?.get(id).copied())
                    .unwrap_or(Vec3::ZERO);
                Mat4::from_scale_rotation_translation(scale, rotation, translation)
            })
            .collect();

        let bounds = self.combined_bounds(&prototype, times);

        // Points sharing a prototype would output equally named instances otherwise. They are
        // still looked up like the instancer itself.
        let prefix = format!("{}_{}", context.prefix, self.unique_string());
        index.set_prefix_path(&prefix, &index.prefix_path(&context.prefix));

        let node = self.output_placeholder(
            Placeholder {
                name,
                object_path: &prototype,
                prefix: &prefix,
                xform,
                bounds,
            },
            times,
            context,
        )?;

        self.output_primvars(path, average, node, None, Some(id));
        Some(node)
    }
}
