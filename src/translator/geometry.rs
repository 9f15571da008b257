use crate::rendering::native::{ArrayData, Declaration, DeclarationScope, NodeHandle, ParamArray, ParamValue};
use crate::scene::path::ScenePath;
use crate::scene::value::{Interpolation, Value};
use crate::translator::{ProceduralContext, Translator};
use crate::util::mean_time;
use log::trace;

const PRIMVAR_NAMESPACE: &str = "primvars:";

/// Reverses the elements of every face in place, turning clockwise data into counterclockwise
/// data and back.
pub fn reverse_face_attribute<T>(data: &mut [T], counts: &[i32]) {
    let mut start = 0;
    for count in counts {
        let count = usize::try_from(*count).unwrap_or(0);
        let Some(face) = data.get_mut(start..start + count) else {
            return;
        };

        face.reverse();
        start += count;
    }
}

fn declaration_scope(interpolation: Interpolation) -> DeclarationScope {
    match interpolation {
        Interpolation::Constant => DeclarationScope::Constant,
        Interpolation::Uniform => DeclarationScope::Uniform,
        Interpolation::Varying | Interpolation::Vertex => DeclarationScope::Varying,
        Interpolation::FaceVarying => DeclarationScope::Indexed,
    }
}

/// Primvar values as native array data. Colors stay colors, every other triple is a vector.
fn primvar_data(value: &Value, is_color: bool) -> Option<ArrayData> {
    let data = match value {
        Value::Float2Array(values) => ArrayData::Vector2(values.clone()),
        Value::Float3Array(values) if is_color => ArrayData::Rgb(values.clone()),
        Value::Float3Array(values) => ArrayData::Vector(values.clone()),
        Value::FloatArray(values) => ArrayData::Float(values.clone()),
        Value::IntArray(values) => ArrayData::Int(values.clone()),
        Value::Float2(value) => ArrayData::Vector2(vec![*value]),
        Value::Float3(value) if is_color => ArrayData::Rgb(vec![*value]),
        Value::Float3(value) => ArrayData::Vector(vec![*value]),
        Value::Float(value) => ArrayData::Float(vec![*value]),
        Value::Int(value) => ArrayData::Int(vec![*value]),
        _ => return None,
    };

    Some(data)
}

impl Translator {
    /// Samples an array attribute at every time. Returns the length of one sample and all samples
    /// one after another.
    fn sample_arrays<T: Clone>(
        &self,
        path: &ScenePath,
        name: &str,
        times: &[f32],
        extract: fn(&Value) -> Option<&[T]>,
    ) -> (usize, Vec<T>) {
        let Some(attribute) = self.stage().attribute(path, name) else {
            return (0, Vec::new());
        };

        let mut size = None;
        let mut data = Vec::new();
        for time in times {
            let Some(values) = attribute.value_at(*time).and_then(extract) else {
                continue;
            };

            size.get_or_insert(values.len());
            data.extend_from_slice(values);
        }

        (size.unwrap_or(0), data)
    }

    fn set_keyed(&self, node: NodeHandle, name: &str, size: usize, data: ArrayData) {
        if data.is_empty() {
            return;
        }

        let keys = if size == 0 { 1 } else { data.len() / size };
        self.renderer()
            .set(node, name, ParamValue::Array(ParamArray::keyed(keys, data)));
    }

    pub(super) fn output_mesh(
        &self,
        path: &ScenePath,
        times: &[f32],
        name: &str,
        context: &ProceduralContext,
    ) -> Option<NodeHandle> {
        trace!("Output mesh {name}");

        let renderer = self.renderer();
        let average = [mean_time(times)];

        let node = renderer.create_node("polymesh", name)?;
        renderer.set(node, "smoothing", ParamValue::Bool(true));
        renderer.set(node, "visibility", ParamValue::Byte(0));
        self.set_motion_range(node, context);

        let reverse = self
            .stage()
            .attribute(path, "orientation")
            .and_then(|attribute| attribute.default_value()?.as_str().map(|token| token == "leftHanded"))
            .unwrap_or(false);

        let (_, counts) = self.sample_arrays(path, "faceVertexCounts", &average, Value::as_int_array);
        let nsides = counts
            .iter()
            .map(|count| u8::try_from(*count).unwrap_or(u8::MAX))
            .collect();
        self.set_keyed(node, "nsides", 0, ArrayData::Byte(nsides));
        let face_counts = reverse.then_some(counts.as_slice());

        let (_, mut indices) = self.sample_arrays(path, "faceVertexIndices", &average, Value::as_int_array);
        if let Some(counts) = face_counts {
            reverse_face_attribute(&mut indices, counts);
        }
        let vidxs = indices
            .into_iter()
            .map(|index| u32::try_from(index).unwrap_or(0))
            .collect();
        self.set_keyed(node, "vidxs", 0, ArrayData::UInt(vidxs));

        let (size, points) = self.sample_arrays(path, "points", times, Value::as_float3_array);
        self.set_keyed(node, "vlist", size, ArrayData::Vector(points));

        let (normal_count, normals) = self.sample_arrays(path, "normals", times, Value::as_float3_array);
        self.set_keyed(node, "nlist", normal_count, ArrayData::Vector(normals));
        if normal_count > 0 {
            let mut nidxs: Vec<u32> = (0..normal_count as u32).collect();
            if let Some(counts) = face_counts {
                reverse_face_attribute(&mut nidxs, counts);
            }
            self.set_keyed(node, "nidxs", 0, ArrayData::UInt(nidxs));
        }

        self.output_primvars(path, average[0], node, face_counts, None);

        Some(node)
    }

    pub(super) fn output_curves(
        &self,
        path: &ScenePath,
        times: &[f32],
        name: &str,
        context: &ProceduralContext,
    ) -> Option<NodeHandle> {
        trace!("Output curves {name}");

        let renderer = self.renderer();
        let average = mean_time(times);

        let node = renderer.create_node("curves", name)?;
        renderer.set(node, "visibility", ParamValue::Byte(0));
        self.set_motion_range(node, context);

        let token = |name: &str| {
            self.stage()
                .attribute(path, name)
                .and_then(|attribute| attribute.value_at(average)?.as_str().map(str::to_string))
        };

        // bezier, b-spline, catmull-rom and linear
        let basis = match token("type").as_deref() {
            Some("cubic") => match token("basis").as_deref() {
                Some("bezier") => 0,
                Some("bspline") => 1,
                Some("catmullRom") => 2,
                _ => 3,
            },
            _ => 3,
        };
        renderer.set(node, "basis", ParamValue::Int(basis));

        let (size, counts) = self.sample_arrays(path, "curveVertexCounts", times, Value::as_int_array);
        let counts = counts
            .into_iter()
            .map(|count| u32::try_from(count).unwrap_or(0))
            .collect();
        self.set_keyed(node, "num_points", size, ArrayData::UInt(counts));

        let (size, points) = self.sample_arrays(path, "points", times, Value::as_float3_array);
        self.set_keyed(node, "points", size, ArrayData::Vector(points));

        let (size, widths) = self.sample_arrays(path, "widths", times, Value::as_float_array);
        self.set_keyed(node, "radius", size, ArrayData::Float(widths));

        self.output_primvars(path, average, node, None, None);

        Some(node)
    }

    /// Outputs every `primvars:*` attribute as a user parameter. For point instancers only the
    /// element of `point_id` is output, as a constant.
    pub(super) fn output_primvars(
        &self,
        path: &ScenePath,
        time: f32,
        node: NodeHandle,
        face_counts: Option<&[i32]>,
        point_id: Option<usize>,
    ) {
        let renderer = self.renderer();

        for attribute in self.stage().attributes(path) {
            let Some(name) = attribute.name.strip_prefix(PRIMVAR_NAMESPACE) else {
                continue;
            };

            let interpolation = match point_id {
                Some(_) => Interpolation::Constant,
                None => attribute.interpolation,
            };

            let Some(mut data) = attribute
                .value_at(time)
                .and_then(|value| primvar_data(value, attribute.value_type.is_color()))
            else {
                trace!("Skipping primvar {name} of {path}");
                continue;
            };

            // Indexed face varying data stays indexed, it would break subdivision otherwise.
            let indices = attribute.indices.as_deref();
            if let Some(indices) = indices {
                if !matches!(interpolation, Interpolation::Constant | Interpolation::FaceVarying) {
                    data = data.gather(indices);
                }
            }

            let (native_name, declare) = match &data {
                ArrayData::Vector2(_) if name == "uv" => ("uvlist", false),
                _ => (name, true),
            };

            if declare && renderer.parameter_type(node, native_name).is_none() {
                renderer.declare(
                    node,
                    native_name,
                    Declaration {
                        scope: declaration_scope(interpolation),
                        param_type: data.element_type(),
                        array: false,
                    },
                );
            }

            if interpolation == Interpolation::Constant {
                if let Some(value) = data.element(point_id.unwrap_or(0)) {
                    renderer.set(node, native_name, value);
                }
                continue;
            }

            let count = data.len();
            renderer.set(node, native_name, ParamValue::Array(ParamArray::new(data)));

            if interpolation == Interpolation::FaceVarying {
                let mut idxs: Vec<u32> = match indices {
                    Some(indices) => indices
                        .iter()
                        .map(|index| u32::try_from(*index).unwrap_or(0))
                        .collect(),
                    None => (0..count as u32).collect(),
                };

                if let Some(counts) = face_counts {
                    reverse_face_attribute(&mut idxs, counts);
                }

                renderer.set(
                    node,
                    &format!("{name}idxs"),
                    ParamValue::Array(ParamArray::new(ArrayData::UInt(idxs))),
                );
            }
        }
    }
}
