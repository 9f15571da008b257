use crate::procedural::registry::{SessionError, StageOpener};
use crate::scene::path::ScenePath;
use crate::scene::provider::{BoundingBox, PrimKind, Purpose, SceneProvider};
use crate::scene::value::{Attribute, Connection, Interpolation, Relationship, Value, ValueType};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use itertools::Itertools;
use log::{debug, trace, warn};
use stage_files::compose::{ComposedPrim, ComposedStage, LayerStack};
use stage_files::typedefs::AttributeSpec;
use stage_files::{parse_layer, read_layer_file};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TRANSFORM_ATTRIBUTE: &str = "xformOp:transform";
pub const VISIBILITY_ATTRIBUTE: &str = "visibility";
pub const PURPOSE_ATTRIBUTE: &str = "purpose";
pub const POINTS_ATTRIBUTE: &str = "points";
const INVISIBLE: &str = "invisible";

static ANONYMOUS_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Gives every stage without a single backing file a process-unique name.
fn anonymous_identifier() -> String {
    format!("anonymous:{}", ANONYMOUS_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Every number in `text`, ignoring the brackets and separators around them.
fn parse_numbers(text: &str) -> Vec<f64> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .collect()
}

fn parse_floats(text: &str) -> Vec<f32> {
    parse_numbers(text).into_iter().map(|n| n as f32).collect()
}

fn parse_ints(text: &str) -> Vec<i32> {
    parse_numbers(text).into_iter().map(|n| n as i32).collect()
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix(['"', '\''])
        .and_then(|rest| rest.strip_suffix(['"', '\'']))
        .or_else(|| text.strip_prefix('@').and_then(|rest| rest.strip_suffix('@')))
        .unwrap_or(text)
}

/// Parses the textual form of a value, `(1, 2, 3)` for vectors and `[...]` for arrays.
pub fn parse_value(value_type: ValueType, text: &str) -> Option<Value> {
    let value = match value_type {
        ValueType::Bool => match text.trim() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return None,
        },
        ValueType::Int => Value::Int(*parse_ints(text).first()?),
        ValueType::UInt => Value::UInt(*parse_numbers(text).first()? as u32),
        ValueType::UChar => Value::UChar(*parse_numbers(text).first()? as u8),
        ValueType::Float => Value::Float(*parse_floats(text).first()?),
        ValueType::Double => Value::Double(*parse_numbers(text).first()?),
        ValueType::String | ValueType::Token | ValueType::Asset => Value::String(unquote(text).to_string()),
        ValueType::Float2 | ValueType::TexCoord2f => Value::Float2(Vec2::from_slice(&exactly(parse_floats(text), 2)?)),
        ValueType::Float3
        | ValueType::Color3f
        | ValueType::Vector3f
        | ValueType::Point3f
        | ValueType::Normal3f => Value::Float3(Vec3::from_slice(&exactly(parse_floats(text), 3)?)),
        ValueType::Float4 | ValueType::Color4f => Value::Float4(Vec4::from_slice(&exactly(parse_floats(text), 4)?)),
        // Rows are row vectors with the translation last, which is glam's column layout.
        ValueType::Matrix4d => Value::Matrix(Mat4::from_cols_slice(&exactly(parse_floats(text), 16)?)),
        ValueType::IntArray => Value::IntArray(parse_ints(text)),
        ValueType::FloatArray => Value::FloatArray(parse_floats(text)),
        ValueType::Float2Array | ValueType::TexCoord2fArray => Value::Float2Array(
            complete_chunks(parse_floats(text), 2)?
                .chunks_exact(2)
                .map(Vec2::from_slice)
                .collect(),
        ),
        ValueType::Float3Array
        | ValueType::Color3fArray
        | ValueType::Vector3fArray
        | ValueType::Point3fArray
        | ValueType::Normal3fArray => Value::Float3Array(
            complete_chunks(parse_floats(text), 3)?
                .chunks_exact(3)
                .map(Vec3::from_slice)
                .collect(),
        ),
        // (real, i, j, k)
        ValueType::QuathArray => Value::QuatArray(
            complete_chunks(parse_floats(text), 4)?
                .chunks_exact(4)
                .map(|q| Quat::from_xyzw(q[1], q[2], q[3], q[0]))
                .collect(),
        ),
        ValueType::TokenArray => {
            let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
            Value::StringArray(
                inner
                    .split(',')
                    .map(unquote)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
    };

    Some(value)
}

fn exactly(values: Vec<f32>, count: usize) -> Option<Vec<f32>> {
    (values.len() == count).then_some(values)
}

fn complete_chunks(values: Vec<f32>, size: usize) -> Option<Vec<f32>> {
    (values.len() % size == 0).then_some(values)
}

fn convert_attribute(prim: &str, spec: &AttributeSpec) -> Option<Attribute> {
    let Some(value_type) = ValueType::from_type_name(&spec.type_name) else {
        warn!("{prim}.{}: unsupported type {}", spec.name, spec.type_name);
        return None;
    };

    let parse = |text: &str| {
        let value = parse_value(value_type, text);
        if value.is_none() {
            warn!("{prim}.{}: can't parse \"{text}\" as {}", spec.name, spec.type_name);
        }
        value
    };

    let mut attribute = Attribute::new(&spec.name, value_type, spec.value.as_deref().and_then(parse));
    attribute.samples = spec
        .samples()
        .filter_map(|sample| parse(&sample.value).map(|value| (sample.time, value)))
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect();

    attribute.connection = spec.connect.as_deref().map(|target| {
        let (source, output) = ScenePath::split_property(target.trim());
        Connection {
            source,
            output: output.map(str::to_string),
        }
    });

    if let Some(interpolation) = &spec.interpolation {
        match Interpolation::from_token(interpolation) {
            Some(interpolation) => attribute.interpolation = interpolation,
            None => warn!("{prim}.{}: unknown interpolation {interpolation}", spec.name),
        }
    }

    attribute.indices = spec.indices().map(parse_ints);
    Some(attribute)
}

struct StagePrim {
    kind: PrimKind,
    children: Vec<ScenePath>,
    prototype: Option<ScenePath>,
    attributes: Vec<Arc<Attribute>>,
    relationships: Vec<Relationship>,
}

impl StagePrim {
    fn convert(prim: &ComposedPrim) -> Self {
        Self {
            kind: PrimKind::from_type_name(prim.type_name.as_deref()),
            children: prim.children.iter().map(ScenePath::new).collect(),
            prototype: prim.instance.as_ref().map(ScenePath::new),
            attributes: prim
                .attributes
                .iter()
                .filter_map(|spec| convert_attribute(&prim.path, spec))
                .map(Arc::new)
                .collect(),
            relationships: prim
                .relationships
                .iter()
                .map(|spec| Relationship {
                    name: spec.name.clone(),
                    targets: spec.target_paths().map(ScenePath::new).collect(),
                })
                .collect(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    fn token_at(&self, name: &str, time: f32) -> Option<&str> {
        self.attribute(name)?.value_at(time)?.as_str()
    }

    fn local_transform(&self, time: f32) -> Mat4 {
        self.attribute(TRANSFORM_ATTRIBUTE)
            .and_then(|transform| transform.value_at(time)?.as_matrix())
            .unwrap_or(Mat4::IDENTITY)
    }
}

/// A composed stack of scene documents, converted into typed values once and read-only afterwards.
pub struct DocumentStage {
    identifier: String,
    root_children: Vec<ScenePath>,
    prims: HashMap<ScenePath, StagePrim>,
}

impl DocumentStage {
    pub fn new(identifier: String, composed: &ComposedStage) -> Self {
        let prims: HashMap<ScenePath, StagePrim> = composed
            .prims()
            .map(|prim| (ScenePath::new(&prim.path), StagePrim::convert(prim)))
            .collect();

        debug!("{identifier}: {} prims", prims.len());
        Self {
            identifier,
            root_children: composed.root_children().iter().map(ScenePath::new).collect(),
            prims,
        }
    }

    pub fn from_layer_text(text: &str) -> Result<Self, SessionError> {
        let mut stack = LayerStack::new();
        stack.push_weaker(parse_layer(text)?);
        Ok(Self::new(anonymous_identifier(), &stack.compose()?))
    }

    fn prim(&self, path: &ScenePath) -> Option<&StagePrim> {
        self.prims.get(path.as_str())
    }

    /// `path` and its ancestors, nearest first, as far as they exist.
    fn ancestry<'a>(&'a self, path: &ScenePath) -> impl Iterator<Item = &'a StagePrim> + 'a {
        std::iter::successors(Some(path.clone()), ScenePath::parent).filter_map(|path| self.prims.get(path.as_str()))
    }

    /// `prototypes` holds the prototypes entered on the way down, an instance of one of them ends
    /// the walk.
    fn accumulate_bound(
        &self,
        path: &ScenePath,
        time: f32,
        matrix: Mat4,
        prototypes: &mut HashSet<ScenePath>,
        bound: &mut Option<BoundingBox>,
    ) {
        let Some(prim) = self.prim(path) else {
            return;
        };

        let points_bound = prim
            .attribute(POINTS_ATTRIBUTE)
            .and_then(|points| BoundingBox::from_points(points.value_at(time)?.as_float3_array()?));
        if let Some(points_bound) = points_bound {
            let points_bound = points_bound.transformed(&matrix);
            *bound = Some(match bound {
                Some(existing) => existing.union(&points_bound),
                None => points_bound,
            });
        }

        let children = match &prim.prototype {
            Some(prototype) => {
                if !prototypes.insert(prototype.clone()) {
                    warn!("{path} instances {prototype} from inside itself");
                    return;
                }
                std::slice::from_ref(prototype)
            }
            None => prim.children.as_slice(),
        };

        for child in children {
            let local = self
                .prim(child)
                .map(|child| child.local_transform(time))
                .unwrap_or(Mat4::IDENTITY);
            self.accumulate_bound(child, time, matrix * local, prototypes, bound);
        }

        if let Some(prototype) = &prim.prototype {
            prototypes.remove(prototype);
        }
    }
}

impl SceneProvider for DocumentStage {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self, path: &ScenePath) -> Option<PrimKind> {
        if path.is_root() {
            return Some(PrimKind::PseudoRoot);
        }

        self.prim(path).map(|prim| prim.kind.clone())
    }

    fn children(&self, path: &ScenePath) -> Vec<ScenePath> {
        if path.is_root() {
            return self.root_children.clone();
        }

        self.prim(path)
            .map(|prim| prim.children.clone())
            .unwrap_or_default()
    }

    fn prototype(&self, path: &ScenePath) -> Option<ScenePath> {
        self.prim(path)?.prototype.clone()
    }

    fn attributes(&self, path: &ScenePath) -> Vec<Arc<Attribute>> {
        self.prim(path)
            .map(|prim| prim.attributes.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, path: &ScenePath, name: &str) -> Option<Arc<Attribute>> {
        self.prim(path)?.attribute(name).cloned()
    }

    fn relationships(&self, path: &ScenePath) -> Vec<Relationship> {
        self.prim(path)
            .map(|prim| prim.relationships.clone())
            .unwrap_or_default()
    }

    fn local_to_world(&self, path: &ScenePath, time: f32) -> Option<Mat4> {
        let chain = self.ancestry(path).collect_vec();
        if !chain.iter().any(|prim| prim.kind.is_imageable()) {
            return None;
        }

        Some(
            chain
                .iter()
                .rev()
                .fold(Mat4::IDENTITY, |world, prim| world * prim.local_transform(time)),
        )
    }

    fn bound(&self, path: &ScenePath, time: f32) -> Option<BoundingBox> {
        let mut bound = None;
        self.accumulate_bound(path, time, Mat4::IDENTITY, &mut HashSet::new(), &mut bound);
        bound
    }

    fn is_invisible(&self, path: &ScenePath, time: f32) -> bool {
        self.ancestry(path)
            .any(|prim| prim.token_at(VISIBILITY_ATTRIBUTE, time) == Some(INVISIBLE))
    }

    fn purpose(&self, path: &ScenePath) -> Purpose {
        self.ancestry(path)
            .find_map(|prim| {
                prim.attribute(PURPOSE_ATTRIBUTE)?
                    .default_value()?
                    .as_str()
                    .and_then(Purpose::from_token)
            })
            .unwrap_or_default()
    }
}

/// Opens scene sources made of documents on disk. A source is a list of files, strongest first,
/// separated like the entries of `PATH`. Sources registered with [`DocumentStageOpener::with_source`]
/// are read from memory instead.
#[derive(Default)]
pub struct DocumentStageOpener {
    sources: HashMap<String, String>,
}

impl DocumentStageOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: &str, text: &str) -> Self {
        self.sources.insert(source_id.to_string(), text.to_string());
        self
    }

    fn base_layers(&self, source_id: &str, stack: &mut LayerStack) -> Result<(), SessionError> {
        if let Some(text) = self.sources.get(source_id) {
            stack.push_weaker(parse_layer(text)?);
            return Ok(());
        }

        for file in std::env::split_paths(source_id).filter(|file| !file.as_os_str().is_empty()) {
            let layer = read_layer_file(&file).map_err(|err| SessionError::OpenFailed {
                source_id: source_id.to_string(),
                reason: format!("{}: {err}", file.display()),
            })?;
            stack.push_weaker(layer);
        }

        Ok(())
    }
}

impl StageOpener for DocumentStageOpener {
    fn open(&self, source_id: &str, overrides: &[String]) -> Result<Arc<dyn SceneProvider>, SessionError> {
        let mut stack = LayerStack::new();

        // Overrides are stronger than every document of the source.
        for (slot, text) in overrides.iter().enumerate() {
            match parse_layer(text) {
                Ok(layer) => stack.push_weaker(layer),
                Err(err) => warn!("{source_id}: ignoring override layer {slot}: {err}"),
            }
        }

        let override_count = stack.len();
        self.base_layers(source_id, &mut stack)?;
        if stack.len() == override_count {
            return Err(SessionError::OpenFailed {
                source_id: source_id.to_string(),
                reason: "no documents".to_string(),
            });
        }

        let identifier = if override_count == 0 {
            source_id.to_string()
        } else {
            anonymous_identifier()
        };

        trace!("{identifier}: composing {} layers", stack.len());
        let composed = stack.compose()?;
        Ok(Arc::new(DocumentStage::new(identifier, &composed)))
    }
}
