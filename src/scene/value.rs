use crate::scene::path::ScenePath;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// The declared type of an attribute, as named in the scene documents (`color3f[]`, `token`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    UChar,
    Float,
    Double,
    String,
    Token,
    Asset,
    Float2,
    TexCoord2f,
    Float3,
    Color3f,
    Vector3f,
    Point3f,
    Normal3f,
    Float4,
    Color4f,
    Matrix4d,
    IntArray,
    FloatArray,
    Float2Array,
    TexCoord2fArray,
    Float3Array,
    Color3fArray,
    Vector3fArray,
    Point3fArray,
    Normal3fArray,
    QuathArray,
    TokenArray,
}

impl ValueType {
    pub fn from_type_name(name: &str) -> Option<Self> {
        let value_type = match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "uchar" => Self::UChar,
            "float" | "half" => Self::Float,
            "double" => Self::Double,
            "string" => Self::String,
            "token" => Self::Token,
            "asset" => Self::Asset,
            "float2" => Self::Float2,
            "texCoord2f" => Self::TexCoord2f,
            "float3" => Self::Float3,
            "color3f" => Self::Color3f,
            "vector3f" => Self::Vector3f,
            "point3f" => Self::Point3f,
            "normal3f" => Self::Normal3f,
            "float4" => Self::Float4,
            "color4f" => Self::Color4f,
            "matrix4d" => Self::Matrix4d,
            "int[]" => Self::IntArray,
            "float[]" => Self::FloatArray,
            "float2[]" => Self::Float2Array,
            "texCoord2f[]" => Self::TexCoord2fArray,
            "float3[]" => Self::Float3Array,
            "color3f[]" => Self::Color3fArray,
            "vector3f[]" => Self::Vector3fArray,
            "point3f[]" => Self::Point3fArray,
            "normal3f[]" => Self::Normal3fArray,
            "quath[]" | "quatf[]" => Self::QuathArray,
            "token[]" => Self::TokenArray,
            _ => return None,
        };

        Some(value_type)
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Self::Color3f | Self::Color4f | Self::Color3fArray)
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::IntArray
                | Self::FloatArray
                | Self::Float2Array
                | Self::TexCoord2fArray
                | Self::Float3Array
                | Self::Color3fArray
                | Self::Vector3fArray
                | Self::Point3fArray
                | Self::Normal3fArray
                | Self::QuathArray
                | Self::TokenArray
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    UInt(u32),
    UChar(u8),
    Float(f32),
    Double(f64),
    /// Strings, tokens and asset paths.
    String(String),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Matrix(Mat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Float2Array(Vec<Vec2>),
    Float3Array(Vec<Vec3>),
    QuatArray(Vec<Quat>),
    StringArray(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Double(value) => Some(*value as f32),
            Value::Int(value) => Some(*value as f32),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::IntArray(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f32]> {
        match self {
            Value::FloatArray(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float3_array(&self) -> Option<&[Vec3]> {
        match self {
            Value::Float3Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_quat_array(&self) -> Option<&[Quat]> {
        match self {
            Value::QuatArray(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Mat4> {
        match self {
            Value::Matrix(value) => Some(*value),
            _ => None,
        }
    }

    /// Number of elements for arrays, `None` for scalars.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::IntArray(value) => Some(value.len()),
            Value::FloatArray(value) => Some(value.len()),
            Value::Float2Array(value) => Some(value.len()),
            Value::Float3Array(value) => Some(value.len()),
            Value::QuatArray(value) => Some(value.len()),
            Value::StringArray(value) => Some(value.len()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Constant,
    Uniform,
    Varying,
    Vertex,
    FaceVarying,
}

impl Interpolation {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "constant" => Some(Self::Constant),
            "uniform" => Some(Self::Uniform),
            "varying" => Some(Self::Varying),
            "vertex" => Some(Self::Vertex),
            "faceVarying" => Some(Self::FaceVarying),
            _ => None,
        }
    }
}

/// The upstream end of an attribute connection: `/materials/m1/tex.outputs:rgb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: ScenePath,
    pub output: Option<String>,
}

impl Connection {
    /// The output name without its namespace, `out` if none was authored.
    pub fn output_name(&self) -> &str {
        match &self.output {
            Some(output) => output.strip_prefix("outputs:").unwrap_or(output),
            None => "out",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
    pub default: Option<Value>,
    /// Sorted by time.
    pub samples: Vec<(f64, Value)>,
    pub connection: Option<Connection>,
    pub interpolation: Interpolation,
    pub indices: Option<Vec<i32>>,
}

impl Attribute {
    pub fn new(name: &str, value_type: ValueType, default: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            default,
            samples: Vec::new(),
            connection: None,
            interpolation: Interpolation::default(),
            indices: None,
        }
    }

    /// `arnold:attribute:casts_shadows` -> `["arnold", "attribute", "casts_shadows"]`
    pub fn name_segments(&self) -> Vec<&str> {
        self.name.split(':').collect()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.rfind(':').map(|index| &self.name[..index])
    }

    pub fn base_name(&self) -> &str {
        match self.name.rfind(':') {
            Some(index) => &self.name[index + 1..],
            None => &self.name,
        }
    }

    pub fn is_namespaced(&self) -> bool {
        self.name.contains(':')
    }

    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }

    /// The untimed value, the first time sample if there is none.
    pub fn default_value(&self) -> Option<&Value> {
        self.default
            .as_ref()
            .or_else(|| self.samples.first().map(|(_, value)| value))
    }

    /// Time samples are held: the last sample at or before `time` wins, the first one before that.
    pub fn value_at(&self, time: f32) -> Option<&Value> {
        if self.samples.is_empty() {
            return self.default.as_ref();
        }

        let time = time as f64;
        let held = self
            .samples
            .iter()
            .take_while(|(sample_time, _)| *sample_time <= time)
            .last();

        match held {
            Some((_, value)) => Some(value),
            None => self.samples.first().map(|(_, value)| value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub targets: Vec<ScenePath>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn held_samples() {
        let mut attribute = Attribute::new("radius", ValueType::Float, Some(Value::Float(0.5)));
        assert_eq!(attribute.value_at(3.0), Some(&Value::Float(0.5)));

        attribute.samples = vec![(1.0, Value::Float(1.0)), (2.0, Value::Float(2.0))];
        assert_eq!(attribute.value_at(0.0), Some(&Value::Float(1.0)));
        assert_eq!(attribute.value_at(1.5), Some(&Value::Float(1.0)));
        assert_eq!(attribute.value_at(2.0), Some(&Value::Float(2.0)));
        assert_eq!(attribute.value_at(10.0), Some(&Value::Float(2.0)));
    }

    #[test]
    pub fn names() {
        let attribute = Attribute::new("arnold:attribute:casts_shadows", ValueType::Bool, None);
        assert_eq!(attribute.base_name(), "casts_shadows");
        assert_eq!(attribute.namespace(), Some("arnold:attribute"));
        assert_eq!(attribute.name_segments().len(), 3);
        assert!(!attribute.has_value());
    }

    #[test]
    pub fn connection_outputs() {
        let connection = Connection {
            source: ScenePath::new("/materials/m1/tex"),
            output: Some("outputs:rgb".to_string()),
        };
        assert_eq!(connection.output_name(), "rgb");
    }
}
