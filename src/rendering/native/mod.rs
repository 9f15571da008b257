use glam::{Mat4, Vec2, Vec3, Vec4};
use std::fmt::{Display, Formatter};

pub mod memory;

/// Opaque reference to a node owned by the renderer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bool,
    Byte,
    Int,
    UInt,
    Float,
    String,
    Rgb,
    Rgba,
    Vector,
    Vector2,
    Matrix,
    Node,
    Array,
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParamType::Bool => "BOOL",
            ParamType::Byte => "BYTE",
            ParamType::Int => "INT",
            ParamType::UInt => "UINT",
            ParamType::Float => "FLOAT",
            ParamType::String => "STRING",
            ParamType::Rgb => "RGB",
            ParamType::Rgba => "RGBA",
            ParamType::Vector => "VECTOR",
            ParamType::Vector2 => "VECTOR2",
            ParamType::Matrix => "MATRIX",
            ParamType::Node => "NODE",
            ParamType::Array => "ARRAY",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationScope {
    Constant,
    Uniform,
    Varying,
    Indexed,
}

/// A user parameter declaration, e.g. `constant ARRAY FLOAT` or `indexed RGB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    pub scope: DeclarationScope,
    pub param_type: ParamType,
    pub array: bool,
}

impl Declaration {
    pub fn constant(param_type: ParamType) -> Self {
        Self {
            scope: DeclarationScope::Constant,
            param_type,
            array: false,
        }
    }

    pub fn constant_array(param_type: ParamType) -> Self {
        Self {
            scope: DeclarationScope::Constant,
            param_type,
            array: true,
        }
    }
}

impl Display for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let scope = match self.scope {
            DeclarationScope::Constant => "constant",
            DeclarationScope::Uniform => "uniform",
            DeclarationScope::Varying => "varying",
            DeclarationScope::Indexed => "indexed",
        };

        if self.array {
            write!(f, "{scope} ARRAY {}", self.param_type)
        } else {
            write!(f, "{scope} {}", self.param_type)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Byte(Vec<u8>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f32>),
    String(Vec<String>),
    Rgb(Vec<Vec3>),
    Vector(Vec<Vec3>),
    Vector2(Vec<Vec2>),
    Matrix(Vec<Mat4>),
    Node(Vec<NodeHandle>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Byte(data) => data.len(),
            ArrayData::Int(data) => data.len(),
            ArrayData::UInt(data) => data.len(),
            ArrayData::Float(data) => data.len(),
            ArrayData::String(data) => data.len(),
            ArrayData::Rgb(data) => data.len(),
            ArrayData::Vector(data) => data.len(),
            ArrayData::Vector2(data) => data.len(),
            ArrayData::Matrix(data) => data.len(),
            ArrayData::Node(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of a single element.
    pub fn element_type(&self) -> ParamType {
        match self {
            ArrayData::Byte(_) => ParamType::Byte,
            ArrayData::Int(_) => ParamType::Int,
            ArrayData::UInt(_) => ParamType::UInt,
            ArrayData::Float(_) => ParamType::Float,
            ArrayData::String(_) => ParamType::String,
            ArrayData::Rgb(_) => ParamType::Rgb,
            ArrayData::Vector(_) => ParamType::Vector,
            ArrayData::Vector2(_) => ParamType::Vector2,
            ArrayData::Matrix(_) => ParamType::Matrix,
            ArrayData::Node(_) => ParamType::Node,
        }
    }

    pub fn element(&self, index: usize) -> Option<ParamValue> {
        let value = match self {
            ArrayData::Byte(data) => ParamValue::Byte(*data.get(index)?),
            ArrayData::Int(data) => ParamValue::Int(*data.get(index)?),
            ArrayData::UInt(data) => ParamValue::UInt(*data.get(index)?),
            ArrayData::Float(data) => ParamValue::Float(*data.get(index)?),
            ArrayData::String(data) => ParamValue::String(data.get(index)?.clone()),
            ArrayData::Rgb(data) => ParamValue::Rgb(*data.get(index)?),
            ArrayData::Vector(data) => ParamValue::Vector(*data.get(index)?),
            ArrayData::Vector2(data) => ParamValue::Vector2(*data.get(index)?),
            ArrayData::Matrix(data) => ParamValue::Matrix(*data.get(index)?),
            ArrayData::Node(data) => ParamValue::Node(*data.get(index)?),
        };

        Some(value)
    }

    /// Looks every index up, indices out of range are dropped.
    pub fn gather(&self, indices: &[i32]) -> ArrayData {
        fn pick<T: Clone>(data: &[T], indices: &[i32]) -> Vec<T> {
            indices
                .iter()
                .filter_map(|index| usize::try_from(*index).ok())
                .filter_map(|index| data.get(index).cloned())
                .collect()
        }

        match self {
            ArrayData::Byte(data) => ArrayData::Byte(pick(data, indices)),
            ArrayData::Int(data) => ArrayData::Int(pick(data, indices)),
            ArrayData::UInt(data) => ArrayData::UInt(pick(data, indices)),
            ArrayData::Float(data) => ArrayData::Float(pick(data, indices)),
            ArrayData::String(data) => ArrayData::String(pick(data, indices)),
            ArrayData::Rgb(data) => ArrayData::Rgb(pick(data, indices)),
            ArrayData::Vector(data) => ArrayData::Vector(pick(data, indices)),
            ArrayData::Vector2(data) => ArrayData::Vector2(pick(data, indices)),
            ArrayData::Matrix(data) => ArrayData::Matrix(pick(data, indices)),
            ArrayData::Node(data) => ArrayData::Node(pick(data, indices)),
        }
    }
}

/// Array parameter: `keys` motion keys of equal length, stored one after another.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamArray {
    pub keys: usize,
    pub data: ArrayData,
}

impl ParamArray {
    pub fn new(data: ArrayData) -> Self {
        Self { keys: 1, data }
    }

    pub fn keyed(keys: usize, data: ArrayData) -> Self {
        Self {
            keys: keys.max(1),
            data,
        }
    }

    /// Elements per motion key.
    pub fn elements(&self) -> usize {
        self.data.len() / self.keys
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Float(f32),
    String(String),
    Rgb(Vec3),
    Rgba(Vec4),
    Vector(Vec3),
    Vector2(Vec2),
    Matrix(Mat4),
    Node(NodeHandle),
    Array(ParamArray),
}

impl ParamValue {
    pub fn param_type(&self) -> ParamType {
        match self {
            ParamValue::Bool(_) => ParamType::Bool,
            ParamValue::Byte(_) => ParamType::Byte,
            ParamValue::Int(_) => ParamType::Int,
            ParamValue::UInt(_) => ParamType::UInt,
            ParamValue::Float(_) => ParamType::Float,
            ParamValue::String(_) => ParamType::String,
            ParamValue::Rgb(_) => ParamType::Rgb,
            ParamValue::Rgba(_) => ParamType::Rgba,
            ParamValue::Vector(_) => ParamType::Vector,
            ParamValue::Vector2(_) => ParamType::Vector2,
            ParamValue::Matrix(_) => ParamType::Matrix,
            ParamValue::Node(_) => ParamType::Node,
            ParamValue::Array(_) => ParamType::Array,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            ParamValue::Byte(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeHandle> {
        match self {
            ParamValue::Node(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ParamArray> {
        match self {
            ParamValue::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn single_node(node: NodeHandle) -> Self {
        ParamValue::Array(ParamArray::new(ArrayData::Node(vec![node])))
    }
}

/// The node graph API of the target renderer. Every call may happen from any worker thread.
pub trait NativeRenderer: Send + Sync {
    /// `None` if the node type is unknown or the name is taken.
    fn create_node(&self, node_type: &str, name: &str) -> Option<NodeHandle>;

    fn lookup_by_name(&self, name: &str) -> Option<NodeHandle>;

    fn node_name(&self, node: NodeHandle) -> Option<String>;

    fn node_type(&self, node: NodeHandle) -> Option<String>;

    /// The type of a built-in or already declared parameter.
    fn parameter_type(&self, node: NodeHandle, name: &str) -> Option<ParamType>;

    fn declare(&self, node: NodeHandle, name: &str, declaration: Declaration) -> bool;

    fn set(&self, node: NodeHandle, name: &str, value: ParamValue);

    fn get(&self, node: NodeHandle, name: &str) -> Option<ParamValue>;

    /// Links the whole output of `source`, or only its `output` component, to `input` of `target`.
    fn link(&self, source: NodeHandle, output: Option<&str>, target: NodeHandle, input: &str) -> bool;

    /// Declares `name` unless the node already knows it, then sets the value.
    fn declare_and_set(&self, node: NodeHandle, name: &str, declaration: Declaration, value: ParamValue) {
        if self.parameter_type(node, name).is_none() {
            self.declare(node, name, declaration);
        }
        self.set(node, name, value);
    }
}
