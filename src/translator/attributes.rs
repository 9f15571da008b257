use crate::rendering::native::{Declaration, NativeRenderer, NodeHandle, ParamType, ParamValue};
use crate::scene::value::{Attribute, Value, ValueType};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Ray classes an object is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RayMask: u8 {
        const CAMERA = 0x01;
        const SHADOW = 0x02;
        const DIFFUSE_TRANSMIT = 0x04;
        const SPECULAR_TRANSMIT = 0x08;
        const VOLUME = 0x10;
        const DIFFUSE_REFLECT = 0x20;
        const SPECULAR_REFLECT = 0x40;
        const SUBSURFACE = 0x80;

        const ALL_DIFFUSE = Self::DIFFUSE_TRANSMIT.bits() | Self::DIFFUSE_REFLECT.bits();
        const ALL_SPECULAR = Self::SPECULAR_TRANSMIT.bits() | Self::SPECULAR_REFLECT.bits();
        const ALL_REFLECT = Self::DIFFUSE_REFLECT.bits() | Self::SPECULAR_REFLECT.bits();
        const ALL_TRANSMIT = Self::DIFFUSE_TRANSMIT.bits() | Self::SPECULAR_TRANSMIT.bits();
        const ALL = 0xFF;
    }
}

impl RayMask {
    /// The rays a boolean visibility attribute controls, `None` if `name` is a regular attribute.
    pub fn from_attribute_name(name: &str) -> Option<RayMask> {
        let ray = match name {
            "casts_shadows" => RayMask::SHADOW,
            "primary_visibility" => RayMask::CAMERA,
            "visibility" => RayMask::ALL,
            "visible_in_diffuse" => RayMask::ALL_DIFFUSE,
            "visible_in_glossy" => RayMask::ALL_SPECULAR,
            "visible_in_reflections" => RayMask::ALL_REFLECT,
            "visible_in_refractions" => RayMask::ALL_TRANSMIT,
            "visible_in_diffuse_reflection" => RayMask::DIFFUSE_REFLECT,
            "visible_in_specular_reflection" => RayMask::SPECULAR_REFLECT,
            "visible_in_diffuse_transmission" => RayMask::DIFFUSE_TRANSMIT,
            "visible_in_specular_transmission" => RayMask::SPECULAR_TRANSMIT,
            "visible_in_volume" => RayMask::VOLUME,
            _ => return None,
        };

        Some(ray)
    }
}

/// An override value ready to be pushed to a native node.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererAttribute {
    Parameter { name: String, value: ParamValue },
    /// Rays that stay enabled. All visibility attributes of an object are combined with AND.
    Visibility(RayMask),
}

pub type NameToAttribute = HashMap<String, RendererAttribute>;

impl RendererAttribute {
    pub fn is_visibility(&self) -> bool {
        matches!(self, RendererAttribute::Visibility(_))
    }

    pub fn visibility_flag(&self) -> RayMask {
        match self {
            RendererAttribute::Visibility(mask) => *mask,
            RendererAttribute::Parameter { .. } => RayMask::ALL,
        }
    }

    /// Sets the parameter on `node`, declaring it as a constant user parameter if the node type doesn't have it.
    pub fn evaluate(&self, renderer: &dyn NativeRenderer, node: NodeHandle) {
        let RendererAttribute::Parameter { name, value } = self else {
            return;
        };

        let existing = renderer.parameter_type(node, name);
        let value = match (value, existing) {
            // Built-in vectors can't take colors
            (ParamValue::Rgb(color), Some(ParamType::Vector)) => ParamValue::Vector(*color),
            _ => value.clone(),
        };

        if existing.is_none() {
            renderer.declare(node, name, Declaration::constant(value.param_type()));
        }

        renderer.set(node, name, value);
    }
}

/// Converts the value of `attribute` at `time` (or its default value) into something the renderer understands.
/// Visibility booleans turn into ray masks, everything without a value or of an unsupported type yields `None`.
pub fn create_renderer_attribute(name: &str, attribute: &Attribute, time: Option<f32>) -> Option<RendererAttribute> {
    let value = match time {
        Some(time) => attribute.value_at(time)?,
        None => attribute.default_value()?,
    };

    let parameter = |value: ParamValue| {
        Some(RendererAttribute::Parameter {
            name: name.to_string(),
            value,
        })
    };

    // Sometimes we have to force the type
    let value_type = if name == "subdiv_iterations" {
        ValueType::UChar
    } else {
        attribute.value_type
    };

    match (value_type, value) {
        (ValueType::Bool, Value::Bool(flag)) => match RayMask::from_attribute_name(name) {
            Some(ray) if !flag => Some(RendererAttribute::Visibility(RayMask::ALL.difference(ray))),
            Some(_) => Some(RendererAttribute::Visibility(RayMask::ALL)),
            None => parameter(ParamValue::Bool(*flag)),
        },
        (ValueType::Int, Value::Int(value)) => parameter(ParamValue::Int(*value)),
        (ValueType::UInt, Value::UInt(value)) => parameter(ParamValue::UInt(*value)),
        (ValueType::UChar, Value::UChar(value)) => parameter(ParamValue::Byte(*value)),
        (ValueType::UChar, Value::Int(value)) => parameter(ParamValue::Byte((*value).clamp(0, 255) as u8)),
        (ValueType::UChar, Value::UInt(value)) => parameter(ParamValue::Byte((*value).min(255) as u8)),
        (ValueType::Float, Value::Float(value)) => parameter(ParamValue::Float(*value)),
        (ValueType::Double, Value::Double(value)) => parameter(ParamValue::Float(*value as f32)),
        (ValueType::String | ValueType::Token | ValueType::Asset, Value::String(value)) => {
            parameter(ParamValue::String(value.clone()))
        }
        (
            ValueType::Color3f | ValueType::Vector3f | ValueType::Point3f | ValueType::Normal3f | ValueType::Float3,
            Value::Float3(value),
        ) => parameter(ParamValue::Rgb(*value)),
        (ValueType::Float2 | ValueType::TexCoord2f, Value::Float2(value)) => parameter(ParamValue::Vector2(*value)),
        (ValueType::Float4 | ValueType::Color4f, Value::Float4(value)) => parameter(ParamValue::Rgba(*value)),
        (ValueType::Matrix4d, Value::Matrix(value)) => parameter(ParamValue::Matrix(*value)),
        _ => None,
    }
}
