use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Default)]
pub struct LayerDocument {
    #[serde(rename = "$value", default)]
    pub elements: Vec<LayerItem>,
}

#[derive(Deserialize, Debug)]
pub enum LayerItem {
    Prim(PrimSpec),
    /// A root that is only reachable through instances, never through the regular hierarchy.
    Prototype(PrimSpec),

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrimSpec {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type", default)]
    pub type_name: Option<String>,
    /// The prototype path this prim instances, if any.
    #[serde(rename = "@instance", default)]
    pub instance: Option<String>,
    #[serde(rename = "$value", default)]
    pub elements: Vec<PrimItem>,
}

#[derive(Deserialize, Debug, Clone)]
pub enum PrimItem {
    Prim(PrimSpec),
    Attribute(AttributeSpec),
    Relationship(RelationshipSpec),

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AttributeSpec {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub type_name: String,
    /// The default (untimed) value, in its textual form.
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
    /// `/path/to/prim.outputs:name`
    #[serde(rename = "@connect", default)]
    pub connect: Option<String>,
    #[serde(rename = "@interpolation", default)]
    pub interpolation: Option<String>,
    #[serde(rename = "$value", default)]
    pub elements: Vec<AttributeItem>,
}

impl AttributeSpec {
    pub fn samples(&self) -> impl Iterator<Item = &SampleSpec> {
        self.elements.iter().filter_map(|item| match item {
            AttributeItem::Sample(sample) => Some(sample),
            _ => None,
        })
    }

    pub fn indices(&self) -> Option<&str> {
        self.elements.iter().find_map(|item| match item {
            AttributeItem::Indices(indices) => Some(indices.value.as_str()),
            _ => None,
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub enum AttributeItem {
    Sample(SampleSpec),
    Indices(IndicesSpec),

    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SampleSpec {
    #[serde(rename = "@time")]
    pub time: f64,
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct IndicesSpec {
    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RelationshipSpec {
    #[serde(rename = "@name")]
    pub name: String,
    /// Whitespace separated target paths.
    #[serde(rename = "@targets", default)]
    pub targets: String,
}

impl RelationshipSpec {
    pub fn target_paths(&self) -> impl Iterator<Item = &str> {
        self.targets.split_whitespace()
    }
}
