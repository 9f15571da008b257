use crate::StageError;
use crate::typedefs::{AttributeSpec, LayerDocument, LayerItem, PrimItem, PrimSpec, RelationshipSpec};
use std::collections::HashMap;

/// All opinions about one prim, flattened over the whole layer stack.
#[derive(Debug, Clone, Default)]
pub struct ComposedPrim {
    pub path: String,
    pub type_name: Option<String>,
    pub instance: Option<String>,
    pub is_prototype: bool,
    /// Child prim paths, in the order they have first been seen.
    pub children: Vec<String>,
    pub attributes: Vec<AttributeSpec>,
    pub relationships: Vec<RelationshipSpec>,
}

impl ComposedPrim {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSpec> {
        self.relationships.iter().find(|rel| rel.name == name)
    }
}

#[derive(Debug, Default)]
pub struct ComposedStage {
    prims: HashMap<String, ComposedPrim>,
    root_children: Vec<String>,
    prototypes: Vec<String>,
}

impl ComposedStage {
    pub fn prim(&self, path: &str) -> Option<&ComposedPrim> {
        self.prims.get(path)
    }

    pub fn root_children(&self) -> &[String] {
        &self.root_children
    }

    pub fn prototypes(&self) -> &[String] {
        &self.prototypes
    }

    pub fn prims(&self) -> impl Iterator<Item = &ComposedPrim> {
        self.prims.values()
    }

    pub fn len(&self) -> usize {
        self.prims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prims.is_empty()
    }
}

/// Layers ordered strongest first: the first opinion found for a property wins.
#[derive(Debug, Default)]
pub struct LayerStack {
    layers: Vec<LayerDocument>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Adds a layer weaker than every layer already in the stack.
    pub fn push_weaker(&mut self, layer: LayerDocument) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn compose(&self) -> Result<ComposedStage, StageError> {
        if self.layers.is_empty() {
            return Err(StageError::EmptySource);
        }

        let mut stage = ComposedStage::default();
        for layer in &self.layers {
            for item in &layer.elements {
                match item {
                    LayerItem::Prim(spec) => {
                        let path = compose_prim(&mut stage, "/", spec, false)?;
                        push_unique(&mut stage.root_children, path);
                    }
                    LayerItem::Prototype(spec) => {
                        let path = compose_prim(&mut stage, "/", spec, true)?;
                        push_unique(&mut stage.prototypes, path);
                    }
                    LayerItem::Unknown => {}
                }
            }
        }

        log::trace!("Composed {} layers into {} prims", self.layers.len(), stage.len());
        Ok(stage)
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn validate_name(parent: &str, name: &str) -> Result<(), StageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(StageError::InvalidPrimName {
            name: name.to_string(),
            parent: parent.to_string(),
        });
    }

    Ok(())
}

fn compose_prim(
    stage: &mut ComposedStage,
    parent: &str,
    spec: &PrimSpec,
    is_prototype: bool,
) -> Result<String, StageError> {
    validate_name(parent, &spec.name)?;
    let path = child_path(parent, &spec.name);

    {
        let prim = stage
            .prims
            .entry(path.clone())
            .or_insert_with(|| ComposedPrim {
                path: path.clone(),
                is_prototype,
                ..Default::default()
            });

        if prim.type_name.is_none() {
            prim.type_name = spec.type_name.clone();
        }

        if prim.instance.is_none() {
            prim.instance = spec.instance.clone();
        }
    }

    let mut children = Vec::new();
    for element in &spec.elements {
        match element {
            PrimItem::Prim(child) => children.push(compose_prim(stage, &path, child, false)?),
            PrimItem::Attribute(attribute) => {
                if let Some(prim) = stage.prims.get_mut(&path) {
                    if prim.attribute(&attribute.name).is_none() {
                        prim.attributes.push(attribute.clone());
                    }
                }
            }
            PrimItem::Relationship(relationship) => {
                if let Some(prim) = stage.prims.get_mut(&path) {
                    if prim.relationship(&relationship.name).is_none() {
                        prim.relationships.push(relationship.clone());
                    }
                }
            }
            PrimItem::Unknown => {}
        }
    }

    if let Some(prim) = stage.prims.get_mut(&path) {
        for child in children {
            push_unique(&mut prim.children, child);
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_layer;

    #[test]
    pub fn stronger_layer_wins() {
        let base = parse_layer(
            r#"<Layer>
                <Prim name="geo" type="Xform">
                    <Prim name="cube" type="Mesh">
                        <Attribute name="doubleSided" type="bool" value="false"/>
                    </Prim>
                </Prim>
            </Layer>"#,
        )
        .unwrap();

        let over = parse_layer(
            r#"<Layer>
                <Prim name="geo">
                    <Prim name="cube">
                        <Attribute name="doubleSided" type="bool" value="true"/>
                    </Prim>
                    <Prim name="sphere" type="Mesh"/>
                </Prim>
            </Layer>"#,
        )
        .unwrap();

        let mut stack = LayerStack::new();
        stack.push_weaker(over);
        stack.push_weaker(base);
        let stage = stack.compose().unwrap();

        let cube = stage.prim("/geo/cube").unwrap();
        assert_eq!(cube.type_name.as_deref(), Some("Mesh"));
        assert_eq!(
            cube.attribute("doubleSided").unwrap().value.as_deref(),
            Some("true")
        );

        let geo = stage.prim("/geo").unwrap();
        assert_eq!(geo.children, vec!["/geo/cube", "/geo/sphere"]);
        assert_eq!(stage.root_children(), &["/geo".to_string()]);
    }

    #[test]
    pub fn rejects_invalid_names() {
        let layer = parse_layer(r#"<Layer><Prim name="a/b"/></Layer>"#).unwrap();
        let mut stack = LayerStack::new();
        stack.push_weaker(layer);

        assert!(matches!(
            stack.compose(),
            Err(StageError::InvalidPrimName { .. })
        ));
    }

    #[test]
    pub fn empty_stack() {
        assert!(matches!(
            LayerStack::new().compose(),
            Err(StageError::EmptySource)
        ));
    }
}
