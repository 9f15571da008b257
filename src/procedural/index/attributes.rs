use crate::procedural::index::{ATTRIBUTE_TARGET, RendererIndex};
use crate::scene::path::ScenePath;
use crate::scene::virtual_path::VirtualPath;
use crate::translator::attributes::{NameToAttribute, RendererAttribute};
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl RendererIndex {
    /// Adds an attribute to the override object `override_path`. The first value for a name is kept.
    pub fn insert_attribute(&self, override_path: &ScenePath, name: &str, attribute: RendererAttribute) {
        self.attributes
            .entry(override_path.clone())
            .or_default()
            .entry(name.to_string())
            .or_insert(attribute);
    }

    pub fn attributes(&self, override_path: &ScenePath) -> Option<NameToAttribute> {
        self.attributes
            .get(override_path)
            .map(|attributes| attributes.clone())
    }

    /// All attributes that apply to `name`: the ones of the override assigned to it, plus everything
    /// inherited from its ancestors where it doesn't define the attribute itself. The result is
    /// computed once per name and shared afterwards.
    pub fn object_attributes(&self, name: &VirtualPath, layer: &str) -> Arc<NameToAttribute> {
        if let Some(cached) = self.merged_attributes.get(name) {
            return cached.value().clone();
        }

        self.override_lookups.fetch_add(1, Ordering::Relaxed);
        let mut merged = self
            .resolve_assignment(layer, ATTRIBUTE_TARGET, name.as_str())
            .and_then(|override_path| self.attributes(&override_path))
            .unwrap_or_default();

        // No lock is held while walking up, the parent may be computed by another thread right now.
        if let Some(parent) = name.parent() {
            let inherited = self.object_attributes(&parent, layer);
            for (attribute_name, attribute) in inherited.iter() {
                merged
                    .entry(attribute_name.clone())
                    .or_insert_with(|| attribute.clone());
            }
        }

        let published = self
            .merged_attributes
            .entry(name.clone())
            .or_insert_with(|| Arc::new(merged));
        published.value().clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::procedural::index::{ATTRIBUTE_TARGET, DEFAULT_RENDER_LAYER, RendererIndex};
    use crate::rendering::native::ParamValue;
    use crate::scene::expression::AssignmentLayers;
    use crate::scene::path::ScenePath;
    use crate::scene::virtual_path::VirtualPath;
    use crate::translator::attributes::{RayMask, RendererAttribute};

    fn assign(index: &RendererIndex, expression: &str, override_path: &str) {
        let mut layers = AssignmentLayers::new();
        layers
            .entry(DEFAULT_RENDER_LAYER.to_string())
            .or_default()
            .insert(ATTRIBUTE_TARGET.to_string(), ScenePath::new(override_path));
        index.insert_expression(
            &ScenePath::new("/materials/expr"),
            &ScenePath::root(),
            expression,
            &layers,
        );
    }

    fn float(name: &str, value: f32) -> RendererAttribute {
        RendererAttribute::Parameter {
            name: name.to_string(),
            value: ParamValue::Float(value),
        }
    }

    #[test]
    pub fn first_attribute_wins() {
        let index = RendererIndex::new();
        let path = ScenePath::new("/materials/ovr");
        index.insert_attribute(&path, "roughness", float("roughness", 0.1));
        index.insert_attribute(&path, "roughness", float("roughness", 0.9));

        assert_eq!(
            index.attributes(&path).unwrap()["roughness"],
            float("roughness", 0.1)
        );
    }

    #[test]
    pub fn inherits_and_memoizes() {
        let index = RendererIndex::new();
        let parent_override = ScenePath::new("/materials/parent_ovr");
        let child_override = ScenePath::new("/materials/child_ovr");

        index.insert_attribute(&parent_override, "casts_shadows", RendererAttribute::Visibility(RayMask::ALL - RayMask::SHADOW));
        index.insert_attribute(&parent_override, "roughness", float("roughness", 0.5));
        index.insert_attribute(&child_override, "roughness", float("roughness", 0.2));

        assign(&index, "/a", "/materials/parent_ovr");
        assign(&index, "/a/b", "/materials/child_ovr");

        let name = VirtualPath::from_path(&ScenePath::new("/a/b"));
        let merged = index.object_attributes(&name, DEFAULT_RENDER_LAYER);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["roughness"], float("roughness", 0.2));
        assert!(merged["casts_shadows"].is_visibility());

        // "/a/b", "/a" and "/"
        let lookups = index.override_lookups();
        assert_eq!(lookups, 3);

        let again = index.object_attributes(&name, DEFAULT_RENDER_LAYER);
        assert_eq!(index.override_lookups(), lookups);
        assert!(std::sync::Arc::ptr_eq(&merged, &again));

        // The parent is already cached as well
        let parent = index.object_attributes(&VirtualPath::from_path(&ScenePath::new("/a")), DEFAULT_RENDER_LAYER);
        assert_eq!(index.override_lookups(), lookups);
        assert_eq!(parent["roughness"], float("roughness", 0.5));
    }

    #[test]
    pub fn objects_without_overrides() {
        let index = RendererIndex::new();
        let merged = index.object_attributes(
            &VirtualPath::from_path(&ScenePath::new("/geo/cube")),
            DEFAULT_RENDER_LAYER,
        );
        assert!(merged.is_empty());
    }
}
