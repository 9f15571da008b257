use crate::procedural::index::{RendererIndex, SHADER_TARGET, SURFACE_TARGET};
use crate::scene::expression::{AssignmentLayers, Expression, convert_regex, demangle, resolve_assignment};
use crate::scene::path::ScenePath;
use log::trace;

impl RendererIndex {
    /// Records what an expression prim assigns. `expression` is the raw (possibly mangled) text,
    /// anchored below `root`. Materials are resolved to the shader they provide for each target
    /// where possible. Existing assignments are never replaced.
    pub fn insert_expression(
        &self,
        declaring_path: &ScenePath,
        root: &ScenePath,
        expression: &str,
        layers: &AssignmentLayers,
    ) {
        let root_text = root.as_str().strip_suffix('/').unwrap_or(root.as_str());
        let full_expression = format!("{root_text}{}", demangle(&convert_regex(expression)));
        let expression = Expression::new(&full_expression);

        for (layer, targets) in layers {
            for (target, material) in targets {
                let key = (layer.clone(), target.clone());
                let known = self
                    .assignments
                    .get(&key)
                    .is_some_and(|assignments| assignments.contains_key(&expression));
                if known {
                    continue;
                }

                let mut value = self
                    .material_shader(material, target)
                    .unwrap_or_else(|| material.clone());

                if value.parent().as_ref() == Some(declaring_path) {
                    value = value.make_relative(declaring_path);
                }

                trace!("{full_expression} [{layer}:{target}] -> {value}");
                self.assignments
                    .entry(key)
                    .or_default()
                    .entry(expression.clone())
                    .or_insert(value);
            }
        }
    }

    /// The object assigned to `name` for this layer and target, if any.
    pub fn resolve_assignment(&self, layer: &str, target: &str, name: &str) -> Option<ScenePath> {
        let assignments = self
            .assignments
            .get(&(layer.to_string(), target.to_string()))?;
        resolve_assignment(name, &assignments).cloned()
    }

    pub fn insert_material(&self, material: &ScenePath, target: &str, shader: &ScenePath) {
        self.materials
            .entry(material.clone())
            .or_default()
            .insert(target.to_string(), shader.clone());
    }

    /// What `material` provides for `target`. Materials without a `shader` fall back to their `surface`.
    pub fn material_shader(&self, material: &ScenePath, target: &str) -> Option<ScenePath> {
        let targets = self.materials.get(material)?;
        targets
            .get(target)
            .or_else(|| match target {
                SHADER_TARGET => targets.get(SURFACE_TARGET),
                _ => None,
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use crate::procedural::index::{DEFAULT_RENDER_LAYER, RendererIndex, SHADER_TARGET, SURFACE_TARGET};
    use crate::scene::expression::AssignmentLayers;
    use crate::scene::path::ScenePath;

    fn layers(entries: &[(&str, &str)]) -> AssignmentLayers {
        let mut layers = AssignmentLayers::new();
        let targets = layers.entry(DEFAULT_RENDER_LAYER.to_string()).or_default();
        for (target, material) in entries {
            targets.insert(target.to_string(), ScenePath::new(*material));
        }
        layers
    }

    #[test]
    pub fn shader_edges_win_over_surfaces() {
        let index = RendererIndex::new();
        let both = ScenePath::new("/materials/both");
        index.insert_material(&both, SURFACE_TARGET, &ScenePath::new("/materials/both/surface"));
        index.insert_material(&both, SHADER_TARGET, &ScenePath::new("/materials/both/shader"));
        assert_eq!(
            index.material_shader(&both, SHADER_TARGET),
            Some(ScenePath::new("/materials/both/shader"))
        );
        assert_eq!(
            index.material_shader(&both, SURFACE_TARGET),
            Some(ScenePath::new("/materials/both/surface"))
        );

        let direct = ScenePath::new("/materials/direct");
        index.insert_material(&direct, SHADER_TARGET, &ScenePath::new("/materials/direct/shader"));
        assert_eq!(
            index.material_shader(&direct, SHADER_TARGET),
            Some(ScenePath::new("/materials/direct/shader"))
        );
        assert_eq!(index.material_shader(&direct, "displacement"), None);

        index.insert_expression(
            &ScenePath::new("/materials/expr"),
            &ScenePath::root(),
            "/geo/cube",
            &layers(&[(SHADER_TARGET, "/materials/both")]),
        );
        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, SHADER_TARGET, "/geo/cube"),
            Some(ScenePath::new("/materials/both/shader"))
        );
    }

    #[test]
    pub fn materials_resolve_to_shaders() {
        let index = RendererIndex::new();
        let material = ScenePath::new("/materials/m1");
        index.insert_material(&material, "surface", &ScenePath::new("/materials/m1/shader1"));

        index.insert_expression(
            &ScenePath::new("/materials/expr"),
            &ScenePath::root(),
            "/geo/cube",
            &layers(&[("shader", "/materials/m1")]),
        );

        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/geo/cube"),
            Some(ScenePath::new("/materials/m1/shader1"))
        );
        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/geo/cube/inner"),
            Some(ScenePath::new("/materials/m1/shader1"))
        );
        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "displacement", "/geo/cube"),
            None
        );
    }

    #[test]
    pub fn unresolved_materials_are_kept() {
        let index = RendererIndex::new();
        index.insert_expression(
            &ScenePath::new("/materials/expr"),
            &ScenePath::root(),
            "/geo/cube",
            &layers(&[("displacement", "/materials/m2")]),
        );

        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "displacement", "/geo/cube"),
            Some(ScenePath::new("/materials/m2"))
        );
    }

    #[test]
    pub fn first_assignment_wins() {
        let index = RendererIndex::new();
        let declaring = ScenePath::new("/materials/expr");
        index.insert_expression(&declaring, &ScenePath::root(), "/geo/.*", &layers(&[("shader", "/a")]));
        index.insert_expression(&declaring, &ScenePath::root(), "/geo/.*", &layers(&[("shader", "/b")]));

        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/geo/sphere"),
            Some(ScenePath::new("/a"))
        );
    }

    #[test]
    pub fn mangled_expressions_are_anchored() {
        let index = RendererIndex::new();
        index.insert_expression(
            &ScenePath::new("/asset/materials/expr"),
            &ScenePath::new("/asset/"),
            "\\geo\\cube\\d",
            &layers(&[("shader", "/asset/materials/m1")]),
        );

        assert!(
            index
                .resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/asset/geo/cube7")
                .is_some()
        );
        assert!(
            index
                .resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/asset/geo/cubeA")
                .is_none()
        );
    }

    #[test]
    pub fn values_below_the_declaring_prim_become_relative() {
        let index = RendererIndex::new();
        let declaring = ScenePath::new("/materials/expr");
        index.insert_expression(
            &declaring,
            &ScenePath::root(),
            "/geo/cube",
            &layers(&[("shader", "/materials/expr/local")]),
        );

        assert_eq!(
            index.resolve_assignment(DEFAULT_RENDER_LAYER, "shader", "/geo/cube"),
            Some(ScenePath::new("local"))
        );
    }
}
