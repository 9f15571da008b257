use crate::scene::path::ScenePath;
use crate::scene::value::{Attribute, Relationship};
use glam::{Mat4, Vec3};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimKind {
    PseudoRoot,
    Xform,
    Scope,
    Mesh,
    Curves,
    PointInstancer,
    Shader,
    Material,
    /// An assignment declaration, see [`crate::scene::expression::ExpressionDeclaration`]
    Expression,
    Other(String),
}

impl PrimKind {
    pub fn from_type_name(type_name: Option<&str>) -> Self {
        match type_name {
            None | Some("") => PrimKind::Other(String::new()),
            Some("Xform") => PrimKind::Xform,
            Some("Scope") => PrimKind::Scope,
            Some("Mesh") => PrimKind::Mesh,
            Some("BasisCurves") | Some("Curves") => PrimKind::Curves,
            Some("PointInstancer") => PrimKind::PointInstancer,
            Some("Shader") => PrimKind::Shader,
            Some("Material") => PrimKind::Material,
            Some("Expression") => PrimKind::Expression,
            Some(other) => PrimKind::Other(other.to_string()),
        }
    }

    /// Whether the kind takes part in transforms, visibility and purpose.
    pub fn is_imageable(&self) -> bool {
        matches!(
            self,
            PrimKind::Xform | PrimKind::Mesh | PrimKind::Curves | PrimKind::PointInstancer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Purpose {
    #[default]
    Default,
    Render,
    Proxy,
    Guide,
}

impl Purpose {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "default" => Some(Self::Default),
            "render" => Some(Self::Render),
            "proxy" => Some(Self::Proxy),
            "guide" => Some(Self::Guide),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().fold(
            BoundingBox {
                min: first,
                max: first,
            },
            |bound, point| BoundingBox {
                min: bound.min.min(*point),
                max: bound.max.max(*point),
            },
        ))
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
        .map(|corner| matrix.transform_point3(corner));

        // corners is never empty
        BoundingBox::from_points(&corners).unwrap_or(*self)
    }
}

/// Read access to a composed scene. Implementations have to be shareable between the worker
/// threads of the host renderer.
pub trait SceneProvider: Send + Sync {
    /// Identifies the composed scene, e.g. to give native nodes session-unique names.
    fn identifier(&self) -> &str;

    /// `None` if there is no prim at `path`.
    fn kind(&self, path: &ScenePath) -> Option<PrimKind>;

    fn children(&self, path: &ScenePath) -> Vec<ScenePath>;

    /// The prototype an instance prim refers to, `None` for every other prim.
    fn prototype(&self, path: &ScenePath) -> Option<ScenePath>;

    fn attributes(&self, path: &ScenePath) -> Vec<Arc<Attribute>>;

    fn attribute(&self, path: &ScenePath, name: &str) -> Option<Arc<Attribute>> {
        self.attributes(path)
            .into_iter()
            .find(|attribute| attribute.name == name)
    }

    fn relationships(&self, path: &ScenePath) -> Vec<Relationship>;

    /// `None` if neither the prim nor any of its ancestors are imageable.
    fn local_to_world(&self, path: &ScenePath, time: f32) -> Option<Mat4>;

    /// The untransformed bounds of everything below `path`.
    fn bound(&self, path: &ScenePath, time: f32) -> Option<BoundingBox>;

    /// The computed (inherited) visibility.
    fn is_invisible(&self, path: &ScenePath, time: f32) -> bool;

    /// The computed (inherited) purpose.
    fn purpose(&self, path: &ScenePath) -> Purpose;

    fn exists(&self, path: &ScenePath) -> bool {
        self.kind(path).is_some()
    }

    fn is_instance(&self, path: &ScenePath) -> bool {
        self.prototype(path).is_some()
    }

    /// `root` and everything below it in depth-first pre-order, without descending into instances.
    fn subtree(&self, root: &ScenePath) -> Vec<ScenePath> {
        let mut result = Vec::new();
        if !self.exists(root) {
            return result;
        }

        let mut stack = vec![root.clone()];
        while let Some(path) = stack.pop() {
            if !self.is_instance(&path) {
                stack.extend(self.children(&path).into_iter().rev());
            }
            result.push(path);
        }

        result
    }
}
