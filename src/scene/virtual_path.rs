use crate::scene::path::{SEPARATOR, ScenePath};
use std::fmt::{Display, Formatter};

/// The name an object is known under after instancing: objects inside a prototype are addressed
/// through the path of the instance that led to them, so `/__Prototype_1/cube` becomes
/// `/geo/instance/cube` when reached via `/geo/instance`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Replaces the first path element with `prefix_path`. An empty prefix means the object is not instanced.
    pub fn join(prefix_path: &str, path: &ScenePath) -> Self {
        if prefix_path.is_empty() {
            return Self(path.as_str().to_string());
        }

        match path.as_str().get(1..).and_then(|rest| rest.find(SEPARATOR)) {
            Some(index) => Self(format!("{prefix_path}{}", &path.as_str()[index + 1..])),
            // The prototype root itself
            None => Self(prefix_path.to_string()),
        }
    }

    pub fn from_path(path: &ScenePath) -> Self {
        Self(path.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Strips the last element. `/a` yields the root, the root has no parent.
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
        }
    }
}

impl Display for VirtualPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn joins_prototype_paths() {
        let path = ScenePath::new("/__Prototype_1/cube/shape");
        assert_eq!(
            VirtualPath::join("/geo/instance", &path).as_str(),
            "/geo/instance/cube/shape"
        );
        assert_eq!(
            VirtualPath::join("", &path).as_str(),
            "/__Prototype_1/cube/shape"
        );
        assert_eq!(
            VirtualPath::join("/geo/instance", &ScenePath::new("/__Prototype_1")).as_str(),
            "/geo/instance"
        );
    }

    #[test]
    pub fn parents_end_at_root() {
        let mut path = Some(VirtualPath::join("", &ScenePath::new("/a/b")));
        let mut chain = Vec::new();
        while let Some(current) = path {
            chain.push(current.to_string());
            path = current.parent();
        }

        assert_eq!(chain, vec!["/a/b", "/a", "/"]);
    }
}
