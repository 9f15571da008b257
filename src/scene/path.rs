use std::borrow::Borrow;
use std::fmt::{Debug, Display, Formatter};

pub const SEPARATOR: char = '/';
pub const PROPERTY_DELIMITER: char = '.';

/// A hierarchical identifier such as `/geo/cube`. Paths without a leading separator are relative
/// to some anchor and only ever occur as assignment values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ScenePath(String);

impl ScenePath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn new<S: Into<String>>(path: S) -> Self {
        let mut path = path.into();
        while path.len() > 1 && path.ends_with(SEPARATOR) {
            path.pop();
        }
        Self(path)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    /// The last path element, empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(index) => &self.0[index + 1..],
            None => &self.0,
        }
    }

    pub fn parent(&self) -> Option<ScenePath> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind(SEPARATOR) {
            Some(0) => Some(Self::root()),
            Some(index) => Some(Self(self.0[..index].to_string())),
            None => None,
        }
    }

    /// True if `prefix` is this path or one of its ancestors. `/a` is a prefix of `/a/b` but not of `/ab`.
    pub fn has_prefix(&self, prefix: &ScenePath) -> bool {
        if prefix.is_root() {
            return self.is_absolute();
        }

        match self.0.strip_prefix(prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// Expresses this path relative to `anchor`, or returns it unchanged if `anchor` isn't a strict ancestor.
    pub fn make_relative(&self, anchor: &ScenePath) -> ScenePath {
        if self == anchor || !self.has_prefix(anchor) {
            return self.clone();
        }

        let rest = if anchor.is_root() {
            &self.0[1..]
        } else {
            &self.0[anchor.0.len() + 1..]
        };
        Self(rest.to_string())
    }

    pub fn append_child(&self, name: &str) -> ScenePath {
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// `/a/b` + `message` = `/a/b.message`
    pub fn append_property(&self, property: &str) -> ScenePath {
        Self(format!("{}{PROPERTY_DELIMITER}{property}", self.0))
    }

    /// Splits `/a/b.outputs:rgb` into the prim path and the property name.
    pub fn split_property(text: &str) -> (ScenePath, Option<&str>) {
        let last_element = text.rfind(SEPARATOR).unwrap_or(0);
        match text[last_element..].find(PROPERTY_DELIMITER) {
            Some(index) => (
                ScenePath::new(&text[..last_element + index]),
                Some(&text[last_element + index + 1..]),
            ),
            None => (ScenePath::new(text), None),
        }
    }
}

impl Display for ScenePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for ScenePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

impl From<&str> for ScenePath {
    fn from(value: &str) -> Self {
        ScenePath::new(value)
    }
}

impl From<String> for ScenePath {
    fn from(value: String) -> Self {
        ScenePath::new(value)
    }
}

impl Borrow<str> for ScenePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ScenePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn parents() {
        assert_eq!(ScenePath::new("/a/b").parent(), Some(ScenePath::new("/a")));
        assert_eq!(ScenePath::new("/a").parent(), Some(ScenePath::root()));
        assert_eq!(ScenePath::root().parent(), None);
        assert_eq!(ScenePath::new("/a/b/").as_str(), "/a/b");
    }

    #[test]
    pub fn prefixes() {
        let a = ScenePath::new("/a");
        assert!(ScenePath::new("/a/b").has_prefix(&a));
        assert!(a.has_prefix(&a));
        assert!(!ScenePath::new("/ab").has_prefix(&a));
        assert!(a.has_prefix(&ScenePath::root()));
    }

    #[test]
    pub fn relative() {
        let anchor = ScenePath::new("/materials/expr");
        assert_eq!(
            ScenePath::new("/materials/expr/shader").make_relative(&anchor).as_str(),
            "shader"
        );
        assert_eq!(
            ScenePath::new("/materials/other").make_relative(&anchor).as_str(),
            "/materials/other"
        );
    }

    #[test]
    pub fn properties() {
        let (path, property) = ScenePath::split_property("/materials/m1/tex.outputs:rgb");
        assert_eq!(path.as_str(), "/materials/m1/tex");
        assert_eq!(property, Some("outputs:rgb"));

        let (path, property) = ScenePath::split_property("/materials/m1/tex");
        assert_eq!(path.as_str(), "/materials/m1/tex");
        assert_eq!(property, None);

        assert_eq!(
            ScenePath::new("/a/disp").append_property("message").as_str(),
            "/a/disp.message"
        );
    }
}
