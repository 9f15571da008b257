use crate::scene::path::ScenePath;
use crate::scene::provider::SceneProvider;
use log::warn;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Characters that turn an object expression into a regular expression.
const REGEX_CHARACTERS: &str = ".*+|<>&-[](){}?$^\\";

pub const EXPRESSION_ATTRIBUTE: &str = "expression";
pub const ASSIGNMENT_PREFIX: &str = "assign:";

/// An object expression: either a literal path, matching itself and everything below it, or a
/// regular expression that has to match a whole object name.
#[derive(Clone, Debug)]
pub struct Expression {
    text: String,
    regex: Option<Regex>,
    /// Objects with shorter names can't match.
    min_size: usize,
}

impl Expression {
    pub fn new(text: &str) -> Self {
        if !text.contains(|c| REGEX_CHARACTERS.contains(c)) {
            return Self {
                text: text.to_string(),
                regex: None,
                min_size: text.len(),
            };
        }

        match Regex::new(&format!("^(?:{text})$")) {
            Ok(regex) => Self {
                text: text.to_string(),
                regex: Some(regex),
                min_size: literal_size(text),
            },
            Err(err) => {
                warn!("Treating invalid expression {text} as a plain path: {err}");
                Self {
                    text: text.to_string(),
                    regex: None,
                    min_size: text.len(),
                }
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Returns `Some(true)` for an exact match, `Some(false)` if this is a proper ancestor of `name`.
    pub fn parent_of(&self, name: &str) -> Option<bool> {
        if self.is_regex() || name.len() < self.min_size {
            return None;
        }

        let rest = name.strip_prefix(self.text.as_str())?;
        if rest.is_empty() {
            return Some(true);
        }

        // "/Hello" is no parent of "/HelloWorld"
        if rest.starts_with('/') || self.text.ends_with('/') {
            return Some(false);
        }

        None
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) if name.len() >= self.min_size => regex.is_match(name),
            _ => false,
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Expression {}

impl PartialOrd for Expression {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expression {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

/// Length of the expression text without bracketed groups and regex symbols.
fn literal_size(text: &str) -> usize {
    let mut depth = 0usize;
    let mut size = 0;
    for c in text.chars() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            _ if REGEX_CHARACTERS.contains(c) => {}
            _ => size += c.len_utf8(),
        }
    }
    size
}

/// Picks the value assigned to `name`: an exact path match wins, then the first matching regex,
/// then the closest ancestor path. The map is walked in reverse so deeper ancestors come first.
pub fn resolve_assignment<'a, T>(name: &str, expressions: &'a BTreeMap<Expression, T>) -> Option<&'a T> {
    let mut closest_parent = None;

    for (expression, value) in expressions.iter().rev() {
        if closest_parent.is_none() {
            if let Some(is_itself) = expression.parent_of(name) {
                if is_itself {
                    return Some(value);
                }
                closest_parent = Some(value);
            }
        }

        if expression.matches(name) {
            return Some(value);
        }
    }

    closest_parent
}

/// Documents can't store `/` inside of attribute names, so expressions are saved with `\` instead.
pub fn demangle(text: &str) -> String {
    text.replace('\\', "/")
}

/// Rewrites the backslash shorthands into explicit classes before [`demangle`] would break them.
pub fn convert_regex(text: &str) -> String {
    text.replace("\\d", "[0-9]")
        .replace("\\D", "[^0-9]")
        .replace("\\w", "[a-zA-Z0-9_]")
        .replace("\\W", "[^a-zA-Z0-9_]")
}

/// render layer -> (target -> material)
pub type AssignmentLayers = BTreeMap<String, BTreeMap<String, ScenePath>>;

/// What an expression prim declares: the pattern and the materials it assigns per layer and target.
#[derive(Debug, Clone)]
pub struct ExpressionDeclaration {
    pub expression: String,
    pub layers: AssignmentLayers,
}

impl ExpressionDeclaration {
    /// Reads the `expression` attribute and every `assign:<layer>:<target>` relationship.
    /// Malformed relationships are skipped.
    pub fn read(stage: &dyn SceneProvider, path: &ScenePath) -> Option<Self> {
        let expression = stage
            .attribute(path, EXPRESSION_ATTRIBUTE)?
            .default_value()?
            .as_str()?
            .to_string();

        let mut layers = AssignmentLayers::new();
        for relationship in stage.relationships(path) {
            let is_assignment = relationship
                .name
                .get(..ASSIGNMENT_PREFIX.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ASSIGNMENT_PREFIX));
            if !is_assignment {
                continue;
            }

            let segments: Vec<&str> = relationship.name.split(':').collect();
            let [_, layer, target] = segments.as_slice() else {
                warn!(
                    "Skipping assignment {} on {path}, expected assign:<layer>:<target>",
                    relationship.name
                );
                continue;
            };

            let Some(material) = relationship.targets.first() else {
                warn!("Skipping assignment {} on {path} without targets", relationship.name);
                continue;
            };

            layers
                .entry(layer.to_string())
                .or_default()
                .insert(target.to_string(), material.clone());
        }

        Some(Self { expression, layers })
    }
}
