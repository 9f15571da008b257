use crate::procedural::index::{ATTRIBUTE_TARGET, RendererIndex};
use crate::scene::expression::ExpressionDeclaration;
use crate::scene::path::ScenePath;
use crate::scene::provider::PrimKind;
use crate::translator::Translator;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Namespace of the material attributes the walker cares about.
const RENDERER_NAMESPACE: &str = "arnold";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateState {
    NotStarted,
    InProgress,
    Done,
}

/// Fills the [`RendererIndex`] with everything below a root, once per root.
pub struct RendererDelegate {
    populated: DashMap<ScenePath, PopulateState>,
    traversals: AtomicUsize,
}

impl RendererDelegate {
    pub fn new() -> Self {
        Self {
            populated: DashMap::with_capacity(100),
            traversals: AtomicUsize::new(0),
        }
    }

    pub fn state(&self, root: &ScenePath) -> PopulateState {
        self.populated
            .get(root)
            .map(|state| *state)
            .unwrap_or(PopulateState::NotStarted)
    }

    /// Number of traversals that actually ran.
    pub fn traversals(&self) -> usize {
        self.traversals.load(Ordering::Relaxed)
    }

    /// Only the first caller for a root gets to walk it. Everybody else returns immediately,
    /// even while the walk is still running.
    fn try_claim(&self, root: &ScenePath) -> bool {
        match self.populated.entry(root.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(PopulateState::InProgress);
                true
            }
        }
    }

    pub fn populate(&self, root: &ScenePath, index: &RendererIndex, translator: &Translator) {
        let stage = translator.stage();

        // Has to be queried before we register anything below root ourselves.
        let children_known = index.is_children_known(root);

        if !self.try_claim(root) {
            trace!("{root} is already populated");
            return;
        }

        self.traversals.fetch_add(1, Ordering::Relaxed);
        debug!("Populating {root}");

        for path in stage.subtree(root) {
            let Some(kind) = stage.kind(&path) else {
                continue;
            };

            // Expressions need all the materials, they're handled after the walk.
            if kind == PrimKind::Expression {
                continue;
            }

            // Rendered by a nested expansion of one of its ancestors.
            if index.is_parent_known(root, &path) {
                continue;
            }

            // A prim can be reached from several roots, e.g. through point instancers. It must be
            // output only once, but it may still be registered below another root.
            let mut skip_later = false;
            if &path != root && index.is_processed(&path) {
                if children_known {
                    continue;
                }
                skip_later = true;
            }

            if translator.is_supported(&path) || translator.is_immediate(&path) {
                index.insert_prim(root, &path);
            }

            if skip_later {
                continue;
            }

            if kind == PrimKind::Material {
                self.scan_material(&path, index, translator);
            }
        }

        self.populate_assignments(index, translator);

        self.populated.insert(root.clone(), PopulateState::Done);
        debug!("Populated {root} with {} nodes", index.num_nodes(root));
    }

    /// `arnold:<target>` connections become material edges, unconnected `arnold:attribute:*` and
    /// two-segment `arnold:*` values become overrides.
    fn scan_material(&self, path: &ScenePath, index: &RendererIndex, translator: &Translator) {
        for attribute in translator.stage().attributes(path) {
            let segments = attribute.name_segments();
            let [render, target, ..] = segments.as_slice() else {
                continue;
            };

            if *render != RENDERER_NAMESPACE {
                continue;
            }

            match &attribute.connection {
                Some(connection) => index.insert_material(path, target, &connection.source),
                None => {
                    if *target != ATTRIBUTE_TARGET && segments.len() >= 3 {
                        continue;
                    }

                    if let Some(renderer_attribute) = translator.create_renderer_attribute(&attribute) {
                        index.insert_attribute(path, attribute.base_name(), renderer_attribute);
                    }
                }
            }
        }
    }

    /// Expressions may assign materials from anywhere, so they're read from the whole scene as soon
    /// as the global materials are known, and only once.
    fn populate_assignments(&self, index: &RendererIndex, translator: &Translator) {
        if !index.has_global_materials() || index.is_assignment_done() {
            return;
        }

        let stage = translator.stage();
        let root = ScenePath::root();
        for path in stage.subtree(&root) {
            if stage.kind(&path) != Some(PrimKind::Expression) {
                continue;
            }

            let Some(declaration) = ExpressionDeclaration::read(stage, &path) else {
                warn!("Skipping expression {path} without an expression text");
                continue;
            };

            index.insert_expression(&path, &root, &declaration.expression, &declaration.layers);
        }

        index.mark_assignment_done();
    }
}

impl Default for RendererDelegate {
    fn default() -> Self {
        Self::new()
    }
}
