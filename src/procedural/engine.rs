use crate::procedural::delegate::RendererDelegate;
use crate::procedural::index::RendererIndex;
use crate::rendering::native::{NativeRenderer, NodeHandle};
use crate::scene::path::ScenePath;
use crate::scene::provider::{PrimKind, SceneProvider};
use crate::translator::{ProceduralContext, Translator};
use crate::util::mean_time;
use log::trace;
use std::sync::Arc;

/// One opened scene with everything learned about it: the index, the walker filling it and the
/// translator reading it.
pub struct RendererEngine {
    stage: Arc<dyn SceneProvider>,
    index: RendererIndex,
    delegate: RendererDelegate,
    translator: Translator,
}

impl RendererEngine {
    pub fn new(stage: Arc<dyn SceneProvider>, renderer: Arc<dyn NativeRenderer>) -> Self {
        Self {
            translator: Translator::new(stage.clone(), renderer),
            stage,
            index: RendererIndex::new(),
            delegate: RendererDelegate::new(),
        }
    }

    pub fn stage(&self) -> &dyn SceneProvider {
        self.stage.as_ref()
    }

    pub fn index(&self) -> &RendererIndex {
        &self.index
    }

    pub fn delegate(&self) -> &RendererDelegate {
        &self.delegate
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn prepare(&self, root: &ScenePath) {
        self.delegate.populate(root, &self.index, &self.translator);
    }

    /// How many nodes the procedural at `path` outputs. Every object is output twice: once as the
    /// reference holding the data and once as the instance drawing it.
    pub fn num_nodes(&self, path: &ScenePath, times: &[f32]) -> usize {
        match self.stage.kind(path) {
            None => 0,
            Some(PrimKind::PointInstancer) => {
                let time = mean_time(times);
                self.stage
                    .attribute(path, "positions")
                    .and_then(|positions| positions.value_at(time)?.array_len())
                    .unwrap_or(0)
            }
            Some(_) => {
                self.prepare(path);
                2 * self.index.num_nodes(path)
            }
        }
    }

    /// Outputs the node `id` of the procedural at `path`. The first half of the ids are the
    /// references, the second half the instances, both in the order the objects have been found.
    pub fn render(
        &self,
        path: &ScenePath,
        id: usize,
        times: &[f32],
        context: &ProceduralContext,
    ) -> Option<NodeHandle> {
        if self.stage.kind(path) == Some(PrimKind::PointInstancer) {
            return self
                .translator
                .output_bbox_from_point(path, id, times, context, &self.index);
        }

        let count = self.index.num_nodes(path);
        if count == 0 {
            return None;
        }

        let real_id = id % count;
        let variant = id / count;

        let child = self.index.nth_child(path, real_id)?;
        trace!("{path} [{id}]: {child} variant {variant}");

        // Only ever registered when asked for explicitly. The expansion continues inside the prototype.
        if self.stage.is_instance(&child) {
            if variant == 0 {
                return self.translator.output_bbox(&child, times, context, &self.index);
            }
            return None;
        }

        if self.translator.is_immediate(&child) {
            if variant == 0 {
                // First pass: a bare node, nothing to connect it to yet. Shading may have reserved
                // the slot already without finding a node, so only a resolved slot is skipped.
                if self.index.render_node(&child).is_some() {
                    return None;
                }

                if let Some(node) = self
                    .translator
                    .output_reference(&child, times, context, &self.index)
                {
                    self.index.publish_render_node(&child, node);
                }
                return None;
            }

            let node = self.index.render_node(&child)?;
            self.translator
                .establish_connections(&child, node, &self.index);
            return Some(node);
        }

        if &child == path {
            if variant == 0 {
                if !self.index.reserve_render_node(&child) {
                    return None;
                }

                // A failed creation leaves the slot reserved, the instances are skipped then.
                let node = self
                    .translator
                    .output_reference(&child, times, context, &self.index)?;
                self.index.publish_render_node(&child, node);
                return Some(node);
            }

            let reference = self.index.render_node(&child)?;
            return self
                .translator
                .render(&child, times, reference, context, &self.index);
        }

        if variant == 0 {
            return self.translator.output_bbox(&child, times, context, &self.index);
        }

        None
    }
}
