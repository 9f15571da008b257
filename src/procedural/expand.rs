use crate::procedural::node_api::ProceduralInstance;
use crate::procedural::registry::{SessionError, SessionRegistry, StageOpener};
use crate::rendering::native::{NativeRenderer, NodeHandle};
use crate::translator::PROCEDURAL_NODE_TYPE;
use log::{debug, error, warn};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ExpansionSummary {
    /// Procedurals that have been expanded, the root included.
    pub procedurals: usize,
    /// Every node handed out, in expansion order.
    pub nodes: Vec<NodeHandle>,
}

/// Asks one procedural for all of its nodes, in id order.
fn expand_one(instance: &ProceduralInstance) -> Vec<NodeHandle> {
    let count = instance.num_nodes();
    (0..count).filter_map(|id| instance.get_node(id)).collect()
}

/// Expands `root` and every procedural it outputs, the way a renderer would: one generation after
/// the other, the procedurals of a generation spread over `threads` workers.
pub fn expand(
    root: NodeHandle,
    renderer: Arc<dyn NativeRenderer>,
    registry: &SessionRegistry,
    opener: &dyn StageOpener,
    threads: usize,
) -> Result<ExpansionSummary, SessionError> {
    let threads = threads.max(1);
    let mut summary = ExpansionSummary::default();
    let mut generation = vec![ProceduralInstance::init(root, renderer.clone(), registry, opener)?];

    while !generation.is_empty() {
        debug!("Expanding {} procedurals", generation.len());
        summary.procedurals += generation.len();

        let chunk_size = generation.len().div_ceil(threads);
        let outputs: Vec<NodeHandle> = std::thread::scope(|scope| {
            let workers: Vec<_> = generation
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || chunk.iter().flat_map(expand_one).collect::<Vec<_>>()))
                .collect();

            workers
                .into_iter()
                .flat_map(|worker| match worker.join() {
                    Ok(nodes) => nodes,
                    Err(_) => {
                        error!("An expansion worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        // The nested procedurals of a broken child are lost, the rest of the scene still expands.
        generation = outputs
            .iter()
            .filter(|node| renderer.node_type(**node).as_deref() == Some(PROCEDURAL_NODE_TYPE))
            .filter_map(
                |node| match ProceduralInstance::init(*node, renderer.clone(), registry, opener) {
                    Ok(instance) => Some(instance),
                    Err(err) => {
                        warn!("Skipping procedural {node:?}: {err}");
                        None
                    }
                },
            )
            .collect();

        summary.nodes.extend(outputs);
    }

    Ok(summary)
}
