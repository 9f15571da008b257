use anyhow::{Context, bail};
use clap::Parser;
use stagebridge::io::stage::DocumentStageOpener;
use stagebridge::procedural::expand::expand;
use stagebridge::procedural::node_api::{cleanup_plugin, create_procedural_node};
use stagebridge::procedural::registry::SessionRegistry;
use stagebridge::rendering::native::memory::NodeGraph;
use stagebridge::rendering::native::{NativeRenderer, ParamValue};
use stagebridge::scene::path::ScenePath;
use stagebridge::settings::{CliArgs, OperationMode};
use stagebridge::translator::OverrideLayers;
use std::sync::Arc;

const ROOT_NODE: &str = "root";

fn read_overrides(args: &CliArgs) -> anyhow::Result<OverrideLayers> {
    if args.overrides.len() > OverrideLayers::PARAMETERS.len() {
        bail!(
            "At most {} override documents are supported, got {}",
            OverrideLayers::PARAMETERS.len(),
            args.overrides.len()
        );
    }

    let mut layers = args
        .overrides
        .iter()
        .map(|file| std::fs::read_to_string(file).with_context(|| format!("Reading {}", file.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;
    layers.resize(OverrideLayers::PARAMETERS.len(), String::new());

    Ok(OverrideLayers::new(
        &layers[0], &layers[1], &layers[2], &layers[3], &layers[4],
    ))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    log::trace!("Starting with args: {:?}", args);

    let overrides = read_overrides(&args)?;
    let opener = DocumentStageOpener::new();
    let registry = SessionRegistry::global();
    let graph = Arc::new(NodeGraph::new());

    match &args.operation_mode {
        OperationMode::Expand { list } => {
            let root = create_procedural_node(
                graph.as_ref(),
                ROOT_NODE,
                &args.scene,
                &args.object_path,
                &overrides,
                &args.frames,
            )
            .context("Can't create the root procedural")?;

            if let Some(start) = args.motion_start {
                graph.set(root, "motion_start", ParamValue::Float(start));
            }
            if let Some(end) = args.motion_end {
                graph.set(root, "motion_end", ParamValue::Float(end));
            }

            let summary = expand(root, graph.clone(), registry, &opener, args.threads)?;
            println!(
                "Expanded {} procedurals into {} nodes",
                summary.procedurals,
                summary.nodes.len()
            );

            if *list {
                for node in summary.nodes.iter().filter_map(|handle| graph.node(*handle)) {
                    println!("{:>12} {}", node.node_type, node.name);
                }
            } else {
                for (node_type, count) in graph.type_histogram() {
                    println!("{node_type:>12} {count}");
                }
            }
        }
        OperationMode::Assignments {
            objects,
            layer,
            target,
        } => {
            let engine = registry.get_or_create(&args.scene, &overrides.to_vec(), &opener, graph.clone())?;
            engine.prepare(&ScenePath::root());

            for object in objects {
                match engine.index().resolve_assignment(layer, target, object) {
                    Some(assigned) => println!("{object} -> {assigned}"),
                    None => println!("{object} -> (none)"),
                }
            }
        }
    }

    cleanup_plugin(registry);
    Ok(())
}
