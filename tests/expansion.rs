use glam::Vec3;
use stagebridge::io::stage::DocumentStageOpener;
use stagebridge::procedural::expand::{ExpansionSummary, expand};
use stagebridge::procedural::node_api::create_procedural_node;
use stagebridge::procedural::registry::{SessionError, SessionRegistry};
use stagebridge::rendering::native::memory::{NativeNode, NodeGraph};
use stagebridge::rendering::native::{ArrayData, ParamValue};
use stagebridge::scene::path::ScenePath;
use stagebridge::translator::{OverrideLayers, ProceduralContext};
use stagebridge::translator::attributes::RayMask;
use std::sync::Arc;

const SCENE: &str = include_str!("scene.xml");

fn expand_scene(overrides: &OverrideLayers, threads: usize) -> (Arc<NodeGraph>, ExpansionSummary) {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new().with_source("scene", SCENE);

    let root = create_procedural_node(graph.as_ref(), "root", "scene", "/", overrides, &[1.0]).unwrap();
    let summary = expand(root, graph.clone(), &registry, &opener, threads).unwrap();
    (graph, summary)
}

fn node(graph: &NodeGraph, name: &str) -> NativeNode {
    graph
        .node_by_name(name)
        .unwrap_or_else(|| panic!("No node called {name}"))
}

fn bound_shader(node: &NativeNode, parameter: &str) -> Option<ArrayData> {
    node.param(parameter)?.as_array().map(|array| array.data.clone())
}

#[test_log::test]
fn cube_gets_its_shader() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    let mesh = node(&graph, "scene:/geo/cube");
    assert_eq!(mesh.node_type, "polymesh");
    assert_eq!(mesh.param("visibility"), Some(&ParamValue::Byte(0)));
    assert_eq!(
        mesh.param("nsides").and_then(|nsides| nsides.as_array()).map(|nsides| &nsides.data),
        Some(&ArrayData::Byte(vec![4]))
    );
    assert_eq!(
        mesh.param("vidxs").and_then(|vidxs| vidxs.as_array()).map(|vidxs| &vidxs.data),
        Some(&ArrayData::UInt(vec![0, 1, 2, 3]))
    );

    let instance = node(&graph, "root:/geo/cube");
    assert_eq!(instance.node_type, "ginstance");
    assert_eq!(instance.param("node"), Some(&ParamValue::Node(mesh.handle)));
    assert_eq!(instance.param("visibility"), Some(&ParamValue::Byte(RayMask::ALL.bits())));

    let shader = node(&graph, "scene:/materials/m1/shader1");
    assert_eq!(shader.node_type, "standard_surface");
    assert_eq!(shader.param("base"), Some(&ParamValue::Float(0.8)));
    assert_eq!(bound_shader(&instance, "shader"), Some(ArrayData::Node(vec![shader.handle])));
}

#[test_log::test]
fn shader_connections() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    let texture = node(&graph, "scene:/materials/m1/tex");
    assert_eq!(
        texture.param("filename"),
        Some(&ParamValue::String("textures/brick.tx".to_string()))
    );

    let shader = node(&graph, "scene:/materials/m1/shader1");
    assert_eq!(shader.links.len(), 1);
    assert_eq!(shader.links[0].input, "base_color");
    assert_eq!(shader.links[0].source, texture.handle);
    assert_eq!(shader.links[0].output.as_deref(), Some("rgb"));
}

#[test_log::test]
fn visibility_overrides_are_combined() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    let ghost = node(&graph, "root:/geo/ghost");
    let expected = RayMask::ALL - RayMask::CAMERA - RayMask::SHADOW - RayMask::DIFFUSE_REFLECT;
    assert_eq!(ghost.param("visibility"), Some(&ParamValue::Byte(expected.bits())));
    assert_eq!(bound_shader(&ghost, "shader"), None);
}

#[test_log::test]
fn hidden_objects_become_placeholders() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    for name in ["root:/geo/hidden/leaf", "root:/geo/proxy"] {
        let placeholder = node(&graph, name);
        assert_eq!(placeholder.node_type, "points");
        assert_eq!(
            placeholder.param("visibility"),
            Some(&ParamValue::Byte(RayMask::VOLUME.bits()))
        );
    }

    // The data is still there, only the instance is replaced.
    assert_eq!(node(&graph, "scene:/geo/proxy").node_type, "polymesh");
}

#[test_log::test]
fn instances_share_the_prototype() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    let placeholder = node(&graph, "root:/geo/copy:proc");
    assert_eq!(
        placeholder.param("objectPath"),
        Some(&ParamValue::String("/proto".to_string()))
    );
    let ParamValue::Array(matrix) = placeholder.param("matrix").unwrap() else {
        panic!("matrix is not an array");
    };
    let ArrayData::Matrix(matrices) = &matrix.data else {
        panic!("matrix holds {:?}", matrix.data);
    };
    assert_eq!(matrices[0].transform_point3(Vec3::ZERO), Vec3::new(0.0, 0.0, 5.0));
    assert_eq!(placeholder.param("min"), Some(&ParamValue::Vector(Vec3::splat(-1.0))));
    assert_eq!(placeholder.param("max"), Some(&ParamValue::Vector(Vec3::splat(1.0))));

    let sphere = node(&graph, "scene:/proto/sphere");
    let instances: Vec<_> = graph
        .nodes_of_type("ginstance")
        .into_iter()
        .filter(|instance| instance.name.ends_with(":/proto/sphere"))
        .collect();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].param("node"), Some(&ParamValue::Node(sphere.handle)));

    // Assignments made to the instance reach inside the prototype.
    let shader = node(&graph, "scene:/materials/m1/shader1");
    assert_eq!(bound_shader(&instances[0], "shader"), Some(ArrayData::Node(vec![shader.handle])));
}

#[test_log::test]
fn point_instancer_outputs_one_procedural_per_point() {
    let (graph, _) = expand_scene(&OverrideLayers::default(), 1);

    for (id, x) in [0.0, 2.0, 4.0].into_iter().enumerate() {
        let placeholder = node(&graph, &format!("root:/geo/scatter/protos/pebble:proc_{id}"));
        assert_eq!(
            placeholder.param("objectPath"),
            Some(&ParamValue::String("/geo/scatter/protos/pebble".to_string()))
        );

        let Some(ParamValue::Array(matrix)) = placeholder.param("matrix") else {
            panic!("proc_{id} has no matrix");
        };
        let ArrayData::Matrix(matrices) = &matrix.data else {
            panic!("matrix holds {:?}", matrix.data);
        };
        assert_eq!(matrices[0].transform_point3(Vec3::ZERO), Vec3::new(x, 0.0, 0.0));
    }

    let pebble = node(&graph, "scene:/geo/scatter/protos/pebble");
    let instances: Vec<_> = graph
        .nodes_of_type("ginstance")
        .into_iter()
        .filter(|instance| instance.name.ends_with(":/geo/scatter/protos/pebble"))
        .collect();
    assert_eq!(instances.len(), 3);
    assert!(
        instances
            .iter()
            .all(|instance| instance.param("node") == Some(&ParamValue::Node(pebble.handle)))
    );
}

#[test_log::test]
fn expansion_totals() {
    let (graph, summary) = expand_scene(&OverrideLayers::default(), 1);

    // root, 6 objects below it, the prototype's sphere and 3 points
    assert_eq!(summary.procedurals, 11);
    assert_eq!(summary.nodes.len(), 26);
    assert_eq!(graph.len(), 27);
    assert_eq!(
        graph.type_histogram(),
        vec![
            ("ginstance".to_string(), 6),
            ("image".to_string(), 1),
            ("points".to_string(), 2),
            ("polymesh".to_string(), 6),
            ("stagebridge".to_string(), 11),
            ("standard_surface".to_string(), 1),
        ]
    );
}

#[test_log::test]
fn parallel_expansion_outputs_every_reference_once() {
    let (graph, summary) = expand_scene(&OverrideLayers::default(), 4);

    assert_eq!(summary.procedurals, 11);
    assert_eq!(graph.nodes_of_type("polymesh").len(), 6);
    assert_eq!(graph.nodes_of_type("standard_surface").len(), 1);
    assert_eq!(node(&graph, "root:/geo/cube").node_type, "ginstance");
}

#[test_log::test]
fn override_layers_are_applied() {
    let hide_cube = r#"<Layer>
        <Prim name="geo">
            <Prim name="cube">
                <Attribute name="visibility" type="token" value="invisible"/>
            </Prim>
        </Prim>
    </Layer>"#;
    let overrides = OverrideLayers::new("", "", "", hide_cube, "");
    let (graph, _) = expand_scene(&overrides, 1);

    assert_eq!(node(&graph, "root:/geo/cube").node_type, "points");

    // Nested procedurals have to find the same session again.
    let placeholder = node(&graph, "root:/geo/cube:proc");
    assert_eq!(
        placeholder.param("visibilityLayer"),
        Some(&ParamValue::String(hide_cube.to_string()))
    );
    assert_eq!(placeholder.param("sessionLayer"), None);
}

#[test_log::test]
fn procedurals_share_sessions() {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new().with_source("scene", SCENE);

    let first = create_procedural_node(graph.as_ref(), "a", "scene", "/geo/cube", &OverrideLayers::default(), &[1.0])
        .unwrap();
    let second = create_procedural_node(graph.as_ref(), "b", "scene", "/geo/cube", &OverrideLayers::default(), &[1.0])
        .unwrap();
    let summary_a = expand(first, graph.clone(), &registry, &opener, 1).unwrap();
    let summary_b = expand(second, graph.clone(), &registry, &opener, 1).unwrap();
    assert_eq!(registry.len(), 1);

    // The reference exists once, the second procedural only adds its instance.
    assert_eq!(summary_a.nodes.len(), 2);
    assert_eq!(summary_b.nodes.len(), 1);
    assert_eq!(node(&graph, "b:/geo/cube").node_type, "ginstance");

    let overrides = OverrideLayers::new("<Layer/>", "", "", "", "");
    let third = create_procedural_node(graph.as_ref(), "c", "scene", "/geo/cube", &overrides, &[1.0]).unwrap();
    expand(third, graph.clone(), &registry, &opener, 1).unwrap();
    assert_eq!(registry.len(), 2);

    registry.clear();
    assert!(registry.is_empty());
}

#[test_log::test]
fn shared_sessions_keep_shader_bindings() {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new().with_source("scene", SCENE);

    for name in ["a", "b"] {
        let root = create_procedural_node(graph.as_ref(), name, "scene", "/", &OverrideLayers::default(), &[1.0])
            .unwrap();
        expand(root, graph.clone(), &registry, &opener, 1).unwrap();
    }
    assert_eq!(registry.len(), 1);

    let shader = node(&graph, "scene:/materials/m1/shader1");
    let engine = registry.get_or_create("scene", &[], &opener, graph.clone()).unwrap();
    assert_eq!(
        engine.index().render_node(&ScenePath::new("/materials/m1/shader1")),
        Some(shader.handle)
    );

    for name in ["a:/geo/cube", "b:/geo/cube"] {
        assert_eq!(
            bound_shader(&node(&graph, name), "shader"),
            Some(ArrayData::Node(vec![shader.handle]))
        );
    }

    // Connecting the shader again for the second procedural doesn't stack links.
    assert_eq!(shader.links.len(), 1);
}

#[test_log::test]
fn empty_object_path_outputs_nothing() {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new().with_source("scene", SCENE);

    let root = create_procedural_node(graph.as_ref(), "root", "scene", "", &OverrideLayers::default(), &[]).unwrap();
    let summary = expand(root, graph.clone(), &registry, &opener, 1).unwrap();
    assert_eq!(summary.procedurals, 1);
    assert!(summary.nodes.is_empty());
}

#[test_log::test]
fn unknown_sources_fail() {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new();

    let root = create_procedural_node(
        graph.as_ref(),
        "root",
        "/no/such/scene.xml",
        "/",
        &OverrideLayers::default(),
        &[1.0],
    )
    .unwrap();
    assert!(matches!(
        expand(root, graph.clone(), &registry, &opener, 1),
        Err(SessionError::OpenFailed { .. })
    ));
    assert!(registry.is_empty());

    let empty = create_procedural_node(graph.as_ref(), "empty", "", "/", &OverrideLayers::default(), &[1.0]).unwrap();
    assert!(matches!(
        expand(empty, graph.clone(), &registry, &opener, 1),
        Err(SessionError::EmptySource)
    ));
}

#[test]
fn engine_outputs_references_before_instances() {
    let graph = Arc::new(NodeGraph::new());
    let registry = SessionRegistry::new();
    let opener = DocumentStageOpener::new().with_source("scene", SCENE);
    let engine = registry.get_or_create("scene", &[], &opener, graph.clone()).unwrap();

    let material = ScenePath::new("/materials/m1");
    let times = [1.0];
    let context = ProceduralContext::default();
    assert_eq!(engine.num_nodes(&material, &times), 4);

    // Shaders are created in the first half and handed out, connected, in the second.
    assert_eq!(engine.render(&material, 0, &times, &context), None);
    assert_eq!(engine.render(&material, 1, &times, &context), None);
    let shader = engine.render(&material, 2, &times, &context).unwrap();
    let texture = engine.render(&material, 3, &times, &context).unwrap();
    assert_eq!(node(&graph, "scene:/materials/m1/shader1").handle, shader);
    assert_eq!(node(&graph, "scene:/materials/m1/tex").handle, texture);
}
