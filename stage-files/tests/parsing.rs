use stage_files::compose::LayerStack;
use stage_files::typedefs::{LayerItem, PrimItem};
use stage_files::{StageError, deserialize_layer, parse_layer};

#[test]
fn parse_shot() -> anyhow::Result<()> {
    let layer = parse_layer(include_str!("shot.xml"))?;
    assert_eq!(layer.elements.len(), 4);
    assert!(matches!(layer.elements[2], LayerItem::Prototype(_)));

    let LayerItem::Prim(geo) = &layer.elements[0] else {
        panic!("Expected a prim, got {:?}", layer.elements[0]);
    };
    assert_eq!(geo.name, "geo");
    assert_eq!(geo.type_name.as_deref(), Some("Xform"));

    let cube = geo
        .elements
        .iter()
        .find_map(|item| match item {
            PrimItem::Prim(prim) => Some(prim),
            _ => None,
        })
        .expect("cube");

    let points = cube
        .elements
        .iter()
        .find_map(|item| match item {
            PrimItem::Attribute(attribute) if attribute.name == "points" => Some(attribute),
            _ => None,
        })
        .expect("points");
    assert_eq!(points.value, None);
    assert_eq!(points.samples().map(|sample| sample.time).collect::<Vec<_>>(), vec![1.0, 2.0]);

    let st = cube
        .elements
        .iter()
        .find_map(|item| match item {
            PrimItem::Attribute(attribute) if attribute.name == "primvars:st" => Some(attribute),
            _ => None,
        })
        .expect("st");
    assert_eq!(st.interpolation.as_deref(), Some("faceVarying"));
    assert_eq!(st.indices(), Some("[0, 1, 2, 0]"));
    Ok(())
}

#[test]
fn compose_shot() -> anyhow::Result<()> {
    let mut stack = LayerStack::new();
    stack.push_weaker(deserialize_layer(include_str!("shot.xml").as_bytes())?);
    let stage = stack.compose()?;

    assert_eq!(stage.root_children(), &["/geo", "/materials", "/copy"]);
    assert_eq!(stage.prototypes(), &["/proto"]);

    let copy = stage.prim("/copy").expect("copy");
    assert_eq!(copy.instance.as_deref(), Some("/proto"));
    assert!(stage.prim("/proto").is_some_and(|proto| proto.is_prototype));
    assert!(stage.prim("/proto/sphere").is_some_and(|sphere| !sphere.is_prototype));

    let material = stage.prim("/materials/m1").expect("material");
    assert_eq!(
        material.attribute("arnold:surface").and_then(|surface| surface.connect.as_deref()),
        Some("/materials/m1/shader1.outputs:out")
    );

    let expression = stage.prim("/materials/assign1").expect("expression");
    let assignment = expression
        .relationship("assign:defaultRenderLayer:shader")
        .expect("assignment");
    assert_eq!(assignment.target_paths().collect::<Vec<_>>(), vec!["/materials/m1"]);
    Ok(())
}

#[test]
fn override_layer_adds_prims() -> anyhow::Result<()> {
    let over = parse_layer(
        r#"<Layer>
            <Prim name="geo">
                <Prim name="torus" type="Mesh"/>
            </Prim>
        </Layer>"#,
    )?;

    let mut stack = LayerStack::new();
    stack.push_weaker(over);
    stack.push_weaker(parse_layer(include_str!("shot.xml"))?);
    let stage = stack.compose()?;

    let geo = stage.prim("/geo").expect("geo");
    assert_eq!(geo.type_name.as_deref(), Some("Xform"));
    assert_eq!(geo.children, vec!["/geo/torus", "/geo/cube"]);
    Ok(())
}

#[test]
fn missing_name() {
    let result = parse_layer(r#"<Layer><Prim type="Mesh"/></Layer>"#);
    assert!(matches!(result, Err(StageError::XmlError(_))));
}
