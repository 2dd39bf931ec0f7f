use flow_scenes::scenes::custom_geometry::CustomGeometryScene;

fn main() {
    let _ = flow_scenes::flow::run(CustomGeometryScene::new());
}
