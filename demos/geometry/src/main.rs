use flow_scenes::scenes::geometry::{GeometryScene, GeometryVariant};

fn main() {
    let _ = flow_scenes::flow::run(GeometryScene::new(GeometryVariant::Text));
}
