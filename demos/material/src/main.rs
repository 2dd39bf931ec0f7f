use flow_scenes::scenes::material::MaterialScene;

fn main() {
    let _ = flow_scenes::flow::run(MaterialScene::new());
}
