use flow_scenes::scenes::cubemap::CubemapScene;

fn main() {
    let _ = flow_scenes::flow::run(CubemapScene::new());
}
