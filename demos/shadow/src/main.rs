use flow_scenes::scenes::shadow::ShadowScene;

fn main() {
    let _ = flow_scenes::flow::run(ShadowScene::new());
}
