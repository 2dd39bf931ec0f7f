use flow_scenes::scenes::sound::SoundScene;

fn main() {
    let _ = flow_scenes::flow::run(SoundScene::new());
}
