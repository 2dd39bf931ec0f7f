use flow_scenes::scenes::hdr::HdrScene;

fn main() {
    let _ = flow_scenes::flow::run(HdrScene::new());
}
