use flow_scenes::scenes::webcam::WebcamScene;

fn main() {
    let _ = flow_scenes::flow::run(WebcamScene::new());
}
