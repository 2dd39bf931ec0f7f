use flow_scenes::scenes::animation::AnimationScene;

fn main() {
    let _ = flow_scenes::flow::run(AnimationScene::new());
}
