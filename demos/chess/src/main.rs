use flow_scenes::scenes::chess::ChessScene;

fn main() {
    let _ = flow_scenes::flow::run(ChessScene::new());
}
