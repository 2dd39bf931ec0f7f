#![allow(dead_code)]

use std::collections::VecDeque;

use flow_scenes::{
    context::Viewport,
    error::RenderError,
    flow::{GraphicsFlow, Lifecycle, Out},
    pick::Hit,
    resources::AssetLoader,
    stage::Stage,
};
use instant::Duration;

/// Renderer double that records what the lifecycle asks of it.
#[derive(Default)]
pub(crate) struct RecordingRenderer {
    pub resizes: Vec<Viewport>,
    pub renders: u32,
    /// Returned by the next renders, one per frame.
    pub failures: VecDeque<RenderError>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(errors: impl IntoIterator<Item = RenderError>) -> Self {
        Self {
            failures: errors.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl flow_scenes::flow::Renderer for RecordingRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.resizes.push(viewport);
    }

    fn render(&mut self, _stage: &Stage) -> Result<(), RenderError> {
        self.renders += 1;
        match self.failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Flow that counts its hook invocations.
#[derive(Default)]
pub(crate) struct State {
    pub calls: Vec<&'static str>,
    pub update_invocations: u32,
    pub click_invocations: u32,
    pub resize_invocations: u32,
    pub last_hits: usize,
    pub dummy_state: String,
}

pub(crate) struct TestFlow {
    pub state: State,
    /// Output of `setup_model`, taken on first use.
    pub model: Option<Box<dyn FnOnce(&mut Stage) -> Out<TestFlow>>>,
}

impl TestFlow {
    pub fn new() -> Self {
        Self {
            state: State::default(),
            model: None,
        }
    }

    pub fn with_model(model: impl FnOnce(&mut Stage) -> Out<TestFlow> + 'static) -> Self {
        Self {
            state: State::default(),
            model: Some(Box::new(model)),
        }
    }
}

impl GraphicsFlow for TestFlow {
    fn setup_camera(&mut self, _: &mut Stage) -> Out<Self> {
        self.state.calls.push("camera");
        Out::Empty
    }

    fn setup_light(&mut self, _: &mut Stage) -> Out<Self> {
        self.state.calls.push("light");
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        self.state.calls.push("model");
        match self.model.take() {
            Some(model) => model(stage),
            None => Out::Empty,
        }
    }

    fn setup_controls(&mut self, _: &mut Stage) -> Out<Self> {
        self.state.calls.push("controls");
        Out::Empty
    }

    fn on_update(&mut self, _: &mut Stage, _: Duration) -> Out<Self> {
        self.state.update_invocations += 1;
        Out::Empty
    }

    fn on_click(&mut self, _: &mut Stage, hits: &[Hit]) -> Out<Self> {
        self.state.click_invocations += 1;
        self.state.last_hits = hits.len();
        Out::Empty
    }

    fn on_resize(&mut self, _: &mut Stage) -> Out<Self> {
        self.state.resize_invocations += 1;
        Out::Empty
    }
}

pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("Failed to start the test runtime.")
}

pub(crate) fn lifecycle<F: GraphicsFlow>(
    runtime: &tokio::runtime::Runtime,
    flow: F,
    renderer: RecordingRenderer,
    root: &str,
) -> Lifecycle<F, RecordingRenderer> {
    let loader = AssetLoader::new(runtime.handle().clone()).with_root(root);
    Lifecycle::initialize(flow, renderer, Viewport::new(800, 600, 1.0), loader)
}

/// Renders frames until every pending load was applied, or gives up after a few seconds.
pub(crate) fn frames_until_loaded<F: GraphicsFlow>(lifecycle: &mut Lifecycle<F, RecordingRenderer>) -> u32 {
    let mut frames = 0;
    while lifecycle.pending_loads() > 0 && frames < 500 {
        lifecycle.on_frame(Duration::from_millis(16 * frames as u64));
        std::thread::sleep(std::time::Duration::from_millis(10));
        frames += 1;
    }
    frames
}
