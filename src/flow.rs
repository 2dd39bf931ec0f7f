//! Scene lifecycle and application event loop.
//!
//! A "flow" is one scene: a struct implementing [`GraphicsFlow`] whose hooks
//! set the scene up, react to input and advance it every frame. The
//! [`Lifecycle`] drives a flow against a [`Stage`] and a [`Renderer`]; [`run`]
//! wires a lifecycle to a winit window (or a web canvas).
//!
//! # Lifecycle
//!
//! 1. Bootstrap: the stage is created with a default camera and an empty scene
//! 2. Setup: `setup_camera`, `setup_light`, `setup_model` and `setup_controls` run in order
//! 3. The initial viewport is applied through `on_resize`
//! 4. Every frame: finished asset loads are applied, the stage is rendered,
//!    `on_update` runs and tweens, animations and orbit controls advance
//! 5. Input: left clicks are ray cast into the scene and handed to `on_click`
//!
//! Hooks return an [`Out`]. Asset loads travel as futures inside
//! [`Out::FutFn`]; they resolve into mutations of the flow and stage which the
//! lifecycle applies between frames, never during one.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context as TaskContext, Poll},
};

use futures::{FutureExt, StreamExt, future::LocalBoxFuture, stream::FuturesUnordered};
use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    context::Viewport,
    error::RenderError,
    pick::Hit,
    render::GpuRenderer,
    resources::{AssetLoader, Pending},
    stage::Stage,
};

/// A deferred change to a flow and its stage, produced by a finished future.
pub type Mutation<F> = Box<dyn FnOnce(&mut F, &mut Stage)>;

///
/// This is the Output Type for every lifecycle hook.
///
/// `Out::FutFn` resolves futures into mutations of the flow and stage that are
/// applied between frames once they are ready.
///
/// `Out::Configure` changes the stage right away, e.g. the clear colour or the
/// tone mapping.
///
/// `Empty` is the default output used when nothing has to be handled.
///
pub enum Out<F> {
    FutFn(Vec<LocalBoxFuture<'static, Mutation<F>>>),
    Configure(Box<dyn FnOnce(&mut Stage)>),
    Empty,
}

impl<F> Default for Out<F> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<F> Debug for Out<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Out::FutFn(futures) => write!(f, "FutFn({} futures)", futures.len()),
            Out::Configure(_) => f.write_str("Configure(|&mut Stage| {...})"),
            Out::Empty => f.write_str("Empty"),
        }
    }
}

impl<F: 'static> Out<F> {
    pub fn configure(configure: impl FnOnce(&mut Stage) + 'static) -> Self {
        Out::Configure(Box::new(configure))
    }

    /// Applies `apply` once `pending` resolves. A failed load is logged and
    /// leaves the scene as it is.
    pub fn load<T: 'static>(
        pending: Pending<T>,
        apply: impl FnOnce(&mut F, &mut Stage, T) + 'static,
    ) -> Self {
        let source = pending.source().to_string();
        let future = async move {
            let mutation: Mutation<F> = match pending.await {
                Ok(value) => Box::new(move |flow, stage| apply(flow, stage, value)),
                Err(e) => Box::new(move |_, _| log::error!("could not load {}: {}", source, e)),
            };
            mutation
        };
        Out::FutFn(vec![future.boxed_local()])
    }

    /// Combines two outputs. A `Configure` that is combined with futures runs
    /// together with the first of them to resolve.
    pub fn and(self, other: Out<F>) -> Out<F> {
        match (self, other) {
            (Out::Empty, out) | (out, Out::Empty) => out,
            (first, second) => {
                let mut futures = first.into_futures();
                futures.extend(second.into_futures());
                Out::FutFn(futures)
            }
        }
    }

    fn into_futures(self) -> Vec<LocalBoxFuture<'static, Mutation<F>>> {
        match self {
            Out::FutFn(futures) => futures,
            Out::Configure(configure) => {
                let mutation: Mutation<F> = Box::new(move |_, stage| configure(stage));
                vec![futures::future::ready(mutation).boxed_local()]
            }
            Out::Empty => Vec::new(),
        }
    }
}

/// One scene.
///
/// Only `setup_model` and `on_update` are required; every other hook
/// defaults to doing nothing.
pub trait GraphicsFlow: Sized + 'static {
    /// Place the camera and choose the projection.
    fn setup_camera(&mut self, _stage: &mut Stage) -> Out<Self> {
        Out::Empty
    }

    fn setup_light(&mut self, _stage: &mut Stage) -> Out<Self> {
        Out::Empty
    }

    /// Build the scene graph or start loading the assets it needs.
    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self>;

    fn setup_controls(&mut self, _stage: &mut Stage) -> Out<Self> {
        Out::Empty
    }

    /// Called every frame after the stage was drawn. `timestamp` is the time
    /// since the loop started.
    fn on_update(&mut self, stage: &mut Stage, timestamp: Duration) -> Out<Self>;

    /// A left click, with the scene hits under the pointer sorted by distance.
    fn on_click(&mut self, _stage: &mut Stage, _hits: &[Hit]) -> Out<Self> {
        Out::Empty
    }

    /// Handle window events (keyboard, mouse, focus, ...).
    fn on_window_events(&mut self, _stage: &mut Stage, _event: &WindowEvent) -> Out<Self> {
        Out::Empty
    }

    /// The viewport changed; the projection aspect is already updated.
    fn on_resize(&mut self, _stage: &mut Stage) -> Out<Self> {
        Out::Empty
    }
}

/// Draws a stage. Implemented by the wgpu renderer and by test doubles.
pub trait Renderer {
    fn resize(&mut self, viewport: Viewport);

    fn render(&mut self, stage: &Stage) -> Result<(), RenderError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The host should schedule another frame.
    Continue,
    Stopped,
}

/// Cancellation token of a render loop. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct LoopHandle(Arc<AtomicBool>);

impl LoopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drives one flow: setup, resize, frames, clicks and teardown.
pub struct Lifecycle<F: GraphicsFlow, R: Renderer> {
    flow: F,
    stage: Stage,
    renderer: R,
    pending: FuturesUnordered<LocalBoxFuture<'static, Mutation<F>>>,
    handle: LoopHandle,
    last_frame: Option<Duration>,
}

impl<F: GraphicsFlow, R: Renderer> Lifecycle<F, R> {
    /// Bootstraps the stage, runs the setup hooks in order and applies the
    /// initial viewport.
    pub fn initialize(flow: F, renderer: R, viewport: Viewport, loader: AssetLoader) -> Self {
        let mut lifecycle = Self {
            flow,
            stage: Stage::new(viewport, loader),
            renderer,
            pending: FuturesUnordered::new(),
            handle: LoopHandle::new(),
            last_frame: None,
        };
        let out = lifecycle.flow.setup_camera(&mut lifecycle.stage);
        lifecycle.handle_output(out);
        let out = lifecycle.flow.setup_light(&mut lifecycle.stage);
        lifecycle.handle_output(out);
        let out = lifecycle.flow.setup_model(&mut lifecycle.stage);
        lifecycle.handle_output(out);
        let out = lifecycle.flow.setup_controls(&mut lifecycle.stage);
        lifecycle.handle_output(out);
        log::info!(
            "scene set up: {} nodes, {} pending loads",
            lifecycle.stage.scene.len(),
            lifecycle.pending.len()
        );
        lifecycle.on_resize(viewport.width, viewport.height);
        lifecycle
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut F {
        &mut self.flow
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Loads (and other futures) that have not resolved yet.
    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    pub fn handle_output(&mut self, out: Out<F>) {
        match out {
            Out::FutFn(futures) => {
                if self.handle.is_cancelled() {
                    return;
                }
                self.pending.extend(futures);
            }
            Out::Configure(configure) => configure(&mut self.stage),
            Out::Empty => (),
        }
    }

    /// Applies every completion that is ready without waiting for the rest.
    /// Returns how many were applied.
    pub fn poll_pending(&mut self) -> usize {
        let mut cx = TaskContext::from_waker(futures::task::noop_waker_ref());
        let mut applied = 0;
        while let Poll::Ready(Some(mutation)) = self.pending.poll_next_unpin(&mut cx) {
            mutation(&mut self.flow, &mut self.stage);
            applied += 1;
        }
        applied
    }

    /// Applies a new surface size. A zero sized surface changes nothing.
    pub fn on_resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {}x{}", width, height);
            return false;
        }
        self.stage.viewport.width = width;
        self.stage.viewport.height = height;
        self.stage.projection.resize(width, height);
        self.renderer.resize(self.stage.viewport);
        let out = self.flow.on_resize(&mut self.stage);
        self.handle_output(out);
        true
    }

    /// Runs one frame. Errors are logged and never stop the loop; only
    /// [`Lifecycle::teardown`] (or cancelling the handle) does.
    pub fn on_frame(&mut self, timestamp: Duration) -> FrameStatus {
        if self.handle.is_cancelled() {
            return FrameStatus::Stopped;
        }
        self.poll_pending();
        let dt = self
            .last_frame
            .map_or(Duration::ZERO, |last| timestamp.saturating_sub(last));
        self.last_frame = Some(timestamp);

        match self.renderer.render(&self.stage) {
            Ok(()) => (),
            // Reconfigure the surface if it's lost or outdated
            Err(e) if e.needs_reconfigure() => {
                log::warn!("{}, reconfiguring the surface", e);
                self.renderer.resize(self.stage.viewport);
            }
            Err(e) => log::error!("Unable to render {}", e),
        }

        let out = self.flow.on_update(&mut self.stage, timestamp);
        self.handle_output(out);
        self.stage.advance(dt);
        FrameStatus::Continue
    }

    /// Ray casts a click at `position` (physical pixels) and hands the hits to the flow.
    pub fn on_pointer_click(&mut self, position: (f64, f64)) {
        let Some(ray) = self.stage.pointer_ray(position) else {
            return;
        };
        let hits = self.stage.raycast(&ray);
        if let Some(hit) = hits.first() {
            log::debug!(
                "clicked {} at {:.2}",
                self.stage.scene.get(hit.node).map_or("?", |n| n.name.as_str()),
                hit.distance
            );
        }
        let out = self.flow.on_click(&mut self.stage, &hits);
        self.handle_output(out);
    }

    /// Raw pointer motion, used by the orbit controls while the right button is held.
    pub fn on_mouse_motion(&mut self, dx: f64, dy: f64) {
        if let Some(controls) = &mut self.stage.controls {
            controls.handle_mouse(dx, dy);
        }
    }

    pub fn on_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.stage.cursor = (position.x, position.y);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if let Some(controls) = &mut self.stage.controls {
                    controls.handle_scroll(delta);
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                if let Some(controls) = &mut self.stage.controls {
                    controls.set_dragging(state.is_pressed());
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.stage.viewport.scale_factor = *scale_factor;
            }
            _ => (),
        }
        let out = self.flow.on_window_events(&mut self.stage, event);
        self.handle_output(out);
    }

    /// Stops the loop and drops whatever is still loading.
    pub fn teardown(&mut self) {
        self.handle.cancel();
        let dropped = self.pending.len();
        self.pending.clear();
        log::info!("scene torn down, {} pending loads dropped", dropped);
    }
}

pub struct App<F: GraphicsFlow> {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    // Taken once the renderer is ready
    flow: Option<F>,
    lifecycle: Option<Lifecycle<F, GpuRenderer>>,
    started: Instant,
    error: Option<anyhow::Error>,
}

impl<F: GraphicsFlow> App<F> {
    fn new(event_loop: &EventLoop<FlowEvent>, flow: F) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            flow: Some(flow),
            lifecycle: None,
            started: Instant::now(),
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("App initialization failed: {:#}", error);
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop, renderer: anyhow::Result<GpuRenderer>) {
        let renderer = match renderer {
            Ok(renderer) => renderer,
            Err(e) => return self.fail(event_loop, e),
        };
        let Some(flow) = self.flow.take() else {
            return;
        };
        #[cfg(not(target_arch = "wasm32"))]
        let loader = AssetLoader::new(self.async_runtime.handle().clone());
        #[cfg(target_arch = "wasm32")]
        let loader = AssetLoader::new();

        let window = renderer.window().clone();
        let size = window.inner_size();
        let viewport = Viewport::new(size.width, size.height, window.scale_factor());
        self.lifecycle = Some(Lifecycle::initialize(flow, renderer, viewport, loader));
        self.started = Instant::now();
        window.request_redraw();
    }
}

pub(crate) enum FlowEvent {
    #[allow(dead_code)]
    Initialized(anyhow::Result<GpuRenderer>),
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(Ok(_)) => f.write_str("Initialized(Ok)"),
            Self::Initialized(Err(e)) => write!(f, "Initialized(Err({}))", e),
        }
    }
}

impl<F: GraphicsFlow> ApplicationHandler<FlowEvent> for App<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.lifecycle.is_some() || self.flow.is_none() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes();

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => log::warn!("no #{} element, winit creates its own canvas", CANVAS_ID),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let renderer = self.async_runtime.block_on(GpuRenderer::new(window));
            self.start(event_loop, renderer);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let renderer = GpuRenderer::new(window).await;
                if proxy.send_event(FlowEvent::Initialized(renderer)).is_err() {
                    log::error!("the event loop closed before the renderer was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            FlowEvent::Initialized(renderer) => self.start(event_loop, renderer),
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(lifecycle) = &mut self.lifecycle else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            lifecycle.on_mouse_motion(dx, dy);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(lifecycle) = &mut self.lifecycle else {
            return;
        };

        lifecycle.on_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                lifecycle.teardown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if lifecycle.on_resize(size.width, size.height) {
                    lifecycle.renderer().window().request_redraw();
                }
            }
            WindowEvent::RedrawRequested => match lifecycle.on_frame(self.started.elapsed()) {
                FrameStatus::Continue => lifecycle.renderer().window().request_redraw(),
                FrameStatus::Stopped => log::info!("render loop stopped"),
            },
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                let cursor = lifecycle.stage().cursor;
                lifecycle.on_pointer_click(cursor);
            }
            _ => {}
        }
    }
}

/// Opens a window (or attaches to the `#canvas` element on the web) and runs `flow` in it.
pub fn run<F: GraphicsFlow>(flow: F) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;

    let mut app = App::new(&event_loop, flow)?;

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
