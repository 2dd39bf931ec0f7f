use std::{cell::RefCell, rc::Rc};

use flow_scenes::{
    data_structures::{geometry::Geometry, material::Material, scene_graph::Node},
    error::RenderError,
    flow::{FrameStatus, Out},
    stage::Stage,
};
use instant::Duration;

use crate::common::test_utils::{RecordingRenderer, TestFlow, frames_until_loaded, lifecycle, runtime};

mod common;

#[test]
fn setup_hooks_run_in_order_before_the_first_resize() {
    let runtime = runtime();
    let lifecycle = lifecycle(&runtime, TestFlow::new(), RecordingRenderer::new(), "assets");
    assert_eq!(lifecycle.flow().state.calls, ["camera", "light", "model", "controls"]);
    assert_eq!(lifecycle.flow().state.resize_invocations, 1);
    assert_eq!(lifecycle.renderer().resizes.len(), 1);
    assert_eq!(lifecycle.stage().projection.aspect, 800.0 / 600.0);
}

#[test]
fn resize_sets_the_exact_aspect() {
    let runtime = runtime();
    let mut lifecycle = lifecycle(&runtime, TestFlow::new(), RecordingRenderer::new(), "assets");
    assert!(lifecycle.on_resize(1920, 1080));
    assert_eq!(lifecycle.stage().projection.aspect, 1920.0 / 1080.0);
    assert_eq!(lifecycle.stage().viewport.width, 1920);
    assert_eq!(lifecycle.renderer().resizes.last().map(|v| v.height), Some(1080));
    assert_eq!(lifecycle.flow().state.resize_invocations, 2);
}

#[test]
fn zero_height_resize_is_ignored() {
    let runtime = runtime();
    let mut lifecycle = lifecycle(&runtime, TestFlow::new(), RecordingRenderer::new(), "assets");
    let aspect = lifecycle.stage().projection.aspect;

    assert!(!lifecycle.on_resize(1024, 0));
    assert!(!lifecycle.on_resize(0, 768));
    assert_eq!(lifecycle.stage().projection.aspect, aspect);
    assert_eq!(lifecycle.stage().viewport.height, 600);
    assert_eq!(lifecycle.renderer().resizes.len(), 1);
    assert_eq!(lifecycle.flow().state.resize_invocations, 1);
}

#[test]
fn cancelled_loop_stops_without_rendering() {
    let runtime = runtime();
    let mut lifecycle = lifecycle(&runtime, TestFlow::new(), RecordingRenderer::new(), "assets");
    assert_eq!(lifecycle.on_frame(Duration::ZERO), FrameStatus::Continue);
    assert_eq!(lifecycle.renderer().renders, 1);

    lifecycle.handle().cancel();
    assert_eq!(lifecycle.on_frame(Duration::from_millis(16)), FrameStatus::Stopped);
    assert_eq!(lifecycle.renderer().renders, 1);
    assert_eq!(lifecycle.flow().state.update_invocations, 1);
}

#[test]
fn teardown_drops_pending_loads() {
    let runtime = runtime();
    let flow = TestFlow::with_model(|stage: &mut Stage| {
        Out::load(stage.loader.texture("never.png"), |_: &mut TestFlow, _, _| ())
    });
    let mut lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), "assets");
    assert_eq!(lifecycle.pending_loads(), 1);
    lifecycle.teardown();
    assert_eq!(lifecycle.pending_loads(), 0);
    assert_eq!(lifecycle.on_frame(Duration::ZERO), FrameStatus::Stopped);
}

#[test]
fn rejected_asset_is_logged_and_frames_continue() {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let applied = Rc::new(RefCell::new(false));
    let seen = applied.clone();
    let flow = TestFlow::with_model(move |stage: &mut Stage| {
        stage.add(Node::mesh(
            "Cube",
            Geometry::box_geometry(1.0, 1.0, 1.0),
            Material::basic(0xffffff),
        ));
        Out::load(stage.loader.texture("missing.png"), move |_: &mut TestFlow, _, _| {
            *seen.borrow_mut() = true;
        })
    });
    let mut lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), &dir.path().to_string_lossy());

    let frames = frames_until_loaded(&mut lifecycle);
    assert_eq!(lifecycle.pending_loads(), 0, "load did not settle after {} frames", frames);
    assert!(!*applied.borrow());

    // the rest of the scene keeps rendering
    let renders = lifecycle.renderer().renders;
    assert_eq!(lifecycle.on_frame(Duration::from_secs(10)), FrameStatus::Continue);
    assert_eq!(lifecycle.renderer().renders, renders + 1);
    assert!(lifecycle.stage().scene.find("Cube").is_some());
}

#[test]
fn loaded_asset_mutates_flow_and_stage() {
    let runtime = runtime();
    let dir = tempfile::tempdir().expect("tempdir");
    let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([0, 255, 0, 255]));
    img.save(dir.path().join("green.png")).expect("write png");

    let flow = TestFlow::with_model(|stage: &mut Stage| {
        Out::load(stage.loader.texture("green.png"), |flow: &mut TestFlow, stage, texture| {
            flow.state.dummy_state.push_str(&texture.label);
            stage.set_background_image(texture);
        })
    });
    let mut lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), &dir.path().to_string_lossy());
    frames_until_loaded(&mut lifecycle);

    assert_eq!(lifecycle.flow().state.dummy_state, "green.png");
    assert!(matches!(
        lifecycle.stage().background,
        flow_scenes::stage::Background::Image { .. }
    ));
}

#[test]
fn combined_outputs_resolve_on_the_next_frame() {
    let runtime = runtime();
    let flow = TestFlow::with_model(|_: &mut Stage| {
        let sencha: Out<TestFlow> = Out::FutFn(vec![Box::pin(async {
            let mutation: flow_scenes::flow::Mutation<TestFlow> =
                Box::new(|flow: &mut TestFlow, _: &mut Stage| flow.state.dummy_state.push('🍵'));
            mutation
        })]);
        let mate: Out<TestFlow> = Out::FutFn(vec![Box::pin(async {
            let mutation: flow_scenes::flow::Mutation<TestFlow> =
                Box::new(|flow: &mut TestFlow, _: &mut Stage| flow.state.dummy_state.push('🧉'));
            mutation
        })]);
        Out::configure(|stage| stage.shadows_enabled = true).and(sencha).and(mate)
    });
    let mut lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), "assets");
    assert_eq!(lifecycle.pending_loads(), 3);
    assert!(lifecycle.flow().state.dummy_state.is_empty());

    lifecycle.on_frame(Duration::ZERO);
    let state = &lifecycle.flow().state;
    assert!(state.dummy_state.contains('🍵'));
    assert!(state.dummy_state.contains('🧉'));
    // emojis are 4 bytes wide
    assert_eq!(state.dummy_state.len(), 8);
    assert!(lifecycle.stage().shadows_enabled);
    assert_eq!(lifecycle.pending_loads(), 0);
}

#[test]
fn configure_alone_runs_during_setup() {
    let runtime = runtime();
    let flow = TestFlow::with_model(|_: &mut Stage| Out::configure(|stage| stage.exposure = 0.5));
    let lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), "assets");
    assert_eq!(lifecycle.stage().exposure, 0.5);
    assert_eq!(lifecycle.pending_loads(), 0);
}

#[test]
fn lost_surface_is_reconfigured_and_other_errors_are_skipped() {
    let runtime = runtime();
    let renderer = RecordingRenderer::failing_with([
        RenderError::Surface(wgpu::SurfaceError::Lost),
        RenderError::Uninitialized,
    ]);
    let mut lifecycle = lifecycle(&runtime, TestFlow::new(), renderer, "assets");
    let resizes = lifecycle.renderer().resizes.len();

    assert_eq!(lifecycle.on_frame(Duration::ZERO), FrameStatus::Continue);
    assert_eq!(lifecycle.renderer().resizes.len(), resizes + 1);
    assert_eq!(lifecycle.on_frame(Duration::from_millis(16)), FrameStatus::Continue);
    assert_eq!(lifecycle.renderer().resizes.len(), resizes + 1);
    assert_eq!(lifecycle.on_frame(Duration::from_millis(32)), FrameStatus::Continue);
    assert_eq!(lifecycle.renderer().renders, 3);
    assert_eq!(lifecycle.flow().state.update_invocations, 3);
}

#[test]
fn clicks_reach_the_flow_with_sorted_hits() {
    let runtime = runtime();
    let flow = TestFlow::with_model(|stage: &mut Stage| {
        let cube = || Geometry::box_geometry(1.0, 1.0, 1.0);
        stage.add(Node::mesh("Near", cube(), Material::basic(0xff0000)).at(0.0, 0.0, 1.0));
        stage.add(Node::mesh("Far", cube(), Material::basic(0x00ff00)).at(0.0, 0.0, -2.0));
        Out::Empty
    });
    let mut lifecycle = lifecycle(&runtime, flow, RecordingRenderer::new(), "assets");

    lifecycle.on_pointer_click((400.0, 300.0));
    assert_eq!(lifecycle.flow().state.click_invocations, 1);
    assert_eq!(lifecycle.flow().state.last_hits, 2);

    lifecycle.on_pointer_click((1.0, 1.0));
    assert_eq!(lifecycle.flow().state.click_invocations, 2);
    assert_eq!(lifecycle.flow().state.last_hits, 0);
}
