use std::sync::Arc;

use instant::Duration;

use crate::{
    camera::Camera,
    capture::{self, CaptureDevice, FrameStream},
    data_structures::{
        geometry::Geometry,
        material::Material,
        scene_graph::{Node, NodeId},
    },
    flow::{GraphicsFlow, Out},
    stage::Stage,
};

pub const CAPTURE_WIDTH: u32 = 1280;
pub const CAPTURE_HEIGHT: u32 = 720;

/// A cube textured with live frames from a capture device.
pub struct WebcamScene {
    device: Box<dyn CaptureDevice>,
    stream: Option<Box<dyn FrameStream>>,
    cube: Option<NodeId>,
}

impl std::fmt::Debug for WebcamScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebcamScene")
            .field("streaming", &self.stream.is_some())
            .field("cube", &self.cube)
            .finish()
    }
}

impl Default for WebcamScene {
    fn default() -> Self {
        Self::new()
    }
}

impl WebcamScene {
    /// Captures from [`capture::default_device`].
    pub fn new() -> Self {
        Self::with_device(capture::default_device())
    }

    pub fn with_device(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            stream: None,
            cube: None,
        }
    }

    pub fn cube(&self) -> Option<NodeId> {
        self.cube
    }
}

impl GraphicsFlow for WebcamScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 2.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 1.0, -1.0, 2.0, 4.0);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        let mut stream = match self.device.open(CAPTURE_WIDTH, CAPTURE_HEIGHT) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Unable to access the camera: {}", e);
                return Out::Empty;
            }
        };
        let mut material = Material::phong(0xffffff);
        match stream.poll_frame() {
            Some(Ok(frame)) => material.map = Some(Arc::new(frame)),
            Some(Err(e)) => log::warn!("first camera frame failed: {}", e),
            None => (),
        }
        self.cube = Some(stage.add(Node::mesh("Cube", Geometry::box_geometry(1.0, 1.0, 1.0), material)));
        self.stream = Some(stream);
        Out::Empty
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        let Some(stream) = self.stream.as_mut() else {
            return Out::Empty;
        };
        let frame = match stream.poll_frame() {
            Some(Ok(frame)) => Arc::new(frame),
            Some(Err(e)) => {
                log::warn!("dropped a camera frame: {}", e);
                return Out::Empty;
            }
            None => return Out::Empty,
        };
        let primitives = self
            .cube
            .and_then(|cube| stage.scene.get_mut(cube))
            .and_then(|node| node.primitives_mut());
        if let Some(primitives) = primitives {
            for primitive in primitives.iter_mut() {
                primitive.material.map = Some(frame.clone());
            }
        }
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::{
        capture::{NoCaptureDevice, RawFrame, TestPattern, spawn_capture},
        data_structures::scene_graph::NodeKind,
        error::DeviceError,
    };

    fn map_revision(stage: &Stage, cube: NodeId) -> Option<u64> {
        match &stage.scene.get(cube)?.kind {
            NodeKind::Mesh(primitives) => primitives[0].material.map.as_ref().map(|m| m.revision()),
            _ => None,
        }
    }

    #[test]
    fn frames_refresh_the_cube_texture() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = WebcamScene::with_device(Box::new(TestPattern));
        scene.setup_model(&mut stage);
        let cube = scene.cube().expect("cube");
        let first = map_revision(&stage, cube).expect("first frame");

        scene.on_update(&mut stage, Duration::from_millis(16));
        assert_eq!(map_revision(&stage, cube), Some(first + 1));
    }

    /// A camera whose frames come from a background thread, like a real one.
    struct ThreadedCamera;

    impl CaptureDevice for ThreadedCamera {
        fn open(&self, width: u32, height: u32) -> Result<Box<dyn FrameStream>, DeviceError> {
            spawn_capture("threaded", move || {
                let grab = move || -> Result<RawFrame, DeviceError> {
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(RawFrame {
                        width,
                        height,
                        pixels: vec![200; (width * height * 4) as usize],
                    })
                };
                Ok(((width, height), grab))
            })
        }
    }

    #[test]
    fn frames_from_a_capture_thread_reach_the_cube() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = WebcamScene::with_device(Box::new(ThreadedCamera));
        scene.setup_model(&mut stage);
        let cube = scene.cube().expect("cube");

        let deadline = instant::Instant::now() + Duration::from_secs(5);
        while map_revision(&stage, cube).is_none_or(|revision| revision < 2) {
            assert!(instant::Instant::now() < deadline, "no frames reached the cube");
            std::thread::sleep(Duration::from_millis(2));
            scene.on_update(&mut stage, Duration::from_millis(16));
        }
        let map = match &stage.scene.get(cube).expect("cube").kind {
            NodeKind::Mesh(primitives) => primitives[0].material.map.clone().expect("map"),
            _ => unreachable!(),
        };
        assert_eq!((map.width, map.height), (CAPTURE_WIDTH, CAPTURE_HEIGHT));
        assert_eq!(map.pixel(0, 0), [200; 4]);
    }

    #[test]
    fn missing_camera_skips_the_model() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = WebcamScene::with_device(Box::new(NoCaptureDevice));
        scene.setup_model(&mut stage);
        assert_eq!(scene.cube(), None);
        assert!(stage.scene.find("Cube").is_none());
        // updates without a stream are harmless
        scene.on_update(&mut stage, Duration::from_millis(16));
    }
}
