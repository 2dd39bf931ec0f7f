use std::sync::Arc;

use instant::Duration;

use crate::{
    camera::Camera,
    data_structures::{
        geometry::Geometry, material::Material, scene_graph::Node, texture::TextureData,
    },
    flow::{GraphicsFlow, Out},
    stage::{Background, Stage, ToneMapping},
};

const PANORAMA: &str = "satara_night_4k.hdr";

/// A white torus knot lit only by an HDR panorama, the whole frame ACES tone mapped.
#[derive(Debug)]
pub struct HdrScene {
    exposure: f32,
}

impl Default for HdrScene {
    fn default() -> Self {
        Self::new()
    }
}

impl HdrScene {
    pub fn new() -> Self {
        Self { exposure: 1.0 }
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }

    fn apply_panorama(&mut self, stage: &mut Stage, panorama: Arc<TextureData>) {
        log::info!("environment {}x{}", panorama.width, panorama.height);
        stage.background = Background::Equirect(panorama.clone());
        stage.environment = Some(panorama);
    }
}

impl GraphicsFlow for HdrScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 3.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.tone_mapping = ToneMapping::AcesFilmic;
        stage.exposure = self.exposure;
        let panorama = stage.loader.hdr_texture(PANORAMA);
        Out::load(panorama, Self::apply_panorama)
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.add(Node::mesh(
            "Torus Knot",
            Geometry::torus_knot(1.0, 0.3, 256, 64, 2, 3),
            Material::standard(0xffffff, 1.0, 0.0),
        ));
        Out::Empty
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn the_panorama_is_background_and_environment() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = HdrScene::new();
        let panorama = Arc::new(TextureData::solid("sky", [10, 20, 30, 255]));
        scene.apply_panorama(&mut stage, panorama.clone());
        assert!(matches!(&stage.background, Background::Equirect(t) if t.id() == panorama.id()));
        assert_eq!(stage.environment.as_ref().map(|t| t.id()), Some(panorama.id()));
    }

    #[test]
    fn setup_queues_the_panorama_load() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let out = HdrScene::new().with_exposure(0.8).setup_light(&mut stage);
        assert!(matches!(out, Out::FutFn(ref futures) if futures.len() == 1));
        assert!(matches!(stage.background, Background::None));
    }

    #[test]
    fn the_whole_frame_is_tone_mapped_at_the_chosen_exposure() {
        use crate::{pipelines::background::BackgroundUniform, render::FramePlan};

        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let mut stage = super::super::test_stage(&runtime);
        let mut scene = HdrScene::new().with_exposure(0.8);
        let _ = scene.setup_light(&mut stage);
        let _ = scene.setup_model(&mut stage);
        let mut sky = TextureData::solid("sky", [255, 128, 64, 32]);
        sky.rgbm = true;
        scene.apply_panorama(&mut stage, Arc::new(sky));

        assert_eq!(stage.tone_mapping, ToneMapping::AcesFilmic);
        let plan = FramePlan::collect(&stage);
        assert_eq!(plan.lights.counts[2..], [2, 1]);
        assert_eq!(plan.lights.settings[0], 0.8);
        let background = BackgroundUniform::from_background(&stage.background)
            .with_tone_mapping(stage.tone_mapping, stage.exposure);
        assert_eq!(background.mode[..3], [2, 1, 1]);
        assert_eq!(background.tone[0], 0.8);
    }
}
