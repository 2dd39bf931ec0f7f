use cgmath::Deg;
use instant::Duration;
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::Key,
};

use crate::{
    camera::Camera,
    data_structures::scene_graph::{ModelScene, NodeId},
    flow::{GraphicsFlow, Out},
    resources::animation::{AnimationMixer, CROSSFADE},
    stage::Stage,
};

const MODEL: &str = "model.glb";
const DEFAULT_CLIP: &str = "Idle";

/// A glTF character whose clips are switched with the number keys.
#[derive(Debug, Default)]
pub struct AnimationScene {
    mixer: Option<usize>,
    clips: Vec<String>,
    model: Option<NodeId>,
}

impl AnimationScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clip names in file order; key `1` selects the first.
    pub fn clips(&self) -> &[String] {
        &self.clips
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    fn add_model(&mut self, stage: &mut Stage, model: ModelScene) {
        let instance = stage.scene.instantiate(&model);
        stage.scene.attach(NodeId::ROOT, instance.root);
        let mut mixer = AnimationMixer::new(&stage.scene, &instance, model.clips);
        self.clips = mixer.clip_names().map(str::to_string).collect();
        log::info!("animations: {}", self.clips.join(", "));
        let first = if self.clips.iter().any(|c| c == DEFAULT_CLIP) {
            Some(DEFAULT_CLIP.to_string())
        } else {
            self.clips.first().cloned()
        };
        if let Some(first) = first {
            mixer.play(&first);
        }
        stage.mixers.push(mixer);
        self.mixer = Some(stage.mixers.len() - 1);
        self.model = Some(instance.root);
    }

    /// Crossfades to the clip at `index`. Returns whether the animation changed.
    pub fn select(&mut self, stage: &mut Stage, index: usize) -> bool {
        let (Some(mixer), Some(name)) = (self.mixer, self.clips.get(index)) else {
            return false;
        };
        stage
            .mixers
            .get_mut(mixer)
            .is_some_and(|mixer| mixer.change_animation(name, CROSSFADE))
    }
}

/// Clip index for a pressed digit key, `1` being the first clip.
fn digit_index(key: &Key) -> Option<usize> {
    let Key::Character(text) = key else {
        return None;
    };
    let digit = text.chars().next()?.to_digit(10)?;
    (digit as usize).checked_sub(1)
}

impl GraphicsFlow for AnimationScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.set_perspective(Deg(40.0), 100.0, 1000.0);
        stage.camera = Camera::new((0.0, 0.0, 300.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        super::key_light(stage, 5.0, 0.0, 0.0, 1.0);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        Out::load(stage.loader.model(MODEL), Self::add_model)
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, _stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        Out::Empty
    }

    fn on_window_events(&mut self, stage: &mut Stage, event: &WindowEvent) -> Out<Self> {
        if let WindowEvent::KeyboardInput { event, .. } = event {
            if event.state == ElementState::Pressed && !event.repeat {
                if let Some(index) = digit_index(&event.logical_key) {
                    self.select(stage, index);
                }
            }
        }
        Out::Empty
    }
}
