use std::sync::Arc;

use instant::Duration;

use crate::{
    audio::{self, AudioBuffer, AudioOutput, PositionalAudio, Voice},
    camera::Camera,
    data_structures::{
        geometry::Geometry,
        light::Light,
        material::Material,
        scene_graph::{Node, NodeId, NodeKind},
    },
    flow::{GraphicsFlow, Out},
    pick::Hit,
    stage::Stage,
};

const TRACK: &str = "sound/Forest Lullabye - Asher Fulero.mp3";

/// A cube carrying a directional sound source. Any click starts playback.
pub struct SoundScene {
    audio: Option<NodeId>,
    gain: f32,
    output: Box<dyn AudioOutput>,
    voice: Option<Box<dyn Voice>>,
}

impl std::fmt::Debug for SoundScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundScene")
            .field("audio", &self.audio)
            .field("gain", &self.gain)
            .field("voice", &self.voice.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for SoundScene {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundScene {
    pub fn new() -> Self {
        Self::with_output(audio::default_output())
    }

    pub fn with_output(output: Box<dyn AudioOutput>) -> Self {
        Self {
            audio: None,
            gain: 0.0,
            output,
            voice: None,
        }
    }

    /// Gain heard at the camera during the last frame.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_playing(&self, stage: &Stage) -> bool {
        let audio = self.audio.and_then(|id| stage.scene.get(id)).map(|node| &node.kind);
        matches!(audio, Some(NodeKind::Audio(audio)) if audio.is_playing())
    }

    fn add_cube(&mut self, stage: &mut Stage, buffer: Arc<AudioBuffer>) {
        let mut audio = PositionalAudio::new(buffer);
        audio.offset = 1.0;
        audio.set_ref_distance(5.0);
        audio.set_directional_cone(90.0, 300.0, 0.0);
        let helper = audio.cone_helper(5.0);

        let cube = stage.add(Node::mesh(
            "Cube",
            Geometry::box_geometry(1.0, 1.0, 1.0),
            Material::phong(0x044a88),
        ));
        let audio = stage.scene.add(cube, Node::new("Audio", NodeKind::Audio(audio)));
        stage.scene.add(audio, Node::lines("Audio Cone", helper));
        self.audio = Some(audio);
    }
}

impl GraphicsFlow for SoundScene {
    fn setup_camera(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.camera = Camera::new((0.0, 0.0, 10.0));
        Out::Empty
    }

    fn setup_light(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.add(Node::light("Ambient Light", Light::ambient(0xffffff, 0.2)));
        super::key_light(stage, 1.0, -0.8, 1.0, -0.5);
        Out::Empty
    }

    fn setup_model(&mut self, stage: &mut Stage) -> Out<Self> {
        Out::load(stage.loader.audio(TRACK), Self::add_cube)
    }

    fn setup_controls(&mut self, stage: &mut Stage) -> Out<Self> {
        stage.enable_orbit_controls();
        Out::Empty
    }

    fn on_update(&mut self, stage: &mut Stage, _timestamp: Duration) -> Out<Self> {
        let Some(id) = self.audio else {
            return Out::Empty;
        };
        let position = stage.scene.world_position(id);
        let forward = stage.scene.world_direction(id);
        let listener = stage.camera.position;
        let Some(audio) = stage.scene.get_mut(id).and_then(|node| node.audio_mut()) else {
            return Out::Empty;
        };
        if self.voice.as_ref().is_some_and(|voice| voice.is_finished()) {
            self.voice = None;
            audio.stop();
        }
        self.gain = if audio.is_playing() {
            audio.gain(position, forward, listener)
        } else {
            0.0
        };
        if let Some(voice) = &mut self.voice {
            voice.set_volume(self.gain);
        }
        Out::Empty
    }

    fn on_click(&mut self, stage: &mut Stage, _hits: &[Hit]) -> Out<Self> {
        let audio = self
            .audio
            .and_then(|id| stage.scene.get_mut(id))
            .and_then(|node| node.audio_mut());
        let Some(audio) = audio else {
            return Out::Empty;
        };
        if !audio.play() {
            return Out::Empty;
        }
        if let Some(buffer) = audio.buffer().cloned() {
            match self.output.play(&buffer, audio.offset) {
                Ok(voice) => self.voice = Some(voice),
                Err(e) => log::error!("Unable to play {}: {}", buffer.name, e),
            }
        }
        Out::Empty
    }
}
