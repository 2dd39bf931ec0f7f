//! Positional audio sources and the device they play on.
//!
//! A [`PositionalAudio`] keeps the encoded buffer and its play state and
//! computes the gain a listener hears using the Web Audio inverse distance
//! and cone model. An [`AudioOutput`] decodes the buffer into a [`Voice`]
//! whose volume follows that gain every frame. With the `audio-output`
//! feature the default output is the system's speaker through rodio.

use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Vector3};
use instant::Instant;

use crate::{data_structures::geometry::LineSegments, error::DeviceError};

#[cfg(all(feature = "audio-output", not(target_arch = "wasm32")))]
mod rodio_output;

#[cfg(all(feature = "audio-output", not(target_arch = "wasm32")))]
pub use rodio_output::RodioOutput;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Ogg,
    Wav,
    Flac,
    Unknown,
}

impl AudioFormat {
    /// Guesses the container from its magic bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes {
            [b'I', b'D', b'3', ..] => AudioFormat::Mp3,
            [0xff, second, ..] if second & 0xe0 == 0xe0 => AudioFormat::Mp3,
            [b'O', b'g', b'g', b'S', ..] => AudioFormat::Ogg,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => AudioFormat::Wav,
            [b'f', b'L', b'a', b'C', ..] => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        }
    }
}

/// Encoded audio as loaded from an asset.
#[derive(Debug)]
pub struct AudioBuffer {
    pub name: String,
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PositionalAudio {
    pub ref_distance: f32,
    pub rolloff_factor: f32,
    pub max_distance: f32,
    /// Degrees, full width.
    pub cone_inner_angle: f32,
    /// Degrees, full width.
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
    /// Start offset into the buffer in seconds.
    pub offset: f32,
    buffer: Option<Arc<AudioBuffer>>,
    started_at: Option<Instant>,
}

impl Default for PositionalAudio {
    fn default() -> Self {
        Self {
            ref_distance: 1.0,
            rolloff_factor: 1.0,
            max_distance: 10_000.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
            offset: 0.0,
            buffer: None,
            started_at: None,
        }
    }
}

impl PositionalAudio {
    pub fn new(buffer: Arc<AudioBuffer>) -> Self {
        Self {
            buffer: Some(buffer),
            ..Default::default()
        }
    }

    pub fn set_ref_distance(&mut self, distance: f32) {
        self.ref_distance = distance;
    }

    pub fn set_directional_cone(&mut self, inner: f32, outer: f32, outer_gain: f32) {
        self.cone_inner_angle = inner;
        self.cone_outer_angle = outer;
        self.cone_outer_gain = outer_gain;
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    /// Starts playback unless already playing. Returns whether it started.
    pub fn play(&mut self) -> bool {
        if self.is_playing() {
            return false;
        }
        if self.buffer.is_none() {
            log::warn!("positional audio has no buffer to play");
            return false;
        }
        self.started_at = Some(Instant::now());
        log::info!(
            "playing {} from {:.1}s",
            self.buffer.as_ref().map_or("audio", |b| b.name.as_str()),
            self.offset
        );
        true
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// Seconds into the buffer, offset included.
    pub fn playback_position(&self) -> Option<f32> {
        self.started_at
            .map(|start| self.offset + start.elapsed().as_secs_f32())
    }

    /// Inverse distance attenuation.
    pub fn distance_gain(&self, distance: f32) -> f32 {
        let distance = distance.clamp(self.ref_distance, self.max_distance);
        self.ref_distance
            / (self.ref_distance + self.rolloff_factor * (distance - self.ref_distance))
    }

    /// Directional attenuation for a listener seen at `angle` degrees off the source's forward axis.
    pub fn cone_gain(&self, angle: f32) -> f32 {
        let inner = self.cone_inner_angle / 2.0;
        let outer = self.cone_outer_angle / 2.0;
        if self.cone_inner_angle >= 360.0 || angle <= inner {
            1.0
        } else if angle >= outer {
            self.cone_outer_gain
        } else {
            let x = (angle - inner) / (outer - inner);
            (1.0 - x) + self.cone_outer_gain * x
        }
    }

    /// Gain heard at `listener` for a source at `position` facing `forward`.
    pub fn gain(&self, position: Point3<f32>, forward: Vector3<f32>, listener: Point3<f32>) -> f32 {
        let to_listener = listener - position;
        let distance = to_listener.magnitude();
        let angle = if distance > f32::EPSILON && forward.magnitude2() > f32::EPSILON {
            forward
                .normalize()
                .dot(to_listener / distance)
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees()
        } else {
            0.0
        };
        self.distance_gain(distance) * self.cone_gain(angle)
    }

    /// Outline of the inner and outer cone out to `range`, along local +Z.
    pub fn cone_helper(&self, range: f32) -> LineSegments {
        let mut positions = Vec::new();
        let divisions = 16;
        for (half_angle, _) in [
            (self.cone_inner_angle / 2.0, 0),
            (self.cone_outer_angle / 2.0, 1),
        ] {
            let half_angle = half_angle.min(180.0).to_radians();
            let ring: Vec<[f32; 3]> = (0..=divisions)
                .map(|i| {
                    let phi = i as f32 / divisions as f32 * std::f32::consts::TAU;
                    [
                        range * half_angle.sin() * phi.cos(),
                        range * half_angle.sin() * phi.sin(),
                        range * half_angle.cos(),
                    ]
                })
                .collect();
            for pair in ring.windows(2) {
                positions.push(pair[0]);
                positions.push(pair[1]);
            }
            for edge in ring.iter().step_by(4) {
                positions.push([0.0, 0.0, 0.0]);
                positions.push(*edge);
            }
        }
        LineSegments::new(positions, [1.0, 1.0, 0.0])
    }
}

/// Something that turns an [`AudioBuffer`] into sound.
pub trait AudioOutput {
    /// Starts `buffer` `offset` seconds in. The sound stops when the voice is dropped.
    fn play(&mut self, buffer: &AudioBuffer, offset: f32) -> Result<Box<dyn Voice>, DeviceError>;
}

/// A sound started by an [`AudioOutput`].
pub trait Voice {
    /// Linear gain, 1.0 is the buffer's own level.
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    fn is_finished(&self) -> bool;
}

/// Output for hosts without a sound device. Voices keep their volume and never end.
#[derive(Debug, Default)]
pub struct SilentOutput;

#[derive(Debug)]
struct SilentVoice {
    volume: f32,
}

impl AudioOutput for SilentOutput {
    fn play(&mut self, buffer: &AudioBuffer, _offset: f32) -> Result<Box<dyn Voice>, DeviceError> {
        log::debug!("no audio output, {} stays silent", buffer.name);
        Ok(Box::new(SilentVoice { volume: 1.0 }))
    }
}

impl Voice for SilentVoice {
    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_finished(&self) -> bool {
        false
    }
}

/// The speaker when the `audio-output` feature is on and a device opens, silence otherwise.
pub fn default_output() -> Box<dyn AudioOutput> {
    #[cfg(all(feature = "audio-output", not(target_arch = "wasm32")))]
    {
        match RodioOutput::open_default() {
            Ok(output) => return Box::new(output),
            Err(e) => log::warn!("Unable to open the audio output: {}", e),
        }
    }
    Box::new(SilentOutput)
}
