//! Keyframe clips and the mixer that plays them on scene nodes.

use std::collections::HashMap;

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace, Zero};
use instant::Duration;

use crate::data_structures::{
    instance::Instance,
    scene_graph::{Instantiated, NodeId, SceneGraph},
};

/// Fade used by [`AnimationMixer::change_animation`].
pub const CROSSFADE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
}

/// One animated property of one model node.
#[derive(Clone, Debug)]
pub struct Channel {
    /// Index of the node in the model it was loaded from.
    pub node: usize,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Sample {
    Translation(Vector3<f32>),
    Rotation(Quaternion<f32>),
    Scale(Vector3<f32>),
}

impl Channel {
    /// Linear (spherical for rotations) interpolation at `time`, clamped to the track.
    fn sample(&self, time: f32) -> Option<Sample> {
        let last = self.timestamps.len().checked_sub(1)?;
        let next = self.timestamps.partition_point(|t| *t <= time);
        let (i, j, factor) = if next == 0 {
            (0, 0, 0.0)
        } else if next > last {
            (last, last, 0.0)
        } else {
            let (t0, t1) = (self.timestamps[next - 1], self.timestamps[next]);
            let span = t1 - t0;
            let factor = if span > 0.0 { (time - t0) / span } else { 0.0 };
            (next - 1, next, factor)
        };
        let sample = match &self.keyframes {
            Keyframes::Translation(values) => {
                Sample::Translation(values.get(i)?.lerp(*values.get(j)?, factor))
            }
            Keyframes::Scale(values) => Sample::Scale(values.get(i)?.lerp(*values.get(j)?, factor)),
            Keyframes::Rotation(values) => {
                let (a, b) = (*values.get(i)?, *values.get(j)?);
                Sample::Rotation(if factor == 0.0 { a } else { a.slerp(b, factor) })
            }
        };
        Some(sample)
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    /// Time of the last keyframe on any channel.
    pub fn duration(&self) -> f32 {
        self.channels
            .iter()
            .filter_map(|c| c.timestamps.last())
            .fold(0.0, |acc, t| acc.max(*t))
    }
}

#[derive(Clone, Debug)]
struct Action {
    clip: usize,
    time: f32,
    weight: f32,
    /// Weight change per second while fading.
    fade_rate: f32,
}

/// Plays looping clips of one instantiated model and crossfades between them.
#[derive(Clone, Debug)]
pub struct AnimationMixer {
    bindings: Vec<NodeId>,
    rest: HashMap<NodeId, Instance>,
    clips: Vec<AnimationClip>,
    actions: Vec<Action>,
    current: Option<usize>,
}

impl AnimationMixer {
    pub fn new(scene: &SceneGraph, model: &Instantiated, clips: Vec<AnimationClip>) -> Self {
        let rest = model
            .nodes
            .iter()
            .filter_map(|id| scene.get(*id).map(|n| (*id, n.transform)))
            .collect();
        Self {
            bindings: model.nodes.clone(),
            rest,
            clips,
            actions: Vec::new(),
            current: None,
        }
    }

    pub fn clip_names(&self) -> impl Iterator<Item = &str> {
        self.clips.iter().map(|c| c.name.as_str())
    }

    pub fn current(&self) -> Option<&str> {
        self.current.map(|i| self.clips[i].name.as_str())
    }

    /// Current blend weight of a clip, zero when it is not playing.
    pub fn weight(&self, name: &str) -> f32 {
        self.actions
            .iter()
            .filter(|a| self.clips[a.clip].name == name)
            .map(|a| a.weight)
            .sum()
    }

    fn clip_index(&self, name: &str) -> Option<usize> {
        self.clips.iter().position(|c| c.name == name)
    }

    /// Starts a clip at full weight, dropping whatever was playing.
    pub fn play(&mut self, name: &str) -> bool {
        let Some(clip) = self.clip_index(name) else {
            log::warn!("no animation called {}", name);
            return false;
        };
        self.actions = vec![Action {
            clip,
            time: 0.0,
            weight: 1.0,
            fade_rate: 0.0,
        }];
        self.current = Some(clip);
        true
    }

    /// Fades the current clip out and `name` in over `fade`. Unknown names are ignored.
    pub fn change_animation(&mut self, name: &str, fade: Duration) -> bool {
        let Some(clip) = self.clip_index(name) else {
            log::warn!("no animation called {}", name);
            return false;
        };
        if self.current == Some(clip) {
            return false;
        }
        if self.current.is_none() {
            return self.play(name);
        }
        let rate = 1.0 / fade.as_secs_f32().max(f32::EPSILON);
        for action in self.actions.iter_mut() {
            action.fade_rate = -rate;
        }
        // a copy of the same clip still fading out is replaced
        self.actions.retain(|a| a.clip != clip);
        self.actions.push(Action {
            clip,
            time: 0.0,
            weight: 0.0,
            fade_rate: rate,
        });
        self.current = Some(clip);
        log::debug!("crossfading to {}", name);
        true
    }

    /// Advances playback and writes the blended pose into the scene.
    pub fn update(&mut self, scene: &mut SceneGraph, dt: Duration) {
        let dt = dt.as_secs_f32();
        for action in self.actions.iter_mut() {
            let duration = self.clips[action.clip].duration();
            action.time = if duration > 0.0 {
                (action.time + dt) % duration
            } else {
                0.0
            };
            action.weight = (action.weight + action.fade_rate * dt).clamp(0.0, 1.0);
            if action.fade_rate > 0.0 && action.weight >= 1.0 {
                action.fade_rate = 0.0;
            }
        }
        self.actions.retain(|a| a.weight > 0.0 || a.fade_rate > 0.0);
        self.apply(scene);
    }

    fn apply(&self, scene: &mut SceneGraph) {
        #[derive(Default)]
        struct Blend {
            translation: Option<(Vector3<f32>, f32)>,
            rotation: Option<(Quaternion<f32>, f32)>,
            scale: Option<(Vector3<f32>, f32)>,
        }
        let mut blends: HashMap<NodeId, Blend> = HashMap::new();
        for action in &self.actions {
            for channel in &self.clips[action.clip].channels {
                let Some(node) = self.bindings.get(channel.node) else {
                    continue;
                };
                let Some(sample) = channel.sample(action.time) else {
                    continue;
                };
                let blend = blends.entry(*node).or_default();
                let w = action.weight;
                match sample {
                    Sample::Translation(v) => {
                        let (sum, total) = blend.translation.get_or_insert((Vector3::zero(), 0.0));
                        *sum += v * w;
                        *total += w;
                    }
                    Sample::Scale(v) => {
                        let (sum, total) = blend.scale.get_or_insert((Vector3::zero(), 0.0));
                        *sum += v * w;
                        *total += w;
                    }
                    Sample::Rotation(q) => {
                        let (sum, total) = blend
                            .rotation
                            .get_or_insert((Quaternion::new(0.0, 0.0, 0.0, 0.0), 0.0));
                        // keep every sample in the same hemisphere before summing
                        let q = if sum.dot(q) < 0.0 { -q } else { q };
                        *sum += q * w;
                        *total += w;
                    }
                }
            }
        }
        for (id, blend) in blends {
            let rest = self.rest.get(&id).copied().unwrap_or_default();
            let Some(node) = scene.get_mut(id) else {
                continue;
            };
            if let Some((sum, total)) = blend.translation {
                node.transform.position = sum + rest.position * (1.0 - total).max(0.0);
            }
            if let Some((sum, total)) = blend.scale {
                node.transform.scale = sum + rest.scale * (1.0 - total).max(0.0);
            }
            if let Some((sum, total)) = blend.rotation {
                let rest_q = rest.quaternion();
                let rest_q = if sum.dot(rest_q) < 0.0 { -rest_q } else { rest_q };
                let q = sum + rest_q * (1.0 - total).max(0.0);
                if q.magnitude2() > f32::EPSILON {
                    node.transform.set_quaternion(q.normalize());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3};

    use super::*;
    use crate::data_structures::scene_graph::{ModelNode, ModelScene};

    fn slide(name: &str, to: f32) -> AnimationClip {
        AnimationClip {
            name: name.to_string(),
            channels: vec![Channel {
                node: 0,
                timestamps: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![
                    Vector3::new(0.0, 0.0, 0.0),
                    Vector3::new(to, 0.0, 0.0),
                ]),
            }],
        }
    }

    fn setup() -> (SceneGraph, Instantiated, AnimationMixer) {
        let model = ModelScene {
            name: "model".to_string(),
            nodes: vec![ModelNode {
                name: "Body".to_string(),
                ..Default::default()
            }],
            roots: vec![0],
            clips: vec![slide("Idle", 0.0), slide("Walk", 4.0)],
            ..Default::default()
        };
        let mut scene = SceneGraph::new();
        let instance = scene.instantiate(&model);
        let mixer = AnimationMixer::new(&scene, &instance, model.clips.clone());
        (scene, instance, mixer)
    }

    #[test]
    fn samples_interpolate_and_clamp() {
        let channel = &slide("Walk", 4.0).channels[0];
        assert_eq!(channel.sample(0.5), Some(Sample::Translation(Vector3::new(2.0, 0.0, 0.0))));
        assert_eq!(channel.sample(-1.0), Some(Sample::Translation(Vector3::new(0.0, 0.0, 0.0))));
        assert_eq!(channel.sample(3.0), Some(Sample::Translation(Vector3::new(4.0, 0.0, 0.0))));
    }

    #[test]
    fn crossfade_moves_weight_over_half_a_second() {
        let (mut scene, _, mut mixer) = setup();
        assert!(mixer.play("Idle"));
        assert!(mixer.change_animation("Walk", CROSSFADE));
        mixer.update(&mut scene, Duration::from_millis(250));
        assert!((mixer.weight("Idle") - 0.5).abs() < 1e-4);
        assert!((mixer.weight("Walk") - 0.5).abs() < 1e-4);
        mixer.update(&mut scene, Duration::from_millis(250));
        assert_eq!(mixer.weight("Idle"), 0.0);
        assert_eq!(mixer.weight("Walk"), 1.0);
        assert_eq!(mixer.current(), Some("Walk"));
    }

    #[test]
    fn unknown_or_current_clip_is_ignored() {
        let (_, _, mut mixer) = setup();
        mixer.play("Idle");
        assert!(!mixer.change_animation("Dance", CROSSFADE));
        assert!(!mixer.change_animation("Idle", CROSSFADE));
        assert_eq!(mixer.current(), Some("Idle"));
        assert_eq!(mixer.weight("Idle"), 1.0);
    }

    #[test]
    fn update_writes_pose_into_the_scene() {
        let (mut scene, instance, mut mixer) = setup();
        mixer.play("Walk");
        mixer.update(&mut scene, Duration::from_millis(500));
        let body = scene.get(instance.nodes[0]).expect("body");
        assert!((body.transform.position.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_tracks_slerp() {
        let channel = Channel {
            node: 0,
            timestamps: vec![0.0, 1.0],
            keyframes: Keyframes::Rotation(vec![
                Quaternion::from_angle_y(Deg(0.0)),
                Quaternion::from_angle_y(Deg(90.0)),
            ]),
        };
        let Some(Sample::Rotation(q)) = channel.sample(0.5) else {
            panic!("rotation expected");
        };
        let expected = Quaternion::from_angle_y(Deg(45.0));
        assert!((q - expected).magnitude() < 1e-4);
    }
}
