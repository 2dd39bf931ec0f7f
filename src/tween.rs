//! Property tweens on scene node transforms.
//!
//! A [`TweenSpec`] describes one field of one node moving to a target value.
//! Specs are plain data so interaction code can build them without touching
//! the scene; [`TweenRunner`] plays them against the scene graph each frame.

use instant::Duration;

use crate::data_structures::{
    instance::Instance,
    scene_graph::{NodeId, SceneGraph},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TweenField {
    PositionX,
    PositionY,
    PositionZ,
    RotationX,
    RotationY,
    RotationZ,
    /// All three scale axes together.
    Scale,
}

impl TweenField {
    fn read(self, transform: &Instance) -> f32 {
        match self {
            TweenField::PositionX => transform.position.x,
            TweenField::PositionY => transform.position.y,
            TweenField::PositionZ => transform.position.z,
            TweenField::RotationX => transform.rotation.x,
            TweenField::RotationY => transform.rotation.y,
            TweenField::RotationZ => transform.rotation.z,
            TweenField::Scale => transform.scale.x,
        }
    }

    fn write(self, transform: &mut Instance, value: f32) {
        match self {
            TweenField::PositionX => transform.position.x = value,
            TweenField::PositionY => transform.position.y = value,
            TweenField::PositionZ => transform.position.z = value,
            TweenField::RotationX => transform.rotation.x = value,
            TweenField::RotationY => transform.rotation.y = value,
            TweenField::RotationZ => transform.rotation.z = value,
            TweenField::Scale => transform.scale = [value; 3].into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Easing {
    Linear,
    QuadIn,
    /// Decelerating; the default ease of most tweening libraries.
    #[default]
    QuadOut,
    QuadInOut,
    CubicOut,
}

impl Easing {
    /// Maps linear progress in `0..=1` to eased progress with the same endpoints.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::CubicOut => 1.0 - (1.0 - t).powi(3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TweenSpec {
    pub target: NodeId,
    pub field: TweenField,
    pub to: f32,
    pub duration: Duration,
    pub delay: Duration,
    pub ease: Easing,
}

impl TweenSpec {
    pub fn new(target: NodeId, field: TweenField, to: f32, duration: Duration) -> Self {
        Self {
            target,
            field,
            to,
            duration,
            delay: Duration::ZERO,
            ease: Easing::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_ease(mut self, ease: Easing) -> Self {
        self.ease = ease;
        self
    }

    /// Delay plus duration.
    pub fn end(&self) -> Duration {
        self.delay + self.duration
    }
}

/// Sequences groups of tweens by turning their start times into delays.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    cursor: Duration,
    specs: Vec<TweenSpec>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a group of concurrent tweens where the previous group ended.
    pub fn then(mut self, group: impl IntoIterator<Item = TweenSpec>) -> Self {
        let start = self.cursor;
        for spec in group {
            let spec = spec.with_delay(start + spec.delay);
            self.cursor = self.cursor.max(spec.end());
            self.specs.push(spec);
        }
        self
    }

    /// Places a tween at an absolute offset from the start of the timeline.
    pub fn at(mut self, offset: Duration, spec: TweenSpec) -> Self {
        let spec = spec.with_delay(offset + spec.delay);
        self.cursor = self.cursor.max(spec.end());
        self.specs.push(spec);
        self
    }

    pub fn duration(&self) -> Duration {
        self.cursor
    }

    pub fn build(self) -> Vec<TweenSpec> {
        self.specs
    }
}

#[derive(Clone, Debug)]
struct Active {
    spec: TweenSpec,
    elapsed: Duration,
    from: Option<f32>,
}

/// Plays tweens in insertion order; later tweens on the same field win within a frame.
#[derive(Clone, Debug, Default)]
pub struct TweenRunner {
    active: Vec<Active>,
}

impl TweenRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: TweenSpec) {
        self.active.push(Active {
            spec,
            elapsed: Duration::ZERO,
            from: None,
        });
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_animating(&self, node: NodeId) -> bool {
        self.active.iter().any(|a| a.spec.target == node)
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Moves every tween forward by `dt` and writes the eased values.
    pub fn advance(&mut self, scene: &mut SceneGraph, dt: Duration) {
        self.active.retain_mut(|active| {
            active.elapsed += dt;
            let Some(node) = scene.get_mut(active.spec.target) else {
                log::debug!("dropping tween of removed node {:?}", active.spec.target);
                return false;
            };
            if active.elapsed < active.spec.delay {
                return true;
            }
            let from = *active
                .from
                .get_or_insert_with(|| active.spec.field.read(&node.transform));
            let running = active.elapsed - active.spec.delay;
            let progress = if active.spec.duration.is_zero() {
                1.0
            } else {
                (running.as_secs_f32() / active.spec.duration.as_secs_f32()).min(1.0)
            };
            let value = if progress >= 1.0 {
                active.spec.to
            } else {
                from + (active.spec.to - from) * active.spec.ease.apply(progress)
            };
            active.spec.field.write(&mut node.transform, value);
            progress < 1.0
        });
    }
}

impl Extend<TweenSpec> for TweenRunner {
    fn extend<T: IntoIterator<Item = TweenSpec>>(&mut self, iter: T) {
        for spec in iter {
            self.push(spec);
        }
    }
}
