mod extension;

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub use extension::{ExtensionBlend, ExtensionMap, ExtensionType, ExtensionValue};

/// One participant's recoverable state at `timestamp` (simulation seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: f32,
    pub position: Vec3,
    pub orientation: Quat,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    #[serde(default)]
    pub health: i32,
    #[serde(default)]
    pub animation_state_id: i32,
    #[serde(default)]
    pub animation_phase: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extensions: Option<ExtensionMap>,
}

impl Snapshot {
    pub fn new(position: Vec3, orientation: Quat, timestamp: f32) -> Self {
        Self::with_physics(position, orientation, Vec2::ZERO, 0.0, timestamp)
    }

    pub fn with_physics(
        position: Vec3,
        orientation: Quat,
        linear_velocity: Vec2,
        angular_velocity: f32,
        timestamp: f32,
    ) -> Self {
        Self {
            timestamp,
            position,
            orientation,
            linear_velocity,
            angular_velocity,
            health: 0,
            animation_state_id: 0,
            animation_phase: 0.0,
            extensions: None,
        }
    }

    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self
    }

    pub fn with_animation(mut self, state_id: i32, phase: f32) -> Self {
        self.animation_state_id = state_id;
        self.animation_phase = phase;
        self
    }

    pub fn with_extension(
        mut self,
        key: impl Into<String>,
        value: impl Into<ExtensionValue>,
    ) -> Self {
        self.set_extension(key, value);
        self
    }

    pub fn set_extension(&mut self, key: impl Into<String>, value: impl Into<ExtensionValue>) {
        self.extensions
            .get_or_insert_with(ExtensionMap::new)
            .insert(key.into(), value.into());
    }

    pub fn extension_or<T: ExtensionType>(&self, key: &str, default: T) -> T {
        self.extension(key)
            .and_then(T::from_extension)
            .unwrap_or(default)
    }

    pub fn extension(&self, key: &str) -> Option<&ExtensionValue> {
        self.extensions.as_ref().and_then(|map| map.get(key))
    }

    pub fn extensions(&self) -> Option<&ExtensionMap> {
        self.extensions.as_ref()
    }

    pub fn lerp(a: &Snapshot, b: &Snapshot, t: f32) -> Snapshot {
        Self::lerp_with(a, b, t, &ExtensionBlend::default())
    }

    /// Continuous fields blend linearly (orientation spherically) without clamping `t`.
    /// Discrete fields take `a` below `t = 0.5` and `b` from `t = 0.5` on.
    pub fn lerp_with(a: &Snapshot, b: &Snapshot, t: f32, blend: &ExtensionBlend) -> Snapshot {
        Snapshot {
            timestamp: lerp_f32(a.timestamp, b.timestamp, t),
            position: a.position.lerp(b.position, t),
            orientation: a.orientation.slerp(b.orientation, t),
            linear_velocity: a.linear_velocity.lerp(b.linear_velocity, t),
            angular_velocity: lerp_f32(a.angular_velocity, b.angular_velocity, t),
            health: lerp_f32(a.health as f32, b.health as f32, t).round() as i32,
            animation_state_id: if t < 0.5 {
                a.animation_state_id
            } else {
                b.animation_state_id
            },
            animation_phase: lerp_f32(a.animation_phase, b.animation_phase, t),
            extensions: blend.blend(a.extensions.as_ref(), b.extensions.as_ref(), t),
        }
    }
}

pub(crate) fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
