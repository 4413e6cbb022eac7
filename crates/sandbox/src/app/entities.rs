use rewind::{Quat, Rewindable, Snapshot, Vec2, Vec3};
use serde::Serialize;

pub(crate) const EXT_ACTIVE: &str = "active";
pub(crate) const EXT_FACING_LEFT: &str = "facing_left";
pub(crate) const EXT_AGE: &str = "age";

const SPINNER_STATE_HEALTHY: i32 = 1;
const SPINNER_STATE_HURT: i32 = 2;
const SPINNER_HURT_THRESHOLD: i32 = 50;

/// Walks back and forth inside `[min_x, max_x]`, turning around on a timer or at
/// the bounds, and deactivates itself once `lifetime_seconds` has elapsed.
#[derive(Debug, Clone)]
pub(crate) struct Patroller {
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec2,
    pub(crate) active: bool,
    pub(crate) age_seconds: f32,
    speed: f32,
    min_x: f32,
    max_x: f32,
    turn_interval_seconds: f32,
    turn_timer_seconds: f32,
    lifetime_seconds: f32,
    frozen: bool,
    last_applied: Option<Snapshot>,
}

impl Patroller {
    pub(crate) fn new(position: Vec3, speed: f32, min_x: f32, max_x: f32) -> Self {
        Self {
            position,
            velocity: Vec2::new(speed, 0.0),
            active: true,
            age_seconds: 0.0,
            speed,
            min_x,
            max_x,
            turn_interval_seconds: 0.5,
            turn_timer_seconds: 0.5,
            lifetime_seconds: 5.0,
            frozen: false,
            last_applied: None,
        }
    }

    pub(crate) fn with_lifetime(mut self, lifetime_seconds: f32) -> Self {
        self.lifetime_seconds = lifetime_seconds;
        self
    }

    pub(crate) fn with_turn_interval(mut self, turn_interval_seconds: f32) -> Self {
        self.turn_interval_seconds = turn_interval_seconds;
        self.turn_timer_seconds = turn_interval_seconds;
        self
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn facing_left(&self) -> bool {
        self.velocity.x < 0.0
    }

    pub(crate) fn fixed_update(&mut self, dt: f32) {
        if self.frozen {
            return;
        }
        self.age_seconds += dt;
        self.active = self.age_seconds < self.lifetime_seconds;
        if !self.active {
            self.velocity = Vec2::ZERO;
            return;
        }

        self.turn_timer_seconds -= dt;
        if self.turn_timer_seconds <= 0.0 {
            self.velocity.x = -self.velocity.x;
            self.turn_timer_seconds = self.turn_interval_seconds;
        }
        if self.position.x <= self.min_x {
            self.velocity.x = self.speed;
        } else if self.position.x >= self.max_x {
            self.velocity.x = -self.speed;
        }

        self.position += self.velocity.extend(0.0) * dt;
    }
}

impl Rewindable for Patroller {
    fn capture_state(&self) -> Snapshot {
        Snapshot::with_physics(
            self.position,
            Quat::IDENTITY,
            self.velocity,
            0.0,
            self.age_seconds,
        )
        .with_extension(EXT_ACTIVE, self.active)
        .with_extension(EXT_FACING_LEFT, self.facing_left())
        .with_extension(EXT_AGE, self.age_seconds)
    }

    fn apply_state(&mut self, snapshot: &Snapshot) {
        self.position = snapshot.position;
        self.active = snapshot.extension_or(EXT_ACTIVE, true);
        self.age_seconds = snapshot.extension_or(EXT_AGE, self.age_seconds);
        self.last_applied = Some(snapshot.clone());
    }

    fn on_rewind_start(&mut self) {
        self.frozen = true;
        self.velocity = Vec2::ZERO;
    }

    fn on_rewind_stop(&mut self) {
        self.frozen = false;
        if let Some(snapshot) = &self.last_applied {
            self.velocity = snapshot.linear_velocity;
            if self.velocity == Vec2::ZERO && self.active {
                let sign = if snapshot.extension_or(EXT_FACING_LEFT, false) {
                    -1.0
                } else {
                    1.0
                };
                self.velocity = Vec2::new(sign * self.speed, 0.0);
            }
        }
        self.turn_timer_seconds = self.turn_interval_seconds;
    }
}

/// Rotates around Z at a fixed rate and bleeds health on a timer.
#[derive(Debug, Clone)]
pub(crate) struct Spinner {
    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,
    pub(crate) health: i32,
    angular_velocity: f32,
    damage_interval_seconds: f32,
    damage_timer_seconds: f32,
    frozen: bool,
}

impl Spinner {
    pub(crate) fn new(position: Vec3, angular_velocity: f32, health: i32) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            health,
            angular_velocity,
            damage_interval_seconds: 0.25,
            damage_timer_seconds: 0.25,
            frozen: false,
        }
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn animation_state_id(&self) -> i32 {
        if self.health < SPINNER_HURT_THRESHOLD {
            SPINNER_STATE_HURT
        } else {
            SPINNER_STATE_HEALTHY
        }
    }

    fn animation_phase(&self) -> f32 {
        let (_, angle) = self.orientation.to_axis_angle();
        (angle / std::f32::consts::TAU).rem_euclid(1.0)
    }

    pub(crate) fn fixed_update(&mut self, dt: f32) {
        if self.frozen {
            return;
        }
        self.orientation =
            (Quat::from_rotation_z(self.angular_velocity * dt) * self.orientation).normalize();

        self.damage_timer_seconds -= dt;
        if self.damage_timer_seconds <= 0.0 && self.health > 0 {
            self.health -= 1;
            self.damage_timer_seconds = self.damage_interval_seconds;
        }
    }
}

impl Rewindable for Spinner {
    fn capture_state(&self) -> Snapshot {
        Snapshot::with_physics(
            self.position,
            self.orientation,
            Vec2::ZERO,
            self.angular_velocity,
            0.0,
        )
        .with_health(self.health)
        .with_animation(self.animation_state_id(), self.animation_phase())
    }

    fn apply_state(&mut self, snapshot: &Snapshot) {
        self.position = snapshot.position;
        self.orientation = snapshot.orientation.normalize();
        self.health = snapshot.health;
    }

    fn on_rewind_start(&mut self) {
        self.frozen = true;
    }

    fn on_rewind_stop(&mut self) {
        self.frozen = false;
        self.damage_timer_seconds = self.damage_interval_seconds;
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EntityReport {
    pub(crate) name: &'static str,
    pub(crate) frozen: bool,
    pub(crate) snapshot: Snapshot,
}
