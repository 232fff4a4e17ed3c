//! Kinematic bodies
//!
//! A small axis-aligned body integrator against the unit-tile terrain. It stands
//! in for the rigid-body engine: gravity, tile collision and a ground-contact flag
//! are everything the gameplay layer reads back.

use bevy::prelude::*;

use super::terrain::Terrain;

/// Vertical probe distance used to keep a resting body grounded.
const GROUND_PROBE: f32 = 0.05;
/// Inset applied to the side probes so a body standing flush against a wall
/// does not register the wall as floor.
const PROBE_INSET: f32 = 0.9;

/// Position and velocity of a box-shaped body.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicBody {
    pub position: Vec2,
    pub velocity: Vec2,
    pub half_extents: Vec2,
    pub gravity_scale: f32,
    /// Disabled bodies are neither integrated nor collided (dead avatars)
    pub simulated: bool,
    pub grounded: bool,
}

impl KinematicBody {
    pub fn new(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            half_extents,
            gravity_scale: 1.0,
            simulated: true,
            grounded: false,
        }
    }

    /// Advance the body by `dt`. Returns true on the tick it lands.
    pub fn step(&mut self, dt: f32, gravity: f32, terrain: &dyn Terrain) -> bool {
        if !self.simulated {
            return false;
        }

        self.velocity.y -= gravity * self.gravity_scale * dt;

        // Horizontal pass: stop at walls
        let next_x = self.position.x + self.velocity.x * dt;
        let leading = next_x + self.half_extents.x * self.velocity.x.signum();
        if self.velocity.x != 0.0 && terrain.is_solid(Vec2::new(leading, self.position.y)) {
            self.velocity.x = 0.0;
        } else {
            self.position.x = next_x;
        }

        // Vertical pass: land on floors, bump ceilings
        let was_grounded = self.grounded;
        let next_y = self.position.y + self.velocity.y * dt;
        if self.velocity.y <= 0.0 {
            let feet = next_y - self.half_extents.y;
            if self.floor_below(feet, terrain) {
                let floor_top = feet.round() + 0.5;
                self.position.y = floor_top + self.half_extents.y;
                self.velocity.y = 0.0;
                self.grounded = true;
            } else {
                self.position.y = next_y;
                self.grounded = self.floor_below(next_y - self.half_extents.y - GROUND_PROBE, terrain)
                    && self.velocity.y == 0.0;
            }
        } else {
            let head = next_y + self.half_extents.y;
            if self.floor_below(head, terrain) {
                self.velocity.y = 0.0;
            } else {
                self.position.y = next_y;
            }
            self.grounded = false;
        }

        self.grounded && !was_grounded
    }

    /// Move the body instantly, keeping its velocity.
    pub fn teleport(&mut self, position: Vec2) {
        self.position = position;
        self.grounded = false;
    }

    /// Stop simulating and zero all motion.
    pub fn disable(&mut self) {
        self.simulated = false;
        self.velocity = Vec2::ZERO;
        self.grounded = false;
    }

    /// Resume simulation at `position` from rest.
    pub fn enable_at(&mut self, position: Vec2) {
        self.simulated = true;
        self.position = position;
        self.velocity = Vec2::ZERO;
        self.grounded = false;
    }

    /// Whether this body's box overlaps a circle.
    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        let closest = center.clamp(
            self.position - self.half_extents,
            self.position + self.half_extents,
        );
        closest.distance_squared(center) <= radius * radius
    }

    fn floor_below(&self, y: f32, terrain: &dyn Terrain) -> bool {
        let reach = self.half_extents.x * PROBE_INSET;
        terrain.is_solid(Vec2::new(self.position.x - reach, y))
            || terrain.is_solid(Vec2::new(self.position.x + reach, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::terrain::ArenaLayout;

    fn floor() -> ArenaLayout {
        let tiles: Vec<IVec2> = (-5..=5).map(|x| IVec2::new(x, 0)).chain([IVec2::new(3, 1)]).collect();
        ArenaLayout::from_tiles("floor", &tiles, vec![], 4.0)
    }

    #[test]
    fn test_body_falls_and_lands_on_floor() {
        let terrain = floor();
        let mut body = KinematicBody::new(Vec2::new(0.0, 3.0), Vec2::new(0.35, 0.45));

        let mut landed_ticks = 0;
        for _ in 0..120 {
            if body.step(1.0 / 60.0, 20.0, &terrain) {
                landed_ticks += 1;
            }
        }

        assert_eq!(landed_ticks, 1);
        assert!(body.grounded);
        assert!((body.position.y - 0.95).abs() < 1e-4);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn test_walls_block_horizontal_motion() {
        let terrain = floor();
        let mut body = KinematicBody::new(Vec2::new(1.5, 0.95), Vec2::new(0.35, 0.45));
        body.grounded = true;

        for _ in 0..120 {
            body.velocity.x = 5.0;
            body.step(1.0 / 60.0, 20.0, &terrain);
        }

        assert!(body.position.x < 2.5, "body passed through wall at {:?}", body.position);
    }

    #[test]
    fn test_disabled_body_is_frozen() {
        let terrain = floor();
        let mut body = KinematicBody::new(Vec2::new(0.0, 3.0), Vec2::splat(0.4));
        body.disable();
        assert!(!body.step(1.0, 20.0, &terrain));
        assert_eq!(body.position, Vec2::new(0.0, 3.0));

        body.enable_at(Vec2::new(1.0, 2.0));
        assert!(body.simulated);
        assert_eq!(body.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_overlaps_circle() {
        let body = KinematicBody::new(Vec2::ZERO, Vec2::new(0.5, 0.5));
        assert!(body.overlaps_circle(Vec2::new(0.6, 0.0), 0.2));
        assert!(!body.overlaps_circle(Vec2::new(1.0, 0.0), 0.2));
    }
}
