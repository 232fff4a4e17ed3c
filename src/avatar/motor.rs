//! Locomotion for the locally driven avatar
//!
//! Reads one tick of [`PlayerInput`] and turns it into body velocity:
//! - horizontal speed and facing follow the move axis
//! - a jump starts when grounded, or once in the air after walking off a ledge
//! - holding jump keeps adding upward acceleration for the hold window
//! - a jump pressed shortly before landing fires on the landing tick

use super::Facing;
use crate::sim::config::GameplayConfig;
use crate::sim::physics::KinematicBody;

/// One tick of player intent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    /// -1.0 (left) to 1.0 (right)
    pub move_axis: f32,
    pub jump_pressed: bool,
    pub jump_held: bool,
    pub jump_released: bool,
    pub cast_pressed: bool,
}

/// Jump state of a single avatar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Motor {
    jumped: bool,
    is_jumping: bool,
    jump_timer: f32,
    /// Time of the last jump press that could not be honoured
    pre_press_at: Option<f32>,
}

impl Motor {
    /// Apply horizontal input and update facing.
    pub fn drive(&self, axis: f32, body: &mut KinematicBody, facing: &mut Facing, tuning: &GameplayConfig) {
        let axis = axis.clamp(-1.0, 1.0);
        body.velocity.x = axis * tuning.move_speed;
        if let Some(direction) = Facing::from_axis(axis) {
            *facing = direction;
        }
    }

    /// Handle a jump press at `now`.
    pub fn press_jump(&mut self, now: f32, body: &mut KinematicBody, tuning: &GameplayConfig) {
        if body.grounded || !self.jumped {
            self.launch(body, tuning);
        } else {
            self.pre_press_at = Some(now);
        }
    }

    /// Extra lift while the jump button stays down.
    pub fn hold_jump(&mut self, dt: f32, body: &mut KinematicBody, tuning: &GameplayConfig) {
        if !self.is_jumping || tuning.jump_hold_time <= 0.0 {
            return;
        }
        self.jump_timer -= dt;
        if self.jump_timer <= 0.0 {
            self.is_jumping = false;
            return;
        }
        let strength = self.jump_timer / tuning.jump_hold_time;
        body.velocity.y += tuning.jump_force * strength * dt;
    }

    pub fn release_jump(&mut self) {
        self.is_jumping = false;
    }

    /// Called on the tick the body touches ground.
    pub fn landed(&mut self, now: f32, body: &mut KinematicBody, tuning: &GameplayConfig) {
        self.jumped = false;
        self.is_jumping = false;
        if let Some(pressed) = self.pre_press_at.take() {
            if now - pressed <= tuning.jump_pre_press {
                self.launch(body, tuning);
            }
        }
    }

    /// Forget any jump in progress.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_jumping(&self) -> bool {
        self.is_jumping
    }

    fn launch(&mut self, body: &mut KinematicBody, tuning: &GameplayConfig) {
        body.velocity.y = tuning.jump_force;
        body.grounded = false;
        self.jumped = true;
        self.is_jumping = true;
        self.jump_timer = tuning.jump_hold_time;
        self.pre_press_at = None;
    }
}
