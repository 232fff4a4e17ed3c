//! Avatar state machine
//!
//! One [`Avatar`] exists per participant on every participant. The owner's copy is
//! authoritative: it simulates the body, decides deaths and stun expiry, and
//! broadcasts those transitions. Every other copy is a mirror that only applies
//! received effects.
//!
//! ## States
//! - `Idle`, `Moving`, `InAir` are re-derived from the body every tick
//! - `Stunned` and `Dead` are sticky and only left through an explicit transition
//!
//! Invariants held at every tick boundary:
//! - `health == 0` exactly when the state is `Dead`
//! - a `Stunned` avatar can neither move nor attack

pub mod motor;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::net::AvatarId;
use crate::sim::physics::KinematicBody;
use crate::spells::cooldown::SpellCastState;
use motor::Motor;

/// Horizontal orientation of an avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

impl Facing {
    /// -1.0 for left, 1.0 for right.
    pub fn sign(self) -> f32 {
        match self {
            Facing::Left => -1.0,
            Facing::Right => 1.0,
        }
    }

    /// Direction of a non-zero move axis.
    pub fn from_axis(axis: f32) -> Option<Self> {
        if axis > 0.0 {
            Some(Facing::Right)
        } else if axis < 0.0 {
            Some(Facing::Left)
        } else {
            None
        }
    }
}

/// Lifecycle state of an avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Idle,
    Moving,
    InAir,
    Stunned,
    Dead,
}

impl LifecycleState {
    /// Stunned and Dead only change through explicit transitions.
    pub fn is_sticky(self) -> bool {
        matches!(self, LifecycleState::Stunned | LifecycleState::Dead)
    }
}

/// Result of [`Avatar::apply_damage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// The avatar was already dead
    Ignored,
    Wounded { health: i32 },
    /// The locally owned avatar died; the caller broadcasts and attributes it
    Killed { killer: Option<AvatarId> },
    /// A mirror took lethal damage and stays at 1 health until its owner
    /// broadcasts the death
    AwaitingOwner,
}

/// Player-controlled wizard.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub id: AvatarId,
    pub health: i32,
    pub max_health: i32,
    pub score: u32,
    pub facing: Facing,
    pub body: KinematicBody,
    pub motor: Motor,
    state: LifecycleState,
    stun_expiry: Option<f32>,
    spell: Option<SpellCastState>,
    killed_by: Option<AvatarId>,
    /// Set once the current death has been credited to a killer
    kill_attributed: bool,
    /// Match-level gates, opened at match start and closed at match end
    move_enabled: bool,
    attack_enabled: bool,
    casting: bool,
    local: bool,
}

impl Avatar {
    pub fn new(id: AvatarId, max_health: i32, position: Vec2, half_extents: Vec2, local: bool) -> Self {
        let mut body = KinematicBody::new(position, half_extents);
        // Mirrors are placed by their owner's updates, never integrated
        body.simulated = local;
        Self {
            id,
            health: max_health,
            max_health,
            score: 0,
            facing: Facing::default(),
            body,
            motor: Motor::default(),
            state: LifecycleState::Idle,
            stun_expiry: None,
            spell: None,
            killed_by: None,
            kill_attributed: false,
            move_enabled: false,
            attack_enabled: false,
            casting: false,
            local,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn is_alive(&self) -> bool {
        self.state != LifecycleState::Dead
    }

    pub fn is_stunned(&self) -> bool {
        self.state == LifecycleState::Stunned
    }

    pub fn can_move(&self) -> bool {
        self.move_enabled && !self.state.is_sticky()
    }

    pub fn can_attack(&self) -> bool {
        self.attack_enabled && !self.state.is_sticky()
    }

    pub fn is_casting(&self) -> bool {
        self.casting
    }

    pub fn set_casting(&mut self, casting: bool) {
        self.casting = casting;
    }

    pub fn killed_by(&self) -> Option<AvatarId> {
        self.killed_by
    }

    pub fn stun_expiry(&self) -> Option<f32> {
        self.stun_expiry
    }

    pub fn spell(&self) -> Option<&SpellCastState> {
        self.spell.as_ref()
    }

    pub fn spell_mut(&mut self) -> Option<&mut SpellCastState> {
        self.spell.as_mut()
    }

    /// Replace the held spell with a fresh cast state.
    pub fn grant_spell(&mut self, spell: SpellCastState) {
        self.spell = Some(spell);
    }

    /// Open or close the match-level movement and attack gates.
    pub fn set_capabilities(&mut self, can_move: bool, can_attack: bool) {
        self.move_enabled = can_move;
        self.attack_enabled = can_attack;
    }

    /// Re-derive Idle/Moving/InAir from the body. Sticky states are left alone.
    pub fn refresh_motion_state(&mut self) {
        if self.state.is_sticky() {
            return;
        }
        self.state = if !self.body.grounded {
            if self.body.velocity == Vec2::ZERO {
                LifecycleState::Idle
            } else {
                LifecycleState::InAir
            }
        } else if self.body.velocity.x != 0.0 {
            LifecycleState::Moving
        } else {
            LifecycleState::Idle
        };
    }

    /// Mirror a motion state reported by the owner.
    pub fn mirror_motion_state(&mut self, reported: LifecycleState) {
        if !self.state.is_sticky() && !reported.is_sticky() {
            self.state = reported;
        }
    }

    /// Apply damage from `attacker`. No-op on a dead avatar.
    pub fn apply_damage(&mut self, amount: i32, attacker: AvatarId) -> DamageOutcome {
        if !self.is_alive() {
            return DamageOutcome::Ignored;
        }

        self.killed_by = Some(attacker);
        let remaining = self.health - amount.max(0);
        if remaining > 0 {
            self.health = remaining;
            return DamageOutcome::Wounded { health: remaining };
        }

        if self.local {
            self.kill();
            DamageOutcome::Killed {
                killer: self.killed_by,
            }
        } else {
            self.health = 1;
            DamageOutcome::AwaitingOwner
        }
    }

    /// Restore health up to the maximum. Returns the amount actually healed.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if !self.is_alive() {
            return 0;
        }
        let before = self.health;
        self.health = (self.health + amount.max(0)).min(self.max_health);
        self.health - before
    }

    /// Stun until `now + duration`. Re-stunning refreshes the expiry.
    pub fn stun(&mut self, duration: f32, now: f32) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.state = LifecycleState::Stunned;
        self.stun_expiry = Some(now + duration);
        self.body.velocity.x = 0.0;
        true
    }

    /// Leave the stunned state. Safe to call when not stunned.
    pub fn clear_stun(&mut self) -> bool {
        self.stun_expiry = None;
        if self.state == LifecycleState::Stunned {
            self.state = LifecycleState::Idle;
            true
        } else {
            false
        }
    }

    /// Whether the owner should end the stun at `now`.
    pub fn stun_expired(&self, now: f32) -> bool {
        self.is_stunned() && self.stun_expiry.is_some_and(|expiry| now >= expiry)
    }

    /// Enter the dead state. Returns false if already dead.
    pub fn kill(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.clear_stun();
        self.health = 0;
        self.state = LifecycleState::Dead;
        self.casting = false;
        self.motor.reset();
        self.body.disable();
        true
    }

    /// Come back to life at `position` with full health.
    pub fn respawn(&mut self, position: Vec2) {
        self.health = self.max_health;
        self.state = LifecycleState::Idle;
        self.stun_expiry = None;
        self.killed_by = None;
        self.kill_attributed = false;
        self.casting = false;
        self.motor.reset();
        self.body.enable_at(position);
        self.body.simulated = self.local;
    }

    /// Claim the kill credit for the current death. Only the first claim while
    /// dead succeeds, so a replayed attribution never scores twice.
    pub fn claim_kill_attribution(&mut self) -> bool {
        if self.is_alive() || self.kill_attributed {
            return false;
        }
        self.kill_attributed = true;
        true
    }

    /// Point at which this avatar's spells appear.
    pub fn cast_origin(&self, offset: f32) -> Vec2 {
        self.body.position + Vec2::new(offset * self.facing.sign(), 0.0)
    }

    /// Debug-only invariant check.
    pub fn debug_validate(&self) {
        debug_assert!(
            (self.health == 0) == (self.state == LifecycleState::Dead),
            "avatar {}: health {} in state {:?}",
            self.id,
            self.health,
            self.state
        );
        debug_assert!(self.health >= 0 && self.health <= self.max_health);
        debug_assert!(!self.is_stunned() || (!self.can_move() && !self.can_attack()));
    }
}
