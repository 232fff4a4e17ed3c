//! Gameplay tuning configuration
//!
//! Every field is optional in serialized form and falls back to the matching
//! value in [`constants`](super::constants).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::constants::*;
use crate::pickups::SpellGrant;

/// How avatars receive their spells outside of pickups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpellDistribution {
    /// A random spell once, when the avatar is instantiated
    #[default]
    RandomOnStart,
    /// A random spell at instantiation and again after every respawn
    RandomOnSpawn,
}

/// Pickup timing and loot table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PickupConfig {
    pub max_pickups: usize,
    /// Delay after match start before the first spawn interval begins
    pub start_delay: f32,
    pub min_interval: f32,
    pub max_interval: f32,
    pub radius: f32,
    /// Extra reach the host grants a proposal, covering position drift between views
    pub contact_slack: f32,
    /// Heal amounts of the health pickup variants
    pub health_variants: Vec<i32>,
    /// Spell pickup variants
    pub spell_variants: Vec<SpellGrant>,
}

impl Default for PickupConfig {
    fn default() -> Self {
        Self {
            max_pickups: MAX_PICKUPS,
            start_delay: PICKUP_START_DELAY,
            min_interval: PICKUP_MIN_INTERVAL,
            max_interval: PICKUP_MAX_INTERVAL,
            radius: PICKUP_RADIUS,
            contact_slack: PICKUP_CONTACT_SLACK,
            health_variants: vec![3, 5],
            spell_variants: vec![SpellGrant::Random],
        }
    }
}

/// Tuning shared by every participant of a session.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplayConfig {
    pub max_health: i32,
    pub dead_duration: f32,
    pub kill_y_margin: f32,
    pub avatar_half_extents: Vec2,
    pub max_participants: usize,

    // === Movement ===
    pub move_speed: f32,
    pub jump_force: f32,
    pub jump_hold_time: f32,
    pub jump_pre_press: f32,
    pub gravity: f32,

    // === Spells ===
    /// Fraction of the cast animation after which the effect fires
    pub spell_cast_time: f32,
    pub cast_animation_duration: f32,
    pub projectile_lifetime: f32,
    pub projectile_radius: f32,
    pub spell_spawn_offset: f32,
    pub spell_distribution: SpellDistribution,

    // === Match flow ===
    pub countdown_from: u32,
    pub end_game_hang_time: f32,

    pub pickups: PickupConfig,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            max_health: MAX_HEALTH,
            dead_duration: DEAD_DURATION,
            kill_y_margin: KILL_Y_MARGIN,
            avatar_half_extents: Vec2::from(AVATAR_HALF_EXTENTS),
            max_participants: MAX_PARTICIPANTS,
            move_speed: MOVE_SPEED,
            jump_force: JUMP_FORCE,
            jump_hold_time: JUMP_HOLD_TIME,
            jump_pre_press: JUMP_PRE_PRESS,
            gravity: GRAVITY,
            spell_cast_time: SPELL_CAST_TIME,
            cast_animation_duration: CAST_ANIMATION_DURATION,
            projectile_lifetime: PROJECTILE_LIFETIME,
            projectile_radius: PROJECTILE_RADIUS,
            spell_spawn_offset: SPELL_SPAWN_OFFSET,
            spell_distribution: SpellDistribution::default(),
            countdown_from: COUNTDOWN_FROM,
            end_game_hang_time: END_GAME_HANG_TIME,
            pickups: PickupConfig::default(),
        }
    }
}

impl GameplayConfig {
    /// Delay between accepting a cast and firing its effect.
    pub fn cast_delay(&self) -> f32 {
        self.spell_cast_time * self.cast_animation_duration
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_health <= 0 {
            return Err("max_health must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.spell_cast_time) {
            return Err(format!(
                "spell_cast_time must be within 0..=1, got {}",
                self.spell_cast_time
            ));
        }
        if self.dead_duration < 0.0 || self.cast_animation_duration < 0.0 {
            return Err("durations must not be negative".to_string());
        }
        if self.max_participants == 0 || self.max_participants > MAX_PARTICIPANTS {
            return Err(format!(
                "max_participants must be 1-{}, got {}",
                MAX_PARTICIPANTS, self.max_participants
            ));
        }
        let pickups = &self.pickups;
        if pickups.min_interval < 0.0 || pickups.min_interval > pickups.max_interval {
            return Err(format!(
                "pickup interval {}..{} is not a valid range",
                pickups.min_interval, pickups.max_interval
            ));
        }
        if pickups.health_variants.iter().any(|amount| *amount <= 0) {
            return Err("health pickup amounts must be positive".to_string());
        }
        Ok(())
    }
}
