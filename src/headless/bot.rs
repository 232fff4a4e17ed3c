//! Bot brains for headless matches
//!
//! A bot reads its own participant's view of the match and produces the
//! [`PlayerInput`] for the next tick. Bots never touch simulation state directly,
//! so everything they do goes through the same paths as a human player.

use bevy::prelude::*;

use crate::avatar::motor::PlayerInput;
use crate::avatar::Avatar;
use crate::match_state::MatchPhase;
use crate::net::ParticipantId;
use crate::session::Participant;
use crate::sim::rng::GameRng;
use crate::sim::terrain::Terrain;

/// Only cast at targets within this height difference.
const ENGAGE_HEIGHT: f32 = 1.5;
/// Stop walking once this close horizontally.
const CLOSE_ENOUGH: f32 = 2.0;
/// How long a bot keeps the jump button down.
const JUMP_HOLD: f32 = 0.3;
/// Per-tick chance a wandering bot casts when its spell is ready.
const WANDER_CAST_CHANCE: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotStyle {
    /// Chase the nearest living avatar and cast whenever lined up
    #[default]
    Aggressive,
    /// Walk around at random, casting now and then
    Wanderer,
    /// Stand still
    Idle,
}

impl BotStyle {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name {
            "Aggressive" => Ok(BotStyle::Aggressive),
            "Wanderer" => Ok(BotStyle::Wanderer),
            "Idle" => Ok(BotStyle::Idle),
            _ => Err(format!(
                "Unknown bot style: '{}'. Valid styles: Aggressive, Wanderer, Idle",
                name
            )),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BotStyle::Aggressive => "Aggressive",
            BotStyle::Wanderer => "Wanderer",
            BotStyle::Idle => "Idle",
        }
    }
}

/// Input generator for one participant.
pub struct BotBrain {
    pub participant: ParticipantId,
    pub style: BotStyle,
    rng: GameRng,
    wander_axis: f32,
    wander_timer: f32,
    jump_hold_left: f32,
}

impl BotBrain {
    pub fn new(participant: ParticipantId, style: BotStyle, rng: GameRng) -> Self {
        Self {
            participant,
            style,
            rng,
            wander_axis: 0.0,
            wander_timer: 0.0,
            jump_hold_left: 0.0,
        }
    }

    /// Decide the input for the next tick from `view`, the bot's own participant.
    pub fn think(&mut self, view: &Participant, dt: f32) -> PlayerInput {
        let Some(me) = view.local_avatar().filter(|avatar| avatar.is_alive()) else {
            self.jump_hold_left = 0.0;
            return PlayerInput::default();
        };
        if view.match_state().phase() != MatchPhase::Playing {
            return PlayerInput::default();
        }

        match self.style {
            BotStyle::Idle => PlayerInput::default(),
            BotStyle::Aggressive => match nearest_enemy(view, me) {
                Some(target) => self.chase(view, me, target, dt),
                None => self.wander(view, me, dt),
            },
            BotStyle::Wanderer => self.wander(view, me, dt),
        }
    }

    fn chase(&mut self, view: &Participant, me: &Avatar, target: &Avatar, dt: f32) -> PlayerInput {
        let mut input = PlayerInput::default();
        let offset = target.body.position - me.body.position;
        let toward = if offset.x < 0.0 { -1.0 } else { 1.0 };
        let facing_target = me.facing.sign() == toward;

        if offset.x.abs() > CLOSE_ENOUGH || !facing_target {
            input.move_axis = toward;
        }
        if offset.y > ENGAGE_HEIGHT || obstructed(view.terrain(), me, input.move_axis) {
            self.start_jump(&mut input, me);
        }
        self.continue_jump(&mut input, dt);

        if offset.y.abs() < ENGAGE_HEIGHT && facing_target && spell_ready(view, me) {
            input.cast_pressed = true;
        }
        input
    }

    fn wander(&mut self, view: &Participant, me: &Avatar, dt: f32) -> PlayerInput {
        self.wander_timer -= dt;
        if self.wander_timer <= 0.0 {
            self.wander_axis = match self.rng.index(3) {
                Some(0) => -1.0,
                Some(1) => 0.0,
                _ => 1.0,
            };
            self.wander_timer = self.rng.random_range(1.0, 3.0);
        }
        // Turn around instead of walking off a ledge
        if obstructed(view.terrain(), me, self.wander_axis) {
            self.wander_axis = -self.wander_axis;
        }

        let mut input = PlayerInput {
            move_axis: self.wander_axis,
            ..default()
        };
        self.continue_jump(&mut input, dt);
        if spell_ready(view, me) && self.rng.random_f32() < WANDER_CAST_CHANCE {
            input.cast_pressed = true;
        }
        input
    }

    fn start_jump(&mut self, input: &mut PlayerInput, me: &Avatar) {
        if me.body.grounded && self.jump_hold_left <= 0.0 {
            input.jump_pressed = true;
            self.jump_hold_left = JUMP_HOLD;
        }
    }

    fn continue_jump(&mut self, input: &mut PlayerInput, dt: f32) {
        if self.jump_hold_left <= 0.0 {
            return;
        }
        self.jump_hold_left -= dt;
        input.jump_held = true;
        if self.jump_hold_left <= 0.0 {
            input.jump_released = true;
        }
    }
}

/// Closest other living avatar, lowest id on ties.
fn nearest_enemy<'a>(view: &'a Participant, me: &Avatar) -> Option<&'a Avatar> {
    view.avatars()
        .values()
        .filter(|other| other.id != me.id && other.is_alive())
        .min_by(|a, b| {
            let da = a.body.position.distance_squared(me.body.position);
            let db = b.body.position.distance_squared(me.body.position);
            da.total_cmp(&db)
        })
}

fn spell_ready(view: &Participant, me: &Avatar) -> bool {
    !me.is_casting() && me.can_attack() && view.cooldown_progress().is_some_and(|p| p >= 1.0)
}

/// A wall or a drop directly ahead in the direction of `axis`.
fn obstructed(terrain: &dyn Terrain, me: &Avatar, axis: f32) -> bool {
    if axis == 0.0 || !me.body.grounded {
        return false;
    }
    let reach = me.body.half_extents.x + 0.5;
    let position = me.body.position;
    let wall = terrain.is_solid(Vec2::new(position.x + axis * reach, position.y));
    let floor = terrain.is_solid(Vec2::new(
        position.x + axis * reach,
        position.y - me.body.half_extents.y - 0.5,
    ));
    wall || !floor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bot_style() {
        assert_eq!(BotStyle::parse("Wanderer"), Ok(BotStyle::Wanderer));
        assert_eq!(BotStyle::parse("Idle").map(BotStyle::name), Ok("Idle"));
        assert!(BotStyle::parse("Berserk").is_err());
    }

    #[test]
    fn test_jump_hold_releases_after_window() {
        let mut brain = BotBrain::new(0, BotStyle::Aggressive, GameRng::from_seed(1));
        brain.jump_hold_left = JUMP_HOLD;

        let mut input = PlayerInput::default();
        brain.continue_jump(&mut input, 0.2);
        assert!(input.jump_held && !input.jump_released);

        let mut input = PlayerInput::default();
        brain.continue_jump(&mut input, 0.2);
        assert!(input.jump_held && input.jump_released);

        let mut input = PlayerInput::default();
        brain.continue_jump(&mut input, 0.2);
        assert!(!input.jump_held);
    }
}
