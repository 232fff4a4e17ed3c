//! Gameplay Constants
//!
//! Default tuning values for the arena simulation. Every value here can be
//! overridden through [`GameplayConfig`](super::config::GameplayConfig); these are
//! the values a config file falls back to when a field is omitted.

// ============================================================================
// Avatars
// ============================================================================

/// Starting and maximum health of every avatar.
pub const MAX_HEALTH: i32 = 10;

/// Seconds an avatar stays dead before its owner respawns it.
pub const DEAD_DURATION: f32 = 3.0;

/// Distance below the lowest tile at which a falling avatar dies.
pub const KILL_Y_MARGIN: f32 = 4.0;

/// Half width/height of an avatar's collision box.
pub const AVATAR_HALF_EXTENTS: [f32; 2] = [0.35, 0.45];

/// Largest roster a session accepts.
pub const MAX_PARTICIPANTS: usize = 4;

// ============================================================================
// Movement
// ============================================================================

/// Horizontal speed in units per second at full move input.
pub const MOVE_SPEED: f32 = 5.0;

/// Initial upward velocity of a jump.
pub const JUMP_FORCE: f32 = 7.0;

/// How long a held jump keeps adding upward acceleration.
pub const JUMP_HOLD_TIME: f32 = 1.0;

/// A jump pressed this many seconds before landing still triggers on landing.
pub const JUMP_PRE_PRESS: f32 = 0.1;

/// Downward acceleration applied to bodies with gravity scale 1.
pub const GRAVITY: f32 = 20.0;

// ============================================================================
// Spells
// ============================================================================

/// Fraction of the cast animation after which the spell effect fires.
pub const SPELL_CAST_TIME: f32 = 0.9;

/// Length of the cast animation in seconds.
pub const CAST_ANIMATION_DURATION: f32 = 0.5;

/// Seconds a projectile lives before it is destroyed.
pub const PROJECTILE_LIFETIME: f32 = 10.0;

/// Contact radius of a projectile.
pub const PROJECTILE_RADIUS: f32 = 0.2;

/// Horizontal offset from the avatar centre at which spells spawn.
pub const SPELL_SPAWN_OFFSET: f32 = 0.6;

// ============================================================================
// Pickups
// ============================================================================

/// Pickups that may exist at the same time.
pub const MAX_PICKUPS: usize = 3;

/// Delay after match start before the first pickup timer begins.
pub const PICKUP_START_DELAY: f32 = 5.0;

/// Bounds of the random interval between pickup spawns.
pub const PICKUP_MIN_INTERVAL: f32 = 4.0;
pub const PICKUP_MAX_INTERVAL: f32 = 9.0;

/// Contact radius of a pickup.
pub const PICKUP_RADIUS: f32 = 0.4;

/// Reach beyond [`PICKUP_RADIUS`] the host tolerates when checking a contact proposal.
pub const PICKUP_CONTACT_SLACK: f32 = 1.0;

// ============================================================================
// Match Flow
// ============================================================================

/// Countdown ticks (one per second) between instantiation and match start.
pub const COUNTDOWN_FROM: u32 = 3;

/// Seconds the end screen stays up before returning to the lobby.
pub const END_GAME_HANG_TIME: f32 = 5.0;

/// Wire protocol version stamped on every envelope.
pub const PROTOCOL_VERSION: u16 = 1;
