//! Per-avatar cast availability
//!
//! An avatar carries exactly one [`SpellCastState`]: the spell it currently holds
//! and when it last cast it. Granting a new spell replaces the state wholesale, so
//! a fresh grant is always castable.

use super::catalog::{SpellDefinition, SpellId};

/// Bound spell plus its cooldown clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpellCastState {
    pub spell: SpellId,
    pub cooldown: f32,
    /// Time of the last accepted cast, `None` until the first one
    pub last_cast_time: Option<f32>,
}

impl SpellCastState {
    pub fn new(spell: SpellId, definition: &SpellDefinition) -> Self {
        Self {
            spell,
            cooldown: definition.cooldown.max(0.0),
            last_cast_time: None,
        }
    }

    /// Whether the cooldown has elapsed at `now`.
    pub fn can_cast(&self, now: f32) -> bool {
        match self.last_cast_time {
            Some(last) => now - last >= self.cooldown,
            None => true,
        }
    }

    /// Stamp an accepted cast. Unconditional: callers gate on [`can_cast`](Self::can_cast).
    pub fn on_cast(&mut self, now: f32) {
        self.last_cast_time = Some(now);
    }

    /// Cooldown progress in `0.0..=1.0`, where 1 means ready.
    pub fn progress(&self, now: f32) -> f32 {
        match self.last_cast_time {
            Some(last) if self.cooldown > 0.0 => ((now - last) / self.cooldown).clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Seconds until the spell is ready again.
    pub fn remaining(&self, now: f32) -> f32 {
        match self.last_cast_time {
            Some(last) => (last + self.cooldown - now).max(0.0),
            None => 0.0,
        }
    }
}
