//! Combat notifications
//!
//! Read-only observations published by a participant for presentation, logging and
//! tests. Observers never feed anything back into the simulation.

use bevy::prelude::*;
use std::fmt;

use crate::match_state::MatchPhase;
use crate::net::AvatarId;
use crate::pickups::{Pickup, PickupId};
use crate::spells::projectile::DestroyReason;

/// Something a participant observed this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    HealthChanged {
        avatar: AvatarId,
        health: i32,
        max_health: i32,
    },
    ScoreChanged {
        avatar: AvatarId,
        score: u32,
    },
    /// Local avatar's cooldown, 0 right after casting and 1 when ready
    CooldownProgress {
        avatar: AvatarId,
        progress: f32,
    },
    SpellIconChanged {
        avatar: AvatarId,
        spell: String,
        icon: Option<String>,
    },
    MatchPhaseChanged {
        phase: MatchPhase,
    },
    CountdownTick {
        remaining: u32,
    },
    SpellCast {
        caster: AvatarId,
        spell: String,
    },
    Damaged {
        target: AvatarId,
        attacker: AvatarId,
        spell: String,
        amount: i32,
    },
    Healed {
        target: AvatarId,
        amount: i32,
    },
    Stunned {
        target: AvatarId,
        duration: f32,
    },
    StunCleared {
        target: AvatarId,
    },
    Died {
        avatar: AvatarId,
        killer: Option<AvatarId>,
    },
    Respawned {
        avatar: AvatarId,
        position: Vec2,
    },
    Teleported {
        avatar: AvatarId,
        position: Vec2,
    },
    ObjectSpawned {
        prefab: String,
        position: Vec2,
        lifetime: f32,
    },
    ProjectileDestroyed {
        caster: AvatarId,
        spell: String,
        position: Vec2,
        reason: DestroyReason,
    },
    PickupSpawned {
        pickup: Pickup,
    },
    PickupConsumed {
        pickup: PickupId,
        consumer: AvatarId,
    },
    MatchWon {
        winner: AvatarId,
    },
}

/// Handle returned by [`Observers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback = Box<dyn FnMut(&Notification) + Send + Sync>;

/// Observer registry owned by a participant.
#[derive(Default)]
pub struct Observers {
    callbacks: Vec<(ObserverId, Callback)>,
    next_id: u64,
}

impl Observers {
    pub fn subscribe(&mut self, callback: impl FnMut(&Notification) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Deliver `notification` to every observer in subscription order.
    pub fn notify(&mut self, notification: &Notification) {
        for (_, callback) in &mut self.callbacks {
            callback(notification);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribed", &self.callbacks.len())
            .finish()
    }
}
