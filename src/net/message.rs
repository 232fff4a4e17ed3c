//! Wire schema
//!
//! Every cross-participant message is one variant of [`GameMessage`], wrapped in
//! an [`Envelope`] carrying the protocol version and sender. Payloads are JSON
//! with an explicit `kind` tag, so an unknown or mismatched message fails loudly
//! at decode time instead of being misread.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::authority::Decision;
use super::{AvatarId, ParticipantId};
use crate::avatar::{Facing, LifecycleState};
use crate::error::GameError;
use crate::pickups::{Pickup, PickupId};
use crate::sim::constants::PROTOCOL_VERSION;

/// Which part of a spell produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitSource {
    /// A projectile's on-hit effect
    Projectile,
    /// A self-cast spell's nearby damage
    Nearby,
}

/// A spell striking an avatar, decided by the caster's owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitData {
    pub target: AvatarId,
    pub attacker: AvatarId,
    pub spell: String,
    pub source: HitSource,
    /// Unit vector from the target towards the impact point
    pub direction: Vec2,
}

/// Initial position of an avatar at instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub avatar: AvatarId,
    pub position: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GameMessage {
    /// A participant finished loading the arena
    ImInGame,
    /// Host creates every avatar once all participants are ready
    InitiatePlayers { placements: Vec<Placement> },
    CountdownTick { remaining: u32 },
    StartGame,
    GiveSpell { avatar: AvatarId, spell: String },
    CastSpell {
        avatar: AvatarId,
        spell: String,
        origin: Vec2,
        facing: Facing,
    },
    Hit(HitData),
    Stun {
        target: AvatarId,
        source: AvatarId,
        duration: f32,
    },
    RemoveStun { avatar: AvatarId },
    Die { avatar: AvatarId },
    KillPlayer { killer: AvatarId, victim: AvatarId },
    Spawn { avatar: AvatarId, position: Vec2 },
    Teleport { avatar: AvatarId, position: Vec2 },
    SyncBody {
        avatar: AvatarId,
        position: Vec2,
        velocity: Vec2,
        facing: Facing,
        state: LifecycleState,
    },
    SpawnPickup { pickup: Pickup },
    ProposePickup { pickup: PickupId, consumer: AvatarId },
    ConsumePickup {
        pickup: PickupId,
        consumer: AvatarId,
        spell_index: Option<usize>,
    },
    WinGame { winner: AvatarId },
    ReturnToLobby,
}

impl GameMessage {
    /// The decision this message carries, for authority checks.
    pub fn decision(&self) -> Decision {
        match self {
            GameMessage::ImInGame => Decision::ReportReady,
            GameMessage::InitiatePlayers { .. }
            | GameMessage::CountdownTick { .. }
            | GameMessage::StartGame
            | GameMessage::ReturnToLobby => Decision::MatchFlow,
            GameMessage::WinGame { .. } => Decision::MatchOutcome,
            GameMessage::SpawnPickup { .. } => Decision::PickupSpawn,
            GameMessage::ConsumePickup { .. } => Decision::PickupConsume,
            GameMessage::ProposePickup { consumer, .. } => Decision::PickupProposal(*consumer),
            GameMessage::GiveSpell { avatar, .. } | GameMessage::CastSpell { avatar, .. } => {
                Decision::SpellCast(*avatar)
            }
            GameMessage::Hit(hit) => Decision::SpellEffect { caster: hit.attacker },
            GameMessage::Stun { source, .. } => Decision::SpellEffect { caster: *source },
            GameMessage::RemoveStun { avatar }
            | GameMessage::Die { avatar }
            | GameMessage::Spawn { avatar, .. } => Decision::AvatarLifecycle(*avatar),
            GameMessage::KillPlayer { victim, .. } => Decision::AvatarLifecycle(*victim),
            GameMessage::Teleport { avatar, .. } | GameMessage::SyncBody { avatar, .. } => {
                Decision::AvatarMotion(*avatar)
            }
        }
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            GameMessage::ImInGame => "ImInGame",
            GameMessage::InitiatePlayers { .. } => "InitiatePlayers",
            GameMessage::CountdownTick { .. } => "CountdownTick",
            GameMessage::StartGame => "StartGame",
            GameMessage::GiveSpell { .. } => "GiveSpell",
            GameMessage::CastSpell { .. } => "CastSpell",
            GameMessage::Hit(_) => "Hit",
            GameMessage::Stun { .. } => "Stun",
            GameMessage::RemoveStun { .. } => "RemoveStun",
            GameMessage::Die { .. } => "Die",
            GameMessage::KillPlayer { .. } => "KillPlayer",
            GameMessage::Spawn { .. } => "Spawn",
            GameMessage::Teleport { .. } => "Teleport",
            GameMessage::SyncBody { .. } => "SyncBody",
            GameMessage::SpawnPickup { .. } => "SpawnPickup",
            GameMessage::ProposePickup { .. } => "ProposePickup",
            GameMessage::ConsumePickup { .. } => "ConsumePickup",
            GameMessage::WinGame { .. } => "WinGame",
            GameMessage::ReturnToLobby => "ReturnToLobby",
        }
    }
}

/// Versioned, sender-stamped message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u16,
    pub sender: ParticipantId,
    pub message: GameMessage,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u16,
}

impl Envelope {
    pub fn new(sender: ParticipantId, message: GameMessage) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sender,
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, GameError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode an envelope, rejecting foreign protocol versions before looking
    /// at the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, GameError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.version != PROTOCOL_VERSION {
            return Err(GameError::VersionMismatch {
                found: probe.version,
                expected: PROTOCOL_VERSION,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
