//! Authority routing
//!
//! Every gameplay decision has exactly one kind of originator:
//! - **Host**: match flow, win declaration, pickup spawn and consumption
//! - **Owner**: anything about an avatar's own life, motion and casts, and
//!   contact proposals naming that avatar as the consumer
//! - **Any**: readiness reports
//!
//! Decision sites ask [`AuthorityRouter::may_originate`] before acting, and the
//! message dispatcher asks [`AuthorityRouter::permits`] before applying anything
//! received from the network.

use bevy::prelude::*;

use super::{AvatarId, ParticipantId};

/// Who is allowed to originate a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Host,
    Owner(AvatarId),
    Any,
}

/// A kind of gameplay decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// "I have loaded the arena"
    ReportReady,
    /// Instantiation, countdown, start, return to lobby
    MatchFlow,
    /// Declaring the winner
    MatchOutcome,
    PickupSpawn,
    PickupConsume,
    /// Reporting that an avatar touched a pickup
    PickupProposal(AvatarId),
    /// Death, respawn, stun expiry and kill attribution of an avatar
    AvatarLifecycle(AvatarId),
    /// Body state and teleports of an avatar
    AvatarMotion(AvatarId),
    /// Casting and spell grants of an avatar
    SpellCast(AvatarId),
    /// Effects dispatched by a caster's spell (hits, nearby stuns)
    SpellEffect { caster: AvatarId },
}

impl Decision {
    pub fn authority(self) -> Authority {
        match self {
            Decision::ReportReady => Authority::Any,
            Decision::MatchFlow
            | Decision::MatchOutcome
            | Decision::PickupSpawn
            | Decision::PickupConsume => Authority::Host,
            Decision::AvatarLifecycle(avatar)
            | Decision::AvatarMotion(avatar)
            | Decision::SpellCast(avatar)
            | Decision::PickupProposal(avatar)
            | Decision::SpellEffect { caster: avatar } => Authority::Owner(avatar),
        }
    }
}

/// Answers authority questions for one participant.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorityRouter {
    local: ParticipantId,
    host: ParticipantId,
}

impl AuthorityRouter {
    pub fn new(local: ParticipantId, host: ParticipantId) -> Self {
        Self { local, host }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local
    }

    pub fn host_id(&self) -> ParticipantId {
        self.host
    }

    pub fn is_host(&self) -> bool {
        self.local == self.host
    }

    /// Participant that drives `avatar`.
    pub fn owner_of(&self, avatar: AvatarId) -> ParticipantId {
        avatar
    }

    /// Whether `avatar` is simulated by this participant.
    pub fn is_local(&self, avatar: AvatarId) -> bool {
        self.owner_of(avatar) == self.local
    }

    /// Whether `sender` may originate `decision`.
    pub fn permits(&self, sender: ParticipantId, decision: Decision) -> bool {
        match decision.authority() {
            Authority::Host => sender == self.host,
            Authority::Owner(avatar) => sender == self.owner_of(avatar),
            Authority::Any => true,
        }
    }

    /// Whether this participant may originate `decision`.
    pub fn may_originate(&self, decision: Decision) -> bool {
        self.permits(self.local, decision)
    }
}
