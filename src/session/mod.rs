//! In-process sessions
//!
//! A [`Session`] runs every participant of a match in one process, connected by
//! loopback transports. Each step delivers pending envelopes, ticks every
//! participant and flushes their outboxes, so messages sent in one step are seen
//! by later participants in the same step and by earlier ones in the next.

pub mod participant;

use bevy::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use crate::avatar::motor::PlayerInput;
use crate::error::GameError;
use crate::match_state::MatchPhase;
use crate::net::message::{Envelope, GameMessage};
use crate::net::transport::{LoopbackHub, Transport};
use crate::net::{ParticipantId, Targets};
use crate::sim::rng::GameRng;

pub use participant::{Outgoing, Participant, SharedContext, Task};

struct Seat {
    participant: Participant,
    transport: Box<dyn Transport>,
}

/// Every participant of one match plus the wiring between them.
#[derive(Resource)]
pub struct Session {
    seats: Vec<Seat>,
    host: ParticipantId,
    seed: Option<u64>,
    arena_name: String,
}

impl Session {
    /// Build a session for `roster` with `host` deciding match flow. With a seed,
    /// participant `id` draws from `seed + id`.
    pub fn new(
        roster: Vec<ParticipantId>,
        host: ParticipantId,
        context: SharedContext,
        arena_name: impl Into<String>,
        seed: Option<u64>,
    ) -> Result<Self, GameError> {
        if roster.is_empty() {
            return Err(GameError::InvalidRoster("no participants".to_string()));
        }
        if roster.len() > context.config.max_participants {
            return Err(GameError::InvalidRoster(format!(
                "{} participants exceed the limit of {}",
                roster.len(),
                context.config.max_participants
            )));
        }
        let unique: BTreeSet<_> = roster.iter().collect();
        if unique.len() != roster.len() {
            return Err(GameError::InvalidRoster("duplicate participant ids".to_string()));
        }
        if !roster.contains(&host) {
            return Err(GameError::InvalidRoster(format!(
                "host {} is not part of the roster",
                host
            )));
        }

        let endpoints = LoopbackHub::connect(&roster, host);
        let seats = endpoints
            .into_iter()
            .map(|endpoint| {
                let id = endpoint.local_participant_id();
                let rng = match seed {
                    Some(seed) => GameRng::from_seed(seed.wrapping_add(u64::from(id))),
                    None => GameRng::from_entropy(),
                };
                Seat {
                    participant: Participant::new(id, host, roster.clone(), context.clone(), rng),
                    transport: Box::new(endpoint) as Box<dyn Transport>,
                }
            })
            .collect();

        info!(
            "Session created: {} participants, host {}, seed {:?}",
            roster.len(),
            host,
            seed
        );

        Ok(Self {
            seats,
            host,
            seed,
            arena_name: arena_name.into(),
        })
    }

    pub fn host(&self) -> ParticipantId {
        self.host
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn arena_name(&self) -> &str {
        &self.arena_name
    }

    pub fn roster(&self) -> Vec<ParticipantId> {
        self.seats.iter().map(|seat| seat.participant.id()).collect()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.seats
            .iter()
            .find(|seat| seat.participant.id() == id)
            .map(|seat| &seat.participant)
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.seats
            .iter_mut()
            .find(|seat| seat.participant.id() == id)
            .map(|seat| &mut seat.participant)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.seats.iter().map(|seat| &seat.participant)
    }

    /// The host's view of the match.
    pub fn host_participant(&self) -> Option<&Participant> {
        self.participant(self.host)
    }

    pub fn phase(&self) -> MatchPhase {
        self.host_participant()
            .map(|host| host.match_state().phase())
            .unwrap_or_default()
    }

    /// Every participant reports that it has loaded the arena.
    pub fn start(&mut self) {
        for index in 0..self.seats.len() {
            self.seats[index].participant.enter_game();
            self.flush(index);
        }
    }

    /// Advance every participant by `dt`. Participants without an entry in
    /// `inputs` stand still.
    pub fn step(&mut self, dt: f32, inputs: &BTreeMap<ParticipantId, PlayerInput>) {
        for index in 0..self.seats.len() {
            self.deliver(index);
            let seat = &mut self.seats[index];
            if let Some(input) = inputs.get(&seat.participant.id()) {
                seat.participant.set_input(*input);
            }
            seat.participant.tick(dt);
            self.flush(index);
        }
    }

    /// Broadcast `message` as if `sender` had sent it, without applying it at the
    /// sender. Receivers still run their authority checks.
    pub fn send_raw(&mut self, sender: ParticipantId, targets: Targets, message: GameMessage) {
        let Some(seat) = self.seats.iter().find(|seat| seat.participant.id() == sender) else {
            warn!("Cannot send from unknown participant {}", sender);
            return;
        };
        match Envelope::new(sender, message).encode() {
            Ok(bytes) => seat.transport.broadcast(targets, bytes),
            Err(e) => error!("Failed to encode message from participant {}: {}", sender, e),
        }
    }

    /// Drop every observer. Called when the session is torn down.
    pub fn shutdown(&mut self) {
        for seat in &mut self.seats {
            seat.participant.observers_mut().clear();
        }
        info!("Session shut down");
    }

    fn deliver(&mut self, index: usize) {
        let seat = &mut self.seats[index];
        for bytes in seat.transport.receive() {
            match Envelope::decode(&bytes) {
                Ok(envelope) => seat.participant.receive(envelope.sender, envelope.message),
                Err(e) => warn!(
                    "Participant {} dropped an undecodable message: {}",
                    seat.participant.id(),
                    e
                ),
            }
        }
    }

    fn flush(&mut self, index: usize) {
        let seat = &mut self.seats[index];
        let sender = seat.participant.id();
        for Outgoing { targets, message } in seat.participant.take_outbox() {
            let name = message.name();
            match Envelope::new(sender, message).encode() {
                Ok(bytes) => seat.transport.broadcast(targets, bytes),
                Err(e) => error!("Participant {} failed to encode {}: {}", sender, name, e),
            }
        }
    }
}
