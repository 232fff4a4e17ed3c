//! Transport abstraction for encoded envelopes.
//!
//! Implementations:
//! - [`LoopbackEndpoint`]: in-process channels connecting every participant of a
//!   local session (headless runs and tests)
//!
//! Delivery guarantees required from any implementation: messages from one sender
//! arrive in send order, fire-and-forget, nothing blocks waiting for a reply.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use super::{ParticipantId, Targets};

/// Session-layer services consumed by a participant.
pub trait Transport: Send + Sync {
    /// Queue `bytes` for every participant in `targets`.
    fn broadcast(&self, targets: Targets, bytes: Vec<u8>);
    /// Drain everything delivered to this participant so far.
    fn receive(&self) -> Vec<Vec<u8>>;
    fn local_participant_id(&self) -> ParticipantId;
    fn host_id(&self) -> ParticipantId;
    fn is_host(&self) -> bool {
        self.local_participant_id() == self.host_id()
    }
    fn participant_roster(&self) -> Vec<ParticipantId>;
}

/// One participant's connection to an in-process session.
pub struct LoopbackEndpoint {
    local: ParticipantId,
    host: ParticipantId,
    peers: Vec<(ParticipantId, Sender<Vec<u8>>)>,
    inbox: Mutex<Receiver<Vec<u8>>>,
}

/// Builder for a fully connected set of loopback endpoints.
pub struct LoopbackHub;

impl LoopbackHub {
    /// Create one endpoint per roster entry, in roster order.
    pub fn connect(roster: &[ParticipantId], host: ParticipantId) -> Vec<LoopbackEndpoint> {
        let (senders, receivers): (Vec<_>, Vec<_>) = roster
            .iter()
            .map(|id| {
                let (tx, rx) = mpsc::channel::<Vec<u8>>();
                ((*id, tx), rx)
            })
            .unzip();

        roster
            .iter()
            .zip(receivers)
            .map(|(id, rx)| LoopbackEndpoint {
                local: *id,
                host,
                peers: senders.clone(),
                inbox: Mutex::new(rx),
            })
            .collect()
    }
}

impl Transport for LoopbackEndpoint {
    fn broadcast(&self, targets: Targets, bytes: Vec<u8>) {
        for (id, tx) in &self.peers {
            if targets.includes(*id, self.local, self.host) {
                // A dropped receiver means that participant left; nothing to deliver
                let _ = tx.send(bytes.clone());
            }
        }
    }

    fn receive(&self) -> Vec<Vec<u8>> {
        let inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        inbox.try_iter().collect()
    }

    fn local_participant_id(&self) -> ParticipantId {
        self.local
    }

    fn host_id(&self) -> ParticipantId {
        self.host
    }

    fn participant_roster(&self) -> Vec<ParticipantId> {
        self.peers.iter().map(|(id, _)| *id).collect()
    }
}
