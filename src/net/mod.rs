//! Networking seams
//!
//! - [`authority`]: who may originate which decision
//! - [`message`]: the versioned wire schema
//! - [`transport`]: the delivery trait and an in-process loopback

pub mod authority;
pub mod message;
pub mod transport;

use serde::{Deserialize, Serialize};

/// Stable per-participant identifier assigned by the session layer.
pub type ParticipantId = u32;

/// Avatars are identified by the participant that owns them.
pub type AvatarId = ParticipantId;

/// Recipient set of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Targets {
    /// Every participant including the sender
    All,
    /// Every participant except the sender
    Others,
    /// Only the host
    Host,
    /// A single participant
    Only(ParticipantId),
}

impl Targets {
    /// Whether `participant` receives a message `sender` sent to these targets.
    pub fn includes(self, participant: ParticipantId, sender: ParticipantId, host: ParticipantId) -> bool {
        match self {
            Targets::All => true,
            Targets::Others => participant != sender,
            Targets::Host => participant == host,
            Targets::Only(id) => participant == id,
        }
    }

    /// The same recipients minus the sender, or `None` if nobody remains.
    pub fn without_sender(self, sender: ParticipantId, host: ParticipantId) -> Option<Targets> {
        match self {
            Targets::All | Targets::Others => Some(Targets::Others),
            Targets::Host if sender == host => None,
            Targets::Only(id) if id == sender => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_membership() {
        assert!(Targets::All.includes(0, 0, 0));
        assert!(!Targets::Others.includes(1, 1, 0));
        assert!(Targets::Others.includes(2, 1, 0));
        assert!(Targets::Host.includes(0, 3, 0));
        assert!(!Targets::Host.includes(3, 3, 0));
        assert!(Targets::Only(2).includes(2, 0, 0));
    }

    #[test]
    fn test_without_sender() {
        assert_eq!(Targets::All.without_sender(1, 0), Some(Targets::Others));
        assert_eq!(Targets::Host.without_sender(0, 0), None);
        assert_eq!(Targets::Host.without_sender(2, 0), Some(Targets::Host));
        assert_eq!(Targets::Only(2).without_sender(2, 0), None);
    }
}
