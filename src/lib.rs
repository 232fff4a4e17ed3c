//! spellclash - authoritative gameplay core for a multiplayer spell-combat arena
//!
//! Every participant of a session runs the same simulation. Decisions are made by
//! exactly one authority (the host for match flow and pickups, an avatar's owner
//! for that avatar and its spells) and broadcast to everyone else.
//!
//! This library exposes the core game modules for testing and reuse.

pub mod avatar;
pub mod cli;
pub mod combat;
pub mod error;
pub mod headless;
pub mod match_state;
pub mod net;
pub mod pickups;
pub mod session;
pub mod sim;
pub mod spells;

// Re-export commonly used types
pub use combat::log::{CombatLog, CombatLogEventType};
pub use error::{CatalogError, GameError};
pub use headless::HeadlessMatchConfig;
pub use match_state::{MatchMode, MatchPhase, MatchStateMachine};
pub use session::{Participant, Session, SharedContext};
pub use spells::catalog::SpellCatalog;
