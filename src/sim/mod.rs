//! Simulation primitives shared by every participant.

pub mod config;
pub mod constants;
pub mod physics;
pub mod rng;
pub mod scheduler;
pub mod terrain;

pub use config::GameplayConfig;
pub use rng::GameRng;
pub use terrain::{ArenaLayout, Terrain};
