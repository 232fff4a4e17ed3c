//! Error types
//!
//! [`GameError`] covers failures a participant recovers from locally (bad
//! reference data, malformed or foreign messages). [`CatalogError`] covers
//! loading the spell catalog, which is fatal at startup.

use thiserror::Error;

use crate::net::ParticipantId;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("spell '{0}' not found in catalog")]
    UnknownSpell(String),

    #[error("spell index {index} out of range (catalog has {len} spells)")]
    SpellIndexOutOfRange { index: usize, len: usize },

    #[error("avatar {0} does not exist")]
    UnknownAvatar(ParticipantId),

    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    #[error("protocol version {found} is not supported (expected {expected})")]
    VersionMismatch { found: u16, expected: u16 },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse spell catalog: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid spell catalog: {0}")]
    Invalid(String),
}
