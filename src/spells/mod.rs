//! Spells
//!
//! - [`catalog`]: immutable spell definitions loaded from RON
//! - [`cooldown`]: the per-avatar cast state
//! - [`projectile`]: travelling projectiles and their contacts
//! - [`resolver`]: cast acceptance and self-cast effect resolution

pub mod catalog;
pub mod cooldown;
pub mod projectile;
pub mod resolver;

pub use catalog::{load_spell_catalog, SpellCatalog, SpellDefinition, SpellId};
pub use resolver::{CastRejection, SpellEffect, SpellResolver};
