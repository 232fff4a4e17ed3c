//! Data-Driven Spell Catalog
//!
//! Spell definitions live in `assets/config/spells.ron` and are loaded once into an
//! immutable [`SpellCatalog`] shared by every participant. Definitions are looked
//! up by name (the wire identity of a spell) or by index (the order of the file,
//! used when the host resolves a random spell for a pickup).
//!
//! ## Usage
//! ```ignore
//! let catalog = load_spell_catalog()?;
//! let (id, fireball) = catalog.lookup("Fireball")?;
//! println!("Fireball cooldown: {}", fireball.cooldown);
//! ```

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CatalogError, GameError};
use crate::sim::rng::GameRng;

/// Default location of the spell catalog.
pub const SPELLS_CONFIG_PATH: &str = "assets/config/spells.ron";

/// Index of a spell inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpellId(pub usize);

/// Cosmetic object left behind by a spell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnObject {
    /// Presentation-side prefab name
    pub prefab: String,
    /// Seconds before the object disappears (0 = stays)
    #[serde(default)]
    pub lifetime: f32,
}

/// Per-tick override of a projectile's vertical velocity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum VelocityAffector {
    /// `vy = sin(t * intensity * 2) * intensity - gravity_scale`
    SinWave { intensity: f32 },
}

/// What happens to an avatar struck by a projectile.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitEffect {
    pub damage: Option<i32>,
    /// Stun duration in seconds
    pub stun: Option<f32>,
    /// Health returned to the caster
    pub heal_caster: Option<i32>,
    pub spawn_object: Option<SpawnObject>,
}

/// A spell that launches a travelling projectile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSpell {
    /// Horizontal launch speed in units per second
    pub speed: f32,
    /// Gravity scale of the projectile (0 = flies straight)
    #[serde(default)]
    pub drop: f32,
    #[serde(default)]
    pub affector: Option<VelocityAffector>,
    /// Ignore ground contacts instead of breaking on them
    #[serde(default)]
    pub pass_through_ground: bool,
    #[serde(default)]
    pub on_hit: HitEffect,
}

/// Damage dealt to every other avatar within `range` of the caster.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyDamage {
    pub range: f32,
    pub damage: i32,
}

/// Stun applied to every other avatar within `range` of the caster.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NearbyStun {
    pub range: f32,
    pub duration: f32,
}

/// Where a self-cast teleport sends the caster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeleportTarget {
    /// Any surface cell
    RandomPosition,
    /// Any other living avatar
    RandomPlayer,
    /// The closest other living avatar
    NearestPlayer,
    /// The furthest other living avatar
    FurthestPlayer,
    /// The highest surface cell
    TopOfMap,
}

/// A spell resolved instantly around the caster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfCastSpell {
    pub heal_caster: Option<i32>,
    pub damage_nearby: Option<NearbyDamage>,
    pub stun_nearby: Option<NearbyStun>,
    pub teleport: Option<TeleportTarget>,
    pub spawn_object: Option<SpawnObject>,
}

/// Cast kind together with its effect descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CastKind {
    Projectile(ProjectileSpell),
    SelfCast(SelfCastSpell),
}

/// Immutable definition of a single spell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpellDefinition {
    /// Unique name, also the spell's identity on the wire
    pub name: String,
    /// Minimum seconds between casts
    #[serde(default)]
    pub cooldown: f32,
    /// Presentation-side icon handle
    #[serde(default)]
    pub icon: Option<String>,
    pub kind: CastKind,
}

impl SpellDefinition {
    pub fn is_projectile(&self) -> bool {
        matches!(self.kind, CastKind::Projectile(_))
    }

    fn validate(&self) -> Result<(), String> {
        let positive = |value: f32, what: &str| {
            if value > 0.0 {
                Ok(())
            } else {
                Err(format!("'{}': {} must be positive, got {}", self.name, what, value))
            }
        };

        if self.name.trim().is_empty() {
            return Err("spell with an empty name".to_string());
        }
        if self.cooldown < 0.0 {
            return Err(format!("'{}': cooldown must not be negative", self.name));
        }

        let spawn_object = match &self.kind {
            CastKind::Projectile(projectile) => {
                positive(projectile.speed, "projectile speed")?;
                if let Some(stun) = projectile.on_hit.stun {
                    positive(stun, "stun duration")?;
                }
                projectile.on_hit.spawn_object.as_ref()
            }
            CastKind::SelfCast(effect) => {
                if let Some(nearby) = effect.damage_nearby {
                    positive(nearby.range, "nearby damage range")?;
                }
                if let Some(nearby) = effect.stun_nearby {
                    positive(nearby.range, "nearby stun range")?;
                    positive(nearby.duration, "nearby stun duration")?;
                }
                effect.spawn_object.as_ref()
            }
        };

        if spawn_object.is_some_and(|object| object.lifetime < 0.0) {
            return Err(format!("'{}': spawn object lifetime must not be negative", self.name));
        }
        Ok(())
    }
}

/// Root structure of the spells.ron file
#[derive(Debug, Serialize, Deserialize)]
pub struct SpellsConfig {
    pub spells: Vec<SpellDefinition>,
}

/// Immutable registry of spell definitions.
#[derive(Resource, Debug, Clone)]
pub struct SpellCatalog {
    spells: Vec<SpellDefinition>,
    by_name: HashMap<String, SpellId>,
}

impl SpellCatalog {
    /// Build and validate a catalog from definitions in file order.
    pub fn new(spells: Vec<SpellDefinition>) -> Result<Self, CatalogError> {
        if spells.is_empty() {
            return Err(CatalogError::Invalid("catalog contains no spells".to_string()));
        }

        let mut by_name = HashMap::with_capacity(spells.len());
        for (index, spell) in spells.iter().enumerate() {
            spell.validate().map_err(CatalogError::Invalid)?;
            if by_name.insert(spell.name.clone(), SpellId(index)).is_some() {
                return Err(CatalogError::Invalid(format!(
                    "duplicate spell name '{}'",
                    spell.name
                )));
            }
        }

        Ok(Self { spells, by_name })
    }

    /// Parse a catalog from RON text.
    pub fn from_ron_str(contents: &str) -> Result<Self, CatalogError> {
        let config: SpellsConfig = ron::from_str(contents)?;
        Self::new(config.spells)
    }

    /// Load a catalog from a RON file.
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    pub fn get(&self, id: SpellId) -> Option<&SpellDefinition> {
        self.spells.get(id.0)
    }

    /// Look up a spell by index, failing with an out-of-range error.
    pub fn by_index(&self, index: usize) -> Result<&SpellDefinition, GameError> {
        self.spells.get(index).ok_or(GameError::SpellIndexOutOfRange {
            index,
            len: self.spells.len(),
        })
    }

    pub fn id_of(&self, name: &str) -> Option<SpellId> {
        self.by_name.get(name).copied()
    }

    /// Look up a spell by name.
    pub fn lookup(&self, name: &str) -> Result<(SpellId, &SpellDefinition), GameError> {
        let id = self
            .id_of(name)
            .ok_or_else(|| GameError::UnknownSpell(name.to_string()))?;
        Ok((id, &self.spells[id.0]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpellId, &SpellDefinition)> {
        self.spells.iter().enumerate().map(|(i, s)| (SpellId(i), s))
    }

    /// Uniform random spell.
    pub fn random(&self, rng: &mut GameRng) -> SpellId {
        SpellId(rng.index(self.spells.len()).unwrap_or(0))
    }

    /// Uniform random spell other than `excluding`, unless the catalog has
    /// nothing else to offer.
    pub fn random_excluding(&self, excluding: Option<SpellId>, rng: &mut GameRng) -> SpellId {
        let Some(excluded) = excluding.filter(|id| id.0 < self.spells.len()) else {
            return self.random(rng);
        };
        if self.spells.len() < 2 {
            return excluded;
        }
        // Draw from the remaining n-1 slots and skip over the excluded one
        let pick = rng.index(self.spells.len() - 1).unwrap_or(0);
        SpellId(if pick >= excluded.0 { pick + 1 } else { pick })
    }
}

/// Load the spell catalog from assets/config/spells.ron
pub fn load_spell_catalog() -> Result<SpellCatalog, CatalogError> {
    let catalog = SpellCatalog::load_from_file(Path::new(SPELLS_CONFIG_PATH))?;
    info!("Loaded {} spell definitions from {}", catalog.len(), SPELLS_CONFIG_PATH);
    Ok(catalog)
}
