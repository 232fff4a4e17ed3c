//! Pickup spawning and consumption
//!
//! The host runs the spawn timer and arbitrates every consumption. Other
//! participants only mirror the active set and propose contacts; a proposal for a
//! pickup the host already removed falls through as a no-op. The host also checks
//! the proposal against its own view of the consumer's body, so a participant
//! cannot collect a pickup from across the arena.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};

use crate::net::AvatarId;
use crate::sim::config::PickupConfig;
use crate::sim::physics::KinematicBody;
use crate::sim::rng::GameRng;
use crate::sim::terrain::Terrain;
use crate::spells::catalog::{SpellCatalog, SpellId};

/// Host-assigned pickup identifier.
pub type PickupId = u32;

/// Spell carried by a spell pickup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellGrant {
    /// Resolved by the host at consumption time
    Random,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupKind {
    Health { amount: i32 },
    Spell { grant: SpellGrant },
}

/// A consumable lying in the arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pickup {
    pub id: PickupId,
    pub kind: PickupKind,
    pub position: Vec2,
}

/// Host verdict on a contact proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumption {
    pub pickup: PickupId,
    pub consumer: AvatarId,
    /// Catalog index chosen for a random spell pickup
    pub spell_index: Option<usize>,
}

/// Why the host turned down a contact proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProposalRejection {
    /// Already consumed, or never spawned
    Gone,
    /// The consumer is nowhere near the pickup in the host's view
    OutOfReach { distance: f32 },
}

/// Active pickups plus the host's spawn timer.
#[derive(Debug, Clone)]
pub struct PickupSpawner {
    config: PickupConfig,
    active: BTreeMap<PickupId, Pickup>,
    next_spawn_time: Option<f32>,
    next_id: PickupId,
    proposed: HashSet<PickupId>,
}

impl PickupSpawner {
    pub fn new(config: PickupConfig) -> Self {
        Self {
            config,
            active: BTreeMap::new(),
            next_spawn_time: None,
            next_id: 0,
            proposed: HashSet::new(),
        }
    }

    /// Start the timer for a match that began at `start_time`.
    pub fn arm(&mut self, start_time: f32, rng: &mut GameRng) {
        let first = start_time + self.config.start_delay + self.interval(rng);
        self.next_spawn_time = Some(first);
    }

    pub fn disarm(&mut self) {
        self.next_spawn_time = None;
    }

    pub fn next_spawn_time(&self) -> Option<f32> {
        self.next_spawn_time
    }

    /// Advance the host timer. Returns a new pickup to replicate, if one is due
    /// and there is room for it.
    pub fn tick(&mut self, now: f32, terrain: &dyn Terrain, rng: &mut GameRng) -> Option<Pickup> {
        let due = self.next_spawn_time?;
        if now < due || self.active.len() >= self.config.max_pickups {
            return None;
        }

        let Some(position) = rng.choose(terrain.surface_positions()).copied() else {
            warn!("No surface positions to place a pickup on");
            self.next_spawn_time = Some(now + self.interval(rng));
            return None;
        };
        let kind = self.roll_kind(rng)?;

        self.next_spawn_time = Some(now + self.interval(rng));
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        Some(Pickup { id, kind, position })
    }

    /// Add a replicated pickup. Returns false if it is already known.
    pub fn insert(&mut self, pickup: Pickup) -> bool {
        if self.active.contains_key(&pickup.id) {
            return false;
        }
        // Keep host-side ids ahead of anything seen so far
        self.next_id = self.next_id.max(pickup.id.saturating_add(1));
        self.active.insert(pickup.id, pickup);
        true
    }

    /// Remove a pickup. Removing an absent pickup is a no-op.
    pub fn remove(&mut self, id: PickupId) -> Option<Pickup> {
        self.proposed.remove(&id);
        self.active.remove(&id)
    }

    pub fn get(&self, id: PickupId) -> Option<&Pickup> {
        self.active.get(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Pickup> {
        self.active.values()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Pickups overlapping `body`.
    pub fn touching(&self, body: &KinematicBody) -> SmallVec<[PickupId; 4]> {
        self.active
            .values()
            .filter(|pickup| body.overlaps_circle(pickup.position, self.config.radius))
            .map(|pickup| pickup.id)
            .collect()
    }

    /// Remember that this participant proposed `id`. Returns false if it already had.
    pub fn mark_proposed(&mut self, id: PickupId) -> bool {
        self.proposed.insert(id)
    }

    /// Host-side validation of a contact proposal. `body` is the host's view of
    /// the consumer.
    pub fn arbitrate(
        &self,
        id: PickupId,
        consumer: AvatarId,
        body: &KinematicBody,
        current_spell: Option<SpellId>,
        catalog: &SpellCatalog,
        rng: &mut GameRng,
    ) -> Result<Consumption, ProposalRejection> {
        let pickup = self.active.get(&id).ok_or(ProposalRejection::Gone)?;
        let reach = self.config.radius + self.config.contact_slack;
        if !body.overlaps_circle(pickup.position, reach) {
            return Err(ProposalRejection::OutOfReach {
                distance: body.position.distance(pickup.position),
            });
        }

        let spell_index = match &pickup.kind {
            PickupKind::Spell {
                grant: SpellGrant::Random,
            } => Some(catalog.random_excluding(current_spell, rng).0),
            _ => None,
        };
        Ok(Consumption {
            pickup: id,
            consumer,
            spell_index,
        })
    }

    /// Drop every pickup and stop the timer.
    pub fn clear(&mut self) {
        self.active.clear();
        self.proposed.clear();
        self.next_spawn_time = None;
    }

    fn interval(&self, rng: &mut GameRng) -> f32 {
        rng.random_range(self.config.min_interval, self.config.max_interval)
    }

    fn roll_kind(&self, rng: &mut GameRng) -> Option<PickupKind> {
        let health = !self.config.health_variants.is_empty();
        let spell = !self.config.spell_variants.is_empty();
        let pick_health = match (health, spell) {
            (true, true) => rng.index(2) == Some(0),
            (true, false) => true,
            (false, true) => false,
            (false, false) => return None,
        };

        if pick_health {
            rng.choose(&self.config.health_variants)
                .map(|amount| PickupKind::Health { amount: *amount })
        } else {
            rng.choose(&self.config.spell_variants)
                .map(|grant| PickupKind::Spell { grant: grant.clone() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::terrain::ArenaLayout;

    fn config(max_pickups: usize) -> PickupConfig {
        PickupConfig {
            max_pickups,
            start_delay: 2.0,
            min_interval: 1.0,
            max_interval: 3.0,
            radius: 0.4,
            contact_slack: 0.5,
            health_variants: vec![4],
            spell_variants: vec![SpellGrant::Random],
        }
    }

    fn terrain() -> ArenaLayout {
        ArenaLayout::preset("Platform", 4.0).unwrap()
    }

    #[test]
    fn test_first_spawn_waits_for_start_delay() {
        let mut spawner = PickupSpawner::new(config(3));
        let mut rng = GameRng::from_seed(1);
        let terrain = terrain();

        assert!(spawner.tick(100.0, &terrain, &mut rng).is_none(), "unarmed timer");

        spawner.arm(10.0, &mut rng);
        let due = spawner.next_spawn_time().unwrap();
        assert!((13.0..15.0).contains(&due));
        assert!(spawner.tick(due - 0.01, &terrain, &mut rng).is_none());

        let pickup = spawner.tick(due, &terrain, &mut rng).unwrap();
        assert!(terrain.surface_positions().contains(&pickup.position));
        let next = spawner.next_spawn_time().unwrap();
        assert!(next >= due + 1.0 && next < due + 3.0);
    }

    #[test]
    fn test_full_spawner_waits_for_room() {
        let mut spawner = PickupSpawner::new(config(1));
        let mut rng = GameRng::from_seed(2);
        let terrain = terrain();
        spawner.arm(0.0, &mut rng);

        let first = spawner.tick(10.0, &terrain, &mut rng).unwrap();
        spawner.insert(first.clone());
        assert!(spawner.tick(50.0, &terrain, &mut rng).is_none());

        spawner.remove(first.id);
        let second = spawner.tick(50.0, &terrain, &mut rng).unwrap();
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut spawner = PickupSpawner::new(config(3));
        let pickup = Pickup {
            id: 7,
            kind: PickupKind::Health { amount: 3 },
            position: Vec2::ZERO,
        };
        assert!(spawner.insert(pickup.clone()));
        assert!(!spawner.insert(pickup));
        assert!(spawner.remove(7).is_some());
        assert!(spawner.remove(7).is_none());
        assert!(spawner.is_empty());
    }

    #[test]
    fn test_arbitrate_resolves_random_spell() {
        let catalog = SpellCatalog::from_ron_str(
            r#"(spells: [
                (name: "A", kind: SelfCast((heal_caster: Some(1)))),
                (name: "B", kind: SelfCast((heal_caster: Some(2)))),
            ])"#,
        )
        .unwrap();
        let mut spawner = PickupSpawner::new(config(3));
        let mut rng = GameRng::from_seed(4);
        spawner.insert(Pickup {
            id: 1,
            kind: PickupKind::Spell {
                grant: SpellGrant::Random,
            },
            position: Vec2::ZERO,
        });

        let body = KinematicBody::new(Vec2::new(0.2, 0.0), Vec2::splat(0.4));
        let verdict = spawner
            .arbitrate(1, 3, &body, Some(SpellId(0)), &catalog, &mut rng)
            .unwrap();
        assert_eq!(verdict.spell_index, Some(1));
        assert_eq!(
            spawner.arbitrate(2, 3, &body, None, &catalog, &mut rng),
            Err(ProposalRejection::Gone)
        );
    }

    #[test]
    fn test_arbitrate_requires_reach() {
        let catalog =
            SpellCatalog::from_ron_str(r#"(spells: [(name: "A", kind: SelfCast((heal_caster: Some(1))))])"#)
                .unwrap();
        let mut spawner = PickupSpawner::new(config(3));
        let mut rng = GameRng::from_seed(5);
        spawner.insert(Pickup {
            id: 0,
            kind: PickupKind::Health { amount: 3 },
            position: Vec2::new(2.0, 1.0),
        });

        // Edge 0.4 from the pickup: outside the radius but inside the slack
        let drifted = KinematicBody::new(Vec2::new(2.8, 1.0), Vec2::splat(0.4));
        assert!(spawner.arbitrate(0, 1, &drifted, None, &catalog, &mut rng).is_ok());

        let far = KinematicBody::new(Vec2::new(10.0, 1.0), Vec2::splat(0.4));
        match spawner.arbitrate(0, 1, &far, None, &catalog, &mut rng) {
            Err(ProposalRejection::OutOfReach { distance }) => assert!((distance - 8.0).abs() < 1e-4),
            other => panic!("expected out of reach, got {other:?}"),
        }
        assert!(spawner.get(0).is_some(), "a rejected proposal leaves the pickup");
    }

    #[test]
    fn test_ids_saturate_at_the_top() {
        let mut spawner = PickupSpawner::new(config(3));
        let mut rng = GameRng::from_seed(6);
        let terrain = terrain();
        assert!(spawner.insert(Pickup {
            id: PickupId::MAX,
            kind: PickupKind::Health { amount: 3 },
            position: Vec2::ZERO,
        }));

        spawner.arm(0.0, &mut rng);
        let next = spawner.tick(100.0, &terrain, &mut rng).unwrap();
        assert_eq!(next.id, PickupId::MAX);
    }

    #[test]
    fn test_touching_and_proposals() {
        let mut spawner = PickupSpawner::new(config(3));
        spawner.insert(Pickup {
            id: 0,
            kind: PickupKind::Health { amount: 3 },
            position: Vec2::new(2.0, 1.0),
        });
        let near = KinematicBody::new(Vec2::new(2.3, 1.0), Vec2::splat(0.4));
        let far = KinematicBody::new(Vec2::new(6.0, 1.0), Vec2::splat(0.4));

        assert_eq!(spawner.touching(&near).as_slice(), &[0]);
        assert!(spawner.touching(&far).is_empty());
        assert!(spawner.mark_proposed(0));
        assert!(!spawner.mark_proposed(0));
    }
}
