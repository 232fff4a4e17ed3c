//! Spell projectiles
//!
//! Every participant simulates its own copy of every projectile. Only the copy on
//! the caster's side is authoritative: it alone turns an avatar contact into a hit.
//! Mirrors are destroyed on the same contacts purely for presentation.

use bevy::prelude::*;
use smallvec::SmallVec;
use std::collections::BTreeMap;

use super::catalog::{ProjectileSpell, SpawnObject, SpellId, VelocityAffector};
use crate::avatar::{Avatar, Facing};
use crate::net::AvatarId;
use crate::sim::terrain::Terrain;

/// Participant-local projectile handle.
pub type ProjectileId = u64;

/// Why a projectile left the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyReason {
    HitGround,
    HitAvatar(AvatarId),
    Expired,
    LeftMap,
}

/// A travelling spell.
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    pub caster: AvatarId,
    pub spell: SpellId,
    /// True only on the caster's own participant
    pub authoritative: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    pub gravity_scale: f32,
    pub affector: Option<VelocityAffector>,
    pub pass_through_ground: bool,
    pub spawned_at: f32,
    pub lifetime: f32,
    pub radius: f32,
    pub spawn_object: Option<SpawnObject>,
}

impl Projectile {
    /// Integrate one tick of motion.
    fn advance(&mut self, dt: f32, now: f32, gravity: f32) {
        match self.affector {
            Some(VelocityAffector::SinWave { intensity }) => {
                let t = now - self.spawned_at;
                self.velocity.y = (t * intensity * 2.0).sin() * intensity - self.gravity_scale;
            }
            None => self.velocity.y -= gravity * self.gravity_scale * dt,
        }
        self.position += self.velocity * dt;
    }

    /// First contact at the current position, if any.
    fn contact(
        &self,
        now: f32,
        terrain: &dyn Terrain,
        avatars: &BTreeMap<AvatarId, Avatar>,
    ) -> Option<DestroyReason> {
        if now - self.spawned_at >= self.lifetime {
            return Some(DestroyReason::Expired);
        }
        if !terrain.contains(self.position) {
            return Some(DestroyReason::LeftMap);
        }

        let struck = avatars.values().find(|avatar| {
            avatar.id != self.caster
                && avatar.is_alive()
                && avatar.body.overlaps_circle(self.position, self.radius)
        });
        if let Some(avatar) = struck {
            return Some(DestroyReason::HitAvatar(avatar.id));
        }

        if !self.pass_through_ground && terrain.is_solid(self.position) {
            return Some(DestroyReason::HitGround);
        }
        None
    }
}

/// A projectile that was removed this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileDestroyed {
    pub projectile: ProjectileId,
    pub caster: AvatarId,
    pub spell: SpellId,
    pub position: Vec2,
    pub reason: DestroyReason,
    /// Set only when the authoritative copy struck an avatar
    pub hit: Option<ProjectileHit>,
    /// Object to leave behind on contact
    pub spawn_object: Option<SpawnObject>,
}

/// Authoritative avatar contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileHit {
    pub target: AvatarId,
    /// Unit vector from the target towards the impact point
    pub direction: Vec2,
}

/// Every projectile known to a participant.
#[derive(Debug, Default)]
pub struct ProjectileSet {
    items: Vec<Projectile>,
    next_id: ProjectileId,
}

/// Launch parameters shared by authoritative and mirrored casts.
#[derive(Debug, Clone, Copy)]
pub struct Launch {
    pub caster: AvatarId,
    pub spell: SpellId,
    pub origin: Vec2,
    pub facing: Facing,
    pub authoritative: bool,
    pub now: f32,
    pub lifetime: f32,
    pub radius: f32,
}

impl ProjectileSet {
    /// Spawn a projectile moving horizontally in the caster's facing.
    pub fn launch(&mut self, spec: &ProjectileSpell, launch: Launch) -> ProjectileId {
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(Projectile {
            id,
            caster: launch.caster,
            spell: launch.spell,
            authoritative: launch.authoritative,
            position: launch.origin,
            velocity: Vec2::new(spec.speed * launch.facing.sign(), 0.0),
            gravity_scale: spec.drop,
            affector: spec.affector,
            pass_through_ground: spec.pass_through_ground,
            spawned_at: launch.now,
            lifetime: launch.lifetime,
            radius: launch.radius,
            spawn_object: spec.on_hit.spawn_object.clone(),
        });
        id
    }

    /// Advance every projectile and remove those that made contact.
    pub fn step(
        &mut self,
        dt: f32,
        now: f32,
        gravity: f32,
        terrain: &dyn Terrain,
        avatars: &BTreeMap<AvatarId, Avatar>,
    ) -> SmallVec<[ProjectileDestroyed; 4]> {
        let mut destroyed = SmallVec::new();

        self.items.retain_mut(|projectile| {
            projectile.advance(dt, now, gravity);
            let Some(reason) = projectile.contact(now, terrain, avatars) else {
                return true;
            };

            let hit = match reason {
                DestroyReason::HitAvatar(target) if projectile.authoritative => {
                    let target_position = avatars
                        .get(&target)
                        .map(|a| a.body.position)
                        .unwrap_or(projectile.position);
                    Some(ProjectileHit {
                        target,
                        direction: (projectile.position - target_position).normalize_or_zero(),
                    })
                }
                _ => None,
            };
            let spawn_object = match reason {
                DestroyReason::HitGround | DestroyReason::HitAvatar(_) => projectile.spawn_object.clone(),
                DestroyReason::Expired | DestroyReason::LeftMap => None,
            };

            destroyed.push(ProjectileDestroyed {
                projectile: projectile.id,
                caster: projectile.caster,
                spell: projectile.spell,
                position: projectile.position,
                reason,
                hit,
                spawn_object,
            });
            false
        });

        destroyed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
