//! Spell resolution
//!
//! Turns spell definitions into concrete effects. The resolver never mutates
//! avatars on its own beyond the cast gate; it returns [`SpellEffect`]s and the
//! participant decides which of them are applied locally and which are broadcast.
//!
//! ## Authority
//! - heal-caster and spawn-object effects of a self cast replay on every participant
//! - nearby stun, nearby damage and teleport are produced only for the caster's owner

use bevy::prelude::*;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::catalog::{
    CastKind, HitEffect, SpawnObject, SpellCatalog, SpellDefinition, SpellId,
    TeleportTarget,
};
use crate::avatar::Avatar;
use crate::net::message::{HitData, HitSource};
use crate::net::AvatarId;
use crate::sim::config::GameplayConfig;
use crate::sim::rng::GameRng;
use crate::sim::terrain::Terrain;

/// Reasons a cast request is turned down at input time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CastRejection {
    NoAvatar,
    NoSpell,
    /// Dead, stunned, or the match has not opened attacks
    CannotAttack,
    AlreadyCasting,
    CoolingDown { remaining: f32 },
}

/// A cast that passed the gate and will fire at `fire_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedCast {
    pub spell: SpellId,
    pub fire_at: f32,
}

/// One concrete outcome of a spell.
#[derive(Debug, Clone, PartialEq)]
pub enum SpellEffect {
    HealCaster { caster: AvatarId, amount: i32 },
    SpawnObject { object: SpawnObject, position: Vec2 },
    Stun { target: AvatarId, source: AvatarId, duration: f32 },
    Hit(HitData),
    Teleport { avatar: AvatarId, position: Vec2 },
}

/// Interprets spell definitions against the current avatars.
#[derive(Debug, Clone)]
pub struct SpellResolver {
    catalog: Arc<SpellCatalog>,
    cast_delay: f32,
}

impl SpellResolver {
    pub fn new(catalog: Arc<SpellCatalog>, config: &GameplayConfig) -> Self {
        Self {
            catalog,
            cast_delay: config.cast_delay(),
        }
    }

    pub fn catalog(&self) -> &SpellCatalog {
        &self.catalog
    }

    /// Seconds between accepting a cast and firing it.
    pub fn cast_delay(&self) -> f32 {
        self.cast_delay
    }

    /// Gate a cast request. On success the cooldown is stamped and the avatar is
    /// marked as casting; the fire time is not checked against the cooldown again.
    pub fn accept_cast(&self, avatar: &mut Avatar, now: f32) -> Result<AcceptedCast, CastRejection> {
        if !avatar.can_attack() {
            return Err(CastRejection::CannotAttack);
        }
        if avatar.is_casting() {
            return Err(CastRejection::AlreadyCasting);
        }
        let spell = avatar.spell_mut().ok_or(CastRejection::NoSpell)?;
        if !spell.can_cast(now) {
            return Err(CastRejection::CoolingDown {
                remaining: spell.remaining(now),
            });
        }

        spell.on_cast(now);
        let id = spell.spell;
        avatar.set_casting(true);
        Ok(AcceptedCast {
            spell: id,
            fire_at: now + self.cast_delay,
        })
    }

    /// Effects of a self cast by `caster`. `authoritative` is true only on the
    /// caster's own participant.
    pub fn resolve_self_cast(
        &self,
        spell: &SpellDefinition,
        caster: AvatarId,
        avatars: &BTreeMap<AvatarId, Avatar>,
        terrain: &dyn Terrain,
        rng: &mut GameRng,
        authoritative: bool,
    ) -> SmallVec<[SpellEffect; 4]> {
        let mut effects = SmallVec::new();
        let CastKind::SelfCast(effect) = &spell.kind else {
            return effects;
        };
        let Some(origin) = avatars.get(&caster).map(|a| a.body.position) else {
            return effects;
        };

        if let Some(amount) = effect.heal_caster {
            effects.push(SpellEffect::HealCaster { caster, amount });
        }
        if let Some(object) = &effect.spawn_object {
            effects.push(SpellEffect::SpawnObject {
                object: object.clone(),
                position: origin,
            });
        }

        if !authoritative {
            return effects;
        }

        if let Some(stun) = effect.stun_nearby {
            for target in nearby_avatars(caster, avatars, stun.range) {
                effects.push(SpellEffect::Stun {
                    target,
                    source: caster,
                    duration: stun.duration,
                });
            }
        }
        if let Some(nearby) = effect.damage_nearby {
            for target in nearby_avatars(caster, avatars, nearby.range) {
                let target_position = avatars[&target].body.position;
                effects.push(SpellEffect::Hit(HitData {
                    target,
                    attacker: caster,
                    spell: spell.name.clone(),
                    source: HitSource::Nearby,
                    direction: (origin - target_position).normalize_or_zero(),
                }));
            }
        }
        if let Some(target) = effect.teleport {
            match resolve_teleport(target, caster, avatars, terrain, rng) {
                Some(position) => effects.push(SpellEffect::Teleport {
                    avatar: caster,
                    position,
                }),
                None => debug!("{}: no teleport target for {:?}", spell.name, target),
            }
        }

        effects
    }

    /// What a hit from `spell` does to its target.
    pub fn hit_effect(&self, spell: &SpellDefinition, source: HitSource) -> HitEffect {
        match (&spell.kind, source) {
            (CastKind::Projectile(projectile), HitSource::Projectile) => projectile.on_hit.clone(),
            (CastKind::SelfCast(effect), HitSource::Nearby) => HitEffect {
                damage: effect.damage_nearby.map(|nearby| nearby.damage),
                ..Default::default()
            },
            (_, source) => {
                warn!("'{}' cannot produce a {:?} hit", spell.name, source);
                HitEffect::default()
            }
        }
    }
}

/// Other living avatars within `range` of `caster`, in id order.
pub fn nearby_avatars(
    caster: AvatarId,
    avatars: &BTreeMap<AvatarId, Avatar>,
    range: f32,
) -> SmallVec<[AvatarId; 4]> {
    let Some(origin) = avatars.get(&caster).map(|a| a.body.position) else {
        return SmallVec::new();
    };
    avatars
        .values()
        .filter(|a| a.id != caster && a.is_alive())
        .filter(|a| a.body.position.distance(origin) <= range)
        .map(|a| a.id)
        .collect()
}

/// Destination of a teleport, or `None` when nothing qualifies. Distance ties
/// go to the lowest avatar id.
pub fn resolve_teleport(
    target: TeleportTarget,
    caster: AvatarId,
    avatars: &BTreeMap<AvatarId, Avatar>,
    terrain: &dyn Terrain,
    rng: &mut GameRng,
) -> Option<Vec2> {
    let origin = avatars.get(&caster)?.body.position;
    let others: SmallVec<[(f32, Vec2); 4]> = avatars
        .values()
        .filter(|a| a.id != caster && a.is_alive())
        .map(|a| (a.body.position.distance(origin), a.body.position))
        .collect();

    match target {
        TeleportTarget::RandomPosition => rng.choose(terrain.surface_positions()).copied(),
        TeleportTarget::RandomPlayer => rng.choose(&others).map(|(_, position)| *position),
        TeleportTarget::NearestPlayer => others
            .iter()
            .fold(None::<(f32, Vec2)>, |best, &(d, p)| match best {
                Some((best_d, _)) if best_d <= d => best,
                _ => Some((d, p)),
            })
            .map(|(_, position)| position),
        TeleportTarget::FurthestPlayer => others
            .iter()
            .fold(None::<(f32, Vec2)>, |best, &(d, p)| match best {
                Some((best_d, _)) if best_d >= d => best,
                _ => Some((d, p)),
            })
            .map(|(_, position)| position),
        TeleportTarget::TopOfMap => terrain
            .surface_positions()
            .iter()
            .fold(None::<Vec2>, |best, &p| match best {
                Some(top) if top.y >= p.y => best,
                _ => Some(p),
            }),
    }
}
