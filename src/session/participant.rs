//! One participant of a session
//!
//! [`Participant`] is the composition root of a single client: it owns the avatar
//! copies, projectiles, pickups, match state, scheduler and observers, and it is
//! the only place where messages are turned into state changes.
//!
//! ## Message flow
//! - decisions go through [`Participant::emit`]: a message whose targets include
//!   this participant is applied locally right away, the rest is queued in the
//!   outbox for the transport
//! - received messages are checked against the [`AuthorityRouter`] before they are
//!   applied; anything from the wrong originator is logged and dropped
//! - every applied effect is idempotent, so replays and duplicates are harmless

use bevy::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::avatar::motor::PlayerInput;
use crate::avatar::{Avatar, DamageOutcome, Facing};
use crate::combat::events::{Notification, Observers};
use crate::match_state::{MatchMode, MatchPhase, MatchStateMachine, ReadyOutcome};
use crate::net::authority::{AuthorityRouter, Decision};
use crate::net::message::{GameMessage, HitData, HitSource, Placement};
use crate::net::{AvatarId, ParticipantId, Targets};
use crate::pickups::{Pickup, PickupId, PickupKind, PickupSpawner, ProposalRejection, SpellGrant};
use crate::sim::config::{GameplayConfig, SpellDistribution};
use crate::sim::rng::GameRng;
use crate::sim::scheduler::{Scheduler, TaskId};
use crate::sim::terrain::Terrain;
use crate::spells::catalog::{CastKind, SpellCatalog, SpellId};
use crate::spells::cooldown::SpellCastState;
use crate::spells::projectile::{DestroyReason, Launch, ProjectileSet};
use crate::spells::resolver::{AcceptedCast, CastRejection, SpellEffect, SpellResolver};

/// Deferred work of a participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Task {
    /// Fire a cast accepted earlier by the local avatar
    FireCast { avatar: AvatarId, spell: SpellId },
    Respawn { avatar: AvatarId },
    Countdown { remaining: u32 },
    StartMatch,
    ReturnToLobby,
}

/// A message waiting for the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub targets: Targets,
    pub message: GameMessage,
}

/// Immutable collaborators shared by every participant of a session.
#[derive(Clone)]
pub struct SharedContext {
    pub config: Arc<GameplayConfig>,
    pub catalog: Arc<SpellCatalog>,
    pub terrain: Arc<dyn Terrain + Send + Sync>,
    pub mode: MatchMode,
}

pub struct Participant {
    config: Arc<GameplayConfig>,
    catalog: Arc<SpellCatalog>,
    terrain: Arc<dyn Terrain + Send + Sync>,
    resolver: SpellResolver,
    authority: AuthorityRouter,
    roster: Vec<ParticipantId>,
    now: f32,
    avatars: BTreeMap<AvatarId, Avatar>,
    projectiles: ProjectileSet,
    pickups: PickupSpawner,
    match_state: MatchStateMachine,
    scheduler: Scheduler<Task>,
    /// FireCast task of the local avatar's windup, if one is in flight
    pending_cast: Option<TaskId>,
    rng: GameRng,
    observers: Observers,
    outbox: Vec<Outgoing>,
    input: PlayerInput,
    last_progress: Option<f32>,
}

impl Participant {
    pub fn new(
        local: ParticipantId,
        host: ParticipantId,
        roster: Vec<ParticipantId>,
        context: SharedContext,
        rng: GameRng,
    ) -> Self {
        let resolver = SpellResolver::new(Arc::clone(&context.catalog), &context.config);
        let pickups = PickupSpawner::new(context.config.pickups.clone());
        let match_state = MatchStateMachine::new(context.mode, roster.len());
        Self {
            config: context.config,
            catalog: context.catalog,
            terrain: context.terrain,
            resolver,
            authority: AuthorityRouter::new(local, host),
            roster,
            now: 0.0,
            avatars: BTreeMap::new(),
            projectiles: ProjectileSet::default(),
            pickups,
            match_state,
            scheduler: Scheduler::new(),
            pending_cast: None,
            rng,
            observers: Observers::default(),
            outbox: Vec::new(),
            input: PlayerInput::default(),
            last_progress: None,
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.authority.local_id()
    }

    pub fn is_host(&self) -> bool {
        self.authority.is_host()
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn avatar(&self, id: AvatarId) -> Option<&Avatar> {
        self.avatars.get(&id)
    }

    pub fn avatars(&self) -> &BTreeMap<AvatarId, Avatar> {
        &self.avatars
    }

    pub fn local_avatar(&self) -> Option<&Avatar> {
        self.avatars.get(&self.id())
    }

    pub fn match_state(&self) -> &MatchStateMachine {
        &self.match_state
    }

    pub fn pickups(&self) -> &PickupSpawner {
        &self.pickups
    }

    pub fn projectiles(&self) -> &ProjectileSet {
        &self.projectiles
    }

    pub fn catalog(&self) -> &SpellCatalog {
        &self.catalog
    }

    pub fn terrain(&self) -> &dyn Terrain {
        &*self.terrain
    }

    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    /// Input for the next tick. Consumed by that tick.
    pub fn set_input(&mut self, input: PlayerInput) {
        self.input = input;
    }

    /// Everything emitted since the last call, in emission order.
    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Local avatar's cooldown progress, 1 when ready.
    pub fn cooldown_progress(&self) -> Option<f32> {
        self.local_avatar()
            .and_then(|avatar| avatar.spell())
            .map(|spell| spell.progress(self.now))
    }

    /// Seconds left in a running TimeBased match.
    pub fn time_remaining(&self) -> Option<f32> {
        self.match_state.time_remaining(self.now)
    }

    /// Report that this participant has loaded the arena.
    pub fn enter_game(&mut self) {
        self.emit(Targets::Host, GameMessage::ImInGame);
    }

    /// Accept a cast for the local avatar. The effect fires after the cast delay.
    pub fn request_cast(&mut self) -> Result<AcceptedCast, CastRejection> {
        let local = self.id();
        let avatar = self.avatars.get_mut(&local).ok_or(CastRejection::NoAvatar)?;
        let accepted = self.resolver.accept_cast(avatar, self.now)?;
        let task = self.scheduler.schedule_at(
            accepted.fire_at,
            Task::FireCast {
                avatar: local,
                spell: accepted.spell,
            },
        );
        self.pending_cast = Some(task);
        Ok(accepted)
    }

    /// Apply a message received from `sender`, if `sender` may originate it.
    pub fn receive(&mut self, sender: ParticipantId, message: GameMessage) {
        let decision = message.decision();
        if !self.authority.permits(sender, decision) {
            warn!(
                "Participant {}: dropping {} from participant {} (requires {:?})",
                self.id(),
                message.name(),
                sender,
                decision.authority()
            );
            return;
        }
        self.apply(sender, message);
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.now += dt;
        self.run_due_tasks();
        self.simulate_local_avatar(dt);
        self.step_projectiles(dt);
        self.propose_touched_pickups();

        if self.authority.may_originate(Decision::PickupSpawn)
            && self.match_state.phase() == MatchPhase::Playing
        {
            if let Some(pickup) = self.pickups.tick(self.now, &*self.terrain, &mut self.rng) {
                self.emit(Targets::All, GameMessage::SpawnPickup { pickup });
            }
            self.check_win();
        }

        self.publish_cooldown_progress();

        #[cfg(debug_assertions)]
        for avatar in self.avatars.values() {
            avatar.debug_validate();
        }
    }

    /// Broadcast a decision. Targets that include this participant are applied
    /// locally before returning; the rest goes to the outbox.
    fn emit(&mut self, targets: Targets, message: GameMessage) {
        let local = self.authority.local_id();
        let host = self.authority.host_id();
        let applies_locally = targets.includes(local, local, host);
        if let Some(remote) = targets.without_sender(local, host) {
            self.outbox.push(Outgoing {
                targets: remote,
                message: message.clone(),
            });
        }
        if applies_locally {
            self.apply(local, message);
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.observers.notify(&notification);
    }

    fn apply(&mut self, sender: ParticipantId, message: GameMessage) {
        match message {
            GameMessage::ImInGame => self.on_ready(sender),
            GameMessage::InitiatePlayers { placements } => self.on_initiate_players(placements),
            GameMessage::CountdownTick { remaining } => {
                self.notify(Notification::CountdownTick { remaining })
            }
            GameMessage::StartGame => self.on_start_game(),
            GameMessage::GiveSpell { avatar, spell } => self.on_give_spell(avatar, &spell),
            GameMessage::CastSpell {
                avatar,
                spell,
                origin,
                facing,
            } => self.on_cast_spell(avatar, &spell, origin, facing),
            GameMessage::Hit(hit) => self.on_hit(hit),
            GameMessage::Stun {
                target, duration, ..
            } => self.stun(target, duration),
            GameMessage::RemoveStun { avatar } => self.on_remove_stun(avatar),
            GameMessage::Die { avatar } => self.on_die(avatar),
            GameMessage::KillPlayer { killer, victim } => self.on_kill_player(killer, victim),
            GameMessage::Spawn { avatar, position } => self.on_spawn(avatar, position),
            GameMessage::Teleport { avatar, position } => self.on_teleport(avatar, position),
            GameMessage::SyncBody {
                avatar,
                position,
                velocity,
                facing,
                state,
            } => {
                if self.authority.is_local(avatar) {
                    return;
                }
                if let Some(mirror) = self.avatars.get_mut(&avatar).filter(|a| a.is_alive()) {
                    mirror.body.position = position;
                    mirror.body.velocity = velocity;
                    mirror.facing = facing;
                    mirror.mirror_motion_state(state);
                }
            }
            GameMessage::SpawnPickup { pickup } => self.on_spawn_pickup(pickup),
            GameMessage::ProposePickup { pickup, consumer } => self.on_propose_pickup(pickup, consumer),
            GameMessage::ConsumePickup {
                pickup,
                consumer,
                spell_index,
            } => self.on_consume_pickup(pickup, consumer, spell_index),
            GameMessage::WinGame { winner } => self.on_win_game(winner),
            GameMessage::ReturnToLobby => self.on_return_to_lobby(),
        }
    }

    // ========================================================================
    // Match flow
    // ========================================================================

    fn on_ready(&mut self, sender: ParticipantId) {
        if !self.authority.may_originate(Decision::MatchFlow) {
            debug!("Participant {}: ignoring readiness report addressed to the host", self.id());
            return;
        }
        if !self.roster.contains(&sender) {
            warn!("Readiness report from participant {} outside the roster", sender);
            return;
        }

        match self.match_state.acknowledge_ready(sender) {
            ReadyOutcome::AllReady => {
                info!("All {} participants ready, instantiating avatars", self.roster.len());
                let placements = self.initial_placements();
                self.emit(Targets::All, GameMessage::InitiatePlayers { placements });
            }
            ReadyOutcome::Waiting { ready, expected } => {
                debug!("Participant {} ready ({}/{})", sender, ready, expected)
            }
            ReadyOutcome::Ignored => debug!("Duplicate readiness report from participant {}", sender),
        }
    }

    fn initial_placements(&self) -> Vec<Placement> {
        let spawns = self.terrain.spawn_points();
        if spawns.is_empty() {
            warn!("Arena has no spawn points, placing avatars at the origin");
        }
        self.roster
            .iter()
            .enumerate()
            .map(|(index, id)| Placement {
                avatar: *id,
                position: spawns
                    .get(index % spawns.len().max(1))
                    .copied()
                    .unwrap_or(Vec2::ZERO),
            })
            .collect()
    }

    fn on_initiate_players(&mut self, placements: Vec<Placement>) {
        if !self.match_state.enter_pregame() {
            debug!("Avatars already instantiated, ignoring InitiatePlayers");
            return;
        }

        let config = Arc::clone(&self.config);
        for placement in &placements {
            let local = self.authority.is_local(placement.avatar);
            let avatar = Avatar::new(
                placement.avatar,
                config.max_health,
                placement.position,
                config.avatar_half_extents,
                local,
            );
            self.avatars.insert(placement.avatar, avatar);
            self.notify(Notification::HealthChanged {
                avatar: placement.avatar,
                health: config.max_health,
                max_health: config.max_health,
            });
        }
        self.notify(Notification::MatchPhaseChanged {
            phase: MatchPhase::PreGame,
        });

        self.grant_random_spell();

        if self.authority.may_originate(Decision::MatchFlow) {
            let countdown = config.countdown_from;
            for step in 0..countdown {
                self.scheduler.schedule_in(
                    self.now,
                    step as f32,
                    Task::Countdown {
                        remaining: countdown - step,
                    },
                );
            }
            self.scheduler.schedule_in(self.now, countdown as f32, Task::StartMatch);
        }
    }

    fn on_start_game(&mut self) {
        if !self.match_state.start(self.now) {
            debug!("StartGame outside PreGame ignored");
            return;
        }
        for avatar in self.avatars.values_mut() {
            avatar.set_capabilities(true, true);
        }
        if self.authority.may_originate(Decision::PickupSpawn) {
            self.pickups.arm(self.now, &mut self.rng);
        }
        info!("Participant {}: match started at {:.2}s", self.id(), self.now);
        self.notify(Notification::MatchPhaseChanged {
            phase: MatchPhase::Playing,
        });
    }

    fn check_win(&mut self) {
        if !self.authority.may_originate(Decision::MatchOutcome) {
            return;
        }
        let scores = self.avatars.values().map(|avatar| (avatar.id, avatar.score));
        if let Some(winner) = self.match_state.evaluate_win(self.now, scores) {
            info!("Avatar {} wins the match", winner);
            self.emit(Targets::All, GameMessage::WinGame { winner });
        }
    }

    fn on_win_game(&mut self, winner: AvatarId) {
        if !self.match_state.declare_winner(winner) {
            debug!("Winner already declared, ignoring WinGame for avatar {}", winner);
            return;
        }
        for avatar in self.avatars.values_mut() {
            avatar.set_capabilities(true, false);
        }
        if self.authority.may_originate(Decision::MatchFlow) {
            self.pickups.disarm();
            self.scheduler
                .schedule_in(self.now, self.config.end_game_hang_time, Task::ReturnToLobby);
        }
        self.notify(Notification::MatchPhaseChanged {
            phase: MatchPhase::EndGame,
        });
        self.notify(Notification::MatchWon { winner });
    }

    fn on_return_to_lobby(&mut self) {
        self.avatars.clear();
        self.projectiles.clear();
        self.pickups.clear();
        self.scheduler.clear();
        self.pending_cast = None;
        self.match_state.reset();
        self.input = PlayerInput::default();
        self.last_progress = None;
        info!("Participant {}: returned to lobby", self.id());
        self.notify(Notification::MatchPhaseChanged {
            phase: MatchPhase::Initiation,
        });
    }

    fn run_due_tasks(&mut self) {
        while let Some(task) = self.scheduler.pop_due(self.now) {
            match task {
                Task::FireCast { avatar, spell } => self.fire_cast(avatar, spell),
                Task::Respawn { avatar } => self.respawn(avatar),
                Task::Countdown { remaining } => {
                    self.emit(Targets::All, GameMessage::CountdownTick { remaining })
                }
                Task::StartMatch => self.emit(Targets::All, GameMessage::StartGame),
                Task::ReturnToLobby => self.emit(Targets::All, GameMessage::ReturnToLobby),
            }
        }
    }

    // ========================================================================
    // Spells
    // ========================================================================

    fn grant_random_spell(&mut self) {
        let local = self.id();
        if !self.avatars.contains_key(&local) {
            return;
        }
        let id = self.catalog.random(&mut self.rng);
        let Some(spell) = self.catalog.get(id).map(|def| def.name.clone()) else {
            return;
        };
        self.emit(Targets::All, GameMessage::GiveSpell { avatar: local, spell });
    }

    fn on_give_spell(&mut self, avatar: AvatarId, spell: &str) {
        let catalog = Arc::clone(&self.catalog);
        match catalog.lookup(spell) {
            Ok((id, definition)) => self.grant_spell(avatar, SpellCastState::new(id, definition)),
            Err(e) => error!("Cannot grant spell to avatar {}: {}", avatar, e),
        }
    }

    fn grant_spell(&mut self, avatar: AvatarId, state: SpellCastState) {
        let Some(target) = self.avatars.get_mut(&avatar) else {
            debug!("Spell grant for unknown avatar {}", avatar);
            return;
        };
        target.grant_spell(state);

        let catalog = Arc::clone(&self.catalog);
        if let Some(definition) = catalog.get(state.spell) {
            self.notify(Notification::SpellIconChanged {
                avatar,
                spell: definition.name.clone(),
                icon: definition.icon.clone(),
            });
        }
        if self.authority.is_local(avatar) {
            self.last_progress = Some(1.0);
            self.notify(Notification::CooldownProgress { avatar, progress: 1.0 });
        }
    }

    fn fire_cast(&mut self, caster: AvatarId, spell: SpellId) {
        let offset = self.config.spell_spawn_offset;
        self.pending_cast = None;
        let Some(avatar) = self.avatars.get_mut(&caster) else {
            return;
        };
        avatar.set_casting(false);
        // Past the end of the match: the windup is lost
        if !avatar.can_attack() {
            debug!("Cast by avatar {} dropped at fire time", caster);
            return;
        }
        let origin = avatar.cast_origin(offset);
        let facing = avatar.facing;

        let Some(name) = self.catalog.get(spell).map(|def| def.name.clone()) else {
            error!("Spell index {} out of range (catalog has {} spells)", spell.0, self.catalog.len());
            return;
        };
        self.emit(
            Targets::All,
            GameMessage::CastSpell {
                avatar: caster,
                spell: name,
                origin,
                facing,
            },
        );
    }

    fn on_cast_spell(&mut self, caster: AvatarId, spell: &str, origin: Vec2, facing: Facing) {
        let catalog = Arc::clone(&self.catalog);
        let (spell_id, definition) = match catalog.lookup(spell) {
            Ok(found) => found,
            Err(e) => {
                error!("Avatar {} cast an unusable spell: {}", caster, e);
                return;
            }
        };
        match self.avatars.get_mut(&caster) {
            Some(avatar) if !avatar.is_local() => avatar.facing = facing,
            Some(_) => {}
            None => {
                debug!("Cast by unknown avatar {}", caster);
                return;
            }
        }

        let authoritative = self.authority.may_originate(Decision::SpellEffect { caster });
        self.notify(Notification::SpellCast {
            caster,
            spell: definition.name.clone(),
        });

        match &definition.kind {
            CastKind::Projectile(projectile) => {
                self.projectiles.launch(
                    projectile,
                    Launch {
                        caster,
                        spell: spell_id,
                        origin,
                        facing,
                        authoritative,
                        now: self.now,
                        lifetime: self.config.projectile_lifetime,
                        radius: self.config.projectile_radius,
                    },
                );
            }
            CastKind::SelfCast(_) => {
                let effects = self.resolver.resolve_self_cast(
                    definition,
                    caster,
                    &self.avatars,
                    &*self.terrain,
                    &mut self.rng,
                    authoritative,
                );
                for effect in effects {
                    self.apply_spell_effect(effect);
                }
            }
        }
    }

    fn apply_spell_effect(&mut self, effect: SpellEffect) {
        match effect {
            SpellEffect::HealCaster { caster, amount } => self.heal(caster, amount),
            SpellEffect::SpawnObject { object, position } => self.notify(Notification::ObjectSpawned {
                prefab: object.prefab,
                position,
                lifetime: object.lifetime,
            }),
            SpellEffect::Stun {
                target,
                source,
                duration,
            } => self.emit(
                Targets::All,
                GameMessage::Stun {
                    target,
                    source,
                    duration,
                },
            ),
            SpellEffect::Hit(hit) => self.emit(Targets::All, GameMessage::Hit(hit)),
            SpellEffect::Teleport { avatar, position } => {
                self.emit(Targets::All, GameMessage::Teleport { avatar, position })
            }
        }
    }

    fn step_projectiles(&mut self, dt: f32) {
        let destroyed = self.projectiles.step(
            dt,
            self.now,
            self.config.gravity,
            &*self.terrain,
            &self.avatars,
        );

        for gone in destroyed {
            let spell = self
                .catalog
                .get(gone.spell)
                .map(|def| def.name.clone())
                .unwrap_or_default();

            // Avatar contacts leave their object through the hit itself
            if gone.reason == DestroyReason::HitGround {
                if let Some(object) = gone.spawn_object {
                    self.notify(Notification::ObjectSpawned {
                        prefab: object.prefab,
                        position: gone.position,
                        lifetime: object.lifetime,
                    });
                }
            }
            self.notify(Notification::ProjectileDestroyed {
                caster: gone.caster,
                spell: spell.clone(),
                position: gone.position,
                reason: gone.reason,
            });

            if let Some(hit) = gone.hit {
                self.emit(
                    Targets::All,
                    GameMessage::Hit(HitData {
                        target: hit.target,
                        attacker: gone.caster,
                        spell,
                        source: HitSource::Projectile,
                        direction: hit.direction,
                    }),
                );
            }
        }
    }

    fn on_hit(&mut self, hit: HitData) {
        let catalog = Arc::clone(&self.catalog);
        let definition = match catalog.lookup(&hit.spell) {
            Ok((_, definition)) => definition,
            Err(e) => {
                error!("Hit on avatar {} by avatar {} skipped: {}", hit.target, hit.attacker, e);
                return;
            }
        };
        let effect = self.resolver.hit_effect(definition, hit.source);

        let Some(position) = self
            .avatars
            .get(&hit.target)
            .filter(|avatar| avatar.is_alive())
            .map(|avatar| avatar.body.position)
        else {
            debug!("Hit on dead or unknown avatar {} ignored", hit.target);
            return;
        };

        if let Some(duration) = effect.stun {
            self.stun(hit.target, duration);
        }
        if let Some(amount) = effect.heal_caster {
            self.heal(hit.attacker, amount);
        }
        if let Some(object) = effect.spawn_object {
            self.notify(Notification::ObjectSpawned {
                prefab: object.prefab,
                position,
                lifetime: object.lifetime,
            });
        }
        if let Some(amount) = effect.damage {
            self.damage(hit.target, hit.attacker, &hit.spell, amount);
        }
    }

    // ========================================================================
    // Avatar effects
    // ========================================================================

    fn heal(&mut self, target: AvatarId, amount: i32) {
        let Some(avatar) = self.avatars.get_mut(&target) else {
            return;
        };
        let healed = avatar.heal(amount);
        if healed == 0 {
            return;
        }
        let (health, max_health) = (avatar.health, avatar.max_health);
        self.notify(Notification::Healed { target, amount: healed });
        self.notify(Notification::HealthChanged {
            avatar: target,
            health,
            max_health,
        });
    }

    fn damage(&mut self, target: AvatarId, attacker: AvatarId, spell: &str, amount: i32) {
        let Some(avatar) = self.avatars.get_mut(&target) else {
            return;
        };
        let outcome = avatar.apply_damage(amount, attacker);
        if outcome == DamageOutcome::Ignored {
            debug!("Damage to dead avatar {} ignored", target);
            return;
        }
        let (health, max_health) = (avatar.health, avatar.max_health);

        self.notify(Notification::Damaged {
            target,
            attacker,
            spell: spell.to_string(),
            amount,
        });
        self.notify(Notification::HealthChanged {
            avatar: target,
            health,
            max_health,
        });

        if let DamageOutcome::Killed { killer } = outcome {
            self.local_death(target, killer);
        }
    }

    fn stun(&mut self, target: AvatarId, duration: f32) {
        let now = self.now;
        let Some(avatar) = self.avatars.get_mut(&target) else {
            return;
        };
        if !avatar.stun(duration, now) {
            debug!("Stun on dead avatar {} ignored", target);
            return;
        }
        self.notify(Notification::Stunned { target, duration });
        self.interrupt_cast(target);
    }

    /// Drop the windup of the local avatar so a stunned or dead caster never fires.
    fn interrupt_cast(&mut self, avatar: AvatarId) {
        if !self.authority.is_local(avatar) {
            return;
        }
        if let Some(task) = self.pending_cast.take() {
            if self.scheduler.cancel(task) {
                debug!("Avatar {} cast interrupted", avatar);
            }
        }
        if let Some(caster) = self.avatars.get_mut(&avatar) {
            caster.set_casting(false);
        }
    }

    fn on_remove_stun(&mut self, avatar: AvatarId) {
        let cleared = self
            .avatars
            .get_mut(&avatar)
            .is_some_and(|target| target.clear_stun());
        if cleared {
            self.notify(Notification::StunCleared { target: avatar });
        }
    }

    /// Bookkeeping after the local avatar died: tell everyone, credit the killer
    /// and schedule the respawn.
    fn local_death(&mut self, avatar: AvatarId, killer: Option<AvatarId>) {
        if !self.authority.may_originate(Decision::AvatarLifecycle(avatar)) {
            error!("Participant {} cannot decide the death of avatar {}", self.id(), avatar);
            return;
        }
        self.interrupt_cast(avatar);
        self.notify(Notification::Died { avatar, killer });
        self.emit(Targets::Others, GameMessage::Die { avatar });
        if let Some(killer) = killer.filter(|killer| *killer != avatar) {
            self.emit(
                Targets::All,
                GameMessage::KillPlayer {
                    killer,
                    victim: avatar,
                },
            );
        }
        self.scheduler
            .schedule_in(self.now, self.config.dead_duration, Task::Respawn { avatar });
    }

    fn on_die(&mut self, avatar: AvatarId) {
        let Some(target) = self.avatars.get_mut(&avatar) else {
            return;
        };
        if !target.kill() {
            debug!("Avatar {} already dead", avatar);
            return;
        }
        let (killer, max_health) = (target.killed_by(), target.max_health);
        self.notify(Notification::HealthChanged {
            avatar,
            health: 0,
            max_health,
        });
        self.notify(Notification::Died { avatar, killer });
    }

    fn on_kill_player(&mut self, killer: AvatarId, victim: AvatarId) {
        let credited = self
            .avatars
            .get_mut(&victim)
            .is_some_and(|avatar| avatar.claim_kill_attribution());
        if !credited {
            debug!("Kill of avatar {} already credited", victim);
            return;
        }
        let Some(avatar) = self.avatars.get_mut(&killer) else {
            debug!("Kill credited to unknown avatar {}", killer);
            return;
        };
        avatar.score += 1;
        let score = avatar.score;
        self.notify(Notification::ScoreChanged {
            avatar: killer,
            score,
        });
        self.check_win();
    }

    fn respawn(&mut self, avatar: AvatarId) {
        let position = self.random_spawn_point();
        self.emit(Targets::All, GameMessage::Spawn { avatar, position });
        if self.config.spell_distribution == SpellDistribution::RandomOnSpawn {
            self.grant_random_spell();
        }
    }

    fn random_spawn_point(&mut self) -> Vec2 {
        if let Some(point) = self.rng.choose(self.terrain.spawn_points()) {
            return *point;
        }
        if let Some(point) = self.rng.choose(self.terrain.surface_positions()) {
            return *point;
        }
        warn!("Arena has nowhere to respawn, using the origin");
        Vec2::ZERO
    }

    fn on_spawn(&mut self, avatar: AvatarId, position: Vec2) {
        let Some(target) = self.avatars.get_mut(&avatar) else {
            return;
        };
        target.respawn(position);
        let (health, max_health) = (target.health, target.max_health);
        self.notify(Notification::Respawned { avatar, position });
        self.notify(Notification::HealthChanged {
            avatar,
            health,
            max_health,
        });
    }

    fn on_teleport(&mut self, avatar: AvatarId, position: Vec2) {
        let Some(target) = self.avatars.get_mut(&avatar).filter(|a| a.is_alive()) else {
            debug!("Teleport of dead or unknown avatar {} ignored", avatar);
            return;
        };
        target.body.teleport(position);
        self.notify(Notification::Teleported { avatar, position });
    }

    fn simulate_local_avatar(&mut self, dt: f32) {
        let local = self.id();
        let now = self.now;
        let input = std::mem::take(&mut self.input);

        if self.avatars.get(&local).is_some_and(|a| a.stun_expired(now)) {
            self.emit(Targets::All, GameMessage::RemoveStun { avatar: local });
        }

        let config = Arc::clone(&self.config);
        let Some(avatar) = self.avatars.get_mut(&local).filter(|a| a.is_alive()) else {
            return;
        };

        if avatar.can_move() {
            let Avatar {
                motor, body, facing, ..
            } = &mut *avatar;
            motor.drive(input.move_axis, body, facing, &config);
            if input.jump_pressed {
                motor.press_jump(now, body, &config);
            }
            if input.jump_held {
                motor.hold_jump(dt, body, &config);
            }
            if input.jump_released {
                motor.release_jump();
            }
        } else {
            avatar.body.velocity.x = 0.0;
        }

        if avatar.body.step(dt, config.gravity, &*self.terrain) {
            let Avatar { motor, body, .. } = &mut *avatar;
            motor.landed(now, body, &config);
        }
        avatar.refresh_motion_state();

        if avatar.body.position.y < self.terrain.kill_y() {
            if avatar.kill() {
                let (killer, max_health) = (avatar.killed_by(), avatar.max_health);
                info!("Avatar {} fell off the map", local);
                self.notify(Notification::HealthChanged {
                    avatar: local,
                    health: 0,
                    max_health,
                });
                self.local_death(local, killer);
            }
            return;
        }

        let sync = GameMessage::SyncBody {
            avatar: local,
            position: avatar.body.position,
            velocity: avatar.body.velocity,
            facing: avatar.facing,
            state: avatar.state(),
        };
        self.emit(Targets::Others, sync);

        if input.cast_pressed {
            if let Err(rejection) = self.request_cast() {
                debug!("Avatar {} cast rejected: {:?}", local, rejection);
            }
        }
    }

    // ========================================================================
    // Pickups
    // ========================================================================

    fn propose_touched_pickups(&mut self) {
        if self.match_state.phase() != MatchPhase::Playing {
            return;
        }
        let local = self.id();
        let touched = match self.avatars.get(&local) {
            Some(avatar) if avatar.is_alive() => self.pickups.touching(&avatar.body),
            _ => return,
        };
        for pickup in touched {
            if self.pickups.mark_proposed(pickup) {
                self.emit(
                    Targets::Host,
                    GameMessage::ProposePickup {
                        pickup,
                        consumer: local,
                    },
                );
            }
        }
    }

    fn on_spawn_pickup(&mut self, pickup: Pickup) {
        if self.pickups.insert(pickup.clone()) {
            self.notify(Notification::PickupSpawned { pickup });
        }
    }

    fn on_propose_pickup(&mut self, pickup: PickupId, consumer: AvatarId) {
        if !self.authority.may_originate(Decision::PickupConsume) {
            debug!("Participant {}: ignoring pickup proposal addressed to the host", self.id());
            return;
        }
        let Some(avatar) = self.avatars.get(&consumer).filter(|a| a.is_alive()) else {
            debug!("Pickup proposal by dead or unknown avatar {} dropped", consumer);
            return;
        };
        let current_spell = avatar.spell().map(|spell| spell.spell);
        let verdict = match self.pickups.arbitrate(
            pickup,
            consumer,
            &avatar.body,
            current_spell,
            &self.catalog,
            &mut self.rng,
        ) {
            Ok(verdict) => verdict,
            Err(ProposalRejection::Gone) => {
                debug!("Pickup {} already consumed, proposal by avatar {} dropped", pickup, consumer);
                return;
            }
            Err(ProposalRejection::OutOfReach { distance }) => {
                warn!(
                    "Avatar {} proposed pickup {} from {:.2} away, rejected",
                    consumer, pickup, distance
                );
                return;
            }
        };
        self.emit(
            Targets::All,
            GameMessage::ConsumePickup {
                pickup: verdict.pickup,
                consumer: verdict.consumer,
                spell_index: verdict.spell_index,
            },
        );
    }

    fn on_consume_pickup(&mut self, pickup: PickupId, consumer: AvatarId, spell_index: Option<usize>) {
        let Some(removed) = self.pickups.remove(pickup) else {
            debug!("Pickup {} already removed", pickup);
            return;
        };
        self.notify(Notification::PickupConsumed { pickup, consumer });

        match removed.kind {
            PickupKind::Health { amount } => self.heal(consumer, amount),
            PickupKind::Spell { grant } => {
                let catalog = Arc::clone(&self.catalog);
                let resolved = match (grant, spell_index) {
                    (SpellGrant::Random, Some(index)) => {
                        catalog.by_index(index).map(|definition| (SpellId(index), definition))
                    }
                    (SpellGrant::Random, None) => {
                        error!("Random spell pickup {} arrived without a resolved spell", pickup);
                        return;
                    }
                    (SpellGrant::Named(name), _) => catalog.lookup(&name),
                };
                match resolved {
                    Ok((id, definition)) => {
                        self.grant_spell(consumer, SpellCastState::new(id, definition))
                    }
                    Err(e) => error!("Spell pickup {} for avatar {} skipped: {}", pickup, consumer, e),
                }
            }
        }
    }

    fn publish_cooldown_progress(&mut self) {
        let Some(progress) = self.cooldown_progress() else {
            return;
        };
        if self.last_progress.is_some_and(|last| (last - progress).abs() <= f32::EPSILON) {
            return;
        }
        self.last_progress = Some(progress);
        let avatar = self.id();
        self.notify(Notification::CooldownProgress { avatar, progress });
    }
}
