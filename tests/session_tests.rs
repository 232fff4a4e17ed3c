//! Multi-participant session tests
//!
//! Every test runs a complete in-process session over the loopback transport and
//! checks that all participants converge on the same state:
//! - Only the caster's owner decides projectile hits
//! - Kills are credited once and the win is declared once
//! - Messages from the wrong originator are dropped
//! - Falling off the arena kills, and the owner respawns its avatar
//! - The host paces pickups and checks every claim against its own view
//! - Pickup races have a single winner

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use spellclash::avatar::motor::PlayerInput;
use spellclash::combat::events::Notification;
use spellclash::error::GameError;
use spellclash::match_state::{MatchMode, MatchPhase};
use spellclash::net::message::{GameMessage, HitData, HitSource};
use spellclash::net::{ParticipantId, Targets};
use spellclash::pickups::{Pickup, PickupKind, SpellGrant};
use spellclash::session::{Session, SharedContext};
use spellclash::sim::config::{GameplayConfig, SpellDistribution};
use spellclash::sim::terrain::ArenaLayout;
use spellclash::spells::catalog::SpellCatalog;

const DT: f32 = 1.0 / 60.0;

const BOLT: &str = r#"(spells: [
    (name: "Bolt", cooldown: 1.0, kind: Projectile((speed: 12.0, on_hit: (damage: Some(3))))),
])"#;

const LETHAL_BOLT: &str = r#"(spells: [
    (name: "Bolt", cooldown: 1.0, kind: Projectile((speed: 12.0, on_hit: (damage: Some(10))))),
])"#;

const BOLT_AND_MEND: &str = r#"(spells: [
    (name: "Bolt", cooldown: 1.0, kind: Projectile((speed: 12.0, on_hit: (damage: Some(3))))),
    (name: "Mend", cooldown: 2.0, kind: SelfCast((heal_caster: Some(3)))),
])"#;

const SPARK: &str = r#"(spells: [
    (name: "Spark", cooldown: 1.0, kind: Projectile((speed: 12.0, on_hit: (damage: Some(2))))),
])"#;

const SHADOW_STEP: &str = r#"(spells: [
    (name: "Shadow Step", cooldown: 3.0, kind: SelfCast((teleport: Some(NearestPlayer)))),
])"#;

fn test_config() -> GameplayConfig {
    let mut config = GameplayConfig {
        countdown_from: 1,
        dead_duration: 0.5,
        end_game_hang_time: 1.0,
        ..Default::default()
    };
    // Keep the spawner quiet; pickups are placed by hand where needed
    config.pickups.start_delay = 10_000.0;
    config
}

fn context(catalog: &str, mode: MatchMode) -> SharedContext {
    context_with(catalog, mode, test_config())
}

fn context_with(catalog: &str, mode: MatchMode, config: GameplayConfig) -> SharedContext {
    let arena = ArenaLayout::preset("Platform", config.kill_y_margin).unwrap();
    SharedContext {
        config: Arc::new(config),
        catalog: Arc::new(SpellCatalog::from_ron_str(catalog).unwrap()),
        terrain: Arc::new(arena),
        mode,
    }
}

fn session(participants: u32, catalog: &str, mode: MatchMode) -> Session {
    session_with(participants, catalog, mode, test_config())
}

fn session_with(participants: u32, catalog: &str, mode: MatchMode, config: GameplayConfig) -> Session {
    let roster: Vec<ParticipantId> = (0..participants).collect();
    Session::new(roster, 0, context_with(catalog, mode, config), "Platform", Some(11)).unwrap()
}

/// Collect every notification a participant publishes.
fn record(session: &mut Session, id: ParticipantId) -> Arc<Mutex<Vec<Notification>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session
        .participant_mut(id)
        .unwrap()
        .observers_mut()
        .subscribe(move |n| sink.lock().unwrap().push(n.clone()));
    seen
}

fn count(seen: &Arc<Mutex<Vec<Notification>>>, pred: impl Fn(&Notification) -> bool) -> usize {
    seen.lock().unwrap().iter().filter(|n| pred(n)).count()
}

fn run(session: &mut Session, seconds: f32) {
    let steps = (seconds / DT).round() as usize;
    for _ in 0..steps {
        session.step(DT, &BTreeMap::new());
    }
}

/// Start the session and step until every participant is Playing.
fn start_playing(session: &mut Session) {
    session.start();
    for _ in 0..600 {
        if session
            .participants()
            .all(|p| p.match_state().phase() == MatchPhase::Playing)
        {
            return;
        }
        session.step(DT, &BTreeMap::new());
    }
    panic!("session never reached Playing");
}

/// Drop `avatar` below the arena through its owner.
fn fall_off(session: &mut Session, avatar: ParticipantId) {
    session.participant_mut(avatar).unwrap().receive(
        avatar,
        GameMessage::Teleport {
            avatar,
            position: Vec2::new(0.0, -50.0),
        },
    );
}

/// Host's view of where `avatar` stands.
fn host_view(session: &Session, avatar: ParticipantId) -> Vec2 {
    session.participant(0).unwrap().avatar(avatar).unwrap().body.position
}

fn cast(session: &mut Session, caster: ParticipantId) {
    let inputs = BTreeMap::from([(
        caster,
        PlayerInput {
            cast_pressed: true,
            ..Default::default()
        },
    )]);
    session.step(DT, &inputs);
}

// =============================================================================
// Match Flow
// =============================================================================

#[test]
fn test_every_participant_reaches_playing() {
    let mut session = session(3, BOLT_AND_MEND, MatchMode::default());
    start_playing(&mut session);

    for participant in session.participants() {
        assert_eq!(participant.avatars().len(), 3);
        for avatar in participant.avatars().values() {
            assert!(avatar.spell().is_some(), "avatar {} has no spell", avatar.id);
            assert_eq!(avatar.is_local(), avatar.id == participant.id());
            assert!(avatar.can_attack());
        }
    }
}

#[test]
fn test_timed_match_tie_goes_to_lowest_id() {
    let mut session = session(2, BOLT, MatchMode::TimeBased { duration: 1.0 });
    start_playing(&mut session);
    run(&mut session, 1.5);

    for participant in session.participants() {
        assert_eq!(participant.match_state().phase(), MatchPhase::EndGame);
        assert_eq!(participant.match_state().winner(), Some(0));
    }
}

#[test]
fn test_roster_validation() {
    let too_many: Vec<ParticipantId> = (0..5).collect();
    assert!(matches!(
        Session::new(too_many, 0, context(BOLT, MatchMode::default()), "Platform", None),
        Err(GameError::InvalidRoster(_))
    ));
    assert!(matches!(
        Session::new(vec![], 0, context(BOLT, MatchMode::default()), "Platform", None),
        Err(GameError::InvalidRoster(_))
    ));
    assert!(matches!(
        Session::new(vec![0, 1], 7, context(BOLT, MatchMode::default()), "Platform", None),
        Err(GameError::InvalidRoster(_))
    ));
    assert!(matches!(
        Session::new(vec![0, 0], 0, context(BOLT, MatchMode::default()), "Platform", None),
        Err(GameError::InvalidRoster(_))
    ));
}

// =============================================================================
// Projectiles And Kills
// =============================================================================

#[test]
fn test_projectile_hit_is_applied_once_everywhere() {
    let mut session = session(2, BOLT, MatchMode::default());
    start_playing(&mut session);
    let seen_by_caster = record(&mut session, 0);
    let seen_by_target = record(&mut session, 1);

    cast(&mut session, 0);
    run(&mut session, 2.0);

    for participant in session.participants() {
        assert_eq!(participant.avatar(1).unwrap().health, 7);
        assert_eq!(participant.avatar(0).unwrap().health, 10);
    }
    let damaged = |n: &Notification| matches!(n, Notification::Damaged { target: 1, attacker: 0, .. });
    assert_eq!(count(&seen_by_caster, damaged), 1);
    assert_eq!(count(&seen_by_target, damaged), 1);
}

#[test]
fn test_lethal_hit_credits_one_kill_and_one_win() {
    let mut session = session(2, LETHAL_BOLT, MatchMode::ScoreBased { target: 1 });
    start_playing(&mut session);
    let seen: Vec<_> = [0, 1].map(|id| record(&mut session, id)).into();

    cast(&mut session, 0);
    run(&mut session, 2.0);

    for participant in session.participants() {
        assert_eq!(participant.match_state().winner(), Some(0));
        assert_eq!(participant.avatar(0).unwrap().score, 1);
        assert_eq!(participant.avatar(1).unwrap().score, 0);
    }
    for recorded in &seen {
        assert_eq!(count(recorded, |n| matches!(n, Notification::MatchWon { winner: 0 })), 1);
        assert_eq!(count(recorded, |n| matches!(n, Notification::ScoreChanged { avatar: 0, score: 1 })), 1);
        assert_eq!(count(recorded, |n| matches!(n, Notification::Died { avatar: 1, killer: Some(0) })), 1);
    }

    // After the hang time everyone is back in the lobby
    run(&mut session, 1.5);
    for participant in session.participants() {
        assert_eq!(participant.match_state().phase(), MatchPhase::Initiation);
        assert!(participant.avatars().is_empty());
    }
}

// =============================================================================
// Falling And Respawning
// =============================================================================

#[test]
fn test_falling_off_the_arena_kills_and_credits_last_attacker() {
    let mut session = session(2, BOLT, MatchMode::default());
    start_playing(&mut session);
    cast(&mut session, 0);
    run(&mut session, 2.0);
    assert_eq!(session.participant(1).unwrap().avatar(1).unwrap().health, 7);

    let seen: Vec<_> = [0, 1].map(|id| record(&mut session, id)).into();
    fall_off(&mut session, 1);
    run(&mut session, 0.1);

    for participant in session.participants() {
        let avatar = participant.avatar(1).unwrap();
        assert!(!avatar.is_alive(), "participant {} still sees avatar 1 alive", participant.id());
        assert_eq!(avatar.health, 0);
        assert_eq!(participant.avatar(0).unwrap().score, 1);
    }
    for recorded in &seen {
        assert_eq!(count(recorded, |n| matches!(n, Notification::Died { avatar: 1, killer: Some(0) })), 1);
        assert_eq!(count(recorded, |n| matches!(n, Notification::ScoreChanged { avatar: 0, score: 1 })), 1);
    }
}

#[test]
fn test_owner_respawns_at_a_spawn_point() {
    let mut session = session(3, BOLT, MatchMode::default());
    start_playing(&mut session);
    let seen: Vec<_> = [0, 1, 2].map(|id| record(&mut session, id)).into();

    fall_off(&mut session, 1);
    run(&mut session, 0.1);
    // Still inside the dead duration
    assert!(session.participants().all(|p| !p.avatar(1).unwrap().is_alive()));

    run(&mut session, 0.6);
    let spawns = session.participant(0).unwrap().terrain().spawn_points().to_vec();
    let mut positions = Vec::new();
    for recorded in &seen {
        let respawns: Vec<Vec2> = recorded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::Respawned { avatar: 1, position } => Some(*position),
                _ => None,
            })
            .collect();
        assert_eq!(respawns.len(), 1);
        assert!(spawns.contains(&respawns[0]), "{:?} is not a spawn point", respawns[0]);
        positions.push(respawns[0]);
        // RandomOnStart keeps the held spell across deaths
        assert_eq!(count(recorded, |n| matches!(n, Notification::SpellIconChanged { avatar: 1, .. })), 0);
    }
    assert!(positions.windows(2).all(|pair| pair[0] == pair[1]));

    for participant in session.participants() {
        let avatar = participant.avatar(1).unwrap();
        assert!(avatar.is_alive());
        assert_eq!(avatar.health, avatar.max_health);
        assert_eq!(avatar.killed_by(), None);
    }
}

#[test]
fn test_random_on_spawn_regrants_on_respawn() {
    let config = GameplayConfig {
        spell_distribution: SpellDistribution::RandomOnSpawn,
        ..test_config()
    };
    let mut session = session_with(3, BOLT_AND_MEND, MatchMode::default(), config);
    start_playing(&mut session);
    let seen: Vec<_> = [0, 1, 2].map(|id| record(&mut session, id)).into();

    fall_off(&mut session, 1);
    run(&mut session, 0.8);

    for recorded in &seen {
        assert_eq!(count(recorded, |n| matches!(n, Notification::SpellIconChanged { avatar: 1, .. })), 1);
    }
    let owner_spell = session.participant(1).unwrap().avatar(1).unwrap().spell().unwrap().spell;
    for participant in session.participants() {
        let avatar = participant.avatar(1).unwrap();
        assert!(avatar.is_alive());
        assert_eq!(avatar.spell().unwrap().spell, owner_spell);
    }
}

// =============================================================================
// Authority
// =============================================================================

#[test]
fn test_forged_decisions_are_dropped() {
    let mut session = session(2, BOLT, MatchMode::default());
    start_playing(&mut session);
    let before = session.participant(0).unwrap().avatar(0).unwrap().body.position;

    // Participant 1 is neither host nor owner of avatar 0
    session.send_raw(1, Targets::All, GameMessage::WinGame { winner: 1 });
    session.send_raw(
        1,
        Targets::All,
        GameMessage::Hit(HitData {
            target: 0,
            attacker: 0,
            spell: "Bolt".to_string(),
            source: HitSource::Projectile,
            direction: Vec2::X,
        }),
    );
    session.send_raw(1, Targets::All, GameMessage::KillPlayer { killer: 1, victim: 0 });
    session.send_raw(
        1,
        Targets::All,
        GameMessage::Teleport {
            avatar: 0,
            position: Vec2::new(0.0, 8.0),
        },
    );
    run(&mut session, 0.25);

    for participant in session.participants() {
        assert_eq!(participant.match_state().phase(), MatchPhase::Playing);
        let avatar = participant.avatar(0).unwrap();
        assert_eq!(avatar.health, 10);
        assert!((avatar.body.position.x - before.x).abs() < 0.1);
        assert_eq!(participant.avatar(1).unwrap().score, 0);
    }
}

#[test]
fn test_stun_is_idempotent_and_cleared_by_owner() {
    let mut session = session(2, BOLT, MatchMode::default());
    start_playing(&mut session);
    let seen = record(&mut session, 0);

    let stun = GameMessage::Stun {
        target: 1,
        source: 0,
        duration: 1.0,
    };
    session.send_raw(0, Targets::All, stun.clone());
    session.send_raw(0, Targets::All, stun);
    run(&mut session, 0.1);

    for participant in session.participants() {
        let avatar = participant.avatar(1).unwrap();
        assert!(avatar.is_stunned());
        assert!(!avatar.can_move() && !avatar.can_attack());
    }

    run(&mut session, 1.5);
    for participant in session.participants() {
        assert!(!participant.avatar(1).unwrap().is_stunned());
    }
    assert_eq!(count(&seen, |n| matches!(n, Notification::StunCleared { target: 1 })), 1);
}

// =============================================================================
// Pickups And Teleports
// =============================================================================

#[test]
fn test_host_paces_pickups_and_replicates_them() {
    let mut config = test_config();
    config.pickups.start_delay = 0.1;
    config.pickups.min_interval = 0.2;
    config.pickups.max_interval = 0.3;
    config.pickups.max_pickups = 2;
    config.pickups.health_variants = vec![5];
    config.pickups.spell_variants = vec![];
    let mut session = session_with(3, BOLT, MatchMode::default(), config);
    start_playing(&mut session);
    let seen: Vec<_> = [0, 1, 2].map(|id| record(&mut session, id)).into();

    for _ in 0..180 {
        session.step(DT, &BTreeMap::new());
        for participant in session.participants() {
            assert!(participant.pickups().len() <= 2, "participant {} over the cap", participant.id());
        }
    }

    let spawned = |recorded: &Arc<Mutex<Vec<Notification>>>| -> Vec<u32> {
        recorded
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::PickupSpawned { pickup } => Some(pickup.id),
                _ => None,
            })
            .collect()
    };
    let host_spawned = spawned(&seen[0]);
    assert!(host_spawned.len() >= 2);
    let unique: BTreeSet<u32> = host_spawned.iter().copied().collect();
    assert_eq!(unique.len(), host_spawned.len(), "pickup ids repeat");

    // Give in-flight spawns time to arrive, then every participant knows them
    run(&mut session, 0.1);
    for recorded in &seen[1..] {
        let mirrored: BTreeSet<u32> = spawned(recorded).into_iter().collect();
        assert!(unique.is_subset(&mirrored));
    }
    for pickup in session.participant(0).unwrap().pickups().active() {
        assert!(matches!(pickup.kind, PickupKind::Health { amount: 5 }));
    }
}

#[test]
fn test_health_pickup_heals_up_to_max() {
    let mut session = session(2, SPARK, MatchMode::default());
    start_playing(&mut session);
    cast(&mut session, 0);
    run(&mut session, 2.0);
    assert!(session.participants().all(|p| p.avatar(1).unwrap().health == 8));

    let seen: Vec<_> = [0, 1].map(|id| record(&mut session, id)).into();
    let pickup = Pickup {
        id: 700,
        kind: PickupKind::Health { amount: 5 },
        position: host_view(&session, 1),
    };
    session.send_raw(0, Targets::All, GameMessage::SpawnPickup { pickup });
    run(&mut session, 0.25);

    for participant in session.participants() {
        assert!(participant.pickups().get(700).is_none());
        assert_eq!(participant.avatar(1).unwrap().health, 10);
    }
    for recorded in &seen {
        assert_eq!(count(recorded, |n| matches!(n, Notification::Healed { target: 1, amount: 2 })), 1);
        assert_eq!(count(recorded, |n| matches!(n, Notification::PickupConsumed { pickup: 700, consumer: 1 })), 1);
    }
}

#[test]
fn test_host_rejects_claims_out_of_reach() {
    let mut session = session(3, BOLT, MatchMode::default());
    start_playing(&mut session);

    // Avatar 2 stands at x=-2; the pickup is several units away from everyone
    let far = Pickup {
        id: 800,
        kind: PickupKind::Health { amount: 3 },
        position: host_view(&session, 2) + Vec2::new(4.0, 0.0),
    };
    let host = session.participant_mut(0).unwrap();
    host.receive(0, GameMessage::SpawnPickup { pickup: far });
    host.receive(2, GameMessage::ProposePickup { pickup: 800, consumer: 2 });
    assert!(host.pickups().get(800).is_some(), "claim from afar must not consume");

    let near = Pickup {
        id: 801,
        kind: PickupKind::Health { amount: 3 },
        position: host_view(&session, 2),
    };
    let host = session.participant_mut(0).unwrap();
    host.receive(0, GameMessage::SpawnPickup { pickup: near });
    host.receive(2, GameMessage::ProposePickup { pickup: 801, consumer: 2 });
    assert!(host.pickups().get(801).is_none());
    assert!(host.pickups().get(800).is_some());
}

#[test]
fn test_claims_for_another_avatar_are_dropped() {
    let mut session = session(3, BOLT, MatchMode::default());
    start_playing(&mut session);

    let pickup = Pickup {
        id: 810,
        kind: PickupKind::Health { amount: 3 },
        position: host_view(&session, 1),
    };
    let host = session.participant_mut(0).unwrap();
    host.receive(0, GameMessage::SpawnPickup { pickup });

    // Participant 2 claims on behalf of avatar 1, who really is standing on it
    host.receive(2, GameMessage::ProposePickup { pickup: 810, consumer: 1 });
    assert!(host.pickups().get(810).is_some());

    host.receive(1, GameMessage::ProposePickup { pickup: 810, consumer: 1 });
    assert!(host.pickups().get(810).is_none());
}

#[test]
fn test_pickup_race_has_single_winner() {
    let mut session = session(2, BOLT_AND_MEND, MatchMode::default());
    start_playing(&mut session);

    // Put both avatars on the same spot, with the pickup just above their heads:
    // out of contact range, but within the reach the host tolerates
    let spot = host_view(&session, 1);
    session
        .participant_mut(0)
        .unwrap()
        .receive(0, GameMessage::Teleport { avatar: 0, position: spot });
    run(&mut session, 0.1);
    let seen: Vec<_> = [0, 1].map(|id| record(&mut session, id)).into();

    let half_height = session.participant(0).unwrap().avatar(1).unwrap().body.half_extents.y;
    let pickup = Pickup {
        id: 900,
        kind: PickupKind::Spell {
            grant: SpellGrant::Named("Mend".to_string()),
        },
        position: spot + Vec2::new(0.0, half_height + 0.8),
    };
    session.send_raw(0, Targets::All, GameMessage::SpawnPickup { pickup });
    run(&mut session, 0.05);
    assert!(session.participants().all(|p| p.pickups().get(900).is_some()));

    // Both avatars claim the same pickup; the host sees avatar 1 first
    session.send_raw(1, Targets::Host, GameMessage::ProposePickup { pickup: 900, consumer: 1 });
    session.send_raw(0, Targets::Host, GameMessage::ProposePickup { pickup: 900, consumer: 0 });
    run(&mut session, 0.25);

    for participant in session.participants() {
        assert!(participant.pickups().get(900).is_none());
        let spell = participant.avatar(1).unwrap().spell().unwrap().spell;
        assert_eq!(participant.catalog().get(spell).unwrap().name, "Mend");
    }
    for recorded in &seen {
        assert_eq!(count(recorded, |n| matches!(n, Notification::PickupConsumed { pickup: 900, .. })), 1);
        assert_eq!(
            count(recorded, |n| matches!(n, Notification::PickupConsumed { consumer: 0, .. })),
            0
        );
    }
}

#[test]
fn test_nearest_player_teleport_converges() {
    // Platform spawns: avatar 0 at x=-6, avatar 1 at x=6, avatar 2 at x=-2
    let mut session = session(3, SHADOW_STEP, MatchMode::default());
    start_playing(&mut session);

    cast(&mut session, 0);
    run(&mut session, 1.0);

    for participant in session.participants() {
        let caster = participant.avatar(0).unwrap().body.position;
        let nearest = participant.avatar(2).unwrap().body.position;
        assert!(
            (caster.x - nearest.x).abs() < 0.5,
            "participant {} sees avatar 0 at {:?}, avatar 2 at {:?}",
            participant.id(),
            caster,
            nearest
        );
    }
}
