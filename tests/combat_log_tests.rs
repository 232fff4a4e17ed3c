//! Unit tests for combat log query and aggregation methods
//!
//! These tests verify that the CombatLog correctly:
//! - Aggregates damage by spell
//! - Counts killing blows and deaths
//! - Turns notifications into readable entries
//! - Writes a JSON file with match metadata

use bevy::prelude::*;
use regex::Regex;
use spellclash::combat::events::Notification;
use spellclash::combat::log::{
    AvatarMetadata, CombatLog, CombatLogEventType, MatchMetadata, StructuredEventData,
};
use spellclash::match_state::{MatchMode, MatchPhase};
use spellclash::pickups::{Pickup, PickupKind};

fn create_test_log() -> CombatLog {
    CombatLog::default()
}

// =============================================================================
// Damage Aggregation Tests
// =============================================================================

#[test]
fn test_damage_by_spell_empty_log() {
    let log = create_test_log();
    let damage = log.damage_by_spell(0);
    assert!(damage.is_empty(), "Empty log should return empty damage map");
}

#[test]
fn test_damage_by_spell_single_source() {
    let mut log = create_test_log();

    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.log_damage(0, 2, "Ice Shard".to_string(), 2);

    let damage = log.damage_by_spell(0);

    assert_eq!(damage.len(), 2, "Should have 2 different spells");
    assert_eq!(damage.get("Fireball"), Some(&6), "Fireball should total 6 damage");
    assert_eq!(damage.get("Ice Shard"), Some(&2));
    assert_eq!(log.total_damage_dealt(0), 8);
}

#[test]
fn test_damage_by_spell_multiple_sources() {
    let mut log = create_test_log();

    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.log_damage(1, 0, "Fireball".to_string(), 5);

    assert_eq!(log.damage_by_spell(0).get("Fireball"), Some(&3));
    assert_eq!(log.damage_by_spell(1).get("Fireball"), Some(&5));
}

#[test]
fn test_total_damage_taken_and_healing() {
    let mut log = create_test_log();

    log.log_damage(0, 2, "Fireball".to_string(), 3);
    log.log_damage(1, 2, "Boulder".to_string(), 5);
    log.log_damage(2, 0, "Boulder".to_string(), 5);
    log.log_healing(2, 4);
    log.log_healing(0, 1);

    assert_eq!(log.total_damage_taken(2), 8);
    assert_eq!(log.total_damage_taken(0), 5);
    assert_eq!(log.total_healing(2), 4);
    assert_eq!(log.total_healing(1), 0);
}

// =============================================================================
// Death Tests
// =============================================================================

#[test]
fn test_killing_blows_none() {
    let mut log = create_test_log();
    log.log_death(1, None);
    assert_eq!(log.killing_blows(0), 0);
    assert_eq!(log.deaths(1), 1);
}

#[test]
fn test_killing_blows_counted() {
    let mut log = create_test_log();

    log.log_death(1, Some(0));
    log.log_death(2, Some(0));
    log.log_death(0, Some(2));
    // Self-inflicted deaths are not killing blows
    log.log_death(0, Some(0));

    assert_eq!(log.killing_blows(0), 2);
    assert_eq!(log.killing_blows(2), 1);
    assert_eq!(log.deaths(0), 2);
}

#[test]
fn test_death_entries_carry_structured_data() {
    let mut log = create_test_log();
    log.log_death(3, Some(1));

    let entry = &log.entries[0];
    assert_eq!(entry.event_type, CombatLogEventType::Death);
    assert_eq!(
        entry.data,
        Some(StructuredEventData::Death {
            victim: 3,
            killer: Some(1)
        })
    );
}

// =============================================================================
// Notification Recording Tests
// =============================================================================

#[test]
fn test_record_message_formats() {
    let mut log = create_test_log();
    log.match_time = 12.5;

    log.record(&Notification::Damaged {
        target: 1,
        attacker: 0,
        spell: "Fireball".to_string(),
        amount: 3,
    });
    log.record(&Notification::Stunned {
        target: 1,
        duration: 0.75,
    });
    log.record(&Notification::Died {
        avatar: 1,
        killer: Some(0),
    });
    log.record(&Notification::Respawned {
        avatar: 1,
        position: Vec2::new(6.0, 1.0),
    });

    let damage = Regex::new(r"^Avatar \d+ hits Avatar \d+ with [A-Za-z ]+ for \d+ damage$").unwrap();
    let stun = Regex::new(r"^Avatar \d+ is stunned for \d+\.\ds$").unwrap();
    let death = Regex::new(r"^Avatar \d+ was killed by Avatar \d+$").unwrap();
    let respawn = Regex::new(r"^Avatar \d+ respawns at \(-?\d+\.\d, -?\d+\.\d\)$").unwrap();

    assert!(damage.is_match(&log.entries[0].message), "{}", log.entries[0].message);
    assert!(stun.is_match(&log.entries[1].message), "{}", log.entries[1].message);
    assert!(death.is_match(&log.entries[2].message), "{}", log.entries[2].message);
    assert!(respawn.is_match(&log.entries[3].message), "{}", log.entries[3].message);
    assert!(log.entries.iter().all(|e| e.timestamp == 12.5));
}

#[test]
fn test_presentation_notifications_are_not_logged() {
    let mut log = create_test_log();

    log.record(&Notification::HealthChanged {
        avatar: 0,
        health: 7,
        max_health: 10,
    });
    log.record(&Notification::CooldownProgress {
        avatar: 0,
        progress: 0.5,
    });
    log.record(&Notification::MatchPhaseChanged {
        phase: MatchPhase::PreGame,
    });
    assert!(log.entries.is_empty());

    log.record(&Notification::MatchPhaseChanged {
        phase: MatchPhase::Playing,
    });
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].message, "Match started!");
}

#[test]
fn test_pickup_entries() {
    let mut log = create_test_log();

    log.record(&Notification::PickupSpawned {
        pickup: Pickup {
            id: 4,
            kind: PickupKind::Health { amount: 3 },
            position: Vec2::new(-2.0, 1.0),
        },
    });
    log.record(&Notification::PickupConsumed {
        pickup: 4,
        consumer: 2,
    });

    let pickups = log.filter_by_type(CombatLogEventType::Pickup);
    assert_eq!(pickups.len(), 2);
    assert!(Regex::new(r"^Pickup 4 spawned: health pickup \(\+3\) at \(-2\.0, 1\.0\)$")
        .unwrap()
        .is_match(&pickups[0].message));
    assert_eq!(pickups[1].message, "Avatar 2 picked up pickup 4");
}

// =============================================================================
// Query Tests
// =============================================================================

#[test]
fn test_filter_by_type() {
    let mut log = create_test_log();

    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.log_healing(1, 2);
    log.log(CombatLogEventType::MatchEvent, "Countdown: 3".to_string());
    log.log_damage(1, 0, "Boulder".to_string(), 5);

    assert_eq!(log.filter_by_type(CombatLogEventType::Damage).len(), 2);
    assert_eq!(log.filter_by_type(CombatLogEventType::Healing).len(), 1);
    assert_eq!(log.filter_by_type(CombatLogEventType::Death).len(), 0);
}

#[test]
fn test_hp_changes_only() {
    let mut log = create_test_log();

    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.log(CombatLogEventType::SpellCast, "Avatar 0 casts Fireball".to_string());
    log.log_healing(1, 2);

    let hp = log.hp_changes_only();
    assert_eq!(hp.len(), 2);
    assert_eq!(hp[0].event_type, CombatLogEventType::Damage);
    assert_eq!(hp[1].event_type, CombatLogEventType::Healing);
}

#[test]
fn test_recent_entries() {
    let mut log = create_test_log();
    for i in 0..5 {
        log.log(CombatLogEventType::MatchEvent, format!("Countdown: {}", 5 - i));
    }

    let recent = log.recent(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].message, "Countdown: 2");
    assert_eq!(recent[1].message, "Countdown: 1");
    assert_eq!(log.recent(10).len(), 5);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_save_to_file_writes_metadata_and_entries() {
    let mut log = create_test_log();
    log.log_damage(0, 1, "Fireball".to_string(), 3);
    log.match_time = 42.0;

    let metadata = MatchMetadata {
        arena_name: "Temple".to_string(),
        mode: MatchMode::ScoreBased { target: 5 },
        winner: Some(0),
        random_seed: Some(7),
        avatars: vec![AvatarMetadata {
            id: 0,
            max_health: 10,
            final_health: 10,
            score: 5,
            spell: Some("Fireball".to_string()),
            final_position: (1.0, 2.0),
        }],
    };

    let mut path = std::env::temp_dir();
    path.push(format!("spellclash_log_{}", std::process::id()));
    path.push("match.json");
    let written = log
        .save_to_file(&metadata, Some(&path.display().to_string()))
        .unwrap();

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(saved["metadata"]["arena_name"], "Temple");
    assert_eq!(saved["metadata"]["avatars"][0]["score"], 5);
    assert_eq!(saved["duration"], 42.0);
    assert_eq!(saved["entries"][0]["event_type"], "Damage");
}

#[test]
fn test_clear_resets_log() {
    let mut log = create_test_log();
    log.log_healing(0, 1);
    log.match_time = 3.0;
    log.clear();
    assert!(log.entries.is_empty());
    assert_eq!(log.match_time, 0.0);
}
