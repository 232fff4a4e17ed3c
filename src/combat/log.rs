//! Combat logging
//!
//! Records match events observed by one participant for post-match analysis. The
//! log is filled from [`Notification`]s and can be written out as JSON together with
//! the match metadata.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::events::Notification;
use crate::match_state::{MatchMode, MatchPhase};
use crate::net::AvatarId;
use crate::pickups::PickupKind;

/// Directory used when no explicit output path is given
pub const DEFAULT_LOG_DIR: &str = "match_logs";

/// A single entry in the combat log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// Timestamp in session time (seconds)
    pub timestamp: f32,
    /// The type of event
    pub event_type: CombatLogEventType,
    /// Human-readable description of the event
    pub message: String,
    /// Machine-readable payload for aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StructuredEventData>,
}

/// Types of combat log events for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatLogEventType {
    Damage,
    Healing,
    SpellCast,
    /// Stuns applied and cleared
    CrowdControl,
    Death,
    Respawn,
    Teleport,
    Pickup,
    /// Countdown, start, win
    MatchEvent,
}

/// Structured payload of aggregatable entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructuredEventData {
    Damage {
        attacker: AvatarId,
        target: AvatarId,
        spell: String,
        amount: i32,
    },
    Healing {
        target: AvatarId,
        amount: i32,
    },
    Death {
        victim: AvatarId,
        killer: Option<AvatarId>,
    },
}

/// Final state of one avatar, written next to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarMetadata {
    pub id: AvatarId,
    pub max_health: i32,
    pub final_health: i32,
    pub score: u32,
    pub spell: Option<String>,
    pub final_position: (f32, f32),
}

/// Match summary written next to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub arena_name: String,
    pub mode: MatchMode,
    pub winner: Option<AvatarId>,
    pub random_seed: Option<u64>,
    pub avatars: Vec<AvatarMetadata>,
}

#[derive(Serialize)]
struct SavedLog<'a> {
    metadata: &'a MatchMetadata,
    duration: f32,
    entries: &'a [CombatLogEntry],
}

/// The combat log resource storing all events
#[derive(Resource, Default, Debug)]
pub struct CombatLog {
    /// All log entries in chronological order
    pub entries: Vec<CombatLogEntry>,
    /// Current session time
    pub match_time: f32,
}

impl CombatLog {
    /// Clear the log for a new match
    pub fn clear(&mut self) {
        self.entries.clear();
        self.match_time = 0.0;
    }

    /// Add a new entry to the log
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.push(event_type, message, None);
    }

    fn push(&mut self, event_type: CombatLogEventType, message: String, data: Option<StructuredEventData>) {
        self.entries.push(CombatLogEntry {
            timestamp: self.match_time,
            event_type,
            message,
            data,
        });
    }

    pub fn log_damage(&mut self, attacker: AvatarId, target: AvatarId, spell: String, amount: i32) {
        let message = format!(
            "Avatar {} hits Avatar {} with {} for {} damage",
            attacker, target, spell, amount
        );
        self.push(
            CombatLogEventType::Damage,
            message,
            Some(StructuredEventData::Damage {
                attacker,
                target,
                spell,
                amount,
            }),
        );
    }

    pub fn log_healing(&mut self, target: AvatarId, amount: i32) {
        self.push(
            CombatLogEventType::Healing,
            format!("Avatar {} heals for {}", target, amount),
            Some(StructuredEventData::Healing { target, amount }),
        );
    }

    pub fn log_death(&mut self, victim: AvatarId, killer: Option<AvatarId>) {
        let message = match killer {
            Some(killer) if killer != victim => format!("Avatar {} was killed by Avatar {}", victim, killer),
            _ => format!("Avatar {} died", victim),
        };
        self.push(
            CombatLogEventType::Death,
            message,
            Some(StructuredEventData::Death { victim, killer }),
        );
    }

    /// Turn an observed notification into a log entry. Presentation-only
    /// notifications are not logged.
    pub fn record(&mut self, notification: &Notification) {
        match notification {
            Notification::Damaged {
                target,
                attacker,
                spell,
                amount,
            } => self.log_damage(*attacker, *target, spell.clone(), *amount),
            Notification::Healed { target, amount } => self.log_healing(*target, *amount),
            Notification::Died { avatar, killer } => self.log_death(*avatar, *killer),
            Notification::SpellCast { caster, spell } => self.log(
                CombatLogEventType::SpellCast,
                format!("Avatar {} casts {}", caster, spell),
            ),
            Notification::Stunned { target, duration } => self.log(
                CombatLogEventType::CrowdControl,
                format!("Avatar {} is stunned for {:.1}s", target, duration),
            ),
            Notification::StunCleared { target } => self.log(
                CombatLogEventType::CrowdControl,
                format!("Avatar {} is no longer stunned", target),
            ),
            Notification::Respawned { avatar, position } => self.log(
                CombatLogEventType::Respawn,
                format!("Avatar {} respawns at ({:.1}, {:.1})", avatar, position.x, position.y),
            ),
            Notification::Teleported { avatar, position } => self.log(
                CombatLogEventType::Teleport,
                format!("Avatar {} teleports to ({:.1}, {:.1})", avatar, position.x, position.y),
            ),
            Notification::PickupSpawned { pickup } => {
                let what = match &pickup.kind {
                    PickupKind::Health { amount } => format!("health pickup (+{})", amount),
                    PickupKind::Spell { .. } => "spell pickup".to_string(),
                };
                self.log(
                    CombatLogEventType::Pickup,
                    format!(
                        "Pickup {} spawned: {} at ({:.1}, {:.1})",
                        pickup.id, what, pickup.position.x, pickup.position.y
                    ),
                );
            }
            Notification::PickupConsumed { pickup, consumer } => self.log(
                CombatLogEventType::Pickup,
                format!("Avatar {} picked up pickup {}", consumer, pickup),
            ),
            Notification::CountdownTick { remaining } => {
                self.log(CombatLogEventType::MatchEvent, format!("Countdown: {}", remaining))
            }
            Notification::MatchPhaseChanged { phase } => {
                if *phase == MatchPhase::Playing {
                    self.log(CombatLogEventType::MatchEvent, "Match started!".to_string());
                }
            }
            Notification::MatchWon { winner } => self.log(
                CombatLogEventType::MatchEvent,
                format!("Avatar {} wins the match!", winner),
            ),
            Notification::HealthChanged { .. }
            | Notification::ScoreChanged { .. }
            | Notification::CooldownProgress { .. }
            | Notification::SpellIconChanged { .. }
            | Notification::ObjectSpawned { .. }
            | Notification::ProjectileDestroyed { .. } => {}
        }
    }

    /// Get entries filtered by event type
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get only HP-changing events (damage and healing)
    pub fn hp_changes_only(&self) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CombatLogEventType::Damage | CombatLogEventType::Healing
                )
            })
            .collect()
    }

    /// Get the last N entries
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    /// Total damage dealt by `attacker`, keyed by spell name.
    pub fn damage_by_spell(&self, attacker: AvatarId) -> HashMap<String, i32> {
        let mut totals = HashMap::new();
        for entry in &self.entries {
            if let Some(StructuredEventData::Damage {
                attacker: source,
                spell,
                amount,
                ..
            }) = &entry.data
            {
                if *source == attacker {
                    *totals.entry(spell.clone()).or_insert(0) += amount;
                }
            }
        }
        totals
    }

    /// Total damage dealt by `attacker` across all spells.
    pub fn total_damage_dealt(&self, attacker: AvatarId) -> i32 {
        self.damage_by_spell(attacker).values().sum()
    }

    /// Total damage taken by `target`.
    pub fn total_damage_taken(&self, target: AvatarId) -> i32 {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.data {
                Some(StructuredEventData::Damage { target: t, amount, .. }) if *t == target => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// Total health restored to `target`.
    pub fn total_healing(&self, target: AvatarId) -> i32 {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.data {
                Some(StructuredEventData::Healing { target: t, amount }) if *t == target => Some(*amount),
                _ => None,
            })
            .sum()
    }

    /// How many times `avatar` died, whatever the cause.
    pub fn deaths(&self, avatar: AvatarId) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                matches!(&entry.data, Some(StructuredEventData::Death { victim, .. }) if *victim == avatar)
            })
            .count()
    }

    /// Deaths attributed to `killer`, self-inflicted ones excluded.
    pub fn killing_blows(&self, killer: AvatarId) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                matches!(
                    &entry.data,
                    Some(StructuredEventData::Death { victim, killer: Some(k) })
                        if *k == killer && *victim != killer
                )
            })
            .count()
    }

    /// Write the log and `metadata` as pretty JSON. Without `output_path` the file
    /// lands in [`DEFAULT_LOG_DIR`] with a timestamped name. Returns the path written.
    pub fn save_to_file(&self, metadata: &MatchMetadata, output_path: Option<&str>) -> Result<String, String> {
        let path = match output_path {
            Some(path) => path.to_string(),
            None => {
                let stamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                format!("{}/match_{}.json", DEFAULT_LOG_DIR, stamp)
            }
        };

        if let Some(parent) = Path::new(&path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory {}: {}", parent.display(), e))?;
        }

        let saved = SavedLog {
            metadata,
            duration: self.match_time,
            entries: &self.entries,
        };
        let json = serde_json::to_string_pretty(&saved)
            .map_err(|e| format!("Failed to serialize combat log: {}", e))?;
        std::fs::write(&path, json).map_err(|e| format!("Failed to write {}: {}", path, e))?;
        Ok(path)
    }
}
